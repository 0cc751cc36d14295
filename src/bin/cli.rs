//! Comment service CLI
//!
//! Operator entry point: crawl blogs, inspect and moderate comments, or run the
//! known-post refresher in the foreground.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use comments::{
    config,
    error::{AppError, Result},
    logging,
    models::{CommentFilter, Config, NewComment},
    pipeline::KnownPostRefresher,
    registry::KnownPosts,
    services::{CommentIntake, PostCrawler},
    storage,
};
use tracing::{error, info};

/// Blog comment storage and known-post registry
#[derive(Parser, Debug)]
#[command(name = "comments", version, about = "Comment service for static blogs")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "comments.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl blog index pages once and print the posts found
    Crawl {
        /// Crawl this host instead of the configured ones
        #[arg(long)]
        host: Option<String>,
    },

    /// Count the comments on a post
    Count {
        #[arg(long)]
        site: String,
        #[arg(long)]
        post: String,
    },

    /// List comments as JSON
    List {
        #[arg(long)]
        site: String,
        #[arg(long)]
        post: Option<String>,
        #[arg(long)]
        comment: Option<String>,
        /// Only active (true) or inactive (false) comments
        #[arg(long)]
        active: Option<bool>,
        /// Strip author email and source address
        #[arg(long)]
        redact: bool,
    },

    /// Submit a comment through the same checks as a visitor
    Submit {
        #[arg(long)]
        site: String,
        #[arg(long)]
        post: String,
        #[arg(long)]
        author: String,
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long)]
        body: String,
        #[arg(long, default_value = "127.0.0.1")]
        source: String,
    },

    /// Approve a comment
    Activate {
        #[arg(long)]
        site: String,
        #[arg(long)]
        comment: String,
    },

    /// Delete a comment
    Delete {
        #[arg(long)]
        site: String,
        #[arg(long)]
        comment: String,
    },

    /// Keep the known-post registry refreshed until Ctrl-C
    Run,

    /// Validate the configuration
    Validate,
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = config::load_config(&cli.config)?;
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    logging::init(&config.logging)?;
    match cli.command {
        Command::Validate => {}
        Command::Crawl { .. } | Command::Run => config.validate_crawler()?,
        _ => config.validate()?,
    }

    let registry = Arc::new(KnownPosts::new());

    match cli.command {
        Command::Crawl { host } => {
            let crawler = PostCrawler::new(&config.crawler)?;
            let hosts = match host {
                Some(host) => vec![host],
                None => config.crawler.hosts.clone(),
            };
            if hosts.is_empty() {
                return Err(AppError::config(
                    "no hosts to crawl; set crawler.hosts or pass --host",
                ));
            }
            for host in &hosts {
                if let Err(e) = crawler.crawl_host(host, &registry).await {
                    error!(host = %host, error = %e, "crawl failed");
                }
            }
            for site in registry.sites() {
                for post in registry.posts(&site) {
                    println!("{site}\t{post}");
                }
            }
            info!(known = registry.count(), "crawl complete");
        }

        Command::Count { site, post } => {
            let store = storage::open(&config.storage).await?;
            let nr = store
                .nr_comments(&CommentFilter::post(site, post))
                .await?;
            println!("{nr}");
        }

        Command::List {
            site,
            post,
            comment,
            active,
            redact,
        } => {
            let store = storage::open(&config.storage).await?;
            let intake = CommentIntake::new(store, registry, config.admission.clone());
            let filter = CommentFilter {
                comment_id: comment,
                site_id: Some(site),
                post_id: post,
                is_active: active,
            };
            let mut found = intake.admin_comments(&filter).await?;
            if redact {
                found = found.into_iter().map(|c| c.redacted()).collect();
            }
            println!("{}", serde_json::to_string_pretty(&found)?);
        }

        Command::Submit {
            site,
            post,
            author,
            email,
            body,
            source,
        } => {
            let store = storage::open(&config.storage).await?;
            KnownPostRefresher::from_config(&config.crawler, Arc::clone(&registry))?
                .prime()
                .await;
            let intake = CommentIntake::new(store, registry, config.admission.clone());
            let comment = intake
                .submit(
                    NewComment {
                        site_id: site,
                        post_id: post,
                        author,
                        author_email: email,
                        comment_body: body,
                    },
                    &source,
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&comment)?);
        }

        Command::Activate { site, comment } => {
            let store = storage::open(&config.storage).await?;
            let intake = CommentIntake::new(store, registry, config.admission.clone());
            let updated = intake.activate(&site, &comment).await?;
            println!("{}", serde_json::to_string_pretty(&updated)?);
        }

        Command::Delete { site, comment } => {
            let store = storage::open(&config.storage).await?;
            let intake = CommentIntake::new(store, registry, config.admission.clone());
            intake.delete(&site, &comment).await?;
            info!(site_id = %site, comment_id = %comment, "deleted");
        }

        Command::Run => {
            let refresher = KnownPostRefresher::from_config(&config.crawler, Arc::clone(&registry))?;
            refresher.prime().await;
            let handle = refresher.spawn();
            info!(
                hosts = config.crawler.hosts.len(),
                interval_secs = config.crawler.refresh_interval_secs,
                known = registry.count(),
                "refreshing known posts, Ctrl-C to stop"
            );

            tokio::signal::ctrl_c().await?;
            info!("shutting down");
            handle.shutdown(Duration::from_secs(5)).await?;
            info!(
                known = registry.count(),
                sites = ?registry.sites(),
                "stopped"
            );
        }

        Command::Validate => validate(&cli.config, &config)?,
    }

    Ok(())
}

/// Check the configuration and report the first problem found.
fn validate(path: &Path, config: &Config) -> Result<()> {
    info!(path = %path.display(), "validating configuration");

    if let Err(e) = config.validate() {
        error!(error = %e, "config validation failed");
        return Err(e);
    }
    let backend = config.storage.backend()?;
    info!(engine = backend.name(), "storage backend OK");
    if config.crawler.hosts.is_empty() {
        info!("no crawler hosts configured; every comment would be rejected");
    }
    info!("All validations passed!");
    Ok(())
}
