// src/pipeline/refresh.rs

//! Known-post refresh loop.
//!
//! `prime()` crawls every configured host once and is awaited at startup. `spawn()` then
//! re-crawls on a fixed interval until the returned handle is shut down.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::models::CrawlerConfig;
use crate::registry::KnownPosts;
use crate::services::{CrawlOutcome, PostCrawler};

/// Summary of one pass over all hosts.
#[derive(Debug, Default)]
pub struct RefreshReport {
    pub outcomes: Vec<CrawlOutcome>,
    pub host_failures: usize,
    /// Registry size after the pass
    pub known: usize,
}

impl RefreshReport {
    pub fn added(&self) -> usize {
        self.outcomes.iter().map(|o| o.added).sum()
    }

    pub fn discovered(&self) -> usize {
        self.outcomes.iter().map(|o| o.discovered.len()).sum()
    }
}

/// Keeps the known-post registry in step with the blogs' index pages.
pub struct KnownPostRefresher {
    crawler: PostCrawler,
    registry: Arc<KnownPosts>,
    hosts: Vec<String>,
    interval: Duration,
}

impl KnownPostRefresher {
    pub fn new(
        crawler: PostCrawler,
        registry: Arc<KnownPosts>,
        hosts: Vec<String>,
        interval: Duration,
    ) -> Self {
        Self {
            crawler,
            registry,
            hosts,
            interval,
        }
    }

    /// Build a refresher for the hosts named in `config`.
    pub fn from_config(config: &CrawlerConfig, registry: Arc<KnownPosts>) -> Result<Self> {
        Ok(Self::new(
            PostCrawler::new(config)?,
            registry,
            config.hosts.clone(),
            config.refresh_interval(),
        ))
    }

    /// Crawl every host once. Failures are logged per host and never abort the pass.
    pub async fn refresh_once(&self) -> RefreshReport {
        let mut report = RefreshReport::default();
        for host in &self.hosts {
            match self.crawler.crawl_host(host, &self.registry).await {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(error) => {
                    report.host_failures += 1;
                    warn!(host = %host, %error, "crawl failed, keeping known posts");
                }
            }
        }
        report.known = self.registry.count();
        debug!(
            hosts = self.hosts.len(),
            failures = report.host_failures,
            discovered = report.discovered(),
            added = report.added(),
            known = report.known,
            "refresh pass complete"
        );
        report
    }

    /// The startup crawl.
    pub async fn prime(&self) -> RefreshReport {
        let report = self.refresh_once().await;
        if report.known == 0 {
            warn!(
                hosts = self.hosts.len(),
                "no known posts after startup crawl; every comment will be rejected"
            );
        } else {
            info!(known = report.known, "primed known posts");
        }
        report
    }

    /// Run [`refresh_once`](Self::refresh_once) every interval in a background task.
    ///
    /// The first pass happens one interval from now; call [`prime`](Self::prime) first.
    pub fn spawn(self) -> RefreshHandle {
        let shutdown = Arc::new(Notify::new());
        let task = tokio::spawn(self.run(Arc::clone(&shutdown)));
        RefreshHandle { task, shutdown }
    }

    async fn run(self, shutdown: Arc<Notify>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.refresh_once().await;
                }
                _ = shutdown.notified() => {
                    debug!("refresh loop stopping");
                    break;
                }
            }
        }
    }
}

/// Handle on the background refresh task.
pub struct RefreshHandle {
    task: JoinHandle<()>,
    shutdown: Arc<Notify>,
}

impl RefreshHandle {
    /// Signal the loop to stop and wait up to `timeout` for it to exit.
    ///
    /// A pass in progress is allowed to finish.
    pub async fn shutdown(self, timeout: Duration) -> Result<()> {
        self.shutdown.notify_one();
        match tokio::time::timeout(timeout, self.task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(join)) => Err(AppError::crawl("refresh task", join)),
            Err(_) => Err(AppError::Timeout {
                operation: "refresh shutdown".to_string(),
            }),
        }
    }
}
