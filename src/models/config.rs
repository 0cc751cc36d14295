//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Storage backend connection parameters
    #[serde(default)]
    pub storage: StorageConfig,

    /// Known-post crawling behavior
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Write-path admission limits
    #[serde(default)]
    pub admission: AdmissionConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!(
                path = %path.as_ref().display(),
                error = %e,
                "config load failed, using defaults"
            );
            Self::default()
        })
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(path) = var("SQLITE_PATH") {
            self.storage.sqlite_path = Some(PathBuf::from(path));
        }
        if let Some(bucket) = var("S3_BUCKET") {
            self.storage.s3_bucket = Some(bucket);
        }
        if let Some(region) = var("S3_REGION") {
            self.storage.s3_region = Some(region);
        }
        if let Some(table) = var("DYNAMODB_TABLE") {
            self.storage.dynamodb_table = Some(table);
        }
        if let Some(region) = var("DYNAMODB_REGION") {
            self.storage.dynamodb_region = Some(region);
        }
        if let Some(host) = var("COMMENT_HOST") {
            if !self.crawler.hosts.contains(&host) {
                self.crawler.hosts.push(host);
            }
        }
        if let Some(max) = var("MAX_NR_COMMENTS").and_then(|v| v.parse().ok()) {
            self.admission.max_nr_comments = max;
        }
        if let Some(secs) = var("CRAWL_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.crawler.timeout_secs = secs;
        }
        if let Some(level) = var("LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        self.validate_crawler()?;
        if self.admission.max_nr_comments == 0 {
            return Err(AppError::validation("admission.max_nr_comments must be > 0"));
        }
        if self.admission.storage_timeout_secs == 0 {
            return Err(AppError::validation(
                "admission.storage_timeout_secs must be > 0",
            ));
        }
        self.storage.backend()?;
        Ok(())
    }

    /// The checks that matter when only crawling, with no storage backend involved.
    pub fn validate_crawler(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.refresh_interval_secs == 0 {
            return Err(AppError::validation(
                "crawler.refresh_interval_secs must be > 0",
            ));
        }
        if self.crawler.index_paths.is_empty() {
            return Err(AppError::validation("crawler.index_paths is empty"));
        }
        Ok(())
    }
}

/// The storage engine selected for a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// Relational store in a SQLite file
    Sqlite { path: PathBuf },
    /// Object store in an S3 bucket
    S3 {
        bucket: String,
        region: String,
        prefix: Option<String>,
    },
    /// Object store in a local directory
    LocalObjects { root: PathBuf },
    /// Wide-column store in a DynamoDB table
    DynamoDb {
        table: String,
        region: String,
        endpoint: Option<String>,
    },
}

impl Backend {
    /// Short engine name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Sqlite { .. } => "sqlite",
            Backend::S3 { .. } => "s3",
            Backend::LocalObjects { .. } => "local",
            Backend::DynamoDb { .. } => "dynamodb",
        }
    }
}

/// Storage connection parameters. Exactly one backend must be configured.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub sqlite_path: Option<PathBuf>,

    #[serde(default)]
    pub s3_bucket: Option<String>,
    #[serde(default)]
    pub s3_region: Option<String>,
    /// Optional key prefix inside the bucket
    #[serde(default)]
    pub s3_prefix: Option<String>,

    /// Directory used as an object store (development)
    #[serde(default)]
    pub local_dir: Option<PathBuf>,

    #[serde(default)]
    pub dynamodb_table: Option<String>,
    #[serde(default)]
    pub dynamodb_region: Option<String>,
    /// Endpoint override, e.g. DynamoDB Local or Alternator
    #[serde(default)]
    pub dynamodb_endpoint: Option<String>,
}

impl StorageConfig {
    /// Resolve the single configured backend.
    pub fn backend(&self) -> Result<Backend> {
        let mut found = Vec::new();

        if let Some(path) = &self.sqlite_path {
            found.push(Backend::Sqlite { path: path.clone() });
        }
        match (&self.s3_bucket, &self.s3_region) {
            (Some(bucket), Some(region)) => found.push(Backend::S3 {
                bucket: bucket.clone(),
                region: region.clone(),
                prefix: self.s3_prefix.clone(),
            }),
            (None, None) => {}
            _ => {
                return Err(AppError::config(
                    "S3 storage needs both s3_bucket and s3_region",
                ));
            }
        }
        if let Some(root) = &self.local_dir {
            found.push(Backend::LocalObjects { root: root.clone() });
        }
        match (&self.dynamodb_table, &self.dynamodb_region) {
            (Some(table), Some(region)) => found.push(Backend::DynamoDb {
                table: table.clone(),
                region: region.clone(),
                endpoint: self.dynamodb_endpoint.clone(),
            }),
            (None, None) => {}
            _ => {
                return Err(AppError::config(
                    "DynamoDB storage needs both dynamodb_table and dynamodb_region",
                ));
            }
        }

        match found.len() {
            0 => Err(AppError::config("no storage backend configured")),
            1 => Ok(found.remove(0)),
            _ => Err(AppError::config(format!(
                "storage backends are mutually exclusive, found: {}",
                found.iter().map(Backend::name).collect::<Vec<_>>().join(", ")
            ))),
        }
    }
}

/// HTTP client and crawling behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Blog hosts whose posts accept comments
    #[serde(default)]
    pub hosts: Vec<String>,

    /// Index pages fetched on every host
    #[serde(default = "defaults::index_paths")]
    pub index_paths: Vec<String>,

    /// Links must start with this to be considered posts
    #[serde(default = "defaults::post_prefix")]
    pub post_prefix: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Seconds between background refreshes
    #[serde(default = "defaults::refresh_interval")]
    pub refresh_interval_secs: u64,
}

impl CrawlerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            index_paths: defaults::index_paths(),
            post_prefix: defaults::post_prefix(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            refresh_interval_secs: defaults::refresh_interval(),
        }
    }
}

/// Write-path admission settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Maximum comments stored per post
    #[serde(default = "defaults::max_nr_comments")]
    pub max_nr_comments: usize,

    /// Deadline for each storage call made on behalf of a request
    #[serde(default = "defaults::storage_timeout")]
    pub storage_timeout_secs: u64,
}

impl AdmissionConfig {
    pub fn storage_timeout(&self) -> Duration {
        Duration::from_secs(self.storage_timeout_secs)
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_nr_comments: defaults::max_nr_comments(),
            storage_timeout_secs: defaults::storage_timeout(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset
    #[serde(default = "defaults::log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
            json: false,
        }
    }
}

mod defaults {
    pub fn index_paths() -> Vec<String> {
        vec!["/".into()]
    }
    pub fn post_prefix() -> String {
        "/2".into()
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; comments/0.1)".into()
    }
    pub fn timeout() -> u64 {
        10
    }
    pub fn refresh_interval() -> u64 {
        300
    }
    pub fn max_nr_comments() -> usize {
        100
    }
    pub fn storage_timeout() -> u64 {
        5
    }
    pub fn log_level() -> String {
        "info".into()
    }
}
