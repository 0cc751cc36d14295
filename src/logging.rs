// src/logging.rs

//! Tracing subscriber setup.
//!
//! `RUST_LOG` takes precedence over the configured level. Output is either the plain
//! `fmt` format or one JSON object per line.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::error::{AppError, Result};
use crate::models::LoggingConfig;

/// Build the level filter for `config`.
pub fn filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            AppError::config(format!("invalid log level {:?}: {e}", config.level))
        }),
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if config.json {
        registry
            .with(fmt::layer().json().with_target(true))
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };
    installed.map_err(|e| AppError::config(format!("logging already initialized: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_accepts_levels() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        for level in ["info", "debug", "comments=trace,warn"] {
            let config = LoggingConfig {
                level: level.to_string(),
                json: false,
            };
            assert!(filter(&config).is_ok(), "{level}");
        }
    }

    #[test]
    fn test_filter_rejects_garbage() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = LoggingConfig {
            level: "comments=loud".to_string(),
            json: false,
        };
        assert!(matches!(filter(&config), Err(AppError::Config(_))));
    }
}
