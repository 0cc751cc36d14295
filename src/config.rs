// src/config.rs

//! Configuration loading utilities.
//!
//! The TOML file is optional; missing values fall back to defaults and environment
//! variables override whatever the file says.

use std::path::Path;

use tracing::info;

use crate::error::Result;
use crate::models::Config;

/// Load configuration from `path` and apply environment overrides.
///
/// A missing file means defaults; a malformed one is an error.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        Config::load(path)?
    } else {
        info!(path = %path.display(), "no config file, using defaults");
        Config::default()
    };
    config.apply_env();
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use tempfile::TempDir;

    #[test]
    fn test_load_config_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("comments.toml");
        std::fs::write(
            &path,
            r#"
[storage]
local_dir = "/var/lib/comments"

[crawler]
hosts = ["blog.example.com"]
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        config.validate().unwrap();
        assert!(config.crawler.hosts.contains(&"blog.example.com".to_string()));
    }

    #[test]
    fn test_load_config_rejects_bad_toml() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("comments.toml");
        std::fs::write(&path, "[storage\n").unwrap();
        assert!(matches!(load_config(&path), Err(AppError::Toml(_))));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.admission.max_nr_comments, 100);
    }
}
