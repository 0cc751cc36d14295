// src/error.rs

//! Unified error handling for the comment service.

use std::fmt;

use thiserror::Error;

/// Result type alias for comment service operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A filter is missing a field the operation requires
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// The active backend cannot express this filter shape
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// Delete or lookup target does not exist
    #[error("Comment {comment_id} not found for site {site_id}")]
    NotFound { site_id: String, comment_id: String },

    /// Connection, auth or service failure in the storage engine
    #[error("{engine} {operation} failed: {message}")]
    BackendUnavailable {
        engine: &'static str,
        operation: String,
        message: String,
    },

    /// Stored record does not decode to a comment
    #[error("Failed to decode {key}: {message}")]
    DecodeFailure { key: String, message: String },

    /// Post identifier outside the accepted character set
    #[error("Invalid post ID: {0:?}")]
    InvalidPostId(String),

    /// Post is not in the known-post registry
    #[error("Unknown post {post_id} on site {site_id}")]
    UnknownPost { site_id: String, post_id: String },

    /// Post already holds the maximum number of comments
    #[error("Post {post_id} on site {site_id} reached the limit of {limit} comments")]
    CapacityExceeded {
        site_id: String,
        post_id: String,
        limit: usize,
    },

    /// Storage call exceeded its deadline
    #[error("Timed out during {operation}")]
    Timeout { operation: String },

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Crawling error
    #[error("Crawl error for {context}: {message}")]
    Crawl { context: String, message: String },
}

impl AppError {
    /// Create an invalid filter error.
    pub fn invalid_filter(message: impl Into<String>) -> Self {
        Self::InvalidFilter(message.into())
    }

    /// Create an unsupported filter error.
    pub fn unsupported_filter(message: impl Into<String>) -> Self {
        Self::UnsupportedFilter(message.into())
    }

    /// Create a not found error for a comment identity.
    pub fn not_found(site_id: impl Into<String>, comment_id: impl Into<String>) -> Self {
        Self::NotFound {
            site_id: site_id.into(),
            comment_id: comment_id.into(),
        }
    }

    /// Create a backend failure with operation context.
    pub fn backend(
        engine: &'static str,
        operation: impl Into<String>,
        message: impl fmt::Display,
    ) -> Self {
        Self::BackendUnavailable {
            engine,
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Create a decode failure for a stored record.
    pub fn decode(key: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::DecodeFailure {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a crawl error with context.
    pub fn crawl(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Crawl {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Whether the error was caused by the caller's input rather than the backend.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidFilter(_)
                | Self::UnsupportedFilter(_)
                | Self::NotFound { .. }
                | Self::InvalidPostId(_)
                | Self::UnknownPost { .. }
                | Self::CapacityExceeded { .. }
                | Self::Validation(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_display() {
        let err = AppError::backend("sqlite", "delete", "disk I/O error");
        assert_eq!(err.to_string(), "sqlite delete failed: disk I/O error");
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_client_errors() {
        assert!(AppError::invalid_filter("need site").is_client_error());
        assert!(AppError::not_found("example.com", "abc").is_client_error());
        assert!(
            AppError::UnknownPost {
                site_id: "example.com".into(),
                post_id: "/2024/01/01/foo".into(),
            }
            .is_client_error()
        );
    }
}
