// src/models/mod.rs

//! Domain models for the comment service.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod comment;
mod config;

// Re-export all public types
pub use comment::{Comment, CommentFilter, NewComment};
pub use config::{
    AdmissionConfig, Backend, Config, CrawlerConfig, LoggingConfig, StorageConfig,
};
