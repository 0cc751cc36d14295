//! Storage abstractions for comment persistence.
//!
//! One logical contract, [`CommentService`], backed by one of three engines:
//!
//! ```text
//! sqlite     comments table keyed by comment_id
//! objects    {site}/{post}/{comment_id}  -> comment JSON   (S3 or a local directory)
//! dynamodb   (SiteID, CommentID) + PostIndex (SiteID, PostID)
//! ```
//!
//! Exactly one engine is active per deployment. [`open`] resolves it from configuration.

pub mod local;
pub mod objects;
#[cfg(feature = "s3")]
pub mod s3;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "dynamodb")]
pub mod dynamodb;
#[cfg(feature = "dynamodb")]
pub mod wide_column;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::error::{AppError, Result};
use crate::models::{Backend, Comment, CommentFilter, StorageConfig};

// Re-export for convenience
pub use local::LocalObjects;
pub use objects::{ObjectCommentService, ObjectStore};
#[cfg(feature = "s3")]
pub use s3::S3Objects;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteComments;
#[cfg(feature = "dynamodb")]
pub use wide_column::{WideColumnComments, WideColumnTable};

/// Trait for comment storage backends.
///
/// Every driver matches the same records for the same filter; only the order of results
/// is engine specific (but stable).
#[async_trait]
pub trait CommentService: Send + Sync {
    /// Short engine name for logs and errors.
    fn engine(&self) -> &'static str;

    /// Number of comments on one post, active or not.
    ///
    /// The filter must carry `site_id` and `post_id`.
    async fn nr_comments(&self, filter: &CommentFilter) -> Result<usize>;

    /// Insert or replace a comment keyed by its id. Last write wins.
    async fn upsert_comment(&self, comment: &Comment) -> Result<()>;

    /// Comments matching `filter`.
    ///
    /// `site_id` is always required. `comment_id`, when present, is a direct lookup and
    /// `post_id` is ignored. No match is an empty vector.
    async fn comments(&self, filter: &CommentFilter) -> Result<Vec<Comment>>;

    /// Delete one comment. [`AppError::NotFound`] when nothing matched.
    async fn delete_comment(&self, site_id: &str, comment_id: &str) -> Result<()>;
}

/// Open the storage backend named by `config`.
pub async fn open(config: &StorageConfig) -> Result<Arc<dyn CommentService>> {
    let backend = config.backend()?;
    info!(engine = backend.name(), "opening comment storage");

    match backend {
        #[cfg(feature = "sqlite")]
        Backend::Sqlite { path } => Ok(Arc::new(SqliteComments::open(path).await?)),

        #[cfg(feature = "s3")]
        Backend::S3 {
            bucket,
            region,
            prefix,
        } => {
            let store = S3Objects::connect(bucket, region, prefix).await;
            Ok(Arc::new(ObjectCommentService::new(store)))
        }

        Backend::LocalObjects { root } => {
            Ok(Arc::new(ObjectCommentService::new(LocalObjects::new(root))))
        }

        #[cfg(feature = "dynamodb")]
        Backend::DynamoDb {
            table,
            region,
            endpoint,
        } => {
            let table = dynamodb::DynamoTable::connect(table, region, endpoint).await;
            Ok(Arc::new(WideColumnComments::new(table)))
        }

        #[allow(unreachable_patterns)]
        other => Err(AppError::config(format!(
            "storage backend {} is not compiled in; enable the \"{}\" feature",
            other.name(),
            other.name()
        ))),
    }
}

/// The `site_id` a listing needs, or [`AppError::InvalidFilter`].
pub(crate) fn require_site(filter: &CommentFilter) -> Result<&str> {
    filter
        .site_id()
        .ok_or_else(|| AppError::invalid_filter("site_id is required"))
}

/// The `(site_id, post_id)` a count needs, or [`AppError::InvalidFilter`].
pub(crate) fn require_post(filter: &CommentFilter) -> Result<(&str, &str)> {
    filter
        .site_and_post()
        .ok_or_else(|| AppError::invalid_filter("site_id and post_id are required"))
}
