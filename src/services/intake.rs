// src/services/intake.rs

//! Comment intake service.
//!
//! Admission control in front of the storage facade: post validation, the known-post
//! check, the per-post cap, and redaction of public reads. Every storage call runs under
//! the configured deadline.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::models::{AdmissionConfig, Comment, CommentFilter, NewComment};
use crate::registry::KnownPosts;
use crate::storage::CommentService;
use crate::utils::validate::{is_valid_email, is_valid_post_id};

/// Write and read paths for visitors and administrators.
pub struct CommentIntake {
    store: Arc<dyn CommentService>,
    registry: Arc<KnownPosts>,
    config: AdmissionConfig,
}

impl CommentIntake {
    pub fn new(
        store: Arc<dyn CommentService>,
        registry: Arc<KnownPosts>,
        config: AdmissionConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// Admit a visitor's comment.
    ///
    /// The post must be well formed and known before storage is touched. The stored
    /// comment is inactive until an administrator activates it.
    pub async fn submit(&self, new: NewComment, source_address: &str) -> Result<Comment> {
        self.check_post(&new.site_id, &new.post_id)?;

        let on_post = CommentFilter::post(&new.site_id, &new.post_id);
        let nr = self
            .guarded("count", self.store.nr_comments(&on_post))
            .await?;
        if nr >= self.config.max_nr_comments {
            info!(
                site_id = %new.site_id,
                post_id = %new.post_id,
                nr,
                "discarding comment, post is at capacity"
            );
            return Err(AppError::CapacityExceeded {
                site_id: new.site_id,
                post_id: new.post_id,
                limit: self.config.max_nr_comments,
            });
        }

        let keep_email = is_valid_email(&new.author_email);
        let mut comment = Comment::create(new, source_address);
        if !keep_email {
            comment.author_email.clear();
        }

        self.guarded("upsert", self.store.upsert_comment(&comment))
            .await?;
        info!(
            site_id = %comment.site_id,
            post_id = %comment.post_id,
            comment_id = %comment.comment_id,
            "accepted comment"
        );
        Ok(comment)
    }

    /// Store a comment exactly as given (administrator edit).
    pub async fn admin_upsert(&self, comment: &Comment) -> Result<()> {
        self.check_post(&comment.site_id, &comment.post_id)?;
        if !is_valid_email(&comment.author_email) {
            return Err(AppError::validation(format!(
                "invalid author email {:?}",
                comment.author_email
            )));
        }
        self.guarded("upsert", self.store.upsert_comment(comment))
            .await
    }

    /// Active comments of one post, with private fields removed.
    pub async fn public_comments(&self, filter: CommentFilter) -> Result<Vec<Comment>> {
        if filter.site_and_post().is_none() {
            return Err(AppError::invalid_filter(
                "public reads need site_id and post_id",
            ));
        }
        let filter = filter.active(true);
        let comments = self
            .guarded("select", self.store.comments(&filter))
            .await?;
        Ok(comments.into_iter().map(Comment::redacted).collect())
    }

    /// Comments matching any filter the backend supports, unredacted.
    pub async fn admin_comments(&self, filter: &CommentFilter) -> Result<Vec<Comment>> {
        self.guarded("select", self.store.comments(filter)).await
    }

    /// Approve a comment. Returns the updated record.
    pub async fn activate(&self, site_id: &str, comment_id: &str) -> Result<Comment> {
        let found = self
            .guarded(
                "select",
                self.store.comments(&CommentFilter::comment(site_id, comment_id)),
            )
            .await?;
        let mut comment = found
            .into_iter()
            .next()
            .ok_or_else(|| AppError::not_found(site_id, comment_id))?;

        if !comment.is_active {
            comment.is_active = true;
            self.guarded("upsert", self.store.upsert_comment(&comment))
                .await?;
            info!(site_id, comment_id, "activated comment");
        }
        Ok(comment)
    }

    pub async fn delete(&self, site_id: &str, comment_id: &str) -> Result<()> {
        self.guarded("delete", self.store.delete_comment(site_id, comment_id))
            .await?;
        info!(site_id, comment_id, "deleted comment");
        Ok(())
    }

    fn check_post(&self, site_id: &str, post_id: &str) -> Result<()> {
        if !is_valid_post_id(post_id) {
            return Err(AppError::InvalidPostId(post_id.to_string()));
        }
        if !self.registry.is_known(site_id, post_id) {
            warn!(site_id, post_id, "rejecting comment for unknown post");
            return Err(AppError::UnknownPost {
                site_id: site_id.to_string(),
                post_id: post_id.to_string(),
            });
        }
        Ok(())
    }

    /// Run a storage call under the admission deadline.
    async fn guarded<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.config.storage_timeout(), call).await {
            Ok(result) => result.inspect_err(|error| {
                if error.is_client_error() {
                    debug!(engine = self.store.engine(), operation, %error, "storage call refused");
                } else {
                    warn!(engine = self.store.engine(), operation, %error, "storage call failed");
                }
            }),
            Err(_) => {
                warn!(engine = self.store.engine(), operation, "storage call timed out");
                Err(AppError::Timeout {
                    operation: format!("{} {operation}", self.store.engine()),
                })
            }
        }
    }
}
