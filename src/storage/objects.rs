//! Object-store comment driver.
//!
//! Each comment is one JSON object. The store only needs flat keys with prefix listing,
//! so the same driver runs over S3 and over a local directory.
//!
//! ## Key Layout
//!
//! ```text
//! {site_id}/
//! └── 2024/01/01/foo/        # post_id "/2024/01/01/foo" without its leading '/'
//!     ├── {comment_id}
//!     └── {comment_id}
//! ```
//!
//! Only canonical post ids (leading '/', no trailing '/') have a key, so each post id maps
//! to exactly one prefix and counting agrees with listing.

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::models::{Comment, CommentFilter};
use crate::storage::{CommentService, require_post, require_site};

/// Concurrent object fetches per listing.
const FETCH_CONCURRENCY: usize = 8;

/// Minimal key/value object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Short engine name for logs and errors.
    fn engine(&self) -> &'static str;

    /// Write an object, replacing any existing one.
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()>;

    /// Read an object, `None` if it does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Every key starting with `prefix`, in lexicographic order.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Remove an object. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// [`CommentService`] over any [`ObjectStore`].
pub struct ObjectCommentService<S> {
    store: S,
}

impl<S: ObjectStore> ObjectCommentService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Keys under `site/` whose last segment is `comment_id`.
    async fn keys_for_id(&self, site_id: &str, comment_id: &str) -> Result<Vec<String>> {
        let keys = self.store.list(&site_prefix(site_id)?).await?;
        Ok(keys
            .into_iter()
            .filter(|key| key.rsplit('/').next() == Some(comment_id))
            .collect())
    }

    /// Fetch and decode `keys`, keeping only what `filter` accepts.
    async fn load(&self, keys: Vec<String>, filter: &CommentFilter) -> Result<Vec<Comment>> {
        let loaded: Vec<Option<Comment>> = stream::iter(keys)
            .map(|key| async move {
                match self.store.get(&key).await? {
                    Some(body) => decode(&key, &body).map(Some),
                    None => {
                        // deleted between listing and fetch
                        debug!(key = %key, "object vanished during listing");
                        Ok(None)
                    }
                }
            })
            .buffered(FETCH_CONCURRENCY)
            .try_collect()
            .await?;

        Ok(loaded
            .into_iter()
            .flatten()
            .filter(|comment| filter.matches(comment))
            .collect())
    }
}

#[async_trait]
impl<S: ObjectStore> CommentService for ObjectCommentService<S> {
    fn engine(&self) -> &'static str {
        self.store.engine()
    }

    async fn nr_comments(&self, filter: &CommentFilter) -> Result<usize> {
        let (site_id, post_id) = require_post(filter)?;
        let prefix = post_prefix(site_id, post_id)?;
        let keys = self.store.list(&prefix).await?;
        Ok(direct_children(&prefix, keys).count())
    }

    async fn upsert_comment(&self, comment: &Comment) -> Result<()> {
        let key = comment_key(&comment.site_id, &comment.post_id, &comment.comment_id)?;
        let body = serde_json::to_vec(comment)?;
        let stale = self
            .keys_for_id(&comment.site_id, &comment.comment_id)
            .await?;

        self.store.put(&key, body).await?;
        for old in stale.into_iter().filter(|old| *old != key) {
            debug!(key = %old, "removing comment stored under a previous post");
            self.store.delete(&old).await?;
        }
        debug!(key = %key, "upserted comment");
        Ok(())
    }

    async fn comments(&self, filter: &CommentFilter) -> Result<Vec<Comment>> {
        let site_id = require_site(filter)?;

        let keys = if let Some(comment_id) = filter.comment_id() {
            check_segment("comment_id", comment_id)?;
            self.keys_for_id(site_id, comment_id).await?
        } else if let Some(post_id) = filter.post_id() {
            let prefix = post_prefix(site_id, post_id)?;
            let keys = self.store.list(&prefix).await?;
            direct_children(&prefix, keys).collect()
        } else {
            self.store.list(&site_prefix(site_id)?).await?
        };

        self.load(keys, filter).await
    }

    async fn delete_comment(&self, site_id: &str, comment_id: &str) -> Result<()> {
        check_segment("comment_id", comment_id)?;
        let keys = self.keys_for_id(site_id, comment_id).await?;
        if keys.is_empty() {
            return Err(AppError::not_found(site_id, comment_id));
        }
        for key in keys {
            self.store.delete(&key).await?;
            debug!(key = %key, "deleted comment");
        }
        Ok(())
    }
}

fn decode(key: &str, body: &[u8]) -> Result<Comment> {
    serde_json::from_slice(body).map_err(|e| {
        warn!(key, error = %e, "undecodable comment object");
        AppError::decode(key, e)
    })
}

/// Keys directly under `prefix`, skipping anything in deeper "directories".
fn direct_children(prefix: &str, keys: Vec<String>) -> impl Iterator<Item = String> + '_ {
    keys.into_iter().filter(move |key| {
        key.strip_prefix(prefix)
            .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
    })
}

/// Reject key segments that would escape or alias their place in the layout.
fn check_segment(what: &str, segment: &str) -> Result<()> {
    if segment.is_empty() || segment.contains('/') || segment.starts_with('.') {
        return Err(AppError::validation(format!(
            "{what} {segment:?} cannot be used in an object key"
        )));
    }
    Ok(())
}

fn site_prefix(site_id: &str) -> Result<String> {
    check_segment("site_id", site_id)?;
    Ok(format!("{site_id}/"))
}

fn post_prefix(site_id: &str, post_id: &str) -> Result<String> {
    let post = match post_id.strip_prefix('/') {
        Some(post) if !post.is_empty() && !post.ends_with('/') => post,
        _ => {
            return Err(AppError::validation(format!(
                "post_id {post_id:?} cannot be used in an object key"
            )));
        }
    };
    for segment in post.split('/') {
        check_segment("post_id", segment)?;
    }
    Ok(format!("{}{post}/", site_prefix(site_id)?))
}

fn comment_key(site_id: &str, post_id: &str, comment_id: &str) -> Result<String> {
    check_segment("comment_id", comment_id)?;
    Ok(format!("{}{comment_id}", post_prefix(site_id, post_id)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalObjects;
    use crate::storage::testing::{self, POST_A, POST_B, SITE, comment};
    use tempfile::TempDir;

    fn service(tmp: &TempDir) -> ObjectCommentService<LocalObjects> {
        ObjectCommentService::new(LocalObjects::new(tmp.path()))
    }

    #[test]
    fn test_comment_key() {
        assert_eq!(
            comment_key("blog.example.com", "/2024/01/01/foo", "c1").unwrap(),
            "blog.example.com/2024/01/01/foo/c1"
        );
        assert!(comment_key("blog.example.com", "/2024/01/01/foo/", "c1").is_err());
        assert!(comment_key("blog.example.com", "2024/01/01/foo", "c1").is_err());
        assert!(comment_key("blog.example.com", "//2024", "c1").is_err());
        assert!(comment_key("blog.example.com", "/2024/../x", "c1").is_err());
        assert!(comment_key("blog.example.com", "/", "c1").is_err());
        assert!(comment_key("a/b", "/p", "c1").is_err());
        assert!(comment_key("s", "/p", "").is_err());
    }

    #[test]
    fn test_direct_children() {
        let keys = vec![
            "s/2024/01/c1".to_string(),
            "s/2024/01/foo/c2".to_string(),
            "s/2024/01/c3".to_string(),
        ];
        let children: Vec<_> = direct_children("s/2024/01/", keys).collect();
        assert_eq!(children, vec!["s/2024/01/c1", "s/2024/01/c3"]);
    }

    #[tokio::test]
    async fn test_contract() {
        let tmp = TempDir::new().unwrap();
        testing::check_contract(&service(&tmp)).await;
    }

    #[tokio::test]
    async fn test_count_is_exact_with_nested_post() {
        let tmp = TempDir::new().unwrap();
        let svc = service(&tmp);
        svc.upsert_comment(&comment("/2024/01", "c1", 0)).await.unwrap();
        svc.upsert_comment(&comment("/2024/01/deeper", "c2", 1)).await.unwrap();

        let filter = CommentFilter::post(SITE, "/2024/01");
        assert_eq!(svc.nr_comments(&filter).await.unwrap(), 1);
        assert_eq!(svc.comments(&filter).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_post_id_spellings_do_not_share_a_prefix() {
        let tmp = TempDir::new().unwrap();
        let svc = service(&tmp);
        svc.upsert_comment(&comment(POST_A, "c1", 0)).await.unwrap();
        for spelling in ["2024/01/01/foo", "/2024/01/01/foo/"] {
            let result = svc.upsert_comment(&comment(spelling, "c2", 1)).await;
            assert!(matches!(result, Err(AppError::Validation(_))), "{spelling}");
            let filter = CommentFilter::post(SITE, spelling);
            assert!(svc.nr_comments(&filter).await.is_err(), "{spelling}");
            assert!(svc.comments(&filter).await.is_err(), "{spelling}");
        }

        let filter = CommentFilter::post(SITE, POST_A);
        assert_eq!(svc.nr_comments(&filter).await.unwrap(), 1);
        assert_eq!(svc.comments(&filter).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_moving_post_removes_stale_object() {
        let tmp = TempDir::new().unwrap();
        let svc = service(&tmp);
        let mut c = comment(POST_A, "c1", 0);
        svc.upsert_comment(&c).await.unwrap();
        c.post_id = POST_B.to_string();
        svc.upsert_comment(&c).await.unwrap();

        assert_eq!(svc.nr_comments(&CommentFilter::post(SITE, POST_A)).await.unwrap(), 0);
        assert_eq!(svc.nr_comments(&CommentFilter::post(SITE, POST_B)).await.unwrap(), 1);
        let all = svc.comments(&CommentFilter::site(SITE)).await.unwrap();
        assert_eq!(all, vec![c]);
    }

    #[tokio::test]
    async fn test_site_listing_in_key_order() {
        let tmp = TempDir::new().unwrap();
        let svc = service(&tmp);
        svc.upsert_comment(&comment(POST_B, "b1", 0)).await.unwrap();
        svc.upsert_comment(&comment(POST_A, "a2", 5)).await.unwrap();
        svc.upsert_comment(&comment(POST_A, "a1", 9)).await.unwrap();

        let all = svc.comments(&CommentFilter::site(SITE)).await.unwrap();
        let ids: Vec<_> = all.iter().map(|c| c.comment_id.as_str()).collect();
        // "2024/01/01/foo" sorts before "2024/01/02/bar"
        assert_eq!(ids, vec!["a1", "a2", "b1"]);
    }

    #[tokio::test]
    async fn test_undecodable_object() {
        let tmp = TempDir::new().unwrap();
        let svc = service(&tmp);
        svc.store()
            .put("blog.example.com/2024/01/01/foo/bad", b"not json".to_vec())
            .await
            .unwrap();

        let result = svc.comments(&CommentFilter::post(SITE, POST_A)).await;
        assert!(matches!(result, Err(AppError::DecodeFailure { .. })));
    }
}
