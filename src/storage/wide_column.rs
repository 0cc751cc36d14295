//! Wide-column comment driver.
//!
//! Table layout:
//!
//! ```text
//! primary key   (SiteID, CommentID)
//! PostIndex     (SiteID, PostID)
//! attributes    PostID, Timestamp (unix ms), SourceAddress, Author, AuthorEmail,
//!               CommentBody, IsActive (0 | 1)
//! ```
//!
//! The driver turns a [`CommentFilter`] into a [`QueryPlan`] and hands it to a
//! [`WideColumnTable`]; the DynamoDB client lives in [`super::dynamodb`].

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_dynamo::aws_sdk_dynamodb_1::{from_item, to_item};
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::models::{Comment, CommentFilter};
use crate::storage::{CommentService, require_post, require_site};

/// A DynamoDB item.
pub type Item = HashMap<String, AttributeValue>;

/// Name of the secondary index on `(SiteID, PostID)`.
pub const POST_INDEX: &str = "PostIndex";

/// Which key a query runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyCondition {
    /// Primary key lookup
    Comment { site_id: String, comment_id: String },
    /// All comments of a post, through [`POST_INDEX`]
    Post { site_id: String, post_id: String },
}

/// A routed query: key condition plus optional `IsActive` filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    pub key: KeyCondition,
    pub is_active: Option<bool>,
}

impl QueryPlan {
    /// Route a filter.
    ///
    /// A comment ID goes to the primary key and the post ID is ignored; a post ID alone
    /// goes to [`POST_INDEX`]. A site-only filter has no key to query and is unsupported.
    pub fn route(filter: &CommentFilter) -> Result<Self> {
        let site_id = require_site(filter)?.to_string();
        let key = if let Some(comment_id) = filter.comment_id() {
            KeyCondition::Comment {
                site_id,
                comment_id: comment_id.to_string(),
            }
        } else if let Some(post_id) = filter.post_id() {
            KeyCondition::Post {
                site_id,
                post_id: post_id.to_string(),
            }
        } else {
            return Err(AppError::unsupported_filter(
                "wide-column storage needs a comment_id or post_id",
            ));
        };
        Ok(Self {
            key,
            is_active: filter.is_active,
        })
    }

    /// Every comment on a post, active or not.
    pub fn post(site_id: &str, post_id: &str) -> Self {
        Self {
            key: KeyCondition::Post {
                site_id: site_id.to_string(),
                post_id: post_id.to_string(),
            },
            is_active: None,
        }
    }

    pub fn index_name(&self) -> Option<&'static str> {
        match self.key {
            KeyCondition::Comment { .. } => None,
            KeyCondition::Post { .. } => Some(POST_INDEX),
        }
    }

    pub fn key_condition_expression(&self) -> &'static str {
        match self.key {
            KeyCondition::Comment { .. } => "SiteID = :siteID AND CommentID = :commentID",
            KeyCondition::Post { .. } => "SiteID = :siteID AND PostID = :postID",
        }
    }

    /// `IsActive` is never part of a key, only a post-read filter.
    pub fn filter_expression(&self) -> Option<&'static str> {
        self.is_active.map(|_| "IsActive = :isActive")
    }

    pub fn expression_values(&self) -> Item {
        let mut values = HashMap::new();
        match &self.key {
            KeyCondition::Comment {
                site_id,
                comment_id,
            } => {
                values.insert(":siteID".to_string(), AttributeValue::S(site_id.clone()));
                values.insert(
                    ":commentID".to_string(),
                    AttributeValue::S(comment_id.clone()),
                );
            }
            KeyCondition::Post { site_id, post_id } => {
                values.insert(":siteID".to_string(), AttributeValue::S(site_id.clone()));
                values.insert(":postID".to_string(), AttributeValue::S(post_id.clone()));
            }
        }
        if let Some(is_active) = self.is_active {
            values.insert(
                ":isActive".to_string(),
                AttributeValue::N(i64::from(is_active).to_string()),
            );
        }
        values
    }
}

/// The operations the driver needs from a wide-column table.
#[async_trait]
pub trait WideColumnTable: Send + Sync {
    fn engine(&self) -> &'static str {
        "dynamodb"
    }

    /// Write an item, replacing any item with the same primary key.
    async fn put_item(&self, item: Item) -> Result<()>;

    /// Every item the plan selects, across all pages.
    async fn query(&self, plan: &QueryPlan) -> Result<Vec<Item>>;

    /// Number of items the plan selects, across all pages.
    async fn count(&self, plan: &QueryPlan) -> Result<usize>;

    /// Delete by primary key, returning the old item if there was one.
    async fn delete_item(&self, site_id: &str, comment_id: &str) -> Result<Option<Item>>;
}

/// Comment as stored in the table.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StoredComment {
    #[serde(rename = "SiteID")]
    site_id: String,
    #[serde(rename = "CommentID")]
    comment_id: String,
    #[serde(rename = "PostID")]
    post_id: String,
    timestamp: i64,
    #[serde(default)]
    source_address: String,
    author: String,
    #[serde(default)]
    author_email: String,
    comment_body: String,
    is_active: i64,
}

impl From<&Comment> for StoredComment {
    fn from(c: &Comment) -> Self {
        Self {
            site_id: c.site_id.clone(),
            comment_id: c.comment_id.clone(),
            post_id: c.post_id.clone(),
            timestamp: c.timestamp.timestamp_millis(),
            source_address: c.source_address.clone(),
            author: c.author.clone(),
            author_email: c.author_email.clone(),
            comment_body: c.comment_body.clone(),
            is_active: i64::from(c.is_active),
        }
    }
}

impl TryFrom<StoredComment> for Comment {
    type Error = AppError;

    fn try_from(s: StoredComment) -> Result<Self> {
        let key = format!("{}/{}", s.site_id, s.comment_id);
        let timestamp = DateTime::from_timestamp_millis(s.timestamp).ok_or_else(|| {
            AppError::decode(&key, format!("Timestamp {} out of range", s.timestamp))
        })?;
        let is_active = match s.is_active {
            0 => false,
            1 => true,
            other => {
                return Err(AppError::decode(
                    &key,
                    format!("IsActive must be 0 or 1, got {other}"),
                ));
            }
        };
        Ok(Comment {
            comment_id: s.comment_id,
            site_id: s.site_id,
            post_id: s.post_id,
            timestamp,
            source_address: s.source_address,
            author: s.author,
            author_email: s.author_email,
            comment_body: s.comment_body,
            is_active,
        })
    }
}

/// Encode a comment as a table item.
pub fn encode(comment: &Comment) -> Result<Item> {
    to_item(StoredComment::from(comment))
        .map_err(|e| AppError::decode(format!("{}/{}", comment.site_id, comment.comment_id), e))
}

/// Decode a table item.
pub fn decode(item: Item) -> Result<Comment> {
    let key = item_key(&item);
    let stored: StoredComment = from_item(item).map_err(|e| {
        warn!(key = %key, error = %e, "undecodable comment item");
        AppError::decode(&key, e)
    })?;
    Comment::try_from(stored)
}

fn item_key(item: &Item) -> String {
    format!(
        "{}/{}",
        string_attr(item, "SiteID"),
        string_attr(item, "CommentID")
    )
}

fn string_attr<'a>(item: &'a Item, name: &str) -> &'a str {
    match item.get(name) {
        Some(AttributeValue::S(value)) => value.as_str(),
        _ => "?",
    }
}

/// [`CommentService`] over any [`WideColumnTable`].
pub struct WideColumnComments<T> {
    table: T,
}

impl<T: WideColumnTable> WideColumnComments<T> {
    pub fn new(table: T) -> Self {
        Self { table }
    }
}

#[async_trait]
impl<T: WideColumnTable> CommentService for WideColumnComments<T> {
    fn engine(&self) -> &'static str {
        self.table.engine()
    }

    async fn nr_comments(&self, filter: &CommentFilter) -> Result<usize> {
        let (site_id, post_id) = require_post(filter)?;
        self.table.count(&QueryPlan::post(site_id, post_id)).await
    }

    async fn upsert_comment(&self, comment: &Comment) -> Result<()> {
        self.table.put_item(encode(comment)?).await?;
        debug!(site_id = %comment.site_id, comment_id = %comment.comment_id, "upserted comment");
        Ok(())
    }

    async fn comments(&self, filter: &CommentFilter) -> Result<Vec<Comment>> {
        let plan = QueryPlan::route(filter)?;
        let mut comments = self
            .table
            .query(&plan)
            .await?
            .into_iter()
            .map(decode)
            .collect::<Result<Vec<_>>>()?;
        comments.sort_by(|a, b| {
            (a.timestamp, &a.comment_id).cmp(&(b.timestamp, &b.comment_id))
        });
        Ok(comments)
    }

    async fn delete_comment(&self, site_id: &str, comment_id: &str) -> Result<()> {
        match self.table.delete_item(site_id, comment_id).await? {
            Some(_) => {
                debug!(site_id, comment_id, "deleted comment");
                Ok(())
            }
            None => Err(AppError::not_found(site_id, comment_id)),
        }
    }
}
