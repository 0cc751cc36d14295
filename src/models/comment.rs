// src/models/comment.rs

//! Comment record, submission payload, and query filter.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stored comment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    /// Server-generated unique identifier
    #[serde(rename = "commentID")]
    pub comment_id: String,

    /// Site the comment belongs to (the blog's host name)
    #[serde(rename = "siteID")]
    pub site_id: String,

    /// Post path on the site
    #[serde(rename = "postID")]
    pub post_id: String,

    /// Creation time, millisecond precision
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    /// Address the comment was submitted from
    #[serde(default)]
    pub source_address: String,

    /// Display name of the author
    pub author: String,

    /// Author contact address (empty when not supplied or invalid)
    #[serde(default)]
    pub author_email: String,

    /// Comment text
    pub comment_body: String,

    /// Whether an administrator has approved the comment
    #[serde(default)]
    pub is_active: bool,
}

impl Comment {
    /// Build a fresh, inactive comment for a post.
    ///
    /// The identifier is a new UUID and the timestamp is the current time truncated to
    /// milliseconds, which is the precision every backend stores.
    pub fn create(new: NewComment, source_address: impl Into<String>) -> Self {
        Self {
            comment_id: Uuid::new_v4().to_string(),
            site_id: new.site_id,
            post_id: new.post_id,
            timestamp: Utc::now().trunc_subsecs(3),
            source_address: source_address.into(),
            author: new.author,
            author_email: new.author_email,
            comment_body: new.comment_body,
            is_active: false,
        }
    }

    /// Strip fields that must not leave the service on public reads.
    pub fn redacted(mut self) -> Self {
        self.author_email.clear();
        self.source_address.clear();
        self
    }
}

/// A comment as submitted by a visitor, before the server assigns identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewComment {
    #[serde(rename = "siteID")]
    pub site_id: String,
    #[serde(rename = "postID")]
    pub post_id: String,
    pub author: String,
    #[serde(rename = "authorEmail", default)]
    pub author_email: String,
    #[serde(rename = "commentBody")]
    pub comment_body: String,
}

/// Query filter shared by counting and listing.
///
/// Every field is optional; an absent (or empty) field places no constraint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommentFilter {
    #[serde(rename = "commentID", default)]
    pub comment_id: Option<String>,
    #[serde(rename = "siteID", default)]
    pub site_id: Option<String>,
    #[serde(rename = "postID", default)]
    pub post_id: Option<String>,
    #[serde(rename = "isActive", default)]
    pub is_active: Option<bool>,
}

impl CommentFilter {
    /// Filter for every comment on a site.
    pub fn site(site_id: impl Into<String>) -> Self {
        Self {
            site_id: Some(site_id.into()),
            ..Self::default()
        }
    }

    /// Filter for the comments on one post.
    pub fn post(site_id: impl Into<String>, post_id: impl Into<String>) -> Self {
        Self {
            site_id: Some(site_id.into()),
            post_id: Some(post_id.into()),
            ..Self::default()
        }
    }

    /// Filter for a single comment.
    pub fn comment(site_id: impl Into<String>, comment_id: impl Into<String>) -> Self {
        Self {
            site_id: Some(site_id.into()),
            comment_id: Some(comment_id.into()),
            ..Self::default()
        }
    }

    /// Narrow the filter by activation state.
    pub fn active(mut self, is_active: bool) -> Self {
        self.is_active = Some(is_active);
        self
    }

    pub fn site_id(&self) -> Option<&str> {
        non_empty(&self.site_id)
    }

    pub fn post_id(&self) -> Option<&str> {
        non_empty(&self.post_id)
    }

    pub fn comment_id(&self) -> Option<&str> {
        non_empty(&self.comment_id)
    }

    /// Site and post, as required by counting.
    pub fn site_and_post(&self) -> Option<(&str, &str)> {
        Some((self.site_id()?, self.post_id()?))
    }

    /// Whether a decoded comment satisfies this filter.
    ///
    /// Mirrors the routing rules of the drivers: a comment ID makes the post ID irrelevant.
    pub fn matches(&self, comment: &Comment) -> bool {
        if self.site_id().is_some_and(|s| s != comment.site_id) {
            return false;
        }
        match self.comment_id() {
            Some(id) => {
                if id != comment.comment_id {
                    return false;
                }
            }
            None => {
                if self.post_id().is_some_and(|p| p != comment.post_id) {
                    return false;
                }
            }
        }
        self.is_active.is_none_or(|a| a == comment.is_active)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_comment() -> Comment {
        Comment {
            comment_id: "c1".to_string(),
            site_id: "example.com".to_string(),
            post_id: "/2024/01/01/foo".to_string(),
            timestamp: DateTime::from_timestamp_millis(1_704_067_200_123).unwrap(),
            source_address: "203.0.113.7".to_string(),
            author: "Ada".to_string(),
            author_email: "ada@example.com".to_string(),
            comment_body: "Nice post".to_string(),
            is_active: false,
        }
    }

    #[test]
    fn test_json_field_names() {
        let json = serde_json::to_value(sample_comment()).unwrap();
        assert_eq!(json["commentID"], "c1");
        assert_eq!(json["siteID"], "example.com");
        assert_eq!(json["postID"], "/2024/01/01/foo");
        assert_eq!(json["timestamp"], 1_704_067_200_123i64);
        assert_eq!(json["sourceAddress"], "203.0.113.7");
        assert_eq!(json["authorEmail"], "ada@example.com");
        assert_eq!(json["commentBody"], "Nice post");
        assert_eq!(json["isActive"], false);
    }

    #[test]
    fn test_create_is_inactive_with_ms_timestamp() {
        let new = NewComment {
            site_id: "example.com".into(),
            post_id: "/2024/01/01/foo".into(),
            author: "Ada".into(),
            author_email: "ada@example.com".into(),
            comment_body: "Hi".into(),
        };
        let a = Comment::create(new.clone(), "127.0.0.1");
        let b = Comment::create(new, "127.0.0.1");

        assert!(!a.is_active);
        assert_ne!(a.comment_id, b.comment_id);
        assert_eq!(a.timestamp.timestamp_subsec_nanos() % 1_000_000, 0);
    }

    #[test]
    fn test_redacted() {
        let c = sample_comment().redacted();
        assert!(c.author_email.is_empty());
        assert!(c.source_address.is_empty());
        assert_eq!(c.author, "Ada");
    }

    #[test]
    fn test_empty_fields_are_absent() {
        let filter = CommentFilter {
            site_id: Some("example.com".into()),
            post_id: Some(String::new()),
            ..CommentFilter::default()
        };
        assert_eq!(filter.post_id(), None);
        assert_eq!(filter.site_and_post(), None);
    }

    #[test]
    fn test_matches_comment_id_ignores_post() {
        let c = sample_comment();
        let mut filter = CommentFilter::comment("example.com", "c1");
        filter.post_id = Some("/other".into());
        assert!(filter.matches(&c));
        assert!(!filter.clone().active(true).matches(&c));
        assert!(!CommentFilter::post("example.com", "/other").matches(&c));
    }

    #[test]
    fn test_filter_deserialize_partial() {
        let filter: CommentFilter =
            serde_json::from_str(r#"{"siteID":"example.com","postID":"/2024/x"}"#).unwrap();
        assert_eq!(filter.site_and_post(), Some(("example.com", "/2024/x")));
        assert_eq!(filter.is_active, None);
    }
}
