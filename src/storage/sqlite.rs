//! SQLite storage implementation.
//!
//! One `comments` table keyed by `comment_id`. The connection lives behind a mutex and
//! every statement runs on the blocking pool.
//!
//! ## Table Layout
//!
//! ```text
//! comments(comment_id TEXT PRIMARY KEY, site_id, post_id, timestamp (unix ms),
//!          source_address, author, author_email, comment, is_active 0|1)
//! ```

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::DateTime;
use rusqlite::types::Value;
use rusqlite::{Connection, params, params_from_iter};
use tracing::{debug, error};

use crate::error::{AppError, Result};
use crate::models::{Comment, CommentFilter};
use crate::storage::{CommentService, require_post, require_site};

const ENGINE: &str = "sqlite";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS comments (
    comment_id     TEXT PRIMARY KEY,
    site_id        TEXT NOT NULL,
    post_id        TEXT NOT NULL,
    timestamp      TIMESTAMP NOT NULL,
    source_address TEXT NOT NULL DEFAULT '',
    author         TEXT NOT NULL,
    author_email   TEXT NOT NULL DEFAULT '',
    comment        TEXT NOT NULL,
    is_active      INTEGER NOT NULL DEFAULT 0 CHECK (is_active IN (0, 1))
);
CREATE INDEX IF NOT EXISTS comments_by_post ON comments (site_id, post_id);
";

const COLUMNS: &str = "comment_id, site_id, post_id, timestamp, source_address, author, \
                       author_email, comment, is_active";

/// Relational comment store in a single SQLite file.
#[derive(Clone)]
pub struct SqliteComments {
    conn: Arc<Mutex<Connection>>,
}

/// A row as stored, before conversion to a [`Comment`].
struct CommentRow {
    comment_id: String,
    site_id: String,
    post_id: String,
    timestamp: i64,
    source_address: String,
    author: String,
    author_email: String,
    comment: String,
    is_active: i64,
}

impl CommentRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            comment_id: row.get(0)?,
            site_id: row.get(1)?,
            post_id: row.get(2)?,
            timestamp: row.get(3)?,
            source_address: row.get(4)?,
            author: row.get(5)?,
            author_email: row.get(6)?,
            comment: row.get(7)?,
            is_active: row.get(8)?,
        })
    }

    fn into_comment(self) -> Result<Comment> {
        let timestamp = DateTime::from_timestamp_millis(self.timestamp).ok_or_else(|| {
            AppError::decode(&self.comment_id, format!("timestamp {} out of range", self.timestamp))
        })?;
        let is_active = match self.is_active {
            0 => false,
            1 => true,
            other => {
                return Err(AppError::decode(
                    &self.comment_id,
                    format!("is_active must be 0 or 1, got {other}"),
                ));
            }
        };
        Ok(Comment {
            comment_id: self.comment_id,
            site_id: self.site_id,
            post_id: self.post_id,
            timestamp,
            source_address: self.source_address,
            author: self.author,
            author_email: self.author_email,
            comment_body: self.comment,
            is_active,
        })
    }
}

impl SqliteComments {
    /// Open (or create) the database at `path` and make sure the table exists.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let db_path = path.clone();
        let conn = tokio::task::spawn_blocking(move || -> rusqlite::Result<Connection> {
            let conn = Connection::open(&db_path)?;
            conn.execute_batch(SCHEMA)?;
            Ok(conn)
        })
        .await
        .map_err(|e| AppError::backend(ENGINE, "open", e))?
        .map_err(|e| AppError::backend(ENGINE, "open", e))?;

        debug!(path = %path.display(), "opened comment database");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let result = tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&conn)
        })
        .await
        .map_err(|e| AppError::backend(ENGINE, operation, e))?;

        result.map_err(|e| {
            error!(operation, error = %e, "sqlite statement failed");
            AppError::backend(ENGINE, operation, e)
        })
    }
}

/// Build the `WHERE` clause and its bound parameters for a listing.
fn where_clause(filter: &CommentFilter) -> Result<(String, Vec<Value>)> {
    let site_id = require_site(filter)?;
    let mut clauses = vec!["site_id = ?"];
    let mut values = vec![Value::from(site_id.to_string())];

    if let Some(comment_id) = filter.comment_id() {
        clauses.push("comment_id = ?");
        values.push(Value::from(comment_id.to_string()));
    } else if let Some(post_id) = filter.post_id() {
        clauses.push("post_id = ?");
        values.push(Value::from(post_id.to_string()));
    }
    if let Some(is_active) = filter.is_active {
        clauses.push("is_active = ?");
        values.push(Value::from(i64::from(is_active)));
    }

    Ok((clauses.join(" AND "), values))
}

#[async_trait]
impl CommentService for SqliteComments {
    fn engine(&self) -> &'static str {
        ENGINE
    }

    async fn nr_comments(&self, filter: &CommentFilter) -> Result<usize> {
        let (site_id, post_id) = require_post(filter)?;
        let (site_id, post_id) = (site_id.to_string(), post_id.to_string());

        let count: i64 = self
            .with_conn("count", move |conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM comments WHERE site_id = ?1 AND post_id = ?2",
                    params![site_id, post_id],
                    |row| row.get(0),
                )
            })
            .await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn upsert_comment(&self, comment: &Comment) -> Result<()> {
        let c = comment.clone();
        self.with_conn("upsert", move |conn| {
            conn.execute(
                &format!(
                    "INSERT OR REPLACE INTO comments ({COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                ),
                params![
                    c.comment_id,
                    c.site_id,
                    c.post_id,
                    c.timestamp.timestamp_millis(),
                    c.source_address,
                    c.author,
                    c.author_email,
                    c.comment_body,
                    i64::from(c.is_active),
                ],
            )
        })
        .await?;
        debug!(site_id = %comment.site_id, comment_id = %comment.comment_id, "upserted comment");
        Ok(())
    }

    async fn comments(&self, filter: &CommentFilter) -> Result<Vec<Comment>> {
        let (clause, values) = where_clause(filter)?;
        let sql = format!(
            "SELECT {COLUMNS} FROM comments WHERE {clause} ORDER BY timestamp, comment_id"
        );

        let rows = self
            .with_conn("select", move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(values), CommentRow::read)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            })
            .await?;

        rows.into_iter().map(CommentRow::into_comment).collect()
    }

    async fn delete_comment(&self, site_id: &str, comment_id: &str) -> Result<()> {
        let (site, id) = (site_id.to_string(), comment_id.to_string());
        let affected = self
            .with_conn("delete", move |conn| {
                conn.execute(
                    "DELETE FROM comments WHERE site_id = ?1 AND comment_id = ?2",
                    params![site, id],
                )
            })
            .await?;

        if affected == 0 {
            return Err(AppError::not_found(site_id, comment_id));
        }
        debug!(site_id, comment_id, "deleted comment");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::testing::{self, POST_A, POST_B, SITE, comment};
    use tempfile::TempDir;

    async fn open_temp() -> (TempDir, SqliteComments) {
        let tmp = TempDir::new().unwrap();
        let db = SqliteComments::open(tmp.path().join("data/comments.db"))
            .await
            .unwrap();
        (tmp, db)
    }

    #[tokio::test]
    async fn test_contract() {
        let (_tmp, db) = open_temp().await;
        testing::check_contract(&db).await;
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let (_tmp, db) = open_temp().await;
        let result = db.delete_comment(SITE, "nope").await;
        assert!(matches!(result, Err(AppError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_site_listing_is_ordered_by_time() {
        let (_tmp, db) = open_temp().await;
        db.upsert_comment(&comment(POST_B, "a-late", 50)).await.unwrap();
        db.upsert_comment(&comment(POST_A, "z-early", 0)).await.unwrap();
        db.upsert_comment(&comment(POST_A, "m-tie", 50)).await.unwrap();

        let all = db.comments(&CommentFilter::site(SITE)).await.unwrap();
        let ids: Vec<_> = all.iter().map(|c| c.comment_id.as_str()).collect();
        assert_eq!(ids, vec!["z-early", "a-late", "m-tie"]);
    }

    #[tokio::test]
    async fn test_reopen_keeps_data() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("comments.db");
        {
            let db = SqliteComments::open(&path).await.unwrap();
            db.upsert_comment(&comment(POST_A, "c1", 0)).await.unwrap();
        }
        let db = SqliteComments::open(&path).await.unwrap();
        assert_eq!(
            db.nr_comments(&CommentFilter::post(SITE, POST_A)).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_corrupt_is_active_is_decode_failure() {
        let (_tmp, db) = open_temp().await;
        db.upsert_comment(&comment(POST_A, "c1", 0)).await.unwrap();
        db.with_conn("corrupt", |conn| {
            conn.execute_batch(
                "PRAGMA ignore_check_constraints = ON;
                 UPDATE comments SET is_active = 7 WHERE comment_id = 'c1';",
            )
        })
        .await
        .unwrap();

        let result = db.comments(&CommentFilter::comment(SITE, "c1")).await;
        assert!(matches!(result, Err(AppError::DecodeFailure { .. })));
    }
}
