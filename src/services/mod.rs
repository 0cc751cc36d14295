//! Service layer for the comment service.
//!
//! This module contains the business logic for:
//! - Post discovery (`PostCrawler`)
//! - Comment admission and moderation (`CommentIntake`)

mod crawler;
mod intake;

pub use crawler::{CrawlOutcome, PostCrawler, extract_post_ids};
pub use intake::CommentIntake;
