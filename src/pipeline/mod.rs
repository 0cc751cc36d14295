//! Background pipeline for the known-post registry.
//!
//! - `KnownPostRefresher`: startup crawl plus periodic re-crawl of every configured blog

pub mod refresh;

pub use refresh::{KnownPostRefresher, RefreshHandle, RefreshReport};
