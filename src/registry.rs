// src/registry.rs

//! In-memory registry of known `(site, post)` pairs.
//!
//! The crawler is the only writer; every comment write reads it. A single `RwLock` guards
//! the whole map and is never held across I/O or an `.await`, so readers and the crawler
//! only ever wait on short in-memory operations.
//!
//! Entries are only added. A site's set is never cleared by a re-crawl, so a post that was
//! seen once stays known until the process restarts.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

/// Two-level set of `site_id -> {post_id}`.
#[derive(Debug, Default)]
pub struct KnownPosts {
    sites: RwLock<HashMap<String, HashSet<String>>>,
}

impl KnownPosts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `post_id` on `site_id` has been seen by the crawler.
    pub fn is_known(&self, site_id: &str, post_id: &str) -> bool {
        self.read()
            .get(site_id)
            .is_some_and(|posts| posts.contains(post_id))
    }

    /// Record a post. Returns `true` if it was not known before.
    pub fn set_known(&self, site_id: &str, post_id: &str) -> bool {
        let inserted = self
            .write()
            .entry(site_id.to_string())
            .or_default()
            .insert(post_id.to_string());
        if inserted {
            debug!(site_id, post_id, "setting known post");
        }
        inserted
    }

    /// Record many posts for one site under a single lock acquisition.
    ///
    /// Returns how many were new.
    pub fn extend<I, S>(&self, site_id: &str, post_ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut sites = self.write();
        let posts = sites.entry(site_id.to_string()).or_default();
        let mut added = 0;
        for post_id in post_ids {
            if posts.insert(post_id.into()) {
                added += 1;
            }
        }
        added
    }

    /// Total number of known pairs across all sites.
    pub fn count(&self) -> usize {
        self.read().values().map(HashSet::len).sum()
    }

    /// Sorted site identifiers with at least one known post.
    pub fn sites(&self) -> Vec<String> {
        let mut sites: Vec<String> = self
            .read()
            .iter()
            .filter(|(_, posts)| !posts.is_empty())
            .map(|(site, _)| site.clone())
            .collect();
        sites.sort();
        sites
    }

    /// Sorted post identifiers known for a site.
    pub fn posts(&self, site_id: &str) -> Vec<String> {
        let mut posts: Vec<String> = self
            .read()
            .get(site_id)
            .map(|p| p.iter().cloned().collect())
            .unwrap_or_default();
        posts.sort();
        posts
    }

    // A panic while holding the lock cannot leave a half-inserted entry behind, so the
    // poisoned state is safe to reuse.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, HashSet<String>>> {
        self.sites.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, HashSet<String>>> {
        self.sites.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn test_empty() {
        let known = KnownPosts::new();
        assert_eq!(known.count(), 0);
        assert!(!known.is_known("example.com", "/2024/01/01/foo"));
        assert!(known.sites().is_empty());
    }

    #[test]
    fn test_set_known_is_idempotent() {
        let known = KnownPosts::new();
        assert!(known.set_known("example.com", "/2024/01/01/foo"));
        assert!(!known.set_known("example.com", "/2024/01/01/foo"));
        assert_eq!(known.count(), 1);
        assert!(known.is_known("example.com", "/2024/01/01/foo"));
        assert!(!known.is_known("other.com", "/2024/01/01/foo"));
    }

    #[test]
    fn test_extend_counts_new_only() {
        let known = KnownPosts::new();
        known.set_known("example.com", "/a");
        let added = known.extend("example.com", ["/a", "/b", "/c"]);
        assert_eq!(added, 2);
        assert_eq!(known.count(), 3);
        assert_eq!(known.posts("example.com"), vec!["/a", "/b", "/c"]);
    }

    #[test]
    fn test_extend_takes_owned_strings() {
        let known = KnownPosts::new();
        let crawled = vec!["/x".to_string(), "/y".to_string(), "/x".to_string()];
        assert_eq!(known.extend("example.com", crawled), 2);
        assert_eq!(known.extend("example.com", Vec::<String>::new()), 0);
        assert!(known.is_known("example.com", "/y"));
    }

    #[test]
    fn test_count_spans_sites() {
        let known = KnownPosts::new();
        known.extend("a.com", ["/1", "/2"]);
        known.extend("b.com", ["/1"]);
        assert_eq!(known.count(), 3);
        assert_eq!(known.sites(), vec!["a.com", "b.com"]);
    }

    #[test]
    fn test_concurrent_readers_and_writer() {
        let known = Arc::new(KnownPosts::new());

        let writer = {
            let known = Arc::clone(&known);
            thread::spawn(move || {
                for i in 0..500 {
                    known.set_known("example.com", &format!("/2024/{i}"));
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let known = Arc::clone(&known);
                thread::spawn(move || {
                    let mut last = 0;
                    for _ in 0..500 {
                        let now = known.count();
                        assert!(now >= last);
                        last = now;
                        let _ = known.is_known("example.com", "/2024/1");
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(known.count(), 500);
    }
}
