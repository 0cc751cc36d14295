//! Local filesystem object store.
//!
//! Keys map to files under a root directory, one path component per `/` segment. Used
//! for development and tests in place of S3.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::storage::ObjectStore;

/// Suffix of in-flight writes; never listed.
const TMP_SUFFIX: &str = ".tmp";

/// Local filesystem object store.
#[derive(Debug, Clone)]
pub struct LocalObjects {
    root_dir: PathBuf,
}

impl LocalObjects {
    /// Create a store rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Get the full path for a key, refusing anything that would leave the root.
    fn path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key.trim_end_matches('/'));
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(AppError::validation(format!("invalid object key {key:?}")));
        }
        Ok(self.root_dir.join(relative))
    }

    /// Collect every file key below `dir`.
    async fn walk(&self, dir: PathBuf) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut pending = vec![dir];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(AppError::Io(e)),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                if path.to_string_lossy().ends_with(TMP_SUFFIX) {
                    continue;
                }
                if let Some(key) = self.key_of(&path) {
                    keys.push(key);
                }
            }
        }
        Ok(keys)
    }

    fn key_of(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root_dir).ok()?;
        let segments: Option<Vec<&str>> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect();
        Some(segments?.join("/"))
    }
}

#[async_trait]
impl ObjectStore for LocalObjects {
    fn engine(&self) -> &'static str {
        "local"
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()> {
        let path = self.path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // unique per writer; concurrent puts to one key must not share a temp file
        let mut tmp = path.clone().into_os_string();
        tmp.push(format!(".{}{TMP_SUFFIX}", Uuid::new_v4().simple()));
        let tmp = PathBuf::from(tmp);

        let written = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(&body).await?;
            file.flush().await?;
            drop(file);
            tokio::fs::rename(&tmp, &path).await
        }
        .await;
        if written.is_err() {
            let _ = tokio::fs::remove_file(&tmp).await;
        }
        written.map_err(AppError::Io)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path(key)?).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        // Start from the deepest directory the prefix names.
        let dir = match prefix.rfind('/') {
            Some(end) => self.path(&prefix[..end])?,
            None => self.root_dir.clone(),
        };

        let mut keys: Vec<String> = self
            .walk(dir)
            .await?
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path(key)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_and_read() {
        let tmp = TempDir::new().unwrap();
        let store = LocalObjects::new(tmp.path());

        store.put("a/b/c", b"hello".to_vec()).await.unwrap();
        let data = store.get("a/b/c").await.unwrap();
        assert_eq!(data, Some(b"hello".to_vec()));
        let leftovers: Vec<_> = std::fs::read_dir(tmp.path().join("a/b"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("c")]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_puts_to_one_key() {
        let tmp = TempDir::new().unwrap();
        let store = LocalObjects::new(tmp.path());

        let writes = (0..16u8).map(|i| {
            let store = store.clone();
            tokio::spawn(async move { store.put("s/p/c1", vec![i; 4096]).await })
        });
        for write in futures::future::join_all(writes).await {
            write.unwrap().unwrap();
        }

        let body = store.get("s/p/c1").await.unwrap().unwrap();
        assert_eq!(body.len(), 4096);
        assert!(body.iter().all(|b| *b == body[0]));
        assert_eq!(store.list("s/").await.unwrap(), vec!["s/p/c1"]);
    }

    #[tokio::test]
    async fn test_read_nonexistent() {
        let tmp = TempDir::new().unwrap();
        let store = LocalObjects::new(tmp.path());

        assert!(store.get("nope").await.unwrap().is_none());
        store.delete("nope").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_prefixed() {
        let tmp = TempDir::new().unwrap();
        let store = LocalObjects::new(tmp.path());
        for key in ["s/p/2", "s/p/1", "s/q/1", "t/p/1", "s/p/deep/1"] {
            store.put(key, Vec::new()).await.unwrap();
        }
        std::fs::write(tmp.path().join("s/p/3.tmp"), b"partial").unwrap();

        assert_eq!(
            store.list("s/p/").await.unwrap(),
            vec!["s/p/1", "s/p/2", "s/p/deep/1"]
        );
        assert_eq!(store.list("s/").await.unwrap().len(), 4);
        assert!(store.list("missing/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let tmp = TempDir::new().unwrap();
        let store = LocalObjects::new(tmp.path());
        assert!(store.put("../outside", Vec::new()).await.is_err());
        assert!(store.get("/etc/passwd").await.is_err());
    }
}
