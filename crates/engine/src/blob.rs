//! Filesystem-backed blob store.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::collaborators::{BlobStore, CollabError};

/// Stores blobs as files under a root directory, with the key as the
/// relative path.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a key, rejecting path traversal.
    fn resolve(&self, key: &str) -> Result<PathBuf, CollabError> {
        let relative = Path::new(key);
        let traversal = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || traversal {
            return Err(CollabError::Permanent(format!("invalid blob key: {key}")));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), CollabError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CollabError::Transient(format!("mkdir {}: {e}", parent.display())))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| CollabError::Transient(format!("write {key}: {e}")))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, CollabError> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CollabError::NotFound(key.to_string()))
            }
            Err(e) => Err(CollabError::Transient(format!("read {key}: {e}"))),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), CollabError> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CollabError::Transient(format!("delete {key}: {e}"))),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, CollabError> {
        let path = self.resolve(key)?;
        Ok(tokio::fs::try_exists(&path)
            .await
            .map_err(|e| CollabError::Transient(format!("stat {key}: {e}")))?)
    }

    fn download_url(&self, key: &str) -> Result<String, CollabError> {
        let path = self.resolve(key)?;
        Ok(format!("file://{}", path.display()))
    }

    fn local_path(&self, key: &str) -> Option<PathBuf> {
        self.resolve(key).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_bytes_under_nested_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        store.put("jobs/abc/vocals.wav", b"RIFF").await.unwrap();
        assert!(store.exists("jobs/abc/vocals.wav").await.unwrap());
        assert_eq!(store.get("jobs/abc/vocals.wav").await.unwrap(), b"RIFF");

        store.delete("jobs/abc/vocals.wav").await.unwrap();
        assert!(!store.exists("jobs/abc/vocals.wav").await.unwrap());
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        let err = store.get("nope.wav").await.unwrap_err();
        assert!(matches!(err, CollabError::NotFound(_)));
        // Deleting a missing key is fine.
        store.delete("nope.wav").await.unwrap();
    }

    #[tokio::test]
    async fn download_url_points_under_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        let url = store.download_url("outputs/j1/cover.wav").unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("outputs/j1/cover.wav"));
        assert!(store.download_url("../escape.wav").is_err());
    }

    #[tokio::test]
    async fn rejects_traversal_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        for key in ["../escape.wav", "/etc/passwd", "a/../../b", ""] {
            let err = store.put(key, b"x").await.unwrap_err();
            assert!(matches!(err, CollabError::Permanent(_)), "key {key:?}");
        }
    }
}
