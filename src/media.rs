//! Blob storage for photos and documents.
//!
//! Records only carry media keys; the bytes live behind this trait. The
//! production implementation is a plain directory tree under the data dir,
//! keyed by relative path.

use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

#[async_trait]
pub trait MediaStorage: Send + Sync + 'static {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<()>;

    async fn get_object(&self, key: &str) -> Result<Vec<u8>>;

    async fn delete_object(&self, key: &str) -> Result<()>;
}

pub fn checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let safe = relative
            .components()
            .all(|part| matches!(part, Component::Normal(_)));
        if key.is_empty() || !safe {
            bail!("invalid media key '{key}'");
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl MediaStorage for FsStorage {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: Option<String>,
    ) -> Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create media directory for {key}"))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("failed to write media object {key}"))?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key)?;
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("failed to read media object {key}"))?;
        Ok(bytes)
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("failed to delete media object {key}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path());

        storage
            .put_object("drafts/a/photo.jpg", b"frame".to_vec(), None)
            .await
            .unwrap();
        assert_eq!(
            storage.get_object("drafts/a/photo.jpg").await.unwrap(),
            b"frame"
        );

        storage.delete_object("drafts/a/photo.jpg").await.unwrap();
        assert!(storage.get_object("drafts/a/photo.jpg").await.is_err());
        // Deleting again is fine.
        storage.delete_object("drafts/a/photo.jpg").await.unwrap();
    }

    #[tokio::test]
    async fn rejects_traversal_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path());
        assert!(storage.get_object("../escape").await.is_err());
        assert!(storage.get_object("").await.is_err());
    }

    #[test]
    fn checksum_is_stable_hex() {
        let digest = checksum(b"frame");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, checksum(b"frame"));
        assert_ne!(digest, checksum(b"other"));
    }
}
