//! Filesystem-backed object storage

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{join_url, validate_path, ObjectStorage, StorageError};

/// Stores objects as files under a root directory
#[derive(Debug, Clone)]
pub struct LocalObjectStorage {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStorage {
    pub fn new(root: PathBuf, public_base_url: String) -> Self {
        Self {
            root,
            public_base_url,
        }
    }

    /// Directory holding the objects
    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        validate_path(path)?;
        Ok(self.root.join(path))
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn upload(&self, path: &str, bytes: &[u8], _content_type: &str) -> Result<String, StorageError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => StorageError::AlreadyExists(path.to_string()),
                _ => StorageError::Io(e),
            })?;
        file.write_all(bytes).await?;
        file.flush().await?;

        tracing::debug!(path, size = bytes.len(), "Stored object");
        Ok(path.to_string())
    }

    async fn remove(&self, paths: &[String]) -> Result<(), StorageError> {
        let mut first_error = None;
        for path in paths {
            let target = self.resolve(path)?;
            match fs::remove_file(&target).await {
                Ok(()) => tracing::debug!(path = %path, "Removed object"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    first_error.get_or_insert(StorageError::Io(e));
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let target = self.resolve(path)?;
        Ok(fs::try_exists(&target).await?)
    }

    fn public_url(&self, path: &str) -> String {
        join_url(&self.public_base_url, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage() -> (TempDir, LocalObjectStorage) {
        let dir = TempDir::new().unwrap();
        let storage = LocalObjectStorage::new(dir.path().to_path_buf(), "/media".to_string());
        (dir, storage)
    }

    #[tokio::test]
    async fn test_upload_and_exists() {
        let (dir, storage) = storage();

        let path = storage.upload("news/a.png", b"png-bytes", "image/png").await.unwrap();

        assert_eq!(path, "news/a.png");
        assert!(storage.exists("news/a.png").await.unwrap());
        assert_eq!(std::fs::read(dir.path().join("news/a.png")).unwrap(), b"png-bytes");
        assert_eq!(storage.public_url(&path), "/media/news/a.png");
    }

    #[tokio::test]
    async fn test_upload_never_overwrites() {
        let (dir, storage) = storage();
        storage.upload("news/a.png", b"first", "image/png").await.unwrap();

        let result = storage.upload("news/a.png", b"second", "image/png").await;

        assert!(matches!(result, Err(StorageError::AlreadyExists(_))));
        assert_eq!(std::fs::read(dir.path().join("news/a.png")).unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let (_dir, storage) = storage();
        storage.upload("authors/p.jpg", b"jpg", "image/jpeg").await.unwrap();

        storage.remove(&["authors/p.jpg".to_string()]).await.unwrap();
        assert!(!storage.exists("authors/p.jpg").await.unwrap());

        storage.remove(&["authors/p.jpg".to_string()]).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let (_dir, storage) = storage();
        let result = storage.upload("../outside.png", b"x", "image/png").await;
        assert!(matches!(result, Err(StorageError::InvalidPath(_))));
    }
}
