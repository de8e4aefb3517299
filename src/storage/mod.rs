//! Object storage
//!
//! Binary objects (author photos, news pictures) live outside the database.
//! Records keep the object's storage path and public URL.
//!
//! - [`LocalObjectStorage`] writes under a directory served at `/media`
//! - [`MemoryObjectStorage`] keeps objects in process and records every call

pub mod local;
pub mod memory;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub use local::LocalObjectStorage;
pub use memory::MemoryObjectStorage;

use crate::config::StorageConfig;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid storage path: {0}")]
    InvalidPath(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Object storage backend
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store bytes at `path`. Never overwrites an existing object.
    async fn upload(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<String, StorageError>;

    /// Remove objects. Missing objects are not an error.
    async fn remove(&self, paths: &[String]) -> Result<(), StorageError>;

    /// Check whether an object exists
    async fn exists(&self, path: &str) -> Result<bool, StorageError>;

    /// Public URL for a stored path
    fn public_url(&self, path: &str) -> String;
}

/// Reject empty, absolute and parent-relative paths.
pub fn validate_path(path: &str) -> Result<(), StorageError> {
    let invalid = path.is_empty()
        || path.starts_with('/')
        || path.contains('\\')
        || path.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if invalid {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// Join a base URL and a storage path with exactly one slash.
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path)
}

/// Create the local storage described by the configuration
pub fn create_storage(config: &StorageConfig) -> Arc<dyn ObjectStorage> {
    Arc::new(LocalObjectStorage::new(
        config.path.clone(),
        config.public_base_url.clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_path() {
        assert!(validate_path("authors/a.png").is_ok());
        assert!(validate_path("news/2b1e.jpg").is_ok());
        assert!(validate_path("").is_err());
        assert!(validate_path("/etc/passwd").is_err());
        assert!(validate_path("news/../../secret").is_err());
        assert!(validate_path("news//a.png").is_err());
        assert!(validate_path("news\\a.png").is_err());
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("/media", "news/a.png"), "/media/news/a.png");
        assert_eq!(join_url("https://cdn.test/media/", "news/a.png"), "https://cdn.test/media/news/a.png");
    }
}
