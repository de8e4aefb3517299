//! In-process object storage
//!
//! Keeps objects in a map and records every upload and remove call so tests
//! can assert on storage traffic. Failures can be switched on per operation.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{join_url, validate_path, ObjectStorage, StorageError};

#[derive(Debug, Default)]
struct State {
    objects: HashMap<String, Vec<u8>>,
    uploads: Vec<String>,
    removals: Vec<Vec<String>>,
    fail_uploads: bool,
    fail_removals: bool,
}

/// Object storage held in memory
#[derive(Debug)]
pub struct MemoryObjectStorage {
    state: Mutex<State>,
    public_base_url: String,
}

impl Default for MemoryObjectStorage {
    fn default() -> Self {
        Self::new("/media")
    }
}

impl MemoryObjectStorage {
    pub fn new(public_base_url: &str) -> Self {
        Self {
            state: Mutex::new(State::default()),
            public_base_url: public_base_url.to_string(),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make subsequent uploads fail
    pub fn fail_uploads(&self, fail: bool) {
        self.state().fail_uploads = fail;
    }

    /// Make subsequent removals fail
    pub fn fail_removals(&self, fail: bool) {
        self.state().fail_removals = fail;
    }

    /// Paths passed to `upload`, in call order
    pub fn upload_calls(&self) -> Vec<String> {
        self.state().uploads.clone()
    }

    /// Path lists passed to `remove`, one entry per call
    pub fn remove_calls(&self) -> Vec<Vec<String>> {
        self.state().removals.clone()
    }

    /// Total number of upload and remove calls
    pub fn call_count(&self) -> usize {
        let state = self.state();
        state.uploads.len() + state.removals.len()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.state().objects.contains_key(path)
    }

    pub fn object_count(&self) -> usize {
        self.state().objects.len()
    }

    /// Store an object directly, bypassing call recording
    pub fn insert(&self, path: &str, bytes: &[u8]) {
        self.state().objects.insert(path.to_string(), bytes.to_vec());
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn upload(&self, path: &str, bytes: &[u8], _content_type: &str) -> Result<String, StorageError> {
        validate_path(path)?;
        let mut state = self.state();
        state.uploads.push(path.to_string());
        if state.fail_uploads {
            return Err(StorageError::Unavailable("upload rejected".to_string()));
        }
        if state.objects.contains_key(path) {
            return Err(StorageError::AlreadyExists(path.to_string()));
        }
        state.objects.insert(path.to_string(), bytes.to_vec());
        Ok(path.to_string())
    }

    async fn remove(&self, paths: &[String]) -> Result<(), StorageError> {
        let mut state = self.state();
        state.removals.push(paths.to_vec());
        if state.fail_removals {
            return Err(StorageError::Unavailable("remove rejected".to_string()));
        }
        for path in paths {
            state.objects.remove(path);
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.state().objects.contains_key(path))
    }

    fn public_url(&self, path: &str) -> String {
        join_url(&self.public_base_url, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_calls() {
        let storage = MemoryObjectStorage::default();

        storage.upload("news/a.png", b"a", "image/png").await.unwrap();
        storage.remove(&["news/a.png".to_string()]).await.unwrap();

        assert_eq!(storage.upload_calls(), vec!["news/a.png"]);
        assert_eq!(storage.remove_calls(), vec![vec!["news/a.png".to_string()]]);
        assert_eq!(storage.call_count(), 2);
        assert!(!storage.contains("news/a.png"));
    }

    #[tokio::test]
    async fn test_injected_failures_are_still_recorded() {
        let storage = MemoryObjectStorage::default();
        storage.insert("news/a.png", b"a");
        storage.fail_removals(true);

        assert!(storage.remove(&["news/a.png".to_string()]).await.is_err());
        assert_eq!(storage.remove_calls().len(), 1);
        assert!(storage.contains("news/a.png"));
    }

    #[tokio::test]
    async fn test_upload_never_overwrites() {
        let storage = MemoryObjectStorage::default();
        storage.upload("news/a.png", b"a", "image/png").await.unwrap();

        let result = storage.upload("news/a.png", b"b", "image/png").await;
        assert!(matches!(result, Err(StorageError::AlreadyExists(_))));
    }
}
