//! Image upload helper
//!
//! Validates an image, stores it under a fresh random path and retires the
//! object it replaces. Removals are best effort: a failed one is logged and
//! recorded as an orphaned object for the sweeper, never returned to the
//! caller.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use super::ActionError;
use crate::db::repositories::OrphanedObjectRepository;
use crate::models::{FieldError, OrphanReason};
use crate::storage::{ObjectStorage, StorageError};

/// Image received from a form
#[derive(Debug, Clone)]
pub struct ImageFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Top-level folder an image is stored under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Authors,
    News,
}

impl ImageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageKind::Authors => "authors",
            ImageKind::News => "news",
        }
    }
}

impl FromStr for ImageKind {
    type Err = UploadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "authors" => Ok(ImageKind::Authors),
            "news" => Ok(ImageKind::News),
            other => Err(UploadError::UnknownKind(other.to_string())),
        }
    }
}

/// Where a stored image ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredImage {
    pub url: String,
    pub path: String,
}

/// Error types for image uploads
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("File must be an image (got {0})")]
    NotAnImage(String),

    #[error("Image must be at most {limit_kb} KB")]
    TooLarge { limit_kb: u64 },

    #[error("Image file is empty")]
    Empty,

    #[error("Unknown image kind: {0}")]
    UnknownKind(String),

    #[error("Failed to store image: {0}")]
    Storage(#[from] StorageError),
}

impl UploadError {
    /// Rejected before any storage call
    pub fn is_validation(&self) -> bool {
        !matches!(self, UploadError::Storage(_))
    }
}

impl From<UploadError> for ActionError {
    fn from(err: UploadError) -> Self {
        if err.is_validation() {
            let message = err.to_string();
            ActionError::Validation {
                fields: vec![FieldError::new("image", message.clone())],
                message,
            }
        } else {
            ActionError::Internal(anyhow::Error::new(err))
        }
    }
}

/// Stores images and retires the ones they replace
pub struct ImageUploader {
    storage: Arc<dyn ObjectStorage>,
    orphans: Arc<dyn OrphanedObjectRepository>,
    max_bytes: u64,
}

impl ImageUploader {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        orphans: Arc<dyn OrphanedObjectRepository>,
        max_bytes: u64,
    ) -> Self {
        Self {
            storage,
            orphans,
            max_bytes,
        }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Check type and size without touching storage
    pub fn validate(&self, file: &ImageFile) -> Result<(), UploadError> {
        if !file.content_type.trim().to_lowercase().starts_with("image/") {
            return Err(UploadError::NotAnImage(file.content_type.clone()));
        }
        if file.bytes.is_empty() {
            return Err(UploadError::Empty);
        }
        if file.size() as u64 > self.max_bytes {
            return Err(UploadError::TooLarge {
                limit_kb: self.max_bytes / 1024,
            });
        }
        Ok(())
    }

    /// Validate and store under `<kind>/<uuid>.<ext>`
    pub async fn store(&self, file: &ImageFile, kind: ImageKind) -> Result<StoredImage, UploadError> {
        self.validate(file)?;

        let ext = get_extension(&file.file_name, &file.content_type);
        let path = format!("{}/{}.{}", kind.as_str(), Uuid::new_v4(), ext);
        let path = self.storage.upload(&path, &file.bytes, &file.content_type).await?;

        tracing::debug!(path = %path, size = file.size(), "Stored image");
        Ok(StoredImage {
            url: self.storage.public_url(&path),
            path,
        })
    }

    /// Remove the previous object once a record points at `new_path`
    pub async fn retire_replaced(&self, old_path: Option<&str>, new_path: &str) {
        match old_path {
            Some(old) if !old.is_empty() && old != new_path => {
                self.remove_best_effort(old, OrphanReason::Replaced).await;
            }
            _ => {}
        }
    }

    /// Undo an upload whose record write failed
    pub async fn discard(&self, path: &str) {
        self.remove_best_effort(path, OrphanReason::WriteFailed).await;
    }

    /// Remove the object of a deleted record
    pub async fn release(&self, path: Option<&str>) {
        if let Some(path) = path.filter(|p| !p.is_empty()) {
            self.remove_best_effort(path, OrphanReason::RecordDeleted).await;
        }
    }

    async fn remove_best_effort(&self, path: &str, reason: OrphanReason) {
        let Err(e) = self.storage.remove(&[path.to_string()]).await else {
            return;
        };

        tracing::warn!(path, reason = %reason, "Failed to remove stored object: {}", e);
        if let Err(record_err) = self.orphans.record(path, reason, &e.to_string()).await {
            tracing::error!(path, "Failed to record orphaned object: {:#}", record_err);
        }
    }
}

/// Get file extension from filename or content type
fn get_extension(filename: &str, content_type: &str) -> String {
    if let Some((_, ext)) = filename.rsplit_once('.') {
        if !ext.is_empty() && ext.len() < 10 && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return ext.to_lowercase();
        }
    }

    match content_type.trim().to_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "image/bmp" => "bmp",
        "image/tiff" => "tiff",
        "image/x-icon" => "ico",
        "image/avif" => "avif",
        _ => "bin",
    }
    .to_string()
}
