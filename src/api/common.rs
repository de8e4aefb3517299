//! Common API utilities and shared types
//!
//! This module contains shared utilities used across multiple API endpoints.

use axum::extract::Multipart;
use serde::Deserialize;
use std::collections::HashMap;

use crate::api::middleware::ApiError;
use crate::models::ListParams;
use crate::services::ImageFile;

// ============================================================================
// Pagination
// ============================================================================

/// Default page number (1-indexed)
pub fn default_page() -> u32 {
    1
}

/// Default page size for admin lists
pub fn default_per_page() -> u32 {
    20
}

/// Pagination query parameters
#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl From<PaginationQuery> for ListParams {
    fn from(query: PaginationQuery) -> Self {
        ListParams::new(query.page, query.per_page)
    }
}

// ============================================================================
// Multipart forms
// ============================================================================

/// Name of the multipart field carrying the image
pub const FILE_FIELD: &str = "file";

/// Text fields of a multipart submission plus its optional image
#[derive(Debug, Default)]
pub struct SubmittedForm {
    pub fields: HashMap<String, String>,
    pub file: Option<ImageFile>,
}

impl SubmittedForm {
    /// Read every field of a multipart body
    ///
    /// A `file` part without a file name or with an empty body is treated as
    /// no file, which is what browsers send when nothing was chosen.
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = SubmittedForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::validation_error(format!("Failed to read multipart: {}", e)))?
        {
            let name = field.name().unwrap_or("").to_string();

            if name == FILE_FIELD {
                let file_name = field.file_name().map(|s| s.to_string()).unwrap_or_default();
                let content_type = field
                    .content_type()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::validation_error(format!("Failed to read file: {}", e)))?;

                if !file_name.is_empty() && !data.is_empty() {
                    form.file = Some(ImageFile::new(file_name, content_type, data.to_vec()));
                }
                continue;
            }

            let value = field
                .text()
                .await
                .map_err(|e| ApiError::validation_error(format!("Failed to read field {}: {}", name, e)))?;
            form.fields.insert(name, value);
        }

        Ok(form)
    }

    /// Field value, empty when absent
    pub fn text(&self, name: &str) -> String {
        self.fields.get(name).cloned().unwrap_or_default()
    }

    /// Field value, `None` when absent or blank
    pub fn optional(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string())
    }

    /// Checkbox-style boolean; absent means `None`
    pub fn flag(&self, name: &str) -> Result<Option<bool>, ApiError> {
        match self.optional(name).as_deref() {
            None => Ok(None),
            Some("true") | Some("on") | Some("1") => Ok(Some(true)),
            Some("false") | Some("off") | Some("0") => Ok(Some(false)),
            Some(other) => Err(ApiError::validation_error(format!(
                "Invalid value for {}: {}",
                name, other
            ))),
        }
    }

    pub fn take_file(&mut self) -> Option<ImageFile> {
        self.file.take()
    }
}
