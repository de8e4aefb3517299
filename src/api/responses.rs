//! Shared API response types
//!
//! Mutations answer with the written record, the stages the form went
//! through and the refreshed list, so the panel can redraw without a
//! second request.

use serde::Serialize;

use crate::services::{FormStage, Submitted};

/// Response to a create or update
#[derive(Debug, Serialize)]
pub struct MutationResponse<T, L> {
    pub record: T,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<FormStage>,
    pub list: L,
}

impl<T, L> MutationResponse<T, L> {
    /// Plain mutation without an upload form
    pub fn new(record: T, list: L) -> Self {
        Self {
            record,
            stages: Vec::new(),
            list,
        }
    }

    pub fn submitted(submitted: Submitted<T>, list: L) -> Self {
        Self {
            record: submitted.record,
            stages: submitted.stages,
            list,
        }
    }
}

/// Response to a delete
#[derive(Debug, Serialize)]
pub struct DeleteResponse<L> {
    pub deleted: i64,
    pub list: L,
}

/// Generic success flag
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}
