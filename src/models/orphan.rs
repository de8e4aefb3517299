//! Orphaned storage objects awaiting removal

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A stored object whose best-effort removal failed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrphanedObject {
    pub id: i64,
    /// Storage path of the object
    pub path: String,
    pub reason: OrphanReason,
    /// Number of failed removal attempts so far
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Why an object ended up orphaned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanReason {
    /// The record now references a newer object
    Replaced,
    /// The record that referenced it was deleted
    RecordDeleted,
    /// The record write failed after the upload
    WriteFailed,
}

impl OrphanReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrphanReason::Replaced => "replaced",
            OrphanReason::RecordDeleted => "record_deleted",
            OrphanReason::WriteFailed => "write_failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "record_deleted" => OrphanReason::RecordDeleted,
            "write_failed" => OrphanReason::WriteFailed,
            _ => OrphanReason::Replaced,
        }
    }
}

impl fmt::Display for OrphanReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
