//! Category model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Section a news item is filed under; names are unique
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
    /// News items currently filed here; blocks deletion while non-zero
    #[serde(default)]
    pub news_count: i64,
    pub created_at: DateTime<Utc>,
}

impl Category {
    /// Unsaved category; the id is assigned on insert
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            news_count: 0,
            created_at: Utc::now(),
        }
    }
}

/// Category fields joined onto a news item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub id: i64,
    pub name: String,
}
