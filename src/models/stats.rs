//! Select-list options and aggregate counts

use serde::{Deserialize, Serialize};

/// An `{id, name}` pair for select lists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct EntityOption {
    pub id: i64,
    pub name: String,
}

/// News count for one author or category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct NamedCount {
    pub id: i64,
    pub name: String,
    pub news_count: i64,
}

/// Per-entity news counts plus the number of entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityStats {
    pub items: Vec<NamedCount>,
    pub total: i64,
}

impl EntityStats {
    pub fn new(items: Vec<NamedCount>) -> Self {
        let total = items.len() as i64;
        Self { items, total }
    }
}

/// Totals shown on the dashboard home page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_news_items: i64,
    pub total_categories: i64,
    pub total_authors: i64,
    pub total_views: i64,
    /// Email of the signed-in identity
    pub email: String,
}
