//! Author model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Byline shown on news items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    /// Unique identifier
    pub id: i64,
    /// Display name
    pub name: String,
    /// Contact email; matched against the signed-in identity for ownership
    pub email: String,
    /// Public photo URL (a stored object or the configured default)
    pub photo_url: String,
    /// Storage path of the photo, absent for the default photo
    pub photo_path: Option<String>,
    /// Only active authors can be picked for new news items
    pub active: bool,
    /// Number of news items bylined by this author
    #[serde(default)]
    pub news_count: i64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Author {
    /// Create a new active Author
    pub fn new(name: String, email: String, photo_url: String, photo_path: Option<String>) -> Self {
        Self {
            id: 0, // Will be set by the database
            name,
            email,
            photo_url,
            photo_path,
            active: true,
            news_count: 0,
            created_at: Utc::now(),
        }
    }
}

/// Author fields joined onto a news item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorSummary {
    pub id: i64,
    pub name: String,
    pub photo_url: String,
}

/// Input for creating an author.
#[derive(Debug, Clone, Default)]
pub struct CreateAuthorInput {
    pub name: String,
    /// Defaults to the creator's email
    pub email: Option<String>,
}

/// Input for updating an author. Absent fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateAuthorInput {
    pub name: Option<String>,
    pub active: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_author_new_is_active() {
        let author = Author::new(
            "Asha Rao".to_string(),
            "asha@news.test".to_string(),
            "/static/default-author.png".to_string(),
            None,
        );

        assert_eq!(author.id, 0);
        assert!(author.active);
        assert_eq!(author.news_count, 0);
        assert!(author.photo_path.is_none());
    }
}
