//! News item model
//!
//! A news item carries a heading, tagline and content for each of the three
//! site languages, one picture, a tag list and a read time. Drafts arrive as
//! raw form strings and go through [`NewsDraft::validate`] before any store
//! or storage call.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{AuthorSummary, CategorySummary};

/// Minimum content length, in characters, for every language
pub const MIN_CONTENT_CHARS: usize = 50;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9]+$").unwrap());

/// Site language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Hi,
    Ur,
}

impl Language {
    /// All languages in display order
    pub const ALL: [Language; 3] = [Language::En, Language::Hi, Language::Ur];

    /// Column suffix and JSON key
    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Hi => "hi",
            Language::Ur => "ur",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Language::En => "English",
            Language::Hi => "Hindi",
            Language::Ur => "Urdu",
        }
    }
}

/// Heading, tagline and content in one language
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalizedCopy {
    pub heading: String,
    pub tagline: String,
    /// Rich text, stored as an opaque string
    pub content: String,
}

/// News item as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    /// Unique identifier
    pub id: i64,
    pub en: LocalizedCopy,
    pub hi: LocalizedCopy,
    pub ur: LocalizedCopy,
    /// Public URL of the picture
    pub picture_url: String,
    /// Storage path of the picture
    pub picture_path: String,
    pub tags: Vec<String>,
    /// Read time in minutes
    pub read_time: i32,
    /// View counter
    pub views: i64,
    pub author_id: i64,
    pub category_id: i64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl NewsItem {
    /// Build a new item from validated input and a stored picture
    pub fn new(input: NewsInput, picture_url: String, picture_path: String) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // Will be set by the database
            en: input.en,
            hi: input.hi,
            ur: input.ur,
            picture_url,
            picture_path,
            tags: input.tags,
            read_time: input.read_time,
            views: 0,
            author_id: input.author_id,
            category_id: input.category_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Copy for the given language
    pub fn copy(&self, language: Language) -> &LocalizedCopy {
        match language {
            Language::En => &self.en,
            Language::Hi => &self.hi,
            Language::Ur => &self.ur,
        }
    }

    /// Replace the editable fields with validated input, keeping id,
    /// picture, views and creation time.
    pub fn apply(&mut self, input: NewsInput) {
        self.en = input.en;
        self.hi = input.hi;
        self.ur = input.ur;
        self.tags = input.tags;
        self.read_time = input.read_time;
        self.author_id = input.author_id;
        self.category_id = input.category_id;
        self.updated_at = Utc::now();
    }
}

/// News item with its author and category joined
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItemWithRefs {
    #[serde(flatten)]
    pub item: NewsItem,
    pub author: AuthorSummary,
    pub category: CategorySummary,
}

/// Raw form fields for a news item, as submitted
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewsDraft {
    pub en: LocalizedCopy,
    pub hi: LocalizedCopy,
    pub ur: LocalizedCopy,
    pub author_id: String,
    pub category_id: String,
    /// Comma-separated tag list
    pub tags: String,
    pub read_time: String,
}

/// Validated news fields ready to be written
#[derive(Debug, Clone, PartialEq)]
pub struct NewsInput {
    pub en: LocalizedCopy,
    pub hi: LocalizedCopy,
    pub ur: LocalizedCopy,
    pub author_id: i64,
    pub category_id: i64,
    pub tags: Vec<String>,
    pub read_time: i32,
}

/// Validation failure for a single form field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl NewsDraft {
    /// Copy for the given language
    pub fn copy(&self, language: Language) -> &LocalizedCopy {
        match language {
            Language::En => &self.en,
            Language::Hi => &self.hi,
            Language::Ur => &self.ur,
        }
    }

    /// Check every field and collect all failures.
    pub fn validate(&self) -> Result<NewsInput, Vec<FieldError>> {
        let mut errors = Vec::new();

        for language in Language::ALL {
            let copy = self.copy(language);
            let code = language.code();
            let label = language.label();

            if copy.heading.trim().is_empty() {
                errors.push(FieldError::new(
                    format!("heading_{}", code),
                    format!("{} heading is required", label),
                ));
            }
            if copy.tagline.trim().is_empty() {
                errors.push(FieldError::new(
                    format!("tagline_{}", code),
                    format!("{} tagline is required", label),
                ));
            }
            let content = copy.content.trim();
            if content.is_empty() {
                errors.push(FieldError::new(
                    format!("content_{}", code),
                    format!("{} content is required", label),
                ));
            } else if content.chars().count() < MIN_CONTENT_CHARS {
                errors.push(FieldError::new(
                    format!("content_{}", code),
                    format!(
                        "{} content must be at least {} characters",
                        label, MIN_CONTENT_CHARS
                    ),
                ));
            }
        }

        let author_id = parse_reference(&self.author_id, "author_id", "Author", &mut errors);
        let category_id =
            parse_reference(&self.category_id, "category_id", "Category", &mut errors);

        let tags = parse_tags(&self.tags)
            .map_err(|message| errors.push(FieldError::new("tags", message)))
            .ok();
        let read_time = parse_read_time(&self.read_time)
            .map_err(|message| errors.push(FieldError::new("read_time", message)))
            .ok();

        match (author_id, category_id, tags, read_time) {
            (Some(author_id), Some(category_id), Some(tags), Some(read_time)) if errors.is_empty() => {
                Ok(NewsInput {
                    en: self.en.clone(),
                    hi: self.hi.clone(),
                    ur: self.ur.clone(),
                    author_id,
                    category_id,
                    tags,
                    read_time,
                })
            }
            _ => Err(errors),
        }
    }
}

fn parse_reference(
    raw: &str,
    field: &str,
    label: &str,
    errors: &mut Vec<FieldError>,
) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        errors.push(FieldError::new(field, format!("{} is required", label)));
        return None;
    }
    match raw.parse::<i64>() {
        Ok(id) if id > 0 => Some(id),
        _ => {
            errors.push(FieldError::new(field, format!("{} is invalid", label)));
            None
        }
    }
}

/// Split a comma-separated tag list.
///
/// Whitespace around each tag is ignored; every tag must be a non-empty
/// ASCII alphanumeric word. `"news, tech"` yields `["news", "tech"]`.
pub fn parse_tags(raw: &str) -> Result<Vec<String>, String> {
    if raw.trim().is_empty() {
        return Err("Tags are required".to_string());
    }

    raw.split(',')
        .map(str::trim)
        .map(|tag| {
            if TAG_RE.is_match(tag) {
                Ok(tag.to_string())
            } else {
                Err("Tags must be comma-separated words of letters and digits".to_string())
            }
        })
        .collect()
}

/// Parse a read time in whole minutes, at least 1.
pub fn parse_read_time(raw: &str) -> Result<i32, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("Read time is required".to_string());
    }
    match raw.parse::<i32>() {
        Ok(minutes) if minutes >= 1 => Ok(minutes),
        Ok(_) => Err("Read time must be at least 1 minute".to_string()),
        Err(_) => Err("Read time must be a whole number of minutes".to_string()),
    }
}

/// Pagination parameters for list queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListParams {
    /// Page number (1-indexed)
    pub page: u32,
    /// Number of items per page
    pub per_page: u32,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
        }
    }
}

impl ListParams {
    /// Create new pagination parameters
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 100),
        }
    }

    /// Calculate the offset for database queries
    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.per_page as i64
    }

    /// Get the limit for database queries
    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

/// Paginated result container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedResult<T> {
    /// Items in the current page
    pub items: Vec<T>,
    /// Total number of items across all pages
    pub total: i64,
    /// Current page number (1-indexed)
    pub page: u32,
    /// Number of items per page
    pub per_page: u32,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, total: i64, params: &ListParams) -> Self {
        Self {
            items,
            total,
            page: params.page,
            per_page: params.per_page,
        }
    }

    /// Calculate the total number of pages
    pub fn total_pages(&self) -> u32 {
        if self.per_page == 0 {
            return 0;
        }
        (self.total.max(0) as u32).div_ceil(self.per_page)
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
