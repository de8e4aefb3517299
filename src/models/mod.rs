//! Data models
//!
//! Entities stored by the newsroom (identities, sessions, authors,
//! categories, news items, orphaned objects) plus the request and
//! response shapes shared between services and the API.

mod author;
mod category;
mod identity;
mod news;
mod orphan;
mod session;
mod stats;

pub use author::{Author, AuthorSummary, CreateAuthorInput, UpdateAuthorInput};
pub use category::{Category, CategorySummary};
pub use identity::{is_valid_email, normalize_email, Identity, Role};
pub use news::{
    parse_read_time, parse_tags, FieldError, Language, ListParams, LocalizedCopy, NewsDraft,
    NewsInput, NewsItem, NewsItemWithRefs, PagedResult, MIN_CONTENT_CHARS,
};
pub use orphan::{OrphanReason, OrphanedObject};
pub use session::{OneTimeCode, Session};
pub use stats::{DashboardStats, EntityOption, EntityStats, NamedCount};
