//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the queries for a single table.

pub mod author;
pub mod category;
pub mod identity;
pub mod news;
pub mod one_time_code;
pub mod orphaned_object;
pub mod session;

pub use author::{AuthorRepository, SqlxAuthorRepository};
pub use category::{CategoryRepository, SqlxCategoryRepository};
pub use identity::{IdentityRepository, SqlxIdentityRepository};
pub use news::{NewsRepository, SqlxNewsRepository};
pub use one_time_code::{OneTimeCodeRepository, SqlxOneTimeCodeRepository};
pub use orphaned_object::{OrphanedObjectRepository, SqlxOrphanedObjectRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
