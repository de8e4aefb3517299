//! Services layer - Business logic
//!
//! Every entity action takes the caller's [`SessionContext`] and re-checks
//! it before touching the store. Actions fail with [`ActionError`]; the
//! more specific service errors convert into it.

pub mod author;
pub mod category;
pub mod form;
pub mod identity;
pub mod mailer;
pub mod news;
pub mod orphan;
pub mod rate_limiter;
pub mod retry;
pub mod session;
pub mod stats;
pub mod upload;

pub use author::AuthorService;
pub use category::CategoryService;
pub use form::{FormStage, FormState, FormTransitionError, Submitted};
pub use identity::{IdentityError, IdentityEvent, IdentityService, SignedIn};
pub use mailer::{create_mailer, CodeMailer, LogMailer, RecordingMailer, SmtpMailer};
pub use news::NewsService;
pub use orphan::{OrphanSweeper, SweepReport};
pub use rate_limiter::SignInLimiter;
pub use retry::retry_once;
pub use session::{SessionContext, SessionState};
pub use stats::StatsService;
pub use upload::{ImageFile, ImageKind, ImageUploader, StoredImage, UploadError};

use crate::models::FieldError;

/// Error returned by every entity action
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// Bad input, raised before any store or storage call
    #[error("{message}")]
    Validation {
        message: String,
        fields: Vec<FieldError>,
    },

    /// No active session
    #[error("Authentication required")]
    Unauthorized,

    /// Role or ownership check failed
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// Duplicate name, or delete restricted by references
    #[error("{0}")]
    Conflict(String),

    /// Too many sign-in attempts; retry after the given number of seconds
    #[error("Too many attempts, try again in {retry_after} seconds")]
    RateLimited { retry_after: i64 },

    #[error("Internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl ActionError {
    /// Validation failure without per-field details
    pub fn validation(message: impl Into<String>) -> Self {
        ActionError::Validation {
            message: message.into(),
            fields: Vec::new(),
        }
    }

    /// Validation failure for one or more form fields
    pub fn invalid_fields(fields: Vec<FieldError>) -> Self {
        let message = match fields.as_slice() {
            [only] => only.message.clone(),
            _ => format!("{} fields are invalid", fields.len()),
        };
        ActionError::Validation { message, fields }
    }
}

pub type ActionResult<T> = Result<T, ActionError>;
