//! Identity service
//!
//! Passwordless sign-in for staff:
//! - A six-digit code is mailed to a known identity
//! - Verifying the code opens a session (opaque UUID token)
//! - Sign-in and sign-out are broadcast as [`IdentityEvent`]s
//! - Wrong codes are counted per email; hitting the limit revokes the code
//!   and locks verification for the attempt window
//!
//! Sign-in never creates identities. The configured admin is seeded at
//! startup and everyone else is invited by an admin.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::mailer::CodeMailer;
use super::rate_limiter::SignInLimiter;
use super::{ActionError, SessionContext};
use crate::config::AuthConfig;
use crate::db::repositories::{IdentityRepository, OneTimeCodeRepository, SessionRepository};
use crate::models::{is_valid_email, normalize_email, Identity, OneTimeCode, Role, Session};

/// Capacity of the identity event channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Error types for identity operations
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Email is required")]
    EmailRequired,

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Code is required")]
    CodeRequired,

    #[error("Invalid or expired code")]
    InvalidCode,

    #[error("Too many attempts, try again in {retry_after} seconds")]
    TooManyAttempts { retry_after: i64 },

    #[error("An account already exists for {0}")]
    AlreadyExists(String),

    #[error("Failed to deliver sign-in code: {0:#}")]
    Delivery(anyhow::Error),

    #[error("Internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl From<IdentityError> for ActionError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::EmailRequired
            | IdentityError::InvalidEmail(_)
            | IdentityError::CodeRequired => ActionError::validation(err.to_string()),
            IdentityError::InvalidCode => ActionError::Unauthorized,
            IdentityError::TooManyAttempts { retry_after } => ActionError::RateLimited { retry_after },
            IdentityError::AlreadyExists(_) => ActionError::Conflict(err.to_string()),
            IdentityError::Delivery(e) | IdentityError::Internal(e) => ActionError::Internal(e),
        }
    }
}

/// Change in who is signed in
#[derive(Debug, Clone, PartialEq)]
pub enum IdentityEvent {
    SignedIn(Identity),
    SignedOut { identity_id: i64 },
}

/// Result of a successful code verification
#[derive(Debug, Clone)]
pub struct SignedIn {
    pub session: Session,
    pub identity: Identity,
}

/// Identity service for sign-in and session management
pub struct IdentityService {
    identities: Arc<dyn IdentityRepository>,
    sessions: Arc<dyn SessionRepository>,
    codes: Arc<dyn OneTimeCodeRepository>,
    mailer: Arc<dyn CodeMailer>,
    events: broadcast::Sender<IdentityEvent>,
    limiter: Arc<SignInLimiter>,
    session_ttl: Duration,
    code_ttl: Duration,
}

impl IdentityService {
    pub fn new(
        identities: Arc<dyn IdentityRepository>,
        sessions: Arc<dyn SessionRepository>,
        codes: Arc<dyn OneTimeCodeRepository>,
        mailer: Arc<dyn CodeMailer>,
        config: &AuthConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            identities,
            sessions,
            codes,
            mailer,
            events,
            limiter: Arc::new(SignInLimiter::new(
                config.max_code_attempts,
                Duration::minutes(config.attempt_window_minutes),
            )),
            session_ttl: Duration::days(config.session_days),
            code_ttl: Duration::minutes(config.code_ttl_minutes),
        }
    }

    /// Subscribe to sign-in and sign-out events
    pub fn subscribe(&self) -> broadcast::Receiver<IdentityEvent> {
        self.events.subscribe()
    }

    /// Attempt counters shared with the HTTP layer
    pub fn limiter(&self) -> &Arc<SignInLimiter> {
        &self.limiter
    }

    /// Mail a fresh sign-in code to a known identity
    ///
    /// Any previously issued code for the email stops working. An unknown
    /// email succeeds without sending anything, so callers cannot tell which
    /// addresses belong to staff.
    pub async fn sign_in_with_one_time_code(&self, email: &str) -> Result<(), IdentityError> {
        let email = parse_email(email)?;

        if self.identities.get_by_email(&email).await?.is_none() {
            tracing::info!(email = %email, "Sign-in code requested for unknown email");
            return Ok(());
        }

        let now = Utc::now();
        let code = OneTimeCode {
            email: email.clone(),
            code: random_sign_in_code()?,
            expires_at: now + self.code_ttl,
            created_at: now,
        };
        self.codes.replace(&code).await?;

        self.mailer
            .send_code(&email, &code.code)
            .await
            .map_err(IdentityError::Delivery)?;

        tracing::info!(email = %email, "Sign-in code issued");
        Ok(())
    }

    /// Exchange a code for a session
    pub async fn verify_code(&self, email: &str, code: &str) -> Result<SignedIn, IdentityError> {
        let email = parse_email(email)?;
        let code = code.trim();
        if code.is_empty() {
            return Err(IdentityError::CodeRequired);
        }

        if self.limiter.is_locked(&email).await {
            return Err(self.locked_out());
        }

        let Some(stored) = self.codes.get(&email).await? else {
            return Err(self.reject(&email).await?);
        };
        if stored.is_expired() {
            self.codes.delete(&email).await?;
            return Err(self.reject(&email).await?);
        }
        if stored.code != code {
            return Err(self.reject(&email).await?);
        }
        self.codes.delete(&email).await?;
        self.limiter.clear(&email).await;

        // The identity may have been removed after the code was issued
        let Some(identity) = self.identities.get_by_email(&email).await? else {
            return Err(IdentityError::InvalidCode);
        };

        let now = Utc::now();
        let session = self
            .sessions
            .create(&Session {
                id: Uuid::new_v4().to_string(),
                identity_id: identity.id,
                expires_at: now + self.session_ttl,
                created_at: now,
            })
            .await?;

        // No receivers is fine
        let _ = self.events.send(IdentityEvent::SignedIn(identity.clone()));
        tracing::info!(identity_id = identity.id, email = %identity.email, "Signed in");

        Ok(SignedIn { session, identity })
    }

    /// Count a failed verification, revoking the code once the limit is hit
    async fn reject(&self, email: &str) -> Result<IdentityError, IdentityError> {
        let failures = self.limiter.record_failure(email).await;
        if failures < self.limiter.max_failures() {
            return Ok(IdentityError::InvalidCode);
        }

        self.codes.delete(email).await?;
        tracing::warn!(email = %email, failures, "Sign-in locked after repeated wrong codes");
        Ok(self.locked_out())
    }

    fn locked_out(&self) -> IdentityError {
        IdentityError::TooManyAttempts {
            retry_after: self.limiter.failure_window().num_seconds(),
        }
    }

    /// Identity behind a session token
    ///
    /// Expired sessions are deleted on sight.
    pub async fn current_identity(&self, token: &str) -> Result<Option<Identity>, IdentityError> {
        Ok(self.resolve(token).await?.map(|(_, identity)| identity))
    }

    /// Build the session context for a request
    pub async fn session_context(&self, token: Option<&str>) -> Result<SessionContext, IdentityError> {
        let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) else {
            return Ok(SessionContext::anonymous());
        };

        Ok(match self.resolve(token).await? {
            Some((session, identity)) => {
                SessionContext::active(identity, session.id, session.expires_at)
            }
            None => SessionContext::anonymous(),
        })
    }

    async fn resolve(&self, token: &str) -> Result<Option<(Session, Identity)>, IdentityError> {
        let Some(session) = self.sessions.get_by_id(token).await? else {
            return Ok(None);
        };

        if session.is_expired() {
            self.sessions.delete(&session.id).await?;
            return Ok(None);
        }

        let identity = self.identities.get_by_id(session.identity_id).await?;
        Ok(identity.map(|identity| (session, identity)))
    }

    /// End the session carried by the context
    pub async fn sign_out(&self, ctx: &mut SessionContext) -> Result<(), IdentityError> {
        let identity_id = ctx.identity().map(|identity| identity.id);
        if let Some(token) = ctx.token() {
            self.sessions.delete(token).await?;
        }
        ctx.invalidate();

        if let Some(identity_id) = identity_id {
            let _ = self.events.send(IdentityEvent::SignedOut { identity_id });
            tracing::info!(identity_id, "Signed out");
        }
        Ok(())
    }

    /// Register a new identity (admin only)
    pub async fn invite(
        &self,
        ctx: &SessionContext,
        email: &str,
        role: Role,
    ) -> Result<Identity, ActionError> {
        let admin = ctx.require_admin()?;
        let email = parse_email(email)?;

        if self.identities.get_by_email(&email).await?.is_some() {
            return Err(IdentityError::AlreadyExists(email).into());
        }

        let created = self.identities.create(&Identity::new(&email, role)).await?;
        tracing::info!(invited_by = admin.id, email = %created.email, role = %created.role, "Identity invited");
        Ok(created)
    }

    /// All identities (admin only)
    pub async fn list_identities(&self, ctx: &SessionContext) -> Result<Vec<Identity>, ActionError> {
        ctx.require_admin()?;
        Ok(self.identities.list().await?)
    }

    /// Make sure the configured admin exists and holds the admin role
    pub async fn ensure_admin(&self, email: &str) -> Result<Identity, IdentityError> {
        let email = parse_email(email)?;

        match self.identities.get_by_email(&email).await? {
            Some(existing) if existing.is_admin() => Ok(existing),
            Some(mut existing) => {
                self.identities.update_role(existing.id, Role::Admin).await?;
                existing.role = Role::Admin;
                tracing::info!(email = %email, "Promoted configured admin");
                Ok(existing)
            }
            None => {
                let created = self.identities.create(&Identity::new(&email, Role::Admin)).await?;
                tracing::info!(email = %email, "Seeded admin identity");
                Ok(created)
            }
        }
    }

    /// Drop expired sessions and codes, returning how many were removed
    pub async fn cleanup_expired(&self) -> Result<i64, IdentityError> {
        let sessions = self.sessions.delete_expired().await?;
        let codes = self.codes.delete_expired().await?;
        if sessions + codes > 0 {
            tracing::debug!(sessions, codes, "Removed expired sign-in state");
        }
        Ok(sessions + codes)
    }
}

fn parse_email(email: &str) -> Result<String, IdentityError> {
    let email = normalize_email(email);
    if email.is_empty() {
        return Err(IdentityError::EmailRequired);
    }
    if !is_valid_email(&email) {
        return Err(IdentityError::InvalidEmail(email));
    }
    Ok(email)
}

/// Number of distinct sign-in codes
const CODE_SPACE: u32 = 1_000_000;

/// Six uniformly random digits from the OS generator
///
/// Draws above the largest multiple of `CODE_SPACE` are discarded so every
/// code is equally likely.
fn random_sign_in_code() -> anyhow::Result<String> {
    let limit = u32::MAX - (u32::MAX % CODE_SPACE);
    loop {
        let mut bytes = [0u8; 4];
        getrandom::fill(&mut bytes).map_err(|e| anyhow::anyhow!("Failed to read random bytes: {}", e))?;
        let value = u32::from_le_bytes(bytes);
        if value < limit {
            return Ok(format!("{:06}", value % CODE_SPACE));
        }
    }
}
