//! Per-request session context
//!
//! Middleware resolves the presented token into a [`SessionContext`] and
//! every action receives it by reference. Sign-out invalidates it in place.

use chrono::{DateTime, Utc};

use super::ActionError;
use crate::models::Identity;

/// Lifecycle of a request's session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// No valid token was presented
    Anonymous,
    /// Signed in
    Active {
        identity: Identity,
        token: String,
        expires_at: DateTime<Utc>,
    },
    /// Signed out during this request
    Invalidated,
}

/// Authentication state handed to every action
#[derive(Debug, Clone, PartialEq)]
pub struct SessionContext {
    state: SessionState,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl SessionContext {
    pub fn anonymous() -> Self {
        Self {
            state: SessionState::Anonymous,
        }
    }

    pub fn active(identity: Identity, token: String, expires_at: DateTime<Utc>) -> Self {
        Self {
            state: SessionState::Active {
                identity,
                token,
                expires_at,
            },
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Identity of a live session
    pub fn identity(&self) -> Option<&Identity> {
        match &self.state {
            SessionState::Active {
                identity,
                expires_at,
                ..
            } if *expires_at > Utc::now() => Some(identity),
            _ => None,
        }
    }

    /// Session token, if signed in
    pub fn token(&self) -> Option<&str> {
        match &self.state {
            SessionState::Active { token, .. } => Some(token),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.identity().is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.identity().is_some_and(Identity::is_admin)
    }

    /// The signed-in identity, or `Unauthorized`
    pub fn require(&self) -> Result<&Identity, ActionError> {
        self.identity().ok_or(ActionError::Unauthorized)
    }

    /// The signed-in admin, `Unauthorized` or `Forbidden`
    pub fn require_admin(&self) -> Result<&Identity, ActionError> {
        let identity = self.require()?;
        if !identity.is_admin() {
            return Err(ActionError::Forbidden("Admin access required".to_string()));
        }
        Ok(identity)
    }

    pub fn invalidate(&mut self) {
        self.state = SessionState::Invalidated;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use chrono::Duration;

    fn active(role: Role, expires_in: Duration) -> SessionContext {
        let mut identity = Identity::new("staff@news.test", role);
        identity.id = 1;
        SessionContext::active(identity, "token".to_string(), Utc::now() + expires_in)
    }

    #[test]
    fn test_anonymous_is_rejected() {
        let ctx = SessionContext::anonymous();
        assert!(matches!(ctx.require(), Err(ActionError::Unauthorized)));
        assert!(matches!(ctx.require_admin(), Err(ActionError::Unauthorized)));
        assert!(ctx.token().is_none());
    }

    #[test]
    fn test_active_editor() {
        let ctx = active(Role::Editor, Duration::days(1));
        assert_eq!(ctx.require().unwrap().email, "staff@news.test");
        assert!(matches!(ctx.require_admin(), Err(ActionError::Forbidden(_))));
        assert!(!ctx.is_admin());
    }

    #[test]
    fn test_active_admin() {
        let ctx = active(Role::Admin, Duration::days(1));
        assert!(ctx.require_admin().is_ok());
        assert!(ctx.is_admin());
    }

    #[test]
    fn test_expired_session_is_rejected() {
        let ctx = active(Role::Admin, Duration::seconds(-1));
        assert!(matches!(ctx.require(), Err(ActionError::Unauthorized)));
    }

    #[test]
    fn test_invalidate() {
        let mut ctx = active(Role::Editor, Duration::days(1));
        ctx.invalidate();
        assert_eq!(ctx.state(), &SessionState::Invalidated);
        assert!(matches!(ctx.require(), Err(ActionError::Unauthorized)));
    }
}
