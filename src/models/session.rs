//! Session and one-time code models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Signed-in session; `id` doubles as the bearer token
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub id: String,
    pub identity_id: i64,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }

    /// Time left before the token stops resolving, zero once expired
    pub fn remaining(&self) -> chrono::Duration {
        (self.expires_at - Utc::now()).max(chrono::Duration::zero())
    }
}

/// Six-digit sign-in code mailed to an identity
#[derive(Debug, Clone)]
pub struct OneTimeCode {
    pub email: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl OneTimeCode {
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_session_expiry() {
        let now = Utc::now();
        let live = Session {
            id: "live".to_string(),
            identity_id: 1,
            expires_at: now + Duration::days(7),
            created_at: now,
        };
        let stale = Session {
            expires_at: now - Duration::seconds(1),
            ..live.clone()
        };

        assert!(!live.is_expired());
        assert!(stale.is_expired());
        assert!(live.remaining() > Duration::days(6));
        assert_eq!(stale.remaining(), Duration::zero());
    }
}
