//! Identity model
//!
//! An identity is a staff account that may sign in to the admin panel.
//! Identities are seeded from configuration or invited by an admin; signing
//! in never creates one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Staff account able to sign in with a one-time code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Unique identifier
    pub id: i64,
    /// Email address (unique, lowercase)
    pub email: String,
    /// Role stored on the server
    pub role: Role,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Identity {
    /// Create a new Identity. The email is normalized.
    pub fn new(email: &str, role: Role) -> Self {
        Self {
            id: 0, // Will be set by the database
            email: normalize_email(email),
            role,
            created_at: Utc::now(),
        }
    }

    /// Check if this identity has admin privileges
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Identity role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full access, including identity management
    Admin,
    /// Manages content
    #[default]
    Editor,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Editor => write!(f, "editor"),
        }
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "editor" => Ok(Role::Editor),
            _ => Err(anyhow::anyhow!("Invalid role: {}", s)),
        }
    }
}

/// Trim and lowercase an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Loose shape check: one `@` with non-empty local part and a dotted domain.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_new_normalizes_email() {
        let identity = Identity::new("  Editor@News.TEST ", Role::Editor);
        assert_eq!(identity.id, 0);
        assert_eq!(identity.email, "editor@news.test");
        assert!(!identity.is_admin());
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("EDITOR".parse::<Role>().unwrap(), Role::Editor);
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_display_matches_serde() {
        assert_eq!(Role::Admin.to_string(), "admin");
        assert_eq!(serde_json::to_string(&Role::Editor).unwrap(), "\"editor\"");
    }

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("a@news.test"));
        assert!(!is_valid_email("news.test"));
        assert!(!is_valid_email("@news.test"));
        assert!(!is_valid_email("a@news"));
        assert!(!is_valid_email("a@@news.test"));
        assert!(!is_valid_email("a b@news.test"));
    }
}
