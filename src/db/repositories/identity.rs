//! Identity repository
//!
//! Database operations for staff identities.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Identity, Role};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Identity repository trait
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    /// Create a new identity
    async fn create(&self, identity: &Identity) -> Result<Identity>;

    /// Get identity by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Identity>>;

    /// Get identity by (normalized) email
    async fn get_by_email(&self, email: &str) -> Result<Option<Identity>>;

    /// List all identities, oldest first
    async fn list(&self) -> Result<Vec<Identity>>;

    /// Change the role of an identity
    async fn update_role(&self, id: i64, role: Role) -> Result<()>;
}

/// SQLx-based identity repository implementation
pub struct SqlxIdentityRepository {
    pool: DynDatabasePool,
}

impl SqlxIdentityRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn IdentityRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl IdentityRepository for SqlxIdentityRepository {
    async fn create(&self, identity: &Identity) -> Result<Identity> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_identity_sqlite(self.pool.sqlite()?, identity).await,
            DatabaseDriver::Mysql => create_identity_mysql(self.pool.mysql()?, identity).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Identity>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_identity_sqlite(self.pool.sqlite()?, "id = ?", IdentityKey::Id(id)).await
            }
            DatabaseDriver::Mysql => {
                get_identity_mysql(self.pool.mysql()?, "id = ?", IdentityKey::Id(id)).await
            }
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<Identity>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_identity_sqlite(self.pool.sqlite()?, "email = ?", IdentityKey::Email(email))
                    .await
            }
            DatabaseDriver::Mysql => {
                get_identity_mysql(self.pool.mysql()?, "email = ?", IdentityKey::Email(email))
                    .await
            }
        }
    }

    async fn list(&self) -> Result<Vec<Identity>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_identities_sqlite(self.pool.sqlite()?).await,
            DatabaseDriver::Mysql => list_identities_mysql(self.pool.mysql()?).await,
        }
    }

    async fn update_role(&self, id: i64, role: Role) -> Result<()> {
        let sql = "UPDATE identities SET role = ? WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(role.to_string())
                    .bind(id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to update identity role")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(role.to_string())
                    .bind(id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to update identity role")?;
            }
        }
        Ok(())
    }
}

enum IdentityKey<'a> {
    Id(i64),
    Email(&'a str),
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_identity_sqlite(pool: &SqlitePool, identity: &Identity) -> Result<Identity> {
    let result = sqlx::query("INSERT INTO identities (email, role, created_at) VALUES (?, ?, ?)")
        .bind(&identity.email)
        .bind(identity.role.to_string())
        .bind(identity.created_at)
        .execute(pool)
        .await
        .context("Failed to create identity")?;

    Ok(Identity {
        id: result.last_insert_rowid(),
        ..identity.clone()
    })
}

async fn get_identity_sqlite(
    pool: &SqlitePool,
    condition: &str,
    key: IdentityKey<'_>,
) -> Result<Option<Identity>> {
    let sql = format!(
        "SELECT id, email, role, created_at FROM identities WHERE {}",
        condition
    );
    let query = sqlx::query(&sql);
    let query = match key {
        IdentityKey::Id(id) => query.bind(id),
        IdentityKey::Email(email) => query.bind(email.to_string()),
    };
    let row = query
        .fetch_optional(pool)
        .await
        .context("Failed to get identity")?;

    row.map(|row| row_to_identity_sqlite(&row)).transpose()
}

async fn list_identities_sqlite(pool: &SqlitePool) -> Result<Vec<Identity>> {
    let rows = sqlx::query("SELECT id, email, role, created_at FROM identities ORDER BY id")
        .fetch_all(pool)
        .await
        .context("Failed to list identities")?;

    rows.iter().map(row_to_identity_sqlite).collect()
}

fn row_to_identity_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Identity> {
    let role: String = row.get("role");
    Ok(Identity {
        id: row.get("id"),
        email: row.get("email"),
        role: role.parse()?,
        created_at: row.get("created_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_identity_mysql(pool: &MySqlPool, identity: &Identity) -> Result<Identity> {
    let result = sqlx::query("INSERT INTO identities (email, role, created_at) VALUES (?, ?, ?)")
        .bind(&identity.email)
        .bind(identity.role.to_string())
        .bind(identity.created_at)
        .execute(pool)
        .await
        .context("Failed to create identity")?;

    Ok(Identity {
        id: result.last_insert_id() as i64,
        ..identity.clone()
    })
}

async fn get_identity_mysql(
    pool: &MySqlPool,
    condition: &str,
    key: IdentityKey<'_>,
) -> Result<Option<Identity>> {
    let sql = format!(
        "SELECT id, email, role, created_at FROM identities WHERE {}",
        condition
    );
    let query = sqlx::query(&sql);
    let query = match key {
        IdentityKey::Id(id) => query.bind(id),
        IdentityKey::Email(email) => query.bind(email.to_string()),
    };
    let row = query
        .fetch_optional(pool)
        .await
        .context("Failed to get identity")?;

    row.map(|row| row_to_identity_mysql(&row)).transpose()
}

async fn list_identities_mysql(pool: &MySqlPool) -> Result<Vec<Identity>> {
    let rows = sqlx::query("SELECT id, email, role, created_at FROM identities ORDER BY id")
        .fetch_all(pool)
        .await
        .context("Failed to list identities")?;

    rows.iter().map(row_to_identity_mysql).collect()
}

fn row_to_identity_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Identity> {
    let role: String = row.get("role");
    Ok(Identity {
        id: row.get("id"),
        email: row.get("email"),
        role: role.parse()?,
        created_at: row.get("created_at"),
    })
}
