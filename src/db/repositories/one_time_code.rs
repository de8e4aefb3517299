//! One-time code repository
//!
//! Stores the six-digit sign-in codes. At most one code is kept per email:
//! saving a new code replaces the previous one.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::OneTimeCode;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait OneTimeCodeRepository: Send + Sync {
    /// Store a code, replacing any previous code for the same email
    async fn replace(&self, code: &OneTimeCode) -> Result<()>;

    /// Get the live code for an email, if any
    async fn get(&self, email: &str) -> Result<Option<OneTimeCode>>;

    /// Delete the code for an email
    async fn delete(&self, email: &str) -> Result<()>;

    /// Delete expired codes
    async fn delete_expired(&self) -> Result<i64>;
}

pub struct SqlxOneTimeCodeRepository {
    pool: DynDatabasePool,
}

impl SqlxOneTimeCodeRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn OneTimeCodeRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl OneTimeCodeRepository for SqlxOneTimeCodeRepository {
    async fn replace(&self, code: &OneTimeCode) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => replace_code_sqlite(self.pool.sqlite()?, code).await,
            DatabaseDriver::Mysql => replace_code_mysql(self.pool.mysql()?, code).await,
        }
    }

    async fn get(&self, email: &str) -> Result<Option<OneTimeCode>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_code_sqlite(self.pool.sqlite()?, email).await,
            DatabaseDriver::Mysql => get_code_mysql(self.pool.mysql()?, email).await,
        }
    }

    async fn delete(&self, email: &str) -> Result<()> {
        let sql = "DELETE FROM one_time_codes WHERE email = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(email)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to delete one-time code")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(email)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to delete one-time code")?;
            }
        }
        Ok(())
    }

    async fn delete_expired(&self) -> Result<i64> {
        let sql = "DELETE FROM one_time_codes WHERE expires_at < ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(Utc::now())
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to delete expired one-time codes")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(Utc::now())
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to delete expired one-time codes")?
                .rows_affected(),
        };
        Ok(affected as i64)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn replace_code_sqlite(pool: &SqlitePool, code: &OneTimeCode) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query("DELETE FROM one_time_codes WHERE email = ?")
        .bind(&code.email)
        .execute(&mut *tx)
        .await
        .context("Failed to clear previous one-time code")?;

    sqlx::query(
        "INSERT INTO one_time_codes (email, code, expires_at, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&code.email)
    .bind(&code.code)
    .bind(code.expires_at)
    .bind(code.created_at)
    .execute(&mut *tx)
    .await
    .context("Failed to save one-time code")?;

    tx.commit().await.context("Failed to commit one-time code")?;
    Ok(())
}

async fn get_code_sqlite(pool: &SqlitePool, email: &str) -> Result<Option<OneTimeCode>> {
    let row = sqlx::query(
        r#"
        SELECT email, code, expires_at, created_at
        FROM one_time_codes
        WHERE email = ?
        ORDER BY id DESC
        LIMIT 1
        "#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await
    .context("Failed to get one-time code")?;

    Ok(row.map(|row| OneTimeCode {
        email: row.get("email"),
        code: row.get("code"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    }))
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn replace_code_mysql(pool: &MySqlPool, code: &OneTimeCode) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query("DELETE FROM one_time_codes WHERE email = ?")
        .bind(&code.email)
        .execute(&mut *tx)
        .await
        .context("Failed to clear previous one-time code")?;

    sqlx::query(
        "INSERT INTO one_time_codes (email, code, expires_at, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&code.email)
    .bind(&code.code)
    .bind(code.expires_at)
    .bind(code.created_at)
    .execute(&mut *tx)
    .await
    .context("Failed to save one-time code")?;

    tx.commit().await.context("Failed to commit one-time code")?;
    Ok(())
}

async fn get_code_mysql(pool: &MySqlPool, email: &str) -> Result<Option<OneTimeCode>> {
    let row = sqlx::query(
        r#"
        SELECT email, code, expires_at, created_at
        FROM one_time_codes
        WHERE email = ?
        ORDER BY id DESC
        LIMIT 1
        "#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await
    .context("Failed to get one-time code")?;

    Ok(row.map(|row| OneTimeCode {
        email: row.get("email"),
        code: row.get("code"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    }))
}
