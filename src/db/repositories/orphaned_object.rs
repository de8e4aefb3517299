//! Orphaned object repository
//!
//! Storage paths whose best-effort removal failed. The sweeper retries them
//! and deletes the record once the object is gone.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{OrphanReason, OrphanedObject};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait OrphanedObjectRepository: Send + Sync {
    /// Record a path whose removal failed
    async fn record(&self, path: &str, reason: OrphanReason, error: &str) -> Result<OrphanedObject>;

    /// Oldest recorded objects first
    async fn list(&self, limit: i64) -> Result<Vec<OrphanedObject>>;

    /// Bump the attempt counter after another failed removal
    async fn mark_failed(&self, id: i64, error: &str) -> Result<()>;

    /// Forget an object once it has been removed
    async fn delete(&self, id: i64) -> Result<()>;

    async fn count(&self) -> Result<i64>;
}

pub struct SqlxOrphanedObjectRepository {
    pool: DynDatabasePool,
}

impl SqlxOrphanedObjectRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn OrphanedObjectRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl OrphanedObjectRepository for SqlxOrphanedObjectRepository {
    async fn record(&self, path: &str, reason: OrphanReason, error: &str) -> Result<OrphanedObject> {
        let orphan = OrphanedObject {
            id: 0,
            path: path.to_string(),
            reason,
            attempts: 1,
            last_error: Some(error.to_string()),
            created_at: Utc::now(),
        };
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => record_orphan_sqlite(self.pool.sqlite()?, &orphan).await?,
            DatabaseDriver::Mysql => record_orphan_mysql(self.pool.mysql()?, &orphan).await?,
        };
        Ok(OrphanedObject { id, ..orphan })
    }

    async fn list(&self, limit: i64) -> Result<Vec<OrphanedObject>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_orphans_sqlite(self.pool.sqlite()?, limit).await,
            DatabaseDriver::Mysql => list_orphans_mysql(self.pool.mysql()?, limit).await,
        }
    }

    async fn mark_failed(&self, id: i64, error: &str) -> Result<()> {
        let sql = "UPDATE orphaned_objects SET attempts = attempts + 1, last_error = ? WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(error)
                    .bind(id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to update orphaned object")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(error)
                    .bind(id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to update orphaned object")?;
            }
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let sql = "DELETE FROM orphaned_objects WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to delete orphaned object")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to delete orphaned object")?;
            }
        }
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        let sql = "SELECT COUNT(*) FROM orphaned_objects";
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query_scalar(sql)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count orphaned objects")?,
            DatabaseDriver::Mysql => sqlx::query_scalar(sql)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to count orphaned objects")?,
        };
        Ok(count)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn record_orphan_sqlite(pool: &SqlitePool, orphan: &OrphanedObject) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO orphaned_objects (path, reason, attempts, last_error, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&orphan.path)
    .bind(orphan.reason.as_str())
    .bind(orphan.attempts)
    .bind(&orphan.last_error)
    .bind(orphan.created_at)
    .execute(pool)
    .await
    .context("Failed to record orphaned object")?;

    Ok(result.last_insert_rowid())
}

async fn list_orphans_sqlite(pool: &SqlitePool, limit: i64) -> Result<Vec<OrphanedObject>> {
    let rows = sqlx::query(
        r#"
        SELECT id, path, reason, attempts, last_error, created_at
        FROM orphaned_objects
        ORDER BY id
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to list orphaned objects")?;

    Ok(rows
        .iter()
        .map(|row| {
            let reason: String = row.get("reason");
            OrphanedObject {
                id: row.get("id"),
                path: row.get("path"),
                reason: OrphanReason::parse(&reason),
                attempts: row.get("attempts"),
                last_error: row.get("last_error"),
                created_at: row.get("created_at"),
            }
        })
        .collect())
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn record_orphan_mysql(pool: &MySqlPool, orphan: &OrphanedObject) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO orphaned_objects (path, reason, attempts, last_error, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&orphan.path)
    .bind(orphan.reason.as_str())
    .bind(orphan.attempts)
    .bind(&orphan.last_error)
    .bind(orphan.created_at)
    .execute(pool)
    .await
    .context("Failed to record orphaned object")?;

    Ok(result.last_insert_id() as i64)
}

async fn list_orphans_mysql(pool: &MySqlPool, limit: i64) -> Result<Vec<OrphanedObject>> {
    let rows = sqlx::query(
        r#"
        SELECT id, path, reason, attempts, last_error, created_at
        FROM orphaned_objects
        ORDER BY id
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to list orphaned objects")?;

    Ok(rows
        .iter()
        .map(|row| {
            let reason: String = row.get("reason");
            OrphanedObject {
                id: row.get("id"),
                path: row.get("path"),
                reason: OrphanReason::parse(&reason),
                attempts: row.get("attempts"),
                last_error: row.get("last_error"),
                created_at: row.get("created_at"),
            }
        })
        .collect())
}
