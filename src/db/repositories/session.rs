//! Session storage
//!
//! Session statements are plain SQL shared by both backends, so each method
//! is written once and run through `on_pool!`.

use crate::db::DynDatabasePool;
use crate::models::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

const SESSION_COLUMNS: &str = "id, identity_id, expires_at, created_at";

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &Session) -> Result<Session>;

    /// Look up a session by its token, expired or not
    async fn get_by_id(&self, id: &str) -> Result<Option<Session>>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// Sign an identity out everywhere
    async fn delete_by_identity(&self, identity_id: i64) -> Result<()>;

    /// Remove sessions past their expiry, returning how many went
    async fn delete_expired(&self) -> Result<i64>;
}

pub struct SqlxSessionRepository {
    db: DynDatabasePool,
}

impl SqlxSessionRepository {
    pub fn new(db: DynDatabasePool) -> Self {
        Self { db }
    }

    pub fn boxed(db: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(db))
    }

    async fn delete_where(&self, condition: &str, bind: DeleteBind<'_>) -> Result<u64> {
        let sql = format!("DELETE FROM sessions WHERE {}", condition);
        let affected = on_pool!(self.db, |pool| {
            let query = sqlx::query(&sql);
            let query = match bind {
                DeleteBind::Token(token) => query.bind(token),
                DeleteBind::Identity(identity_id) => query.bind(identity_id),
                DeleteBind::Now => query.bind(Utc::now()),
            };
            query.execute(pool).await?.rows_affected()
        });
        Ok(affected)
    }
}

/// The single parameter each delete statement takes
enum DeleteBind<'a> {
    Token(&'a str),
    Identity(i64),
    Now,
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        let sql = format!("INSERT INTO sessions ({}) VALUES (?, ?, ?, ?)", SESSION_COLUMNS);
        on_pool!(self.db, |pool| {
            sqlx::query(&sql)
                .bind(&session.id)
                .bind(session.identity_id)
                .bind(session.expires_at)
                .bind(session.created_at)
                .execute(pool)
                .await
                .context("Failed to create session")?;
        });
        Ok(session.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        let sql = format!("SELECT {} FROM sessions WHERE id = ?", SESSION_COLUMNS);
        let session = on_pool!(self.db, |pool| {
            sqlx::query_as::<_, Session>(&sql)
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("Failed to load session")?
        });
        Ok(session)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.delete_where("id = ?", DeleteBind::Token(id))
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    async fn delete_by_identity(&self, identity_id: i64) -> Result<()> {
        self.delete_where("identity_id = ?", DeleteBind::Identity(identity_id))
            .await
            .context("Failed to delete sessions for identity")?;
        Ok(())
    }

    async fn delete_expired(&self) -> Result<i64> {
        let removed = self
            .delete_where("expires_at < ?", DeleteBind::Now)
            .await
            .context("Failed to delete expired sessions")?;
        Ok(removed as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use chrono::Duration;
    use uuid::Uuid;

    async fn repo_with_staff(staff: &[i64]) -> SqlxSessionRepository {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        for id in staff {
            sqlx::query("INSERT INTO identities (id, email, role, created_at) VALUES (?, ?, 'editor', ?)")
                .bind(id)
                .bind(format!("staff{}@news.test", id))
                .bind(Utc::now())
                .execute(pool.sqlite().unwrap())
                .await
                .unwrap();
        }
        SqlxSessionRepository::new(pool)
    }

    fn session_for(identity_id: i64, days: i64) -> Session {
        let now = Utc::now();
        Session {
            id: Uuid::new_v4().to_string(),
            identity_id,
            expires_at: now + Duration::days(days),
            created_at: now,
        }
    }

    #[tokio::test]
    async fn test_token_lookup() {
        let repo = repo_with_staff(&[1]).await;
        let session = session_for(1, 7);
        repo.create(&session).await.unwrap();

        let found = repo.get_by_id(&session.id).await.unwrap().unwrap();
        assert_eq!(found.identity_id, 1);
        assert!(!found.is_expired());
        assert!(repo.get_by_id("not-a-token").await.unwrap().is_none());

        repo.delete(&session.id).await.unwrap();
        assert!(repo.get_by_id(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sign_out_everywhere_keeps_other_staff() {
        let repo = repo_with_staff(&[1, 2]).await;
        let laptop = session_for(1, 7);
        let phone = session_for(1, 7);
        let colleague = session_for(2, 7);
        for session in [&laptop, &phone, &colleague] {
            repo.create(session).await.unwrap();
        }

        repo.delete_by_identity(1).await.unwrap();

        assert!(repo.get_by_id(&laptop.id).await.unwrap().is_none());
        assert!(repo.get_by_id(&phone.id).await.unwrap().is_none());
        assert!(repo.get_by_id(&colleague.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_expired_counts_removed() {
        let repo = repo_with_staff(&[1]).await;
        let live = session_for(1, 7);
        repo.create(&live).await.unwrap();
        repo.create(&session_for(1, -1)).await.unwrap();
        repo.create(&session_for(1, -3)).await.unwrap();

        assert_eq!(repo.delete_expired().await.unwrap(), 2);
        assert_eq!(repo.delete_expired().await.unwrap(), 0);
        assert!(repo.get_by_id(&live.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_session_needs_existing_identity() {
        let repo = repo_with_staff(&[]).await;
        assert!(repo.create(&session_for(99, 7)).await.is_err());
    }
}
