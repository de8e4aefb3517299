//! Author repository
//!
//! Database operations for authors. Every author read carries the number of
//! news items bylined by that author.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Author, EntityOption, NamedCount};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

const AUTHOR_SELECT: &str = r#"
    SELECT a.id, a.name, a.email, a.photo_url, a.photo_path, a.active, a.created_at,
           (SELECT COUNT(*) FROM news_items n WHERE n.author_id = a.id) AS news_count
    FROM authors a
"#;

/// Author repository trait
#[async_trait]
pub trait AuthorRepository: Send + Sync {
    /// Create a new author
    async fn create(&self, author: &Author) -> Result<Author>;

    /// Get author by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Author>>;

    /// List authors, newest first, optionally only active ones
    async fn list(&self, active_only: bool) -> Result<Vec<Author>>;

    /// Update name, photo and active flag
    async fn update(&self, author: &Author) -> Result<Author>;

    /// Delete an author
    async fn delete(&self, id: i64) -> Result<()>;

    /// Number of news items referencing an author
    async fn count_news(&self, id: i64) -> Result<i64>;

    /// `{id, name}` of active authors, by name
    async fn options(&self) -> Result<Vec<EntityOption>>;

    /// News count per author, by name
    async fn stats(&self) -> Result<Vec<NamedCount>>;

    /// Total number of authors
    async fn count(&self) -> Result<i64>;
}

/// SQLx-based author repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxAuthorRepository {
    pool: DynDatabasePool,
}

impl SqlxAuthorRepository {
    /// Create a new SQLx author repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AuthorRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl AuthorRepository for SqlxAuthorRepository {
    async fn create(&self, author: &Author) -> Result<Author> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_author_sqlite(self.pool.sqlite()?, author).await,
            DatabaseDriver::Mysql => create_author_mysql(self.pool.mysql()?, author).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Author>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_author_by_id_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_author_by_id_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn list(&self, active_only: bool) -> Result<Vec<Author>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_authors_sqlite(self.pool.sqlite()?, active_only).await,
            DatabaseDriver::Mysql => list_authors_mysql(self.pool.mysql()?, active_only).await,
        }
    }

    async fn update(&self, author: &Author) -> Result<Author> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => update_author_sqlite(self.pool.sqlite()?, author).await,
            DatabaseDriver::Mysql => update_author_mysql(self.pool.mysql()?, author).await,
        }
    }

    async fn delete(&self, id: i64) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => delete_author_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => delete_author_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn count_news(&self, id: i64) -> Result<i64> {
        let sql = "SELECT COUNT(*) FROM news_items WHERE author_id = ?";
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query_scalar(sql)
                .bind(id)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count news items by author")?,
            DatabaseDriver::Mysql => sqlx::query_scalar(sql)
                .bind(id)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to count news items by author")?,
        };
        Ok(count)
    }

    async fn options(&self) -> Result<Vec<EntityOption>> {
        let sql = "SELECT id, name FROM authors WHERE active = ? ORDER BY name, id";
        let options = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(true)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list author options")?
                .iter()
                .map(|row| EntityOption {
                    id: row.get("id"),
                    name: row.get("name"),
                })
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(true)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list author options")?
                .iter()
                .map(|row| EntityOption {
                    id: row.get("id"),
                    name: row.get("name"),
                })
                .collect(),
        };
        Ok(options)
    }

    async fn stats(&self) -> Result<Vec<NamedCount>> {
        let sql = r#"
            SELECT a.id, a.name, COUNT(n.id) AS news_count
            FROM authors a
            LEFT JOIN news_items n ON n.author_id = a.id
            GROUP BY a.id, a.name
            ORDER BY a.name, a.id
        "#;
        let stats = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to load author stats")?
                .iter()
                .map(|row| NamedCount {
                    id: row.get("id"),
                    name: row.get("name"),
                    news_count: row.get("news_count"),
                })
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to load author stats")?
                .iter()
                .map(|row| NamedCount {
                    id: row.get("id"),
                    name: row.get("name"),
                    news_count: row.get("news_count"),
                })
                .collect(),
        };
        Ok(stats)
    }

    async fn count(&self) -> Result<i64> {
        let sql = "SELECT COUNT(*) FROM authors";
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query_scalar(sql)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count authors")?,
            DatabaseDriver::Mysql => sqlx::query_scalar(sql)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to count authors")?,
        };
        Ok(count)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_author_sqlite(pool: &SqlitePool, author: &Author) -> Result<Author> {
    let result = sqlx::query(
        r#"
        INSERT INTO authors (name, email, photo_url, photo_path, active, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&author.name)
    .bind(&author.email)
    .bind(&author.photo_url)
    .bind(&author.photo_path)
    .bind(author.active)
    .bind(author.created_at)
    .execute(pool)
    .await
    .context("Failed to create author")?;

    Ok(Author {
        id: result.last_insert_rowid(),
        news_count: 0,
        ..author.clone()
    })
}

async fn get_author_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Author>> {
    let sql = format!("{} WHERE a.id = ?", AUTHOR_SELECT);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get author by ID")?;

    row.map(|row| row_to_author_sqlite(&row)).transpose()
}

async fn list_authors_sqlite(pool: &SqlitePool, active_only: bool) -> Result<Vec<Author>> {
    let filter = if active_only { "WHERE a.active = 1" } else { "" };
    let sql = format!(
        "{} {} ORDER BY a.created_at DESC, a.id DESC",
        AUTHOR_SELECT, filter
    );
    let rows = sqlx::query(&sql)
        .fetch_all(pool)
        .await
        .context("Failed to list authors")?;

    rows.iter().map(row_to_author_sqlite).collect()
}

async fn update_author_sqlite(pool: &SqlitePool, author: &Author) -> Result<Author> {
    sqlx::query(
        r#"
        UPDATE authors
        SET name = ?, photo_url = ?, photo_path = ?, active = ?
        WHERE id = ?
        "#,
    )
    .bind(&author.name)
    .bind(&author.photo_url)
    .bind(&author.photo_path)
    .bind(author.active)
    .bind(author.id)
    .execute(pool)
    .await
    .context("Failed to update author")?;

    get_author_by_id_sqlite(pool, author.id)
        .await?
        .context("Author not found after update")
}

async fn delete_author_sqlite(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM authors WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete author")?;

    Ok(())
}

fn row_to_author_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Author> {
    Ok(Author {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        photo_url: row.get("photo_url"),
        photo_path: row.get("photo_path"),
        active: row.get("active"),
        news_count: row.get("news_count"),
        created_at: row.get("created_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_author_mysql(pool: &MySqlPool, author: &Author) -> Result<Author> {
    let result = sqlx::query(
        r#"
        INSERT INTO authors (name, email, photo_url, photo_path, active, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&author.name)
    .bind(&author.email)
    .bind(&author.photo_url)
    .bind(&author.photo_path)
    .bind(author.active)
    .bind(author.created_at)
    .execute(pool)
    .await
    .context("Failed to create author")?;

    Ok(Author {
        id: result.last_insert_id() as i64,
        news_count: 0,
        ..author.clone()
    })
}

async fn get_author_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Author>> {
    let sql = format!("{} WHERE a.id = ?", AUTHOR_SELECT);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get author by ID")?;

    row.map(|row| row_to_author_mysql(&row)).transpose()
}

async fn list_authors_mysql(pool: &MySqlPool, active_only: bool) -> Result<Vec<Author>> {
    let filter = if active_only { "WHERE a.active = TRUE" } else { "" };
    let sql = format!(
        "{} {} ORDER BY a.created_at DESC, a.id DESC",
        AUTHOR_SELECT, filter
    );
    let rows = sqlx::query(&sql)
        .fetch_all(pool)
        .await
        .context("Failed to list authors")?;

    rows.iter().map(row_to_author_mysql).collect()
}

async fn update_author_mysql(pool: &MySqlPool, author: &Author) -> Result<Author> {
    sqlx::query(
        r#"
        UPDATE authors
        SET name = ?, photo_url = ?, photo_path = ?, active = ?
        WHERE id = ?
        "#,
    )
    .bind(&author.name)
    .bind(&author.photo_url)
    .bind(&author.photo_path)
    .bind(author.active)
    .bind(author.id)
    .execute(pool)
    .await
    .context("Failed to update author")?;

    get_author_by_id_mysql(pool, author.id)
        .await?
        .context("Author not found after update")
}

async fn delete_author_mysql(pool: &MySqlPool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM authors WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete author")?;

    Ok(())
}

fn row_to_author_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Author> {
    Ok(Author {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        photo_url: row.get("photo_url"),
        photo_path: row.get("photo_path"),
        active: row.get("active"),
        news_count: row.get("news_count"),
        created_at: row.get("created_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Category, LocalizedCopy, NewsInput, NewsItem};
    use crate::db::repositories::{
        CategoryRepository, NewsRepository, SqlxCategoryRepository, SqlxNewsRepository,
    };

    async fn setup_test_repo() -> (DynDatabasePool, SqlxAuthorRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxAuthorRepository::new(pool.clone());
        (pool, repo)
    }

    fn create_test_author(name: &str) -> Author {
        Author::new(
            name.to_string(),
            format!("{}@news.test", name.to_lowercase()),
            "/static/default-author.png".to_string(),
            None,
        )
    }

    async fn add_news(pool: &DynDatabasePool, author_id: i64) {
        let categories = SqlxCategoryRepository::new(pool.clone());
        let category = match categories.get_by_name("General").await.unwrap() {
            Some(category) => category,
            None => categories.create(&Category::new("General".to_string())).await.unwrap(),
        };
        let copy = LocalizedCopy {
            heading: "h".to_string(),
            tagline: "t".to_string(),
            content: "c".to_string(),
        };
        let input = NewsInput {
            en: copy.clone(),
            hi: copy.clone(),
            ur: copy,
            author_id,
            category_id: category.id,
            tags: vec!["news".to_string()],
            read_time: 3,
        };
        SqlxNewsRepository::new(pool.clone())
            .create(&NewsItem::new(input, "/media/news/x.png".to_string(), "news/x.png".to_string()))
            .await
            .expect("Failed to create news item");
    }

    #[tokio::test]
    async fn test_create_and_get_author() {
        let (_pool, repo) = setup_test_repo().await;

        let created = repo.create(&create_test_author("Asha")).await.expect("Failed to create author");
        assert!(created.id > 0);

        let found = repo
            .get_by_id(created.id)
            .await
            .expect("Failed to get author")
            .expect("Author not found");
        assert_eq!(found.name, "Asha");
        assert_eq!(found.email, "asha@news.test");
        assert!(found.active);
        assert!(found.photo_path.is_none());
    }

    #[tokio::test]
    async fn test_list_active_only() {
        let (_pool, repo) = setup_test_repo().await;
        let asha = repo.create(&create_test_author("Asha")).await.unwrap();
        repo.create(&create_test_author("Bilal")).await.unwrap();

        let mut inactive = asha.clone();
        inactive.active = false;
        repo.update(&inactive).await.expect("Failed to update author");

        assert_eq!(repo.list(false).await.unwrap().len(), 2);
        let active = repo.list(true).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "Bilal");

        let options = repo.options().await.unwrap();
        assert_eq!(options, vec![EntityOption { id: active[0].id, name: "Bilal".to_string() }]);
    }

    #[tokio::test]
    async fn test_update_photo() {
        let (_pool, repo) = setup_test_repo().await;
        let mut author = repo.create(&create_test_author("Asha")).await.unwrap();

        author.photo_url = "/media/authors/new.png".to_string();
        author.photo_path = Some("authors/new.png".to_string());
        let updated = repo.update(&author).await.expect("Failed to update author");

        assert_eq!(updated.photo_path.as_deref(), Some("authors/new.png"));
        assert_eq!(updated.photo_url, "/media/authors/new.png");
    }

    #[tokio::test]
    async fn test_news_counts_and_stats() {
        let (pool, repo) = setup_test_repo().await;
        let asha = repo.create(&create_test_author("Asha")).await.unwrap();
        let bilal = repo.create(&create_test_author("Bilal")).await.unwrap();
        add_news(&pool, asha.id).await;
        add_news(&pool, asha.id).await;

        assert_eq!(repo.count_news(asha.id).await.unwrap(), 2);
        assert_eq!(repo.count_news(bilal.id).await.unwrap(), 0);
        assert_eq!(repo.get_by_id(asha.id).await.unwrap().unwrap().news_count, 2);

        let stats = repo.stats().await.unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].name, "Asha");
        assert_eq!(stats[0].news_count, 2);
        assert_eq!(stats[1].news_count, 0);
        assert_eq!(repo.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_delete_author() {
        let (_pool, repo) = setup_test_repo().await;
        let author = repo.create(&create_test_author("Asha")).await.unwrap();

        repo.delete(author.id).await.expect("Failed to delete author");
        assert!(repo.get_by_id(author.id).await.unwrap().is_none());
    }
}
