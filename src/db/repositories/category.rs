//! Category storage
//!
//! Every read carries `news_count`, the number of news items filed under the
//! category, computed by a correlated subquery.

use crate::db::DynDatabasePool;
use crate::models::{Category, EntityOption, NamedCount};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

const CATEGORY_SELECT: &str = r#"
    SELECT c.id, c.name, c.created_at,
           (SELECT COUNT(*) FROM news_items n WHERE n.category_id = c.id) AS news_count
    FROM categories c
"#;

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Insert a category, failing on a duplicate name
    async fn create(&self, category: &Category) -> Result<Category>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>>;

    async fn get_by_name(&self, name: &str) -> Result<Option<Category>>;

    /// All categories, by name
    async fn list(&self) -> Result<Vec<Category>>;

    /// Rename a category, returning the stored row
    async fn update(&self, category: &Category) -> Result<Category>;

    /// Fails while news items still reference the category
    async fn delete(&self, id: i64) -> Result<()>;

    async fn exists_by_name(&self, name: &str) -> Result<bool>;

    async fn count_news(&self, id: i64) -> Result<i64>;

    /// `{id, name}` pairs for select lists, by name
    async fn options(&self) -> Result<Vec<EntityOption>>;

    /// News count per category, by name
    async fn stats(&self) -> Result<Vec<NamedCount>>;

    async fn count(&self) -> Result<i64>;
}

pub struct SqlxCategoryRepository {
    db: DynDatabasePool,
}

impl SqlxCategoryRepository {
    pub fn new(db: DynDatabasePool) -> Self {
        Self { db }
    }

    pub fn boxed(db: DynDatabasePool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(db))
    }

    async fn find_one(&self, condition: &str, key: CategoryKey<'_>) -> Result<Option<Category>> {
        let sql = format!("{} WHERE {}", CATEGORY_SELECT, condition);
        let category = on_pool!(self.db, |pool| {
            let query = sqlx::query_as::<_, Category>(&sql);
            let query = match key {
                CategoryKey::Id(id) => query.bind(id),
                CategoryKey::Name(name) => query.bind(name),
            };
            query.fetch_optional(pool).await?
        });
        Ok(category)
    }

    async fn scalar(&self, sql: &str, id: Option<i64>) -> Result<i64> {
        let value = on_pool!(self.db, |pool| {
            let query = sqlx::query_scalar::<_, i64>(sql);
            let query = match id {
                Some(id) => query.bind(id),
                None => query,
            };
            query.fetch_one(pool).await?
        });
        Ok(value)
    }
}

enum CategoryKey<'a> {
    Id(i64),
    Name(&'a str),
}

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn create(&self, category: &Category) -> Result<Category> {
        let sql = "INSERT INTO categories (name, created_at) VALUES (?, ?)";
        on_pool!(self.db, |pool| {
            sqlx::query(sql)
                .bind(&category.name)
                .bind(category.created_at)
                .execute(pool)
                .await
                .context("Failed to create category")?;
        });

        // Names are unique, so the name finds the new row on either backend
        self.get_by_name(&category.name)
            .await?
            .context("Category missing after insert")
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>> {
        self.find_one("c.id = ?", CategoryKey::Id(id))
            .await
            .context("Failed to load category")
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Category>> {
        self.find_one("c.name = ?", CategoryKey::Name(name))
            .await
            .context("Failed to load category by name")
    }

    async fn list(&self) -> Result<Vec<Category>> {
        let sql = format!("{} ORDER BY c.name, c.id", CATEGORY_SELECT);
        let categories = on_pool!(self.db, |pool| {
            sqlx::query_as::<_, Category>(&sql)
                .fetch_all(pool)
                .await
                .context("Failed to list categories")?
        });
        Ok(categories)
    }

    async fn update(&self, category: &Category) -> Result<Category> {
        let sql = "UPDATE categories SET name = ? WHERE id = ?";
        on_pool!(self.db, |pool| {
            sqlx::query(sql)
                .bind(&category.name)
                .bind(category.id)
                .execute(pool)
                .await
                .context("Failed to update category")?;
        });

        self.get_by_id(category.id)
            .await?
            .context("Category missing after update")
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let sql = "DELETE FROM categories WHERE id = ?";
        on_pool!(self.db, |pool| {
            sqlx::query(sql)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to delete category")?;
        });
        Ok(())
    }

    async fn exists_by_name(&self, name: &str) -> Result<bool> {
        Ok(self.get_by_name(name).await?.is_some())
    }

    async fn count_news(&self, id: i64) -> Result<i64> {
        self.scalar("SELECT COUNT(*) FROM news_items WHERE category_id = ?", Some(id))
            .await
            .context("Failed to count news items by category")
    }

    async fn options(&self) -> Result<Vec<EntityOption>> {
        let sql = "SELECT id, name FROM categories ORDER BY name, id";
        let options = on_pool!(self.db, |pool| {
            sqlx::query_as::<_, EntityOption>(sql)
                .fetch_all(pool)
                .await
                .context("Failed to list category options")?
        });
        Ok(options)
    }

    async fn stats(&self) -> Result<Vec<NamedCount>> {
        let sql = r#"
            SELECT c.id, c.name, COUNT(n.id) AS news_count
            FROM categories c
            LEFT JOIN news_items n ON n.category_id = c.id
            GROUP BY c.id, c.name
            ORDER BY c.name, c.id
        "#;
        let stats = on_pool!(self.db, |pool| {
            sqlx::query_as::<_, NamedCount>(sql)
                .fetch_all(pool)
                .await
                .context("Failed to load category stats")?
        });
        Ok(stats)
    }

    async fn count(&self) -> Result<i64> {
        self.scalar("SELECT COUNT(*) FROM categories", None)
            .await
            .context("Failed to count categories")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn repo() -> SqlxCategoryRepository {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        SqlxCategoryRepository::new(pool)
    }

    #[tokio::test]
    async fn test_create_assigns_id() {
        let repo = repo().await;
        let created = repo.create(&Category::new("Politics")).await.unwrap();

        assert!(created.id > 0);
        assert_eq!(created.name, "Politics");
        assert_eq!(created.news_count, 0);
        assert_eq!(repo.get_by_id(created.id).await.unwrap(), Some(created));
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let repo = repo().await;
        repo.create(&Category::new("Sports")).await.unwrap();

        assert!(repo.create(&Category::new("Sports")).await.is_err());
        assert!(repo.exists_by_name("Sports").await.unwrap());
        assert!(!repo.exists_by_name("Weather").await.unwrap());
    }

    #[tokio::test]
    async fn test_reads_are_sorted_by_name() {
        let repo = repo().await;
        for name in ["World", "Business", "Culture"] {
            repo.create(&Category::new(name)).await.unwrap();
        }

        let names: Vec<String> = repo.list().await.unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Business", "Culture", "World"]);

        let options = repo.options().await.unwrap();
        assert_eq!(options[0].name, "Business");
        let stats = repo.stats().await.unwrap();
        assert!(stats.iter().all(|s| s.news_count == 0));
        assert_eq!(repo.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_rename() {
        let repo = repo().await;
        let mut category = repo.create(&Category::new("Tech")).await.unwrap();

        category.name = "Technology".to_string();
        let updated = repo.update(&category).await.unwrap();

        assert_eq!(updated.name, "Technology");
        assert!(repo.get_by_name("Tech").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_unused_category() {
        let repo = repo().await;
        let category = repo.create(&Category::new("Weather")).await.unwrap();

        repo.delete(category.id).await.unwrap();

        assert!(repo.get_by_id(category.id).await.unwrap().is_none());
        assert_eq!(repo.count_news(category.id).await.unwrap(), 0);
        assert!(repo.stats().await.unwrap().is_empty());
    }
}
