//! News item repository
//!
//! Database operations for news items, including the joined list views and
//! the multilingual search.
//!
//! Search matches when the trimmed query is a case-insensitive substring of
//! any of the nine language fields, the author name or the category name, or
//! when it equals one of the item's tags exactly. LIKE wildcards in the query
//! are escaped with `!`.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{
    AuthorSummary, CategorySummary, ListParams, LocalizedCopy, NewsItem, NewsItemWithRefs,
    PagedResult,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

const NEWS_COLUMNS: &str = r#"
    n.id, n.heading_en, n.heading_hi, n.heading_ur,
    n.tagline_en, n.tagline_hi, n.tagline_ur,
    n.content_en, n.content_hi, n.content_ur,
    n.picture_url, n.picture_path, n.tags, n.read_time, n.views,
    n.author_id, n.category_id, n.created_at, n.updated_at
"#;

const REFS_FROM: &str = r#"
    , a.name AS author_name, a.photo_url AS author_photo_url, c.name AS category_name
    FROM news_items n
    JOIN authors a ON a.id = n.author_id
    JOIN categories c ON c.id = n.category_id
"#;

/// Columns matched by substring search
const SEARCH_COLUMNS: [&str; 11] = [
    "n.heading_en",
    "n.heading_hi",
    "n.heading_ur",
    "n.tagline_en",
    "n.tagline_hi",
    "n.tagline_ur",
    "n.content_en",
    "n.content_hi",
    "n.content_ur",
    "a.name",
    "c.name",
];

const NEWEST_FIRST: &str = "ORDER BY n.created_at DESC, n.id DESC";

/// News repository trait
#[async_trait]
pub trait NewsRepository: Send + Sync {
    /// Create a new news item
    async fn create(&self, item: &NewsItem) -> Result<NewsItem>;

    /// Get news item by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<NewsItem>>;

    /// Get news item by ID with author and category joined
    async fn get_with_refs(&self, id: i64) -> Result<Option<NewsItemWithRefs>>;

    /// List news items, newest first
    async fn list(&self, params: &ListParams) -> Result<PagedResult<NewsItemWithRefs>>;

    /// Search news items, newest first. An empty query matches everything.
    async fn search(&self, query: &str) -> Result<Vec<NewsItemWithRefs>>;

    /// Update all editable fields, including the picture
    async fn update(&self, item: &NewsItem) -> Result<NewsItem>;

    /// Delete a news item
    async fn delete(&self, id: i64) -> Result<()>;

    /// Increment the view counter. Returns false if the item does not exist.
    async fn increment_views(&self, id: i64) -> Result<bool>;

    /// Total number of news items
    async fn count(&self) -> Result<i64>;

    /// Sum of all view counters
    async fn total_views(&self) -> Result<i64>;
}

/// SQLx-based news repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxNewsRepository {
    pool: DynDatabasePool,
}

impl SqlxNewsRepository {
    /// Create a new SQLx news repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn NewsRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl NewsRepository for SqlxNewsRepository {
    async fn create(&self, item: &NewsItem) -> Result<NewsItem> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_news_sqlite(self.pool.sqlite()?, item).await,
            DatabaseDriver::Mysql => create_news_mysql(self.pool.mysql()?, item).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<NewsItem>> {
        Ok(self.get_with_refs(id).await?.map(|found| found.item))
    }

    async fn get_with_refs(&self, id: i64) -> Result<Option<NewsItemWithRefs>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_news_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_news_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn list(&self, params: &ListParams) -> Result<PagedResult<NewsItemWithRefs>> {
        let (items, total) = match self.pool.driver() {
            DatabaseDriver::Sqlite => list_news_sqlite(self.pool.sqlite()?, params).await?,
            DatabaseDriver::Mysql => list_news_mysql(self.pool.mysql()?, params).await?,
        };
        Ok(PagedResult::new(items, total, params))
    }

    async fn search(&self, query: &str) -> Result<Vec<NewsItemWithRefs>> {
        let query = query.trim();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => search_news_sqlite(self.pool.sqlite()?, query).await,
            DatabaseDriver::Mysql => search_news_mysql(self.pool.mysql()?, query).await,
        }
    }

    async fn update(&self, item: &NewsItem) -> Result<NewsItem> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => update_news_sqlite(self.pool.sqlite()?, item).await?,
            DatabaseDriver::Mysql => update_news_mysql(self.pool.mysql()?, item).await?,
        }
        self.get_by_id(item.id)
            .await?
            .context("News item not found after update")
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let sql = "DELETE FROM news_items WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to delete news item")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to delete news item")?;
            }
        }
        Ok(())
    }

    async fn increment_views(&self, id: i64) -> Result<bool> {
        let sql = "UPDATE news_items SET views = views + 1 WHERE id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to increment views")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to increment views")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn count(&self) -> Result<i64> {
        let sql = "SELECT COUNT(*) FROM news_items";
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query_scalar(sql)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count news items")?,
            DatabaseDriver::Mysql => sqlx::query_scalar(sql)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to count news items")?,
        };
        Ok(count)
    }

    async fn total_views(&self) -> Result<i64> {
        let views: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query_scalar("SELECT COALESCE(SUM(views), 0) FROM news_items")
                    .fetch_one(self.pool.sqlite()?)
                    .await
                    .context("Failed to sum views")?
            }
            // SUM yields DECIMAL on MySQL
            DatabaseDriver::Mysql => {
                sqlx::query_scalar("SELECT CAST(COALESCE(SUM(views), 0) AS SIGNED) FROM news_items")
                    .fetch_one(self.pool.mysql()?)
                    .await
                    .context("Failed to sum views")?
            }
        };
        Ok(views)
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Escape LIKE wildcards with `!` and wrap the query in `%`.
pub(crate) fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for ch in query.chars() {
        if matches!(ch, '!' | '%' | '_') {
            escaped.push('!');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

fn search_sql(tag_clause: &str) -> String {
    let substring = SEARCH_COLUMNS
        .iter()
        .map(|column| format!("LOWER({}) LIKE LOWER(?) ESCAPE '!'", column))
        .collect::<Vec<_>>()
        .join(" OR ");
    format!(
        "SELECT {} {} WHERE {} OR {} {}",
        NEWS_COLUMNS, REFS_FROM, substring, tag_clause, NEWEST_FIRST
    )
}

fn tags_to_json(tags: &[String]) -> Result<String> {
    serde_json::to_string(tags).context("Failed to encode tags")
}

fn tags_from_json(raw: &str) -> Result<Vec<String>> {
    serde_json::from_str(raw).context("Failed to decode tags")
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_news_sqlite(pool: &SqlitePool, item: &NewsItem) -> Result<NewsItem> {
    let result = sqlx::query(
        r#"
        INSERT INTO news_items (
            heading_en, heading_hi, heading_ur, tagline_en, tagline_hi, tagline_ur,
            content_en, content_hi, content_ur, picture_url, picture_path, tags,
            read_time, views, author_id, category_id, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&item.en.heading)
    .bind(&item.hi.heading)
    .bind(&item.ur.heading)
    .bind(&item.en.tagline)
    .bind(&item.hi.tagline)
    .bind(&item.ur.tagline)
    .bind(&item.en.content)
    .bind(&item.hi.content)
    .bind(&item.ur.content)
    .bind(&item.picture_url)
    .bind(&item.picture_path)
    .bind(tags_to_json(&item.tags)?)
    .bind(item.read_time)
    .bind(item.views)
    .bind(item.author_id)
    .bind(item.category_id)
    .bind(item.created_at)
    .bind(item.updated_at)
    .execute(pool)
    .await
    .context("Failed to create news item")?;

    Ok(NewsItem {
        id: result.last_insert_rowid(),
        ..item.clone()
    })
}

async fn get_news_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<NewsItemWithRefs>> {
    let sql = format!("SELECT {} {} WHERE n.id = ?", NEWS_COLUMNS, REFS_FROM);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get news item by ID")?;

    row.map(|row| row_to_news_sqlite(&row)).transpose()
}

async fn list_news_sqlite(
    pool: &SqlitePool,
    params: &ListParams,
) -> Result<(Vec<NewsItemWithRefs>, i64)> {
    let sql = format!(
        "SELECT {} {} {} LIMIT ? OFFSET ?",
        NEWS_COLUMNS, REFS_FROM, NEWEST_FIRST
    );
    let rows = sqlx::query(&sql)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list news items")?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM news_items")
        .fetch_one(pool)
        .await
        .context("Failed to count news items")?;

    let items = rows.iter().map(row_to_news_sqlite).collect::<Result<Vec<_>>>()?;
    Ok((items, total))
}

async fn search_news_sqlite(pool: &SqlitePool, query: &str) -> Result<Vec<NewsItemWithRefs>> {
    let rows = if query.is_empty() {
        let sql = format!("SELECT {} {} {}", NEWS_COLUMNS, REFS_FROM, NEWEST_FIRST);
        sqlx::query(&sql)
            .fetch_all(pool)
            .await
            .context("Failed to search news items")?
    } else {
        let sql = search_sql(
            "EXISTS (SELECT 1 FROM json_each(n.tags) WHERE json_each.value = ?)",
        );
        let pattern = like_pattern(query);
        let mut statement = sqlx::query(&sql);
        for _ in SEARCH_COLUMNS {
            statement = statement.bind(pattern.clone());
        }
        statement
            .bind(query.to_string())
            .fetch_all(pool)
            .await
            .context("Failed to search news items")?
    };

    rows.iter().map(row_to_news_sqlite).collect()
}

async fn update_news_sqlite(pool: &SqlitePool, item: &NewsItem) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE news_items
        SET heading_en = ?, heading_hi = ?, heading_ur = ?,
            tagline_en = ?, tagline_hi = ?, tagline_ur = ?,
            content_en = ?, content_hi = ?, content_ur = ?,
            picture_url = ?, picture_path = ?, tags = ?, read_time = ?,
            author_id = ?, category_id = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&item.en.heading)
    .bind(&item.hi.heading)
    .bind(&item.ur.heading)
    .bind(&item.en.tagline)
    .bind(&item.hi.tagline)
    .bind(&item.ur.tagline)
    .bind(&item.en.content)
    .bind(&item.hi.content)
    .bind(&item.ur.content)
    .bind(&item.picture_url)
    .bind(&item.picture_path)
    .bind(tags_to_json(&item.tags)?)
    .bind(item.read_time)
    .bind(item.author_id)
    .bind(item.category_id)
    .bind(item.updated_at)
    .bind(item.id)
    .execute(pool)
    .await
    .context("Failed to update news item")?;

    Ok(())
}

fn row_to_news_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<NewsItemWithRefs> {
    let tags: String = row.get("tags");
    let item = NewsItem {
        id: row.get("id"),
        en: LocalizedCopy {
            heading: row.get("heading_en"),
            tagline: row.get("tagline_en"),
            content: row.get("content_en"),
        },
        hi: LocalizedCopy {
            heading: row.get("heading_hi"),
            tagline: row.get("tagline_hi"),
            content: row.get("content_hi"),
        },
        ur: LocalizedCopy {
            heading: row.get("heading_ur"),
            tagline: row.get("tagline_ur"),
            content: row.get("content_ur"),
        },
        picture_url: row.get("picture_url"),
        picture_path: row.get("picture_path"),
        tags: tags_from_json(&tags)?,
        read_time: row.get("read_time"),
        views: row.get("views"),
        author_id: row.get("author_id"),
        category_id: row.get("category_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    };

    Ok(NewsItemWithRefs {
        author: AuthorSummary {
            id: item.author_id,
            name: row.get("author_name"),
            photo_url: row.get("author_photo_url"),
        },
        category: CategorySummary {
            id: item.category_id,
            name: row.get("category_name"),
        },
        item,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_news_mysql(pool: &MySqlPool, item: &NewsItem) -> Result<NewsItem> {
    let result = sqlx::query(
        r#"
        INSERT INTO news_items (
            heading_en, heading_hi, heading_ur, tagline_en, tagline_hi, tagline_ur,
            content_en, content_hi, content_ur, picture_url, picture_path, tags,
            read_time, views, author_id, category_id, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&item.en.heading)
    .bind(&item.hi.heading)
    .bind(&item.ur.heading)
    .bind(&item.en.tagline)
    .bind(&item.hi.tagline)
    .bind(&item.ur.tagline)
    .bind(&item.en.content)
    .bind(&item.hi.content)
    .bind(&item.ur.content)
    .bind(&item.picture_url)
    .bind(&item.picture_path)
    .bind(tags_to_json(&item.tags)?)
    .bind(item.read_time)
    .bind(item.views)
    .bind(item.author_id)
    .bind(item.category_id)
    .bind(item.created_at)
    .bind(item.updated_at)
    .execute(pool)
    .await
    .context("Failed to create news item")?;

    Ok(NewsItem {
        id: result.last_insert_id() as i64,
        ..item.clone()
    })
}

async fn get_news_mysql(pool: &MySqlPool, id: i64) -> Result<Option<NewsItemWithRefs>> {
    let sql = format!("SELECT {} {} WHERE n.id = ?", NEWS_COLUMNS, REFS_FROM);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get news item by ID")?;

    row.map(|row| row_to_news_mysql(&row)).transpose()
}

async fn list_news_mysql(
    pool: &MySqlPool,
    params: &ListParams,
) -> Result<(Vec<NewsItemWithRefs>, i64)> {
    let sql = format!(
        "SELECT {} {} {} LIMIT ? OFFSET ?",
        NEWS_COLUMNS, REFS_FROM, NEWEST_FIRST
    );
    let rows = sqlx::query(&sql)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list news items")?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM news_items")
        .fetch_one(pool)
        .await
        .context("Failed to count news items")?;

    let items = rows.iter().map(row_to_news_mysql).collect::<Result<Vec<_>>>()?;
    Ok((items, total))
}

async fn search_news_mysql(pool: &MySqlPool, query: &str) -> Result<Vec<NewsItemWithRefs>> {
    let rows = if query.is_empty() {
        let sql = format!("SELECT {} {} {}", NEWS_COLUMNS, REFS_FROM, NEWEST_FIRST);
        sqlx::query(&sql)
            .fetch_all(pool)
            .await
            .context("Failed to search news items")?
    } else {
        let sql = search_sql("JSON_CONTAINS(n.tags, JSON_QUOTE(?))");
        let pattern = like_pattern(query);
        let mut statement = sqlx::query(&sql);
        for _ in SEARCH_COLUMNS {
            statement = statement.bind(pattern.clone());
        }
        statement
            .bind(query.to_string())
            .fetch_all(pool)
            .await
            .context("Failed to search news items")?
    };

    rows.iter().map(row_to_news_mysql).collect()
}

async fn update_news_mysql(pool: &MySqlPool, item: &NewsItem) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE news_items
        SET heading_en = ?, heading_hi = ?, heading_ur = ?,
            tagline_en = ?, tagline_hi = ?, tagline_ur = ?,
            content_en = ?, content_hi = ?, content_ur = ?,
            picture_url = ?, picture_path = ?, tags = ?, read_time = ?,
            author_id = ?, category_id = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&item.en.heading)
    .bind(&item.hi.heading)
    .bind(&item.ur.heading)
    .bind(&item.en.tagline)
    .bind(&item.hi.tagline)
    .bind(&item.ur.tagline)
    .bind(&item.en.content)
    .bind(&item.hi.content)
    .bind(&item.ur.content)
    .bind(&item.picture_url)
    .bind(&item.picture_path)
    .bind(tags_to_json(&item.tags)?)
    .bind(item.read_time)
    .bind(item.author_id)
    .bind(item.category_id)
    .bind(item.updated_at)
    .bind(item.id)
    .execute(pool)
    .await
    .context("Failed to update news item")?;

    Ok(())
}

fn row_to_news_mysql(row: &sqlx::mysql::MySqlRow) -> Result<NewsItemWithRefs> {
    let tags: String = row.get("tags");
    let item = NewsItem {
        id: row.get("id"),
        en: LocalizedCopy {
            heading: row.get("heading_en"),
            tagline: row.get("tagline_en"),
            content: row.get("content_en"),
        },
        hi: LocalizedCopy {
            heading: row.get("heading_hi"),
            tagline: row.get("tagline_hi"),
            content: row.get("content_hi"),
        },
        ur: LocalizedCopy {
            heading: row.get("heading_ur"),
            tagline: row.get("tagline_ur"),
            content: row.get("content_ur"),
        },
        picture_url: row.get("picture_url"),
        picture_path: row.get("picture_path"),
        tags: tags_from_json(&tags)?,
        read_time: row.get("read_time"),
        views: row.get("views"),
        author_id: row.get("author_id"),
        category_id: row.get("category_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    };

    Ok(NewsItemWithRefs {
        author: AuthorSummary {
            id: item.author_id,
            name: row.get("author_name"),
            photo_url: row.get("author_photo_url"),
        },
        category: CategorySummary {
            id: item.category_id,
            name: row.get("category_name"),
        },
        item,
    })
}
