//! Schema migrations
//!
//! Each migration carries one SQL script per backend. Applied versions are
//! recorded in `_migrations`, so running them twice is a no-op.

use anyhow::{Context, Result};
use std::collections::HashSet;

use super::DynDatabasePool;
use crate::config::DatabaseDriver;

#[derive(Debug, Clone)]
pub struct Migration {
    /// Unique, applied in ascending order
    pub version: i32,
    pub name: &'static str,
    pub up_sqlite: &'static str,
    pub up_mysql: &'static str,
}

impl Migration {
    fn script(&self, driver: DatabaseDriver) -> &'static str {
        match driver {
            DatabaseDriver::Sqlite => self.up_sqlite,
            DatabaseDriver::Mysql => self.up_mysql,
        }
    }
}

/// All schema migrations, in application order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_identities",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS identities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email VARCHAR(255) NOT NULL UNIQUE,
                role VARCHAR(20) NOT NULL DEFAULT 'editor',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS identities (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                email VARCHAR(255) NOT NULL UNIQUE,
                role VARCHAR(20) NOT NULL DEFAULT 'editor',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            ) DEFAULT CHARSET=utf8mb4;
        "#,
    },
    Migration {
        version: 2,
        name: "create_sessions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                identity_id INTEGER NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (identity_id) REFERENCES identities(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_identity_id ON sessions(identity_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                identity_id BIGINT NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (identity_id) REFERENCES identities(id) ON DELETE CASCADE
            ) DEFAULT CHARSET=utf8mb4;
            CREATE INDEX idx_sessions_identity_id ON sessions(identity_id);
            CREATE INDEX idx_sessions_expires_at ON sessions(expires_at);
        "#,
    },
    Migration {
        version: 3,
        name: "create_one_time_codes",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS one_time_codes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email VARCHAR(255) NOT NULL,
                code VARCHAR(12) NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_one_time_codes_email ON one_time_codes(email);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS one_time_codes (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                email VARCHAR(255) NOT NULL,
                code VARCHAR(12) NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            ) DEFAULT CHARSET=utf8mb4;
            CREATE INDEX idx_one_time_codes_email ON one_time_codes(email);
        "#,
    },
    Migration {
        version: 4,
        name: "create_authors",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS authors (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(200) NOT NULL,
                email VARCHAR(255) NOT NULL,
                photo_url TEXT NOT NULL,
                photo_path VARCHAR(512),
                active INTEGER NOT NULL DEFAULT 1,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_authors_email ON authors(email);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS authors (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                name VARCHAR(200) NOT NULL,
                email VARCHAR(255) NOT NULL,
                photo_url TEXT NOT NULL,
                photo_path VARCHAR(512),
                active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            ) DEFAULT CHARSET=utf8mb4;
            CREATE INDEX idx_authors_email ON authors(email);
        "#,
    },
    Migration {
        version: 5,
        name: "create_categories",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(100) NOT NULL UNIQUE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS categories (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                name VARCHAR(100) NOT NULL UNIQUE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            ) DEFAULT CHARSET=utf8mb4;
        "#,
    },
    // News items reference authors and categories with RESTRICT so that a
    // referenced row can never be deleted out from under a news item.
    Migration {
        version: 6,
        name: "create_news_items",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS news_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                heading_en TEXT NOT NULL,
                heading_hi TEXT NOT NULL,
                heading_ur TEXT NOT NULL,
                tagline_en TEXT NOT NULL,
                tagline_hi TEXT NOT NULL,
                tagline_ur TEXT NOT NULL,
                content_en TEXT NOT NULL,
                content_hi TEXT NOT NULL,
                content_ur TEXT NOT NULL,
                picture_url TEXT NOT NULL,
                picture_path VARCHAR(512) NOT NULL,
                tags TEXT NOT NULL DEFAULT '[]',
                read_time INTEGER NOT NULL,
                views INTEGER NOT NULL DEFAULT 0,
                author_id INTEGER NOT NULL,
                category_id INTEGER NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (author_id) REFERENCES authors(id) ON DELETE RESTRICT,
                FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE RESTRICT
            );
            CREATE INDEX IF NOT EXISTS idx_news_items_created_at ON news_items(created_at);
            CREATE INDEX IF NOT EXISTS idx_news_items_author_id ON news_items(author_id);
            CREATE INDEX IF NOT EXISTS idx_news_items_category_id ON news_items(category_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS news_items (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                heading_en TEXT NOT NULL,
                heading_hi TEXT NOT NULL,
                heading_ur TEXT NOT NULL,
                tagline_en TEXT NOT NULL,
                tagline_hi TEXT NOT NULL,
                tagline_ur TEXT NOT NULL,
                content_en MEDIUMTEXT NOT NULL,
                content_hi MEDIUMTEXT NOT NULL,
                content_ur MEDIUMTEXT NOT NULL,
                picture_url TEXT NOT NULL,
                picture_path VARCHAR(512) NOT NULL,
                tags TEXT NOT NULL,
                read_time INT NOT NULL,
                views BIGINT NOT NULL DEFAULT 0,
                author_id BIGINT NOT NULL,
                category_id BIGINT NOT NULL,
                created_at TIMESTAMP(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6),
                updated_at TIMESTAMP(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6),
                FOREIGN KEY (author_id) REFERENCES authors(id) ON DELETE RESTRICT,
                FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE RESTRICT
            ) DEFAULT CHARSET=utf8mb4;
            CREATE INDEX idx_news_items_created_at ON news_items(created_at);
            CREATE INDEX idx_news_items_author_id ON news_items(author_id);
            CREATE INDEX idx_news_items_category_id ON news_items(category_id);
        "#,
    },
    Migration {
        version: 7,
        name: "create_orphaned_objects",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS orphaned_objects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path VARCHAR(512) NOT NULL,
                reason VARCHAR(50) NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS orphaned_objects (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                path VARCHAR(512) NOT NULL,
                reason VARCHAR(50) NOT NULL,
                attempts INT NOT NULL DEFAULT 0,
                last_error TEXT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            ) DEFAULT CHARSET=utf8mb4;
        "#,
    },
];

const CREATE_TRACKING_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        version INTEGER PRIMARY KEY,
        name VARCHAR(255) NOT NULL UNIQUE,
        applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
"#;

/// Apply every migration not yet recorded, returning how many ran
pub async fn run_migrations(db: &DynDatabasePool) -> Result<usize> {
    db.execute(CREATE_TRACKING_TABLE)
        .await
        .context("Failed to create migrations table")?;

    let pending = pending(db).await?;
    for migration in &pending {
        tracing::info!(version = migration.version, name = migration.name, "Applying migration");
        apply(db, migration)
            .await
            .with_context(|| format!("Migration {} ({}) failed", migration.version, migration.name))?;
    }

    if pending.is_empty() {
        tracing::debug!("Schema is up to date");
    } else {
        tracing::info!(count = pending.len(), "Applied migrations");
    }
    Ok(pending.len())
}

async fn pending(db: &DynDatabasePool) -> Result<Vec<&'static Migration>> {
    let sql = "SELECT version FROM _migrations";
    let applied: Vec<i64> = on_pool!(db, |pool| {
        sqlx::query_scalar::<_, i64>(sql).fetch_all(pool).await?
    });
    let applied: HashSet<i64> = applied.into_iter().collect();

    let mut pending: Vec<&'static Migration> = MIGRATIONS
        .iter()
        .filter(|m| !applied.contains(&i64::from(m.version)))
        .collect();
    pending.sort_by_key(|m| m.version);
    Ok(pending)
}

async fn apply(db: &DynDatabasePool, migration: &Migration) -> Result<()> {
    for statement in statements(migration.script(db.driver())) {
        db.execute(statement)
            .await
            .with_context(|| format!("Statement failed: {}", preview(statement)))?;
    }

    let record = "INSERT INTO _migrations (version, name) VALUES (?, ?)";
    on_pool!(db, |pool| {
        sqlx::query(record)
            .bind(migration.version)
            .bind(migration.name)
            .execute(pool)
            .await?;
    });
    Ok(())
}

/// First line of a statement, for error context
fn preview(statement: &str) -> &str {
    statement.lines().next().unwrap_or(statement).trim()
}

/// Split a script on `;`, dropping blank and comment-only pieces
///
/// Scripts never put `;` inside string literals, so a plain split is enough.
fn statements(script: &str) -> impl Iterator<Item = &str> {
    script.split(';').map(str::trim).filter(|piece| {
        piece
            .lines()
            .map(str::trim)
            .any(|line| !line.is_empty() && !line.starts_with("--"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use sqlx::SqlitePool;

    async fn migrated_pool() -> DynDatabasePool {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        pool
    }

    async fn insert_author(pool: &SqlitePool, name: &str) -> i64 {
        sqlx::query("INSERT INTO authors (name, email, photo_url) VALUES (?, ?, ?)")
            .bind(name)
            .bind("writer@news.test")
            .bind("/static/default-author.png")
            .execute(pool)
            .await
            .expect("Failed to insert author")
            .last_insert_rowid()
    }

    async fn insert_category(pool: &SqlitePool, name: &str) -> i64 {
        sqlx::query("INSERT INTO categories (name) VALUES (?)")
            .bind(name)
            .execute(pool)
            .await
            .expect("Failed to insert category")
            .last_insert_rowid()
    }

    async fn insert_news(pool: &SqlitePool, author_id: i64, category_id: i64) -> sqlx::Result<u64> {
        sqlx::query(
            r#"
            INSERT INTO news_items (
                heading_en, heading_hi, heading_ur, tagline_en, tagline_hi, tagline_ur,
                content_en, content_hi, content_ur, picture_url, picture_path, tags,
                read_time, author_id, category_id
            ) VALUES ('h', 'h', 'h', 't', 't', 't', 'c', 'c', 'c', '/media/news/a.png', 'news/a.png', '[]', 3, ?, ?)
            "#,
        )
        .bind(author_id)
        .bind(category_id)
        .execute(pool)
        .await
        .map(|r| r.rows_affected())
    }

    #[tokio::test]
    async fn test_run_migrations() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, MIGRATIONS.len());

        // Running again should apply 0 migrations
        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_partial_history_applies_only_the_rest() {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool.execute("DELETE FROM _migrations WHERE version = 7").await.unwrap();
        pool.execute("DROP TABLE orphaned_objects").await.unwrap();

        assert_eq!(run_migrations(&pool).await.unwrap(), 1);
        pool.execute("SELECT COUNT(*) FROM orphaned_objects").await.unwrap();
    }

    #[tokio::test]
    async fn test_session_requires_identity() {
        let pool = migrated_pool().await;
        let sqlite_pool = pool.as_sqlite().unwrap();

        let result = sqlx::query(
            "INSERT INTO sessions (id, identity_id, expires_at) VALUES (?, ?, datetime('now', '+1 day'))",
        )
        .bind("session123")
        .bind(999i64)
        .execute(sqlite_pool)
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_identity_email_is_unique() {
        let pool = migrated_pool().await;
        let sqlite_pool = pool.as_sqlite().unwrap();

        sqlx::query("INSERT INTO identities (email, role) VALUES ('a@news.test', 'admin')")
            .execute(sqlite_pool)
            .await
            .expect("Failed to insert identity");
        let result = sqlx::query("INSERT INTO identities (email, role) VALUES ('a@news.test', 'editor')")
            .execute(sqlite_pool)
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_news_item_requires_existing_author_and_category() {
        let pool = migrated_pool().await;
        let sqlite_pool = pool.as_sqlite().unwrap();
        let category_id = insert_category(sqlite_pool, "World").await;

        assert!(insert_news(sqlite_pool, 42, category_id).await.is_err());
    }

    #[tokio::test]
    async fn test_referenced_category_cannot_be_deleted() {
        let pool = migrated_pool().await;
        let sqlite_pool = pool.as_sqlite().unwrap();
        let author_id = insert_author(sqlite_pool, "Asha").await;
        let category_id = insert_category(sqlite_pool, "Politics").await;
        insert_news(sqlite_pool, author_id, category_id)
            .await
            .expect("Failed to insert news item");

        let result = sqlx::query("DELETE FROM categories WHERE id = ?")
            .bind(category_id)
            .execute(sqlite_pool)
            .await;
        assert!(result.is_err());

        let result = sqlx::query("DELETE FROM authors WHERE id = ?")
            .bind(author_id)
            .execute(sqlite_pool)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_category_name_is_unique() {
        let pool = migrated_pool().await;
        let sqlite_pool = pool.as_sqlite().unwrap();
        insert_category(sqlite_pool, "Sports").await;

        let result = sqlx::query("INSERT INTO categories (name) VALUES ('Sports')")
            .execute(sqlite_pool)
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_versions_are_unique_and_ascending() {
        let versions: Vec<i32> = MIGRATIONS.iter().map(|m| m.version).collect();
        assert!(versions.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(versions.first(), Some(&1));
    }

    #[test]
    fn test_statements_skip_comments_and_blanks() {
        let script = "-- identities\nCREATE TABLE a (id INT);\n\n CREATE INDEX i ON a(id);\n-- trailing\n";
        let parsed: Vec<&str> = statements(script).collect();
        assert_eq!(parsed, vec!["-- identities\nCREATE TABLE a (id INT)", "CREATE INDEX i ON a(id)"]);
    }

    #[test]
    fn test_preview_is_first_line() {
        assert_eq!(preview("  CREATE TABLE news_items (\n id INTEGER\n)"), "CREATE TABLE news_items (");
    }
}
