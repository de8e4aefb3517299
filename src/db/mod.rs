//! Database layer
//!
//! Supports SQLite (default, single-file deployment) and MySQL. The driver is
//! selected by `database.driver` in the configuration.
//!
//! # Usage
//!
//! ```ignore
//! use newsdesk::config::DatabaseConfig;
//! use newsdesk::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

/// Run the same query body against whichever backend pool is configured
///
/// The body is expanded once per backend, so it may use generic sqlx calls
/// whose types differ between SQLite and MySQL. Both arms must evaluate to
/// the same type.
macro_rules! on_pool {
    ($db:expr, |$pool:ident| $body:expr) => {
        match $db.driver() {
            $crate::config::DatabaseDriver::Sqlite => {
                let $pool = $db.sqlite()?;
                $body
            }
            $crate::config::DatabaseDriver::Mysql => {
                let $pool = $db.mysql()?;
                $body
            }
        }
    };
}

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};
