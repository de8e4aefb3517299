//! In-process cache for list, option and count reads
//!
//! Keys are namespaced per entity (`authors:list:...`, `news:item:7`). A
//! mutation drops every namespace whose reads it can change, see
//! [`invalidate`].

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;

pub use memory::MemoryCache;

/// The cache every service shares
pub type Cache = MemoryCache;

#[async_trait]
pub trait CacheLayer: Send + Sync {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete every key matching a glob pattern such as `news:*`
    async fn delete_pattern(&self, pattern: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

/// Key namespaces, one per cached read family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Authors,
    Categories,
    News,
    Stats,
}

impl Namespace {
    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Authors => "authors",
            Namespace::Categories => "categories",
            Namespace::News => "news",
            Namespace::Stats => "stats",
        }
    }

    pub fn pattern(self) -> String {
        format!("{}:*", self.as_str())
    }
}

/// Drop every key in the given namespaces
///
/// A failed delete only leaves stale entries until their TTL runs out, so it
/// is logged and not returned.
pub async fn invalidate<C: CacheLayer + ?Sized>(cache: &C, namespaces: &[Namespace]) {
    for namespace in namespaces {
        if let Err(e) = cache.delete_pattern(&namespace.pattern()).await {
            tracing::warn!("Failed to invalidate {} cache: {:#}", namespace.as_str(), e);
        }
    }
}

pub fn create_cache(config: &CacheConfig) -> Arc<Cache> {
    Arc::new(MemoryCache::with_capacity_and_ttl(
        config.max_capacity,
        Duration::from_secs(config.ttl_seconds),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalidate_only_touches_named_namespaces() {
        let cache = create_cache(&CacheConfig::default());
        let ttl = Duration::from_secs(60);
        cache.set("authors:list:all", &vec![1, 2], ttl).await.unwrap();
        cache.set("news:item:7", &"flood warning", ttl).await.unwrap();
        cache.set("categories:options", &vec!["Sports"], ttl).await.unwrap();

        invalidate(cache.as_ref(), &[Namespace::Authors, Namespace::News]).await;

        assert!(cache.get::<Vec<i32>>("authors:list:all").await.unwrap().is_none());
        assert!(cache.get::<String>("news:item:7").await.unwrap().is_none());
        assert_eq!(
            cache.get::<Vec<String>>("categories:options").await.unwrap(),
            Some(vec!["Sports".to_string()])
        );
    }

    #[test]
    fn test_create_cache_uses_configured_ttl() {
        let config = CacheConfig {
            max_capacity: 100,
            ttl_seconds: 1800,
        };
        let cache = create_cache(&config);
        assert_eq!(cache.default_ttl(), Duration::from_secs(1800));
    }
}
