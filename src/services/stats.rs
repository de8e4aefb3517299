//! Dashboard totals

use std::sync::Arc;
use std::time::Duration;

use super::{ActionResult, SessionContext};
use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::{AuthorRepository, CategoryRepository, NewsRepository};
use crate::models::DashboardStats;

const CACHE_KEY_DASHBOARD: &str = "stats:dashboard";

pub struct StatsService {
    news: Arc<dyn NewsRepository>,
    authors: Arc<dyn AuthorRepository>,
    categories: Arc<dyn CategoryRepository>,
    cache: Arc<Cache>,
    cache_ttl: Duration,
}

impl StatsService {
    pub fn new(
        news: Arc<dyn NewsRepository>,
        authors: Arc<dyn AuthorRepository>,
        categories: Arc<dyn CategoryRepository>,
        cache: Arc<Cache>,
    ) -> Self {
        let cache_ttl = cache.default_ttl();
        Self {
            news,
            authors,
            categories,
            cache,
            cache_ttl,
        }
    }

    /// Entity totals, total views and the caller's email
    pub async fn dashboard(&self, ctx: &SessionContext) -> ActionResult<DashboardStats> {
        let identity = ctx.require()?;

        // Cached without the email, which differs per caller
        let mut stats = match self.cache.get::<DashboardStats>(CACHE_KEY_DASHBOARD).await.ok().flatten() {
            Some(stats) => stats,
            None => {
                let (total_news_items, total_categories, total_authors, total_views) = tokio::try_join!(
                    self.news.count(),
                    self.categories.count(),
                    self.authors.count(),
                    self.news.total_views(),
                )?;
                let stats = DashboardStats {
                    total_news_items,
                    total_categories,
                    total_authors,
                    total_views,
                    email: String::new(),
                };
                let _ = self.cache.set(CACHE_KEY_DASHBOARD, &stats, self.cache_ttl).await;
                stats
            }
        };

        stats.email = identity.email.clone();
        Ok(stats)
    }
}
