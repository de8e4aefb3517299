//! Category service
//!
//! Implements business logic for category management:
//! - Create, read, update, delete categories
//! - Name uniqueness validation
//! - Deletion restricted while news items reference the category
//! - Select-list options and per-category news counts

use std::sync::Arc;
use std::time::Duration;

use super::retry::{retry_once, OPTIONS_RETRY_DELAY};
use super::{ActionError, ActionResult, SessionContext};
use crate::cache::{invalidate, Cache, CacheLayer, Namespace};
use crate::db::repositories::CategoryRepository;
use crate::models::{Category, EntityOption, EntityStats, FieldError};

/// Cache key prefixes
const CACHE_KEY_CATEGORY_BY_ID: &str = "categories:id:";
const CACHE_KEY_CATEGORY_LIST: &str = "categories:list";
const CACHE_KEY_CATEGORY_OPTIONS: &str = "categories:options";
const CACHE_KEY_CATEGORY_STATS: &str = "categories:stats";

/// Category service for managing news categories
pub struct CategoryService {
    repo: Arc<dyn CategoryRepository>,
    cache: Arc<Cache>,
    cache_ttl: Duration,
}

impl CategoryService {
    /// Create a new category service using the cache's default TTL
    pub fn new(repo: Arc<dyn CategoryRepository>, cache: Arc<Cache>) -> Self {
        let cache_ttl = cache.default_ttl();
        Self::with_cache_ttl(repo, cache, cache_ttl)
    }

    /// Create a new category service with custom cache TTL
    pub fn with_cache_ttl(repo: Arc<dyn CategoryRepository>, cache: Arc<Cache>, cache_ttl: Duration) -> Self {
        Self {
            repo,
            cache,
            cache_ttl,
        }
    }

    /// All categories ordered by name, with news counts
    pub async fn list(&self, ctx: &SessionContext) -> ActionResult<Vec<Category>> {
        ctx.require()?;

        if let Some(list) = self.cache.get::<Vec<Category>>(CACHE_KEY_CATEGORY_LIST).await.ok().flatten() {
            return Ok(list);
        }

        let list = self.repo.list().await?;
        let _ = self.cache.set(CACHE_KEY_CATEGORY_LIST, &list, self.cache_ttl).await;
        Ok(list)
    }

    /// Id and name pairs for select lists
    ///
    /// The query is retried once after a short delay.
    pub async fn options(&self, ctx: &SessionContext) -> ActionResult<Vec<EntityOption>> {
        ctx.require()?;

        if let Some(options) = self
            .cache
            .get::<Vec<EntityOption>>(CACHE_KEY_CATEGORY_OPTIONS)
            .await
            .ok()
            .flatten()
        {
            return Ok(options);
        }

        let options = retry_once(OPTIONS_RETRY_DELAY, || self.repo.options()).await?;
        let _ = self.cache.set(CACHE_KEY_CATEGORY_OPTIONS, &options, self.cache_ttl).await;
        Ok(options)
    }

    /// News count per category
    pub async fn stats(&self, ctx: &SessionContext) -> ActionResult<EntityStats> {
        ctx.require()?;

        if let Some(stats) = self.cache.get::<EntityStats>(CACHE_KEY_CATEGORY_STATS).await.ok().flatten() {
            return Ok(stats);
        }

        let stats = EntityStats::new(self.repo.stats().await?);
        let _ = self.cache.set(CACHE_KEY_CATEGORY_STATS, &stats, self.cache_ttl).await;
        Ok(stats)
    }

    /// Get category by ID
    pub async fn get(&self, ctx: &SessionContext, id: i64) -> ActionResult<Category> {
        ctx.require()?;

        let cache_key = format!("{}{}", CACHE_KEY_CATEGORY_BY_ID, id);
        if let Some(category) = self.cache.get::<Category>(&cache_key).await.ok().flatten() {
            return Ok(category);
        }

        let category = self
            .repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| not_found(id))?;
        let _ = self.cache.set(&cache_key, &category, self.cache_ttl).await;
        Ok(category)
    }

    /// Create a new category (admin only)
    ///
    /// # Errors
    /// - `Forbidden` if the caller is not an admin
    /// - `Validation` if the trimmed name is empty
    /// - `Conflict` if a category with the same name already exists
    pub async fn create(&self, ctx: &SessionContext, name: &str) -> ActionResult<Category> {
        ctx.require_admin()?;
        let name = validate_name(name)?;

        if self.repo.exists_by_name(&name).await? {
            return Err(duplicate(&name));
        }

        let created = self.repo.create(&Category::new(name)).await?;
        tracing::info!(category_id = created.id, name = %created.name, "Category created");

        self.invalidate_cache().await;
        Ok(created)
    }

    /// Rename a category (admin only)
    pub async fn update(&self, ctx: &SessionContext, id: i64, name: &str) -> ActionResult<Category> {
        ctx.require_admin()?;
        let name = validate_name(name)?;

        let mut category = self
            .repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| not_found(id))?;

        if name != category.name {
            if self.repo.exists_by_name(&name).await? {
                return Err(duplicate(&name));
            }
            category.name = name;
        }

        let updated = self.repo.update(&category).await?;
        tracing::info!(category_id = id, name = %updated.name, "Category updated");

        self.invalidate_cache().await;
        Ok(updated)
    }

    /// Delete a category that no news item references (admin only)
    ///
    /// # Errors
    /// - `NotFound` if the category doesn't exist
    /// - `Conflict` if news items still reference it
    pub async fn delete(&self, ctx: &SessionContext, id: i64) -> ActionResult<()> {
        ctx.require_admin()?;

        if self.repo.get_by_id(id).await?.is_none() {
            return Err(not_found(id));
        }

        let in_use = self.repo.count_news(id).await?;
        if in_use > 0 {
            return Err(ActionError::Conflict(format!(
                "Category is used by {} news item(s) and cannot be deleted",
                in_use
            )));
        }

        self.repo.delete(id).await?;
        tracing::info!(category_id = id, "Category deleted");

        self.invalidate_cache().await;
        Ok(())
    }

    /// Invalidate all category cache entries
    pub async fn invalidate_cache(&self) {
        invalidate(self.cache.as_ref(), &[Namespace::Categories, Namespace::Stats]).await;
    }
}

fn validate_name(name: &str) -> Result<String, ActionError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ActionError::invalid_fields(vec![FieldError::new(
            "name",
            "Category name is required",
        )]));
    }
    Ok(name.to_string())
}

fn not_found(id: i64) -> ActionError {
    ActionError::NotFound(format!("Category with ID {} not found", id))
}

fn duplicate(name: &str) -> ActionError {
    ActionError::Conflict(format!("Category name already exists: {}", name))
}
