//! Author service
//!
//! Implements business logic for author management:
//! - Create, read, update, delete authors
//! - Photo upload, replacement and removal through [`ImageUploader`]
//! - Active flag (only active authors can be picked for new news items)
//! - Deletion restricted while news items reference the author

use std::sync::Arc;
use std::time::Duration;

use super::form::{FormStage, FormState, Submitted};
use super::retry::{retry_once, OPTIONS_RETRY_DELAY};
use super::upload::{ImageFile, ImageKind, ImageUploader, StoredImage};
use super::{ActionError, ActionResult, SessionContext};
use crate::cache::{invalidate, Cache, CacheLayer, Namespace};
use crate::db::repositories::AuthorRepository;
use crate::models::{
    is_valid_email, normalize_email, Author, CreateAuthorInput, EntityOption, EntityStats,
    FieldError, UpdateAuthorInput,
};

/// Cache key prefixes
const CACHE_KEY_AUTHOR_BY_ID: &str = "authors:id:";
const CACHE_KEY_AUTHOR_LIST: &str = "authors:list:";
const CACHE_KEY_AUTHOR_OPTIONS: &str = "authors:options";
const CACHE_KEY_AUTHOR_STATS: &str = "authors:stats";

/// Author service
pub struct AuthorService {
    repo: Arc<dyn AuthorRepository>,
    uploader: Arc<ImageUploader>,
    cache: Arc<Cache>,
    cache_ttl: Duration,
    default_photo_url: String,
}

impl AuthorService {
    pub fn new(
        repo: Arc<dyn AuthorRepository>,
        uploader: Arc<ImageUploader>,
        cache: Arc<Cache>,
        default_photo_url: String,
    ) -> Self {
        let cache_ttl = cache.default_ttl();
        Self {
            repo,
            uploader,
            cache,
            cache_ttl,
            default_photo_url,
        }
    }

    /// All authors, or only the active ones
    pub async fn list(&self, ctx: &SessionContext, active_only: bool) -> ActionResult<Vec<Author>> {
        ctx.require()?;

        let cache_key = format!("{}{}", CACHE_KEY_AUTHOR_LIST, active_only);
        if let Some(list) = self.cache.get::<Vec<Author>>(&cache_key).await.ok().flatten() {
            return Ok(list);
        }

        let list = self.repo.list(active_only).await?;
        let _ = self.cache.set(&cache_key, &list, self.cache_ttl).await;
        Ok(list)
    }

    /// Active authors for select lists, retried once on failure
    pub async fn options(&self, ctx: &SessionContext) -> ActionResult<Vec<EntityOption>> {
        ctx.require()?;

        if let Some(options) = self
            .cache
            .get::<Vec<EntityOption>>(CACHE_KEY_AUTHOR_OPTIONS)
            .await
            .ok()
            .flatten()
        {
            return Ok(options);
        }

        let options = retry_once(OPTIONS_RETRY_DELAY, || self.repo.options()).await?;
        let _ = self.cache.set(CACHE_KEY_AUTHOR_OPTIONS, &options, self.cache_ttl).await;
        Ok(options)
    }

    /// News count per author
    pub async fn stats(&self, ctx: &SessionContext) -> ActionResult<EntityStats> {
        ctx.require()?;

        if let Some(stats) = self.cache.get::<EntityStats>(CACHE_KEY_AUTHOR_STATS).await.ok().flatten() {
            return Ok(stats);
        }

        let stats = EntityStats::new(self.repo.stats().await?);
        let _ = self.cache.set(CACHE_KEY_AUTHOR_STATS, &stats, self.cache_ttl).await;
        Ok(stats)
    }

    pub async fn get(&self, ctx: &SessionContext, id: i64) -> ActionResult<Author> {
        ctx.require()?;

        let cache_key = format!("{}{}", CACHE_KEY_AUTHOR_BY_ID, id);
        if let Some(author) = self.cache.get::<Author>(&cache_key).await.ok().flatten() {
            return Ok(author);
        }

        let author = self.repo.get_by_id(id).await?.ok_or_else(|| not_found(id))?;
        let _ = self.cache.set(&cache_key, &author, self.cache_ttl).await;
        Ok(author)
    }

    /// Create an author, storing the photo first when one is given
    ///
    /// The email defaults to the caller's and the photo to the configured
    /// default image.
    pub async fn create(
        &self,
        ctx: &SessionContext,
        input: CreateAuthorInput,
        photo: Option<ImageFile>,
    ) -> ActionResult<Submitted<Author>> {
        let identity = ctx.require()?;
        let mut form = FormState::new();

        let validated = validate_create(&input, identity.email.as_str());
        let (name, email) = form.settle(validated)?;
        if let Some(file) = &photo {
            form.settle(self.uploader.validate(file).map_err(ActionError::from))?;
        }

        let stored = match &photo {
            Some(file) => {
                form.advance(FormStage::UploadingImage)?;
                let stored = self.uploader.store(file, ImageKind::Authors).await;
                Some(form.settle(stored.map_err(ActionError::from))?)
            }
            None => None,
        };

        form.advance(FormStage::Creating)?;
        let author = match &stored {
            Some(StoredImage { url, path }) => Author::new(name, email, url.clone(), Some(path.clone())),
            None => Author::new(name, email, self.default_photo_url.clone(), None),
        };

        let created = match self.repo.create(&author).await {
            Ok(created) => created,
            Err(e) => {
                if let Some(stored) = &stored {
                    self.uploader.discard(&stored.path).await;
                }
                return form.settle(Err(e.into()));
            }
        };
        form.advance(FormStage::Success)?;

        tracing::info!(author_id = created.id, name = %created.name, "Author created");
        self.invalidate_cache().await;
        Ok(Submitted::new(created, form))
    }

    /// Update name, active flag and photo
    ///
    /// A new photo is stored before the record is written and the old one
    /// is removed only after the record points at the new one.
    pub async fn update(
        &self,
        ctx: &SessionContext,
        id: i64,
        input: UpdateAuthorInput,
        photo: Option<ImageFile>,
    ) -> ActionResult<Submitted<Author>> {
        ctx.require()?;
        let mut form = FormState::new();

        let name = form.settle(validate_update(&input))?;
        if let Some(file) = &photo {
            form.settle(self.uploader.validate(file).map_err(ActionError::from))?;
        }

        let existing = self.repo.get_by_id(id).await?;
        let mut author = form.settle(existing.ok_or_else(|| not_found(id)))?;
        let old_path = author.photo_path.clone();

        let stored = match &photo {
            Some(file) => {
                form.advance(FormStage::UploadingImage)?;
                let stored = self.uploader.store(file, ImageKind::Authors).await;
                Some(form.settle(stored.map_err(ActionError::from))?)
            }
            None => None,
        };

        form.advance(FormStage::Updating)?;
        if let Some(name) = name {
            author.name = name;
        }
        if let Some(active) = input.active {
            author.active = active;
        }
        if let Some(stored) = &stored {
            author.photo_url = stored.url.clone();
            author.photo_path = Some(stored.path.clone());
        }

        let updated = match self.repo.update(&author).await {
            Ok(updated) => updated,
            Err(e) => {
                if let Some(stored) = &stored {
                    self.uploader.discard(&stored.path).await;
                }
                return form.settle(Err(e.into()));
            }
        };

        if let Some(stored) = &stored {
            self.uploader.retire_replaced(old_path.as_deref(), &stored.path).await;
        }
        form.advance(FormStage::Success)?;

        tracing::info!(author_id = id, "Author updated");
        self.invalidate_cache().await;
        Ok(Submitted::new(updated, form))
    }

    /// Delete an author no news item references, then remove its photo
    pub async fn delete(&self, ctx: &SessionContext, id: i64) -> ActionResult<()> {
        ctx.require()?;

        let author = self.repo.get_by_id(id).await?.ok_or_else(|| not_found(id))?;

        let in_use = self.repo.count_news(id).await?;
        if in_use > 0 {
            return Err(ActionError::Conflict(format!(
                "Author has {} news item(s) and cannot be deleted",
                in_use
            )));
        }

        self.repo.delete(id).await?;
        tracing::info!(author_id = id, "Author deleted");

        self.uploader.release(author.photo_path.as_deref()).await;
        self.invalidate_cache().await;
        Ok(())
    }

    /// Invalidate author entries and everything that embeds author data
    pub async fn invalidate_cache(&self) {
        invalidate(self.cache.as_ref(), &[Namespace::Authors, Namespace::News, Namespace::Stats]).await;
    }
}

fn validate_create(input: &CreateAuthorInput, caller_email: &str) -> ActionResult<(String, String)> {
    let mut errors = Vec::new();

    let name = input.name.trim();
    if name.is_empty() {
        errors.push(FieldError::new("name", "Name is required"));
    }

    let email = match input.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        Some(email) => normalize_email(email),
        None => normalize_email(caller_email),
    };
    if !is_valid_email(&email) {
        errors.push(FieldError::new("email", "Email is invalid"));
    }

    if !errors.is_empty() {
        return Err(ActionError::invalid_fields(errors));
    }
    Ok((name.to_string(), email))
}

fn validate_update(input: &UpdateAuthorInput) -> ActionResult<Option<String>> {
    match input.name.as_deref().map(str::trim) {
        Some("") => Err(ActionError::invalid_fields(vec![FieldError::new(
            "name",
            "Name is required",
        )])),
        Some(name) => Ok(Some(name.to_string())),
        None => Ok(None),
    }
}

fn not_found(id: i64) -> ActionError {
    ActionError::NotFound(format!("Author with ID {} not found", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::create_cache;
    use crate::config::CacheConfig;
    use crate::db::repositories::{
        NewsRepository, SqlxAuthorRepository, SqlxNewsRepository, SqlxOrphanedObjectRepository,
    };
    use crate::db::DynDatabasePool;
    use crate::models::Role;
    use crate::services::test_support::{admin, insert_category, news_item, signed_in, test_pool};
    use crate::storage::MemoryObjectStorage;

    const DEFAULT_PHOTO: &str = "/static/default-author.png";

    struct Fixture {
        pool: DynDatabasePool,
        storage: Arc<MemoryObjectStorage>,
        service: AuthorService,
    }

    async fn setup_test_service() -> Fixture {
        let pool = test_pool().await;
        let storage = Arc::new(MemoryObjectStorage::default());
        let uploader = Arc::new(ImageUploader::new(
            storage.clone(),
            SqlxOrphanedObjectRepository::boxed(pool.clone()),
            500 * 1024,
        ));
        let service = AuthorService::new(
            SqlxAuthorRepository::boxed(pool.clone()),
            uploader,
            create_cache(&CacheConfig::default()),
            DEFAULT_PHOTO.to_string(),
        );
        Fixture { pool, storage, service }
    }

    fn photo(size: usize) -> ImageFile {
        ImageFile::new("face.png", "image/png", vec![7; size])
    }

    fn named(name: &str) -> CreateAuthorInput {
        CreateAuthorInput {
            name: name.to_string(),
            email: None,
        }
    }

    #[tokio::test]
    async fn test_create_without_photo_uses_defaults() {
        let f = setup_test_service().await;
        let ctx = signed_in("Desk@News.test", Role::Editor);

        let submitted = f.service.create(&ctx, named(" Asha Rao "), None).await.unwrap();

        let author = submitted.record;
        assert_eq!(author.name, "Asha Rao");
        assert_eq!(author.email, "desk@news.test");
        assert_eq!(author.photo_url, DEFAULT_PHOTO);
        assert!(author.photo_path.is_none());
        assert!(author.active);
        assert_eq!(submitted.stages, vec![FormStage::Idle, FormStage::Creating, FormStage::Success]);
        assert_eq!(f.storage.call_count(), 0);
    }

    #[tokio::test]
    async fn test_create_with_photo() {
        let f = setup_test_service().await;
        let input = CreateAuthorInput {
            name: "Imran Shah".to_string(),
            email: Some("imran@news.test".to_string()),
        };

        let submitted = f.service.create(&admin(), input, Some(photo(64))).await.unwrap();

        let path = submitted.record.photo_path.clone().unwrap();
        assert!(path.starts_with("authors/"));
        assert_eq!(submitted.record.photo_url, format!("/media/{}", path));
        assert_eq!(submitted.record.email, "imran@news.test");
        assert!(f.storage.contains(&path));
        assert_eq!(submitted.stages[1], FormStage::UploadingImage);
    }

    #[tokio::test]
    async fn test_create_rejects_oversized_photo_before_storage() {
        let f = setup_test_service().await;

        let result = f.service.create(&admin(), named("Big Photo"), Some(photo(600 * 1024))).await;

        match result {
            Err(ActionError::Validation { message, .. }) => assert!(message.contains("500 KB")),
            other => panic!("expected validation error, got {:?}", other),
        }
        assert_eq!(f.storage.call_count(), 0);
        assert!(f.service.list(&admin(), false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_requires_name() {
        let f = setup_test_service().await;
        let result = f.service.create(&admin(), named("  "), Some(photo(10))).await;
        assert!(matches!(result, Err(ActionError::Validation { .. })));
        assert_eq!(f.storage.call_count(), 0);
    }

    #[tokio::test]
    async fn test_update_photo_replaces_old_object() {
        let f = setup_test_service().await;
        let created = f.service.create(&admin(), named("Asha"), Some(photo(10))).await.unwrap().record;
        let old_path = created.photo_path.clone().unwrap();

        let updated = f
            .service
            .update(&admin(), created.id, UpdateAuthorInput::default(), Some(photo(20)))
            .await
            .unwrap()
            .record;

        let new_path = updated.photo_path.clone().unwrap();
        assert_ne!(new_path, old_path);
        assert_eq!(f.storage.remove_calls(), vec![vec![old_path.clone()]]);
        assert!(f.storage.contains(&new_path));
        assert!(!f.storage.contains(&old_path));
    }

    #[tokio::test]
    async fn test_update_name_and_active_without_photo() {
        let f = setup_test_service().await;
        let created = f.service.create(&admin(), named("Asha"), None).await.unwrap().record;
        let input = UpdateAuthorInput {
            name: Some("Asha R.".to_string()),
            active: Some(false),
        };

        let submitted = f.service.update(&admin(), created.id, input, None).await.unwrap();

        assert_eq!(submitted.record.name, "Asha R.");
        assert!(!submitted.record.active);
        assert_eq!(submitted.stages, vec![FormStage::Idle, FormStage::Updating, FormStage::Success]);
        assert!(f.service.options(&admin()).await.unwrap().is_empty());
        assert_eq!(f.service.list(&admin(), true).await.unwrap().len(), 0);
        assert_eq!(f.service.list(&admin(), false).await.unwrap().len(), 1);
        assert_eq!(f.storage.call_count(), 0);
    }

    #[tokio::test]
    async fn test_update_missing_author() {
        let f = setup_test_service().await;
        let result = f.service.update(&admin(), 404, UpdateAuthorInput::default(), Some(photo(10))).await;
        assert!(matches!(result, Err(ActionError::NotFound(_))));
        assert_eq!(f.storage.call_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_author_with_photo_removes_it_once() {
        let f = setup_test_service().await;
        let created = f.service.create(&admin(), named("Leaving"), Some(photo(10))).await.unwrap().record;
        let path = created.photo_path.clone().unwrap();

        f.service.delete(&admin(), created.id).await.unwrap();

        assert!(matches!(f.service.get(&admin(), created.id).await, Err(ActionError::NotFound(_))));
        assert_eq!(f.storage.remove_calls(), vec![vec![path]]);
    }

    #[tokio::test]
    async fn test_delete_author_with_default_photo_issues_no_removal() {
        let f = setup_test_service().await;
        let created = f.service.create(&admin(), named("Plain"), None).await.unwrap().record;

        f.service.delete(&admin(), created.id).await.unwrap();

        assert!(f.storage.remove_calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_restricted_while_bylined() {
        let f = setup_test_service().await;
        let author = f.service.create(&admin(), named("Busy"), Some(photo(10))).await.unwrap().record;
        let category = insert_category(&f.pool, "World").await;
        SqlxNewsRepository::new(f.pool.clone())
            .create(&news_item(author.id, category.id, "Summit", &["world"]))
            .await
            .unwrap();

        let result = f.service.delete(&admin(), author.id).await;

        assert!(matches!(result, Err(ActionError::Conflict(_))));
        assert!(f.storage.remove_calls().is_empty());
        let stats = f.service.stats(&admin()).await.unwrap();
        assert_eq!(stats.items[0].news_count, 1);
    }

    #[tokio::test]
    async fn test_anonymous_calls_change_nothing() {
        let f = setup_test_service().await;
        let existing = f.service.create(&admin(), named("Kept"), Some(photo(10))).await.unwrap().record;
        let calls_before = f.storage.call_count();
        let anon = SessionContext::anonymous();

        assert!(matches!(f.service.list(&anon, false).await, Err(ActionError::Unauthorized)));
        assert!(matches!(f.service.options(&anon).await, Err(ActionError::Unauthorized)));
        assert!(matches!(f.service.stats(&anon).await, Err(ActionError::Unauthorized)));
        assert!(matches!(f.service.get(&anon, existing.id).await, Err(ActionError::Unauthorized)));
        assert!(matches!(
            f.service.create(&anon, named("New"), Some(photo(10))).await,
            Err(ActionError::Unauthorized)
        ));
        assert!(matches!(
            f.service
                .update(&anon, existing.id, UpdateAuthorInput::default(), Some(photo(10)))
                .await,
            Err(ActionError::Unauthorized)
        ));
        assert!(matches!(f.service.delete(&anon, existing.id).await, Err(ActionError::Unauthorized)));

        assert_eq!(f.storage.call_count(), calls_before);
        let remaining = SqlxAuthorRepository::new(f.pool.clone()).count().await.unwrap();
        assert_eq!(remaining, 1);
    }
}
