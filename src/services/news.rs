//! News service
//!
//! Implements business logic for news items:
//! - Paged listing (newest first) and search
//! - Create and update as compound submissions: validate, store the
//!   picture, write the record, retire the replaced picture
//! - Delete, followed by a best-effort removal of the picture
//! - View counting for the public site
//!
//! Changes are allowed for admins, and for editors whose email matches the
//! email of the item's author.

use std::sync::Arc;
use std::time::Duration;

use super::form::{FormStage, FormState, Submitted};
use super::upload::{ImageFile, ImageKind, ImageUploader};
use super::{ActionError, ActionResult, SessionContext};
use crate::cache::{invalidate, Cache, CacheLayer, Namespace};
use crate::db::repositories::{AuthorRepository, CategoryRepository, NewsRepository};
use crate::models::{
    normalize_email, Author, FieldError, Identity, ListParams, NewsDraft, NewsInput, NewsItem,
    NewsItemWithRefs, PagedResult,
};

/// Cache key prefixes
const CACHE_KEY_NEWS_BY_ID: &str = "news:id:";
const CACHE_KEY_NEWS_LIST: &str = "news:list:";

/// News service
pub struct NewsService {
    repo: Arc<dyn NewsRepository>,
    authors: Arc<dyn AuthorRepository>,
    categories: Arc<dyn CategoryRepository>,
    uploader: Arc<ImageUploader>,
    cache: Arc<Cache>,
    cache_ttl: Duration,
}

/// Whether a submission creates or updates
#[derive(Clone, Copy, PartialEq)]
enum Mode {
    Create,
    Update,
}

impl NewsService {
    pub fn new(
        repo: Arc<dyn NewsRepository>,
        authors: Arc<dyn AuthorRepository>,
        categories: Arc<dyn CategoryRepository>,
        uploader: Arc<ImageUploader>,
        cache: Arc<Cache>,
    ) -> Self {
        let cache_ttl = cache.default_ttl();
        Self {
            repo,
            authors,
            categories,
            uploader,
            cache,
            cache_ttl,
        }
    }

    /// One page of news items, newest first
    pub async fn list(
        &self,
        ctx: &SessionContext,
        params: &ListParams,
    ) -> ActionResult<PagedResult<NewsItemWithRefs>> {
        ctx.require()?;

        let cache_key = format!("{}{}:{}", CACHE_KEY_NEWS_LIST, params.page, params.per_page);
        if let Some(page) = self
            .cache
            .get::<PagedResult<NewsItemWithRefs>>(&cache_key)
            .await
            .ok()
            .flatten()
        {
            return Ok(page);
        }

        let page = self.repo.list(params).await?;
        let _ = self.cache.set(&cache_key, &page, self.cache_ttl).await;
        Ok(page)
    }

    pub async fn get(&self, ctx: &SessionContext, id: i64) -> ActionResult<NewsItemWithRefs> {
        ctx.require()?;

        let cache_key = format!("{}{}", CACHE_KEY_NEWS_BY_ID, id);
        if let Some(item) = self.cache.get::<NewsItemWithRefs>(&cache_key).await.ok().flatten() {
            return Ok(item);
        }

        let item = self.repo.get_with_refs(id).await?.ok_or_else(|| not_found(id))?;
        let _ = self.cache.set(&cache_key, &item, self.cache_ttl).await;
        Ok(item)
    }

    /// Items whose text, author, category or tags match `query`
    ///
    /// An empty query returns every item.
    pub async fn search(&self, ctx: &SessionContext, query: &str) -> ActionResult<Vec<NewsItemWithRefs>> {
        ctx.require()?;
        Ok(self.repo.search(query).await?)
    }

    /// Create a news item from a submitted draft and picture
    pub async fn create(
        &self,
        ctx: &SessionContext,
        draft: &NewsDraft,
        image: Option<ImageFile>,
    ) -> ActionResult<Submitted<NewsItem>> {
        let identity = ctx.require()?;
        let mut form = FormState::new();

        let input = form.settle(self.validate(draft, image.as_ref(), Mode::Create))?;
        let author = form.settle(self.check_references(&input, Mode::Create).await)?;
        form.settle(ensure_owner(identity, &author))?;

        let Some(file) = image else {
            return form.settle(Err(image_required()));
        };

        form.advance(FormStage::UploadingImage)?;
        let stored = self.uploader.store(&file, ImageKind::News).await;
        let stored = form.settle(stored.map_err(ActionError::from))?;

        form.advance(FormStage::Creating)?;
        let item = NewsItem::new(input, stored.url, stored.path.clone());
        let created = match self.repo.create(&item).await {
            Ok(created) => created,
            Err(e) => {
                self.uploader.discard(&stored.path).await;
                return form.settle(Err(e.into()));
            }
        };
        form.advance(FormStage::Success)?;

        tracing::info!(news_id = created.id, by = %identity.email, "News item created");
        self.invalidate_cache().await;
        Ok(Submitted::new(created, form))
    }

    /// Update a news item, optionally replacing its picture
    pub async fn update(
        &self,
        ctx: &SessionContext,
        id: i64,
        draft: &NewsDraft,
        image: Option<ImageFile>,
    ) -> ActionResult<Submitted<NewsItem>> {
        let identity = ctx.require()?;
        let mut form = FormState::new();

        let input = form.settle(self.validate(draft, image.as_ref(), Mode::Update))?;
        let existing = self.repo.get_by_id(id).await?;
        let mut item = form.settle(existing.ok_or_else(|| not_found(id)))?;

        if !identity.is_admin() {
            let current_author = self.authors.get_by_id(item.author_id).await?;
            let owned = current_author.is_some_and(|author| ensure_owner(identity, &author).is_ok());
            if !owned {
                return form.settle(Err(forbidden()));
            }
        }
        let author = form.settle(self.check_references(&input, Mode::Update).await)?;
        form.settle(ensure_owner(identity, &author))?;

        let old_path = item.picture_path.clone();
        let stored = match &image {
            Some(file) => {
                form.advance(FormStage::UploadingImage)?;
                let stored = self.uploader.store(file, ImageKind::News).await;
                Some(form.settle(stored.map_err(ActionError::from))?)
            }
            None => None,
        };

        form.advance(FormStage::Updating)?;
        item.apply(input);
        if let Some(stored) = &stored {
            item.picture_url = stored.url.clone();
            item.picture_path = stored.path.clone();
        }

        let updated = match self.repo.update(&item).await {
            Ok(updated) => updated,
            Err(e) => {
                if let Some(stored) = &stored {
                    self.uploader.discard(&stored.path).await;
                }
                return form.settle(Err(e.into()));
            }
        };

        if let Some(stored) = &stored {
            self.uploader.retire_replaced(Some(&old_path), &stored.path).await;
        }
        form.advance(FormStage::Success)?;

        tracing::info!(news_id = id, by = %identity.email, "News item updated");
        self.invalidate_cache().await;
        Ok(Submitted::new(updated, form))
    }

    /// Delete a news item, then remove its picture
    pub async fn delete(&self, ctx: &SessionContext, id: i64) -> ActionResult<()> {
        let identity = ctx.require()?;

        let item = self.repo.get_by_id(id).await?.ok_or_else(|| not_found(id))?;
        if !identity.is_admin() {
            let author = self.authors.get_by_id(item.author_id).await?;
            match author {
                Some(author) => ensure_owner(identity, &author)?,
                None => return Err(forbidden()),
            }
        }

        self.repo.delete(id).await?;
        tracing::info!(news_id = id, by = %identity.email, "News item deleted");

        self.uploader.release(Some(&item.picture_path)).await;
        self.invalidate_cache().await;
        Ok(())
    }

    /// Count a view from the public site
    pub async fn record_view(&self, id: i64) -> ActionResult<()> {
        if !self.repo.increment_views(id).await? {
            return Err(not_found(id));
        }
        // Cached items and pages carry the view count too
        invalidate(self.cache.as_ref(), &[Namespace::News, Namespace::Stats]).await;
        Ok(())
    }

    /// Invalidate news entries and the counts derived from them
    pub async fn invalidate_cache(&self) {
        invalidate(
            self.cache.as_ref(),
            &[Namespace::News, Namespace::Authors, Namespace::Categories, Namespace::Stats],
        )
        .await;
    }

    /// Form rules plus the image checks, all collected together
    fn validate(&self, draft: &NewsDraft, image: Option<&ImageFile>, mode: Mode) -> ActionResult<NewsInput> {
        let mut result = draft.validate();

        let image_error = match image {
            Some(file) => self.uploader.validate(file).err().map(|e| e.to_string()),
            None if mode == Mode::Create => Some("Image is required".to_string()),
            None => None,
        };

        if let Some(message) = image_error {
            let error = FieldError::new("image", message);
            match &mut result {
                Ok(_) => result = Err(vec![error]),
                Err(errors) => errors.push(error),
            }
        }

        result.map_err(ActionError::invalid_fields)
    }

    /// Resolve the chosen author and make sure the category exists
    async fn check_references(&self, input: &NewsInput, mode: Mode) -> ActionResult<Author> {
        let mut errors = Vec::new();

        let author = self.authors.get_by_id(input.author_id).await?;
        match &author {
            None => errors.push(FieldError::new("author_id", "Author does not exist")),
            Some(author) if mode == Mode::Create && !author.active => {
                errors.push(FieldError::new("author_id", "Author is inactive"))
            }
            Some(_) => {}
        }

        if self.categories.get_by_id(input.category_id).await?.is_none() {
            errors.push(FieldError::new("category_id", "Category does not exist"));
        }

        match author {
            Some(author) if errors.is_empty() => Ok(author),
            _ => Err(ActionError::invalid_fields(errors)),
        }
    }
}

fn ensure_owner(identity: &Identity, author: &Author) -> ActionResult<()> {
    if identity.is_admin() || normalize_email(&author.email) == identity.email {
        Ok(())
    } else {
        Err(forbidden())
    }
}

fn forbidden() -> ActionError {
    ActionError::Forbidden("Only an admin or the item's author can change this news item".to_string())
}

fn image_required() -> ActionError {
    ActionError::invalid_fields(vec![FieldError::new("image", "Image is required")])
}

fn not_found(id: i64) -> ActionError {
    ActionError::NotFound(format!("News item with ID {} not found", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::create_cache;
    use crate::config::CacheConfig;
    use crate::db::repositories::{
        SqlxAuthorRepository, SqlxCategoryRepository, SqlxNewsRepository,
        SqlxOrphanedObjectRepository,
    };
    use crate::db::DynDatabasePool;
    use crate::models::Role;
    use crate::services::test_support::{
        admin, draft, insert_author, insert_category, signed_in, test_pool,
    };
    use crate::storage::MemoryObjectStorage;

    struct Fixture {
        pool: DynDatabasePool,
        storage: Arc<MemoryObjectStorage>,
        service: NewsService,
        author_id: i64,
        category_id: i64,
    }

    async fn setup_test_service() -> Fixture {
        let pool = test_pool().await;
        let storage = Arc::new(MemoryObjectStorage::default());
        let uploader = Arc::new(ImageUploader::new(
            storage.clone(),
            SqlxOrphanedObjectRepository::boxed(pool.clone()),
            500 * 1024,
        ));
        let service = NewsService::new(
            SqlxNewsRepository::boxed(pool.clone()),
            SqlxAuthorRepository::boxed(pool.clone()),
            SqlxCategoryRepository::boxed(pool.clone()),
            uploader,
            create_cache(&CacheConfig::default()),
        );
        let author = insert_author(&pool, "Asha Rao", "asha@news.test", true).await;
        let category = insert_category(&pool, "Politics").await;

        Fixture {
            pool,
            storage,
            service,
            author_id: author.id,
            category_id: category.id,
        }
    }

    fn picture(size: usize) -> ImageFile {
        ImageFile::new("cover.jpg", "image/jpeg", vec![1; size])
    }

    fn field_names(err: ActionError) -> Vec<String> {
        match err {
            ActionError::Validation { fields, .. } => fields.into_iter().map(|f| f.field).collect(),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    async fn news_count(pool: &DynDatabasePool) -> i64 {
        SqlxNewsRepository::new(pool.clone()).count().await.unwrap()
    }

    #[tokio::test]
    async fn test_create_parses_tags_and_read_time() {
        let f = setup_test_service().await;

        let submitted = f
            .service
            .create(&admin(), &draft(f.author_id, f.category_id, "Budget passed"), Some(picture(100)))
            .await
            .unwrap();

        let item = submitted.record;
        assert_eq!(item.tags, vec!["news", "tech"]);
        assert_eq!(item.read_time, 5);
        assert!(item.picture_path.starts_with("news/"));
        assert!(f.storage.contains(&item.picture_path));
        assert_eq!(
            submitted.stages,
            vec![FormStage::Idle, FormStage::UploadingImage, FormStage::Creating, FormStage::Success]
        );
    }

    #[tokio::test]
    async fn test_create_requires_image() {
        let f = setup_test_service().await;

        let err = f
            .service
            .create(&admin(), &draft(f.author_id, f.category_id, "No picture"), None)
            .await
            .unwrap_err();

        assert_eq!(field_names(err), vec!["image"]);
        assert_eq!(f.storage.call_count(), 0);
    }

    #[tokio::test]
    async fn test_create_rejects_600kb_jpeg() {
        let f = setup_test_service().await;

        let err = f
            .service
            .create(&admin(), &draft(f.author_id, f.category_id, "Huge"), Some(picture(600 * 1024)))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("500 KB"));
        assert_eq!(f.storage.call_count(), 0);
        assert_eq!(news_count(&f.pool).await, 0);
    }

    #[tokio::test]
    async fn test_create_collects_field_errors() {
        let f = setup_test_service().await;
        let mut bad = draft(f.author_id, f.category_id, "Bad");
        bad.hi.heading = " ".to_string();
        bad.ur.content = "short".to_string();
        bad.tags = "news, tech!".to_string();
        bad.read_time = "0".to_string();

        let err = f.service.create(&admin(), &bad, Some(picture(10))).await.unwrap_err();

        assert_eq!(field_names(err), vec!["heading_hi", "content_ur", "tags", "read_time"]);
        assert_eq!(f.storage.call_count(), 0);
    }

    #[tokio::test]
    async fn test_create_rejects_missing_or_inactive_references() {
        let f = setup_test_service().await;
        let retired = insert_author(&f.pool, "Retired", "retired@news.test", false).await;

        let err = f
            .service
            .create(&admin(), &draft(retired.id, 999, "Refs"), Some(picture(10)))
            .await
            .unwrap_err();

        assert_eq!(field_names(err), vec!["author_id", "category_id"]);
        assert_eq!(f.storage.call_count(), 0);
    }

    #[tokio::test]
    async fn test_editor_can_only_write_own_items() {
        let f = setup_test_service().await;
        let other = signed_in("someone@news.test", Role::Editor);
        let owner = signed_in("ASHA@news.test", Role::Editor);
        let d = draft(f.author_id, f.category_id, "Owned");

        let denied = f.service.create(&other, &d, Some(picture(10))).await;
        assert!(matches!(denied, Err(ActionError::Forbidden(_))));
        assert_eq!(f.storage.call_count(), 0);

        let created = f.service.create(&owner, &d, Some(picture(10))).await.unwrap().record;

        let update = f.service.update(&other, created.id, &d, None).await;
        assert!(matches!(update, Err(ActionError::Forbidden(_))));
        let delete = f.service.delete(&other, created.id).await;
        assert!(matches!(delete, Err(ActionError::Forbidden(_))));

        assert!(f.service.delete(&owner, created.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_image_replaces_old_path() {
        let f = setup_test_service().await;
        let created = f
            .service
            .create(&admin(), &draft(f.author_id, f.category_id, "Before"), Some(picture(10)))
            .await
            .unwrap()
            .record;
        let old_path = created.picture_path.clone();

        let submitted = f
            .service
            .update(&admin(), created.id, &draft(f.author_id, f.category_id, "After"), Some(picture(20)))
            .await
            .unwrap();

        let updated = submitted.record;
        assert_ne!(updated.picture_path, old_path);
        assert_eq!(updated.en.heading, "After");
        assert_eq!(f.storage.remove_calls(), vec![vec![old_path.clone()]]);
        assert!(f.storage.contains(&updated.picture_path));
        assert_eq!(updated.picture_url, format!("/media/{}", updated.picture_path));
        assert_eq!(
            submitted.stages,
            vec![FormStage::Idle, FormStage::UploadingImage, FormStage::Updating, FormStage::Success]
        );
    }

    #[tokio::test]
    async fn test_update_without_image_keeps_picture() {
        let f = setup_test_service().await;
        let created = f
            .service
            .create(&admin(), &draft(f.author_id, f.category_id, "Before"), Some(picture(10)))
            .await
            .unwrap()
            .record;
        let calls = f.storage.call_count();

        let updated = f
            .service
            .update(&admin(), created.id, &draft(f.author_id, f.category_id, "Edited"), None)
            .await
            .unwrap()
            .record;

        assert_eq!(updated.picture_path, created.picture_path);
        assert_eq!(f.storage.call_count(), calls);
    }

    #[tokio::test]
    async fn test_update_keeps_deactivated_author() {
        let f = setup_test_service().await;
        let created = f
            .service
            .create(&admin(), &draft(f.author_id, f.category_id, "Before"), Some(picture(10)))
            .await
            .unwrap()
            .record;
        let authors = SqlxAuthorRepository::new(f.pool.clone());
        let mut author = authors.get_by_id(f.author_id).await.unwrap().unwrap();
        author.active = false;
        authors.update(&author).await.unwrap();

        let result = f
            .service
            .update(&admin(), created.id, &draft(f.author_id, f.category_id, "Still here"), None)
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_delete_removes_picture_once() {
        let f = setup_test_service().await;
        let created = f
            .service
            .create(&admin(), &draft(f.author_id, f.category_id, "Gone"), Some(picture(10)))
            .await
            .unwrap()
            .record;

        f.service.delete(&admin(), created.id).await.unwrap();

        assert!(matches!(f.service.get(&admin(), created.id).await, Err(ActionError::NotFound(_))));
        assert_eq!(f.storage.remove_calls(), vec![vec![created.picture_path]]);
    }

    #[tokio::test]
    async fn test_list_search_and_views() {
        let f = setup_test_service().await;
        for heading in ["Monsoon arrives", "Cricket final", "Monsoon floods"] {
            f.service
                .create(&admin(), &draft(f.author_id, f.category_id, heading), Some(picture(10)))
                .await
                .unwrap();
        }

        let page = f.service.list(&admin(), &ListParams::new(1, 2)).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].item.en.heading, "Monsoon floods");

        let hits = f.service.search(&admin(), "  MONSOON ").await.unwrap();
        let headings: Vec<_> = hits.iter().map(|h| h.item.en.heading.as_str()).collect();
        assert_eq!(headings, vec!["Monsoon floods", "Monsoon arrives"]);
        assert_eq!(f.service.search(&admin(), "").await.unwrap().len(), 3);

        let id = hits[0].item.id;
        f.service.record_view(id).await.unwrap();
        f.service.record_view(id).await.unwrap();
        assert_eq!(f.service.get(&admin(), id).await.unwrap().item.views, 2);
        assert!(matches!(f.service.record_view(9999).await, Err(ActionError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_view_count_not_served_stale_from_cache() {
        let f = setup_test_service().await;
        let id = f
            .service
            .create(&admin(), &draft(f.author_id, f.category_id, "Monsoon arrives"), Some(picture(10)))
            .await
            .unwrap()
            .record
            .id;

        // Warm both the item and the page entries
        assert_eq!(f.service.get(&admin(), id).await.unwrap().item.views, 0);
        let page = f.service.list(&admin(), &ListParams::default()).await.unwrap();
        assert_eq!(page.items[0].item.views, 0);

        f.service.record_view(id).await.unwrap();

        assert_eq!(f.service.get(&admin(), id).await.unwrap().item.views, 1);
        let page = f.service.list(&admin(), &ListParams::default()).await.unwrap();
        assert_eq!(page.items[0].item.views, 1);
    }

    #[tokio::test]
    async fn test_anonymous_calls_change_nothing() {
        let f = setup_test_service().await;
        let d = draft(f.author_id, f.category_id, "Kept");
        let existing = f.service.create(&admin(), &d, Some(picture(10))).await.unwrap().record;
        let calls = f.storage.call_count();
        let anon = SessionContext::anonymous();

        assert!(matches!(f.service.list(&anon, &ListParams::default()).await, Err(ActionError::Unauthorized)));
        assert!(matches!(f.service.get(&anon, existing.id).await, Err(ActionError::Unauthorized)));
        assert!(matches!(f.service.search(&anon, "kept").await, Err(ActionError::Unauthorized)));
        assert!(matches!(
            f.service.create(&anon, &d, Some(picture(10))).await,
            Err(ActionError::Unauthorized)
        ));
        assert!(matches!(
            f.service.update(&anon, existing.id, &d, Some(picture(10))).await,
            Err(ActionError::Unauthorized)
        ));
        assert!(matches!(f.service.delete(&anon, existing.id).await, Err(ActionError::Unauthorized)));

        assert_eq!(f.storage.call_count(), calls);
        assert_eq!(news_count(&f.pool).await, 1);
    }
}
