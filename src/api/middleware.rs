//! API middleware
//!
//! Contains:
//! - Shared application state
//! - The JSON error type returned by every handler
//! - Session resolution: the presented token becomes a [`SessionContext`]
//!   stored in request extensions and extracted by handlers

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::create_cache;
use crate::config::Config;
use crate::db::repositories::{
    SqlxAuthorRepository, SqlxCategoryRepository, SqlxIdentityRepository, SqlxNewsRepository,
    SqlxOneTimeCodeRepository, SqlxOrphanedObjectRepository, SqlxSessionRepository,
};
use crate::db::DynDatabasePool;
use crate::services::{
    ActionError, AuthorService, CategoryService, CodeMailer, IdentityService, ImageUploader,
    NewsService, OrphanSweeper, SessionContext, StatsService,
};
use crate::storage::ObjectStorage;

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub identity_service: Arc<IdentityService>,
    pub author_service: Arc<AuthorService>,
    pub category_service: Arc<CategoryService>,
    pub news_service: Arc<NewsService>,
    pub stats_service: Arc<StatsService>,
    pub uploader: Arc<ImageUploader>,
    pub orphan_sweeper: Arc<OrphanSweeper>,
    /// Directory served under `/media`
    pub media_root: PathBuf,
}

impl AppState {
    /// Wire repositories and services over a migrated pool
    pub fn new(
        config: &Config,
        pool: DynDatabasePool,
        storage: Arc<dyn ObjectStorage>,
        mailer: Arc<dyn CodeMailer>,
    ) -> Self {
        let cache = create_cache(&config.cache);

        let author_repo = SqlxAuthorRepository::boxed(pool.clone());
        let category_repo = SqlxCategoryRepository::boxed(pool.clone());
        let news_repo = SqlxNewsRepository::boxed(pool.clone());
        let orphan_repo = SqlxOrphanedObjectRepository::boxed(pool.clone());

        let uploader = Arc::new(ImageUploader::new(
            storage.clone(),
            orphan_repo.clone(),
            config.storage.max_image_bytes,
        ));

        let identity_service = Arc::new(IdentityService::new(
            SqlxIdentityRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool.clone()),
            SqlxOneTimeCodeRepository::boxed(pool.clone()),
            mailer,
            &config.auth,
        ));
        let author_service = Arc::new(AuthorService::new(
            author_repo.clone(),
            uploader.clone(),
            cache.clone(),
            config.storage.default_author_photo_url.clone(),
        ));
        let category_service = Arc::new(CategoryService::new(category_repo.clone(), cache.clone()));
        let news_service = Arc::new(NewsService::new(
            news_repo.clone(),
            author_repo.clone(),
            category_repo.clone(),
            uploader.clone(),
            cache.clone(),
        ));
        let stats_service = Arc::new(StatsService::new(news_repo, author_repo, category_repo, cache));

        Self {
            pool,
            identity_service,
            author_service,
            category_service,
            news_service,
            stats_service,
            uploader,
            orphan_sweeper: Arc::new(OrphanSweeper::new(storage, orphan_repo)),
            media_root: config.storage.path.clone(),
        }
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn rate_limited(message: impl Into<String>, retry_after: i64) -> Self {
        Self::with_details("RATE_LIMIT", message, serde_json::json!({ "retry_after": retry_after }))
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "RATE_LIMIT" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<ActionError> for ApiError {
    fn from(err: ActionError) -> Self {
        match err {
            ActionError::Validation { message, fields } if fields.is_empty() => {
                ApiError::validation_error(message)
            }
            ActionError::Validation { message, fields } => ApiError::with_details(
                "VALIDATION_ERROR",
                message,
                serde_json::json!({ "fields": fields }),
            ),
            ActionError::Unauthorized => ApiError::unauthorized("Authentication required"),
            ActionError::Forbidden(message) => ApiError::forbidden(message),
            ActionError::NotFound(message) => ApiError::not_found(message),
            ActionError::Conflict(message) => ApiError::conflict(message),
            ActionError::RateLimited { retry_after } => ApiError::rate_limited(
                format!("Too many attempts, try again in {} seconds", retry_after),
                retry_after,
            ),
            ActionError::Internal(e) => {
                tracing::error!("Request failed: {:#}", e);
                ApiError::internal_error("Internal server error")
            }
        }
    }
}

/// Extract session token from request
fn extract_session_token(request: &Request) -> Option<String> {
    if let Some(auth_header) = request.headers().get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }

    if let Some(cookie_header) = request.headers().get(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                let cookie = cookie.trim();
                if let Some(token) = cookie.strip_prefix("session=") {
                    return Some(token.to_string());
                }
            }
        }
    }

    None
}

/// Session middleware
///
/// Runs for every API route. Requests without a valid token get an
/// anonymous context; the actions themselves decide what that allows.
pub async fn resolve_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(&request);
    let ctx = state
        .identity_service
        .session_context(token.as_deref())
        .await
        .map_err(ActionError::from)?;

    request.extensions_mut().insert(ctx);
    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for SessionContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<SessionContext>()
            .cloned()
            .unwrap_or_default())
    }
}

// ============================================================================
// Tests
// ============================================================================
