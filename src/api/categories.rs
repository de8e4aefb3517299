//! Category API endpoints
//!
//! - GET /api/v1/categories - All categories with news counts
//! - GET /api/v1/categories/options - `{id, name}` pairs
//! - GET /api/v1/categories/stats - News count per category
//! - POST /api/v1/categories - Create
//! - GET/PUT/DELETE /api/v1/categories/{id}
//!
//! Writes answer with the refreshed list.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState};
use crate::api::responses::{DeleteResponse, MutationResponse};
use crate::models::{Category, EntityOption, EntityStats};
use crate::services::SessionContext;

#[derive(Debug, Deserialize)]
pub struct CategoryRequest {
    #[serde(default)]
    pub name: String,
}

/// Build the categories router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_categories).post(create_category))
        .route("/options", get(category_options))
        .route("/stats", get(category_stats))
        .route(
            "/{id}",
            get(get_category).put(update_category).delete(delete_category),
        )
}

async fn list_categories(
    State(state): State<AppState>,
    ctx: SessionContext,
) -> Result<Json<Vec<Category>>, ApiError> {
    Ok(Json(state.category_service.list(&ctx).await?))
}

async fn category_options(
    State(state): State<AppState>,
    ctx: SessionContext,
) -> Result<Json<Vec<EntityOption>>, ApiError> {
    Ok(Json(state.category_service.options(&ctx).await?))
}

async fn category_stats(
    State(state): State<AppState>,
    ctx: SessionContext,
) -> Result<Json<EntityStats>, ApiError> {
    Ok(Json(state.category_service.stats(&ctx).await?))
}

async fn get_category(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(id): Path<i64>,
) -> Result<Json<Category>, ApiError> {
    Ok(Json(state.category_service.get(&ctx, id).await?))
}

async fn create_category(
    State(state): State<AppState>,
    ctx: SessionContext,
    Json(body): Json<CategoryRequest>,
) -> Result<(StatusCode, Json<MutationResponse<Category, Vec<Category>>>), ApiError> {
    let service = &state.category_service;
    let category = service.create(&ctx, &body.name).await?;
    let list = service.list(&ctx).await?;

    Ok((StatusCode::CREATED, Json(MutationResponse::new(category, list))))
}

async fn update_category(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(id): Path<i64>,
    Json(body): Json<CategoryRequest>,
) -> Result<Json<MutationResponse<Category, Vec<Category>>>, ApiError> {
    let service = &state.category_service;
    let category = service.update(&ctx, id, &body.name).await?;
    let list = service.list(&ctx).await?;

    Ok(Json(MutationResponse::new(category, list)))
}

async fn delete_category(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(id): Path<i64>,
) -> Result<Json<DeleteResponse<Vec<Category>>>, ApiError> {
    let service = &state.category_service;
    service.delete(&ctx, id).await?;
    let list = service.list(&ctx).await?;

    Ok(Json(DeleteResponse { deleted: id, list }))
}
