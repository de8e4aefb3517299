//! Author API endpoints
//!
//! - GET /api/v1/authors?active=true - Authors with news counts
//! - GET /api/v1/authors/options - `{id, name}` pairs
//! - GET /api/v1/authors/stats - News count per author
//! - POST /api/v1/authors - Create (multipart: name, email?, file?)
//! - GET/PUT/DELETE /api/v1/authors/{id} (PUT multipart: name?, active?, file?)

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::SubmittedForm;
use crate::api::middleware::{ApiError, AppState};
use crate::api::responses::{DeleteResponse, MutationResponse};
use crate::models::{Author, CreateAuthorInput, EntityOption, EntityStats, UpdateAuthorInput};
use crate::services::SessionContext;

#[derive(Debug, Deserialize)]
pub struct ListAuthorsQuery {
    #[serde(default)]
    pub active: bool,
}

type AuthorMutation = MutationResponse<Author, Vec<Author>>;

/// Build the authors router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_authors).post(create_author))
        .route("/options", get(author_options))
        .route("/stats", get(author_stats))
        .route("/{id}", get(get_author).put(update_author).delete(delete_author))
}

async fn list_authors(
    State(state): State<AppState>,
    ctx: SessionContext,
    Query(query): Query<ListAuthorsQuery>,
) -> Result<Json<Vec<Author>>, ApiError> {
    Ok(Json(state.author_service.list(&ctx, query.active).await?))
}

async fn author_options(
    State(state): State<AppState>,
    ctx: SessionContext,
) -> Result<Json<Vec<EntityOption>>, ApiError> {
    Ok(Json(state.author_service.options(&ctx).await?))
}

async fn author_stats(
    State(state): State<AppState>,
    ctx: SessionContext,
) -> Result<Json<EntityStats>, ApiError> {
    Ok(Json(state.author_service.stats(&ctx).await?))
}

async fn get_author(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(id): Path<i64>,
) -> Result<Json<Author>, ApiError> {
    Ok(Json(state.author_service.get(&ctx, id).await?))
}

async fn create_author(
    State(state): State<AppState>,
    ctx: SessionContext,
    multipart: Multipart,
) -> Result<(StatusCode, Json<AuthorMutation>), ApiError> {
    ctx.require()?;
    let mut form = SubmittedForm::read(multipart).await?;

    let input = CreateAuthorInput {
        name: form.text("name"),
        email: form.optional("email"),
    };
    let photo = form.take_file();

    let service = &state.author_service;
    let submitted = service.create(&ctx, input, photo).await?;
    let list = service.list(&ctx, false).await?;

    Ok((StatusCode::CREATED, Json(MutationResponse::submitted(submitted, list))))
}

async fn update_author(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<Json<AuthorMutation>, ApiError> {
    ctx.require()?;
    let mut form = SubmittedForm::read(multipart).await?;

    let input = UpdateAuthorInput {
        name: form.fields.get("name").cloned(),
        active: form.flag("active")?,
    };
    let photo = form.take_file();

    let service = &state.author_service;
    let submitted = service.update(&ctx, id, input, photo).await?;
    let list = service.list(&ctx, false).await?;

    Ok(Json(MutationResponse::submitted(submitted, list)))
}

async fn delete_author(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(id): Path<i64>,
) -> Result<Json<DeleteResponse<Vec<Author>>>, ApiError> {
    let service = &state.author_service;
    service.delete(&ctx, id).await?;
    let list = service.list(&ctx, false).await?;

    Ok(Json(DeleteResponse { deleted: id, list }))
}
