//! News API endpoints
//!
//! - GET /api/v1/news?page=&per_page= - Newest first
//! - GET /api/v1/news/search?q= - Match heading, tagline, content or tags
//! - POST /api/v1/news - Create (multipart)
//! - GET/PUT/DELETE /api/v1/news/{id}
//! - POST /api/v1/news/{id}/views - Count a view (public)
//!
//! Multipart fields: `heading_<lang>`, `tagline_<lang>`, `content_<lang>`
//! for each of en, hi and ur, then `author_id`, `category_id`, `tags`,
//! `read_time` and the picture in `file`.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{PaginationQuery, SubmittedForm};
use crate::api::middleware::{ApiError, AppState};
use crate::api::responses::{DeleteResponse, MutationResponse};
use crate::models::{Language, ListParams, LocalizedCopy, NewsDraft, NewsItem, NewsItemWithRefs, PagedResult};
use crate::services::SessionContext;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

type NewsPage = PagedResult<NewsItemWithRefs>;

/// Build the news router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_news).post(create_news))
        .route("/search", get(search_news))
        .route("/{id}", get(get_news).put(update_news).delete(delete_news))
}

/// Routes reachable without a session
pub fn public_router() -> Router<AppState> {
    Router::new().route("/{id}/views", post(record_view))
}

async fn list_news(
    State(state): State<AppState>,
    ctx: SessionContext,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<NewsPage>, ApiError> {
    let params: ListParams = query.into();
    Ok(Json(state.news_service.list(&ctx, &params).await?))
}

async fn search_news(
    State(state): State<AppState>,
    ctx: SessionContext,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<NewsItemWithRefs>>, ApiError> {
    Ok(Json(state.news_service.search(&ctx, &query.q).await?))
}

async fn get_news(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(id): Path<i64>,
) -> Result<Json<NewsItemWithRefs>, ApiError> {
    Ok(Json(state.news_service.get(&ctx, id).await?))
}

async fn create_news(
    State(state): State<AppState>,
    ctx: SessionContext,
    multipart: Multipart,
) -> Result<(StatusCode, Json<MutationResponse<NewsItem, NewsPage>>), ApiError> {
    ctx.require()?;
    let mut form = SubmittedForm::read(multipart).await?;
    let draft = draft_from_form(&form);
    let picture = form.take_file();

    let service = &state.news_service;
    let submitted = service.create(&ctx, &draft, picture).await?;
    let list = service.list(&ctx, &ListParams::default()).await?;

    Ok((StatusCode::CREATED, Json(MutationResponse::submitted(submitted, list))))
}

async fn update_news(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<Json<MutationResponse<NewsItem, NewsPage>>, ApiError> {
    ctx.require()?;
    let mut form = SubmittedForm::read(multipart).await?;
    let draft = draft_from_form(&form);
    let picture = form.take_file();

    let service = &state.news_service;
    let submitted = service.update(&ctx, id, &draft, picture).await?;
    let list = service.list(&ctx, &ListParams::default()).await?;

    Ok(Json(MutationResponse::submitted(submitted, list)))
}

async fn delete_news(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(id): Path<i64>,
) -> Result<Json<DeleteResponse<NewsPage>>, ApiError> {
    let service = &state.news_service;
    service.delete(&ctx, id).await?;
    let list = service.list(&ctx, &ListParams::default()).await?;

    Ok(Json(DeleteResponse { deleted: id, list }))
}

async fn record_view(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.news_service.record_view(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn draft_from_form(form: &SubmittedForm) -> NewsDraft {
    let copy = |language: Language| LocalizedCopy {
        heading: form.text(&format!("heading_{}", language.code())),
        tagline: form.text(&format!("tagline_{}", language.code())),
        content: form.text(&format!("content_{}", language.code())),
    };

    NewsDraft {
        en: copy(Language::En),
        hi: copy(Language::Hi),
        ur: copy(Language::Ur),
        author_id: form.text("author_id"),
        category_id: form.text("category_id"),
        tags: form.text("tags"),
        read_time: form.text("read_time"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_from_form_reads_every_language() {
        let mut form = SubmittedForm::default();
        for (key, value) in [
            ("heading_en", "Rain"),
            ("tagline_hi", "बारिश"),
            ("content_ur", "بارش"),
            ("author_id", "3"),
            ("tags", "weather"),
        ] {
            form.fields.insert(key.to_string(), value.to_string());
        }

        let draft = draft_from_form(&form);
        assert_eq!(draft.en.heading, "Rain");
        assert_eq!(draft.hi.tagline, "बारिश");
        assert_eq!(draft.ur.content, "بارش");
        assert_eq!(draft.author_id, "3");
        assert_eq!(draft.tags, "weather");
        assert_eq!(draft.read_time, "");
    }
}
