//! Upload API endpoints
//!
//! POST /api/v1/upload/image?kind=news
//!
//! Stores a standalone image for the panel's editors. Nothing stored here is
//! ever removed by this endpoint; old pictures are retired only by the author
//! and news update flows that stop referencing them.

use axum::{
    extract::{Multipart, Query, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::SubmittedForm;
use crate::api::middleware::{ApiError, AppState};
use crate::services::{ActionError, ImageKind, SessionContext};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UploadQuery {
    pub kind: String,
}

/// Response for a stored image
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub url: String,
    pub path: String,
    pub size: u64,
    pub content_type: String,
}

/// Build the upload router
pub fn router() -> Router<AppState> {
    Router::new().route("/image", post(upload_image))
}

async fn upload_image(
    State(state): State<AppState>,
    ctx: SessionContext,
    Query(query): Query<UploadQuery>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    ctx.require()?;

    let kind: ImageKind = query.kind.parse().map_err(ActionError::from)?;

    let mut form = SubmittedForm::read(multipart).await?;
    let file = form
        .take_file()
        .ok_or_else(|| ApiError::validation_error("No file provided"))?;

    let stored = state
        .uploader
        .store(&file, kind)
        .await
        .map_err(ActionError::from)?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            url: stored.url,
            path: stored.path,
            size: file.size() as u64,
            content_type: file.content_type,
        }),
    ))
}
