//! Identity management (admin only)
//!
//! - GET /api/v1/admin/identities
//! - POST /api/v1/admin/identities

use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::auth::IdentityResponse;
use crate::api::middleware::{ApiError, AppState};
use crate::models::Role;
use crate::services::SessionContext;

#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    pub email: String,
    #[serde(default)]
    pub role: Role,
}

/// Build the admin router
pub fn router() -> Router<AppState> {
    Router::new().route("/identities", get(list_identities).post(invite))
}

async fn list_identities(
    State(state): State<AppState>,
    ctx: SessionContext,
) -> Result<Json<Vec<IdentityResponse>>, ApiError> {
    let identities = state.identity_service.list_identities(&ctx).await?;
    Ok(Json(identities.into_iter().map(Into::into).collect()))
}

async fn invite(
    State(state): State<AppState>,
    ctx: SessionContext,
    Json(body): Json<InviteRequest>,
) -> Result<(StatusCode, Json<IdentityResponse>), ApiError> {
    let identity = state.identity_service.invite(&ctx, &body.email, body.role).await?;
    Ok((StatusCode::CREATED, Json(identity.into())))
}
