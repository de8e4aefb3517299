//! Dashboard API endpoint
//!
//! GET /api/v1/dashboard/stats

use axum::{extract::State, routing::get, Json, Router};

use crate::api::middleware::{ApiError, AppState};
use crate::models::DashboardStats;
use crate::services::SessionContext;

pub fn router() -> Router<AppState> {
    Router::new().route("/stats", get(dashboard_stats))
}

async fn dashboard_stats(
    State(state): State<AppState>,
    ctx: SessionContext,
) -> Result<Json<DashboardStats>, ApiError> {
    Ok(Json(state.stats_service.dashboard(&ctx).await?))
}
