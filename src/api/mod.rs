//! API layer - HTTP handlers and routing
//!
//! All endpoints live under `/api/v1`:
//! - Auth (one-time code sign-in, logout, current identity)
//! - Admin identity management
//! - Authors, categories and news items
//! - Standalone image upload
//! - Dashboard totals
//!
//! Stored images are served under `/media`.

pub mod admin;
pub mod auth;
pub mod authors;
pub mod categories;
pub mod common;
pub mod dashboard;
pub mod middleware;
pub mod news;
pub mod responses;
pub mod upload;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub use middleware::{ApiError, AppState};

/// Build the main API router
///
/// Every route runs behind the session middleware. Handlers that need a
/// signed-in identity check the extracted [`crate::services::SessionContext`]
/// themselves, so an anonymous request reaches them and gets a 401.
pub fn build_api_router(state: AppState) -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/admin", admin::router())
        .nest("/authors", authors::router())
        .nest("/categories", categories::router())
        .nest("/news", news::router().merge(news::public_router()))
        .nest("/upload", upload::router())
        .nest("/dashboard", dashboard::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::resolve_session,
        ))
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    let router = Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .nest_service("/media", ServeDir::new(&state.media_root));

    // Cookie auth needs an explicit origin; without a valid one CORS stays off
    let router = match cors_origin.parse::<HeaderValue>() {
        Ok(origin) => router.layer(
            CorsLayer::new()
                .allow_origin(origin)
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
                .allow_credentials(true),
        ),
        Err(e) => {
            tracing::warn!("Invalid CORS origin {:?}, CORS disabled: {}", cors_origin, e);
            router
        }
    };

    router
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
