//! Authentication API endpoints
//!
//! - POST /api/v1/auth/send-code - Mail a sign-in code
//! - POST /api/v1/auth/verify - Exchange the code for a session
//! - POST /api/v1/auth/logout - End the session
//! - GET /api/v1/auth/me - Current identity
//!
//! Send-code and verify are throttled per client IP when a proxy forwards one.

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::api::middleware::{ApiError, AppState};
use crate::api::responses::SuccessResponse;
use crate::models::Identity;
use crate::services::rate_limiter::IP_RETRY_AFTER_SECS;
use crate::services::{ActionError, SessionContext};

/// Cookie that clears the session
const CLEAR_SESSION_COOKIE: &str = "session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0";

#[derive(Debug, Deserialize)]
pub struct SendCodeRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub email: String,
    pub code: String,
}

/// Response for a successful sign-in
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub identity: IdentityResponse,
    pub token: String,
    pub expires_at: String,
}

#[derive(Debug, Serialize)]
pub struct IdentityResponse {
    pub id: i64,
    pub email: String,
    pub role: String,
    pub created_at: String,
}

impl From<Identity> for IdentityResponse {
    fn from(identity: Identity) -> Self {
        Self {
            id: identity.id,
            email: identity.email,
            role: identity.role.to_string(),
            created_at: identity.created_at.to_rfc3339(),
        }
    }
}

/// Build the auth router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/send-code", post(send_code))
        .route("/verify", post(verify))
        .route("/logout", post(logout))
        .route("/me", get(me))
}

/// POST /api/v1/auth/send-code
async fn send_code(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SendCodeRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    throttle(&state, &headers).await?;

    state
        .identity_service
        .sign_in_with_one_time_code(&body.email)
        .await
        .map_err(ActionError::from)?;

    Ok(Json(SuccessResponse::ok()))
}

/// POST /api/v1/auth/verify
///
/// Sets the session cookie and also returns the token for API clients.
async fn verify(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<VerifyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    throttle(&state, &headers).await?;

    let signed_in = state
        .identity_service
        .verify_code(&body.email, &body.code)
        .await
        .map_err(|e| ApiError::from(ActionError::from(e)))?;

    let cookie = format!(
        "session={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        signed_in.session.id,
        signed_in.session.remaining().num_seconds()
    );

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie)
            .map_err(|e| ApiError::internal_error(format!("Invalid session cookie: {}", e)))?,
    );

    Ok((
        response_headers,
        Json(AuthResponse {
            identity: signed_in.identity.into(),
            token: signed_in.session.id,
            expires_at: signed_in.session.expires_at.to_rfc3339(),
        }),
    ))
}

/// POST /api/v1/auth/logout
async fn logout(
    State(state): State<AppState>,
    mut ctx: SessionContext,
) -> Result<impl IntoResponse, ApiError> {
    ctx.require()?;

    state
        .identity_service
        .sign_out(&mut ctx)
        .await
        .map_err(ActionError::from)?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::SET_COOKIE, HeaderValue::from_static(CLEAR_SESSION_COOKIE));

    Ok((StatusCode::NO_CONTENT, response_headers))
}

/// GET /api/v1/auth/me
async fn me(ctx: SessionContext) -> Result<Json<IdentityResponse>, ApiError> {
    let identity = ctx.require()?;
    Ok(Json(identity.clone().into()))
}

/// Reject the request once its client IP is over the per-minute limit
async fn throttle(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(ip) = client_ip(headers) else {
        return Ok(());
    };

    if state.identity_service.limiter().allow_request(ip).await {
        return Ok(());
    }
    tracing::warn!(ip = %ip, "Sign-in requests throttled");
    Err(ActionError::RateLimited { retry_after: IP_RETRY_AFTER_SECS }.into())
}

/// Client IP from the proxy headers
fn client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    // X-Forwarded-For lists the original client first
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(ip) = forwarded.split(',').next().and_then(|ip| ip.trim().parse().ok()) {
            return Some(ip);
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|ip| ip.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, HeaderValue::from_static(value));
        }
        headers
    }

    #[test]
    fn test_client_ip() {
        let forwarded = headers(&[("x-forwarded-for", "203.0.113.7, 10.0.0.1"), ("x-real-ip", "10.0.0.2")]);
        assert_eq!(client_ip(&forwarded), Some("203.0.113.7".parse().unwrap()));

        let real = headers(&[("x-real-ip", " 2001:db8::1 ")]);
        assert_eq!(client_ip(&real), Some("2001:db8::1".parse().unwrap()));

        let garbage = headers(&[("x-forwarded-for", "unknown"), ("x-real-ip", "10.0.0.2")]);
        assert_eq!(client_ip(&garbage), Some("10.0.0.2".parse().unwrap()));

        assert_eq!(client_ip(&HeaderMap::new()), None);
    }
}
