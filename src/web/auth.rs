use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::IntoResponse,
};
use secrecy::ExposeSecret;
use subtle::ConstantTimeEq;

use crate::{utils::state::AppState, web::error::ApiError};

pub const ADMIN_KEY_HEADER: &str = "x-colaberry-admin-key";

fn provided_key(headers: &HeaderMap) -> Option<&str> {
    let from_header = headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|value| value.to_str().ok());
    let from_bearer = || {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|auth| auth.strip_prefix("Bearer "))
    };
    from_header
        .or_else(from_bearer)
        .map(str::trim)
        .filter(|key| !key.is_empty())
}

/// Decided from the socket peer, never from client-supplied headers.
fn is_loopback_peer(request: &Request<Body>) -> bool {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .is_some_and(|ConnectInfo(addr)| addr.ip().is_loopback())
}

/// Admin gate for campaign routes.
///
/// Accepts the key in the admin header or as a bearer token. With
/// `admin.allow_localhost` set and outside production, loopback peers pass
/// without a key.
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<impl IntoResponse, ApiError> {
    let bypass = state.config.admin.allow_localhost && !state.config.server.is_production();
    if bypass && is_loopback_peer(&request) {
        return Ok(next.run(request).await);
    }

    let Some(expected) = state
        .config
        .admin
        .api_key
        .as_ref()
        .map(|key| key.expose_secret().trim())
        .filter(|key| !key.is_empty())
    else {
        tracing::warn!("admin route requested but no admin key is configured");
        return Err(ApiError::Unauthorized);
    };

    let provided = provided_key(request.headers()).ok_or(ApiError::Unauthorized)?;
    if provided.len() != expected.len()
        || !bool::from(provided.as_bytes().ct_eq(expected.as_bytes()))
    {
        tracing::warn!("rejected admin request with a wrong key");
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(request).await)
}
