use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

use crate::{
    crypto::random,
    error::{AppError, Result},
    repositories::csrf::CSRF_TOKEN_TTL,
    state::AppState,
};

const CSRF_HEADER: &str = "x-csrf-token";

/// Stores a fresh single-request CSRF token and returns it in `X-CSRF-Token`.
pub async fn issue_csrf_token(State(state): State<AppState>) -> Result<Response> {
    let token = random::generate_csrf_token();
    state.csrf_store.store(&token, CSRF_TOKEN_TTL).await?;

    let value = HeaderValue::from_str(&token)
        .map_err(|e| AppError::Internal(format!("Token is not a header value: {}", e)))?;
    let mut response = StatusCode::NO_CONTENT.into_response();
    response.headers_mut().insert(CSRF_HEADER, value);
    Ok(response)
}

/// Accepts the request only if its `X-CSRF-Token` was issued and not yet used.
pub async fn post(State(state): State<AppState>, headers: HeaderMap) -> Result<StatusCode> {
    let token = headers
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Forbidden("Missing CSRF token".to_string()))?;

    if !state.csrf_store.consume(token).await? {
        tracing::warn!("❌ Single-use CSRF token unknown, expired or reused");
        return Err(AppError::Forbidden("CSRF token expired or invalid".to_string()));
    }

    Ok(StatusCode::OK)
}
