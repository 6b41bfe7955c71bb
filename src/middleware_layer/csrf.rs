use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use subtle::ConstantTimeEq;
use tower_cookies::Cookies;

use crate::{
    cookies,
    crypto::sealed::SealedKind,
    error::AppError,
    ratelimit::ClientIp,
    state::AppState,
};

/// Compares the sealed cookie of `kind` with its echo header, then opens it
/// for `client_ip`.
pub(crate) fn check_sealed(
    state: &AppState,
    kind: SealedKind,
    cookies: &Cookies,
    headers: &HeaderMap,
    client_ip: ClientIp,
) -> Result<(), AppError> {
    let cookie = cookies::value(cookies, kind.cookie_name());
    let header = headers
        .get(kind.header_name())
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty());

    let (Some(cookie), Some(header)) = (cookie, header) else {
        return Err(AppError::Forbidden(format!("Missing {} token", kind.cookie_name())));
    };

    if !bool::from(cookie.as_bytes().ct_eq(header.as_bytes())) {
        return Err(AppError::Forbidden(format!("{} token mismatch", kind.cookie_name())));
    }

    state
        .codec
        .open_kind(kind, &cookie, &client_ip.to_string(), Utc::now())?;
    Ok(())
}

/// A middleware that verifies the sealed CSRF token on state-changing requests.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `client_ip` - The resolved client address.
/// * `cookies` - The request cookies.
/// * `req` - The incoming request.
/// * `next` - The next middleware in the chain.
///
/// # Returns
///
/// A `Response`.
pub async fn verify_csrf(
    State(state): State<AppState>,
    client_ip: ClientIp,
    cookies: Cookies,
    req: Request<Body>,
    next: Next,
) -> Response {
    let method = req.method();
    if method != Method::POST
        && method != Method::PUT
        && method != Method::PATCH
        && method != Method::DELETE
    {
        return next.run(req).await;
    }

    match check_sealed(&state, SealedKind::Csrf, &cookies, req.headers(), client_ip) {
        Ok(()) => {
            tracing::debug!("✅ CSRF token valid");
            next.run(req).await
        }
        Err(e) => {
            tracing::warn!("❌ CSRF: {}", e);
            e.into_response()
        }
    }
}
