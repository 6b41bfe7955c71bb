use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_cookies::Cookies;

use crate::{
    cookies,
    error::AppError,
    models::session::AuthContext,
    state::AppState,
};

/// A middleware that requires a live session and a matching access token.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `cookies` - The request cookies.
/// * `request` - The incoming request.
/// * `next` - The next middleware in the chain.
///
/// # Returns
///
/// A `Response`; the handler sees an [`AuthContext`] extension.
pub async fn require_access(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    tracing::debug!("🔐 Checking authentication...");

    let (Some(session_id), Some(access)) = (
        cookies::value(&cookies, cookies::SESSION_COOKIE),
        cookies::value(&cookies, cookies::ACCESS_COOKIE),
    ) else {
        tracing::warn!("❌ No session cookies found");
        return AppError::Unauthorized("missing session".to_string()).into_response();
    };

    match state.auth.authenticate_access(&session_id, &access).await {
        Ok(ctx) => {
            tracing::debug!("✅ Authenticated user {}", ctx.user_id);
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Roles a route accepts, compared case-insensitively.
#[derive(Clone, Copy, Debug)]
pub struct AllowedRoles(pub &'static [&'static str]);

/// A middleware that admits only callers whose role is allowed. Must run
/// inside [`require_access`].
pub async fn require_role(
    State(allowed): State<AllowedRoles>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(ctx) = request.extensions().get::<AuthContext>() else {
        return AppError::Unauthorized("Missing user role".to_string()).into_response();
    };

    if allowed.0.iter().any(|role| role.eq_ignore_ascii_case(&ctx.role)) {
        next.run(request).await
    } else {
        tracing::warn!("❌ Role {} denied", ctx.role);
        AppError::Forbidden("Access denied".to_string()).into_response()
    }
}
