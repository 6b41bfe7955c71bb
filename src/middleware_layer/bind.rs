use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_cookies::Cookies;

use crate::{
    cookies,
    error::{AppError, Result},
    models::session::AuthContext,
    state::AppState,
    tokens::bind::BindKind,
};

/// Validates the bind token of `kind`, which revokes it, then hands the client
/// a fresh pair before the handler runs.
async fn validate_and_rotate(
    state: &AppState,
    cookies: &Cookies,
    kind: BindKind,
) -> Result<AuthContext> {
    let session_id = cookies::value(cookies, cookies::SESSION_COOKIE)
        .ok_or_else(|| AppError::Unauthorized("missing session_id".to_string()))?;
    let token = cookies::value(cookies, kind.cookie_name()).unwrap_or_default();

    state.bind.validate(&token, &session_id, kind)?;

    let session = state.auth.session(&session_id).await?;

    let pair = state.bind.issue_pair(&session_id)?;
    cookies::set_bind_pair(cookies, pair);

    Ok(AuthContext {
        user_id: session.user_id,
        session_id: session.session_id,
        role: session.role,
    })
}

async fn bind_guard(
    state: AppState,
    cookies: Cookies,
    kind: BindKind,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    match validate_and_rotate(&state, &cookies, kind).await {
        Ok(ctx) => {
            req.extensions_mut().insert(ctx);
            next.run(req).await
        }
        Err(e) => {
            tracing::warn!("❌ {}: {}", kind.cookie_name(), e);
            e.into_response()
        }
    }
}

/// A middleware for `/csrf` routes: single-use `bind_csrf`, rotated pair.
pub async fn verify_bind_csrf(
    State(state): State<AppState>,
    cookies: Cookies,
    req: Request<Body>,
    next: Next,
) -> Response {
    bind_guard(state, cookies, BindKind::Csrf, req, next).await
}

/// A middleware for `/rsp` routes: single-use `bind_rsp`, rotated pair.
pub async fn verify_bind_rsp(
    State(state): State<AppState>,
    cookies: Cookies,
    req: Request<Body>,
    next: Next,
) -> Response {
    bind_guard(state, cookies, BindKind::Rsp, req, next).await
}
