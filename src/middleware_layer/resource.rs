use axum::{
    body::Body,
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_cookies::Cookies;

use crate::{
    crypto::sealed::SealedKind,
    middleware_layer::csrf::check_sealed,
    ratelimit::ClientIp,
    state::AppState,
};

/// A middleware that requires a valid resource token on reads. Mounted only
/// on resource groups, never on the token issuance routes.
pub async fn verify_resource(
    State(state): State<AppState>,
    client_ip: ClientIp,
    cookies: Cookies,
    req: Request<Body>,
    next: Next,
) -> Response {
    if req.method() != Method::GET {
        return next.run(req).await;
    }

    match check_sealed(&state, SealedKind::Rsp, &cookies, req.headers(), client_ip) {
        Ok(()) => next.run(req).await,
        Err(e) => {
            tracing::warn!("❌ RSP: {}", e);
            e.into_response()
        }
    }
}
