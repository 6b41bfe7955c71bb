use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{
    error::AppError,
    ratelimit::Verdict,
    state::AppState,
};

/// A middleware that lets anonymous fingerprints through once per window.
///
/// Trusted front ends skip the check. Rejections are logged with every
/// fingerprint input; the client only sees the retry hint.
pub async fn adaptive_rate_limit(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(ConnectInfo(peer)) = req.extensions().get::<ConnectInfo<SocketAddr>>().copied() else {
        tracing::error!("❌ Rate limit: peer address unavailable");
        return AppError::Internal("peer address unavailable".to_string()).into_response();
    };
    let client_ip = state.ip_resolver.resolve(peer.ip(), req.headers());

    let verdict = state.rate_limiter.evaluate(
        client_ip,
        req.method(),
        req.uri().path(),
        req.headers(),
        Instant::now(),
    );

    match verdict {
        Verdict::Trusted => next.run(req).await,
        Verdict::Allowed { key } => {
            tracing::info!(
                ip = %client_ip,
                path = %req.uri().path(),
                fingerprint = %key,
                "✅ Untrusted first request allowed"
            );
            next.run(req).await
        }
        Verdict::Blocked {
            retry_after_secs,
            inputs,
        } => {
            tracing::warn!(
                ip = %inputs.client_ip,
                user_agent = %inputs.user_agent,
                accept_language = %inputs.accept_language,
                client_hint = %inputs.client_hint,
                origin = %inputs.origin,
                referer = %inputs.referer,
                device_id = %inputs.device_id,
                app_bundle = %inputs.app_bundle,
                path = %inputs.path,
                method = %inputs.method,
                retry_after = retry_after_secs,
                "❌ Rate limit: fingerprint blocked"
            );
            AppError::RateLimited { retry_after_secs }.into_response()
        }
    }
}
