use axum::{
    http::header,
    response::{Html, IntoResponse},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::middleware_layer::nonce::CspNonce;

#[derive(Serialize)]
pub struct Status {
    pub status: &'static str,
    pub time: DateTime<Utc>,
}

/// Liveness check behind the resource token.
pub async fn status() -> Json<Status> {
    Json(Status {
        status: "ok",
        time: Utc::now(),
    })
}

/// Minimal document whose inline script is allowed by the request's nonce.
pub async fn index(Extension(CspNonce(nonce)): Extension<CspNonce>) -> impl IntoResponse {
    let csp = format!("script-src 'nonce-{}'", nonce);
    let body = format!(
        "<!doctype html><html><head><title>Magic 89.9</title></head>\
         <body><script nonce=\"{}\">window.__nonce = true;</script></body></html>",
        nonce
    );
    ([(header::CONTENT_SECURITY_POLICY, csp)], Html(body))
}
