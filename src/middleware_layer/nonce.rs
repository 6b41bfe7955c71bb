use axum::{
    body::Body,
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};

use crate::crypto::random;

pub const NONCE_HEADER: &str = "x-nonce";

/// The per-response CSP nonce, available to handlers as an extension.
#[derive(Clone, Debug)]
pub struct CspNonce(pub String);

/// A middleware that attaches a fresh CSP nonce to every request and response.
pub async fn csp_nonce(mut req: Request<Body>, next: Next) -> Response {
    let nonce = random::generate_nonce();
    req.extensions_mut().insert(CspNonce(nonce.clone()));

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&nonce) {
        response.headers_mut().insert(NONCE_HEADER, value);
    }
    response
}
