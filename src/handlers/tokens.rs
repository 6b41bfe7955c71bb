use std::collections::BTreeMap;

use axum::{
    extract::State,
    http::{HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use tower_cookies::Cookies;

use crate::{
    cookies,
    crypto::sealed::SealedKind,
    error::{AppError, Result},
    ratelimit::ClientIp,
    state::AppState,
};

/// `{"_csrf": "...", "reuse": true}` or `{"_csrf": "...", "new": true}`.
#[derive(Serialize)]
pub struct IssuedToken {
    #[serde(flatten)]
    token: BTreeMap<&'static str, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reuse: Option<bool>,
    #[serde(rename = "new", skip_serializing_if = "Option::is_none")]
    fresh: Option<bool>,
}

/// Returns the caller's sealed token of `kind` when it still opens for them,
/// otherwise mints a replacement and sets it as the cookie.
fn issue_or_reuse(
    state: &AppState,
    cookies: &Cookies,
    kind: SealedKind,
    client_ip: ClientIp,
) -> Result<IssuedToken> {
    let ip = client_ip.to_string();
    let now = Utc::now();

    if let Some(existing) = cookies::value(cookies, kind.cookie_name()) {
        if state.codec.open_kind(kind, &existing, &ip, now).is_ok() {
            return Ok(IssuedToken {
                token: BTreeMap::from([(kind.cookie_name(), existing)]),
                reuse: Some(true),
                fresh: None,
            });
        }
        tracing::debug!("🔐 Stale {} cookie replaced", kind.cookie_name());
    }

    let token = state.codec.seal(&ip, now)?;
    cookies::set_sealed(cookies, kind, token.clone());

    Ok(IssuedToken {
        token: BTreeMap::from([(kind.cookie_name(), token)]),
        reuse: None,
        fresh: Some(true),
    })
}

pub async fn issue_csrf(
    State(state): State<AppState>,
    client_ip: ClientIp,
    cookies: Cookies,
) -> Result<Json<IssuedToken>> {
    Ok(Json(issue_or_reuse(&state, &cookies, SealedKind::Csrf, client_ip)?))
}

pub async fn issue_rsp(
    State(state): State<AppState>,
    client_ip: ClientIp,
    cookies: Cookies,
) -> Result<Json<IssuedToken>> {
    Ok(Json(issue_or_reuse(&state, &cookies, SealedKind::Rsp, client_ip)?))
}

pub async fn issue_nonce(
    State(state): State<AppState>,
    client_ip: ClientIp,
    cookies: Cookies,
) -> Result<Json<IssuedToken>> {
    Ok(Json(issue_or_reuse(&state, &cookies, SealedKind::Nonce, client_ip)?))
}

/// Replaces the resource token unconditionally and returns it in `X-RSP-Token`.
pub async fn rotate_rsp(
    State(state): State<AppState>,
    client_ip: ClientIp,
    cookies: Cookies,
) -> Result<Response> {
    let token = state.codec.seal(&client_ip.to_string(), Utc::now())?;
    cookies::set_sealed(&cookies, SealedKind::Rsp, token.clone());

    let value = HeaderValue::from_str(&token)
        .map_err(|e| AppError::Internal(format!("Token is not a header value: {}", e)))?;
    let mut response = "RSP Rotated".into_response();
    response
        .headers_mut()
        .insert(HeaderName::from_static(SealedKind::Rsp.header_name()), value);
    Ok(response)
}
