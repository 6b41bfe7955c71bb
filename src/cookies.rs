//! Cookie builders. Every cookie is `Secure` and `HttpOnly`.

use tower_cookies::cookie::time::Duration;
use tower_cookies::cookie::SameSite;
use tower_cookies::{Cookie, Cookies};

use crate::crypto::sealed::SealedKind;
use crate::tokens::bind::{BindKind, BindPair, BIND_TOKEN_TTL};

pub const SESSION_COOKIE: &str = "session_id";
pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";

/// Creates a secure cookie on `path`. `max_age` of `None` makes it a browser-session cookie.
fn secure_cookie(
    name: &'static str,
    value: String,
    path: &'static str,
    same_site: SameSite,
    max_age: Option<Duration>,
) -> Cookie<'static> {
    let mut cookie = Cookie::build((name, value))
        .path(path)
        .secure(true)
        .http_only(true)
        .same_site(same_site)
        .build();
    if let Some(max_age) = max_age {
        cookie.set_max_age(max_age);
    }
    cookie
}

/// Removal cookie for `name` on `path`.
fn removal(name: &'static str, path: &'static str) -> Cookie<'static> {
    Cookie::build((name, "")).path(path).build()
}

pub fn set_session(cookies: &Cookies, session_id: String) {
    cookies.add(secure_cookie(SESSION_COOKIE, session_id, "/", SameSite::Lax, None));
}

pub fn set_access(cookies: &Cookies, sealed_access: String) {
    cookies.add(secure_cookie(ACCESS_COOKIE, sealed_access, "/", SameSite::Lax, None));
}

pub fn set_refresh(cookies: &Cookies, refresh: String) {
    cookies.add(secure_cookie(
        REFRESH_COOKIE,
        refresh,
        "/",
        SameSite::Lax,
        Some(Duration::days(7)),
    ));
}

/// Sets both bind cookies, each scoped to its own path.
pub fn set_bind_pair(cookies: &Cookies, pair: BindPair) {
    for (kind, value) in [(BindKind::Csrf, pair.csrf), (BindKind::Rsp, pair.rsp)] {
        cookies.add(secure_cookie(
            kind.cookie_name(),
            value,
            kind.cookie_path(),
            SameSite::Strict,
            Some(Duration::seconds(BIND_TOKEN_TTL.num_seconds())),
        ));
    }
}

/// Replaces the sealed cookie of `kind` with `token`, `Max-Age` matching its TTL.
pub fn set_sealed(cookies: &Cookies, kind: SealedKind, token: String) {
    cookies.remove(removal(kind.cookie_name(), "/"));
    cookies.add(secure_cookie(
        kind.cookie_name(),
        token,
        "/",
        SameSite::Lax,
        Some(Duration::seconds(kind.ttl().num_seconds())),
    ));
}

/// Clears every session cookie, bind cookies included.
pub fn clear_session(cookies: &Cookies) {
    for name in [SESSION_COOKIE, ACCESS_COOKIE, REFRESH_COOKIE] {
        cookies.remove(removal(name, "/"));
    }
    for kind in [BindKind::Csrf, BindKind::Rsp] {
        cookies.remove(removal(kind.cookie_name(), kind.cookie_path()));
    }
}

pub fn value(cookies: &Cookies, name: &str) -> Option<String> {
    cookies
        .get(name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}
