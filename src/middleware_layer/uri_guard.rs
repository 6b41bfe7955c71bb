use axum::{
    body::Body,
    extract::{Request, State},
    http::Uri,
    middleware::Next,
    response::{IntoResponse, Response},
};
use regex::RegexSet;

use crate::{error::AppError, state::AppState};

/// Script fragments that have no business in a request target.
const SUSPICIOUS_PATTERNS: &[&str] = &[
    r"(?i)\bdocument\.cookie\b",
    r"(?i)\bwindow\.location\b",
    r"(?i)\bfetch\(",
    r"(?i)\bXMLHttpRequest\b",
];

/// Rejects request URIs carrying cookie-theft or script-injection fragments.
pub struct UriGuard {
    patterns: RegexSet,
}

impl UriGuard {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            patterns: RegexSet::new(SUSPICIOUS_PATTERNS)?,
        })
    }

    /// Checks the raw path and query, then the percent-decoded query values.
    pub fn is_suspicious(&self, uri: &Uri) -> bool {
        let raw = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        if self.patterns.is_match(raw) {
            return true;
        }

        uri.query().is_some_and(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .any(|(key, value)| self.patterns.is_match(&key) || self.patterns.is_match(&value))
        })
    }
}

/// A middleware that answers 403 to suspicious request URIs before any other work.
pub async fn block_suspicious_uri(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if state.uri_guard.is_suspicious(req.uri()) {
        tracing::warn!(path = %req.uri().path(), "🚨 Suspicious request URI blocked");
        return AppError::Forbidden("Suspicious request URI".to_string()).into_response();
    }
    next.run(req).await
}
