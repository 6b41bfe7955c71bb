use axum::{
    body::Body,
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

/// A middleware for production: 401 and 403 responses lose their reason.
///
/// Headers such as `Set-Cookie` survive; only the body is replaced.
pub async fn silence_auth_errors(req: Request<Body>, next: Next) -> Response {
    let response = next.run(req).await;
    let generic = match response.status() {
        StatusCode::UNAUTHORIZED => r#"{"error":"Unauthorized"}"#,
        StatusCode::FORBIDDEN => r#"{"error":"Forbidden"}"#,
        _ => return response,
    };

    let (mut parts, _) = response.into_parts();
    parts.headers.remove(header::CONTENT_LENGTH);
    parts
        .headers
        .insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));
    Response::from_parts(parts, Body::from(generic)).into_response()
}
