use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use tower_cookies::CookieManagerLayer;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{
    error::{AppError, Result},
    handlers,
    middleware_layer::{
        auth::{require_access, require_role, AllowedRoles},
        bind::{verify_bind_csrf, verify_bind_rsp},
        csrf::verify_csrf,
        nonce::{csp_nonce, NONCE_HEADER},
        rate_limit::adaptive_rate_limit,
        resource::verify_resource,
        silent_errors::silence_auth_errors,
        uri_guard::block_suspicious_uri,
    },
    state::AppState,
};

const ADMIN_ONLY: AllowedRoles = AllowedRoles(&["admin"]);

/// Builds the full HTTP surface.
///
/// # Arguments
///
/// * `state` - The shared application state.
///
/// # Returns
///
/// A `Result` containing the router, ready to be served with connect info.
pub fn router(state: AppState) -> Result<Router> {
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(100)
            .use_headers()
            .finish()
            .ok_or_else(|| AppError::Internal("Invalid governor configuration".to_string()))?,
    );

    let auth_routes = Router::new()
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/auth/refresh", post(handlers::auth::refresh));

    let admin_routes = Router::new()
        .route("/api/admin/session", get(handlers::auth::admin_session))
        .route_layer(from_fn_with_state(ADMIN_ONLY, require_role));

    let authenticated_routes = Router::new()
        .route("/api/auth/profile", get(handlers::auth::profile))
        .merge(admin_routes)
        .layer(GovernorLayer::new(governor_conf))
        .route_layer(from_fn_with_state(state.clone(), require_access));

    let token_routes = Router::new()
        .route("/api/token/csrf", get(handlers::tokens::issue_csrf))
        .route("/api/token/rsp", get(handlers::tokens::issue_rsp))
        .route("/api/token/nonce", get(handlers::tokens::issue_nonce))
        .merge(
            Router::new()
                .route("/api/token/rsp/rotate", post(handlers::tokens::rotate_rsp))
                .route_layer(from_fn_with_state(state.clone(), verify_csrf)),
        );

    let single_use_routes = Router::new()
        .route(
            "/api/test/csrf-token",
            get(handlers::single_use::issue_csrf_token),
        )
        .route("/api/test/post", post(handlers::single_use::post));

    let resource_routes = Router::new()
        .route("/api/v1/status", get(handlers::status::status))
        .route_layer(from_fn_with_state(state.clone(), verify_csrf))
        .route_layer(from_fn_with_state(state.clone(), verify_resource));

    let api_routes = Router::new()
        .merge(auth_routes)
        .merge(authenticated_routes)
        .merge(token_routes)
        .merge(single_use_routes)
        .merge(resource_routes)
        .route_layer(from_fn_with_state(state.clone(), adaptive_rate_limit));

    let bound_routes = Router::new()
        .merge(
            Router::new()
                .route("/csrf/session/touch", post(handlers::session::touch))
                .route_layer(from_fn_with_state(state.clone(), verify_bind_csrf)),
        )
        .merge(
            Router::new()
                .route("/rsp/session/resource", get(handlers::session::resource))
                .route_layer(from_fn_with_state(state.clone(), verify_bind_rsp)),
        );

    let mut app = Router::new()
        .route("/", get(handlers::status::index))
        .merge(api_routes)
        .merge(bound_routes)
        .layer(from_fn_with_state(state.clone(), block_suspicious_uri))
        .with_state(state.clone());

    if state.config.is_production() {
        app = app.layer(from_fn(silence_auth_errors));
    }

    Ok(app
        .layer(from_fn(csp_nonce))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false))
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(CookieManagerLayer::new())
        .layer(cors(&state.config.cors_origins)))
}

fn cors(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("⚠️  Ignoring invalid CORS origin {}", origin);
                None
            }
        })
        .collect();

    let exposed = [
        HeaderName::from_static("x-csrf-token"),
        HeaderName::from_static("x-rsp-token"),
        HeaderName::from_static(NONCE_HEADER),
        header::RETRY_AFTER,
    ];

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::COOKIE,
            HeaderName::from_static("x-csrf-token"),
            HeaderName::from_static("x-rsp-token"),
            HeaderName::from_static("x-device-id"),
            HeaderName::from_static("x-app-bundle"),
        ])
        .allow_credentials(true)
        .expose_headers(exposed)
        .max_age(Duration::from_secs(86400))
}
