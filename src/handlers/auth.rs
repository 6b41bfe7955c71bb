use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Serialize;
use tower_cookies::Cookies;

use crate::{
    cookies,
    error::{AppError, Result},
    models::{session::AuthContext, user::Profile},
    services::auth::PresentedBinds,
    state::AppState,
    tokens::bind::BindKind,
    validation::auth::{validate_login, LoginRequest},
};

/// The response payload for authentication-related requests.
#[derive(Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Profile>,
}

fn presented_binds(cookies: &Cookies) -> PresentedBinds {
    PresentedBinds {
        csrf: cookies::value(cookies, BindKind::Csrf.cookie_name()),
        rsp: cookies::value(cookies, BindKind::Rsp.cookie_name()),
    }
}

/// Handles user login.
#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<LoginRequest>,
) -> Result<Response> {
    tracing::info!("🔐 Login attempt");
    validate_login(&payload)?;

    let outcome = state.auth.login(&payload.email, &payload.password).await?;

    cookies::set_session(&cookies, outcome.session_id);
    cookies::set_access(&cookies, outcome.access_token);
    cookies::set_refresh(&cookies, outcome.refresh_token);
    cookies::set_bind_pair(&cookies, outcome.bind);

    let response = AuthResponse {
        success: true,
        message: "Login successful".to_string(),
        user: Some(outcome.profile),
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Handles user logout. Succeeds without a session.
#[axum::debug_handler]
pub async fn logout(State(state): State<AppState>, cookies: Cookies) -> Result<Response> {
    let session_id = cookies::value(&cookies, cookies::SESSION_COOKIE);
    state
        .auth
        .logout(session_id.as_deref(), &presented_binds(&cookies))
        .await?;

    cookies::clear_session(&cookies);
    tracing::info!("👋 Logout completed");

    let response = AuthResponse {
        success: true,
        message: "Logout successful".to_string(),
        user: None,
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Issues a new access token and bind pair from the refresh cookie.
#[axum::debug_handler]
pub async fn refresh(State(state): State<AppState>, cookies: Cookies) -> Result<Response> {
    let (Some(refresh_token), Some(session_id)) = (
        cookies::value(&cookies, cookies::REFRESH_COOKIE),
        cookies::value(&cookies, cookies::SESSION_COOKIE),
    ) else {
        return Err(AppError::Unauthorized("missing refresh token".to_string()));
    };

    let outcome = state
        .auth
        .refresh(&refresh_token, &session_id, &presented_binds(&cookies))
        .await?;

    cookies::set_access(&cookies, outcome.access_token);
    cookies::set_bind_pair(&cookies, outcome.bind);

    let response = AuthResponse {
        success: true,
        message: "Token refreshed".to_string(),
        user: None,
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Returns the authenticated user's profile.
#[axum::debug_handler]
pub async fn profile(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<Profile>> {
    Ok(Json(state.auth.profile(ctx.user_id).await?))
}

#[derive(Serialize)]
pub struct SessionInfo {
    pub user_id: uuid::Uuid,
    pub role: String,
}

/// Role-restricted view of the caller's identity.
pub async fn admin_session(Extension(ctx): Extension<AuthContext>) -> Json<SessionInfo> {
    Json(SessionInfo {
        user_id: ctx.user_id,
        role: ctx.role,
    })
}
