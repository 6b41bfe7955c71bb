use axum::{Extension, Json};
use serde::Serialize;
use uuid::Uuid;

use crate::models::session::AuthContext;

#[derive(Serialize)]
pub struct BoundResponse {
    pub success: bool,
    pub user_id: Uuid,
    pub role: String,
}

/// State-changing call behind `bind_csrf`.
pub async fn touch(Extension(ctx): Extension<AuthContext>) -> Json<BoundResponse> {
    tracing::debug!("✅ Session {} touched", ctx.user_id);
    Json(BoundResponse {
        success: true,
        user_id: ctx.user_id,
        role: ctx.role,
    })
}

/// Read behind `bind_rsp`.
pub async fn resource(Extension(ctx): Extension<AuthContext>) -> Json<BoundResponse> {
    Json(BoundResponse {
        success: true,
        user_id: ctx.user_id,
        role: ctx.role,
    })
}
