//! Administrative session handlers
//!
//! Mounted behind the `admin` role gate.

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::handlers::ApiResponse;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

/// Number of sessions affected by an administrative action
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionCount {
    pub count: u64,
}

/// Revoke every session of another user
#[utoipa::path(
    post,
    path = "/admin/users/{id}/logout-all",
    tag = "admin",
    params(
        ("id" = Uuid, Path, description = "User whose sessions are revoked")
    ),
    responses(
        (status = 200, description = "Sessions revoked", body = SessionCount),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
        (status = 403, description = "Caller is not an admin", body = crate::error::ErrorResponse),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn revoke_user_sessions_handler(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AuthenticatedUser>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let count = state.auth.logout_all(user_id, Some(admin.user_id)).await?;

    Ok(ApiResponse::data(SessionCount { count }))
}

/// Delete expired sessions now
#[utoipa::path(
    post,
    path = "/admin/sessions/sweep",
    tag = "admin",
    responses(
        (status = 200, description = "Expired sessions deleted", body = SessionCount),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
        (status = 403, description = "Caller is not an admin", body = crate::error::ErrorResponse),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn sweep_sessions_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let count = state.auth.sweep_expired().await?;

    Ok(ApiResponse::data(SessionCount { count }))
}
