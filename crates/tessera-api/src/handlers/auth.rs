//! Authentication API handlers
//!
//! Author: hephaex@gmail.com

use crate::audit::client_info;
use crate::auth::{
    AuthResponse, AuthenticatedUser, ChangePasswordRequest, LoginRequest, RefreshTokenRequest,
    RegisterRequest, TokenResponse,
};
use crate::error::AppError;
use crate::handlers::{ApiJson, ApiResponse};
use crate::state::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Extension,
};
use std::sync::Arc;

/// Register a new user account
///
/// Creates a user with role `user` and immediately opens a session for it.
#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered, tokens issued", body = AuthResponse),
        (status = 400, description = "Invalid input or email already in use", body = crate::error::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::error::ErrorResponse),
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = state.auth.register(request, client_info(&headers)).await?;

    Ok((
        StatusCode::CREATED,
        ApiResponse::data(response).with_message("Registration successful"),
    ))
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ErrorResponse),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = state.auth.login(request, client_info(&headers)).await?;

    Ok(ApiResponse::data(response))
}

/// Exchange a refresh token for a new token pair
///
/// The supplied refresh token is consumed.
#[utoipa::path(
    post,
    path = "/auth/refresh-token",
    tag = "auth",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "Token refreshed", body = TokenResponse),
        (status = 401, description = "Invalid, reused or expired refresh token", body = crate::error::ErrorResponse),
    )
)]
pub async fn refresh_token_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<RefreshTokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    let token = state.auth.refresh(&request.refresh_token).await?;

    Ok(ApiResponse::data(token))
}

/// Revoke one session
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "auth",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "Logged out"),
        (status = 400, description = "Missing refresh token", body = crate::error::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<RefreshTokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.auth.logout(&request.refresh_token).await?;

    Ok(ApiResponse::message("Logged out successfully"))
}

/// Revoke every session of the caller
#[utoipa::path(
    post,
    path = "/auth/logout-all",
    tag = "auth",
    responses(
        (status = 200, description = "All sessions revoked"),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn logout_all_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<impl IntoResponse, AppError> {
    state.auth.logout_all(user.user_id, None).await?;

    Ok(ApiResponse::message("Logged out from all devices"))
}

/// Change the caller's password
///
/// Revokes all of the caller's sessions on success.
#[utoipa::path(
    post,
    path = "/auth/change-password",
    tag = "auth",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed"),
        (status = 400, description = "Invalid input or wrong old password", body = crate::error::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn change_password_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiJson(request): ApiJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.auth.change_password(user.user_id, request).await?;

    Ok(ApiResponse::message("Password changed successfully"))
}

/// Identity attached to the current access token
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current caller"),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn me_handler(Extension(user): Extension<AuthenticatedUser>) -> impl IntoResponse {
    ApiResponse::data(user)
}
