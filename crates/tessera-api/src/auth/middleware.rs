/// Access guard and role gate
///
/// `auth_middleware` extracts the bearer token from the Authorization header,
/// validates it through the auth service and adds `AuthenticatedUser` to the
/// request extensions. `require_role` composes on top of it and refuses
/// callers whose role does not satisfy the required one.
use super::jwt::AccessClaims;
use crate::audit::{audit_log, client_info, AuditEvent};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tessera_core::Role;
use uuid::Uuid;

/// Authenticated caller, taken from a validated access token
///
/// Extract in handlers with `Extension<AuthenticatedUser>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
    /// `uuid` claim of the access token
    pub token_id: Uuid,
}

impl From<AccessClaims> for AuthenticatedUser {
    fn from(claims: AccessClaims) -> Self {
        Self {
            user_id: claims.user_id,
            email: claims.email,
            role: claims.role,
            token_id: claims.uuid,
        }
    }
}

/// Token from an `Authorization` value of exactly `Bearer <token>`
///
/// The scheme is matched case-insensitively. Anything other than two
/// space-separated, non-empty parts is rejected.
pub fn bearer_token(value: &str) -> Option<&str> {
    let mut parts = value.split(' ');
    let scheme = parts.next()?;
    let token = parts.next()?;

    if parts.next().is_some() || token.is_empty() || !scheme.eq_ignore_ascii_case("Bearer") {
        return None;
    }
    Some(token)
}

/// Middleware requiring a valid access token
///
/// # Usage
///
/// ```ignore
/// use axum::{Router, routing::get, middleware};
/// use tessera_api::auth::middleware::auth_middleware;
///
/// let app = Router::new()
///     .route("/protected", get(protected_handler))
///     .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
///     .with_state(state);
/// ```
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = match request
        .headers()
        .get(header::AUTHORIZATION)
        .map(|value| value.to_str().ok().and_then(bearer_token))
    {
        Some(Some(token)) => token.to_string(),
        Some(None) => return Err(reject(&request, "malformed Authorization header")),
        None => return Err(reject(&request, "missing Authorization header")),
    };

    let claims = match state.auth.validate_token(&token) {
        Ok(claims) => claims,
        Err(e) => {
            reject(&request, "invalid or expired token");
            return Err(e);
        }
    };

    request
        .extensions_mut()
        .insert(AuthenticatedUser::from(claims));

    Ok(next.run(request).await)
}

fn reject(request: &Request<Body>, reason: &str) -> AppError {
    let client = client_info(request.headers());
    audit_log(&AuditEvent::InvalidToken {
        client_ip: client.client_ip,
        user_agent: client.user_agent,
        reason: reason.to_string(),
    });
    AppError::Unauthorized
}

/// Type alias for role middleware future
type RoleMiddlewareFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response, AppError>> + Send>>;

/// Middleware factory for role-based access control
///
/// Must run after `auth_middleware`; a request without an
/// `AuthenticatedUser` is treated as unauthenticated.
///
/// ```ignore
/// use axum::{Router, routing::post, middleware};
/// use tessera_api::auth::middleware::{auth_middleware, require_role};
/// use tessera_core::Role;
///
/// let admin = Router::new()
///     .route("/admin/sessions/sweep", post(sweep_handler))
///     .route_layer(middleware::from_fn(require_role(Role::Admin)))
///     .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));
/// ```
pub fn require_role(
    required: Role,
) -> impl Fn(Request<Body>, Next) -> RoleMiddlewareFuture + Clone {
    move |request: Request<Body>, next: Next| {
        Box::pin(async move {
            let user = request
                .extensions()
                .get::<AuthenticatedUser>()
                .cloned()
                .ok_or(AppError::Unauthorized)?;

            if !user.role.satisfies(required) {
                audit_log(&AuditEvent::AccessDenied {
                    user_id: user.user_id,
                    email: user.email,
                    required_role: required.to_string(),
                    resource: request.uri().path().to_string(),
                    client_ip: client_info(request.headers()).client_ip,
                });

                return Err(AppError::Forbidden("Insufficient permissions".to_string()));
            }

            Ok(next.run(request).await)
        })
    }
}
