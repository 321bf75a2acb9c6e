//! API route definitions
//!
//! Author: hephaex@gmail.com

use crate::auth::middleware::{auth_middleware, require_role};
use crate::handlers::{admin, auth};
use crate::middleware::rate_limit::limit_auth_routes;
use crate::state::AppState;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tessera_core::Role;

/// Create the authentication and admin routes
pub fn api_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    // Public routes (no authentication required, rate limited per IP)
    let public_routes = limit_auth_routes(
        Router::new()
            .route("/auth/register", post(auth::register_handler))
            .route("/auth/login", post(auth::login_handler))
            .route("/auth/refresh-token", post(auth::refresh_token_handler)),
        &state.config.rate_limit,
    );

    // Protected routes (valid access token required)
    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout_handler))
        .route("/auth/logout-all", post(auth::logout_all_handler))
        .route("/auth/change-password", post(auth::change_password_handler))
        .route("/auth/me", get(auth::me_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Admin routes: the guard runs first, then the role gate
    let admin_routes = Router::new()
        .route(
            "/admin/users/:id/logout-all",
            post(admin::revoke_user_sessions_handler),
        )
        .route("/admin/sessions/sweep", post(admin::sweep_sessions_handler))
        .route_layer(middleware::from_fn(require_role(Role::Admin)))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes)
}
