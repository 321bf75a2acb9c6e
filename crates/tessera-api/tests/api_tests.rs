//! API Integration Tests
//!
//! Drive the router end to end over the in-memory stores.
//!
//! Author: hephaex@gmail.com

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tessera_api::{auth::hash_password, create_router, create_router_for_testing, state::AppState};
use tessera_core::{
    AppConfig, CredentialStore, MemoryCredentialStore, MemorySessionStore, NewUser,
    PasswordConfig, RateLimitConfig, Role, SystemClock,
};
use tower::ServiceExt;

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.auth.jwt_secret = "integration-test-secret".to_string();
    config.auth.password = PasswordConfig {
        memory_cost: 8192,
        time_cost: 1,
        parallelism: 1,
    };
    config.rate_limit.enabled = false;
    config
}

struct TestApp {
    router: Router,
    users: Arc<MemoryCredentialStore>,
    config: AppConfig,
}

impl TestApp {
    fn new() -> Self {
        Self::with_config(test_config())
    }

    fn with_config(config: AppConfig) -> Self {
        let users = Arc::new(MemoryCredentialStore::new());
        let state = AppState::new(
            config.clone(),
            users.clone(),
            Arc::new(MemorySessionStore::new()),
            Arc::new(SystemClock),
        );

        Self {
            router: create_router_for_testing(Arc::new(state)),
            users,
            config,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    async fn post(&self, uri: &str, body: Value, bearer: Option<&str>) -> (StatusCode, Value) {
        self.send(create_json_request("POST", uri, Some(body), bearer))
            .await
    }

    async fn register(&self, name: &str, email: &str, password: &str) -> Value {
        let (status, json) = self
            .post(
                "/auth/register",
                json!({"name": name, "email": email, "password": password}),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{json}");
        json["data"].clone()
    }

    async fn login(&self, email: &str, password: &str) -> (StatusCode, Value) {
        self.post(
            "/auth/login",
            json!({"email": email, "password": password}),
            None,
        )
        .await
    }

    /// Insert an admin directly and log in through the API
    async fn admin_access_token(&self) -> String {
        let password_hash = hash_password("admin-pass", &self.config.auth.password).unwrap();
        self.users
            .create_user(NewUser {
                name: "Root".to_string(),
                email: "root@x.com".to_string(),
                password_hash,
                role: Role::Admin,
            })
            .await
            .unwrap();

        let (status, json) = self.login("root@x.com", "admin-pass").await;
        assert_eq!(status, StatusCode::OK);
        access_token(&json["data"])
    }
}

/// Helper to create a test request
fn create_json_request(
    method: &str,
    uri: &str,
    body: Option<Value>,
    bearer: Option<&str>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");

    if let Some(token) = bearer {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }

    match body {
        Some(json_body) => builder
            .body(Body::from(serde_json::to_string(&json_body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn access_token(data: &Value) -> String {
    data["token"]["access_token"].as_str().unwrap().to_string()
}

fn refresh_token(data: &Value) -> String {
    data["token"]["refresh_token"].as_str().unwrap().to_string()
}

// =============================================================================
// Register / Login
// =============================================================================

#[tokio::test]
async fn test_register_then_wrong_password() {
    let app = TestApp::new();

    let (status, json) = app
        .post(
            "/auth/register",
            json!({"name": "Ann", "email": "ann@x.com", "password": "secret1"}),
            None,
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["user"]["email"], "ann@x.com");
    assert_eq!(json["data"]["user"]["role"], "user");
    assert_eq!(json["data"]["token"]["token_type"], "Bearer");
    assert!(!json["data"]["token"]["access_token"]
        .as_str()
        .unwrap()
        .is_empty());
    assert!(json["data"]["user"].get("password_hash").is_none());

    let (status, json) = app.login("ann@x.com", "wrong").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_unknown_email_and_wrong_password_are_identical() {
    let app = TestApp::new();
    app.register("Ann", "ann@x.com", "secret1").await;

    let wrong_password = app.login("ann@x.com", "wrong").await;
    let unknown_email = app.login("bob@x.com", "secret1").await;

    assert_eq!(wrong_password, unknown_email);
}

#[tokio::test]
async fn test_login_success() {
    let app = TestApp::new();
    app.register("Ann", "ann@x.com", "secret1").await;

    let (status, json) = app.login("ann@x.com", "secret1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["user"]["name"], "Ann");
    assert_eq!(json["data"]["token"]["expires_in"], 3600);
}

#[tokio::test]
async fn test_duplicate_email_is_conflict() {
    let app = TestApp::new();
    app.register("Ann", "ann@x.com", "secret1").await;

    let (status, json) = app
        .post(
            "/auth/register",
            json!({"name": "Ann Again", "email": "ANN@x.com", "password": "secret2"}),
            None,
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn test_register_validation_failure() {
    let app = TestApp::new();

    let (status, json) = app
        .post(
            "/auth/register",
            json!({"name": "", "email": "not-an-email", "password": "123"}),
            None,
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "BAD_REQUEST");
    assert!(json["error"]["details"]["email"].is_array());
    assert!(json["error"]["details"]["password"].is_array());
}

#[tokio::test]
async fn test_malformed_body_uses_error_envelope() {
    let app = TestApp::new();

    let request = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header("Content-Type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, json) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
}

// =============================================================================
// Refresh / Logout
// =============================================================================

#[tokio::test]
async fn test_refresh_rotates_token() {
    let app = TestApp::new();
    let data = app.register("Ann", "ann@x.com", "secret1").await;
    let original = refresh_token(&data);

    let (status, json) = app
        .post("/auth/refresh-token", json!({"refresh_token": original}), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let rotated = json["data"]["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(rotated, original);
    assert_eq!(json["data"]["token_type"], "Bearer");

    let (status, _) = app
        .post("/auth/refresh-token", json!({"refresh_token": original}), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post("/auth/refresh-token", json!({"refresh_token": rotated}), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_concurrent_refresh_single_winner() {
    let app = TestApp::new();
    let data = app.register("Ann", "ann@x.com", "secret1").await;
    let token = refresh_token(&data);

    let attempts = (0..8).map(|_| {
        app.post("/auth/refresh-token", json!({"refresh_token": token}), None)
    });
    let results = futures::future::join_all(attempts).await;

    let winners = results
        .iter()
        .filter(|(status, _)| *status == StatusCode::OK)
        .count();
    assert_eq!(winners, 1);
    assert!(results
        .iter()
        .all(|(status, _)| *status == StatusCode::OK || *status == StatusCode::UNAUTHORIZED));
}

#[tokio::test]
async fn test_logout_is_idempotent() {
    let app = TestApp::new();
    let data = app.register("Ann", "ann@x.com", "secret1").await;
    let access = access_token(&data);
    let refresh = refresh_token(&data);

    for _ in 0..2 {
        let (status, json) = app
            .post("/auth/logout", json!({"refresh_token": refresh}), Some(&access))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
    }

    let (status, _) = app
        .post("/auth/refresh-token", json!({"refresh_token": refresh}), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post("/auth/logout", json!({"refresh_token": ""}), Some(&access))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post("/auth/logout", json!({"refresh_token": refresh}), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_all_revokes_every_refresh_token() {
    let app = TestApp::new();
    let first = app.register("Ann", "ann@x.com", "secret1").await;
    let (_, second) = app.login("ann@x.com", "secret1").await;

    let (status, _) = app
        .post("/auth/logout-all", json!({}), Some(&access_token(&first)))
        .await;
    assert_eq!(status, StatusCode::OK);

    for token in [refresh_token(&first), refresh_token(&second["data"])] {
        let (status, _) = app
            .post("/auth/refresh-token", json!({"refresh_token": token}), None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn test_change_password() {
    let app = TestApp::new();
    let data = app.register("Ann", "ann@x.com", "secret1").await;
    let access = access_token(&data);

    let (status, json) = app
        .post(
            "/auth/change-password",
            json!({"old_password": "nope", "new_password": "secret2"}),
            Some(&access),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{json}");

    let (status, _) = app
        .post(
            "/auth/change-password",
            json!({"old_password": "secret1", "new_password": "secret2"}),
            Some(&access),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .post(
            "/auth/refresh-token",
            json!({"refresh_token": refresh_token(&data)}),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(app.login("ann@x.com", "secret1").await.0, StatusCode::UNAUTHORIZED);
    assert_eq!(app.login("ann@x.com", "secret2").await.0, StatusCode::OK);
}

// =============================================================================
// Access guard and role gate
// =============================================================================

#[tokio::test]
async fn test_guard_rejects_bad_authorization_headers() {
    let app = TestApp::new();

    for header in [None, Some("Basic x"), Some("Bearer "), Some("Bearer a b"), Some("Bearer garbage")] {
        let mut builder = Request::builder().method("GET").uri("/auth/me");
        if let Some(value) = header {
            builder = builder.header("Authorization", value);
        }

        let (status, json) = app.send(builder.body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "header {header:?}");
        assert_eq!(json["error"]["code"], "UNAUTHORIZED");
    }
}

#[tokio::test]
async fn test_me_returns_token_identity() {
    let app = TestApp::new();
    let data = app.register("Ann", "ann@x.com", "secret1").await;

    let request = create_json_request("GET", "/auth/me", None, Some(&access_token(&data)));
    let (status, json) = app.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["email"], "ann@x.com");
    assert_eq!(json["data"]["role"], "user");
    assert_eq!(json["data"]["user_id"], data["user"]["id"]);
}

#[tokio::test]
async fn test_refresh_token_is_not_an_access_token() {
    let app = TestApp::new();
    let data = app.register("Ann", "ann@x.com", "secret1").await;

    let request = create_json_request("GET", "/auth/me", None, Some(&refresh_token(&data)));
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_routes_require_admin_role() {
    let app = TestApp::new();
    let user = app.register("Ann", "ann@x.com", "secret1").await;

    let (status, json) = app
        .post("/admin/sessions/sweep", json!({}), Some(&access_token(&user)))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"]["code"], "FORBIDDEN");

    let (status, _) = app.post("/admin/sessions/sweep", json!({}), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let admin = app.admin_access_token().await;
    let (status, json) = app
        .post("/admin/sessions/sweep", json!({}), Some(&admin))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["count"], 0);
}

#[tokio::test]
async fn test_admin_revokes_another_users_sessions() {
    let app = TestApp::new();
    let user = app.register("Ann", "ann@x.com", "secret1").await;
    let admin = app.admin_access_token().await;

    let uri = format!(
        "/admin/users/{}/logout-all",
        user["user"]["id"].as_str().unwrap()
    );
    let (status, json) = app.post(&uri, json!({}), Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["count"], 1);

    let (status, _) = app
        .post(
            "/auth/refresh-token",
            json!({"refresh_token": refresh_token(&user)}),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Rate limiting
// =============================================================================

#[tokio::test]
async fn test_login_is_rate_limited_per_ip() {
    let mut config = test_config();
    config.rate_limit = RateLimitConfig {
        enabled: true,
        replenish_secs: 60,
        burst_size: 2,
    };
    let app = TestApp::with_config(config);

    let attempt = |ip: &'static str| {
        let mut request = create_json_request(
            "POST",
            "/auth/login",
            Some(json!({"email": "ann@x.com", "password": "guess"})),
            None,
        );
        request
            .headers_mut()
            .insert("x-forwarded-for", ip.parse().unwrap());
        request
    };

    for _ in 0..2 {
        let (status, _) = app.send(attempt("203.0.113.5")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let (status, json) = app.send(attempt("203.0.113.5")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json["error"]["code"], "TOO_MANY_REQUESTS");

    let (status, _) = app.send(attempt("198.51.100.8")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_protected_routes_are_not_rate_limited() {
    let mut config = test_config();
    config.rate_limit = RateLimitConfig {
        enabled: true,
        replenish_secs: 60,
        burst_size: 1,
    };
    let app = TestApp::with_config(config);

    for _ in 0..3 {
        let (status, _) = app.send(create_json_request("GET", "/auth/me", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn test_long_user_agent_does_not_break_login() {
    let app = TestApp::new();
    app.register("Ann", "ann@x.com", "secret1").await;

    let mut request = create_json_request(
        "POST",
        "/auth/login",
        Some(json!({"email": "ann@x.com", "password": "secret1"})),
        None,
    );
    request
        .headers_mut()
        .insert("user-agent", "x".repeat(1000).parse().unwrap());

    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
}

// =============================================================================
// Documentation
// =============================================================================

#[tokio::test]
async fn test_openapi_document_served() {
    let state = Arc::new(AppState::in_memory(test_config()));
    let app = create_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api-docs/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert!(json["paths"]["/auth/login"].is_object());
    assert!(json["paths"]["/auth/refresh-token"].is_object());
}
