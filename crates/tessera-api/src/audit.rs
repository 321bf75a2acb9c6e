//! Security audit logging for session lifecycle events
//!
//! Every auth engine operation and every guard rejection produces one
//! `AuditEvent`. Events are logged at INFO level on the "audit" target with
//! the JSON-serialized event attached, so they can be filtered and routed
//! apart from application logs:
//!
//! ```text
//! RUST_LOG=audit=info,tessera_api=warn
//! ```
//!
//! Author: hephaex@gmail.com

use axum::http::{header, HeaderMap};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::models::ClientInfo;

/// Security audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    RegistrationSuccess {
        user_id: Uuid,
        email: String,
        role: String,
        client_ip: String,
        user_agent: String,
    },

    RegistrationFailure {
        email: String,
        reason: String,
        client_ip: String,
    },

    LoginSuccess {
        user_id: Uuid,
        email: String,
        session_id: Uuid,
        client_ip: String,
        user_agent: String,
    },

    /// Unknown email and wrong password are both reported here; only the
    /// audit trail distinguishes them.
    LoginFailure {
        email: String,
        reason: String,
        client_ip: String,
        user_agent: String,
    },

    /// Refresh token rotated
    TokenRefresh {
        user_id: Uuid,
        old_session_id: Uuid,
        new_session_id: Uuid,
        client_ip: String,
    },

    RefreshRejected {
        session_id: Option<Uuid>,
        reason: String,
    },

    Logout {
        session_id: Option<Uuid>,
    },

    LogoutAll {
        user_id: Uuid,
        sessions_revoked: u64,
        initiated_by: Option<Uuid>,
    },

    PasswordChange {
        user_id: Uuid,
        sessions_revoked: u64,
    },

    /// Bearer token missing, malformed, expired or badly signed
    InvalidToken {
        client_ip: String,
        user_agent: String,
        reason: String,
    },

    /// Role gate refused an authenticated caller
    AccessDenied {
        user_id: Uuid,
        email: String,
        required_role: String,
        resource: String,
        client_ip: String,
    },

    SessionsSwept {
        removed: u64,
    },

    /// Per-IP limit hit on a public auth endpoint
    RateLimited {
        client_ip: String,
        resource: String,
    },
}

impl AuditEvent {
    fn summary(&self) -> &'static str {
        match self {
            AuditEvent::RegistrationSuccess { .. } => "Registration successful",
            AuditEvent::RegistrationFailure { .. } => "Registration failed",
            AuditEvent::LoginSuccess { .. } => "Login successful",
            AuditEvent::LoginFailure { .. } => "Login failed",
            AuditEvent::TokenRefresh { .. } => "Token refresh",
            AuditEvent::RefreshRejected { .. } => "Token refresh rejected",
            AuditEvent::Logout { .. } => "User logout",
            AuditEvent::LogoutAll { .. } => "All sessions revoked",
            AuditEvent::PasswordChange { .. } => "Password changed",
            AuditEvent::InvalidToken { .. } => "Invalid token",
            AuditEvent::AccessDenied { .. } => "Access denied",
            AuditEvent::SessionsSwept { .. } => "Expired sessions swept",
            AuditEvent::RateLimited { .. } => "Rate limit exceeded",
        }
    }

    fn user_id(&self) -> Option<Uuid> {
        match self {
            AuditEvent::RegistrationSuccess { user_id, .. }
            | AuditEvent::LoginSuccess { user_id, .. }
            | AuditEvent::TokenRefresh { user_id, .. }
            | AuditEvent::LogoutAll { user_id, .. }
            | AuditEvent::PasswordChange { user_id, .. }
            | AuditEvent::AccessDenied { user_id, .. } => Some(*user_id),
            _ => None,
        }
    }
}

/// Log a security audit event
///
/// Example output with the JSON subscriber:
///
/// ```json
/// {
///   "target": "audit",
///   "fields": {
///     "message": "Login successful",
///     "timestamp": "2025-12-24T10:30:00Z",
///     "user_id": "550e8400-e29b-41d4-a716-446655440000",
///     "event": "{\"event_type\":\"login_success\",...}"
///   }
/// }
/// ```
pub fn audit_log(event: &AuditEvent) {
    let timestamp = Utc::now();

    let event_json = serde_json::to_string(event)
        .unwrap_or_else(|e| format!("{{\"error\":\"Failed to serialize audit event: {e}\"}}"));

    info!(
        target: "audit",
        timestamp = %timestamp,
        user_id = ?event.user_id(),
        event = %event_json,
        "{}",
        event.summary()
    );
}

/// Client IP from proxy headers
///
/// Takes the first hop of `X-Forwarded-For`, then `X-Real-IP`.
pub fn extract_ip_address(headers: &HeaderMap) -> Option<String> {
    if let Some(xff) = headers.get("x-forwarded-for") {
        if let Ok(xff_str) = xff.to_str() {
            if let Some(first_ip) = xff_str.split(',').next() {
                let first_ip = first_ip.trim();
                if !first_ip.is_empty() {
                    return Some(first_ip.to_string());
                }
            }
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|ip| ip.to_str().ok())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
}

pub fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .map(|s| s.to_string())
}

/// Session provenance for a request, `"unknown"` where a header is absent
pub fn client_info(headers: &HeaderMap) -> ClientInfo {
    ClientInfo::new(
        extract_user_agent(headers).unwrap_or_else(|| "unknown".to_string()),
        extract_ip_address(headers).unwrap_or_else(|| "unknown".to_string()),
    )
}
