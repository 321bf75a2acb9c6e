//! Authentication service layer
//!
//! Owns the session lifecycle: register, login, refresh-token rotation,
//! logout, logout-all, password change and access-token validation.
//!
//! A session is Active until it is either Blocked (logout, logout-all,
//! password change, rotation, lazy expiry detection) or Expired. Neither
//! state ever returns to Active. The service holds no locks of its own; the
//! refresh race is closed by the store's compare-and-set `block`.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tessera_core::{
    AuthConfig, Clock, CredentialStore, NewSession, NewUser, PasswordConfig, Role, SessionStore,
    StoreError, User,
};
use tokio::sync::OnceCell;
use tracing::{debug, error, warn};
use uuid::Uuid;
use validator::Validate;

use super::jwt::{AccessClaims, JwtConfig, TokenCodec};
use super::models::{
    AuthResponse, ChangePasswordRequest, ClientInfo, LoginRequest, RegisterRequest,
    TokenResponse, UserInfo,
};
use super::password;
use crate::audit::{audit_log, AuditEvent};
use crate::error::AppError;

/// Authentication service
pub struct AuthService {
    users: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionStore>,
    codec: TokenCodec,
    clock: Arc<dyn Clock>,
    password_config: PasswordConfig,
    /// Hash checked on unknown-email logins so they cost the same as a
    /// wrong password
    dummy_hash: OnceCell<String>,
}

const DUMMY_PASSWORD: &str = "tessera-unknown-account";

impl AuthService {
    pub fn new(
        users: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
        codec: TokenCodec,
        clock: Arc<dyn Clock>,
        password_config: PasswordConfig,
    ) -> Self {
        Self {
            users,
            sessions,
            codec,
            clock,
            password_config,
            dummy_hash: OnceCell::new(),
        }
    }

    /// Build the service from the `auth` configuration section
    pub fn from_config(
        auth: &AuthConfig,
        users: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let codec = TokenCodec::new(&JwtConfig::from(auth), clock.clone());
        Self::new(users, sessions, codec, clock, auth.password.clone())
    }

    /// Register a new user and open their first session
    ///
    /// New users get `Role::User`. Duplicate emails fail with `Conflict`.
    /// If the session cannot be opened the user is deleted again, so a failed
    /// registration can be retried.
    pub async fn register(
        &self,
        mut request: RegisterRequest,
        client: ClientInfo,
    ) -> Result<AuthResponse, AppError> {
        request.email = normalize_email(&request.email);
        request.name = request.name.trim().to_string();
        request.validate()?;

        match self.users.find_by_email(&request.email).await {
            Ok(_) => {
                self.registration_failed(&request.email, "email already in use", &client);
                return Err(AppError::Conflict("email already in use".to_string()));
            }
            Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let password_hash = self.hash(request.password).await?;

        // A concurrent registration can still win between the lookup and the
        // insert; the store's unique index reports that as Conflict.
        let user = self
            .users
            .create_user(NewUser {
                name: request.name,
                email: request.email.clone(),
                password_hash,
                role: Role::User,
            })
            .await
            .map_err(|e| {
                if matches!(e, StoreError::Conflict(_)) {
                    self.registration_failed(&request.email, "email already in use", &client);
                }
                AppError::from(e)
            })?;

        let (token, session_id) = match self.start_session(&user, &client).await {
            Ok(started) => started,
            Err(e) => {
                self.rollback_registration(&user).await;
                self.registration_failed(&user.email, "session could not be opened", &client);
                return Err(e);
            }
        };

        audit_log(&AuditEvent::RegistrationSuccess {
            user_id: user.id,
            email: user.email.clone(),
            role: user.role.to_string(),
            client_ip: client.client_ip.clone(),
            user_agent: client.user_agent.clone(),
        });
        debug!(user_id = %user.id, session_id = %session_id, "Registered user");

        Ok(AuthResponse {
            user: UserInfo::from(&user),
            token,
        })
    }

    /// Authenticate with email and password
    ///
    /// Unknown email and wrong password fail identically with
    /// `Unauthorized`. Other sessions of the user are left alone.
    pub async fn login(
        &self,
        request: LoginRequest,
        client: ClientInfo,
    ) -> Result<AuthResponse, AppError> {
        request.validate()?;
        let email = normalize_email(&request.email);

        let user = match self.users.find_by_email(&email).await {
            Ok(user) => user,
            Err(StoreError::NotFound(_)) => {
                if let Err(e) = self.verify_dummy(request.password).await {
                    warn!(error = %e, "Dummy password verification failed");
                }
                self.login_failed(&email, "unknown email", &client);
                return Err(AppError::Unauthorized);
            }
            Err(e) => return Err(e.into()),
        };

        if !self
            .verify(request.password, user.password_hash.clone())
            .await?
        {
            self.login_failed(&email, "password mismatch", &client);
            return Err(AppError::Unauthorized);
        }

        let (token, session_id) = self.start_session(&user, &client).await?;

        audit_log(&AuditEvent::LoginSuccess {
            user_id: user.id,
            email: user.email.clone(),
            session_id,
            client_ip: client.client_ip,
            user_agent: client.user_agent,
        });

        Ok(AuthResponse {
            user: UserInfo::from(&user),
            token,
        })
    }

    /// Rotate a refresh token
    ///
    /// The supplied token is single-use: its session is blocked and a new
    /// session is created for the returned pair. Reuse, revocation, expiry
    /// and forgery all fail with the same `Unauthorized`.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AppError> {
        let session = match self.sessions.find_active_by_token(refresh_token).await {
            Ok(session) => session,
            Err(StoreError::NotFound(_)) => {
                return Err(self.refresh_rejected(None, "no active session"));
            }
            Err(e) => return Err(e.into()),
        };

        let now = self.clock.now();
        if session.is_expired(now) {
            self.sessions.block(session.id).await?;
            return Err(self.refresh_rejected(Some(session.id), "session expired"));
        }

        let claims = match self.codec.parse_refresh(refresh_token) {
            Ok(claims) => claims,
            Err(e) => return Err(self.refresh_rejected(Some(session.id), &e.to_string())),
        };
        if claims.user_id != session.user_id {
            return Err(self.refresh_rejected(Some(session.id), "token owner mismatch"));
        }

        // Only the caller that flips the row may mint a successor.
        if !self.sessions.block(session.id).await? {
            return Err(self.refresh_rejected(Some(session.id), "already rotated"));
        }

        let user = match self.users.find_by_id(session.user_id).await {
            Ok(user) => user,
            Err(StoreError::NotFound(_)) => {
                return Err(self.refresh_rejected(Some(session.id), "owner no longer exists"));
            }
            Err(e) => return Err(e.into()),
        };

        let client = ClientInfo::new(session.user_agent, session.client_ip);
        let (token, new_session_id) = self.start_session(&user, &client).await?;

        audit_log(&AuditEvent::TokenRefresh {
            user_id: user.id,
            old_session_id: session.id,
            new_session_id,
            client_ip: client.client_ip,
        });

        Ok(token)
    }

    /// Revoke the session behind `refresh_token`
    ///
    /// Unknown, blocked and expired tokens succeed silently.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AppError> {
        if refresh_token.trim().is_empty() {
            return Err(AppError::bad_request("refresh_token is required"));
        }

        let session_id = match self.sessions.find_active_by_token(refresh_token).await {
            Ok(session) => {
                self.sessions.block(session.id).await?;
                Some(session.id)
            }
            Err(StoreError::NotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };

        audit_log(&AuditEvent::Logout { session_id });
        Ok(())
    }

    /// Revoke every session of `user_id`
    ///
    /// `initiated_by` is set when an administrator acts on another account.
    pub async fn logout_all(
        &self,
        user_id: Uuid,
        initiated_by: Option<Uuid>,
    ) -> Result<u64, AppError> {
        let revoked = self.sessions.block_all_for_user(user_id).await?;

        audit_log(&AuditEvent::LogoutAll {
            user_id,
            sessions_revoked: revoked,
            initiated_by,
        });
        Ok(revoked)
    }

    /// Replace the password of `user_id` and revoke all their sessions
    pub async fn change_password(
        &self,
        user_id: Uuid,
        request: ChangePasswordRequest,
    ) -> Result<(), AppError> {
        request.validate()?;

        let user = match self.users.find_by_id(user_id).await {
            Ok(user) => user,
            Err(StoreError::NotFound(_)) => return Err(AppError::Unauthorized),
            Err(e) => return Err(e.into()),
        };

        if !self
            .verify(request.old_password, user.password_hash.clone())
            .await?
        {
            return Err(AppError::bad_request("old password is incorrect"));
        }

        let new_hash = self.hash(request.new_password).await?;
        match self.users.update_password(user.id, &new_hash).await {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) => return Err(AppError::Unauthorized),
            Err(e) => return Err(e.into()),
        }

        // Sessions are revoked only once the new hash is stored.
        let revoked = self.sessions.block_all_for_user(user.id).await?;

        audit_log(&AuditEvent::PasswordChange {
            user_id: user.id,
            sessions_revoked: revoked,
        });
        Ok(())
    }

    /// Validate an access token
    ///
    /// Stateless: a token stays valid until it expires even if its session
    /// has been revoked.
    pub fn validate_token(&self, access_token: &str) -> Result<AccessClaims, AppError> {
        self.codec.parse_access(access_token).map_err(|e| {
            debug!(error = %e, "Access token rejected");
            AppError::Unauthorized
        })
    }

    /// Delete sessions whose expiry lies in the past
    pub async fn sweep_expired(&self) -> Result<u64, AppError> {
        let removed = self.sessions.delete_expired(self.clock.now()).await?;
        audit_log(&AuditEvent::SessionsSwept { removed });
        Ok(removed)
    }

    /// Mint a token pair for `user` and persist the refresh token's session
    async fn start_session(
        &self,
        user: &User,
        client: &ClientInfo,
    ) -> Result<(TokenResponse, Uuid), AppError> {
        let (access_token, _) = self.codec.issue_access(user)?;
        let (refresh_token, refresh_claims) = self.codec.issue_refresh(user.id)?;

        let expires_at = DateTime::<Utc>::from_timestamp(refresh_claims.exp, 0)
            .ok_or_else(|| AppError::Internal("refresh expiry out of range".to_string()))?;

        let session = self
            .sessions
            .create(NewSession {
                user_id: user.id,
                refresh_token: refresh_token.clone(),
                user_agent: client.user_agent.clone(),
                client_ip: client.client_ip.clone(),
                expires_at,
            })
            .await?;

        Ok((
            TokenResponse::bearer(access_token, refresh_token, self.codec.access_ttl_secs()),
            session.id,
        ))
    }

    async fn hash(&self, plaintext: String) -> Result<String, AppError> {
        let config = self.password_config.clone();
        tokio::task::spawn_blocking(move || password::hash_password(&plaintext, &config))
            .await
            .map_err(|e| AppError::Internal(format!("hashing task failed: {e}")))?
            .map_err(AppError::from)
    }

    async fn verify(&self, plaintext: String, digest: String) -> Result<bool, AppError> {
        tokio::task::spawn_blocking(move || password::verify_password(&plaintext, &digest))
            .await
            .map_err(|e| AppError::Internal(format!("verification task failed: {e}")))?
            .map_err(AppError::from)
    }

    /// Verify `plaintext` against a hash made with the configured work factor
    async fn verify_dummy(&self, plaintext: String) -> Result<(), AppError> {
        let digest = self
            .dummy_hash
            .get_or_try_init(|| self.hash(DUMMY_PASSWORD.to_string()))
            .await?
            .clone();
        self.verify(plaintext, digest).await?;
        Ok(())
    }

    async fn rollback_registration(&self, user: &User) {
        match self.users.delete_user(user.id).await {
            Ok(_) => debug!(user_id = %user.id, "Rolled back registration"),
            Err(e) => error!(user_id = %user.id, error = %e, "Failed to roll back registration"),
        }
    }

    fn login_failed(&self, email: &str, reason: &str, client: &ClientInfo) {
        audit_log(&AuditEvent::LoginFailure {
            email: email.to_string(),
            reason: reason.to_string(),
            client_ip: client.client_ip.clone(),
            user_agent: client.user_agent.clone(),
        });
    }

    fn registration_failed(&self, email: &str, reason: &str, client: &ClientInfo) {
        audit_log(&AuditEvent::RegistrationFailure {
            email: email.to_string(),
            reason: reason.to_string(),
            client_ip: client.client_ip.clone(),
        });
    }

    fn refresh_rejected(&self, session_id: Option<Uuid>, reason: &str) -> AppError {
        warn!(session_id = ?session_id, reason, "Refresh rejected");
        audit_log(&AuditEvent::RefreshRejected {
            session_id,
            reason: reason.to_string(),
        });
        AppError::Unauthorized
    }
}

/// Emails are compared and stored trimmed and lowercased
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
