//! Store traits consumed by the auth engine
//!
//! Every method is a single atomic operation at the storage layer. The engine
//! relies on that atomicity instead of in-process locks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{NewSession, NewUser, Session, User};
use crate::Result;

/// User identity and password-hash persistence
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a user. Fails with `Conflict` if the email is taken.
    async fn create_user(&self, user: NewUser) -> Result<User>;

    /// Look up a user by (lowercase) email. `NotFound` if absent.
    async fn find_by_email(&self, email: &str) -> Result<User>;

    /// Look up a user by ID. `NotFound` if absent.
    async fn find_by_id(&self, id: Uuid) -> Result<User>;

    /// Replace the stored password hash. `NotFound` if the user is gone.
    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<()>;

    /// Remove a user. Returns `false` if no such user existed.
    ///
    /// The PostgreSQL schema cascades the delete to the user's sessions.
    async fn delete_user(&self, id: Uuid) -> Result<bool>;
}

/// Refresh-token session persistence
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a session. Fails with `Conflict` if the refresh token collides.
    async fn create(&self, session: NewSession) -> Result<Session>;

    /// The session for `refresh_token` if it exists and is not blocked.
    ///
    /// Blocked and absent sessions both yield `NotFound`.
    async fn find_active_by_token(&self, refresh_token: &str) -> Result<Session>;

    /// Block one session.
    ///
    /// Compare-and-set on `is_blocked = false`: returns `true` only when this
    /// call flipped the flag. Already-blocked or unknown sessions return
    /// `Ok(false)`.
    async fn block(&self, session_id: Uuid) -> Result<bool>;

    /// Block every session of a user. Returns the number of rows flipped.
    async fn block_all_for_user(&self, user_id: Uuid) -> Result<u64>;

    /// Delete sessions with `expires_at < now`. Returns the number removed.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Unblocked, unexpired sessions of a user, newest first.
    async fn list_active_for_user(&self, user_id: Uuid, now: DateTime<Utc>)
        -> Result<Vec<Session>>;
}
