//! In-memory credential and session stores
//!
//! Behaviourally identical to the PostgreSQL stores. Each trait method holds
//! the write lock for its whole body, which gives the same single-operation
//! atomicity a row update has. Used for development and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{NewSession, NewUser, Session, User};
use crate::store::{CredentialStore, SessionStore};
use crate::{Result, StoreError};

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users
    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict("email already in use".to_string()));
        }

        let now = Utc::now();
        let record = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            created_at: now,
            updated_at: now,
        };
        users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_email(&self, email: &str) -> Result<User> {
        self.users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("User".to_string()))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<User> {
        self.users
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("User".to_string()))
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<()> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound("User".to_string()))?;
        user.password_hash = password_hash.to_string();
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool> {
        Ok(self.users.write().await.remove(&id).is_some())
    }
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<Uuid, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored session, blocked or not. Test helper.
    pub async fn all(&self) -> Vec<Session> {
        self.sessions.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, session: NewSession) -> Result<Session> {
        let mut sessions = self.sessions.write().await;
        if sessions
            .values()
            .any(|s| s.refresh_token == session.refresh_token)
        {
            return Err(StoreError::Conflict(
                "refresh token already exists".to_string(),
            ));
        }

        let now = Utc::now();
        let record = Session {
            id: Uuid::new_v4(),
            user_id: session.user_id,
            refresh_token: session.refresh_token,
            user_agent: session.user_agent,
            client_ip: session.client_ip,
            expires_at: session.expires_at,
            is_blocked: false,
            created_at: now,
            updated_at: now,
        };
        sessions.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_active_by_token(&self, refresh_token: &str) -> Result<Session> {
        self.sessions
            .read()
            .await
            .values()
            .find(|s| s.refresh_token == refresh_token && !s.is_blocked)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("Session".to_string()))
    }

    async fn block(&self, session_id: Uuid) -> Result<bool> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&session_id) {
            Some(session) if !session.is_blocked => {
                session.is_blocked = true;
                session.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn block_all_for_user(&self, user_id: Uuid) -> Result<u64> {
        let mut sessions = self.sessions.write().await;
        let now = Utc::now();
        let mut flipped = 0;
        for session in sessions
            .values_mut()
            .filter(|s| s.user_id == user_id && !s.is_blocked)
        {
            session.is_blocked = true;
            session.updated_at = now;
            flipped += 1;
        }
        Ok(flipped)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(now));
        Ok((before - sessions.len()) as u64)
    }

    async fn list_active_for_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Session>> {
        let mut active: Vec<Session> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.user_id == user_id && !s.is_blocked && !s.is_expired(now))
            .cloned()
            .collect();
        active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(active)
    }
}
