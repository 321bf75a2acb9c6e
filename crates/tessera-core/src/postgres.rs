//! PostgreSQL credential and session stores
//!
//! Uses SQLx against the schema in `schema.sql`. Every trait method maps to a
//! single statement, so row-level atomicity is the only concurrency primitive
//! relied upon.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::{NewSession, NewUser, Role, Session, User};
use crate::store::{CredentialStore, SessionStore};
use crate::{Result, StoreError};

/// Open a connection pool
pub async fn connect_pool(database_url: &str, max_connections: u32) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(|e| StoreError::Database(format!("PostgreSQL connection failed: {e}")))
}

/// Map a driver error, turning unique-index violations into `Conflict`.
fn map_write_error(err: sqlx::Error, conflict: &str) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            StoreError::Conflict(conflict.to_string())
        }
        _ => {
            tracing::warn!(error = %err, "PostgreSQL write failed");
            StoreError::Database(err.to_string())
        }
    }
}

fn map_read_error(err: sqlx::Error) -> StoreError {
    tracing::warn!(error = %err, "PostgreSQL query failed");
    StoreError::Database(err.to_string())
}

/// User row from database
#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    password_hash: String,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            role: row.role.parse::<Role>()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Session row from database
#[derive(Debug, FromRow)]
struct SessionRow {
    id: Uuid,
    user_id: Uuid,
    refresh_token: String,
    user_agent: String,
    client_ip: String,
    expires_at: DateTime<Utc>,
    is_blocked: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            id: row.id,
            user_id: row.user_id,
            refresh_token: row.refresh_token,
            user_agent: row.user_agent,
            client_ip: row.client_ip,
            expires_at: row.expires_at,
            is_blocked: row.is_blocked,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const USER_COLUMNS: &str = "id, name, email, password_hash, role, created_at, updated_at";
const SESSION_COLUMNS: &str =
    "id, user_id, refresh_token, user_agent, client_ip, expires_at, is_blocked, created_at, updated_at";

/// PostgreSQL user store
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let query = format!(
            "INSERT INTO users (id, name, email, password_hash, role, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, NOW(), NOW()) RETURNING {USER_COLUMNS}"
        );

        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(Uuid::new_v4())
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_write_error(e, "email already in use"))?;

        row.try_into()
    }

    async fn find_by_email(&self, email: &str) -> Result<User> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");

        sqlx::query_as::<_, UserRow>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_read_error)?
            .ok_or_else(|| StoreError::NotFound("User".to_string()))?
            .try_into()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<User> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");

        sqlx::query_as::<_, UserRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_read_error)?
            .ok_or_else(|| StoreError::NotFound("User".to_string()))?
            .try_into()
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<()> {
        let result =
            sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
                .bind(password_hash)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(map_read_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("User".to_string()));
        }
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_read_error)?;

        Ok(result.rows_affected() == 1)
    }
}

/// PostgreSQL session store
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, session: NewSession) -> Result<Session> {
        let query = format!(
            "INSERT INTO sessions (id, user_id, refresh_token, user_agent, client_ip, expires_at, \
             is_blocked, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, false, NOW(), NOW()) RETURNING {SESSION_COLUMNS}"
        );

        let row = sqlx::query_as::<_, SessionRow>(&query)
            .bind(Uuid::new_v4())
            .bind(session.user_id)
            .bind(&session.refresh_token)
            .bind(&session.user_agent)
            .bind(&session.client_ip)
            .bind(session.expires_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_write_error(e, "refresh token already exists"))?;

        Ok(row.into())
    }

    async fn find_active_by_token(&self, refresh_token: &str) -> Result<Session> {
        let query = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE refresh_token = $1 AND is_blocked = false"
        );

        sqlx::query_as::<_, SessionRow>(&query)
            .bind(refresh_token)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_read_error)?
            .map(Session::from)
            .ok_or_else(|| StoreError::NotFound("Session".to_string()))
    }

    async fn block(&self, session_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE sessions SET is_blocked = true, updated_at = NOW() \
             WHERE id = $1 AND is_blocked = false",
        )
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(map_read_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn block_all_for_user(&self, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE sessions SET is_blocked = true, updated_at = NOW() \
             WHERE user_id = $1 AND is_blocked = false",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(map_read_error)?;

        Ok(result.rows_affected())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(map_read_error)?;

        Ok(result.rows_affected())
    }

    async fn list_active_for_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Session>> {
        let query = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions \
             WHERE user_id = $1 AND is_blocked = false AND expires_at >= $2 \
             ORDER BY created_at DESC"
        );

        let rows = sqlx::query_as::<_, SessionRow>(&query)
            .bind(user_id)
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(map_read_error)?;

        Ok(rows.into_iter().map(Session::from).collect())
    }
}
