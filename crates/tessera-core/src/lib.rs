//! Tessera Core - Domain models, store traits, and shared types
//!
//! This crate defines the abstractions the authentication engine is built on:
//! - User and session models, roles
//! - Store error type
//! - Credential and session store traits, with PostgreSQL and in-memory backends
//! - Clock abstraction
//! - Configuration management

pub mod clock;
pub mod config;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    AppConfig, AuthConfig, ConfigError, DatabaseConfig, Environment, LoggingConfig, PasswordConfig,
    RateLimitConfig, ServerConfig,
};
pub use memory::{MemoryCredentialStore, MemorySessionStore};
pub use models::{NewSession, NewUser, Role, Session, User};
pub use postgres::{connect_pool, PgCredentialStore, PgSessionStore};
pub use store::{CredentialStore, SessionStore};

use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised by the credential and session stores
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
