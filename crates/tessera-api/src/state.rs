//! Application state management
//!
//! Author: hephaex@gmail.com

use std::sync::Arc;
use tessera_core::{
    AppConfig, Clock, CredentialStore, MemoryCredentialStore, MemorySessionStore, SessionStore,
    SystemClock,
};

use crate::auth::AuthService;

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Session lifecycle engine
    pub auth: AuthService,
}

impl AppState {
    /// Build state over the given stores and clock
    pub fn new(
        config: AppConfig,
        users: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let auth = AuthService::from_config(&config.auth, users, sessions, clock);
        Self { config, auth }
    }

    /// State backed by in-memory stores and the system clock
    pub fn in_memory(config: AppConfig) -> Self {
        Self::new(
            config,
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(MemorySessionStore::new()),
            Arc::new(SystemClock),
        )
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::in_memory(AppConfig::default())
    }
}
