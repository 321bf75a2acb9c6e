//! Tessera API Server
//!
//! Author: hephaex@gmail.com

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tessera_api::{auth::password, create_router, state::AppState};
use tessera_core::{
    connect_pool, AppConfig, Clock, CredentialStore, LoggingConfig, MemoryCredentialStore,
    MemorySessionStore, PgCredentialStore, PgSessionStore, SessionStore, SystemClock,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load(std::env::var("TESSERA_CONFIG").ok().map(Into::into))
        .context("Failed to load configuration")?;

    init_tracing(&config.logging);

    config.validate().context("Invalid configuration")?;
    password::check_params(&config.auth.password).context("Invalid password work factor")?;

    let (users, sessions): (Arc<dyn CredentialStore>, Arc<dyn SessionStore>) =
        if config.database.url.is_empty() {
            tracing::warn!("DATABASE_URL is not set; using in-memory stores, data will not persist");
            (
                Arc::new(MemoryCredentialStore::new()),
                Arc::new(MemorySessionStore::new()),
            )
        } else {
            let pool = connect_pool(&config.database.url, config.database.max_connections)
                .await
                .context("Failed to connect to PostgreSQL")?;
            tracing::info!("Connected to PostgreSQL");
            (
                Arc::new(PgCredentialStore::from_pool(pool.clone())),
                Arc::new(PgSessionStore::from_pool(pool)),
            )
        };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let addr = config.bind_address();
    let sweep_interval = config.auth.session_sweep_interval_secs;

    let state = Arc::new(AppState::new(config, users, sessions, clock));

    if sweep_interval > 0 {
        spawn_session_sweeper(state.clone(), Duration::from_secs(sweep_interval));
    }

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    tracing::info!("Tessera API Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);
    tracing::info!("OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &logging.level;
        format!("tessera_api={level},tessera_core={level},tower_http={level},audit=info").into()
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Periodically delete expired sessions
fn spawn_session_sweeper(state: Arc<AppState>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match state.auth.sweep_expired().await {
                Ok(removed) => tracing::debug!(removed, "Session sweep finished"),
                Err(e) => tracing::error!(error = %e, "Session sweep failed"),
            }
        }
    });
    tracing::info!(interval_secs = every.as_secs(), "Session sweeper started");
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
