//! Tessera CLI - Operator command-line interface
//!
//! Usage:
//!   tessera sweep-sessions
//!   tessera revoke-sessions <user-id>
//!   tessera hash-password <password>
//!   tessera check-config [--file <path>]

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tessera_api::auth::password;
use tessera_core::{connect_pool, AppConfig, PgSessionStore, SessionStore};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "Tessera session and token administration")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML); environment variables override it
    #[arg(long, global = true, env = "TESSERA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Delete sessions whose refresh token has expired
    SweepSessions,
    /// Block every active session of a user
    RevokeSessions {
        /// User whose sessions are revoked
        user_id: Uuid,
    },
    /// Print an Argon2id hash using the configured work factor
    HashPassword {
        /// Plaintext password
        password: String,
    },
    /// Load and validate configuration, then print it with secrets masked
    CheckConfig {
        /// Configuration file to check instead of --config
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::SweepSessions => {
            let sessions = session_store(load_config(cli.config)?).await?;
            let removed = sessions.delete_expired(Utc::now()).await?;
            println!("Deleted {removed} expired session(s)");
        }
        Commands::RevokeSessions { user_id } => {
            let sessions = session_store(load_config(cli.config)?).await?;
            let active = sessions.list_active_for_user(user_id, Utc::now()).await?;
            for session in &active {
                println!(
                    "  {} created {} from {} ({})",
                    session.id, session.created_at, session.client_ip, session.user_agent
                );
            }
            let blocked = sessions.block_all_for_user(user_id).await?;
            tracing::info!(%user_id, blocked, "Sessions revoked from CLI");
            println!("Blocked {blocked} session(s) for user {user_id}");
        }
        Commands::HashPassword { password: plain } => {
            let config = load_config(cli.config)?;
            let hash = password::hash_password(&plain, &config.auth.password)
                .context("Failed to hash password")?;
            println!("{hash}");
        }
        Commands::CheckConfig { file } => {
            let mut config = load_config(file.or(cli.config))?;
            config.validate().context("Invalid configuration")?;
            password::check_params(&config.auth.password)
                .context("Invalid password work factor")?;

            config.auth.jwt_secret = "********".to_string();
            if !config.database.url.is_empty() {
                config.database.url = "********".to_string();
            }
            println!("{}", serde_json::to_string_pretty(&config)?);
            println!("Configuration OK");
        }
    }

    Ok(())
}

fn load_config(file: Option<PathBuf>) -> anyhow::Result<AppConfig> {
    AppConfig::load(file).context("Failed to load configuration")
}

async fn session_store(config: AppConfig) -> anyhow::Result<PgSessionStore> {
    anyhow::ensure!(
        !config.database.url.is_empty(),
        "DATABASE_URL must be set for session commands"
    );
    let pool = connect_pool(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to PostgreSQL")?;
    Ok(PgSessionStore::from_pool(pool))
}
