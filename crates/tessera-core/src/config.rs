//! Tessera Configuration Management
//!
//! Handles configuration from environment variables and TOML config files
//! with sensible defaults for development. Production deployments must
//! supply their own signing secret; `AppConfig::validate` refuses to start
//! otherwise.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Signing secret used when nothing else is configured.
///
/// Accepted in development only.
pub const DEVELOPMENT_JWT_SECRET: &str = "development-secret-key-change-in-production";

/// Minimum signing secret length accepted in production (256 bits).
const MIN_PRODUCTION_SECRET_LEN: usize = 32;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Deployment environment
    pub environment: Environment,

    /// Server configuration
    pub server: ServerConfig,

    /// Database connection
    pub database: DatabaseConfig,

    /// Token and password settings
    pub auth: AuthConfig,

    /// Per-IP limits on the public auth endpoints
    pub rate_limit: RateLimitConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_override()
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Load from `file` if given, otherwise from defaults, then apply the
    /// environment on top
    pub fn load(file: Option<PathBuf>) -> Result<Self, ConfigError> {
        match file {
            Some(path) => Self::from_file(path)?.with_env_override(),
            None => Self::from_env(),
        }
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Keys use the same names as the environment variables. Only keys the
    /// lookup returns a value for are touched.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(env) = lookup("APP_ENV") {
            self.environment = env.parse()?;
        }

        // Server
        if let Some(host) = lookup("API_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("API_PORT") {
            self.server.port = parse_value("API_PORT", &port)?;
        }

        // Database
        if let Some(url) = lookup("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(max) = lookup("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_value("DATABASE_MAX_CONNECTIONS", &max)?;
        }

        // Auth
        if let Some(secret) = lookup("JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Some(ttl) = lookup("JWT_ACCESS_EXPIRY") {
            self.auth.access_token_ttl_secs = parse_value("JWT_ACCESS_EXPIRY", &ttl)?;
        }
        if let Some(ttl) = lookup("JWT_REFRESH_EXPIRY") {
            self.auth.refresh_token_ttl_secs = parse_value("JWT_REFRESH_EXPIRY", &ttl)?;
        }
        if let Some(cost) = lookup("PASSWORD_MEMORY_COST") {
            self.auth.password.memory_cost = parse_value("PASSWORD_MEMORY_COST", &cost)?;
        }
        if let Some(cost) = lookup("PASSWORD_TIME_COST") {
            self.auth.password.time_cost = parse_value("PASSWORD_TIME_COST", &cost)?;
        }
        if let Some(p) = lookup("PASSWORD_PARALLELISM") {
            self.auth.password.parallelism = parse_value("PASSWORD_PARALLELISM", &p)?;
        }
        if let Some(interval) = lookup("SESSION_SWEEP_INTERVAL_SECS") {
            self.auth.session_sweep_interval_secs =
                parse_value("SESSION_SWEEP_INTERVAL_SECS", &interval)?;
        }

        // Rate limiting
        if let Some(enabled) = lookup("RATE_LIMIT_ENABLED") {
            self.rate_limit.enabled = parse_value("RATE_LIMIT_ENABLED", &enabled)?;
        }
        if let Some(secs) = lookup("RATE_LIMIT_REPLENISH_SECS") {
            self.rate_limit.replenish_secs = parse_value("RATE_LIMIT_REPLENISH_SECS", &secs)?;
        }
        if let Some(burst) = lookup("RATE_LIMIT_BURST") {
            self.rate_limit.burst_size = parse_value("RATE_LIMIT_BURST", &burst)?;
        }

        // Logging
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.logging.json_format = format.eq_ignore_ascii_case("json");
        }

        Ok(self)
    }

    /// Check the configuration before the server starts.
    ///
    /// Zero TTLs are always rejected. In production the signing secret must
    /// be explicitly set, differ from the development default and be at least
    /// 256 bits long.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.access_token_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "JWT_ACCESS_EXPIRY".to_string(),
                value: "0".to_string(),
            });
        }
        if self.auth.refresh_token_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "JWT_REFRESH_EXPIRY".to_string(),
                value: "0".to_string(),
            });
        }

        if self.rate_limit.enabled {
            if self.rate_limit.replenish_secs == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "RATE_LIMIT_REPLENISH_SECS".to_string(),
                    value: "0".to_string(),
                });
            }
            if self.rate_limit.burst_size == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "RATE_LIMIT_BURST".to_string(),
                    value: "0".to_string(),
                });
            }
        }

        if self.environment == Environment::Production {
            let secret = self.auth.jwt_secret.as_str();
            if secret.is_empty() || secret == DEVELOPMENT_JWT_SECRET {
                return Err(ConfigError::MissingRequired("JWT_SECRET".to_string()));
            }
            if secret.len() < MIN_PRODUCTION_SECRET_LEN {
                return Err(ConfigError::InvalidValue {
                    key: "JWT_SECRET".to_string(),
                    value: format!("<{} bytes>", secret.len()),
                });
            }
            if self.database.url.is_empty() {
                return Err(ConfigError::MissingRequired("DATABASE_URL".to_string()));
            }
        }

        Ok(())
    }

    /// Socket address string the server binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl std::str::FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            _ => Err(ConfigError::InvalidValue {
                key: "APP_ENV".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL. Empty selects the in-memory stores.
    pub url: String,

    /// Connection pool size
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
        }
    }
}

/// Token and credential settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC signing secret shared by access and refresh tokens
    pub jwt_secret: String,

    /// Access token lifetime in seconds (default: 3600 = 1 hour)
    pub access_token_ttl_secs: u64,

    /// Refresh token lifetime in seconds (default: 604800 = 7 days)
    pub refresh_token_ttl_secs: u64,

    /// Password hashing work factor
    pub password: PasswordConfig,

    /// Interval of the in-process expired-session sweep. 0 disables it.
    pub session_sweep_interval_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEVELOPMENT_JWT_SECRET.to_string(),
            access_token_ttl_secs: 3600,
            refresh_token_ttl_secs: 604_800,
            password: PasswordConfig::default(),
            session_sweep_interval_secs: 0,
        }
    }
}

/// Argon2id work factor
///
/// These parameters are tuned for security while maintaining acceptable
/// performance. Increasing memory or iterations slows down hashing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordConfig {
    /// Memory cost in KB (default: 65536 = 64 MB)
    pub memory_cost: u32,
    /// Time cost (iterations, default: 3)
    pub time_cost: u32,
    /// Parallelism (lanes, default: 4)
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_cost: 65536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

/// Rate limiting for login, register and refresh
///
/// Each client IP gets `burst_size` requests up front, then one more every
/// `replenish_secs` seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub replenish_secs: u64,
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            replenish_secs: 1,
            burst_size: 5,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
