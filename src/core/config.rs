//! Application configuration from environment variables.
//!
//! Load configuration using `Config::from_env()` after calling `dotenvy::dotenv()`.

use std::net::SocketAddr;

use super::auth::{JwtConfig, JwtError};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";
pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:5173";
pub const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 64;
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid BIND_ADDR '{0}'")]
    InvalidBindAddr(String),

    #[error("Invalid OUTBOUND_QUEUE_CAPACITY '{0}': expected a positive integer")]
    InvalidQueueCapacity(String),

    #[error(transparent)]
    Jwt(#[from] JwtError),
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server listens on
    pub bind_addr: SocketAddr,

    /// Browser origin of the editor UI; used for CORS and invite/meeting links
    pub frontend_url: String,

    /// Bearer-token verification settings
    pub jwt: JwtConfig,

    /// Per-connection outbound event queue size
    pub outbound_queue_capacity: usize,

    /// Fallback filter when `RUST_LOG` is unset
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Call `dotenvy::dotenv()` before this to load from `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] but reads values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_addr = lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = raw_addr
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddr(raw_addr.clone()))?;

        let outbound_queue_capacity = match lookup("OUTBOUND_QUEUE_CAPACITY") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => return Err(ConfigError::InvalidQueueCapacity(raw)),
            },
            None => DEFAULT_OUTBOUND_QUEUE_CAPACITY,
        };

        let frontend_url = lookup("FRONTEND_URL")
            .filter(|url| !url.is_empty())
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_FRONTEND_URL.to_string());

        Ok(Self {
            bind_addr,
            frontend_url,
            jwt: JwtConfig::from_lookup(&lookup)?,
            outbound_queue_capacity,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        })
    }

    /// Defaults with the given signing secret; handy for tests and tooling.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            frontend_url: DEFAULT_FRONTEND_URL.to_string(),
            jwt: JwtConfig::new(secret),
            outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}
