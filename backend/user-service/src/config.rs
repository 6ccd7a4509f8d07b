//! Configuration management for user-service
//!
//! Loads settings from environment variables, with a `.env` file as a local
//! development fallback.
//!
//! # Example
//!
//! ```no_run
//! use user_service::config::Settings;
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     println!("gRPC listening on {}", settings.server.grpc_addr);
//!     Ok(())
//! }
//! ```

use crate::grpc::{LOGIN_METHOD, REGISTER_METHOD};
use anyhow::{anyhow, Context, Result};
use chrono::Duration;
use crypto_core::TokenConfig;
use jsonwebtoken::Algorithm;
use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use tracing::info;

/// Application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub jwt: JwtSettings,
    pub database: DatabaseSettings,
}

impl Settings {
    /// Load `.env` (if present) and then read the environment.
    pub fn load() -> Result<Self> {
        if dotenvy::dotenv().is_ok() {
            info!("Loaded .env file");
        }
        Self::from_env()
    }

    pub fn from_env() -> Result<Self> {
        Ok(Settings {
            server: ServerSettings::from_env()?,
            jwt: JwtSettings::from_env()?,
            database: DatabaseSettings::from_env()?,
        })
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Listener addresses and lifecycle settings
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub grpc_addr: SocketAddr,
    pub http_addr: SocketAddr,
    pub admin_addr: SocketAddr,
    /// Address the gateway dials for the gRPC server
    pub grpc_upstream: String,
    pub shutdown_timeout_secs: u64,
}

impl ServerSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            grpc_addr: var_or("GRPC_ADDR", "0.0.0.0:9000")
                .parse()
                .context("Invalid GRPC_ADDR")?,
            http_addr: var_or("HTTP_ADDR", "0.0.0.0:8000")
                .parse()
                .context("Invalid HTTP_ADDR")?,
            admin_addr: var_or("ADMIN_ADDR", "0.0.0.0:9100")
                .parse()
                .context("Invalid ADMIN_ADDR")?,
            grpc_upstream: var_or("GRPC_UPSTREAM", "http://127.0.0.1:9000"),
            shutdown_timeout_secs: var_or("SHUTDOWN_TIMEOUT_SECS", "10")
                .parse()
                .context("Invalid SHUTDOWN_TIMEOUT_SECS")?,
        })
    }
}

/// Token signing settings
#[derive(Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub algorithm: Algorithm,
    pub ttl: Duration,
    /// Full gRPC method paths that skip authentication
    pub whitelist: Vec<String>,
}

impl fmt::Debug for JwtSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtSettings")
            .field("secret", &"[REDACTED]")
            .field("algorithm", &self.algorithm)
            .field("ttl", &self.ttl)
            .field("whitelist", &self.whitelist)
            .finish()
    }
}

impl JwtSettings {
    fn from_env() -> Result<Self> {
        let algorithm = var_or("JWT_ALGORITHM", "HS256");
        let ttl_secs: i64 = var_or("JWT_TTL_SECS", "86400")
            .parse()
            .context("Invalid JWT_TTL_SECS")?;
        if ttl_secs <= 0 {
            return Err(anyhow!("JWT_TTL_SECS must be positive"));
        }
        let ttl = Duration::try_seconds(ttl_secs).context("JWT_TTL_SECS is out of range")?;

        let whitelist = match env::var("JWT_WHITELIST") {
            Ok(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|route| !route.is_empty())
                .map(String::from)
                .collect(),
            Err(_) => vec![REGISTER_METHOD.to_string(), LOGIN_METHOD.to_string()],
        };

        Ok(Self {
            secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            algorithm: Algorithm::from_str(&algorithm)
                .map_err(|_| anyhow!("Invalid JWT_ALGORITHM: {}", algorithm))?,
            ttl,
            whitelist,
        })
    }

    pub fn token_config(&self) -> TokenConfig {
        TokenConfig {
            secret: self.secret.clone(),
            algorithm: self.algorithm,
            ttl: self.ttl,
            whitelist: self.whitelist.clone(),
        }
    }
}

/// Database connection settings. Without a URL the service keeps users in
/// memory.
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: u32,
}

impl DatabaseSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            max_connections: var_or("DATABASE_MAX_CONNECTIONS", "10")
                .parse()
                .context("Invalid DATABASE_MAX_CONNECTIONS")?,
        })
    }
}
