//! Database configuration

use serde::{Deserialize, Serialize};

use crate::{DbError, DbResult};

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub postgres_url: String,
    /// Maximum PostgreSQL connections
    pub pg_max_connections: u32,
    /// Minimum PostgreSQL connections
    pub pg_min_connections: u32,
    /// Connection acquire timeout in seconds
    pub pg_acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            postgres_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/paysettle".to_string()),
            pg_max_connections: 20,
            pg_min_connections: 2,
            pg_acquire_timeout_secs: 30,
        }
    }
}

impl DatabaseConfig {
    /// Create config from environment variables. `DATABASE_URL` is required.
    pub fn from_env() -> DbResult<Self> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        Ok(Self {
            postgres_url: std::env::var("DATABASE_URL")
                .map_err(|_| DbError::Config("DATABASE_URL must be set".to_string()))?,
            pg_max_connections: env_or("PG_MAX_CONNECTIONS", defaults.pg_max_connections),
            pg_min_connections: env_or("PG_MIN_CONNECTIONS", defaults.pg_min_connections),
            pg_acquire_timeout_secs: env_or("PG_ACQUIRE_TIMEOUT", defaults.pg_acquire_timeout_secs),
        })
    }

    /// Mask sensitive parts of the PostgreSQL URL for logging
    pub fn postgres_url_masked(&self) -> String {
        mask_url(&self.postgres_url)
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn mask_url(url: &str) -> String {
    let (Some(scheme_end), Some(at_pos)) = (url.find("://"), url.rfind('@')) else {
        return url.to_string();
    };
    if at_pos < scheme_end {
        return url.to_string();
    }

    let credentials = &url[scheme_end + 3..at_pos];
    match credentials.split_once(':') {
        Some((user, _)) => format!("{}{}:***{}", &url[..scheme_end + 3], user, &url[at_pos..]),
        None => url.to_string(),
    }
}
