//! Application configuration loaded from environment variables.

use common::Money;

const DEFAULT_SESSION_SECRET: &str = "insecure-development-session-secret";

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: PostgreSQL connection string; in-memory store when unset
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `10`)
/// - `SESSION_SECRET`: key for signing session tokens
/// - `SHIPPING_COST_CENTS`: flat shipping charged at checkout (default: `0`)
/// - `ADMIN_EMAIL` / `ADMIN_PASSWORD`: staff account created at startup
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub session_secret: String,
    pub shipping_cost: Money,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

fn non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: non_empty("DATABASE_URL"),
            database_max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|n| n.parse().ok())
                .unwrap_or(defaults.database_max_connections),
            session_secret: non_empty("SESSION_SECRET").unwrap_or(defaults.session_secret),
            shipping_cost: std::env::var("SHIPPING_COST_CENTS")
                .ok()
                .and_then(|c| c.parse().ok())
                .map(Money::from_cents)
                .unwrap_or(defaults.shipping_cost),
            admin_email: non_empty("ADMIN_EMAIL"),
            admin_password: non_empty("ADMIN_PASSWORD"),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// True when the development signing key is in use.
    pub fn uses_default_secret(&self) -> bool {
        self.session_secret == DEFAULT_SESSION_SECRET
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            database_max_connections: 10,
            session_secret: DEFAULT_SESSION_SECRET.to_string(),
            shipping_cost: Money::zero(),
            admin_email: None,
            admin_password: None,
        }
    }
}
