//! Service configuration.

/// Configuration for the balance service, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// PostgreSQL connection string (default: local dev database).
    pub database_url: String,

    /// Maximum connections in the pool (default: 10).
    pub max_connections: u32,

    /// Currency for new accounts (default: "USD").
    pub currency: String,

    /// Welcome bonus for new accounts, in minor units (default: 100 = $0.10).
    pub welcome_bonus_units: i64,

    /// Retry attempts for best-effort audit writes (default: 3).
    pub audit_max_attempts: u32,

    /// Base backoff between audit retries in milliseconds, doubled per
    /// attempt (default: 100).
    pub audit_backoff_ms: u64,
}

impl ServiceConfig {
    /// Load configuration from environment variables, with defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_connections),
            currency: std::env::var("LEDGER_CURRENCY").unwrap_or(defaults.currency),
            welcome_bonus_units: std::env::var("WELCOME_BONUS_UNITS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.welcome_bonus_units),
            audit_max_attempts: std::env::var("AUDIT_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.audit_max_attempts),
            audit_backoff_ms: std::env::var("AUDIT_BACKOFF_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.audit_backoff_ms),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/chatledger".into(),
            max_connections: 10,
            currency: "USD".into(),
            welcome_bonus_units: 100,
            audit_max_attempts: 3,
            audit_backoff_ms: 100,
        }
    }
}
