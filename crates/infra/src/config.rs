//! Runtime configuration, read from `STOCKLEDGER_*` environment variables.

use std::time::Duration;

use thiserror::Error;

pub const STORE_TIMEOUT_MS: &str = "STOCKLEDGER_STORE_TIMEOUT_MS";
pub const MAX_CONFLICT_RETRIES: &str = "STOCKLEDGER_MAX_CONFLICT_RETRIES";
pub const RECENT_WINDOW_DAYS: &str = "STOCKLEDGER_RECENT_WINDOW_DAYS";
pub const LATEST_MOVEMENTS: &str = "STOCKLEDGER_LATEST_MOVEMENTS";
pub const DATABASE_URL: &str = "DATABASE_URL";
pub const DB_MAX_CONNECTIONS: &str = "STOCKLEDGER_DB_MAX_CONNECTIONS";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryConfig {
    /// Upper bound on any single store call made by the engine or services.
    pub store_timeout: Duration,
    /// Extra attempts after a lost optimistic write before giving up.
    pub max_conflict_retries: u32,
    /// Default window for "recent movements" queries.
    pub recent_window_days: i64,
    /// Default size of the "latest movements" list.
    pub latest_movements_limit: usize,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_millis(5_000),
            max_conflict_retries: 5,
            recent_window_days: 7,
            latest_movements_limit: 10,
            database_url: None,
            database_max_connections: 10,
        }
    }
}

impl InventoryConfig {
    /// Read configuration from the process environment, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let store_timeout_ms: u64 = parse(&lookup, STORE_TIMEOUT_MS)?
            .unwrap_or(defaults.store_timeout.as_millis() as u64);
        if store_timeout_ms == 0 {
            return Err(invalid(STORE_TIMEOUT_MS, "0"));
        }

        let recent_window_days: i64 =
            parse(&lookup, RECENT_WINDOW_DAYS)?.unwrap_or(defaults.recent_window_days);
        if recent_window_days < 0 {
            return Err(invalid(RECENT_WINDOW_DAYS, recent_window_days.to_string()));
        }

        let database_max_connections: u32 =
            parse(&lookup, DB_MAX_CONNECTIONS)?.unwrap_or(defaults.database_max_connections);
        if database_max_connections == 0 {
            return Err(invalid(DB_MAX_CONNECTIONS, "0"));
        }

        Ok(Self {
            store_timeout: Duration::from_millis(store_timeout_ms),
            max_conflict_retries: parse(&lookup, MAX_CONFLICT_RETRIES)?
                .unwrap_or(defaults.max_conflict_retries),
            recent_window_days,
            latest_movements_limit: parse(&lookup, LATEST_MOVEMENTS)?
                .unwrap_or(defaults.latest_movements_limit),
            database_url: lookup(DATABASE_URL).filter(|url| !url.trim().is_empty()),
            database_max_connections,
        })
    }

    /// Total number of commit attempts the engine makes for one movement.
    pub fn commit_attempts(&self) -> u32 {
        self.max_conflict_retries.saturating_add(1)
    }
}

fn parse<F, T>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| invalid(key, raw)),
    }
}

fn invalid(key: &str, value: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: value.into(),
    }
}
