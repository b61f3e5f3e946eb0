use crate::domains::conversation::broadcast::{BroadcastSettings, DEFAULT_BATCH_SIZE, DEFAULT_BATCH_TIMEOUT};
use crate::errors::{ServiceError, ServiceResult};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://messaging.db?mode=rwc";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Runtime settings of the messaging core
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagingConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub broadcast_batch_size: usize,
    pub broadcast_batch_timeout: Duration,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            broadcast_batch_size: DEFAULT_BATCH_SIZE,
            broadcast_batch_timeout: DEFAULT_BATCH_TIMEOUT,
        }
    }
}

impl MessagingConfig {
    /// Read the process environment, loading `.env` first when present
    pub fn from_env() -> ServiceResult<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> ServiceResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let database_url = lookup("MESSAGING_DATABASE_URL")
            .or_else(|| lookup("DATABASE_URL"))
            .unwrap_or(defaults.database_url);
        let max_connections = parse_or(&lookup, "MESSAGING_MAX_CONNECTIONS", defaults.max_connections)?;
        let broadcast_batch_size =
            parse_or(&lookup, "MESSAGING_BROADCAST_BATCH_SIZE", defaults.broadcast_batch_size)?;
        let timeout_ms = parse_or(
            &lookup,
            "MESSAGING_BROADCAST_BATCH_TIMEOUT_MS",
            defaults.broadcast_batch_timeout.as_millis() as u64,
        )?;

        let config = Self {
            database_url,
            max_connections,
            broadcast_batch_size,
            broadcast_batch_timeout: Duration::from_millis(timeout_ms),
        };
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> ServiceResult<()> {
        if self.database_url.trim().is_empty() {
            return Err(ServiceError::Configuration("database url is empty".to_string()));
        }
        if self.max_connections == 0 {
            return Err(ServiceError::Configuration("MESSAGING_MAX_CONNECTIONS must be at least 1".to_string()));
        }
        if self.broadcast_batch_size == 0 {
            return Err(ServiceError::Configuration("MESSAGING_BROADCAST_BATCH_SIZE must be at least 1".to_string()));
        }
        if self.broadcast_batch_timeout.is_zero() {
            return Err(ServiceError::Configuration(
                "MESSAGING_BROADCAST_BATCH_TIMEOUT_MS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn broadcast_settings(&self) -> BroadcastSettings {
        BroadcastSettings {
            batch_size: self.broadcast_batch_size,
            batch_timeout: self.broadcast_batch_timeout,
        }
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> ServiceResult<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|_| {
            ServiceError::Configuration(format!("{} has an invalid value: '{}'", key, raw))
        }),
    }
}
