/// Worker configuration
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required)
/// - `DATABASE_MAX_CONNECTIONS` (default 5)
/// - `WORKER_TICK_SECS`: scheduler tick (default 60)
/// - `NOTIFICATION_RETENTION_DAYS`: age after which read notifications are
///   deleted (default 30)
/// - `SNAPSHOT_INTERVAL_SECS`: how often today's snapshot is refreshed
///   (default 300)

use anyhow::Context;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub tick_secs: u64,
    pub retention_days: i64,
    pub snapshot_interval_secs: u64,
}

impl WorkerConfig {
    /// Loads configuration from environment variables (and `.env`)
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_map(vars: &HashMap<String, String>) -> anyhow::Result<Self> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL").context("DATABASE_URL must be set")?;

        let tick_secs: u64 = parse_or(&get, "WORKER_TICK_SECS", 60)?;
        if tick_secs == 0 {
            anyhow::bail!("WORKER_TICK_SECS must be greater than 0");
        }

        Ok(Self {
            database_url,
            max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", 5)?,
            tick_secs,
            retention_days: parse_or(&get, "NOTIFICATION_RETENTION_DAYS", 30)?,
            snapshot_interval_secs: parse_or(&get, "SNAPSHOT_INTERVAL_SECS", 300)?,
        })
    }

    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs)
    }

    pub fn pool_config(&self) -> matrix_shared::db::pool::DatabaseConfig {
        matrix_shared::db::pool::DatabaseConfig {
            url: self.database_url.clone(),
            max_connections: self.max_connections,
            ..Default::default()
        }
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {}: {}", key, e)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::from_map(&vars(&[("DATABASE_URL", "postgres://localhost/matrix")]))
            .unwrap();

        assert_eq!(config.tick(), Duration::from_secs(60));
        assert_eq!(config.retention_days, 30);
        assert_eq!(config.snapshot_interval(), Duration::from_secs(300));
        assert_eq!(config.pool_config().max_connections, 5);
    }

    #[test]
    fn test_invalid_values() {
        assert!(WorkerConfig::from_map(&vars(&[])).is_err());
        assert!(WorkerConfig::from_map(&vars(&[
            ("DATABASE_URL", "postgres://localhost/matrix"),
            ("WORKER_TICK_SECS", "0"),
        ]))
        .is_err());
        assert!(WorkerConfig::from_map(&vars(&[
            ("DATABASE_URL", "postgres://localhost/matrix"),
            ("NOTIFICATION_RETENTION_DAYS", "a month"),
        ]))
        .is_err());
    }
}
