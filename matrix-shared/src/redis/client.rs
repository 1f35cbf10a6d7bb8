/// Redis client wrapper
///
/// Wraps `redis::aio::ConnectionManager`, which reconnects on its own, and
/// adds a PING health check and URL sanitizing for logs. Redis is optional
/// for Matrix Commerce: when `REDIS_URL` is unset the API runs without rate
/// limiting.
///
/// # Example
///
/// ```no_run
/// use matrix_shared::redis::client::{RedisClient, RedisConfig};
///
/// # async fn example() -> anyhow::Result<()> {
/// let client = RedisClient::new(RedisConfig::from_url("redis://localhost:6379")).await?;
///
/// let healthy = client.ping().await?;
/// println!("Redis healthy: {}", healthy);
/// # Ok(())
/// # }
/// ```

use redis::aio::ConnectionManager;
use redis::{Client, RedisError};
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Redis client errors
#[derive(Error, Debug)]
pub enum RedisClientError {
    #[error("Redis connection error: {0}")]
    ConnectionError(String),

    #[error("Redis command error: {0}")]
    CommandError(String),

    #[error("Redis configuration error: {0}")]
    ConfigError(String),

    #[error("Redis command timed out after {0}s")]
    Timeout(u64),
}

impl From<RedisError> for RedisClientError {
    fn from(err: RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() {
            RedisClientError::ConnectionError(err.to_string())
        } else {
            RedisClientError::CommandError(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// `redis://[user:password@]host:port[/db]`
    pub url: String,

    /// Upper bound for a single command, in seconds
    pub command_timeout_secs: u64,
}

impl RedisConfig {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            command_timeout_secs: 2,
        }
    }

    /// Reads `REDIS_URL` and `REDIS_COMMAND_TIMEOUT_SECS` (default 2)
    ///
    /// Returns `None` when `REDIS_URL` is unset or empty.
    pub fn from_env() -> Option<Self> {
        let url = env::var("REDIS_URL").ok().filter(|url| !url.trim().is_empty())?;

        let command_timeout_secs = env::var("REDIS_COMMAND_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(2);

        Some(Self {
            url,
            command_timeout_secs,
        })
    }
}

/// Cloneable Redis handle
#[derive(Clone)]
pub struct RedisClient {
    manager: ConnectionManager,
    config: Arc<RedisConfig>,
}

impl std::fmt::Debug for RedisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisClient")
            .field("url", &sanitize_url(&self.config.url))
            .finish()
    }
}

impl RedisClient {
    /// Connects to Redis
    ///
    /// # Errors
    ///
    /// `ConfigError` for a malformed URL, `ConnectionError` when the server
    /// cannot be reached.
    pub async fn new(config: RedisConfig) -> Result<Self, RedisClientError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| RedisClientError::ConfigError(format!("Invalid Redis URL: {}", e)))?;

        let manager = ConnectionManager::new(client).await.map_err(|e| {
            RedisClientError::ConnectionError(format!("Failed to connect to Redis: {}", e))
        })?;

        tracing::info!(url = %sanitize_url(&config.url), "Redis client connected");

        Ok(Self {
            manager,
            config: Arc::new(config),
        })
    }

    /// Sends PING; `Ok(true)` on PONG
    pub async fn ping(&self) -> Result<bool, RedisClientError> {
        let mut conn = self.manager.clone();

        let reply: String = self
            .with_timeout(redis::cmd("PING").query_async(&mut conn))
            .await?;

        Ok(reply == "PONG")
    }

    /// Runs a Redis future under the configured command timeout
    pub async fn with_timeout<T, F>(&self, fut: F) -> Result<T, RedisClientError>
    where
        F: std::future::Future<Output = Result<T, RedisError>>,
    {
        let secs = self.config.command_timeout_secs;
        tokio::time::timeout(Duration::from_secs(secs), fut)
            .await
            .map_err(|_| RedisClientError::Timeout(secs))?
            .map_err(RedisClientError::from)
    }

    /// Connection handle; clones share one multiplexed connection
    pub fn get_connection(&self) -> ConnectionManager {
        self.manager.clone()
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }
}

/// Replaces credentials in a Redis URL with `***:***`
pub fn sanitize_url(url: &str) -> String {
    if let (Some(at_pos), Some(scheme_end)) = (url.rfind('@'), url.find("://")) {
        if at_pos > scheme_end {
            return format!("{}***:***@{}", &url[..scheme_end + 3], &url[at_pos + 1..]);
        }
    }
    url.to_string()
}
