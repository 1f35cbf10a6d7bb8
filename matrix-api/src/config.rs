/// Configuration management for the API server
///
/// Loaded from environment variables (and `.env` during development).
///
/// # Environment Variables
///
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 10)
/// - `API_HOST` / `API_PORT`: Bind address (default: 0.0.0.0:8000)
/// - `API_CORS_ORIGINS`: Comma separated origins, `*` for any (default: *)
/// - `API_PRODUCTION`: Enables HSTS (default: false)
/// - `JWT_SECRET`: Token signing key, at least 32 characters (required)
/// - `JWT_ACCESS_TTL_MINUTES` (default: 30), `JWT_REFRESH_TTL_DAYS` (default: 30)
/// - `REDIS_URL`: Enables rate limiting when set
/// - `RATE_LIMIT_PER_MINUTE`: Requests per client on limited routes (default: 20)
/// - `BOOTSTRAP_ADMIN_EMAIL` / `BOOTSTRAP_ADMIN_PASSWORD`: Superadmin seed
/// - `ASSISTANT_API_URL`, `ASSISTANT_API_KEY`, `ASSISTANT_MODEL`: Shopping assistant
/// - `AUTO_APPROVE_SELLERS`: Approve seller applications on submission (default: false)
/// - `PREDICTION_HISTORY_MONTHS`: Months of history behind forecasts (default: 16)
///
/// # Example
///
/// ```no_run
/// use matrix_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use anyhow::Context;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub rate_limit: RateLimitConfig,
    pub bootstrap: Option<BootstrapAdmin>,
    pub assistant: AssistantConfig,
    pub sellers: SellerConfig,
    pub predictions: PredictionConfig,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Allowed CORS origins; `*` allows any origin
    pub cors_origins: Vec<String>,

    /// Production mode sends HSTS
    pub production: bool,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Signing key
    ///
    /// Generate with: `openssl rand -hex 32`
    pub secret: String,

    pub access_ttl_minutes: i64,

    pub refresh_ttl_days: i64,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Rate limiting is off without Redis
    pub redis_url: Option<String>,

    pub per_minute: u32,
}

#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// Base URL of an OpenAI-compatible API, e.g. `https://api.openai.com/v1`
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
}

impl AssistantConfig {
    /// Both URL and key are needed to call the completion endpoint
    pub fn is_configured(&self) -> bool {
        self.api_url.is_some() && self.api_key.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct SellerConfig {
    /// Approve applications immediately instead of waiting for an admin
    pub auto_approve: bool,
}

#[derive(Debug, Clone)]
pub struct PredictionConfig {
    pub history_months: u32,
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value cannot
    /// be parsed.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds configuration from key/value pairs
    pub fn from_map(vars: &HashMap<String, String>) -> anyhow::Result<Self> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let jwt_secret = get("JWT_SECRET")
            .ok_or_else(|| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;
        if jwt_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters long");
        }

        let cors_origins = get("API_CORS_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let bootstrap = match (get("BOOTSTRAP_ADMIN_EMAIL"), get("BOOTSTRAP_ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(BootstrapAdmin { email, password }),
            (None, None) => None,
            _ => anyhow::bail!(
                "BOOTSTRAP_ADMIN_EMAIL and BOOTSTRAP_ADMIN_PASSWORD must be set together"
            ),
        };

        Ok(Self {
            api: ApiConfig {
                host: get("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&get, "API_PORT", 8000)?,
                cors_origins,
                production: parse_or(&get, "API_PRODUCTION", false)?,
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", 10)?,
            },
            jwt: JwtConfig {
                secret: jwt_secret,
                access_ttl_minutes: parse_or(&get, "JWT_ACCESS_TTL_MINUTES", 30)?,
                refresh_ttl_days: parse_or(&get, "JWT_REFRESH_TTL_DAYS", 30)?,
            },
            rate_limit: RateLimitConfig {
                redis_url: get("REDIS_URL"),
                per_minute: parse_or(&get, "RATE_LIMIT_PER_MINUTE", 20)?,
            },
            bootstrap,
            assistant: AssistantConfig {
                api_url: get("ASSISTANT_API_URL"),
                api_key: get("ASSISTANT_API_KEY"),
                model: get("ASSISTANT_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            },
            sellers: SellerConfig {
                auto_approve: parse_or(&get, "AUTO_APPROVE_SELLERS", false)?,
            },
            predictions: PredictionConfig {
                history_months: parse_or(&get, "PREDICTION_HISTORY_MONTHS", 16)?,
            },
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    pub fn access_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.jwt.access_ttl_minutes)
    }

    pub fn refresh_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.jwt.refresh_ttl_days)
    }

    /// Pool settings for the shared database layer
    pub fn pool_config(&self) -> matrix_shared::db::pool::DatabaseConfig {
        matrix_shared::db::pool::DatabaseConfig {
            url: self.database.url.clone(),
            max_connections: self.database.max_connections,
            ..Default::default()
        }
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        let mut map: HashMap<String, String> = [
            ("DATABASE_URL", "postgresql://localhost/matrix_test"),
            ("JWT_SECRET", "test-secret-key-at-least-32-bytes-long"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        for (k, v) in pairs {
            map.insert(k.to_string(), v.to_string());
        }
        map
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_map(&vars(&[])).unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:8000");
        assert_eq!(config.api.cors_origins, vec!["*".to_string()]);
        assert!(!config.api.production);
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.access_ttl(), chrono::Duration::minutes(30));
        assert_eq!(config.refresh_ttl(), chrono::Duration::days(30));
        assert!(config.rate_limit.redis_url.is_none());
        assert_eq!(config.rate_limit.per_minute, 20);
        assert!(config.bootstrap.is_none());
        assert!(!config.assistant.is_configured());
        assert!(!config.sellers.auto_approve);
        assert_eq!(config.predictions.history_months, 16);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_map(&vars(&[
            ("API_PORT", "9000"),
            ("API_CORS_ORIGINS", "https://shop.example.com, https://admin.example.com"),
            ("REDIS_URL", "redis://localhost:6379"),
            ("AUTO_APPROVE_SELLERS", "true"),
            ("BOOTSTRAP_ADMIN_EMAIL", "root@example.com"),
            ("BOOTSTRAP_ADMIN_PASSWORD", "Sup3rSecret"),
        ]))
        .unwrap();

        assert_eq!(config.api.port, 9000);
        assert_eq!(config.api.cors_origins.len(), 2);
        assert_eq!(config.api.cors_origins[1], "https://admin.example.com");
        assert!(config.rate_limit.redis_url.is_some());
        assert!(config.sellers.auto_approve);
        assert_eq!(config.bootstrap.unwrap().email, "root@example.com");
    }

    #[test]
    fn test_missing_and_invalid_values() {
        let mut missing = vars(&[]);
        missing.remove("DATABASE_URL");
        assert!(Config::from_map(&missing).is_err());

        assert!(Config::from_map(&vars(&[("JWT_SECRET", "short")])).is_err());
        assert!(Config::from_map(&vars(&[("API_PORT", "eighty")])).is_err());
        assert!(Config::from_map(&vars(&[("BOOTSTRAP_ADMIN_EMAIL", "a@b.c")])).is_err());
    }
}
