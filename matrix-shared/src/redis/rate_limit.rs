/// Token-bucket rate limiting in Redis
///
/// Each key holds a hash `{tokens, last_refill}`. A Lua script refills the
/// bucket for the elapsed time and takes one token atomically, so several
/// API instances can share one limit. Keys expire after two idle minutes.
///
/// # Example
///
/// ```no_run
/// use matrix_shared::redis::{RateLimit, RateLimiter, RedisClient, RedisConfig};
///
/// # async fn example() -> anyhow::Result<()> {
/// let client = RedisClient::new(RedisConfig::from_url("redis://localhost:6379")).await?;
/// let limiter = RateLimiter::new(client, RateLimit::per_minute(20));
///
/// let decision = limiter.check("login:203.0.113.7").await?;
/// if !decision.allowed {
///     println!("retry in {}s", decision.retry_after);
/// }
/// # Ok(())
/// # }
/// ```

use std::time::{SystemTime, UNIX_EPOCH};

use super::client::{RedisClient, RedisClientError};

const KEY_PREFIX: &str = "ratelimit";

const TOKEN_BUCKET_SCRIPT: &str = r#"
local key = KEYS[1]
local capacity = tonumber(ARGV[1])
local refill_rate = tonumber(ARGV[2])
local now = tonumber(ARGV[3])

local bucket = redis.call('HMGET', key, 'tokens', 'last_refill')
local tokens = tonumber(bucket[1])
local last_refill = tonumber(bucket[2])

if not tokens then
    tokens = capacity
    last_refill = now
end

local elapsed = math.max(0, now - last_refill)
tokens = math.min(capacity, tokens + (elapsed * refill_rate))

if tokens >= 1 then
    tokens = tokens - 1
    redis.call('HSET', key, 'tokens', tokens, 'last_refill', now)
    redis.call('EXPIRE', key, 120)
    return {1, math.floor(tokens), 0}
else
    redis.call('HSET', key, 'tokens', tokens, 'last_refill', now)
    redis.call('EXPIRE', key, 120)
    return {0, 0, math.ceil((1 - tokens) / refill_rate)}
end
"#;

/// Bucket size and refill rate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimit {
    pub capacity: u32,
    /// Tokens per second
    pub refill_rate: f64,
}

impl RateLimit {
    /// `requests` per minute with an equal burst
    pub fn per_minute(requests: u32) -> Self {
        let requests = requests.max(1);
        Self {
            capacity: requests,
            refill_rate: requests as f64 / 60.0,
        }
    }
}

/// Outcome of one check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Seconds until a token is available; 0 when allowed
    pub retry_after: u64,
}

#[derive(Debug, Clone)]
pub struct RateLimiter {
    client: RedisClient,
    limit: RateLimit,
}

impl RateLimiter {
    pub fn new(client: RedisClient, limit: RateLimit) -> Self {
        Self { client, limit }
    }

    pub fn limit(&self) -> RateLimit {
        self.limit
    }

    /// Takes one token from the bucket named `key`
    pub async fn check(&self, key: &str) -> Result<RateLimitDecision, RedisClientError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        let mut conn = self.client.get_connection();
        let script = redis::Script::new(TOKEN_BUCKET_SCRIPT);
        let mut invocation = script.key(bucket_key(key));
        invocation
            .arg(self.limit.capacity)
            .arg(self.limit.refill_rate)
            .arg(now);

        let reply: Vec<i64> = self
            .client
            .with_timeout(invocation.invoke_async(&mut conn))
            .await?;

        decision_from_reply(&reply)
    }
}

fn bucket_key(key: &str) -> String {
    format!("{}:{}", KEY_PREFIX, key)
}

fn decision_from_reply(reply: &[i64]) -> Result<RateLimitDecision, RedisClientError> {
    match reply {
        [allowed, remaining, retry_after] => Ok(RateLimitDecision {
            allowed: *allowed == 1,
            remaining: (*remaining).max(0) as u32,
            retry_after: (*retry_after).max(0) as u64,
        }),
        other => Err(RedisClientError::CommandError(format!(
            "Unexpected rate limit reply: {:?}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_minute() {
        let limit = RateLimit::per_minute(20);
        assert_eq!(limit.capacity, 20);
        assert!((limit.refill_rate - 0.3333).abs() < 0.001);

        assert_eq!(RateLimit::per_minute(0).capacity, 1);
    }

    #[test]
    fn test_bucket_key() {
        assert_eq!(bucket_key("login:10.0.0.1"), "ratelimit:login:10.0.0.1");
    }

    #[test]
    fn test_decision_from_reply() {
        assert_eq!(
            decision_from_reply(&[1, 19, 0]).unwrap(),
            RateLimitDecision { allowed: true, remaining: 19, retry_after: 0 }
        );
        assert_eq!(
            decision_from_reply(&[0, 0, 3]).unwrap(),
            RateLimitDecision { allowed: false, remaining: 0, retry_after: 3 }
        );
        assert!(decision_from_reply(&[1]).is_err());
    }
}
