/// Redis integration
///
/// Redis backs the distributed rate limiter on the public authentication
/// and assistant endpoints. Everything else (live chat and notifications)
/// is served in-process by `events::EventHub`.

pub mod client;
pub mod rate_limit;

pub use client::{RedisClient, RedisClientError, RedisConfig};
pub use rate_limit::{RateLimit, RateLimitDecision, RateLimiter};
