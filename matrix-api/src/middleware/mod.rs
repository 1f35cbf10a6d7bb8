/// Middleware for the API server
///
/// - `security`: security response headers
/// - `rate_limit`: Redis token bucket per client address

pub mod rate_limit;
pub mod security;
