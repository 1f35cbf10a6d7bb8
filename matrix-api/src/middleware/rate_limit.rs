/// Rate limiting for unauthenticated and costly routes
///
/// Applied to registration, login and the shopping assistant. Requests are
/// keyed by client address: the socket peer when the server was started with
/// connect info, else the first `X-Forwarded-For` hop.
///
/// State lives in Redis (see `matrix_shared::redis::rate_limit`), so every
/// API instance shares one bucket per client. Without `REDIS_URL` the layer
/// passes everything through. Redis failures fail open with a warning.
///
/// # Headers
///
/// - `X-RateLimit-Limit`: bucket capacity
/// - `X-RateLimit-Remaining`: tokens left
/// - `Retry-After`: seconds to wait (429 only)

use crate::app::AppState;
use crate::error::ApiError;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;

/// Identifies the caller for bucketing
pub fn client_key(request: &Request) -> String {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }

    forwarded_for(request.headers()).unwrap_or_else(|| "unknown".to_string())
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|hop| hop.trim().to_string())
        .filter(|hop| !hop.is_empty())
}

pub async fn rate_limit_layer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(limiter) = state.rate_limiter.as_ref() else {
        return Ok(next.run(request).await);
    };

    let key = format!("{}:{}", request.uri().path(), client_key(&request));

    let decision = match limiter.check(&key).await {
        Ok(decision) => decision,
        Err(e) => {
            tracing::warn!(error = %e, "Rate limit check failed, allowing request");
            return Ok(next.run(request).await);
        }
    };

    if !decision.allowed {
        tracing::info!(key = %key, retry_after = decision.retry_after, "Rate limit exceeded");
        return Err(ApiError::RateLimitExceeded {
            retry_after: decision.retry_after,
            message: format!(
                "Rate limit exceeded. Try again in {} seconds",
                decision.retry_after
            ),
        });
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Limit", HeaderValue::from(limiter.limit().capacity));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(decision.remaining));

    Ok(response)
}
