/// Welcome and health check endpoints
///
/// # Endpoints
///
/// ```text
/// GET /
/// GET /health
/// ```
///
/// # Response
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "database": "connected",
///   "redis": "disabled"
/// }
/// ```
///
/// `status` is `degraded` when the database or a configured Redis is
/// unreachable.

use crate::{app::AppState, error::ApiResult};
use axum::{extract::State, Json};
use matrix_shared::db::pool::health_check as database_health;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct WelcomeResponse {
    pub message: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,

    pub version: String,

    /// `connected` or `disconnected`
    pub database: String,

    /// `connected`, `disconnected`, or `disabled` without `REDIS_URL`
    pub redis: String,
}

pub async fn root() -> Json<WelcomeResponse> {
    Json(WelcomeResponse {
        message: "Welcome to the Matrix Commerce API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let database = match database_health(&state.db).await {
        Ok(()) => "connected",
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            "disconnected"
        }
    };

    let redis = match &state.redis {
        None => "disabled",
        Some(client) => match client.ping().await {
            Ok(true) => "connected",
            Ok(false) => "disconnected",
            Err(e) => {
                tracing::warn!(error = %e, "Redis health check failed");
                "disconnected"
            }
        },
    };

    let healthy = database == "connected" && redis != "disconnected";

    Ok(Json(HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: database.to_string(),
        redis: redis.to_string(),
    }))
}
