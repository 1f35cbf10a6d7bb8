//! # Matrix Commerce API Server
//!
//! Storefront, seller analytics and messaging API.
//!
//! ## Startup
//!
//! 1. Load configuration from the environment (and `.env`)
//! 2. Connect the database pool and apply migrations
//! 3. Seed the superadmin when `BOOTSTRAP_ADMIN_*` is set
//! 4. Connect Redis for rate limiting when `REDIS_URL` is set
//! 5. Configure the shopping assistant when its endpoint is set
//! 6. Serve until Ctrl+C
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p matrix-api
//! ```

use matrix_api::{
    app::{build_router, AppState},
    assistant::AssistantClient,
    bootstrap::ensure_superadmin,
    config::Config,
};
use matrix_shared::{
    db::{migrations::run_migrations, pool::create_pool},
    redis::client::{RedisClient, RedisConfig},
};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "matrix_api=debug,tower_http=debug".into());

    let json = std::env::var("LOG_FORMAT")
        .map(|f| f.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing();

    tracing::info!(
        "Matrix Commerce API v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let pool = create_pool(config.pool_config()).await?;
    run_migrations(&pool).await?;

    if let Some(admin) = &config.bootstrap {
        let user = ensure_superadmin(&pool, admin).await?;
        tracing::info!(user_id = %user.id, email = %user.email, "Superadmin ready");
    }

    let redis = match &config.rate_limit.redis_url {
        Some(url) => match RedisClient::new(RedisConfig::from_url(url.clone())).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "Redis unavailable, rate limiting disabled");
                None
            }
        },
        None => {
            tracing::info!("REDIS_URL not set, rate limiting disabled");
            None
        }
    };

    let assistant = AssistantClient::from_config(&config.assistant)?;
    if assistant.is_none() {
        tracing::info!("Assistant endpoint not configured, /api/chatbot/chat will return 503");
    }

    let addr: SocketAddr = config.bind_address().parse()?;

    let mut state = AppState::new(pool, config);
    if let Some(client) = redis {
        state = state.with_redis(client);
    }
    if let Some(client) = assistant {
        state = state.with_assistant(client);
    }

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}
