/// Application state and router builder
///
/// # Example
///
/// ```no_run
/// use matrix_api::{app::AppState, config::Config};
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let state = AppState::new(pool, config);
/// let app = matrix_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{
    assistant::AssistantClient, config::Config, middleware::rate_limit::rate_limit_layer,
    middleware::security::SecurityHeadersLayer, routes,
};
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method},
    middleware::{from_fn_with_state, Next},
    response::Response,
    routing::{get, post, put},
    Router,
};
use matrix_shared::{
    auth::middleware::{jwt_auth_middleware, AuthError},
    events::EventHub,
    redis::{RateLimit, RateLimiter, RedisClient},
};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// Cloned for each request handler via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,

    pub config: Arc<Config>,

    /// Live notifications and chat messages for SSE subscribers
    pub events: EventHub,

    /// Present when `REDIS_URL` is configured and reachable
    pub redis: Option<RedisClient>,

    pub rate_limiter: Option<RateLimiter>,

    /// Present when the assistant endpoint and key are configured
    pub assistant: Option<AssistantClient>,
}

impl AppState {
    pub fn new(db: PgPool, config: Config) -> Self {
        Self {
            db,
            config: Arc::new(config),
            events: EventHub::default(),
            redis: None,
            rate_limiter: None,
            assistant: None,
        }
    }

    /// Enables Redis-backed rate limiting
    pub fn with_redis(mut self, client: RedisClient) -> Self {
        let limit = RateLimit::per_minute(self.config.rate_limit.per_minute);
        self.rate_limiter = Some(RateLimiter::new(client.clone(), limit));
        self.redis = Some(client);
        self
    }

    pub fn with_assistant(mut self, client: AssistantClient) -> Self {
        self.assistant = Some(client);
        self
    }

    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Layout
///
/// ```text
/// /                              welcome (public)
/// /health                        health check (public)
/// /api/users/register|login      rate limited, public
/// /api/users/refresh             public
/// /api/products[/...] (GET)      catalog, public
/// /api/orders/track/:number      public
/// /api/chatbot/chat              rate limited, public
/// /api/...                       everything else requires a bearer token
/// ```
///
/// # Middleware stack (outermost first)
///
/// 1. Security headers
/// 2. CORS
/// 3. Compression
/// 4. Request tracing
/// 5. Per-route: rate limiting or JWT authentication
pub fn build_router(state: AppState) -> Router {
    let limited_routes = Router::new()
        .route("/users/register", post(routes::users::register))
        .route("/users/login", post(routes::users::login))
        .route("/chatbot/chat", post(routes::chatbot::chat))
        .layer(from_fn_with_state(state.clone(), rate_limit_layer));

    let public_routes = Router::new()
        .route("/users/refresh", post(routes::users::refresh))
        .route("/products", get(routes::products::list_products))
        .route("/products/categories", get(routes::products::list_categories))
        .route("/products/:id", get(routes::products::get_product))
        .route("/products/:id/reviews", get(routes::products::list_reviews))
        .route("/orders/track/:order_number", get(routes::orders::track_order))
        .route("/chatbot/health", get(routes::chatbot::health));

    let protected_routes = Router::new()
        // accounts
        .route("/users/me", get(routes::users::me).put(routes::users::update_me))
        .route("/users/sellers", get(routes::users::list_sellers))
        .route("/users/seller/:id/revenue", get(routes::users::seller_revenue))
        .route("/users/become-seller", post(routes::users::become_seller))
        // seller applications
        .route("/admin/seller-applications", get(routes::admin::list_applications))
        .route(
            "/admin/seller-applications/:id/approve",
            post(routes::admin::approve_application),
        )
        .route(
            "/admin/seller-applications/:id/reject",
            post(routes::admin::reject_application),
        )
        // catalog
        .route("/products", post(routes::products::create_product))
        .route(
            "/products/:id",
            put(routes::products::update_product).delete(routes::products::delete_product),
        )
        .route("/products/:id/reviews", post(routes::products::create_review))
        // cart and wishlist
        .route(
            "/cart",
            get(routes::cart::get_cart)
                .post(routes::cart::add_to_cart)
                .delete(routes::cart::clear_cart),
        )
        .route(
            "/cart/:item_id",
            put(routes::cart::update_cart_item).delete(routes::cart::remove_cart_item),
        )
        .route(
            "/wishlist",
            get(routes::cart::get_wishlist).post(routes::cart::add_to_wishlist),
        )
        .route(
            "/wishlist/:item_id",
            axum::routing::delete(routes::cart::remove_from_wishlist),
        )
        .route("/wishlist/:item_id/move-to-cart", post(routes::cart::move_to_cart))
        // orders
        .route(
            "/orders",
            get(routes::orders::list_orders).post(routes::orders::create_order),
        )
        .route("/orders/count", get(routes::orders::count_orders))
        .route("/orders/:id", get(routes::orders::get_order))
        .route("/orders/:id/status", put(routes::orders::update_order_status))
        // payments and payouts
        .route("/payments/process", post(routes::payments::process_payment))
        .route("/payments", get(routes::payments::list_payments))
        .route("/payments/:id", get(routes::payments::get_payment))
        .route(
            "/payouts",
            get(routes::payments::list_payouts).post(routes::payments::request_payout),
        )
        .route("/payouts/:id/approve", post(routes::payments::approve_payout))
        .route("/payouts/:id/reject", post(routes::payments::reject_payout))
        // notifications
        .route("/notifications", get(routes::notifications::list_notifications))
        .route("/notifications/stream", get(routes::notifications::stream_notifications))
        .route("/notifications/read-all", put(routes::notifications::mark_all_read))
        .route("/notifications/:id/read", put(routes::notifications::mark_read))
        // chat
        .route(
            "/chat/rooms",
            get(routes::chat::list_rooms).post(routes::chat::create_room),
        )
        .route(
            "/chat/rooms/:id/messages",
            get(routes::chat::list_room_messages).post(routes::chat::post_room_message),
        )
        .route("/chat/rooms/:id/stream", get(routes::chat::stream_room))
        .route(
            "/chat/messages",
            get(routes::chat::list_direct_messages).post(routes::chat::send_direct_message),
        )
        .route("/chat/contacts", get(routes::chat::list_contacts))
        // statistics
        .route("/statistics", get(routes::statistics::get_statistics))
        .route("/statistics/predictions", get(routes::statistics::get_predictions))
        .route("/statistics/history", get(routes::statistics::get_history))
        .route("/statistics/overview", get(routes::statistics::get_overview))
        // predictions
        .route(
            "/predictions/sales/:product_id",
            get(routes::predictions::product_sales_prediction),
        )
        .route(
            "/predictions/sales/seller/:seller_id",
            get(routes::predictions::seller_sales_prediction),
        )
        .route("/seller/predictions/summary", get(routes::predictions::forecast_summary))
        .route(
            "/seller/predictions/top-products/:horizon",
            get(routes::predictions::top_products),
        )
        .route("/seller/predictions/:horizon", get(routes::predictions::forecast))
        .route("/seller/dashboard", get(routes::predictions::dashboard))
        .layer(from_fn_with_state(state.clone(), jwt_auth_layer));

    let api_routes = Router::new()
        .merge(limited_routes)
        .merge(public_routes)
        .merge(protected_routes);

    Router::new()
        .route("/", get(routes::health::root))
        .route("/health", get(routes::health::health_check))
        .nest("/api", api_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CompressionLayer::new())
        .layer(cors_layer(&state.config))
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}

/// Permissive CORS when the origins contain `*`, else an explicit list
fn cors_layer(config: &Config) -> CorsLayer {
    if config.api.cors_origins.iter().any(|origin| origin == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .api
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}

/// Resolves the bearer token into an `AuthContext` request extension
async fn jwt_auth_layer(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    jwt_auth_middleware(state.db.clone(), state.jwt_secret().to_string(), req, next).await
}
