/// Order endpoints
///
/// # Endpoints
///
/// - `POST /api/orders` - Place an order
/// - `GET  /api/orders?skip=&limit=&status=` - Orders visible to the caller
/// - `GET  /api/orders/count?status=` - Count with the same visibility
/// - `GET  /api/orders/:id` - One order
/// - `PUT  /api/orders/:id/status` - Advance the order
/// - `GET  /api/orders/track/:order_number` - Public tracking page
///
/// # Visibility
///
/// Buyers see orders they placed, sellers see orders containing their
/// items, admins and superadmins see everything.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::notifications,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use matrix_shared::{
    auth::middleware::AuthContext,
    models::{
        notification::{NewNotification, NotificationKind},
        order::{
            NewOrderItem, Order, OrderItem, OrderScope, OrderStatus, OrderWithItems,
            StatusUpdate, TrackingEntry,
        },
        user::Role,
    },
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;
use validator::Validate;

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<NewOrderItem>,

    pub shipping_address: JsonValue,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CountQuery {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateStatusRequest {
    pub status: String,

    #[validate(length(max = 255, message = "Location must be at most 255 characters"))]
    pub location: Option<String>,

    pub description: Option<String>,

    #[validate(length(max = 100, message = "Tracking number must be at most 100 characters"))]
    pub tracking_number: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TrackingResponse {
    #[serde(flatten)]
    pub order: OrderWithItems,
    pub tracking_history: Vec<TrackingEntry>,
}

/// Orders the caller is allowed to see
pub fn scope_for(auth: &AuthContext) -> OrderScope {
    match auth.role {
        Role::Admin | Role::Superadmin => OrderScope::All,
        Role::Seller => OrderScope::Seller(auth.user_id),
        Role::Buyer => OrderScope::Buyer(auth.user_id),
    }
}

fn parse_status(raw: Option<&str>) -> ApiResult<Option<OrderStatus>> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<OrderStatus>().map_err(ApiError::BadRequest))
        .transpose()
}

fn can_view(auth: &AuthContext, order: &OrderWithItems) -> bool {
    auth.is_admin() || order.order.user_id == auth.user_id || order.has_seller(auth.user_id)
}

/// Places an order
///
/// Duplicate product lines are merged. Each seller in the order gets a
/// `new_order` notification.
///
/// # Errors
///
/// - `400`: no items, bad quantity, or not enough stock
/// - `404`: unknown product
pub async fn create_order(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateOrderRequest>,
) -> ApiResult<(StatusCode, Json<OrderWithItems>)> {
    let placed = Order::create(&state.db, auth.user_id, &req.items, req.shipping_address).await?;

    for seller_id in placed.seller_ids() {
        notifications::notify_committed(
            &state,
            NewNotification::to_user(
                seller_id,
                NotificationKind::NewOrder,
                "New Order",
                format!("You have received a new order #{}", placed.order.order_number),
            )
            .with_data(json!({
                "order_id": placed.order.id,
                "order_number": placed.order.order_number,
            })),
        )
        .await;
    }

    Ok((StatusCode::CREATED, Json(placed)))
}

pub async fn list_orders(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ListOrdersQuery>,
) -> ApiResult<Json<Vec<OrderWithItems>>> {
    let status = parse_status(query.status.as_deref())?;
    let skip = query.skip.unwrap_or(0).max(0);
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let orders = Order::list(&state.db, scope_for(&auth), status, skip, limit).await?;
    Ok(Json(orders))
}

pub async fn count_orders(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<CountQuery>,
) -> ApiResult<Json<CountResponse>> {
    let status = parse_status(query.status.as_deref())?;
    let count = Order::count(&state.db, scope_for(&auth), status).await?;
    Ok(Json(CountResponse { count }))
}

pub async fn get_order(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<OrderWithItems>> {
    let order = Order::with_items(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Order"))?;

    if !can_view(&auth, &order) {
        return Err(ApiError::forbidden());
    }

    Ok(Json(order))
}

/// Moves an order to a new status
///
/// Allowed for a seller of one of the items, admins and superadmins. The
/// buyer gets an `order_status` notification.
///
/// # Errors
///
/// - `400`: unknown status or a transition out of a terminal state
/// - `403`: caller is not a seller in this order nor an admin
pub async fn update_order_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> ApiResult<Json<OrderWithItems>> {
    req.validate()?;
    let target: OrderStatus = req.status.trim().parse().map_err(ApiError::BadRequest)?;

    let existing = Order::with_items(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Order"))?;

    if !auth.is_admin() && !existing.has_seller(auth.user_id) {
        return Err(ApiError::forbidden());
    }

    let updated = Order::update_status(
        &state.db,
        id,
        target,
        StatusUpdate {
            location: req.location,
            description: req.description,
            tracking_number: req.tracking_number,
        },
    )
    .await?;

    notifications::notify_committed(
        &state,
        NewNotification::to_user(
            updated.order.user_id,
            NotificationKind::OrderStatus,
            "Order Status Update",
            format!(
                "Your order #{} has been updated to: {}",
                updated.order.order_number,
                target.as_str()
            ),
        )
        .with_data(json!({
            "order_id": updated.order.id,
            "status": target,
        })),
    )
    .await;

    Ok(Json(updated))
}

/// Public tracking by order number
pub async fn track_order(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> ApiResult<Json<TrackingResponse>> {
    let order = Order::find_by_number(&state.db, order_number.trim())
        .await?
        .ok_or_else(|| ApiError::not_found("Order"))?;

    let items = OrderItem::list_for_order(&state.db, order.id).await?;
    let tracking_history = TrackingEntry::list_for_order(&state.db, order.id).await?;

    Ok(Json(TrackingResponse {
        order: OrderWithItems { order, items },
        tracking_history,
    }))
}
