/// Cart and wishlist endpoints
///
/// Every cart mutation returns the whole cart with its summary (subtotal,
/// flat shipping, 10% tax, total).
///
/// - `GET/POST/DELETE /api/cart`, `PUT/DELETE /api/cart/:item_id`
/// - `GET/POST /api/wishlist`, `DELETE /api/wishlist/:item_id`
/// - `POST /api/wishlist/:item_id/move-to-cart`

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use matrix_shared::{
    auth::middleware::AuthContext,
    models::{
        cart::{Cart, CartItem, WishlistItem},
        product::Product,
    },
};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct AddToCartRequest {
    pub product_id: Uuid,

    #[serde(default = "default_quantity")]
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,

    /// Variant selection, e.g. `{"id": "42-blue", "size": "42"}`
    pub variant: Option<JsonValue>,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCartItemRequest {
    #[validate(range(min = 0, message = "Quantity cannot be negative"))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct AddToWishlistRequest {
    pub product_id: Uuid,
}

fn not_enough_stock() -> ApiError {
    ApiError::BadRequest("Not enough stock".to_string())
}

async fn load_cart(state: &AppState, user_id: Uuid) -> ApiResult<Json<Cart>> {
    Ok(Json(Cart::new(CartItem::list(&state.db, user_id).await?)))
}

/// Adds `quantity` of a product to the cart line for its variant
async fn add_line(
    state: &AppState,
    user_id: Uuid,
    product_id: Uuid,
    quantity: i32,
    variant: Option<JsonValue>,
) -> ApiResult<()> {
    let product = Product::find_by_id(&state.db, product_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Product"))?;

    let current = CartItem::find_line(&state.db, user_id, product_id, variant.as_ref())
        .await?
        .map(|line| line.quantity)
        .unwrap_or(0);

    let requested = current.saturating_add(quantity);
    if requested > product.stock {
        return Err(not_enough_stock());
    }

    CartItem::upsert(&state.db, user_id, product_id, requested, variant).await?;
    Ok(())
}

pub async fn get_cart(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Cart>> {
    load_cart(&state, auth.user_id).await
}

pub async fn add_to_cart(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<AddToCartRequest>,
) -> ApiResult<Json<Cart>> {
    req.validate()?;
    add_line(&state, auth.user_id, req.product_id, req.quantity, req.variant).await?;
    load_cart(&state, auth.user_id).await
}

/// Sets a line's quantity; zero removes the line
pub async fn update_cart_item(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(item_id): Path<Uuid>,
    Json(req): Json<UpdateCartItemRequest>,
) -> ApiResult<Json<Cart>> {
    req.validate()?;

    let item = CartItem::find(&state.db, auth.user_id, item_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Cart item"))?;

    if req.quantity == 0 {
        CartItem::remove(&state.db, auth.user_id, item.id).await?;
    } else {
        if req.quantity > item.stock {
            return Err(not_enough_stock());
        }
        CartItem::set_quantity(&state.db, auth.user_id, item.id, req.quantity).await?;
    }

    load_cart(&state, auth.user_id).await
}

pub async fn remove_cart_item(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(item_id): Path<Uuid>,
) -> ApiResult<Json<Cart>> {
    if !CartItem::remove(&state.db, auth.user_id, item_id).await? {
        return Err(ApiError::not_found("Cart item"));
    }
    load_cart(&state, auth.user_id).await
}

pub async fn clear_cart(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Cart>> {
    let removed = CartItem::clear(&state.db, auth.user_id).await?;
    tracing::debug!(user_id = %auth.user_id, removed, "Cart cleared");
    load_cart(&state, auth.user_id).await
}

pub async fn get_wishlist(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<WishlistItem>>> {
    Ok(Json(WishlistItem::list(&state.db, auth.user_id).await?))
}

/// Adds a product to the wishlist; adding it again is a no-op
pub async fn add_to_wishlist(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<AddToWishlistRequest>,
) -> ApiResult<(StatusCode, Json<WishlistItem>)> {
    Product::find_by_id(&state.db, req.product_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Product"))?;

    let item = WishlistItem::add(&state.db, auth.user_id, req.product_id).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn remove_from_wishlist(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(item_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !WishlistItem::remove(&state.db, auth.user_id, item_id).await? {
        return Err(ApiError::not_found("Wishlist item"));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Moves one unit of a wishlist product into the cart
pub async fn move_to_cart(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(item_id): Path<Uuid>,
) -> ApiResult<Json<Cart>> {
    let item = WishlistItem::find(&state.db, auth.user_id, item_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Wishlist item"))?;

    add_line(&state, auth.user_id, item.product_id, 1, None).await?;
    WishlistItem::remove(&state.db, auth.user_id, item.id).await?;

    load_cart(&state, auth.user_id).await
}
