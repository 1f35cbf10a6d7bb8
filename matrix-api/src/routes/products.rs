/// Catalog and review endpoints
///
/// # Endpoints
///
/// - `GET    /api/products` - Filtered, paginated listing (public)
/// - `GET    /api/products/categories` - Categories with counts (public)
/// - `GET    /api/products/:id` - Product with seller; counts a view (public)
/// - `POST   /api/products` - Create (seller, superadmin)
/// - `PUT    /api/products/:id` - Update (owner, superadmin)
/// - `DELETE /api/products/:id` - Delete (owner, superadmin)
/// - `GET    /api/products/:id/reviews` - Reviews and rating summary (public)
/// - `POST   /api/products/:id/reviews` - Add a review, one per user

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use matrix_shared::{
    auth::{
        authorization::{require_any_role, require_owner_or_role},
        middleware::AuthContext,
    },
    models::{
        product::{CategoryCount, CreateProduct, Product, ProductFilter, UpdateProduct},
        review::{summarize, CreateReview, RatingSummary, Review},
        user::{Role, User, UserSummary},
    },
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1 to 255 characters"))]
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub price: Decimal,

    #[validate(length(min = 1, max = 100, message = "Category is required"))]
    pub category: String,

    #[validate(url(message = "Invalid image URL"))]
    pub image_url: Option<String>,

    #[serde(default)]
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: i32,

    pub brand: Option<String>,
    pub sport_type: Option<String>,
    pub sku: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1 to 255 characters"))]
    pub name: Option<String>,

    pub description: Option<String>,

    pub price: Option<Decimal>,

    #[validate(length(min = 1, max = 100, message = "Category cannot be empty"))]
    pub category: Option<String>,

    #[validate(url(message = "Invalid image URL"))]
    pub image_url: Option<String>,

    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: Option<i32>,

    pub brand: Option<String>,
    pub sport_type: Option<String>,
    pub sku: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReviewRequest {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i16,

    #[validate(length(max = 2000, message = "Comment must be at most 2000 characters"))]
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub seller: Option<UserSummary>,
}

#[derive(Debug, Serialize)]
pub struct ProductReviews {
    pub reviews: Vec<Review>,
    pub summary: RatingSummary,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

fn ensure_positive_price(price: Decimal) -> ApiResult<()> {
    if price <= Decimal::ZERO {
        return Err(ApiError::BadRequest("Price must be greater than 0".to_string()));
    }
    Ok(())
}

async fn load_product(state: &AppState, id: Uuid) -> ApiResult<Product> {
    Product::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Product"))
}

/// Lists products, newest first
///
/// `search` matches name and description case-insensitively; `limit` is
/// clamped to 1..=100.
pub async fn list_products(
    State(state): State<AppState>,
    Query(filter): Query<ProductFilter>,
) -> ApiResult<Json<Vec<Product>>> {
    Ok(Json(Product::list(&state.db, &filter).await?))
}

pub async fn list_categories(State(state): State<AppState>) -> ApiResult<Json<Vec<CategoryCount>>> {
    Ok(Json(Product::categories(&state.db).await?))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ProductDetail>> {
    let mut product = load_product(&state, id).await?;

    Product::increment_views(&state.db, id).await?;
    product.views_count += 1;

    let seller = User::find_by_id(&state.db, product.seller_id)
        .await?
        .map(|u| u.summary());

    Ok(Json(ProductDetail { product, seller }))
}

pub async fn create_product(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateProductRequest>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    require_any_role(&auth, &[Role::Seller, Role::Superadmin])?;
    req.validate()?;
    ensure_positive_price(req.price)?;

    let product = Product::create(
        &state.db,
        CreateProduct {
            seller_id: auth.user_id,
            name: req.name.trim().to_string(),
            description: req.description,
            price: req.price,
            category: req.category.trim().to_string(),
            image_url: req.image_url,
            stock: req.stock,
            brand: req.brand,
            sport_type: req.sport_type,
            sku: req.sku,
        },
    )
    .await?;

    tracing::info!(product_id = %product.id, seller_id = %auth.user_id, "Product created");

    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn update_product(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateProductRequest>,
) -> ApiResult<Json<Product>> {
    req.validate()?;
    if let Some(price) = req.price {
        ensure_positive_price(price)?;
    }

    let existing = load_product(&state, id).await?;
    require_owner_or_role(&auth, existing.seller_id, &[Role::Superadmin])?;

    let product = Product::update(
        &state.db,
        id,
        UpdateProduct {
            name: req.name,
            description: req.description,
            price: req.price,
            category: req.category,
            image_url: req.image_url,
            stock: req.stock,
            brand: req.brand,
            sport_type: req.sport_type,
            sku: req.sku,
        },
    )
    .await?
    .ok_or_else(|| ApiError::not_found("Product"))?;

    Ok(Json(product))
}

pub async fn delete_product(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    let existing = load_product(&state, id).await?;
    require_owner_or_role(&auth, existing.seller_id, &[Role::Superadmin])?;

    if !Product::delete(&state.db, id).await? {
        return Err(ApiError::not_found("Product"));
    }

    tracing::info!(product_id = %id, deleted_by = %auth.user_id, "Product deleted");

    Ok(Json(MessageResponse {
        message: "Product deleted successfully".to_string(),
    }))
}

pub async fn list_reviews(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ProductReviews>> {
    load_product(&state, id).await?;

    let reviews = Review::list_for_product(&state.db, id).await?;
    let summary = summarize(&reviews);

    Ok(Json(ProductReviews { reviews, summary }))
}

/// Adds a review
///
/// # Errors
///
/// - `404`: unknown product
/// - `409`: the user already reviewed this product
pub async fn create_review(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateReviewRequest>,
) -> ApiResult<(StatusCode, Json<Review>)> {
    req.validate()?;
    load_product(&state, id).await?;

    let review = Review::create(
        &state.db,
        CreateReview {
            product_id: id,
            user_id: auth.user_id,
            rating: req.rating,
            comment: req.comment.trim().to_string(),
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(review)))
}
