/// Account endpoints
///
/// # Endpoints
///
/// - `POST /api/users/register` - Create a buyer account and get tokens
/// - `POST /api/users/login` - Exchange credentials for tokens
/// - `POST /api/users/refresh` - New access token from a refresh token
/// - `GET  /api/users/me` / `PUT /api/users/me` - Own profile
/// - `GET  /api/users/sellers` - Seller directory (admins)
/// - `GET  /api/users/seller/:id/revenue` - Seller earnings breakdown
/// - `POST /api/users/become-seller` - Submit a seller application

use crate::{
    app::AppState,
    error::{ApiError, ApiResult, ValidationErrorDetail},
    routes::notifications,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use matrix_shared::{
    auth::{
        authorization::{require_admin, require_self_or_role},
        jwt::{issue_pair, refresh_access_token},
        middleware::AuthContext,
        password::{hash_password, validate_password_strength, verify_password},
    },
    models::{
        notification::{NewNotification, NotificationKind},
        payment::PayoutRequest,
        seller_application::{CreateSellerApplication, SellerApplication},
        statistics::{SalesBasis, SalesStats},
        user::{CreateUser, Role, UpdateUser, User},
    },
    pricing::{platform_fee, seller_earnings},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 3, max = 50, message = "Username must be 3 to 50 characters"))]
    pub username: String,

    pub password: String,

    #[validate(length(max = 100, message = "Name must be at most 100 characters"))]
    pub full_name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Always "bearer"
    pub token_type: &'static str,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 3, max = 50, message = "Username must be 3 to 50 characters"))]
    pub username: Option<String>,

    #[validate(length(max = 100, message = "Name must be at most 100 characters"))]
    pub full_name: Option<String>,

    #[validate(url(message = "Invalid avatar URL"))]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SellerSearchQuery {
    pub search: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SellerRevenue {
    pub seller_id: Uuid,
    pub total_revenue: Decimal,
    pub platform_fee: Decimal,
    pub seller_earnings: Decimal,
    pub current_balance: Decimal,
    pub pending_payouts: Decimal,
    pub total_orders: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BecomeSellerRequest {
    #[validate(length(min = 1, max = 255, message = "Business name is required"))]
    pub business_name: String,

    #[validate(length(min = 1, max = 100, message = "Business type is required"))]
    pub business_type: String,

    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,

    #[validate(length(min = 1, message = "Address is required"))]
    pub address: String,

    #[validate(length(min = 5, max = 32, message = "Invalid phone number"))]
    pub phone: String,

    pub tax_id: Option<String>,

    pub category: Option<String>,
}

/// Issues an access/refresh token pair for `user`
fn issue_tokens(state: &AppState, user: User) -> ApiResult<TokenResponse> {
    let pair = issue_pair(
        user.id,
        user.role,
        state.jwt_secret(),
        state.config.access_ttl(),
        state.config.refresh_ttl(),
    )?;

    Ok(TokenResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        token_type: "bearer",
        user,
    })
}

/// Registers a buyer account
///
/// # Errors
///
/// - `400`: email or username already in use
/// - `422`: invalid fields or weak password
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<TokenResponse>)> {
    req.validate()?;

    validate_password_strength(&req.password).map_err(|message| {
        ApiError::ValidationError(vec![ValidationErrorDetail {
            field: "password".to_string(),
            message,
        }])
    })?;

    let email = req.email.trim().to_string();
    let username = req.username.trim().to_string();

    if User::find_by_email(&state.db, &email).await?.is_some() {
        return Err(ApiError::BadRequest("Email already registered".to_string()));
    }
    if User::find_by_username(&state.db, &username).await?.is_some() {
        return Err(ApiError::BadRequest("Username already taken".to_string()));
    }

    let user = User::create(
        &state.db,
        CreateUser {
            email,
            username,
            password_hash: hash_password(&req.password)?,
            full_name: req.full_name,
            role: Role::Buyer,
        },
    )
    .await?;

    tracing::info!(user_id = %user.id, "User registered");

    Ok((StatusCode::CREATED, Json(issue_tokens(&state, user)?)))
}

/// Logs in with email and password
///
/// # Errors
///
/// - `401`: unknown email or wrong password
/// - `400`: account deactivated
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    req.validate()?;

    let invalid = || ApiError::Unauthorized("Incorrect email or password".to_string());

    let user = User::find_by_email(&state.db, req.email.trim())
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(&req.password, &user.password_hash)? {
        tracing::info!(user_id = %user.id, "Failed login attempt");
        return Err(invalid());
    }

    if !user.is_active {
        return Err(ApiError::BadRequest("Inactive user".to_string()));
    }

    User::update_last_login(&state.db, user.id).await?;

    Ok(Json(issue_tokens(&state, user)?))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    let access_token =
        refresh_access_token(&req.refresh_token, state.jwt_secret(), state.config.access_ttl())?;

    Ok(Json(RefreshResponse {
        access_token,
        token_type: "bearer",
    }))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<User>> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    if !user.is_active {
        return Err(ApiError::BadRequest("Inactive user".to_string()));
    }

    Ok(Json(user))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<Json<User>> {
    req.validate()?;

    let user = User::update(
        &state.db,
        auth.user_id,
        UpdateUser {
            username: req.username.map(|u| u.trim().to_string()),
            full_name: req.full_name,
            avatar_url: req.avatar_url,
        },
    )
    .await?
    .ok_or_else(|| ApiError::not_found("User"))?;

    Ok(Json(user))
}

pub async fn list_sellers(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<SellerSearchQuery>,
) -> ApiResult<Json<Vec<User>>> {
    require_admin(&auth)?;

    let term = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let limit = query.limit.unwrap_or(100).clamp(1, 500);

    Ok(Json(User::search_sellers(&state.db, term, limit).await?))
}

/// Revenue breakdown for a seller
///
/// Revenue counts completed orders only. The platform keeps 10%.
pub async fn seller_revenue(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(seller_id): Path<Uuid>,
) -> ApiResult<Json<SellerRevenue>> {
    require_self_or_role(&auth, seller_id, &[Role::Admin, Role::Superadmin])?;

    let seller = User::find_by_id(&state.db, seller_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Seller"))?;

    let totals =
        SalesStats::totals(&state.db, Some(seller_id), SalesBasis::Completed, None, None).await?;
    let pending_payouts = PayoutRequest::pending_total(&state.db, seller_id).await?;

    Ok(Json(SellerRevenue {
        seller_id,
        total_revenue: totals.revenue,
        platform_fee: platform_fee(totals.revenue),
        seller_earnings: seller_earnings(totals.revenue),
        current_balance: seller.balance,
        pending_payouts,
        total_orders: totals.orders,
    }))
}

/// Submits a seller application
///
/// Admins get a broadcast notification. With `AUTO_APPROVE_SELLERS` the
/// application is approved and the user promoted immediately.
///
/// # Errors
///
/// - `400`: already a seller
/// - `409`: a pending application exists
pub async fn become_seller(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<BecomeSellerRequest>,
) -> ApiResult<(StatusCode, Json<SellerApplication>)> {
    req.validate()?;

    if auth.role == Role::Seller {
        return Err(ApiError::BadRequest("User is already a seller".to_string()));
    }

    let application = SellerApplication::create(
        &state.db,
        CreateSellerApplication {
            user_id: auth.user_id,
            business_name: req.business_name.trim().to_string(),
            business_type: req.business_type,
            category: req.category,
            description: req.description,
            address: req.address,
            phone: req.phone,
            tax_id: req.tax_id,
        },
    )
    .await?;

    tracing::info!(application_id = %application.id, user_id = %auth.user_id, "Seller application submitted");

    notifications::notify_committed(
        &state,
        NewNotification::to_admins(
            NotificationKind::SellerApplication,
            "New Seller Application",
            format!(
                "{} has applied to become a seller",
                application.business_name
            ),
        )
        .with_data(json!({
            "application_id": application.id,
            "user_id": auth.user_id,
        })),
    )
    .await;

    if state.config.sellers.auto_approve {
        let approved = super::admin::approve(&state, application.id).await?;
        return Ok((StatusCode::CREATED, Json(approved)));
    }

    Ok((StatusCode::CREATED, Json(application)))
}
