/// Payments and seller payouts
///
/// Payments are recorded, not charged: a payment for the exact order total
/// marks the order paid and moves a pending order to processing.
///
/// # Endpoints
///
/// - `POST /api/payments/process` - Pay for one's own order
/// - `GET  /api/payments` / `GET /api/payments/:id`
/// - `POST /api/payouts` - Seller requests a payout
/// - `GET  /api/payouts` - Own requests, or all for admins
/// - `POST /api/payouts/:id/approve|reject` - Superadmin decision

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
        authorization::{require_role, require_self_or_role},
        middleware::AuthContext,
    },
    models::{
        payment::{Payment, PayoutRequest},
        user::Role,
    },
};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct ProcessPaymentRequest {
    pub order_id: Uuid,

    pub amount: Decimal,

    #[validate(length(min = 1, max = 50, message = "Payment method is required"))]
    pub payment_method: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PayoutRequestBody {
    pub amount: Decimal,
}

/// Records a payment for the caller's order
///
/// # Errors
///
/// - `400`: amount differs from the order total
/// - `403`: not the buyer of the order
/// - `404`: unknown order
/// - `409`: order already paid
pub async fn process_payment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<ProcessPaymentRequest>,
) -> ApiResult<(StatusCode, Json<Payment>)> {
    req.validate()?;

    let payment = Payment::record(
        &state.db,
        req.order_id,
        auth.user_id,
        req.amount,
        req.payment_method.trim(),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(payment)))
}

pub async fn list_payments(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Vec<Payment>>> {
    let payer = (!auth.is_admin()).then_some(auth.user_id);
    let skip = query.skip.unwrap_or(0).max(0);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);

    Ok(Json(Payment::list(&state.db, payer, skip, limit).await?))
}

pub async fn get_payment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Payment>> {
    let payment = Payment::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Payment"))?;

    require_self_or_role(&auth, payment.user_id, &[Role::Admin, Role::Superadmin])?;

    Ok(Json(payment))
}

/// Requests a payout from the seller's balance
///
/// The amount may not exceed the balance minus payouts still pending.
///
/// # Errors
///
/// - `400`: non-positive amount, or more than is available
pub async fn request_payout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<PayoutRequestBody>,
) -> ApiResult<(StatusCode, Json<PayoutRequest>)> {
    require_role(&auth, Role::Seller)?;

    if req.amount <= Decimal::ZERO {
        return Err(ApiError::BadRequest("Amount must be greater than 0".to_string()));
    }

    let request = PayoutRequest::request(&state.db, auth.user_id, req.amount).await?;

    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn list_payouts(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<PayoutRequest>>> {
    let seller = (!auth.is_admin()).then_some(auth.user_id);
    Ok(Json(PayoutRequest::list(&state.db, seller).await?))
}

pub async fn approve_payout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PayoutRequest>> {
    require_role(&auth, Role::Superadmin)?;
    Ok(Json(PayoutRequest::approve(&state.db, id).await?))
}

pub async fn reject_payout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PayoutRequest>> {
    require_role(&auth, Role::Superadmin)?;
    Ok(Json(PayoutRequest::reject(&state.db, id).await?))
}
