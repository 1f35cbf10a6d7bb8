/// Seller application review
///
/// - `GET  /api/admin/seller-applications?status=pending|approved|rejected`
/// - `POST /api/admin/seller-applications/:id/approve`
/// - `POST /api/admin/seller-applications/:id/reject` `{ "reason": "..." }`
///
/// All endpoints require an admin or superadmin. Only pending applications
/// can be decided.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::notifications,
};
use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use matrix_shared::{
    auth::{authorization::require_admin, middleware::AuthContext},
    models::{
        notification::{NewNotification, NotificationKind},
        seller_application::{ApplicationStatus, SellerApplication, SellerApplicationWithUser},
        user::{Role, User},
    },
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize)]
pub struct ApplicationQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RejectRequest {
    #[validate(length(min = 1, max = 1000, message = "A rejection reason is required"))]
    pub reason: String,
}

pub async fn list_applications(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ApplicationQuery>,
) -> ApiResult<Json<Vec<SellerApplicationWithUser>>> {
    require_admin(&auth)?;

    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::parse::<ApplicationStatus>)
        .transpose()
        .map_err(ApiError::BadRequest)?;

    Ok(Json(SellerApplication::list(&state.db, status).await?))
}

pub async fn approve_application(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SellerApplication>> {
    require_admin(&auth)?;
    Ok(Json(approve(&state, id).await?))
}

pub async fn reject_application(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<RejectRequest>,
) -> ApiResult<Json<SellerApplication>> {
    require_admin(&auth)?;
    req.validate()?;

    ensure_pending(&state, id).await?;

    let mut tx = state.db.begin().await?;

    let application = SellerApplication::reject(&mut *tx, id, req.reason.trim())
        .await?
        .ok_or_else(already_processed)?;

    let notification = notifications::store(
        &mut *tx,
        NewNotification::to_user(
            application.user_id,
            NotificationKind::SellerApplication,
            "Seller Application Rejected",
            format!(
                "Your seller application was rejected: {}",
                req.reason.trim()
            ),
        )
        .with_data(json!({ "application_id": application.id })),
    )
    .await?;

    tx.commit().await?;
    notifications::publish(&state, notification);

    tracing::info!(application_id = %id, reviewer = %auth.user_id, "Seller application rejected");

    Ok(Json(application))
}

/// Approves a pending application and promotes the applicant
///
/// Admin accounts that apply keep their role.
pub(crate) async fn approve(state: &AppState, id: Uuid) -> ApiResult<SellerApplication> {
    ensure_pending(state, id).await?;

    let mut tx = state.db.begin().await?;

    let application = SellerApplication::approve(&mut *tx, id)
        .await?
        .ok_or_else(already_processed)?;

    let applicant = User::find_by_id(&state.db, application.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    if applicant.role == Role::Buyer {
        User::set_role(&mut *tx, applicant.id, Role::Seller).await?;
    }

    let notification = notifications::store(
        &mut *tx,
        NewNotification::to_user(
            application.user_id,
            NotificationKind::SellerApplication,
            "Seller Application Approved",
            "Your seller application has been approved. You can now list products.",
        )
        .with_data(json!({ "application_id": application.id })),
    )
    .await?;

    tx.commit().await?;
    notifications::publish(state, notification);

    tracing::info!(application_id = %id, user_id = %application.user_id, "Seller application approved");

    Ok(application)
}

async fn ensure_pending(state: &AppState, id: Uuid) -> ApiResult<()> {
    let application = SellerApplication::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Application"))?;

    if application.status != ApplicationStatus::Pending {
        return Err(already_processed());
    }

    Ok(())
}

fn already_processed() -> ApiError {
    ApiError::BadRequest("Application has already been processed".to_string())
}
