/// Notification endpoints
///
/// - `GET /api/notifications?unread_only=&limit=`
/// - `PUT /api/notifications/:id/read`
/// - `PUT /api/notifications/read-all`
/// - `GET /api/notifications/stream` (SSE)
///
/// Admins and superadmins also see broadcast notifications (`user_id` NULL),
/// such as new seller applications.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    Extension, Json,
};
use futures::stream::Stream;
use matrix_shared::{
    auth::middleware::AuthContext,
    events::{LiveEvent, Subscription},
    models::notification::{NewNotification, Notification},
};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use std::{convert::Infallible, time::Duration};
use tokio_stream::StreamExt as _;
use uuid::Uuid;

/// SSE keep-alive interval
pub const KEEP_ALIVE: Duration = Duration::from_secs(25);

const DEFAULT_LIMIT: i64 = 50;

/// Stores a notification and pushes it to live subscribers
pub async fn notify(state: &AppState, notification: NewNotification) -> ApiResult<Notification> {
    let created = Notification::create(&state.db, notification).await?;
    publish(state, created.clone());
    Ok(created)
}

/// Notifies about a change that is already committed
///
/// The change stands even when the notification can't be stored, so a
/// failure is logged and `None` returned instead of failing the request.
pub async fn notify_committed(
    state: &AppState,
    notification: NewNotification,
) -> Option<Notification> {
    let recipient = notification.user_id;
    match notify(state, notification).await {
        Ok(created) => Some(created),
        Err(err) => {
            tracing::warn!(recipient = ?recipient, error = %err, "Failed to store notification");
            None
        }
    }
}

/// Stores a notification inside the caller's transaction
///
/// The caller publishes it with [`publish`] once the transaction commits.
pub async fn store<'e, E>(executor: E, notification: NewNotification) -> ApiResult<Notification>
where
    E: PgExecutor<'e>,
{
    Ok(Notification::create(executor, notification).await?)
}

pub fn publish(state: &AppState, notification: Notification) {
    state.events.publish(LiveEvent::Notification(notification));
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct NotificationList {
    pub notifications: Vec<Notification>,
    pub unread_count: i64,
}

#[derive(Debug, Serialize)]
pub struct MarkAllResponse {
    pub updated: u64,
}

pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<NotificationList>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, 200);

    let notifications = Notification::list_for_user(
        &state.db,
        auth.user_id,
        auth.is_admin(),
        query.unread_only,
        limit,
    )
    .await?;
    let unread_count = Notification::unread_count(&state.db, auth.user_id, auth.is_admin()).await?;

    Ok(Json(NotificationList {
        notifications,
        unread_count,
    }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Notification>> {
    let notification = Notification::mark_read(&state.db, id, auth.user_id, auth.is_admin())
        .await?
        .ok_or_else(|| ApiError::not_found("Notification"))?;

    Ok(Json(notification))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<MarkAllResponse>> {
    let updated = Notification::mark_all_read(&state.db, auth.user_id, auth.is_admin()).await?;
    Ok(Json(MarkAllResponse { updated }))
}

/// Streams the caller's notifications and direct messages
pub async fn stream_notifications(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = Subscription::User {
        user_id: auth.user_id,
        admin: auth.is_admin(),
    };

    tracing::debug!(user_id = %auth.user_id, "Notification stream opened");

    Sse::new(sse_events(&state, subscription)).keep_alive(KeepAlive::new().interval(KEEP_ALIVE))
}

/// Live events for `subscription` as SSE frames
pub fn sse_events(
    state: &AppState,
    subscription: Subscription,
) -> impl Stream<Item = Result<Event, Infallible>> {
    state.events.stream(subscription).map(|event| {
        let frame = Event::default().event(event.name());
        let frame = match event.as_ref() {
            LiveEvent::ChatMessage(message) => frame.json_data(message),
            LiveEvent::Notification(notification) => frame.json_data(notification),
        };
        Ok(frame.unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to encode live event");
            Event::default().comment("encoding error")
        }))
    })
}
