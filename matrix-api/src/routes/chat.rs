/// Chat rooms and direct messages
///
/// # Endpoints
///
/// - `GET/POST /api/chat/rooms`
/// - `GET/POST /api/chat/rooms/:id/messages?since=&limit=`
/// - `GET      /api/chat/rooms/:id/stream` (SSE, event `chat_message`)
/// - `GET/POST /api/chat/messages?other_user_id=&skip=&limit=`
/// - `GET      /api/chat/contacts`
///
/// Room endpoints are restricted to participants. New messages are pushed
/// to live subscribers; the receiver of a direct message also gets a
/// `chat_message` notification.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::notifications::{self, sse_events, KEEP_ALIVE},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use futures::stream::Stream;
use matrix_shared::{
    auth::middleware::AuthContext,
    events::{LiveEvent, Subscription},
    models::{
        chat::{ChatContact, ChatMessage, ChatRoom, DEFAULT_MESSAGE_LIMIT},
        notification::{NewNotification, NotificationKind},
        user::User,
    },
};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use uuid::Uuid;
use validator::Validate;

const MAX_MESSAGE_LIMIT: i64 = 200;

/// Characters of a direct message quoted in its notification
const PREVIEW_CHARS: usize = 80;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRoomRequest {
    #[validate(length(min = 1, max = 100, message = "Room name must be 1 to 100 characters"))]
    pub name: String,

    #[serde(default)]
    pub participants: Vec<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PostMessageRequest {
    #[validate(length(min = 1, max = 5000, message = "Message must be 1 to 5000 characters"))]
    pub content: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DirectMessageRequest {
    pub receiver_id: Uuid,

    #[validate(length(min = 1, max = 5000, message = "Message must be 1 to 5000 characters"))]
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RoomMessagesQuery {
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct DirectMessagesQuery {
    pub other_user_id: Uuid,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

fn message_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_MESSAGE_LIMIT).clamp(1, MAX_MESSAGE_LIMIT)
}

fn preview(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// Loads a room the caller participates in
async fn member_room(state: &AppState, auth: &AuthContext, room_id: Uuid) -> ApiResult<ChatRoom> {
    let room = ChatRoom::find_by_id(&state.db, room_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Chat room"))?;

    if !room.has_participant(auth.user_id) {
        return Err(ApiError::Forbidden(
            "You are not a participant of this room".to_string(),
        ));
    }

    Ok(room)
}

/// Rooms the caller participates in, most recent activity first
pub async fn list_rooms(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<ChatRoom>>> {
    Ok(Json(ChatRoom::list_for_user(&state.db, auth.user_id).await?))
}

pub async fn create_room(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateRoomRequest>,
) -> ApiResult<(StatusCode, Json<ChatRoom>)> {
    req.validate()?;

    let known = User::summaries(&state.db, &req.participants).await?;
    if let Some(missing) = req
        .participants
        .iter()
        .find(|id| !known.iter().any(|u| u.id == **id))
    {
        return Err(ApiError::BadRequest(format!("Unknown participant {}", missing)));
    }

    let room = ChatRoom::create(&state.db, req.name.trim(), auth.user_id, &req.participants).await?;

    tracing::info!(room_id = %room.id, participants = room.participants.len(), "Chat room created");

    Ok((StatusCode::CREATED, Json(room)))
}

pub async fn list_room_messages(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(room_id): Path<Uuid>,
    Query(query): Query<RoomMessagesQuery>,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    member_room(&state, &auth, room_id).await?;

    let messages =
        ChatMessage::list_room(&state.db, room_id, query.since, message_limit(query.limit)).await?;
    Ok(Json(messages))
}

pub async fn post_room_message(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(room_id): Path<Uuid>,
    Json(req): Json<PostMessageRequest>,
) -> ApiResult<(StatusCode, Json<ChatMessage>)> {
    req.validate()?;
    member_room(&state, &auth, room_id).await?;

    let message =
        ChatMessage::post_to_room(&state.db, room_id, auth.user_id, req.content.trim(), false)
            .await?;

    state.events.publish(LiveEvent::ChatMessage(message.clone()));

    Ok((StatusCode::CREATED, Json(message)))
}

/// Streams new messages posted to a room
pub async fn stream_room(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(room_id): Path<Uuid>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    member_room(&state, &auth, room_id).await?;

    tracing::debug!(room_id = %room_id, user_id = %auth.user_id, "Room stream opened");

    Ok(Sse::new(sse_events(&state, Subscription::Room(room_id)))
        .keep_alive(KeepAlive::new().interval(KEEP_ALIVE)))
}

pub async fn send_direct_message(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<DirectMessageRequest>,
) -> ApiResult<(StatusCode, Json<ChatMessage>)> {
    req.validate()?;

    if req.receiver_id == auth.user_id {
        return Err(ApiError::BadRequest(
            "Cannot send a message to yourself".to_string(),
        ));
    }

    User::find_by_id(&state.db, req.receiver_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Receiver"))?;

    let message =
        ChatMessage::send_direct(&state.db, auth.user_id, req.receiver_id, req.content.trim())
            .await?;

    state.events.publish(LiveEvent::ChatMessage(message.clone()));

    notifications::notify_committed(
        &state,
        NewNotification::to_user(
            req.receiver_id,
            NotificationKind::ChatMessage,
            format!("New message from {}", message.sender_name),
            preview(&message.content),
        )
        .with_data(json!({
            "message_id": message.id,
            "sender_id": auth.user_id,
        })),
    )
    .await;

    Ok((StatusCode::CREATED, Json(message)))
}

/// Conversation with another user, newest first
///
/// Marks the other user's messages to the caller as read.
pub async fn list_direct_messages(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<DirectMessagesQuery>,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    let skip = query.skip.unwrap_or(0).max(0);

    let messages = ChatMessage::list_direct(
        &state.db,
        auth.user_id,
        query.other_user_id,
        skip,
        message_limit(query.limit),
    )
    .await?;

    Ok(Json(messages))
}

pub async fn list_contacts(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<ChatContact>>> {
    Ok(Json(ChatMessage::contacts(&state.db, auth.user_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates_long_messages() {
        assert_eq!(preview("See you at the track"), "See you at the track");

        let long = "a".repeat(PREVIEW_CHARS + 5);
        let short = preview(&long);
        assert_eq!(short.chars().count(), PREVIEW_CHARS + 3);
        assert!(short.ends_with("..."));
    }

    #[test]
    fn test_message_limit_bounds() {
        assert_eq!(message_limit(None), DEFAULT_MESSAGE_LIMIT);
        assert_eq!(message_limit(Some(0)), 1);
        assert_eq!(message_limit(Some(10_000)), MAX_MESSAGE_LIMIT);
    }
}
