/// Chat rooms, room messages and direct messages
///
/// A message belongs either to a room (`room_id`) or to a conversation
/// between two users (`receiver_id`); the table's CHECK constraint enforces
/// exactly one of the two.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE chat_rooms (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name VARCHAR(255) NOT NULL,
///     created_by UUID REFERENCES users(id) ON DELETE SET NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     last_activity_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
///
/// CREATE TABLE chat_room_participants (
///     room_id UUID NOT NULL REFERENCES chat_rooms(id) ON DELETE CASCADE,
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     joined_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     PRIMARY KEY (room_id, user_id)
/// );
///
/// CREATE TABLE chat_messages (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     room_id UUID REFERENCES chat_rooms(id) ON DELETE CASCADE,
///     sender_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     receiver_id UUID REFERENCES users(id) ON DELETE CASCADE,
///     content TEXT NOT NULL,
///     is_system BOOLEAN NOT NULL DEFAULT FALSE,
///     read BOOLEAN NOT NULL DEFAULT FALSE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Default number of messages returned per page
pub const DEFAULT_MESSAGE_LIMIT: i64 = 50;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatRoom {
    pub id: Uuid,
    pub name: String,
    pub created_by: Option<Uuid>,
    pub participants: Vec<Uuid>,
    /// Content of the most recent message
    pub last_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatMessage {
    pub id: Uuid,
    pub room_id: Option<Uuid>,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub receiver_id: Option<Uuid>,
    pub content: String,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
    pub is_system: bool,
    pub read: bool,
}

/// Conversation partner in the direct-message contact list
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatContact {
    pub user_id: Uuid,
    pub username: String,
    pub full_name: Option<String>,
    pub last_message: String,
    pub last_timestamp: DateTime<Utc>,
    pub unread_count: i64,
}

/// Participant list for a new room: creator first, no duplicates
pub fn room_participants(creator: Uuid, requested: &[Uuid]) -> Vec<Uuid> {
    let mut participants = vec![creator];
    for id in requested {
        if !participants.contains(id) {
            participants.push(*id);
        }
    }
    participants
}

const ROOM_SELECT: &str = r#"
    SELECT r.id, r.name, r.created_by,
           COALESCE(
               (SELECT array_agg(p.user_id ORDER BY p.joined_at)
                FROM chat_room_participants p WHERE p.room_id = r.id),
               '{}'
           ) AS participants,
           (SELECT m.content FROM chat_messages m
            WHERE m.room_id = r.id ORDER BY m.created_at DESC LIMIT 1) AS last_message,
           r.created_at, r.last_activity_at
    FROM chat_rooms r
"#;

const MESSAGE_SELECT: &str = r#"
    SELECT m.id, m.room_id, m.sender_id,
           COALESCE(NULLIF(u.full_name, ''), u.username) AS sender_name,
           m.receiver_id, m.content, m.created_at, m.is_system, m.read
    FROM chat_messages m
    JOIN users u ON u.id = m.sender_id
"#;

impl ChatRoom {
    /// Creates a room with the creator and the requested participants
    pub async fn create(
        pool: &PgPool,
        name: &str,
        created_by: Uuid,
        participants: &[Uuid],
    ) -> Result<Self, sqlx::Error> {
        let members = room_participants(created_by, participants);

        let mut tx = pool.begin().await?;

        let (room_id,): (Uuid,) =
            sqlx::query_as("INSERT INTO chat_rooms (name, created_by) VALUES ($1, $2) RETURNING id")
                .bind(name)
                .bind(created_by)
                .fetch_one(&mut *tx)
                .await?;

        sqlx::query(
            r#"
            INSERT INTO chat_room_participants (room_id, user_id)
            SELECT $1, id FROM users WHERE id = ANY($2)
            "#,
        )
        .bind(room_id)
        .bind(&members)
        .execute(&mut *tx)
        .await?;

        let room = sqlx::query_as::<_, ChatRoom>(&format!("{ROOM_SELECT} WHERE r.id = $1"))
            .bind(room_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(room)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ChatRoom>(&format!("{ROOM_SELECT} WHERE r.id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Rooms the user participates in, most recent activity first
    pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ChatRoom>(&format!(
            r#"
            {ROOM_SELECT}
            WHERE EXISTS (
                SELECT 1 FROM chat_room_participants p
                WHERE p.room_id = r.id AND p.user_id = $1
            )
            ORDER BY r.last_activity_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.participants.contains(&user_id)
    }
}

impl ChatMessage {
    /// Posts a message to a room and bumps its activity time
    pub async fn post_to_room(
        pool: &PgPool,
        room_id: Uuid,
        sender_id: Uuid,
        content: &str,
        is_system: bool,
    ) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let (id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO chat_messages (room_id, sender_id, content, is_system)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(room_id)
        .bind(sender_id)
        .bind(content)
        .bind(is_system)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE chat_rooms SET last_activity_at = NOW() WHERE id = $1")
            .bind(room_id)
            .execute(&mut *tx)
            .await?;

        let message = sqlx::query_as::<_, ChatMessage>(&format!("{MESSAGE_SELECT} WHERE m.id = $1"))
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(message)
    }

    /// Room messages in chronological order
    ///
    /// With `since`, the oldest `limit` messages newer than it, so a client
    /// polling with its last timestamp never skips a message. Without
    /// `since`, the latest `limit` messages.
    pub async fn list_room(
        pool: &PgPool,
        room_id: Uuid,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        match since {
            Some(since) => {
                sqlx::query_as::<_, ChatMessage>(&format!(
                    r#"
                    {MESSAGE_SELECT}
                    WHERE m.room_id = $1 AND m.created_at > $2
                    ORDER BY m.created_at ASC
                    LIMIT $3
                    "#
                ))
                .bind(room_id)
                .bind(since)
                .bind(limit)
                .fetch_all(pool)
                .await
            }
            None => {
                let mut latest = sqlx::query_as::<_, ChatMessage>(&format!(
                    r#"
                    {MESSAGE_SELECT}
                    WHERE m.room_id = $1
                    ORDER BY m.created_at DESC
                    LIMIT $2
                    "#
                ))
                .bind(room_id)
                .bind(limit)
                .fetch_all(pool)
                .await?;

                latest.reverse();
                Ok(latest)
            }
        }
    }

    /// Sends a direct message
    pub async fn send_direct(
        pool: &PgPool,
        sender_id: Uuid,
        receiver_id: Uuid,
        content: &str,
    ) -> Result<Self, sqlx::Error> {
        let (id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO chat_messages (sender_id, receiver_id, content)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(sender_id)
        .bind(receiver_id)
        .bind(content)
        .fetch_one(pool)
        .await?;

        sqlx::query_as::<_, ChatMessage>(&format!("{MESSAGE_SELECT} WHERE m.id = $1"))
            .bind(id)
            .fetch_one(pool)
            .await
    }

    /// Conversation between two users, newest first
    ///
    /// Marks the other user's unread messages to `user_id` as read.
    pub async fn list_direct(
        pool: &PgPool,
        user_id: Uuid,
        other_user_id: Uuid,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let messages = sqlx::query_as::<_, ChatMessage>(&format!(
            r#"
            {MESSAGE_SELECT}
            WHERE m.room_id IS NULL
              AND ((m.sender_id = $1 AND m.receiver_id = $2)
                OR (m.sender_id = $2 AND m.receiver_id = $1))
            ORDER BY m.created_at DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(user_id)
        .bind(other_user_id)
        .bind(limit)
        .bind(skip)
        .fetch_all(pool)
        .await?;

        sqlx::query(
            r#"
            UPDATE chat_messages SET read = TRUE
            WHERE sender_id = $2 AND receiver_id = $1 AND NOT read
            "#,
        )
        .bind(user_id)
        .bind(other_user_id)
        .execute(pool)
        .await?;

        Ok(messages)
    }

    /// Everyone the user has exchanged direct messages with, newest first
    pub async fn contacts(pool: &PgPool, user_id: Uuid) -> Result<Vec<ChatContact>, sqlx::Error> {
        sqlx::query_as::<_, ChatContact>(
            r#"
            WITH direct AS (
                SELECT CASE WHEN sender_id = $1 THEN receiver_id ELSE sender_id END AS other_id,
                       content, created_at, sender_id, read
                FROM chat_messages
                WHERE room_id IS NULL AND (sender_id = $1 OR receiver_id = $1)
            ),
            latest AS (
                SELECT DISTINCT ON (other_id) other_id, content, created_at
                FROM direct
                ORDER BY other_id, created_at DESC
            ),
            unread AS (
                SELECT other_id, COUNT(*) AS cnt
                FROM direct
                WHERE sender_id <> $1 AND NOT read
                GROUP BY other_id
            )
            SELECT u.id AS user_id, u.username, u.full_name,
                   l.content AS last_message, l.created_at AS last_timestamp,
                   COALESCE(un.cnt, 0) AS unread_count
            FROM latest l
            JOIN users u ON u.id = l.other_id
            LEFT JOIN unread un ON un.other_id = l.other_id
            ORDER BY l.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_participants_include_creator_once() {
        let creator = Uuid::new_v4();
        let other = Uuid::new_v4();

        let members = room_participants(creator, &[other, creator, other]);
        assert_eq!(members, vec![creator, other]);
    }

    #[test]
    fn test_message_serializes_timestamp() {
        let message = ChatMessage {
            id: Uuid::new_v4(),
            room_id: Some(Uuid::new_v4()),
            sender_id: Uuid::new_v4(),
            sender_name: "coach".to_string(),
            receiver_id: None,
            content: "Practice at 6".to_string(),
            created_at: Utc::now(),
            is_system: false,
            read: false,
        };

        let value = serde_json::to_value(&message).unwrap();
        assert!(value.get("timestamp").is_some());
        assert!(value.get("created_at").is_none());
        assert_eq!(value["sender_name"], "coach");
    }
}
