/// Shopping assistant conversation log
///
/// One row per answered question. Logging is best effort: callers log a
/// failure and still return the answer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AssistantLog {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub user_message: String,
    pub bot_response: String,
    pub created_at: DateTime<Utc>,
}

impl AssistantLog {
    pub async fn record(
        pool: &PgPool,
        user_id: Uuid,
        user_message: &str,
        bot_response: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, AssistantLog>(
            r#"
            INSERT INTO assistant_logs (user_id, user_message, bot_response)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, user_message, bot_response, created_at
            "#,
        )
        .bind(user_id)
        .bind(user_message)
        .bind(bot_response)
        .fetch_one(pool)
        .await
    }

    /// Most recent exchanges for a user, newest first
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, AssistantLog>(
            r#"
            SELECT id, user_id, user_message, bot_response, created_at
            FROM assistant_logs
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}
