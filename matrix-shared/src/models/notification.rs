/// User notifications
///
/// A notification with `user_id = NULL` is a broadcast to every admin and
/// superadmin (used for new seller applications). Everything else is
/// addressed to one user.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE notifications (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID REFERENCES users(id) ON DELETE CASCADE,
///     kind VARCHAR(32) NOT NULL,
///     title VARCHAR(255) NOT NULL,
///     message TEXT NOT NULL,
///     data JSONB,
///     read BOOLEAN NOT NULL DEFAULT FALSE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    SellerApplication,
    OrderUpdate,
    NewOrder,
    OrderStatus,
    ChatMessage,
    System,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::SellerApplication => "seller_application",
            NotificationKind::OrderUpdate => "order_update",
            NotificationKind::NewOrder => "new_order",
            NotificationKind::OrderStatus => "order_status",
            NotificationKind::ChatMessage => "chat_message",
            NotificationKind::System => "system",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,

    /// Recipient; None for admin broadcasts
    pub user_id: Option<Uuid>,

    #[serde(rename = "type")]
    pub kind: NotificationKind,

    pub title: String,

    pub message: String,

    /// Extra payload such as `{"order_id": "..."}`
    pub data: Option<JsonValue>,

    pub read: bool,

    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNotification {
    pub user_id: Option<Uuid>,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub data: Option<JsonValue>,
}

impl NewNotification {
    /// Notification addressed to one user
    pub fn to_user(
        user_id: Uuid,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id: Some(user_id),
            kind,
            title: title.into(),
            message: message.into(),
            data: None,
        }
    }

    /// Notification shown to every admin
    pub fn to_admins(
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id: None,
            kind,
            title: title.into(),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = Some(data);
        self
    }
}

const NOTIFICATION_COLUMNS: &str = "id, user_id, kind, title, message, data, read, created_at";

impl Notification {
    pub async fn create<'e, E>(executor: E, data: NewNotification) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Notification>(&format!(
            r#"
            INSERT INTO notifications (user_id, kind, title, message, data)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        ))
        .bind(data.user_id)
        .bind(data.kind)
        .bind(data.title)
        .bind(data.message)
        .bind(data.data)
        .fetch_one(executor)
        .await
    }

    /// Lists a user's notifications, newest first
    ///
    /// With `include_broadcasts`, admin broadcasts are included.
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: Uuid,
        include_broadcasts: bool,
        unread_only: bool,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Notification>(&format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS} FROM notifications
            WHERE (user_id = $1 OR ($2 AND user_id IS NULL))
              AND (NOT $3 OR NOT read)
            ORDER BY created_at DESC
            LIMIT $4
            "#
        ))
        .bind(user_id)
        .bind(include_broadcasts)
        .bind(unread_only)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Marks one notification read if the user can see it
    pub async fn mark_read(
        pool: &PgPool,
        id: Uuid,
        user_id: Uuid,
        include_broadcasts: bool,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Notification>(&format!(
            r#"
            UPDATE notifications SET read = TRUE
            WHERE id = $1 AND (user_id = $2 OR ($3 AND user_id IS NULL))
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(user_id)
        .bind(include_broadcasts)
        .fetch_optional(pool)
        .await
    }

    /// Marks every visible notification read, returning how many changed
    pub async fn mark_all_read(
        pool: &PgPool,
        user_id: Uuid,
        include_broadcasts: bool,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE notifications SET read = TRUE
            WHERE NOT read AND (user_id = $1 OR ($2 AND user_id IS NULL))
            "#,
        )
        .bind(user_id)
        .bind(include_broadcasts)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn unread_count(
        pool: &PgPool,
        user_id: Uuid,
        include_broadcasts: bool,
    ) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM notifications
            WHERE NOT read AND (user_id = $1 OR ($2 AND user_id IS NULL))
            "#,
        )
        .bind(user_id)
        .bind(include_broadcasts)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }

    /// Deletes read notifications older than `retention_days`
    pub async fn delete_read_older_than(
        pool: &PgPool,
        retention_days: i64,
    ) -> Result<u64, sqlx::Error> {
        let cutoff = Utc::now() - chrono::Duration::days(retention_days);

        let result = sqlx::query("DELETE FROM notifications WHERE read AND created_at < $1")
            .bind(cutoff)
            .execute(pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&NotificationKind::SellerApplication).unwrap(),
            "\"seller_application\""
        );
        assert_eq!(NotificationKind::NewOrder.as_str(), "new_order");
    }

    #[test]
    fn test_builders() {
        let user = Uuid::new_v4();
        let n = NewNotification::to_user(user, NotificationKind::OrderStatus, "Order Status Update", "Shipped")
            .with_data(json!({"order_id": "abc"}));
        assert_eq!(n.user_id, Some(user));
        assert_eq!(n.data.unwrap()["order_id"], "abc");

        let broadcast = NewNotification::to_admins(
            NotificationKind::SellerApplication,
            "New Seller Application",
            "A new seller application has been submitted",
        );
        assert!(broadcast.user_id.is_none());
    }

    #[test]
    fn test_kind_is_serialized_as_type() {
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id: None,
            kind: NotificationKind::System,
            title: "Maintenance".to_string(),
            message: "Tonight".to_string(),
            data: None,
            read: false,
            created_at: Utc::now(),
        };

        let value = serde_json::to_value(&notification).unwrap();
        assert_eq!(value["type"], "system");
        assert!(value.get("kind").is_none());
    }
}
