/// Shopping cart and wishlist
///
/// Cart and wishlist rows only reference products. Title, price, image and
/// stock are read from the product at query time, so a price change shows up
/// in every cart immediately.
///
/// A cart line is identified by `(user, product, variant id)`: adding the same
/// product and variant again increments the existing line.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

use crate::pricing::{CartLine, CartSummary};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CartItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub title: String,
    pub price: Decimal,
    pub image_url: Option<String>,
    pub quantity: i32,
    pub stock: i32,
    /// Free-form variant selection such as `{"id": "42-blue", "size": "42"}`
    pub variant: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}

impl CartItem {
    pub fn line(&self) -> CartLine {
        CartLine {
            price: self.price,
            quantity: self.quantity,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WishlistItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub title: String,
    pub price: Decimal,
    pub image_url: Option<String>,
    pub stock: i32,
    pub created_at: DateTime<Utc>,
}

/// Cart contents with totals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    pub items: Vec<CartItem>,
    pub summary: CartSummary,
}

impl Cart {
    pub fn new(items: Vec<CartItem>) -> Self {
        let lines: Vec<CartLine> = items.iter().map(CartItem::line).collect();
        Self {
            summary: CartSummary::from_lines(&lines),
            items,
        }
    }
}

const CART_SELECT: &str = r#"
    SELECT c.id, c.user_id, c.product_id, p.name AS title, p.price, p.image_url,
           c.quantity, p.stock, c.variant, c.created_at
    FROM cart_items c
    JOIN products p ON p.id = c.product_id
"#;

const WISHLIST_SELECT: &str = r#"
    SELECT w.id, w.user_id, w.product_id, p.name AS title, p.price, p.image_url,
           p.stock, w.created_at
    FROM wishlist_items w
    JOIN products p ON p.id = w.product_id
"#;

/// Variant key used for line identity; absent variants share the empty key
pub fn variant_key(variant: Option<&JsonValue>) -> String {
    variant
        .and_then(|v| v.get("id"))
        .map(|id| match id {
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_default()
}

impl CartItem {
    /// Lists the user's cart, oldest line first
    pub async fn list(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, CartItem>(&format!(
            "{CART_SELECT} WHERE c.user_id = $1 ORDER BY c.created_at ASC"
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    pub async fn find(
        pool: &PgPool,
        user_id: Uuid,
        item_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, CartItem>(&format!(
            "{CART_SELECT} WHERE c.user_id = $1 AND c.id = $2"
        ))
        .bind(user_id)
        .bind(item_id)
        .fetch_optional(pool)
        .await
    }

    /// Finds the line for a product and variant
    pub async fn find_line(
        pool: &PgPool,
        user_id: Uuid,
        product_id: Uuid,
        variant: Option<&JsonValue>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, CartItem>(&format!(
            "{CART_SELECT} WHERE c.user_id = $1 AND c.product_id = $2 \
             AND COALESCE(c.variant ->> 'id', '') = $3"
        ))
        .bind(user_id)
        .bind(product_id)
        .bind(variant_key(variant))
        .fetch_optional(pool)
        .await
    }

    /// Inserts a line or sets the quantity of the existing one
    ///
    /// The caller has already checked `quantity` against stock.
    pub async fn upsert(
        pool: &PgPool,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        variant: Option<JsonValue>,
    ) -> Result<Uuid, sqlx::Error> {
        let (id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO cart_items (user_id, product_id, quantity, variant)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, product_id, COALESCE(variant ->> 'id', ''))
            DO UPDATE SET quantity = EXCLUDED.quantity, updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(product_id)
        .bind(quantity)
        .bind(variant)
        .fetch_one(pool)
        .await?;

        Ok(id)
    }

    pub async fn set_quantity(
        pool: &PgPool,
        user_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE cart_items SET quantity = $3, updated_at = NOW()
            WHERE user_id = $1 AND id = $2
            "#,
        )
        .bind(user_id)
        .bind(item_id)
        .bind(quantity)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn remove(pool: &PgPool, user_id: Uuid, item_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND id = $2")
            .bind(user_id)
            .bind(item_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Empties the cart, returning the number of removed lines
    pub async fn clear(pool: &PgPool, user_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected())
    }
}

impl WishlistItem {
    pub async fn list(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, WishlistItem>(&format!(
            "{WISHLIST_SELECT} WHERE w.user_id = $1 ORDER BY w.created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    pub async fn find(
        pool: &PgPool,
        user_id: Uuid,
        item_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, WishlistItem>(&format!(
            "{WISHLIST_SELECT} WHERE w.user_id = $1 AND w.id = $2"
        ))
        .bind(user_id)
        .bind(item_id)
        .fetch_optional(pool)
        .await
    }

    /// Adds a product; adding it twice keeps the original entry
    pub async fn add(pool: &PgPool, user_id: Uuid, product_id: Uuid) -> Result<Self, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO wishlist_items (user_id, product_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id, product_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(product_id)
        .execute(pool)
        .await?;

        sqlx::query_as::<_, WishlistItem>(&format!(
            "{WISHLIST_SELECT} WHERE w.user_id = $1 AND w.product_id = $2"
        ))
        .bind(user_id)
        .bind(product_id)
        .fetch_one(pool)
        .await
    }

    pub async fn remove(pool: &PgPool, user_id: Uuid, item_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM wishlist_items WHERE user_id = $1 AND id = $2")
            .bind(user_id)
            .bind(item_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
