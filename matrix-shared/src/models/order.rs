/// Order model, line items and tracking history
///
/// An order snapshots each product's name, price, seller and image at
/// checkout. Creation checks and decrements stock for every line inside one
/// transaction with the product rows locked, so concurrent checkouts can't
/// oversell.
///
/// # State Machine
///
/// ```text
/// pending → processing → shipped → delivered → completed
///    ↓           ↓           ↓
/// cancelled   cancelled   cancelled
/// ```
///
/// The diagram is the usual path, not a constraint: staff may move a live
/// order to any status, backwards included (`shipped → processing` after a
/// returned parcel). Repeating the current status records a tracking update
/// without changing state. `completed` and `cancelled` are terminal, and a
/// delivered order can't be cancelled.
///
/// Completing an order credits each seller 90% of their line totals.
/// Cancelling it returns the stock.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE orders (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     order_number VARCHAR(32) NOT NULL UNIQUE,
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     status order_status NOT NULL DEFAULT 'pending',
///     payment_status payment_status NOT NULL DEFAULT 'pending',
///     total NUMERIC(12, 2) NOT NULL,
///     shipping_address JSONB NOT NULL,
///     tracking_number VARCHAR(100),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
///
/// CREATE TABLE order_items (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     order_id UUID NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
///     product_id UUID REFERENCES products(id) ON DELETE SET NULL,
///     seller_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     name VARCHAR(255) NOT NULL,
///     price NUMERIC(12, 2) NOT NULL,
///     quantity INTEGER NOT NULL,
///     total NUMERIC(12, 2) NOT NULL,
///     image_url VARCHAR(1024),
///     category VARCHAR(100) NOT NULL
/// );
///
/// CREATE TABLE order_tracking (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     order_id UUID NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
///     status order_status NOT NULL,
///     location VARCHAR(255),
///     description TEXT NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use matrix_shared::models::order::{Order, NewOrderItem};
/// use serde_json::json;
/// # use sqlx::PgPool;
/// # use uuid::Uuid;
/// # async fn example(pool: PgPool, buyer: Uuid, product: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let placed = Order::create(
///     &pool,
///     buyer,
///     &[NewOrderItem { product_id: product, quantity: 2 }],
///     json!({"street": "1 Track Lane", "city": "Eugene"}),
/// )
/// .await?;
///
/// println!("Placed {}", placed.order.order_number);
/// # Ok(())
/// # }
/// ```

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{PgConnection, PgExecutor, PgPool};
use uuid::Uuid;

use super::product::Product;
use super::user::User;
use crate::pricing::{line_total, seller_earnings};

/// Prefix of every order number
pub const ORDER_NUMBER_PREFIX: &str = "MC";

const ORDER_NUMBER_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Order fulfilment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Completed,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Completed => "completed",
        }
    }

    /// Checks if the order can no longer change
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Completed)
    }

    /// Checks if transition to target status is valid
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }

        !(*self == OrderStatus::Delivered && target == OrderStatus::Cancelled)
    }

    /// Default tracking description for a status change
    pub fn tracking_description(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Order placed",
            OrderStatus::Processing => "Order is being prepared",
            OrderStatus::Shipped => "Order has been shipped",
            OrderStatus::Delivered => "Order has been delivered",
            OrderStatus::Cancelled => "Order was cancelled",
            OrderStatus::Completed => "Order completed",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| "Invalid status".to_string())
    }
}

/// Payment state of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub total: Decimal,
    pub shipping_address: JsonValue,
    pub tracking_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Product snapshot taken at checkout
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Option<Uuid>,
    pub seller_id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub quantity: i32,
    pub total: Decimal,
    pub image_url: Option<String>,
    pub category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TrackingEntry {
    pub id: Uuid,
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub location: Option<String>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Order with its line items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

impl OrderWithItems {
    /// Distinct sellers of the order's items
    pub fn seller_ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.items.iter().map(|i| i.seller_id).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn has_seller(&self, seller_id: Uuid) -> bool {
        self.items.iter().any(|i| i.seller_id == seller_id)
    }
}

/// Requested line at checkout
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Which orders a caller may see
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderScope {
    /// Orders placed by this buyer
    Buyer(Uuid),

    /// Orders containing at least one item from this seller
    Seller(Uuid),

    /// Every order
    All,
}

/// Status change request
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    pub location: Option<String>,
    pub description: Option<String>,
    pub tracking_number: Option<String>,
}

/// Error type for order operations
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Order must contain at least one item")]
    Empty,

    #[error("Quantity must be at least 1")]
    InvalidQuantity,

    #[error("Product with ID {0} not found")]
    ProductNotFound(Uuid),

    #[error("Not enough stock for product {0}")]
    InsufficientStock(String),

    #[error("Order not found")]
    NotFound,

    #[error("Cannot change order status from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Generates an order number like `MC-20250314-7QK2ZD`
pub fn generate_order_number<R: Rng>(now: DateTime<Utc>, rng: &mut R) -> String {
    let suffix: String = (0..6)
        .map(|_| {
            let idx = rng.gen_range(0..ORDER_NUMBER_ALPHABET.len());
            ORDER_NUMBER_ALPHABET[idx] as char
        })
        .collect();

    format!("{}-{}-{}", ORDER_NUMBER_PREFIX, now.format("%Y%m%d"), suffix)
}

/// Merges repeated products into one line each, keeping first-seen order
pub fn merge_items(items: &[NewOrderItem]) -> Result<Vec<NewOrderItem>, OrderError> {
    if items.is_empty() {
        return Err(OrderError::Empty);
    }

    let mut merged: Vec<NewOrderItem> = Vec::with_capacity(items.len());
    for item in items {
        if item.quantity < 1 {
            return Err(OrderError::InvalidQuantity);
        }
        match merged.iter_mut().find(|m| m.product_id == item.product_id) {
            Some(existing) => existing.quantity += item.quantity,
            None => merged.push(*item),
        }
    }

    Ok(merged)
}

/// Seller earnings per seller for a set of items
pub fn earnings_by_seller(items: &[OrderItem]) -> BTreeMap<Uuid, Decimal> {
    let mut revenue: BTreeMap<Uuid, Decimal> = BTreeMap::new();
    for item in items {
        *revenue.entry(item.seller_id).or_insert(Decimal::ZERO) += item.total;
    }

    revenue
        .into_iter()
        .map(|(seller, total)| (seller, seller_earnings(total)))
        .collect()
}

const ORDER_COLUMNS: &str = "o.id, o.order_number, o.user_id, o.status, o.payment_status, \
    o.total, o.shipping_address, o.tracking_number, o.created_at, o.updated_at";

const ITEM_COLUMNS: &str =
    "id, order_id, product_id, seller_id, name, price, quantity, total, image_url, category";

/// SQL predicate for a scope; `$1` is the scope's user id
fn scope_predicate(scope: OrderScope) -> &'static str {
    match scope {
        OrderScope::Buyer(_) => "o.user_id = $1",
        OrderScope::Seller(_) => {
            "EXISTS (SELECT 1 FROM order_items oi WHERE oi.order_id = o.id AND oi.seller_id = $1)"
        }
        OrderScope::All => "$1::UUID IS NULL",
    }
}

fn scope_user(scope: OrderScope) -> Option<Uuid> {
    match scope {
        OrderScope::Buyer(id) | OrderScope::Seller(id) => Some(id),
        OrderScope::All => None,
    }
}

async fn insert_tracking<'e, E>(
    executor: E,
    order_id: Uuid,
    status: OrderStatus,
    location: Option<&str>,
    description: &str,
) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO order_tracking (order_id, status, location, description)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(order_id)
    .bind(status)
    .bind(location)
    .bind(description)
    .execute(executor)
    .await?;

    Ok(())
}

impl Order {
    /// Places an order
    ///
    /// Locks every product row, checks stock, snapshots the items, moves
    /// stock into `sales_count` and writes the first tracking entry, all in
    /// one transaction. Rows are locked in product id order so two carts
    /// holding the same products can't deadlock; items keep the cart order.
    ///
    /// # Errors
    ///
    /// - `OrderError::Empty` / `OrderError::InvalidQuantity` for bad input
    /// - `OrderError::ProductNotFound` when a product doesn't exist
    /// - `OrderError::InsufficientStock` naming the first short product
    pub async fn create(
        pool: &PgPool,
        user_id: Uuid,
        items: &[NewOrderItem],
        shipping_address: JsonValue,
    ) -> Result<OrderWithItems, OrderError> {
        let lines = merge_items(items)?;

        let mut tx = pool.begin().await?;

        let mut lock_order: Vec<Uuid> = lines.iter().map(|l| l.product_id).collect();
        lock_order.sort();

        let mut locked: HashMap<Uuid, Product> = HashMap::with_capacity(lines.len());
        for product_id in lock_order {
            let product = Product::find_for_update(&mut tx, product_id)
                .await?
                .ok_or(OrderError::ProductNotFound(product_id))?;
            locked.insert(product_id, product);
        }

        let mut snapshots: Vec<(Product, i32)> = Vec::with_capacity(lines.len());
        for line in &lines {
            let product = locked
                .remove(&line.product_id)
                .ok_or(OrderError::ProductNotFound(line.product_id))?;

            if product.stock < line.quantity {
                return Err(OrderError::InsufficientStock(product.name));
            }

            snapshots.push((product, line.quantity));
        }

        let total: Decimal = snapshots
            .iter()
            .map(|(p, qty)| line_total(p.price, *qty))
            .sum();

        let order_number = generate_order_number(Utc::now(), &mut rand::thread_rng());

        let order = sqlx::query_as::<_, Order>(
            r#"
            INSERT INTO orders AS o (order_number, user_id, total, shipping_address)
            VALUES ($1, $2, $3, $4)
            RETURNING o.id, o.order_number, o.user_id, o.status, o.payment_status,
                      o.total, o.shipping_address, o.tracking_number, o.created_at, o.updated_at
            "#,
        )
        .bind(&order_number)
        .bind(user_id)
        .bind(total)
        .bind(shipping_address)
        .fetch_one(&mut *tx)
        .await?;

        let mut order_items = Vec::with_capacity(snapshots.len());
        for (product, quantity) in &snapshots {
            let item = sqlx::query_as::<_, OrderItem>(&format!(
                r#"
                INSERT INTO order_items
                    (order_id, product_id, seller_id, name, price, quantity, total, image_url, category)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING {ITEM_COLUMNS}
                "#
            ))
            .bind(order.id)
            .bind(product.id)
            .bind(product.seller_id)
            .bind(&product.name)
            .bind(product.price)
            .bind(*quantity)
            .bind(line_total(product.price, *quantity))
            .bind(&product.image_url)
            .bind(&product.category)
            .fetch_one(&mut *tx)
            .await?;

            Product::record_sale(&mut *tx, product.id, *quantity).await?;
            order_items.push(item);
        }

        insert_tracking(
            &mut *tx,
            order.id,
            OrderStatus::Pending,
            None,
            OrderStatus::Pending.tracking_description(),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            items = order_items.len(),
            total = %order.total,
            "Order placed"
        );

        Ok(OrderWithItems {
            order,
            items: order_items,
        })
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Order>(&format!("SELECT {ORDER_COLUMNS} FROM orders o WHERE o.id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_number(
        pool: &PgPool,
        order_number: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders o WHERE o.order_number = $1"
        ))
        .bind(order_number)
        .fetch_optional(pool)
        .await
    }

    /// Loads an order and locks its row until the transaction ends
    pub async fn find_for_update(conn: &mut PgConnection, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders o WHERE o.id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(conn)
        .await
    }

    /// Loads an order with its items
    pub async fn with_items(
        pool: &PgPool,
        id: Uuid,
    ) -> Result<Option<OrderWithItems>, sqlx::Error> {
        let Some(order) = Self::find_by_id(pool, id).await? else {
            return Ok(None);
        };
        let items = OrderItem::list_for_order(pool, order.id).await?;

        Ok(Some(OrderWithItems { order, items }))
    }

    /// Lists orders visible in `scope`, newest first
    pub async fn list(
        pool: &PgPool,
        scope: OrderScope,
        status: Option<OrderStatus>,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<OrderWithItems>, sqlx::Error> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders o
            WHERE {} AND ($2::order_status IS NULL OR o.status = $2)
            ORDER BY o.created_at DESC
            LIMIT $3 OFFSET $4
            "#,
            scope_predicate(scope)
        ))
        .bind(scope_user(scope))
        .bind(status)
        .bind(limit)
        .bind(skip)
        .fetch_all(pool)
        .await?;

        let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let mut items_by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for item in OrderItem::list_for_orders(pool, &ids).await? {
            items_by_order.entry(item.order_id).or_default().push(item);
        }

        Ok(orders
            .into_iter()
            .map(|order| {
                let items = items_by_order.remove(&order.id).unwrap_or_default();
                OrderWithItems { order, items }
            })
            .collect())
    }

    /// Counts orders visible in `scope`
    pub async fn count(
        pool: &PgPool,
        scope: OrderScope,
        status: Option<OrderStatus>,
    ) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(&format!(
            r#"
            SELECT COUNT(*) FROM orders o
            WHERE {} AND ($2::order_status IS NULL OR o.status = $2)
            "#,
            scope_predicate(scope)
        ))
        .bind(scope_user(scope))
        .bind(status)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }

    /// Moves an order to `target` and records a tracking entry
    ///
    /// On `completed` every seller is credited their earnings; on `cancelled`
    /// stock is returned. Both happen in the same transaction as the status
    /// change.
    ///
    /// # Errors
    ///
    /// - `OrderError::NotFound` when the order doesn't exist
    /// - `OrderError::InvalidTransition` when the state machine forbids it
    pub async fn update_status(
        pool: &PgPool,
        id: Uuid,
        target: OrderStatus,
        update: StatusUpdate,
    ) -> Result<OrderWithItems, OrderError> {
        let mut tx = pool.begin().await?;

        let current = Self::find_for_update(&mut tx, id)
            .await?
            .ok_or(OrderError::NotFound)?;

        if !current.status.can_transition_to(target) {
            return Err(OrderError::InvalidTransition {
                from: current.status.as_str(),
                to: target.as_str(),
            });
        }

        let order = sqlx::query_as::<_, Order>(
            r#"
            UPDATE orders AS o
            SET status = $2,
                tracking_number = COALESCE($3, o.tracking_number),
                updated_at = NOW()
            WHERE o.id = $1
            RETURNING o.id, o.order_number, o.user_id, o.status, o.payment_status,
                      o.total, o.shipping_address, o.tracking_number, o.created_at, o.updated_at
            "#,
        )
        .bind(id)
        .bind(target)
        .bind(update.tracking_number.as_deref())
        .fetch_one(&mut *tx)
        .await?;

        let description = update
            .description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| target.tracking_description());
        insert_tracking(&mut *tx, id, target, update.location.as_deref(), description).await?;

        let items = sqlx::query_as::<_, OrderItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = $1"
        ))
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        if target != current.status {
            match target {
                OrderStatus::Completed => {
                    for (seller_id, earnings) in earnings_by_seller(&items) {
                        User::credit_balance(&mut *tx, seller_id, earnings).await?;
                    }
                }
                OrderStatus::Cancelled => {
                    let mut returns: BTreeMap<Uuid, i32> = BTreeMap::new();
                    for item in &items {
                        if let Some(product_id) = item.product_id {
                            *returns.entry(product_id).or_insert(0) += item.quantity;
                        }
                    }
                    // same lock order as checkout
                    for (product_id, quantity) in returns {
                        Product::restore_stock(&mut *tx, product_id, quantity).await?;
                    }
                }
                _ => {}
            }
        }

        tx.commit().await?;

        tracing::info!(
            order_id = %id,
            from = current.status.as_str(),
            to = target.as_str(),
            "Order status updated"
        );

        Ok(OrderWithItems { order, items })
    }

    /// Marks an order paid; a pending order moves to processing
    pub async fn mark_paid<'e, E>(executor: E, id: Uuid) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            UPDATE orders
            SET payment_status = 'paid',
                status = CASE WHEN status = 'pending' THEN 'processing'::order_status ELSE status END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(executor)
        .await?;

        Ok(())
    }
}

impl OrderItem {
    pub async fn list_for_order(pool: &PgPool, order_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, OrderItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = $1"
        ))
        .bind(order_id)
        .fetch_all(pool)
        .await
    }

    pub async fn list_for_orders(
        pool: &PgPool,
        order_ids: &[Uuid],
    ) -> Result<Vec<Self>, sqlx::Error> {
        if order_ids.is_empty() {
            return Ok(Vec::new());
        }

        sqlx::query_as::<_, OrderItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = ANY($1)"
        ))
        .bind(order_ids)
        .fetch_all(pool)
        .await
    }
}

impl TrackingEntry {
    /// Tracking history, oldest first
    pub async fn list_for_order(pool: &PgPool, order_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, TrackingEntry>(
            r#"
            SELECT id, order_id, status, location, description, created_at
            FROM order_tracking
            WHERE order_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(order_id)
        .fetch_all(pool)
        .await
    }
}
