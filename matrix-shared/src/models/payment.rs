/// Payments and seller payout requests
///
/// Payments are recorded, not charged: processing a payment stores a
/// `completed` row with a generated transaction id and marks the order paid.
/// The order row is locked while its buyer, payment state and total are
/// checked, and `payments_one_completed_per_order` backs that up in the
/// schema, so an order is paid at most once.
///
/// Payout requests move a seller's balance out of the platform. A pending
/// request reserves its amount; approval debits the balance. New requests
/// lock the seller's row first, so concurrent requests are checked one after
/// another against the same reservations.

use chrono::{DateTime, Utc};
use rand::RngCore;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use super::order::{Order, PaymentStatus};
use super::user::User;

/// Status stored on successful payments
pub const PAYMENT_COMPLETED: &str = "completed";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub payment_method: String,
    pub status: String,
    pub transaction_id: String,
    pub created_at: DateTime<Utc>,
}

/// Generates a transaction id like `txn_3f9a0c...` (16 random bytes, hex)
pub fn generate_transaction_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("txn_{}", hex::encode(bytes))
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Order not found")]
    OrderNotFound,

    #[error("Not the buyer of this order")]
    NotBuyer,

    #[error("Order is already paid")]
    AlreadyPaid,

    #[error("Payment amount {amount} does not match order total {total}")]
    AmountMismatch { amount: Decimal, total: Decimal },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Checks a payment against the locked order
fn check_payable(order: &Order, user_id: Uuid, amount: Decimal) -> Result<(), PaymentError> {
    if order.user_id != user_id {
        return Err(PaymentError::NotBuyer);
    }
    if order.payment_status == PaymentStatus::Paid {
        return Err(PaymentError::AlreadyPaid);
    }
    if amount != order.total {
        return Err(PaymentError::AmountMismatch {
            amount,
            total: order.total,
        });
    }
    Ok(())
}

const PAYMENT_COLUMNS: &str =
    "id, order_id, user_id, amount, payment_method, status, transaction_id, created_at";

impl Payment {
    /// Records a payment and marks the order paid in one transaction
    ///
    /// # Errors
    ///
    /// - `PaymentError::OrderNotFound` for an unknown order
    /// - `PaymentError::NotBuyer` when `user_id` didn't place the order
    /// - `PaymentError::AlreadyPaid`, also for the loser of a concurrent race
    /// - `PaymentError::AmountMismatch` unless `amount` is the exact total
    pub async fn record(
        pool: &PgPool,
        order_id: Uuid,
        user_id: Uuid,
        amount: Decimal,
        payment_method: &str,
    ) -> Result<Self, PaymentError> {
        let mut tx = pool.begin().await?;

        let order = Order::find_for_update(&mut tx, order_id)
            .await?
            .ok_or(PaymentError::OrderNotFound)?;
        check_payable(&order, user_id, amount)?;

        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            INSERT INTO payments (order_id, user_id, amount, payment_method, status, transaction_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(order_id)
        .bind(user_id)
        .bind(amount)
        .bind(payment_method)
        .bind(PAYMENT_COMPLETED)
        .bind(generate_transaction_id())
        .fetch_one(&mut *tx)
        .await?;

        Order::mark_paid(&mut *tx, order_id).await?;

        tx.commit().await?;

        tracing::info!(
            payment_id = %payment.id,
            order_id = %order_id,
            amount = %amount,
            "Payment recorded"
        );

        Ok(payment)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Lists payments, newest first; `user_id = None` lists everyone's
    pub async fn list(
        pool: &PgPool,
        user_id: Option<Uuid>,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Payment>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS} FROM payments
            WHERE $1::UUID IS NULL OR user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .bind(skip)
        .fetch_all(pool)
        .await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payout_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PayoutRequest {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub amount: Decimal,
    pub status: PayoutStatus,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

/// Error type for payout decisions
#[derive(Debug, thiserror::Error)]
pub enum PayoutError {
    #[error("Payout request not found")]
    NotFound,

    #[error("Payout request has already been decided")]
    AlreadyDecided,

    #[error("Insufficient balance")]
    InsufficientBalance,

    #[error("Insufficient balance: {available} available for payout")]
    ExceedsAvailable { available: Decimal },

    #[error("Seller not found")]
    SellerNotFound,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

const PAYOUT_COLUMNS: &str = "id, seller_id, amount, status, created_at, decided_at";

impl PayoutRequest {
    /// Files a payout request if the balance still covers it
    ///
    /// # Errors
    ///
    /// `PayoutError::ExceedsAvailable` when `amount` is more than the
    /// balance minus the seller's pending requests.
    pub async fn request(
        pool: &PgPool,
        seller_id: Uuid,
        amount: Decimal,
    ) -> Result<Self, PayoutError> {
        let mut tx = pool.begin().await?;

        let (balance,): (Decimal,) =
            sqlx::query_as("SELECT balance FROM users WHERE id = $1 FOR UPDATE")
                .bind(seller_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(PayoutError::SellerNotFound)?;

        let pending = Self::pending_total(&mut *tx, seller_id).await?;
        let available = available_for_payout(balance, pending);
        if amount > available {
            return Err(PayoutError::ExceedsAvailable { available });
        }

        let request = sqlx::query_as::<_, PayoutRequest>(&format!(
            r#"
            INSERT INTO payout_requests (seller_id, amount)
            VALUES ($1, $2)
            RETURNING {PAYOUT_COLUMNS}
            "#
        ))
        .bind(seller_id)
        .bind(amount)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(payout_id = %request.id, seller_id = %seller_id, amount = %amount, "Payout requested");

        Ok(request)
    }

    /// Lists payout requests, newest first; `seller_id = None` lists all
    pub async fn list(pool: &PgPool, seller_id: Option<Uuid>) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, PayoutRequest>(&format!(
            r#"
            SELECT {PAYOUT_COLUMNS} FROM payout_requests
            WHERE $1::UUID IS NULL OR seller_id = $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(seller_id)
        .fetch_all(pool)
        .await
    }

    /// Sum of the seller's pending requests
    pub async fn pending_total<'e, E>(executor: E, seller_id: Uuid) -> Result<Decimal, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let (total,): (Option<Decimal>,) = sqlx::query_as(
            "SELECT SUM(amount) FROM payout_requests WHERE seller_id = $1 AND status = 'pending'",
        )
        .bind(seller_id)
        .fetch_one(executor)
        .await?;

        Ok(total.unwrap_or(Decimal::ZERO))
    }

    /// Approves a pending request and debits the seller's balance
    ///
    /// # Errors
    ///
    /// `PayoutError::InsufficientBalance` when the balance no longer covers
    /// the amount; nothing is changed in that case.
    pub async fn approve(pool: &PgPool, id: Uuid) -> Result<Self, PayoutError> {
        let mut tx = pool.begin().await?;

        let request = Self::decide(&mut tx, id, PayoutStatus::Approved).await?;

        if !User::debit_balance(&mut *tx, request.seller_id, request.amount).await? {
            return Err(PayoutError::InsufficientBalance);
        }

        tx.commit().await?;

        tracing::info!(payout_id = %id, seller_id = %request.seller_id, amount = %request.amount, "Payout approved");

        Ok(request)
    }

    pub async fn reject(pool: &PgPool, id: Uuid) -> Result<Self, PayoutError> {
        let mut tx = pool.begin().await?;
        let request = Self::decide(&mut tx, id, PayoutStatus::Rejected).await?;
        tx.commit().await?;

        Ok(request)
    }

    async fn decide(
        conn: &mut sqlx::PgConnection,
        id: Uuid,
        status: PayoutStatus,
    ) -> Result<Self, PayoutError> {
        let current = sqlx::query_as::<_, PayoutRequest>(&format!(
            "SELECT {PAYOUT_COLUMNS} FROM payout_requests WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(PayoutError::NotFound)?;

        if current.status != PayoutStatus::Pending {
            return Err(PayoutError::AlreadyDecided);
        }

        let updated = sqlx::query_as::<_, PayoutRequest>(&format!(
            r#"
            UPDATE payout_requests SET status = $2, decided_at = NOW()
            WHERE id = $1
            RETURNING {PAYOUT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status)
        .fetch_one(&mut *conn)
        .await?;

        Ok(updated)
    }
}

/// Largest payout a seller can still request
pub fn available_for_payout(balance: Decimal, pending: Decimal) -> Decimal {
    (balance - pending).max(Decimal::ZERO)
}
