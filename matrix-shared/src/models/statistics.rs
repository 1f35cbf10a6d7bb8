/// Sales aggregates and daily statistics snapshots
///
/// Every aggregate is computed from `order_items` joined to `orders`, so the
/// same query answers both the platform-wide question (`seller_id = None`)
/// and the per-seller one. For the platform, the sum of item totals equals
/// the sum of order totals.
///
/// Two bases are used:
///
/// - [`SalesBasis::Booked`]: every order that was not cancelled. Dashboards
///   and statistics use this.
/// - [`SalesBasis::Completed`]: only completed orders. Seller revenue and
///   short-term product predictions use this.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE statistics_snapshots (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     seller_id UUID REFERENCES users(id) ON DELETE CASCADE,
///     day DATE NOT NULL,
///     revenue NUMERIC(14, 2) NOT NULL DEFAULT 0,
///     orders BIGINT NOT NULL DEFAULT 0,
///     units BIGINT NOT NULL DEFAULT 0,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::order::OrderStatus;

/// Which orders count as sales
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SalesBasis {
    /// Any order that was not cancelled
    Booked,
    /// Completed orders only
    Completed,
}

impl SalesBasis {
    fn completed_only(self) -> bool {
        matches!(self, SalesBasis::Completed)
    }
}

/// Predicate shared by every sales query; `$1` is the optional seller and
/// `$2` the completed-only flag
const SALES_FILTER: &str = r#"
    ($1::UUID IS NULL OR oi.seller_id = $1)
    AND (
        ($2 AND o.status = 'completed')
        OR (NOT $2 AND o.status <> 'cancelled')
    )
"#;

/// Revenue and order count over a window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SalesTotals {
    pub revenue: Decimal,
    pub orders: i64,
    pub units: i64,
}

impl SalesTotals {
    /// Average order value, zero when there are no orders
    pub fn avg_order_value(&self) -> Decimal {
        if self.orders == 0 {
            return Decimal::ZERO;
        }
        (self.revenue / Decimal::from(self.orders)).round_dp(2)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StatusCount {
    pub status: OrderStatus,
    pub count: i64,
}

/// One calendar month of sales, keyed by its first day
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MonthlySales {
    pub month: NaiveDate,
    pub revenue: Decimal,
    pub orders: i64,
    pub units: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DailySales {
    pub day: NaiveDate,
    pub quantity: i64,
    pub revenue: Decimal,
}

/// One product's sales in one month
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProductMonthlySales {
    pub product_id: Uuid,
    pub name: String,
    pub category: String,
    pub image_url: Option<String>,
    pub price: Decimal,
    pub month: NaiveDate,
    pub revenue: Decimal,
    pub units: i64,
}

/// Product count and summed list price per category
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CategoryStat {
    pub name: String,
    pub count: i64,
    pub total_value: Decimal,
}

/// Sales scope for daily aggregates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DailyScope {
    Product(Uuid),
    Seller(Uuid),
}

/// Sales aggregate queries
pub struct SalesStats;

impl SalesStats {
    /// Totals for orders created in `[start, end)`
    ///
    /// `start = None` means since the beginning; `end = None` means up to now.
    pub async fn totals(
        pool: &PgPool,
        seller_id: Option<Uuid>,
        basis: SalesBasis,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<SalesTotals, sqlx::Error> {
        sqlx::query_as::<_, SalesTotals>(&format!(
            r#"
            SELECT COALESCE(SUM(oi.total), 0) AS revenue,
                   COUNT(DISTINCT o.id) AS orders,
                   COALESCE(SUM(oi.quantity), 0)::BIGINT AS units
            FROM order_items oi
            JOIN orders o ON o.id = oi.order_id
            WHERE {SALES_FILTER}
              AND ($3::TIMESTAMPTZ IS NULL OR o.created_at >= $3)
              AND ($4::TIMESTAMPTZ IS NULL OR o.created_at < $4)
            "#
        ))
        .bind(seller_id)
        .bind(basis.completed_only())
        .bind(start)
        .bind(end)
        .fetch_one(pool)
        .await
    }

    /// Order count per status for orders created since `start`
    ///
    /// Cancelled orders are included here; this is a distribution, not revenue.
    pub async fn status_distribution(
        pool: &PgPool,
        seller_id: Option<Uuid>,
        start: Option<DateTime<Utc>>,
    ) -> Result<Vec<StatusCount>, sqlx::Error> {
        sqlx::query_as::<_, StatusCount>(
            r#"
            SELECT o.status, COUNT(DISTINCT o.id) AS count
            FROM orders o
            JOIN order_items oi ON oi.order_id = o.id
            WHERE ($1::UUID IS NULL OR oi.seller_id = $1)
              AND ($2::TIMESTAMPTZ IS NULL OR o.created_at >= $2)
            GROUP BY o.status
            ORDER BY count DESC
            "#,
        )
        .bind(seller_id)
        .bind(start)
        .fetch_all(pool)
        .await
    }

    /// Monthly sales since `since`, oldest first; months without sales are absent
    pub async fn monthly(
        pool: &PgPool,
        seller_id: Option<Uuid>,
        basis: SalesBasis,
        since: DateTime<Utc>,
    ) -> Result<Vec<MonthlySales>, sqlx::Error> {
        sqlx::query_as::<_, MonthlySales>(&format!(
            r#"
            SELECT date_trunc('month', o.created_at AT TIME ZONE 'UTC')::DATE AS month,
                   COALESCE(SUM(oi.total), 0) AS revenue,
                   COUNT(DISTINCT o.id) AS orders,
                   COALESCE(SUM(oi.quantity), 0)::BIGINT AS units
            FROM order_items oi
            JOIN orders o ON o.id = oi.order_id
            WHERE {SALES_FILTER}
              AND o.created_at >= $3
            GROUP BY 1
            ORDER BY 1
            "#
        ))
        .bind(seller_id)
        .bind(basis.completed_only())
        .bind(since)
        .fetch_all(pool)
        .await
    }

    /// Daily quantity and revenue from completed orders since `since`
    pub async fn daily(
        pool: &PgPool,
        scope: DailyScope,
        since: DateTime<Utc>,
    ) -> Result<Vec<DailySales>, sqlx::Error> {
        let (product_id, seller_id) = match scope {
            DailyScope::Product(id) => (Some(id), None),
            DailyScope::Seller(id) => (None, Some(id)),
        };

        sqlx::query_as::<_, DailySales>(
            r#"
            SELECT (o.created_at AT TIME ZONE 'UTC')::DATE AS day,
                   COALESCE(SUM(oi.quantity), 0)::BIGINT AS quantity,
                   COALESCE(SUM(oi.total), 0) AS revenue
            FROM order_items oi
            JOIN orders o ON o.id = oi.order_id
            WHERE o.status = 'completed'
              AND o.created_at >= $3
              AND ($1::UUID IS NULL OR oi.product_id = $1)
              AND ($2::UUID IS NULL OR oi.seller_id = $2)
            GROUP BY 1
            ORDER BY 1
            "#,
        )
        .bind(product_id)
        .bind(seller_id)
        .bind(since)
        .fetch_all(pool)
        .await
    }

    /// Per-product monthly sales for a seller's catalog since `since`
    pub async fn product_monthly(
        pool: &PgPool,
        seller_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<ProductMonthlySales>, sqlx::Error> {
        sqlx::query_as::<_, ProductMonthlySales>(
            r#"
            SELECT p.id AS product_id, p.name, p.category, p.image_url, p.price,
                   date_trunc('month', o.created_at AT TIME ZONE 'UTC')::DATE AS month,
                   COALESCE(SUM(oi.total), 0) AS revenue,
                   COALESCE(SUM(oi.quantity), 0)::BIGINT AS units
            FROM order_items oi
            JOIN orders o ON o.id = oi.order_id
            JOIN products p ON p.id = oi.product_id
            WHERE p.seller_id = $1
              AND o.status <> 'cancelled'
              AND o.created_at >= $2
            GROUP BY p.id, month
            ORDER BY p.id, month
            "#,
        )
        .bind(seller_id)
        .bind(since)
        .fetch_all(pool)
        .await
    }

    /// Top categories by product count over the (seller's) catalog
    pub async fn top_categories(
        pool: &PgPool,
        seller_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<CategoryStat>, sqlx::Error> {
        sqlx::query_as::<_, CategoryStat>(
            r#"
            SELECT category AS name, COUNT(*) AS count, COALESCE(SUM(price), 0) AS total_value
            FROM products
            WHERE $1::UUID IS NULL OR seller_id = $1
            GROUP BY category
            ORDER BY count DESC, name ASC
            LIMIT $2
            "#,
        )
        .bind(seller_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StatisticsSnapshot {
    pub id: Uuid,
    /// None for the platform-wide row
    pub seller_id: Option<Uuid>,
    pub day: NaiveDate,
    pub revenue: Decimal,
    pub orders: i64,
    pub units: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const SNAPSHOT_COLUMNS: &str =
    "id, seller_id, day, revenue, orders, units, created_at, updated_at";

/// UTC bounds `[start, end)` of a calendar day
pub fn day_bounds(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = day.and_time(chrono::NaiveTime::MIN).and_utc();
    (start, start + Duration::days(1))
}

impl StatisticsSnapshot {
    /// Writes the platform row and one row per seller with sales on `day`
    ///
    /// Re-running for the same day overwrites the previous values. Returns
    /// the number of rows written.
    pub async fn refresh_day(pool: &PgPool, day: NaiveDate) -> Result<u64, sqlx::Error> {
        let (start, end) = day_bounds(day);
        let mut tx = pool.begin().await?;

        let sellers = sqlx::query(
            r#"
            INSERT INTO statistics_snapshots (seller_id, day, revenue, orders, units)
            SELECT oi.seller_id, $1, COALESCE(SUM(oi.total), 0),
                   COUNT(DISTINCT o.id), COALESCE(SUM(oi.quantity), 0)
            FROM order_items oi
            JOIN orders o ON o.id = oi.order_id
            WHERE o.status <> 'cancelled'
              AND o.created_at >= $2 AND o.created_at < $3
            GROUP BY oi.seller_id
            ON CONFLICT (COALESCE(seller_id, '00000000-0000-0000-0000-000000000000'::uuid), day)
            DO UPDATE SET revenue = EXCLUDED.revenue,
                          orders = EXCLUDED.orders,
                          units = EXCLUDED.units,
                          updated_at = NOW()
            "#,
        )
        .bind(day)
        .bind(start)
        .bind(end)
        .execute(&mut *tx)
        .await?;

        let platform = sqlx::query(
            r#"
            INSERT INTO statistics_snapshots (seller_id, day, revenue, orders, units)
            SELECT NULL::UUID, $1, COALESCE(SUM(oi.total), 0),
                   COUNT(DISTINCT o.id), COALESCE(SUM(oi.quantity), 0)
            FROM order_items oi
            JOIN orders o ON o.id = oi.order_id
            WHERE o.status <> 'cancelled'
              AND o.created_at >= $2 AND o.created_at < $3
            ON CONFLICT (COALESCE(seller_id, '00000000-0000-0000-0000-000000000000'::uuid), day)
            DO UPDATE SET revenue = EXCLUDED.revenue,
                          orders = EXCLUDED.orders,
                          units = EXCLUDED.units,
                          updated_at = NOW()
            "#,
        )
        .bind(day)
        .bind(start)
        .bind(end)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(sellers.rows_affected() + platform.rows_affected())
    }

    /// Snapshots from `since` onwards, oldest first
    pub async fn history(
        pool: &PgPool,
        seller_id: Option<Uuid>,
        since: NaiveDate,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, StatisticsSnapshot>(&format!(
            r#"
            SELECT {SNAPSHOT_COLUMNS} FROM statistics_snapshots
            WHERE seller_id IS NOT DISTINCT FROM $1 AND day >= $2
            ORDER BY day ASC
            "#
        ))
        .bind(seller_id)
        .bind(since)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_avg_order_value() {
        let totals = SalesTotals {
            revenue: Decimal::new(10000, 2),
            orders: 3,
            units: 5,
        };
        assert_eq!(totals.avg_order_value(), Decimal::new(3333, 2));
        assert_eq!(SalesTotals::default().avg_order_value(), Decimal::ZERO);
    }

    #[test]
    fn test_day_bounds() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 31).unwrap();
        let (start, end) = day_bounds(day);
        assert_eq!(start.to_rfc3339(), "2025-03-31T00:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2025-04-01T00:00:00+00:00");
    }

    #[test]
    fn test_basis_flag() {
        assert!(SalesBasis::Completed.completed_only());
        assert!(!SalesBasis::Booked.completed_only());
    }
}
