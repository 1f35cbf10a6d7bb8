/// Product model and catalog queries
///
/// Products belong to a seller. Ratings and counters are denormalized onto
/// the row: `rating`/`reviews_count` are recomputed when a review is added,
/// `sales_count` moves with order creation and cancellation, `views_count`
/// increments on every detail view.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE products (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     seller_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     name VARCHAR(255) NOT NULL,
///     description TEXT NOT NULL DEFAULT '',
///     price NUMERIC(12, 2) NOT NULL,
///     category VARCHAR(100) NOT NULL,
///     image_url VARCHAR(1024),
///     stock INTEGER NOT NULL DEFAULT 0,
///     brand VARCHAR(100),
///     sport_type VARCHAR(100),
///     sku VARCHAR(100),
///     rating DOUBLE PRECISION NOT NULL DEFAULT 0,
///     reviews_count INTEGER NOT NULL DEFAULT 0,
///     views_count INTEGER NOT NULL DEFAULT 0,
///     sales_count INTEGER NOT NULL DEFAULT 0,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use matrix_shared::models::product::{Product, ProductFilter};
/// # use sqlx::PgPool;
/// # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
/// let filter = ProductFilter {
///     category: Some("Running".to_string()),
///     search: Some("shoe".to_string()),
///     ..Default::default()
/// };
/// let products = Product::list(&pool, &filter).await?;
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgExecutor, PgPool};
use uuid::Uuid;

/// Default page size for product listings
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Largest accepted page size
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub category: String,
    pub image_url: Option<String>,
    pub stock: i32,
    pub brand: Option<String>,
    pub sport_type: Option<String>,
    pub sku: Option<String>,
    pub rating: f64,
    pub reviews_count: i32,
    pub views_count: i32,
    pub sales_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProduct {
    pub seller_id: Uuid,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub category: String,
    pub image_url: Option<String>,
    pub stock: i32,
    pub brand: Option<String>,
    pub sport_type: Option<String>,
    pub sku: Option<String>,
}

/// Partial product update; `None` keeps the current value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProduct {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub stock: Option<i32>,
    pub brand: Option<String>,
    pub sport_type: Option<String>,
    pub sku: Option<String>,
}

/// Catalog listing filters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductFilter {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    pub category: Option<String>,
    pub search: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub seller_id: Option<Uuid>,
}

impl ProductFilter {
    /// Offset, never negative
    pub fn offset(&self) -> i64 {
        self.skip.unwrap_or(0).max(0)
    }

    /// Page size clamped to `1..=MAX_PAGE_SIZE`
    pub fn page_size(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    /// ILIKE pattern for the search term, or None when blank
    pub fn search_pattern(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", escape_like(s)))
    }
}

/// Escapes LIKE wildcards so user input matches literally
pub fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Category name with its product count
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CategoryCount {
    pub name: String,
    pub count: i64,
}

const PRODUCT_COLUMNS: &str = "id, seller_id, name, description, price, category, image_url, \
    stock, brand, sport_type, sku, rating, reviews_count, views_count, sales_count, created_at, \
    updated_at";

impl Product {
    pub async fn create(pool: &PgPool, data: CreateProduct) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Product>(&format!(
            r#"
            INSERT INTO products
                (seller_id, name, description, price, category, image_url, stock, brand, sport_type, sku)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(data.seller_id)
        .bind(data.name)
        .bind(data.description)
        .bind(data.price)
        .bind(data.category)
        .bind(data.image_url)
        .bind(data.stock)
        .bind(data.brand)
        .bind(data.sport_type)
        .bind(data.sku)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Loads a product and locks its row until the transaction ends
    pub async fn find_for_update(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(conn)
        .await
    }

    /// Lists products matching the filter, newest first
    pub async fn list(pool: &PgPool, filter: &ProductFilter) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Product>(&format!(
            r#"
            SELECT {PRODUCT_COLUMNS} FROM products
            WHERE ($1::TEXT IS NULL OR category = $1)
              AND ($2::TEXT IS NULL OR name ILIKE $2 OR description ILIKE $2)
              AND ($3::NUMERIC IS NULL OR price >= $3)
              AND ($4::NUMERIC IS NULL OR price <= $4)
              AND ($5::UUID IS NULL OR seller_id = $5)
            ORDER BY created_at DESC
            LIMIT $6 OFFSET $7
            "#
        ))
        .bind(filter.category.as_deref())
        .bind(filter.search_pattern())
        .bind(filter.min_price)
        .bind(filter.max_price)
        .bind(filter.seller_id)
        .bind(filter.page_size())
        .bind(filter.offset())
        .fetch_all(pool)
        .await
    }

    /// Categories with product counts, most populated first
    pub async fn categories(pool: &PgPool) -> Result<Vec<CategoryCount>, sqlx::Error> {
        sqlx::query_as::<_, CategoryCount>(
            r#"
            SELECT category AS name, COUNT(*) AS count
            FROM products
            GROUP BY category
            ORDER BY count DESC, name ASC
            "#,
        )
        .fetch_all(pool)
        .await
    }

    /// Updates the given fields
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateProduct,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Product>(&format!(
            r#"
            UPDATE products
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                price = COALESCE($4, price),
                category = COALESCE($5, category),
                image_url = COALESCE($6, image_url),
                stock = COALESCE($7, stock),
                brand = COALESCE($8, brand),
                sport_type = COALESCE($9, sport_type),
                sku = COALESCE($10, sku),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(data.name)
        .bind(data.description)
        .bind(data.price)
        .bind(data.category)
        .bind(data.image_url)
        .bind(data.stock)
        .bind(data.brand)
        .bind(data.sport_type)
        .bind(data.sku)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn increment_views(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE products SET views_count = views_count + 1 WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Takes `quantity` units out of stock and counts them as sold
    pub async fn record_sale<'e, E>(executor: E, id: Uuid, quantity: i32) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            UPDATE products
            SET stock = stock - $2, sales_count = sales_count + $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(quantity)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Returns `quantity` units to stock after a cancellation
    pub async fn restore_stock<'e, E>(
        executor: E,
        id: Uuid,
        quantity: i32,
    ) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            UPDATE products
            SET stock = stock + $2,
                sales_count = GREATEST(sales_count - $2, 0),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(quantity)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Recomputes `rating` and `reviews_count` from the reviews table
    pub async fn refresh_rating<'e, E>(executor: E, id: Uuid) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            UPDATE products p
            SET rating = COALESCE(r.avg_rating, 0),
                reviews_count = COALESCE(r.cnt, 0),
                updated_at = NOW()
            FROM (
                SELECT AVG(rating)::DOUBLE PRECISION AS avg_rating, COUNT(*)::INTEGER AS cnt
                FROM reviews WHERE product_id = $1
            ) r
            WHERE p.id = $1
            "#,
        )
        .bind(id)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Best sellers by `sales_count`, optionally for one seller
    pub async fn top_selling(
        pool: &PgPool,
        seller_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Product>(&format!(
            r#"
            SELECT {PRODUCT_COLUMNS} FROM products
            WHERE $1::UUID IS NULL OR seller_id = $1
            ORDER BY sales_count DESC, created_at DESC
            LIMIT $2
            "#
        ))
        .bind(seller_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    pub async fn list_by_seller(pool: &PgPool, seller_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE seller_id = $1 ORDER BY created_at DESC"
        ))
        .bind(seller_id)
        .fetch_all(pool)
        .await
    }

    pub async fn count(pool: &PgPool, seller_id: Option<Uuid>) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM products WHERE $1::UUID IS NULL OR seller_id = $1",
        )
        .bind(seller_id)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_is_clamped() {
        let mut filter = ProductFilter::default();
        assert_eq!(filter.page_size(), DEFAULT_PAGE_SIZE);

        filter.limit = Some(0);
        assert_eq!(filter.page_size(), 1);

        filter.limit = Some(5000);
        assert_eq!(filter.page_size(), MAX_PAGE_SIZE);
    }

    #[test]
    fn test_negative_skip_is_zero() {
        let filter = ProductFilter {
            skip: Some(-5),
            ..Default::default()
        };
        assert_eq!(filter.offset(), 0);
    }

    #[test]
    fn test_search_pattern() {
        let mut filter = ProductFilter::default();
        assert!(filter.search_pattern().is_none());

        filter.search = Some("   ".to_string());
        assert!(filter.search_pattern().is_none());

        filter.search = Some(" Trail ".to_string());
        assert_eq!(filter.search_pattern().as_deref(), Some("%Trail%"));

        filter.search = Some("100%_cotton".to_string());
        assert_eq!(filter.search_pattern().as_deref(), Some("%100\\%\\_cotton%"));
    }
}
