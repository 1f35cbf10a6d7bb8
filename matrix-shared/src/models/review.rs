/// Product reviews and rating summaries
///
/// One review per user per product (`reviews_product_user_key`). Adding a
/// review recomputes the product's denormalized rating in the same
/// transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::product::Product;

/// Review joined with the author's public name
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Review {
    pub id: Uuid,
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub rating: i16,
    pub comment: String,
    pub helpful_count: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReview {
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub rating: i16,
    pub comment: String,
}

/// Aggregate shown above a product's review list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingSummary {
    pub average_rating: f64,
    pub formatted_rating: String,
    pub reviews_count: usize,
    pub top_review: Option<Review>,
}

/// Mean rating, 0 when there are no reviews
pub fn average_rating(reviews: &[Review]) -> f64 {
    if reviews.is_empty() {
        return 0.0;
    }

    let sum: f64 = reviews.iter().map(|r| f64::from(r.rating)).sum();
    sum / reviews.len() as f64
}

/// Highest rated review; ties go to the most helpful, then the newest
pub fn top_rated_review(reviews: &[Review]) -> Option<&Review> {
    reviews.iter().max_by(|a, b| {
        a.rating
            .cmp(&b.rating)
            .then(a.helpful_count.cmp(&b.helpful_count))
            .then(a.created_at.cmp(&b.created_at))
    })
}

/// Formats a rating with a fixed number of decimals; "0.0" style zero when absent
///
/// # Example
///
/// ```
/// use matrix_shared::models::review::format_rating;
///
/// assert_eq!(format_rating(Some(4.256), 1), "4.3");
/// assert_eq!(format_rating(None, 1), "0.0");
/// assert_eq!(format_rating(Some(3.0), 2), "3.00");
/// ```
pub fn format_rating(rating: Option<f64>, decimals: usize) -> String {
    match rating.filter(|r| r.is_finite()) {
        Some(value) => format!("{:.*}", decimals, value),
        None => format!("{:.*}", decimals, 0.0),
    }
}

/// Builds the summary for a product's reviews
pub fn summarize(reviews: &[Review]) -> RatingSummary {
    let average = average_rating(reviews);
    RatingSummary {
        average_rating: (average * 100.0).round() / 100.0,
        formatted_rating: format_rating(Some(average), 1),
        reviews_count: reviews.len(),
        top_review: top_rated_review(reviews).cloned(),
    }
}

impl Review {
    /// Adds a review and refreshes the product rating
    ///
    /// # Errors
    ///
    /// Unique violation on `reviews_product_user_key` when the user already
    /// reviewed this product.
    pub async fn create(pool: &PgPool, data: CreateReview) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let (id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO reviews (product_id, user_id, rating, comment)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(data.product_id)
        .bind(data.user_id)
        .bind(data.rating)
        .bind(data.comment)
        .fetch_one(&mut *tx)
        .await?;

        Product::refresh_rating(&mut *tx, data.product_id).await?;

        let review = sqlx::query_as::<_, Review>(
            r#"
            SELECT r.id, r.product_id, r.user_id, u.username, r.rating, r.comment,
                   r.helpful_count, r.created_at
            FROM reviews r JOIN users u ON u.id = r.user_id
            WHERE r.id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(review)
    }

    /// Lists a product's reviews, newest first
    pub async fn list_for_product(
        pool: &PgPool,
        product_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Review>(
            r#"
            SELECT r.id, r.product_id, r.user_id, u.username, r.rating, r.comment,
                   r.helpful_count, r.created_at
            FROM reviews r JOIN users u ON u.id = r.user_id
            WHERE r.product_id = $1
            ORDER BY r.created_at DESC
            "#,
        )
        .bind(product_id)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn review(rating: i16, helpful: i32, age_days: i64) -> Review {
        Review {
            id: Uuid::new_v4(),
            product_id: Uuid::nil(),
            user_id: Uuid::new_v4(),
            username: "runner".to_string(),
            rating,
            comment: String::new(),
            helpful_count: helpful,
            created_at: Utc::now() - Duration::days(age_days),
        }
    }

    #[test]
    fn test_average_rating() {
        assert_eq!(average_rating(&[]), 0.0);
        assert_eq!(average_rating(&[review(4, 0, 0), review(5, 0, 0)]), 4.5);
    }

    #[test]
    fn test_top_rated_review() {
        assert!(top_rated_review(&[]).is_none());

        let low = review(2, 10, 0);
        let high_old = review(5, 1, 10);
        let high_helpful = review(5, 3, 20);
        let reviews = vec![low, high_old, high_helpful.clone()];

        assert_eq!(top_rated_review(&reviews).map(|r| r.id), Some(high_helpful.id));
    }

    #[test]
    fn test_format_rating() {
        assert_eq!(format_rating(Some(4.25), 2), "4.25");
        assert_eq!(format_rating(Some(4.0), 1), "4.0");
        assert_eq!(format_rating(None, 2), "0.00");
        assert_eq!(format_rating(Some(f64::NAN), 1), "0.0");
    }

    #[test]
    fn test_summarize() {
        let summary = summarize(&[review(5, 0, 1), review(4, 0, 2), review(4, 0, 3)]);

        assert_eq!(summary.reviews_count, 3);
        assert_eq!(summary.average_rating, 4.33);
        assert_eq!(summary.formatted_rating, "4.3");
        assert_eq!(summary.top_review.map(|r| r.rating), Some(5));

        let empty = summarize(&[]);
        assert_eq!(empty.average_rating, 0.0);
        assert_eq!(empty.formatted_rating, "0.0");
        assert!(empty.top_review.is_none());
    }
}
