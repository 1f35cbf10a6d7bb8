/// Integration tests for schema migrations
///
/// Run with: cargo test --test db_migrations_tests -- --test-threads=1

mod common;

use common::migrated_pool;
use matrix_shared::db::migrations::{get_migration_status, run_migrations};
use matrix_shared::db::pool::close_pool;

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let Some(pool) = migrated_pool().await else { return };

    let first = get_migration_status(&pool).await.expect("status");
    run_migrations(&pool).await.expect("Second migration run failed");
    let second = get_migration_status(&pool).await.expect("status");

    assert_eq!(first, second);
    assert!(second.is_up_to_date);

    close_pool(pool).await;
}

#[tokio::test]
async fn test_commerce_tables_exist() {
    let Some(pool) = migrated_pool().await else { return };

    for table in [
        "users",
        "seller_applications",
        "products",
        "reviews",
        "cart_items",
        "wishlist_items",
        "orders",
        "order_items",
        "order_tracking",
        "payments",
        "payout_requests",
        "notifications",
        "chat_rooms",
        "chat_messages",
        "assistant_logs",
        "statistics_snapshots",
    ] {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT FROM information_schema.tables
                WHERE table_schema = current_schema() AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .expect("Failed to query information_schema");

        assert!(exists, "table {} should exist", table);
    }

    close_pool(pool).await;
}

#[tokio::test]
async fn test_email_uniqueness_is_case_insensitive() {
    let Some(pool) = migrated_pool().await else { return };

    let email = format!("Case_{}@Example.com", uuid::Uuid::new_v4().simple());
    let insert = |email: String, username: String| {
        sqlx::query(
            "INSERT INTO users (email, username, password_hash, role) VALUES ($1, $2, 'x', 'buyer')",
        )
        .bind(email)
        .bind(username)
        .execute(&pool)
    };

    insert(email.clone(), format!("u{}", uuid::Uuid::new_v4().simple()))
        .await
        .expect("first insert");
    let duplicate = insert(email.to_lowercase(), format!("u{}", uuid::Uuid::new_v4().simple())).await;

    assert!(duplicate.is_err(), "lowercased duplicate email should be rejected");

    close_pool(pool).await;
}
