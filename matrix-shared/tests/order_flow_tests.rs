/// Order lifecycle against a live database
///
/// Run with: cargo test --test order_flow_tests -- --test-threads=1

mod common;

use common::{create_product, create_user, migrated_pool};
use matrix_shared::models::order::{NewOrderItem, Order, OrderError, OrderStatus, StatusUpdate};
use futures::future::join_all;
use matrix_shared::models::payment::{Payment, PaymentError, PayoutError, PayoutRequest};
use matrix_shared::models::product::Product;
use matrix_shared::models::user::{Role, User};
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

fn address() -> serde_json::Value {
    json!({"street": "1 Stadium Way", "city": "Springfield", "zip": "12345"})
}

#[tokio::test]
async fn test_place_order_snapshots_items_and_moves_stock() {
    let Some(pool) = migrated_pool().await else { return };

    let seller = create_user(&pool, Role::Seller).await;
    let buyer = create_user(&pool, Role::Buyer).await;
    let product = create_product(&pool, seller.id, Decimal::new(2500, 2), 10).await;

    // Two lines for the same product are merged
    let placed = Order::create(
        &pool,
        buyer.id,
        &[
            NewOrderItem { product_id: product.id, quantity: 2 },
            NewOrderItem { product_id: product.id, quantity: 1 },
        ],
        address(),
    )
    .await
    .expect("Failed to place order");

    assert_eq!(placed.items.len(), 1);
    assert_eq!(placed.items[0].quantity, 3);
    assert_eq!(placed.order.total, Decimal::new(7500, 2));
    assert_eq!(placed.order.status, OrderStatus::Pending);

    let after = Product::find_by_id(&pool, product.id).await.unwrap().unwrap();
    assert_eq!(after.stock, 7);
    assert_eq!(after.sales_count, 3);
}

#[tokio::test]
async fn test_insufficient_stock_changes_nothing() {
    let Some(pool) = migrated_pool().await else { return };

    let seller = create_user(&pool, Role::Seller).await;
    let buyer = create_user(&pool, Role::Buyer).await;
    let product = create_product(&pool, seller.id, Decimal::new(1000, 2), 1).await;

    let result = Order::create(
        &pool,
        buyer.id,
        &[NewOrderItem { product_id: product.id, quantity: 2 }],
        address(),
    )
    .await;

    assert!(matches!(result, Err(OrderError::InsufficientStock(_))));

    let after = Product::find_by_id(&pool, product.id).await.unwrap().unwrap();
    assert_eq!(after.stock, 1);
}

#[tokio::test]
async fn test_completion_credits_seller_and_cancel_restores_stock() {
    let Some(pool) = migrated_pool().await else { return };

    let seller = create_user(&pool, Role::Seller).await;
    let buyer = create_user(&pool, Role::Buyer).await;
    let product = create_product(&pool, seller.id, Decimal::new(10000, 2), 5).await;

    let items = [NewOrderItem { product_id: product.id, quantity: 1 }];

    let completed = Order::create(&pool, buyer.id, &items, address()).await.unwrap();
    Payment::record(&pool, completed.order.id, buyer.id, completed.order.total, "card")
        .await
        .expect("Failed to record payment");
    let paid = Order::find_by_id(&pool, completed.order.id).await.unwrap().unwrap();
    assert_eq!(paid.status, OrderStatus::Processing);

    Order::update_status(&pool, paid.id, OrderStatus::Completed, StatusUpdate::default())
        .await
        .expect("Failed to complete order");

    // 100.00 minus the 10% platform fee
    let credited = User::find_by_id(&pool, seller.id).await.unwrap().unwrap();
    assert_eq!(credited.balance, Decimal::new(9000, 2));

    let again = Order::update_status(&pool, paid.id, OrderStatus::Cancelled, StatusUpdate::default()).await;
    assert!(matches!(again, Err(OrderError::InvalidTransition { .. })));

    let cancelled = Order::create(&pool, buyer.id, &items, address()).await.unwrap();
    Order::update_status(&pool, cancelled.order.id, OrderStatus::Cancelled, StatusUpdate::default())
        .await
        .expect("Failed to cancel order");

    let after = Product::find_by_id(&pool, product.id).await.unwrap().unwrap();
    assert_eq!(after.stock, 4);
}

#[tokio::test]
async fn test_payout_approval_requires_balance() {
    let Some(pool) = migrated_pool().await else { return };

    let seller = create_user(&pool, Role::Seller).await;
    User::credit_balance(&pool, seller.id, Decimal::new(5000, 2)).await.unwrap();

    let request = PayoutRequest::request(&pool, seller.id, Decimal::new(5000, 2))
        .await
        .expect("Failed to create payout request");

    // balance spent elsewhere before the decision
    User::debit_balance(&pool, seller.id, Decimal::new(5000, 2)).await.unwrap();

    let approved = PayoutRequest::approve(&pool, request.id).await;
    assert!(matches!(approved, Err(PayoutError::InsufficientBalance)));

    let rejected = PayoutRequest::reject(&pool, request.id).await.expect("reject");
    assert!(rejected.decided_at.is_some());

    let twice = PayoutRequest::reject(&pool, request.id).await;
    assert!(matches!(twice, Err(PayoutError::AlreadyDecided)));
}

#[tokio::test]
async fn test_concurrent_payout_requests_never_overdraw() {
    let Some(pool) = migrated_pool().await else { return };

    let seller = create_user(&pool, Role::Seller).await;
    User::credit_balance(&pool, seller.id, Decimal::new(10000, 2)).await.unwrap();

    // four requests of 40.00 against 100.00: two fit
    let results = join_all((0..4).map(|_| {
        PayoutRequest::request(&pool, seller.id, Decimal::new(4000, 2))
    }))
    .await;

    let filed = results.iter().filter(|r| r.is_ok()).count();
    let refused = results
        .iter()
        .filter(|r| matches!(r, Err(PayoutError::ExceedsAvailable { .. })))
        .count();
    assert_eq!(filed, 2);
    assert_eq!(refused, 2);

    let pending = PayoutRequest::pending_total(&pool, seller.id).await.unwrap();
    assert_eq!(pending, Decimal::new(8000, 2));
}

#[tokio::test]
async fn test_concurrent_payments_pay_an_order_once() {
    let Some(pool) = migrated_pool().await else { return };

    let seller = create_user(&pool, Role::Seller).await;
    let buyer = create_user(&pool, Role::Buyer).await;
    let product = create_product(&pool, seller.id, Decimal::new(3000, 2), 5).await;

    let placed = Order::create(
        &pool,
        buyer.id,
        &[NewOrderItem { product_id: product.id, quantity: 1 }],
        address(),
    )
    .await
    .unwrap();

    let results = join_all((0..4).map(|_| {
        Payment::record(&pool, placed.order.id, buyer.id, placed.order.total, "card")
    }))
    .await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter(|r| r.is_err())
        .all(|r| matches!(r, Err(PaymentError::AlreadyPaid))));

    let payments = Payment::list(&pool, Some(buyer.id), 0, 10).await.unwrap();
    assert_eq!(payments.len(), 1);
}

#[tokio::test]
async fn test_payment_checks_buyer_and_amount() {
    let Some(pool) = migrated_pool().await else { return };

    let seller = create_user(&pool, Role::Seller).await;
    let buyer = create_user(&pool, Role::Buyer).await;
    let stranger = create_user(&pool, Role::Buyer).await;
    let product = create_product(&pool, seller.id, Decimal::new(3000, 2), 5).await;

    let placed = Order::create(
        &pool,
        buyer.id,
        &[NewOrderItem { product_id: product.id, quantity: 2 }],
        address(),
    )
    .await
    .unwrap();

    let wrong_payer =
        Payment::record(&pool, placed.order.id, stranger.id, placed.order.total, "card").await;
    assert!(matches!(wrong_payer, Err(PaymentError::NotBuyer)));

    let short = Payment::record(&pool, placed.order.id, buyer.id, Decimal::new(3000, 2), "card").await;
    assert!(matches!(short, Err(PaymentError::AmountMismatch { .. })));

    let unknown = Payment::record(&pool, Uuid::new_v4(), buyer.id, Decimal::ONE, "card").await;
    assert!(matches!(unknown, Err(PaymentError::OrderNotFound)));
}

#[tokio::test]
async fn test_crossed_checkouts_do_not_deadlock() {
    let Some(pool) = migrated_pool().await else { return };

    let seller = create_user(&pool, Role::Seller).await;
    let first = create_product(&pool, seller.id, Decimal::new(1000, 2), 50).await;
    let second = create_product(&pool, seller.id, Decimal::new(2000, 2), 50).await;

    let mut buyers = Vec::new();
    for _ in 0..4 {
        buyers.push(create_user(&pool, Role::Buyer).await);
    }

    let checkouts = buyers.iter().enumerate().map(|(i, buyer)| {
        let mut cart = vec![
            NewOrderItem { product_id: first.id, quantity: 1 },
            NewOrderItem { product_id: second.id, quantity: 1 },
        ];
        if i % 2 == 1 {
            cart.reverse();
        }
        let pool = pool.clone();
        let buyer_id = buyer.id;
        async move { Order::create(&pool, buyer_id, &cart, address()).await }
    });

    let results = join_all(checkouts).await;
    for result in &results {
        assert!(result.is_ok(), "checkout failed: {:?}", result.as_ref().err());
    }

    // items come back in cart order
    let reversed = results[1].as_ref().unwrap();
    assert_eq!(reversed.items[0].product_id, Some(second.id));

    for product in [&first, &second] {
        let after = Product::find_by_id(&pool, product.id).await.unwrap().unwrap();
        assert_eq!(after.stock, 46);
        assert_eq!(after.sales_count, 4);
    }

    // cancelling returns stock for both products
    Order::update_status(&pool, reversed.order.id, OrderStatus::Cancelled, StatusUpdate::default())
        .await
        .expect("Failed to cancel order");
    let after = Product::find_by_id(&pool, first.id).await.unwrap().unwrap();
    assert_eq!(after.stock, 47);
}

#[tokio::test]
async fn test_shipped_order_can_go_back_to_processing() {
    let Some(pool) = migrated_pool().await else { return };

    let seller = create_user(&pool, Role::Seller).await;
    let buyer = create_user(&pool, Role::Buyer).await;
    let product = create_product(&pool, seller.id, Decimal::new(1500, 2), 3).await;

    let placed = Order::create(
        &pool,
        buyer.id,
        &[NewOrderItem { product_id: product.id, quantity: 1 }],
        address(),
    )
    .await
    .unwrap();

    Order::update_status(&pool, placed.order.id, OrderStatus::Shipped, StatusUpdate::default())
        .await
        .unwrap();
    let back = Order::update_status(&pool, placed.order.id, OrderStatus::Processing, StatusUpdate::default())
        .await
        .expect("Failed to move order back");
    assert_eq!(back.order.status, OrderStatus::Processing);
}
