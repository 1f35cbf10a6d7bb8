/// End-to-end flows against a live database
///
/// Skipped without `DATABASE_URL`. Run with:
/// cargo test -p matrix-api --test api_flow_tests -- --test-threads=1

mod common;

use axum::http::StatusCode;
use chrono::SecondsFormat;
use common::{get, with_json, TestContext};
use futures::future::join_all;
use matrix_api::routes::notifications::notify_committed;
use matrix_shared::models::chat::{ChatMessage, ChatRoom};
use matrix_shared::models::notification::{NewNotification, NotificationKind};
use matrix_shared::models::user::{Role, User};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use uuid::Uuid;

/// Lists a product as the seller and returns its id
async fn list_product(ctx: &TestContext, seller_token: &str, price: f64, stock: i32) -> String {
    let (status, product) = ctx
        .send(with_json(
            "POST",
            "/api/products",
            Some(seller_token),
            json!({
                "name": format!("Match Ball {}", &Uuid::new_v4().simple().to_string()[..6]),
                "description": "FIFA quality size 5",
                "price": price,
                "category": "Football",
                "stock": stock
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    product["id"].as_str().unwrap().to_string()
}

/// Places an order for `quantity` of one product and returns the order body
async fn place_order(ctx: &TestContext, buyer_token: &str, product_id: &str, quantity: i32) -> Value {
    let (status, order) = ctx
        .send(with_json(
            "POST",
            "/api/orders",
            Some(buyer_token),
            json!({
                "items": [{"product_id": product_id, "quantity": quantity}],
                "shipping_address": {"street": "9 Pitch Road", "city": "Leeds"}
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    order
}

fn seller_application() -> Value {
    json!({
        "business_name": "Goal Line Sports",
        "business_type": "retail",
        "description": "Football boots and kits",
        "address": "12 Stadium Road",
        "phone": "+44 20 7946 0000"
    })
}

#[tokio::test]
async fn test_register_login_and_profile() {
    let Some(ctx) = TestContext::new().await else { return };

    let tag = &Uuid::new_v4().simple().to_string()[..10];
    let email = format!("{}@example.com", tag);

    let (status, body) = ctx
        .send(with_json(
            "POST",
            "/api/users/register",
            None,
            json!({
                "email": email,
                "username": format!("runner_{}", tag),
                "password": "Marathon2025",
                "full_name": "Ada Runner"
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["token_type"], "bearer");
    assert_eq!(body["user"]["role"], "buyer");

    // Same email again
    let (status, _) = ctx
        .send(with_json(
            "POST",
            "/api/users/register",
            None,
            json!({
                "email": email,
                "username": format!("other_{}", tag),
                "password": "Marathon2025"
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = ctx
        .send(with_json(
            "POST",
            "/api/users/login",
            None,
            json!({"email": email, "password": "wrong-password1"}),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = ctx
        .send(with_json(
            "POST",
            "/api/users/login",
            None,
            json!({"email": email, "password": "Marathon2025"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["access_token"].as_str().unwrap().to_string();

    let (status, body) = ctx.send(get("/api/users/me", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], email);
}

#[tokio::test]
async fn test_checkout_flow_notifies_both_sides() {
    let Some(ctx) = TestContext::new().await else { return };

    let (_, seller_token) = ctx.user(Role::Seller).await;
    let (buyer, buyer_token) = ctx.user(Role::Buyer).await;

    let (status, product) = ctx
        .send(with_json(
            "POST",
            "/api/products",
            Some(&seller_token),
            json!({
                "name": "Carbon Tennis Racket",
                "description": "Tournament weight",
                "price": 25.0,
                "category": "Tennis",
                "stock": 5
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let product_id = product["id"].as_str().unwrap().to_string();

    // Buyers cannot list products
    let (status, _) = ctx
        .send(with_json(
            "POST",
            "/api/products",
            Some(&buyer_token),
            json!({"name": "Nope", "price": 1.0, "category": "Tennis"}),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, cart) = ctx
        .send(with_json(
            "POST",
            "/api/cart",
            Some(&buyer_token),
            json!({"product_id": product_id, "quantity": 2}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["summary"]["subtotal"].as_f64(), Some(50.0));

    let (status, _) = ctx
        .send(with_json(
            "POST",
            "/api/cart",
            Some(&buyer_token),
            json!({"product_id": product_id, "quantity": 4}),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, order) = ctx
        .send(with_json(
            "POST",
            "/api/orders",
            Some(&buyer_token),
            json!({
                "items": [{"product_id": product_id, "quantity": 2}],
                "shipping_address": {"street": "1 Court Lane", "city": "Wimbledon"}
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["user_id"], buyer.id.to_string());
    let order_id = order["id"].as_str().unwrap().to_string();
    let order_number = order["order_number"].as_str().unwrap().to_string();

    let (_, inbox) = ctx.send(get("/api/notifications", Some(&seller_token))).await;
    assert!(inbox["notifications"]
        .as_array()
        .unwrap()
        .iter()
        .any(|n| n["type"] == "new_order"));

    let (status, updated) = ctx
        .send(with_json(
            "PUT",
            &format!("/api/orders/{}/status", order_id),
            Some(&seller_token),
            json!({"status": "shipped", "location": "Depot 4"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "shipped");

    let (_, inbox) = ctx.send(get("/api/notifications", Some(&buyer_token))).await;
    assert!(inbox["unread_count"].as_i64().unwrap() >= 1);

    let (status, tracking) = ctx
        .send(get(&format!("/api/orders/track/{}", order_number), None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!tracking["tracking_history"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_statistics_scoping() {
    let Some(ctx) = TestContext::new().await else { return };

    let (seller, seller_token) = ctx.user(Role::Seller).await;
    let (_, buyer_token) = ctx.user(Role::Buyer).await;
    let (_, admin_token) = ctx.user(Role::Admin).await;

    let (status, _) = ctx.send(get("/api/statistics", Some(&buyer_token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = ctx.send(get("/api/statistics", Some(&seller_token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["seller_id"], seller.id.to_string());
    assert_eq!(body["total_orders"], 0);

    let other = Uuid::new_v4();
    let (status, _) = ctx
        .send(get(&format!("/api/statistics?seller_id={}", other), Some(&seller_token)))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = ctx
        .send(get("/api/statistics/predictions", Some(&admin_token)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["predictions"].as_array().unwrap().len(), 9);

    let (status, body) = ctx
        .send(get("/api/statistics/overview?period=week", Some(&seller_token)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["profit_margin"].as_f64(), Some(30.0));
    assert_eq!(body["monthly_revenue"].as_array().unwrap().len(), 12);
}

#[tokio::test]
async fn test_forecast_without_history_is_not_found() {
    let Some(ctx) = TestContext::new().await else { return };

    let (_, seller_token) = ctx.user(Role::Seller).await;

    let (status, body) = ctx
        .send(get("/api/seller/predictions/6-month", Some(&seller_token)))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "No historical data available for forecasting");

    let (status, _) = ctx
        .send(get("/api/seller/predictions/10-year", Some(&seller_token)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = ctx
        .send(get("/api/seller/dashboard?timeframe=6months", Some(&seller_token)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["timeframe"], "6months");
}

#[tokio::test]
async fn test_seller_application_review() {
    let Some(ctx) = TestContext::new().await else { return };

    let (applicant, applicant_token) = ctx.user(Role::Buyer).await;
    let (_, rejected_token) = ctx.user(Role::Buyer).await;
    let (_, seller_token) = ctx.user(Role::Seller).await;
    let (_, admin_token) = ctx.user(Role::Admin).await;

    let (status, _) = ctx
        .send(with_json("POST", "/api/users/become-seller", Some(&seller_token), seller_application()))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, application) = ctx
        .send(with_json("POST", "/api/users/become-seller", Some(&applicant_token), seller_application()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(application["status"], "pending");
    let application_id = application["id"].as_str().unwrap().to_string();

    let (status, _) = ctx
        .send(with_json("POST", "/api/users/become-seller", Some(&applicant_token), seller_application()))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // admins see the broadcast
    let (_, inbox) = ctx.send(get("/api/notifications", Some(&admin_token))).await;
    assert!(inbox["notifications"]
        .as_array()
        .unwrap()
        .iter()
        .any(|n| n["type"] == "seller_application" && n["data"]["application_id"] == application_id.as_str()));

    let (status, _) = ctx
        .send(with_json(
            "POST",
            &format!("/api/admin/seller-applications/{}/approve", application_id),
            Some(&applicant_token),
            json!({}),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, approved) = ctx
        .send(with_json(
            "POST",
            &format!("/api/admin/seller-applications/{}/approve", application_id),
            Some(&admin_token),
            json!({}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["status"], "approved");

    let (_, me) = ctx.send(get("/api/users/me", Some(&applicant_token))).await;
    assert_eq!(me["id"], applicant.id.to_string());
    assert_eq!(me["role"], "seller");

    let (status, _) = ctx
        .send(with_json(
            "POST",
            &format!("/api/admin/seller-applications/{}/reject", application_id),
            Some(&admin_token),
            json!({"reason": "Too late"}),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, second) = ctx
        .send(with_json("POST", "/api/users/become-seller", Some(&rejected_token), seller_application()))
        .await;
    let (status, rejected) = ctx
        .send(with_json(
            "POST",
            &format!("/api/admin/seller-applications/{}/reject", second["id"].as_str().unwrap()),
            Some(&admin_token),
            json!({"reason": "Missing tax id"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rejected["status"], "rejected");
    assert_eq!(rejected["rejection_reason"], "Missing tax id");

    let (_, me) = ctx.send(get("/api/users/me", Some(&rejected_token))).await;
    assert_eq!(me["role"], "buyer");
}

#[tokio::test]
async fn test_payment_rules() {
    let Some(ctx) = TestContext::new().await else { return };

    let (_, seller_token) = ctx.user(Role::Seller).await;
    let (_, buyer_token) = ctx.user(Role::Buyer).await;
    let (_, stranger_token) = ctx.user(Role::Buyer).await;

    let product_id = list_product(&ctx, &seller_token, 20.0, 10).await;
    let order = place_order(&ctx, &buyer_token, &product_id, 2).await;
    let order_id = order["id"].as_str().unwrap().to_string();

    let pay = |token: &str, amount: f64| {
        with_json(
            "POST",
            "/api/payments/process",
            Some(token),
            json!({"order_id": order_id, "amount": amount, "payment_method": "card"}),
        )
    };

    let (status, body) = ctx.send(pay(&buyer_token, 39.99)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("does not match order total"));

    let (status, _) = ctx.send(pay(&stranger_token, 40.0)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, payment) = ctx.send(pay(&buyer_token, 40.0)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(payment["transaction_id"].as_str().unwrap().starts_with("txn_"));

    let (_, paid) = ctx.send(get(&format!("/api/orders/{}", order_id), Some(&buyer_token))).await;
    assert_eq!(paid["payment_status"], "paid");
    assert_eq!(paid["status"], "processing");

    let (status, _) = ctx.send(pay(&buyer_token, 40.0)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_concurrent_payments_charge_once() {
    let Some(ctx) = TestContext::new().await else { return };

    let (_, seller_token) = ctx.user(Role::Seller).await;
    let (_, buyer_token) = ctx.user(Role::Buyer).await;

    let product_id = list_product(&ctx, &seller_token, 15.0, 10).await;
    let order = place_order(&ctx, &buyer_token, &product_id, 1).await;

    let attempts = (0..4).map(|_| {
        ctx.send(with_json(
            "POST",
            "/api/payments/process",
            Some(&buyer_token),
            json!({"order_id": order["id"], "amount": 15.0, "payment_method": "card"}),
        ))
    });
    let statuses: Vec<StatusCode> = join_all(attempts).await.into_iter().map(|(s, _)| s).collect();

    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::CREATED).count(), 1);
    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::CONFLICT).count(), 3);

    let (_, payments) = ctx.send(get("/api/payments", Some(&buyer_token))).await;
    assert_eq!(payments.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_shipped_order_returns_to_processing() {
    let Some(ctx) = TestContext::new().await else { return };

    let (_, seller_token) = ctx.user(Role::Seller).await;
    let (_, buyer_token) = ctx.user(Role::Buyer).await;

    let product_id = list_product(&ctx, &seller_token, 30.0, 4).await;
    let order = place_order(&ctx, &buyer_token, &product_id, 1).await;
    let uri = format!("/api/orders/{}/status", order["id"].as_str().unwrap());

    let (status, _) = ctx
        .send(with_json("PUT", &uri, Some(&seller_token), json!({"status": "shipped"})))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = ctx
        .send(with_json(
            "PUT",
            &uri,
            Some(&seller_token),
            json!({"status": "processing", "description": "Parcel returned to depot"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "processing");

    let (status, _) = ctx
        .send(with_json("PUT", &uri, Some(&seller_token), json!({"status": "delivered"})))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = ctx
        .send(with_json("PUT", &uri, Some(&seller_token), json!({"status": "cancelled"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_reviews_refresh_product_rating() {
    let Some(ctx) = TestContext::new().await else { return };

    let (_, seller_token) = ctx.user(Role::Seller).await;
    let (_, first_token) = ctx.user(Role::Buyer).await;
    let (_, second_token) = ctx.user(Role::Buyer).await;

    let product_id = list_product(&ctx, &seller_token, 60.0, 3).await;
    let uri = format!("/api/products/{}/reviews", product_id);

    let (status, _) = ctx
        .send(with_json("POST", &uri, Some(&first_token), json!({"rating": 5, "comment": "Perfect bounce"})))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = ctx
        .send(with_json("POST", &uri, Some(&first_token), json!({"rating": 1})))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "You have already reviewed this product");

    let (status, _) = ctx
        .send(with_json("POST", &uri, Some(&second_token), json!({"rating": 4})))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = ctx
        .send(with_json("POST", &uri, Some(&second_token), json!({"rating": 6})))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, product) = ctx.send(get(&format!("/api/products/{}", product_id), None)).await;
    assert_eq!(product["reviews_count"], 2);
    assert_eq!(product["rating"].as_f64(), Some(4.5));

    let (_, reviews) = ctx.send(get(&uri, None)).await;
    assert_eq!(reviews["reviews"].as_array().unwrap().len(), 2);
    assert_eq!(reviews["summary"]["average_rating"].as_f64(), Some(4.5));
}

#[tokio::test]
async fn test_wishlist_move_to_cart() {
    let Some(ctx) = TestContext::new().await else { return };

    let (_, seller_token) = ctx.user(Role::Seller).await;
    let (_, buyer_token) = ctx.user(Role::Buyer).await;

    let product_id = list_product(&ctx, &seller_token, 12.5, 2).await;

    let (status, item) = ctx
        .send(with_json("POST", "/api/wishlist", Some(&buyer_token), json!({"product_id": product_id})))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    // adding again keeps the original entry
    let (status, again) = ctx
        .send(with_json("POST", "/api/wishlist", Some(&buyer_token), json!({"product_id": product_id})))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(again["id"], item["id"]);

    let move_uri = format!("/api/wishlist/{}/move-to-cart", item["id"].as_str().unwrap());
    let (status, cart) = ctx.send(with_json("POST", &move_uri, Some(&buyer_token), json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["items"].as_array().unwrap().len(), 1);
    assert_eq!(cart["summary"]["subtotal"].as_f64(), Some(12.5));

    let (_, wishlist) = ctx.send(get("/api/wishlist", Some(&buyer_token))).await;
    assert!(wishlist.as_array().unwrap().is_empty());

    let (status, _) = ctx.send(with_json("POST", &move_uri, Some(&buyer_token), json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_direct_messages_and_contacts() {
    let Some(ctx) = TestContext::new().await else { return };

    let (alice, alice_token) = ctx.user(Role::Buyer).await;
    let (bob, bob_token) = ctx.user(Role::Seller).await;
    let (_, outsider_token) = ctx.user(Role::Buyer).await;

    for content in ["Are the boots in stock?", "Size 42 please"] {
        let (status, _) = ctx
            .send(with_json(
                "POST",
                "/api/chat/messages",
                Some(&alice_token),
                json!({"receiver_id": bob.id, "content": content}),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, _) = ctx
        .send(with_json(
            "POST",
            "/api/chat/messages",
            Some(&alice_token),
            json!({"receiver_id": alice.id, "content": "note to self"}),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, contacts) = ctx.send(get("/api/chat/contacts", Some(&bob_token))).await;
    let from_alice = contacts
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["user_id"] == alice.id.to_string())
        .cloned()
        .unwrap();
    assert_eq!(from_alice["unread_count"], 2);
    assert_eq!(from_alice["last_message"], "Size 42 please");

    let (status, thread) = ctx
        .send(get(&format!("/api/chat/messages?other_user_id={}", alice.id), Some(&bob_token)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(thread.as_array().unwrap().len(), 2);

    let (_, contacts) = ctx.send(get("/api/chat/contacts", Some(&bob_token))).await;
    assert_eq!(contacts[0]["unread_count"], 0);

    // rooms are members only
    let (status, room) = ctx
        .send(with_json(
            "POST",
            "/api/chat/rooms",
            Some(&alice_token),
            json!({"name": "Order help", "participants": [bob.id]}),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let room_uri = format!("/api/chat/rooms/{}/messages", room["id"].as_str().unwrap());

    let (status, _) = ctx.send(get(&room_uri, Some(&outsider_token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = ctx
        .send(with_json("POST", &room_uri, Some(&outsider_token), json!({"content": "hi"})))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = ctx.send(get(&room_uri, Some(&bob_token))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_room_polling_returns_oldest_unseen_first() {
    let Some(ctx) = TestContext::new().await else { return };

    let (host, host_token) = ctx.user(Role::Buyer).await;
    let room = ChatRoom::create(&ctx.db, "Matchday", host.id, &[]).await.unwrap();

    let mut posted = Vec::new();
    for n in 1..=60 {
        let message = ChatMessage::post_to_room(&ctx.db, room.id, host.id, &format!("m{}", n), false)
            .await
            .unwrap();
        posted.push(message);
    }

    let since = posted[0].created_at.to_rfc3339_opts(SecondsFormat::Micros, true);
    let (status, page) = ctx
        .send(get(
            &format!("/api/chat/rooms/{}/messages?since={}&limit=10", room.id, since),
            Some(&host_token),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    let contents: Vec<&str> = page
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    let expected: Vec<String> = (2..=11).map(|n| format!("m{}", n)).collect();
    assert_eq!(contents, expected);

    // without since: the latest page, oldest first
    let (_, latest) = ctx
        .send(get(&format!("/api/chat/rooms/{}/messages?limit=3", room.id), Some(&host_token)))
        .await;
    let latest: Vec<&str> = latest
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert_eq!(latest, vec!["m58", "m59", "m60"]);
}

#[tokio::test]
async fn test_seller_revenue_breakdown() {
    let Some(ctx) = TestContext::new().await else { return };

    let (seller, seller_token) = ctx.user(Role::Seller).await;
    let (_, buyer_token) = ctx.user(Role::Buyer).await;
    let (_, other_seller_token) = ctx.user(Role::Seller).await;

    let product_id = list_product(&ctx, &seller_token, 50.0, 5).await;
    let order = place_order(&ctx, &buyer_token, &product_id, 2).await;
    let (status, _) = ctx
        .send(with_json(
            "PUT",
            &format!("/api/orders/{}/status", order["id"].as_str().unwrap()),
            Some(&seller_token),
            json!({"status": "completed"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    // a second, open order doesn't count
    place_order(&ctx, &buyer_token, &product_id, 1).await;

    let (status, payout) = ctx
        .send(with_json("POST", "/api/payouts", Some(&seller_token), json!({"amount": 30.0})))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(payout["status"], "pending");

    let (status, body) = ctx
        .send(with_json("POST", "/api/payouts", Some(&seller_token), json!({"amount": 61.0})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Insufficient balance: 60.00 available for payout");

    let uri = format!("/api/users/seller/{}/revenue", seller.id);
    let (status, revenue) = ctx.send(get(&uri, Some(&seller_token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(revenue["total_revenue"].as_f64(), Some(100.0));
    assert_eq!(revenue["platform_fee"].as_f64(), Some(10.0));
    assert_eq!(revenue["seller_earnings"].as_f64(), Some(90.0));
    assert_eq!(revenue["current_balance"].as_f64(), Some(90.0));
    assert_eq!(revenue["pending_payouts"].as_f64(), Some(30.0));
    assert_eq!(revenue["total_orders"], 1);

    let (status, _) = ctx.send(get(&uri, Some(&other_seller_token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_concurrent_payout_requests_respect_balance() {
    let Some(ctx) = TestContext::new().await else { return };

    let (seller, seller_token) = ctx.user(Role::Seller).await;
    User::credit_balance(&ctx.db, seller.id, Decimal::new(10000, 2)).await.unwrap();

    let attempts = (0..5).map(|_| {
        ctx.send(with_json("POST", "/api/payouts", Some(&seller_token), json!({"amount": 30.0})))
    });
    let statuses: Vec<StatusCode> = join_all(attempts).await.into_iter().map(|(s, _)| s).collect();

    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::CREATED).count(), 3);
    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::BAD_REQUEST).count(), 2);
}

#[tokio::test]
async fn test_undeliverable_notification_does_not_fail_the_caller() {
    let Some(ctx) = TestContext::new().await else { return };

    // no such user: the insert violates the recipient foreign key
    let stored = notify_committed(
        &ctx.state,
        NewNotification::to_user(Uuid::new_v4(), NotificationKind::System, "Hello", "Nobody home"),
    )
    .await;
    assert!(stored.is_none());

    let (user, _) = ctx.user(Role::Buyer).await;
    let stored = notify_committed(
        &ctx.state,
        NewNotification::to_user(user.id, NotificationKind::System, "Hello", "Welcome"),
    )
    .await;
    assert_eq!(stored.unwrap().user_id, Some(user.id));
}
