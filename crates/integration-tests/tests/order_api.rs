//! Integration tests for the order API.

#![allow(clippy::unwrap_used)]

use std::collections::HashSet;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tower::ServiceExt;

use muchio_core::ProductId;
use muchio_integration_tests::{TestContext, checkout_completed_event, line_item, tracked_product};
use muchio_server::db::ProductStore;
use muchio_server::services::{ReconcileSummary, reconcile_pending};

fn order_body(user: &str) -> Value {
    json!({
        "user": user,
        "items": [{
            "productId": 2,
            "name": "Olive Soap",
            "quantity": 1,
            "price": "5.00",
            "total": "5.00"
        }],
        "subtotal": "5.00",
        "totalPrice": "5.00",
        "paymentStatus": "paid",
        "customer_details": { "name": "Ana Lima", "phone": "+1 604 555 0199" }
    })
}

async fn create_order(ctx: &TestContext, user: &str) -> Value {
    let (status, body) = ctx
        .send_json(Method::POST, "/orders/create-order", &order_body(user))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_endpoints() {
    let ctx = TestContext::new();

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = ctx.request(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"ok");

    let (status, _) = ctx.get("/health/ready").await;
    assert_eq!(status, StatusCode::OK);
}

// =============================================================================
// Create order
// =============================================================================

#[tokio::test]
async fn test_create_order() {
    let ctx = TestContext::new();
    ctx.store.insert_product(tracked_product(2, 4)).await;

    let body = create_order(&ctx, "Ana@Example.com").await;
    assert_eq!(body["orderNumber"], 1);
    assert_eq!(body["fulfillmentStatus"], "unfulfilled");
    assert_eq!(body["items"][0]["stockStatus"], "external");

    let users = ctx.store.users().await;
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].email.as_str(), "ana@example.com");
    assert_eq!(users[0].first_name, "Ana");

    let product = ctx.store.get_product(ProductId::new(2)).await.unwrap().unwrap();
    assert_eq!(product.current_stock, 4);
}

#[tokio::test]
async fn test_create_order_after_checkout_takes_stock_once() {
    let ctx = TestContext::new();
    ctx.store.insert_product(tracked_product(2, 5)).await;
    ctx.payments
        .set_line_items("cs_soap", vec![line_item("li_soap", 2, None, 1, 500)])
        .await;

    let event = checkout_completed_event("evt_soap", "cs_soap", "ana@example.com", 500, 0);
    let (status, _) = ctx.deliver(&event).await;
    assert_eq!(status, StatusCode::OK);
    create_order(&ctx, "ana@example.com").await;

    let product = ctx.store.get_product(ProductId::new(2)).await.unwrap().unwrap();
    assert_eq!(product.current_stock, 4);
    assert_eq!(ctx.store.orders().await.len(), 2);

    let summary = reconcile_pending(&*ctx.store, 100).await.unwrap();
    assert_eq!(summary, ReconcileSummary::default());
    let product = ctx.store.get_product(ProductId::new(2)).await.unwrap().unwrap();
    assert_eq!(product.current_stock, 4);
}

#[tokio::test]
async fn test_missing_total_price_has_no_side_effects() {
    let ctx = TestContext::new();
    ctx.store.insert_product(tracked_product(2, 4)).await;
    let mut body = order_body("ana@example.com");
    body.as_object_mut().unwrap().remove("totalPrice");

    let (status, response) = ctx
        .send_json(Method::POST, "/orders/create-order", &body)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["message"], "Missing required fields");

    assert!(ctx.store.users().await.is_empty());
    assert!(ctx.store.orders().await.is_empty());
    let product = ctx.store.get_product(ProductId::new(2)).await.unwrap().unwrap();
    assert_eq!(product.current_stock, 4);
}

#[tokio::test]
async fn test_empty_items_rejected() {
    let ctx = TestContext::new();
    let mut body = order_body("ana@example.com");
    body["items"] = json!([]);

    let (status, _) = ctx
        .send_json(Method::POST, "/orders/create-order", &body)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(ctx.store.users().await.is_empty());
}

#[tokio::test]
async fn test_zero_quantity_rejected() {
    let ctx = TestContext::new();
    let mut body = order_body("ana@example.com");
    body["items"][0]["quantity"] = json!(0);

    let (status, _) = ctx
        .send_json(Method::POST, "/orders/create-order", &body)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(ctx.store.orders().await.is_empty());
}

#[tokio::test]
async fn test_malformed_body_rejected() {
    let ctx = TestContext::new();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/orders/create-order")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, _) = ctx.request(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_concurrent_orders_get_distinct_numbers() {
    let ctx = TestContext::new();

    let handles: Vec<_> = (0..12)
        .map(|_| {
            let app = ctx.app.clone();
            let request = Request::builder()
                .method(Method::POST)
                .uri("/orders/create-order")
                .header("content-type", "application/json")
                .body(Body::from(order_body("ana@example.com").to_string()))
                .unwrap();
            tokio::spawn(async move {
                let response = app.oneshot(request).await.unwrap();
                assert_eq!(response.status(), StatusCode::CREATED);
                let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                    .await
                    .unwrap();
                serde_json::from_slice::<Value>(&bytes).unwrap()["orderNumber"]
                    .as_i64()
                    .unwrap()
            })
        })
        .collect();

    let mut numbers = HashSet::new();
    for handle in handles {
        numbers.insert(handle.await.unwrap());
    }
    assert_eq!(numbers, (1..=12).collect::<HashSet<i64>>());
    assert_eq!(ctx.store.users().await.len(), 1);
    assert_eq!(ctx.store.orders().await.len(), 12);
}

// =============================================================================
// Lookups
// =============================================================================

#[tokio::test]
async fn test_find_order() {
    let ctx = TestContext::new();
    let created = create_order(&ctx, "ana@example.com").await;
    let id = created["id"].as_i64().unwrap();

    let (status, body) = ctx.get(&format!("/orders/findOrder/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["orderNumber"], created["orderNumber"]);

    let (status, body) = ctx.get("/orders/findOrder/9999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Order not found");
}

#[tokio::test]
async fn test_user_orders_and_total() {
    let ctx = TestContext::new();
    let first = create_order(&ctx, "ana@example.com").await;
    create_order(&ctx, "ana@example.com").await;
    create_order(&ctx, "ben@example.com").await;
    let user_id = first["userId"].as_i64().unwrap();

    let (status, body) = ctx.get(&format!("/orders/getUserOrders/{user_id}")).await;
    assert_eq!(status, StatusCode::OK);
    let numbers: Vec<i64> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|order| order["orderNumber"].as_i64().unwrap())
        .collect();
    assert_eq!(numbers, vec![2, 1]);

    let (status, body) = ctx.get("/orders/totalOrders").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "totalOrders": 3 }));
}

// =============================================================================
// Tracking
// =============================================================================

#[tokio::test]
async fn test_update_tracking_unknown_order() {
    let ctx = TestContext::new();
    let update = json!({ "trackingNumber": "1Z999AA10123456784", "carrier": "UPS" });

    let (status, _) = ctx
        .send_json(Method::PUT, "/orders/updateOrderTracking/4242", &update)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(ctx.notifier.sent().await.is_empty());
}

#[tokio::test]
async fn test_update_tracking_marks_fulfilled_and_notifies() {
    let ctx = TestContext::new();
    let created = create_order(&ctx, "ana@example.com").await;
    let id = created["id"].as_i64().unwrap();
    let update = json!({ "trackingNumber": "1Z999AA10123456784", "carrier": "UPS" });

    let (status, body) = ctx
        .send_json(Method::PUT, &format!("/orders/updateOrderTracking/{id}"), &update)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fulfillmentStatus"], "fulfilled");
    assert_eq!(body["trackingNumber"], "1Z999AA10123456784");
    assert_eq!(body["carrier"], "UPS");

    let sent = ctx.notifier.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "ana@example.com");
    assert_eq!(
        sent[0].subject,
        "Your Order is Shipped - Tracking #1Z999AA10123456784"
    );
}

// =============================================================================
// Reports and deletion
// =============================================================================

fn decimal(value: &Value) -> Decimal {
    serde_json::from_value(value.clone()).unwrap()
}

#[tokio::test]
async fn test_all_orders_include_customer() {
    let ctx = TestContext::new();
    create_order(&ctx, "ana@example.com").await;
    create_order(&ctx, "ben@example.com").await;

    let (status, body) = ctx.get("/orders/getAllOrders").await;
    assert_eq!(status, StatusCode::OK);
    let orders = body.as_array().unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0]["orderNumber"], 2);
    assert_eq!(orders[0]["user"]["email"], "ben@example.com");
    assert_eq!(orders[1]["user"]["email"], "ana@example.com");
    assert_eq!(orders[1]["items"][0]["name"], "Olive Soap");
}

#[tokio::test]
async fn test_delete_order() {
    let ctx = TestContext::new();
    let created = create_order(&ctx, "ana@example.com").await;
    let id = created["id"].as_i64().unwrap();
    let delete = |id: i64| {
        Request::builder()
            .method(Method::DELETE)
            .uri(format!("/orders/deleteOrder/{id}"))
            .body(Body::empty())
            .unwrap()
    };

    let (status, body) = ctx.request(delete(id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        serde_json::from_slice::<Value>(&body).unwrap(),
        json!({ "message": "Order deleted successfully" })
    );
    let (status, _) = ctx.get(&format!("/orders/findOrder/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = ctx.request(delete(id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        serde_json::from_slice::<Value>(&body).unwrap()["message"],
        "Order not found"
    );
    assert_eq!(ctx.get("/orders/totalOrders").await.1, json!({ "totalOrders": 0 }));
}

#[tokio::test]
async fn test_top_products() {
    let ctx = TestContext::new();
    create_order(&ctx, "ana@example.com").await;
    let mut body = order_body("ben@example.com");
    body["items"] = json!([
        { "productId": 3, "name": "Beeswax Candle", "quantity": 3, "price": "9.50", "total": "28.50" },
        { "productId": 2, "name": "Olive Soap", "quantity": 1, "price": "5.00", "total": "5.00" }
    ]);
    body["totalPrice"] = json!("33.50");
    let (status, _) = ctx.send_json(Method::POST, "/orders/create-order", &body).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = ctx.get("/orders/topProducts").await;
    assert_eq!(status, StatusCode::OK);
    let products = body.as_array().unwrap();
    assert_eq!(products.len(), 2);
    assert_eq!(products[0]["name"], "Beeswax Candle");
    assert_eq!(products[0]["totalSold"], 3);
    assert_eq!(decimal(&products[0]["totalRevenue"]), Decimal::new(2850, 2));
    assert_eq!(products[1]["name"], "Olive Soap");
    assert_eq!(products[1]["totalSold"], 2);
    assert_eq!(decimal(&products[1]["totalRevenue"]), Decimal::new(1000, 2));
}

#[tokio::test]
async fn test_customer_spending() {
    let ctx = TestContext::new();
    let first = create_order(&ctx, "ana@example.com").await;
    create_order(&ctx, "ana@example.com").await;
    create_order(&ctx, "ben@example.com").await;

    let (status, body) = ctx.get("/orders/getCustomerSpending").await;
    assert_eq!(status, StatusCode::OK);
    let spending = body.as_array().unwrap();
    assert_eq!(spending.len(), 2);
    assert_eq!(spending[0]["userId"], first["userId"]);
    assert_eq!(spending[0]["email"], "ana@example.com");
    assert_eq!(spending[0]["name"], "Ana Lima");
    assert_eq!(decimal(&spending[0]["totalSpending"]), Decimal::new(1000, 2));
    assert_eq!(spending[1]["email"], "ben@example.com");
    assert_eq!(decimal(&spending[1]["totalSpending"]), Decimal::new(500, 2));
}
