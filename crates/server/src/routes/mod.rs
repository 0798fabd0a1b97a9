//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                                - Liveness check
//! GET  /health/ready                          - Readiness check (store ping)
//!
//! # Payment
//! POST /payment/webhook                       - Stripe webhook (raw body, signed)
//! GET  /payment/stripe/sessions/{session_id}  - Checkout session lookup
//! GET  /payment/stripe/events/{event_id}      - Event lookup with its order
//!
//! # Orders
//! POST /orders/create-order                   - Create an order
//! PUT  /orders/updateOrderTracking/{id}       - Attach tracking, mark fulfilled
//! GET  /orders/findOrder/{id}                 - Get an order
//! GET  /orders/getUserOrders/{user_id}        - Orders of a customer
//! GET  /orders/totalOrders                    - Order count
//! GET  /orders/getAllOrders                   - All orders with their customer
//! DELETE /orders/deleteOrder/{id}             - Delete an order
//! GET  /orders/topProducts                    - Units and revenue per item name
//! GET  /orders/getCustomerSpending            - Order total per customer
//! ```

pub mod orders;
pub mod payment;

use axum::{
    Router,
    routing::{delete, get, post, put},
};

use crate::state::AppState;

/// Create the payment routes router.
pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/webhook", post(payment::webhook))
        .route("/stripe/sessions/{session_id}", get(payment::get_session))
        .route("/stripe/events/{event_id}", get(payment::get_event))
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/create-order", post(orders::create_order))
        .route("/updateOrderTracking/{id}", put(orders::update_tracking))
        .route("/findOrder/{id}", get(orders::find_order))
        .route("/getUserOrders/{user_id}", get(orders::user_orders))
        .route("/totalOrders", get(orders::total_orders))
        .route("/getAllOrders", get(orders::all_orders))
        .route("/deleteOrder/{id}", delete(orders::delete_order))
        .route("/topProducts", get(orders::top_products))
        .route("/getCustomerSpending", get(orders::customer_spending))
}

/// All API routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/payment", payment_routes())
        .nest("/orders", order_routes())
}
