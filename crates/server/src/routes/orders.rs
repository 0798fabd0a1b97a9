//! Order API routes.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use muchio_core::{Email, OrderId, PaymentStatus, StockStatus, UserId};

use crate::error::{AppError, Result};
use crate::models::{
    CustomerDetails, CustomerSpending, Order, OrderDraft, OrderItemDraft, OrderWithCustomer,
    ProductSales, ShippingInfo, TrackingUpdate,
};
use crate::services::email::{send_best_effort, shipment_notice};
use crate::services::orders::check_items;
use crate::services::{CustomerResolver, OrderPersistenceError, OrderWriter};
use crate::state::AppState;

/// Body of `POST /orders/create-order`.
///
/// Required fields are optional here so that their absence maps to a 400
/// with the usual message instead of a deserialization error.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    /// Customer email.
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub items: Option<Vec<OrderItemDraft>>,
    #[serde(default)]
    pub total_price: Option<Decimal>,
    #[serde(default)]
    pub shipping_info: ShippingInfo,
    #[serde(default)]
    pub subtotal: Option<Decimal>,
    #[serde(default)]
    pub payment_status: PaymentStatus,
    #[serde(default, rename = "customer_details")]
    pub customer_details: Option<CustomerDetails>,
}

/// Record an order directly.
///
/// POST /orders/create-order
///
/// Resolves the customer, then numbers and persists the order. Its lines are
/// marked `external`: the storefront calls this next to hosted checkout, whose
/// webhook already adjusts the stock. Nothing is written when required fields
/// are missing.
///
/// # Errors
///
/// Returns 400 on missing or invalid fields, 500 on storage failure.
#[instrument(skip_all)]
pub async fn create_order(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Order>)> {
    let Json(request) = payload.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;

    let (Some(user), Some(items), Some(total_price)) =
        (request.user.as_deref(), request.items, request.total_price)
    else {
        return Err(OrderPersistenceError::MissingFields.into());
    };
    if user.trim().is_empty() || items.is_empty() {
        return Err(OrderPersistenceError::MissingFields.into());
    }
    check_items(&items)?;
    let email =
        Email::parse(user).map_err(|e| AppError::BadRequest(format!("Invalid user email: {e}")))?;

    let store = state.store();
    let details = request.customer_details.unwrap_or_default();
    let customer = CustomerResolver::new(store).resolve(&email, &details).await?;

    let order = OrderWriter::new(store)
        .create(OrderDraft {
            user_id: Some(customer.id),
            items,
            subtotal: request.subtotal,
            shipping_info: request.shipping_info,
            total_price: Some(total_price),
            payment_status: request.payment_status,
            payment_event_id: None,
            checkout_session_id: None,
            item_stock_status: StockStatus::External,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(order)))
}

/// Attach tracking details and mark an order fulfilled.
///
/// PUT /orders/updateOrderTracking/{id}
///
/// Sends the shipment email when the customer is on file.
///
/// # Errors
///
/// Returns `AppError::NotFound` if the order does not exist.
#[instrument(skip(state, update))]
pub async fn update_tracking(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(update): Json<TrackingUpdate>,
) -> Result<Json<Order>> {
    let order = state
        .store()
        .update_tracking(OrderId::new(id), &update)
        .await?
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;

    match state.store().get_user(order.user_id).await {
        Ok(Some(user)) => {
            send_best_effort(
                state.notifier(),
                shipment_notice(&order, &user, state.shop_name()),
                order.order_number,
            )
            .await;
        }
        Ok(None) => {
            tracing::warn!(order_number = order.order_number, "Order has no customer on file");
        }
        Err(e) => {
            tracing::warn!(error = %e, "Could not load customer for shipment email");
        }
    }

    Ok(Json(order))
}

/// Get one order.
///
/// GET /orders/findOrder/{id}
///
/// # Errors
///
/// Returns `AppError::NotFound` if the order does not exist.
pub async fn find_order(State(state): State<AppState>, Path(id): Path<i32>) -> Result<Json<Order>> {
    state
        .store()
        .get_order(OrderId::new(id))
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))
}

/// All orders of a customer, newest first.
///
/// GET /orders/getUserOrders/{user_id}
///
/// # Errors
///
/// Returns `AppError::Database` on storage failure.
pub async fn user_orders(
    State(state): State<AppState>,
    Path(user_id): Path<i32>,
) -> Result<Json<Vec<Order>>> {
    let orders = state
        .store()
        .list_orders_for_user(UserId::new(user_id))
        .await?;
    Ok(Json(orders))
}

/// Response of `GET /orders/totalOrders`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalOrders {
    pub total_orders: i64,
}

/// Number of orders ever created.
///
/// GET /orders/totalOrders
///
/// # Errors
///
/// Returns `AppError::Database` on storage failure.
pub async fn total_orders(State(state): State<AppState>) -> Result<Json<TotalOrders>> {
    let total_orders = state.store().count_orders().await?;
    Ok(Json(TotalOrders { total_orders }))
}

/// Every order with its customer, newest first.
///
/// GET /orders/getAllOrders
///
/// # Errors
///
/// Returns `AppError::Database` on storage failure.
pub async fn all_orders(State(state): State<AppState>) -> Result<Json<Vec<OrderWithCustomer>>> {
    let orders = state.store().list_orders_with_customers().await?;
    Ok(Json(orders))
}

/// Response of `DELETE /orders/deleteOrder/{id}`.
#[derive(Debug, Serialize)]
pub struct Deleted {
    pub message: &'static str,
}

/// Delete an order and its lines.
///
/// DELETE /orders/deleteOrder/{id}
///
/// Stock taken by the order is not given back.
///
/// # Errors
///
/// Returns `AppError::NotFound` if the order does not exist.
#[instrument(skip(state))]
pub async fn delete_order(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Deleted>> {
    if !state.store().delete_order(OrderId::new(id)).await? {
        return Err(AppError::NotFound("Order not found".to_string()));
    }
    tracing::info!(order_id = id, "Order deleted");
    Ok(Json(Deleted {
        message: "Order deleted successfully",
    }))
}

/// Units sold and revenue per item name, best sellers first.
///
/// GET /orders/topProducts
///
/// # Errors
///
/// Returns `AppError::Database` on storage failure.
pub async fn top_products(State(state): State<AppState>) -> Result<Json<Vec<ProductSales>>> {
    let sales = state.store().product_sales().await?;
    Ok(Json(sales))
}

/// Total order value per customer, biggest spenders first.
///
/// GET /orders/getCustomerSpending
///
/// # Errors
///
/// Returns `AppError::Database` on storage failure.
pub async fn customer_spending(
    State(state): State<AppState>,
) -> Result<Json<Vec<CustomerSpending>>> {
    let spending = state.store().customer_spending().await?;
    Ok(Json(spending))
}
