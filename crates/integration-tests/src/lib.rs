//! Integration test harness for the Muchio order backend.
//!
//! Drives the full router in process: storage is a [`MemoryStore`], Stripe
//! is replaced by [`FakePayments`] and outgoing mail is captured by
//! [`RecordingNotifier`]. Webhook payloads are signed exactly as Stripe
//! signs them.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p muchio-integration-tests
//! ```

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{Method, Request, StatusCode};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tower::ServiceExt;

use muchio_core::{InventoryType, OptionValueId, ProductId, VariantId};
use muchio_server::db::{MemoryStore, Store};
use muchio_server::models::{CustomerDetails, OptionValue, Product, Variant};
use muchio_server::services::{CheckoutSettings, Notifier, NotifyError};
use muchio_server::services::email::DeliveryReceipt;
use muchio_server::state::AppState;
use muchio_server::stripe::signature::{DEFAULT_TOLERANCE, signature_header};
use muchio_server::stripe::{
    CheckoutSession, Customer, LineItem, PaymentProvider, SIGNATURE_HEADER, StripeError,
    StripeEvent,
};

/// Webhook endpoint secret used by every test.
pub const WEBHOOK_SECRET: &str = "whsec_integration_5d1c7b";

// =============================================================================
// Fakes
// =============================================================================

/// In-memory stand-in for the Stripe API.
#[derive(Debug, Default)]
pub struct FakePayments {
    line_items: Mutex<HashMap<String, Vec<LineItem>>>,
    sessions: Mutex<HashMap<String, CheckoutSession>>,
    events: Mutex<HashMap<String, StripeEvent>>,
    customers: Mutex<Vec<Customer>>,
    customer_lookups: Mutex<usize>,
}

impl FakePayments {
    /// Register the line items returned for `session_id`.
    pub async fn set_line_items(&self, session_id: &str, items: Vec<LineItem>) {
        self.line_items
            .lock()
            .await
            .insert(session_id.to_string(), items);
    }

    /// Register an event (and its session, for completed checkouts).
    pub async fn add_event(&self, event: StripeEvent) {
        if let Ok(session) = serde_json::from_value::<CheckoutSession>(event.data.object.clone()) {
            self.sessions.lock().await.insert(session.id.clone(), session);
        }
        self.events.lock().await.insert(event.id.clone(), event);
    }

    /// Customers created through `find_or_create_customer`.
    pub async fn customers(&self) -> Vec<Customer> {
        self.customers.lock().await.clone()
    }

    /// Number of `find_or_create_customer` calls.
    pub async fn customer_lookups(&self) -> usize {
        *self.customer_lookups.lock().await
    }
}

#[async_trait]
impl PaymentProvider for FakePayments {
    async fn list_line_items(&self, session_id: &str) -> Result<Vec<LineItem>, StripeError> {
        self.line_items
            .lock()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| StripeError::NotFound(format!("No such checkout.session: {session_id}")))
    }

    async fn find_or_create_customer(
        &self,
        details: &CustomerDetails,
    ) -> Result<Customer, StripeError> {
        *self.customer_lookups.lock().await += 1;
        let email = details
            .email
            .clone()
            .ok_or_else(|| StripeError::Config("customer email required".to_string()))?;

        let mut customers = self.customers.lock().await;
        if let Some(existing) = customers
            .iter()
            .find(|c| c.email.as_deref() == Some(email.as_str()))
        {
            return Ok(existing.clone());
        }
        let customer = Customer {
            id: format!("cus_fake_{}", customers.len() + 1),
            email: Some(email),
            name: details.name.clone(),
        };
        customers.push(customer.clone());
        Ok(customer)
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, StripeError> {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| StripeError::NotFound(format!("No such checkout.session: {session_id}")))
    }

    async fn retrieve_event(&self, event_id: &str) -> Result<StripeEvent, StripeError> {
        self.events
            .lock()
            .await
            .get(event_id)
            .cloned()
            .ok_or_else(|| StripeError::NotFound(format!("No such event: {event_id}")))
    }
}

/// An email captured by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
}

/// Notifier that records instead of sending.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentEmail>>,
}

impl RecordingNotifier {
    /// Emails sent so far, oldest first.
    pub async fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        text: &str,
        _html: &str,
    ) -> Result<DeliveryReceipt, NotifyError> {
        self.sent.lock().await.push(SentEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            text: text.to_string(),
        });
        Ok(DeliveryReceipt {
            response: "250 recorded".to_string(),
        })
    }
}

// =============================================================================
// Context
// =============================================================================

/// Router wired to in-memory fakes.
pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub payments: Arc<FakePayments>,
    pub notifier: Arc<RecordingNotifier>,
    pub app: Router,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    /// Build a fresh context with empty storage.
    #[must_use]
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let payments = Arc::new(FakePayments::default());
        let notifier = Arc::new(RecordingNotifier::default());

        let shared_store: Arc<dyn Store> = Arc::clone(&store) as Arc<dyn Store>;
        let shared_payments: Arc<dyn PaymentProvider> =
            Arc::clone(&payments) as Arc<dyn PaymentProvider>;
        let shared_notifier: Arc<dyn Notifier> = Arc::clone(&notifier) as Arc<dyn Notifier>;

        let state = AppState::new(
            shared_store,
            shared_payments,
            shared_notifier,
            CheckoutSettings {
                webhook_secret: SecretString::from(WEBHOOK_SECRET),
                webhook_tolerance: DEFAULT_TOLERANCE,
                shop_name: "Muchio Shop".to_string(),
            },
        );

        Self {
            store,
            payments,
            notifier,
            app: muchio_server::app(state),
        }
    }

    /// Send a request and collect the response.
    pub async fn request(&self, request: Request<Body>) -> (StatusCode, Bytes) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body)
    }

    /// `GET` a path; returns the status and the body parsed as JSON (or
    /// `Value::Null` when it is not JSON).
    pub async fn get(&self, path: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        let (status, body) = self.request(request).await;
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    /// Send a JSON body; returns the status and the parsed response.
    pub async fn send_json(&self, method: Method, path: &str, body: &Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, body) = self.request(request).await;
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    /// Post a raw webhook payload with the given signature header.
    pub async fn post_webhook(&self, payload: &str, signature: Option<&str>) -> (StatusCode, String) {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/payment/webhook")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        let (status, body) = self
            .request(builder.body(Body::from(payload.to_string())).unwrap())
            .await;
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    /// Register `event` with the fake provider, sign it and deliver it.
    pub async fn deliver(&self, event: &Value) -> (StatusCode, String) {
        let parsed: StripeEvent = serde_json::from_value(event.clone()).unwrap();
        self.payments.add_event(parsed).await;

        let payload = event.to_string();
        let signature = sign(&payload);
        self.post_webhook(&payload, Some(&signature)).await
    }
}

/// Sign `payload` with [`WEBHOOK_SECRET`] at the current time.
#[must_use]
pub fn sign(payload: &str) -> String {
    signature_header(
        payload.as_bytes(),
        WEBHOOK_SECRET,
        chrono::Utc::now().timestamp(),
    )
}

// =============================================================================
// Fixtures
// =============================================================================

/// A `checkout.session.completed` event.
///
/// Amounts are in cents.
#[must_use]
pub fn checkout_completed_event(
    event_id: &str,
    session_id: &str,
    email: &str,
    subtotal: i64,
    shipping: i64,
) -> Value {
    json!({
        "id": event_id,
        "object": "event",
        "type": "checkout.session.completed",
        "created": chrono::Utc::now().timestamp(),
        "livemode": false,
        "data": {
            "object": {
                "id": session_id,
                "object": "checkout.session",
                "customer": null,
                "customer_details": {
                    "email": email,
                    "name": "Jo Park",
                    "phone": "+1 416 555 0100",
                    "address": {
                        "line1": "5 Elm St",
                        "city": "Toronto",
                        "state": "ON",
                        "postal_code": "M5V 2T6",
                        "country": "CA"
                    }
                },
                "amount_subtotal": subtotal,
                "amount_total": subtotal + shipping,
                "currency": "cad",
                "payment_status": "paid",
                "shipping_cost": { "amount_total": shipping },
                "shipping_details": {
                    "name": "Jo Park",
                    "address": { "line1": "5 Elm St", "city": "Toronto", "country": "CA" }
                },
                "metadata": {}
            }
        }
    })
}

/// A line item whose expanded product carries the shop's metadata.
#[must_use]
pub fn line_item(
    id: &str,
    product_id: i32,
    variant: Option<(i32, &str)>,
    quantity: u32,
    amount_total: i64,
) -> LineItem {
    let mut metadata = json!({ "productId": product_id.to_string() });
    if let Some((variant_id, variant_name)) = variant {
        metadata["variantId"] = json!(variant_id.to_string());
        metadata["variantName"] = json!(variant_name);
    }

    serde_json::from_value(json!({
        "id": id,
        "description": format!("Product {product_id}"),
        "quantity": quantity,
        "amount_total": amount_total,
        "price": {
            "id": format!("price_{id}"),
            "unit_amount": amount_total / i64::from(quantity.max(1)),
            "product": {
                "id": format!("prod_{product_id}"),
                "name": format!("Product {product_id}"),
                "metadata": metadata
            }
        }
    }))
    .unwrap()
}

/// A product tracked at product level.
#[must_use]
pub fn tracked_product(id: i32, stock: i32) -> Product {
    Product {
        id: ProductId::new(id),
        name: format!("Product {id}"),
        sku: None,
        price: Decimal::new(1500, 2),
        cost_price: None,
        current_stock: stock,
        inventory_type: InventoryType::Track,
        payment_product_id: None,
        variants: Vec::new(),
    }
}

/// A product tracked per option value, with a single size option.
#[must_use]
pub fn product_with_option(id: i32, option_id: i32, quantity: i32) -> Product {
    Product {
        id: ProductId::new(id),
        name: format!("Product {id}"),
        sku: None,
        price: Decimal::new(2500, 2),
        cost_price: None,
        current_stock: 0,
        inventory_type: InventoryType::TrackByOptions,
        payment_product_id: None,
        variants: vec![Variant {
            id: VariantId::new(id * 10),
            option_name: "Size".to_string(),
            option_values: vec![OptionValue {
                id: OptionValueId::new(option_id),
                value: "M".to_string(),
                price: Decimal::new(2500, 2),
                sku: None,
                quantity,
                payment_product_id: None,
            }],
        }],
    }
}
