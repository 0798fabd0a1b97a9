//! Stripe API object types.
//!
//! Only the fields the checkout pipeline reads are modelled; unknown fields
//! are ignored. Amounts are integers in the currency's minor unit.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use muchio_core::PaymentStatus;

use crate::models::{Address, CustomerDetails};

/// Event type that drives order creation.
pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";

// =============================================================================
// Events
// =============================================================================

/// Event envelope as delivered to webhooks and returned by `/v1/events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub livemode: bool,
    pub data: EventData,
}

/// Event payload; `object` is the resource the event is about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

/// A webhook event narrowed to the types this service handles.
#[derive(Debug, Clone)]
pub enum WebhookEvent {
    /// A hosted checkout finished.
    CheckoutSessionCompleted {
        event_id: String,
        session: Box<CheckoutSession>,
    },
    /// Any other event type; acknowledged without side effects.
    Ignored { event_id: String, event_type: String },
}

impl WebhookEvent {
    /// Provider id of the underlying event.
    #[must_use]
    pub fn event_id(&self) -> &str {
        match self {
            Self::CheckoutSessionCompleted { event_id, .. } | Self::Ignored { event_id, .. } => {
                event_id
            }
        }
    }
}

impl TryFrom<StripeEvent> for WebhookEvent {
    type Error = serde_json::Error;

    /// Fails only when a known event type carries an object that does not
    /// match its schema.
    fn try_from(event: StripeEvent) -> Result<Self, Self::Error> {
        if event.event_type == CHECKOUT_SESSION_COMPLETED {
            let session: CheckoutSession = serde_json::from_value(event.data.object)?;
            Ok(Self::CheckoutSessionCompleted {
                event_id: event.id,
                session: Box::new(session),
            })
        } else {
            Ok(Self::Ignored {
                event_id: event.id,
                event_type: event.event_type,
            })
        }
    }
}

// =============================================================================
// Checkout sessions
// =============================================================================

/// A checkout session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    /// Customer id, when the session was attached to a customer.
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub customer_details: Option<CustomerDetails>,
    #[serde(default)]
    pub amount_subtotal: Option<i64>,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub shipping_cost: Option<ShippingCost>,
    /// Older API versions report the shipping address here.
    #[serde(default)]
    pub shipping_details: Option<ShippingDetails>,
    /// Newer API versions report the shipping address here.
    #[serde(default)]
    pub collected_information: Option<CollectedInformation>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSession {
    /// Shipping address from whichever field the API version populated.
    #[must_use]
    pub fn shipping_address(&self) -> Option<&Address> {
        self.shipping_details
            .as_ref()
            .and_then(|details| details.address.as_ref())
            .or_else(|| {
                self.collected_information
                    .as_ref()
                    .and_then(|info| info.shipping_details.as_ref())
                    .and_then(|details| details.address.as_ref())
            })
    }
}

/// Shipping rate applied to a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingCost {
    pub amount_total: i64,
    #[serde(default)]
    pub shipping_rate: Option<String>,
}

/// Name and address collected for shipping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingDetails {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
}

/// Information collected during checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectedInformation {
    #[serde(default)]
    pub shipping_details: Option<ShippingDetails>,
}

// =============================================================================
// Line items
// =============================================================================

/// One purchased entry of a checkout session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub quantity: Option<u32>,
    /// Line total after discounts and taxes.
    pub amount_total: i64,
    #[serde(default)]
    pub amount_subtotal: Option<i64>,
    #[serde(default)]
    pub price: Option<Price>,
}

impl LineItem {
    /// Provider product when it was expanded in the listing.
    #[must_use]
    pub fn product(&self) -> Option<&StripeProduct> {
        match &self.price.as_ref()?.product {
            Expandable::Object(product) => Some(&**product),
            Expandable::Id(_) => None,
        }
    }
}

/// Price of a line item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Price {
    pub id: String,
    #[serde(default)]
    pub unit_amount: Option<i64>,
    pub product: Expandable<StripeProduct>,
}

/// A field Stripe returns as an id unless it was expanded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expandable<T> {
    Id(String),
    Object(Box<T>),
}

/// A product registered with Stripe.
///
/// `metadata` carries the shop's own `productId`, `variantId` and
/// `variantName`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeProduct {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

// =============================================================================
// Customers and lists
// =============================================================================

/// A Stripe customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Paginated list envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
}
