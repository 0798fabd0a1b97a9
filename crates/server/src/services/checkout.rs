//! Checkout event processing.
//!
//! Turns a verified `checkout.session.completed` webhook into an order:
//!
//! 1. verify the signature and parse the event
//! 2. resolve the customer and link the provider customer id
//! 3. rebuild the order lines from the session's line items
//! 4. number and persist the order
//! 5. settle the stock of every line
//! 6. send the confirmation email (best effort)
//!
//! A step failing fails the whole event so the provider redelivers it. An
//! event that already produced an order is acknowledged without creating
//! another one; its still-pending stock lines and an unsent confirmation
//! are retried.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;
use tracing::{info, instrument, warn};

use muchio_core::{StockStatus, UserId, from_minor_units};

use crate::db::{RepositoryError, Store};
use crate::models::{Order, OrderDraft, OrderItemDraft, ShippingInfo, User};
use crate::stripe::signature::{self, SignatureError};
use crate::stripe::{CheckoutSession, PaymentProvider, StripeError, StripeEvent, WebhookEvent};

use super::customers::{CustomerError, CustomerResolver};
use super::email::{Notifier, deliver_confirmation};
use super::inventory::{InventoryError, InventoryLedger};
use super::line_items::{self, LineItemError};
use super::orders::{OrderPersistenceError, OrderWriter};

/// Carrier recorded on orders placed through hosted checkout.
pub const CHECKOUT_CARRIER: &str = "Standard Carrier";

/// Shipping cost from which the express rate was chosen.
const EXPRESS_SHIPPING_THRESHOLD: Decimal = Decimal::from_parts(1500, 0, 0, false, 2);

/// Errors that fail a checkout event.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Signature check failed or the body is not an event.
    #[error(transparent)]
    InvalidSignature(#[from] SignatureError),

    /// A completed-checkout event whose session does not match its schema.
    #[error("invalid checkout session payload: {0}")]
    InvalidPayload(#[source] serde_json::Error),

    /// Customer details missing or unusable.
    #[error(transparent)]
    Customer(#[from] CustomerError),

    /// A line item has no link back to the catalog.
    #[error(transparent)]
    LineItemResolution(#[from] LineItemError),

    /// The order could not be written.
    #[error(transparent)]
    OrderPersistence(#[from] OrderPersistenceError),

    /// Payment provider call failed.
    #[error("payment provider error: {0}")]
    Provider(#[from] StripeError),

    /// Stock adjustment hit a storage failure.
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    /// Storage failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl CheckoutError {
    /// Whether the event itself is at fault, as opposed to a dependency.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidSignature(_)
                | Self::InvalidPayload(_)
                | Self::Customer(CustomerError::MissingCustomerDetails | CustomerError::InvalidEmail(_))
                | Self::LineItemResolution(_)
                | Self::OrderPersistence(
                    OrderPersistenceError::MissingFields | OrderPersistenceError::InvalidItem { .. }
                )
        )
    }
}

/// What a processed event resulted in.
#[derive(Debug, Clone)]
pub enum CheckoutOutcome {
    /// A new order was created.
    OrderCreated(Box<Order>),
    /// The event had already produced this order.
    AlreadyProcessed(Box<Order>),
    /// The event type does not drive the pipeline.
    Ignored { event_type: String },
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    Customer,
    LineItems,
    Order,
    Inventory,
    Notification,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Customer => "customer",
            Self::LineItems => "line_items",
            Self::Order => "order",
            Self::Inventory => "inventory",
            Self::Notification => "notification",
        })
    }
}

/// Webhook settings for the processor.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub webhook_secret: SecretString,
    pub webhook_tolerance: Duration,
    pub shop_name: String,
}

/// Drives completed checkouts through the order pipeline.
#[derive(Clone)]
pub struct CheckoutProcessor {
    store: Arc<dyn Store>,
    payments: Arc<dyn PaymentProvider>,
    notifier: Arc<dyn Notifier>,
    settings: CheckoutSettings,
}

impl CheckoutProcessor {
    /// Create a processor over the given collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        payments: Arc<dyn PaymentProvider>,
        notifier: Arc<dyn Notifier>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            store,
            payments,
            notifier,
            settings,
        }
    }

    /// Verify and process a raw webhook delivery.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::InvalidSignature` before anything is read or
    /// written if the signature does not verify; any other variant means a
    /// pipeline step failed and the provider should redeliver.
    pub async fn process(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        let event = self.verify(payload, signature_header)?;

        match WebhookEvent::try_from(event).map_err(CheckoutError::InvalidPayload)? {
            WebhookEvent::Ignored {
                event_id,
                event_type,
            } => {
                info!(event_id = %event_id, event_type = %event_type, "Ignoring webhook event");
                Ok(CheckoutOutcome::Ignored { event_type })
            }
            WebhookEvent::CheckoutSessionCompleted { event_id, session } => {
                self.complete_checkout(&event_id, &session).await
            }
        }
    }

    fn verify(&self, payload: &[u8], header: Option<&str>) -> Result<StripeEvent, SignatureError> {
        let header = header.ok_or(SignatureError::MissingHeader)?;
        signature::verify(
            payload,
            header,
            &self.settings.webhook_secret,
            self.settings.webhook_tolerance,
        )?;
        serde_json::from_slice(payload).map_err(|e| SignatureError::MalformedPayload(e.to_string()))
    }

    #[instrument(skip(self, session), fields(session_id = %session.id))]
    async fn complete_checkout(
        &self,
        event_id: &str,
        session: &CheckoutSession,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        if let Some(existing) = self.store.find_order_by_payment_event(event_id).await? {
            return self.already_processed(existing).await;
        }

        info!(stage = %Stage::Customer, "Checkout stage");
        let resolver = CustomerResolver::new(&*self.store);
        let user = resolver
            .resolve_checkout(session.customer_details.as_ref())
            .await?;
        let payment_customer = match (&session.customer, &session.customer_details) {
            (Some(id), _) => Some(id.clone()),
            (None, _) if user.payment_customer_id.is_some() => None,
            (None, Some(details)) => Some(self.payments.find_or_create_customer(details).await?.id),
            (None, None) => None,
        };
        let user = match payment_customer {
            Some(customer_id) => resolver.link_payment_customer(user, &customer_id).await?,
            None => user,
        };

        info!(stage = %Stage::LineItems, user_id = %user.id, "Checkout stage");
        let line_items = self.payments.list_line_items(&session.id).await?;
        let items = line_items::reconstruct(&line_items)?;

        info!(stage = %Stage::Order, items = items.len(), "Checkout stage");
        let draft = order_draft(session, event_id, user.id, items);
        log_totals_gap(&draft);
        let order = match OrderWriter::new(&*self.store).create(draft).await {
            Ok(order) => order,
            Err(OrderPersistenceError::DuplicatePaymentEvent(_)) => {
                // A concurrent delivery of the same event won the insert
                let existing = self
                    .store
                    .find_order_by_payment_event(event_id)
                    .await?
                    .ok_or(RepositoryError::NotFound)?;
                return self.already_processed(existing).await;
            }
            Err(e) => return Err(e.into()),
        };

        info!(stage = %Stage::Inventory, order_number = order.order_number, "Checkout stage");
        let report = InventoryLedger::new(&*self.store)
            .apply_order(&order)
            .await?;
        if report.has_shortages() {
            warn!(
                order_number = order.order_number,
                "Order created with insufficient stock on some lines"
            );
        }

        info!(stage = %Stage::Notification, order_number = order.order_number, "Checkout stage");
        self.confirm(&order, &user).await;

        let order = self.store.get_order(order.id).await?.unwrap_or(order);
        info!(
            order_number = order.order_number,
            order_id = %order.id,
            "Checkout completed"
        );
        Ok(CheckoutOutcome::OrderCreated(Box::new(order)))
    }

    async fn already_processed(&self, order: Order) -> Result<CheckoutOutcome, CheckoutError> {
        info!(
            order_number = order.order_number,
            "Payment event already processed"
        );
        if order.pending_items().next().is_some() {
            InventoryLedger::new(&*self.store)
                .apply_order(&order)
                .await?;
        }
        if order.confirmation_sent_at.is_none() {
            match self.store.get_user(order.user_id).await? {
                Some(user) => self.confirm(&order, &user).await,
                None => warn!(order_number = order.order_number, "Order has no customer on file"),
            }
        }
        let order = self.store.get_order(order.id).await?.unwrap_or(order);
        Ok(CheckoutOutcome::AlreadyProcessed(Box::new(order)))
    }

    /// Send the confirmation if nobody has yet. Never fails the event.
    async fn confirm(&self, order: &Order, user: &User) {
        if let Err(e) = deliver_confirmation(
            &*self.store,
            &*self.notifier,
            order,
            user,
            &self.settings.shop_name,
        )
        .await
        {
            warn!(
                order_number = order.order_number,
                error = %e,
                "Could not record confirmation state"
            );
        }
    }
}

/// Build the order draft for a completed session.
#[must_use]
pub fn order_draft(
    session: &CheckoutSession,
    event_id: &str,
    user_id: UserId,
    items: Vec<OrderItemDraft>,
) -> OrderDraft {
    let shipping_cost = session
        .shipping_cost
        .as_ref()
        .map_or(Decimal::ZERO, |cost| from_minor_units(cost.amount_total));
    let shipping_option = if shipping_cost >= EXPRESS_SHIPPING_THRESHOLD {
        "Express Shipping"
    } else {
        "Standard Shipping"
    };

    OrderDraft {
        user_id: Some(user_id),
        items,
        subtotal: session.amount_subtotal.map(from_minor_units),
        shipping_info: ShippingInfo {
            carrier_name: CHECKOUT_CARRIER.to_string(),
            shipping_cost,
            address: session.shipping_address().cloned(),
            shipping_option: shipping_option.to_string(),
        },
        total_price: session.amount_total.map(from_minor_units),
        payment_status: session.payment_status,
        payment_event_id: Some(event_id.to_string()),
        checkout_session_id: Some(session.id.clone()),
        item_stock_status: StockStatus::Pending,
    }
}

/// Gaps between the draft's figures: `items - subtotal` and
/// `subtotal + shipping - total`.
///
/// Discounts and taxes make these non-zero; they are reported, not rejected.
#[must_use]
pub fn totals_gap(draft: &OrderDraft) -> (Decimal, Decimal) {
    let items_total = draft.items_total();
    let subtotal = draft.subtotal.unwrap_or(items_total);
    let shipping = draft.shipping_info.shipping_cost;
    let total = draft.total_price.unwrap_or(subtotal + shipping);
    (items_total - subtotal, subtotal + shipping - total)
}

fn log_totals_gap(draft: &OrderDraft) {
    let (items_gap, total_gap) = totals_gap(draft);
    if !items_gap.is_zero() {
        warn!(gap = %items_gap, "Line totals do not add up to the session subtotal");
    }
    if !total_gap.is_zero() {
        warn!(gap = %total_gap, "Subtotal plus shipping differs from the session total");
    }
}
