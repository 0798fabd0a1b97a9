//! Order numbering and persistence.

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::instrument;

use crate::db::{ORDER_NUMBER_SEQUENCE, OrderStore, RepositoryError};
use crate::models::{NewOrder, Order, OrderDraft, OrderItemDraft};

/// Errors that can occur while writing an order.
#[derive(Debug, Error)]
pub enum OrderPersistenceError {
    /// User, items or total price is missing.
    #[error("Missing required fields")]
    MissingFields,

    /// A line is not writable.
    #[error("invalid item at position {position}: {reason}")]
    InvalidItem { position: usize, reason: &'static str },

    /// An order already exists for this payment event.
    #[error("order already exists for payment event {0}")]
    DuplicatePaymentEvent(String),

    /// Storage failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Allocates order numbers and persists orders.
pub struct OrderWriter<'a, S: ?Sized> {
    orders: &'a S,
}

impl<'a, S: OrderStore + ?Sized> OrderWriter<'a, S> {
    /// Create a writer over `orders`.
    #[must_use]
    pub const fn new(orders: &'a S) -> Self {
        Self { orders }
    }

    /// Validate `draft`, take the next order number and persist the order.
    ///
    /// Validation runs before the counter is touched, so a rejected draft
    /// never consumes a number. A storage failure after the increment leaves
    /// a gap in the sequence.
    ///
    /// # Errors
    ///
    /// Returns `OrderPersistenceError::MissingFields` or `InvalidItem` for an
    /// incomplete draft, `DuplicatePaymentEvent` when another order already
    /// carries the draft's payment event id, `Repository` on storage failure.
    #[instrument(skip(self, draft), fields(items = draft.items.len()))]
    pub async fn create(&self, draft: OrderDraft) -> Result<Order, OrderPersistenceError> {
        let new_order = validate(draft)?;

        let order_number = self
            .orders
            .next_sequence_value(ORDER_NUMBER_SEQUENCE)
            .await?;

        match self.orders.insert_order(&new_order, order_number).await {
            Ok(order) => {
                tracing::info!(
                    order_id = %order.id,
                    order_number,
                    total_price = %order.total_price,
                    "Order created"
                );
                Ok(order)
            }
            Err(RepositoryError::Conflict(reason)) => match new_order.payment_event_id {
                Some(event_id) => {
                    tracing::warn!(
                        order_number,
                        event_id = %event_id,
                        "Order number burned by duplicate event"
                    );
                    Err(OrderPersistenceError::DuplicatePaymentEvent(event_id))
                }
                None => Err(RepositoryError::Conflict(reason).into()),
            },
            Err(e) => Err(e.into()),
        }
    }
}

/// Check the required fields of `draft` and fill in the subtotal.
///
/// # Errors
///
/// See [`OrderWriter::create`].
pub fn validate(draft: OrderDraft) -> Result<NewOrder, OrderPersistenceError> {
    let items_total = draft.items_total();
    let (Some(user_id), Some(total_price)) = (draft.user_id, draft.total_price) else {
        return Err(OrderPersistenceError::MissingFields);
    };
    if draft.items.is_empty() {
        return Err(OrderPersistenceError::MissingFields);
    }

    check_items(&draft.items)?;

    Ok(NewOrder {
        user_id,
        items: draft.items,
        subtotal: draft.subtotal.unwrap_or(items_total),
        shipping_info: draft.shipping_info,
        total_price,
        payment_status: draft.payment_status,
        payment_event_id: draft.payment_event_id,
        checkout_session_id: draft.checkout_session_id,
        item_stock_status: draft.item_stock_status,
    })
}

/// Check that every line is writable.
///
/// # Errors
///
/// Returns `OrderPersistenceError::InvalidItem` for the first bad line.
pub fn check_items(items: &[OrderItemDraft]) -> Result<(), OrderPersistenceError> {
    for (position, item) in items.iter().enumerate() {
        let reason = if item.quantity == 0 {
            "quantity must be at least 1"
        } else if i32::try_from(item.quantity).is_err() {
            "quantity too large"
        } else if item.price < Decimal::ZERO || item.total < Decimal::ZERO {
            "amounts cannot be negative"
        } else if item.name.trim().is_empty() {
            "name is required"
        } else {
            continue;
        };
        return Err(OrderPersistenceError::InvalidItem { position, reason });
    }
    Ok(())
}
