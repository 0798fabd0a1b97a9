//! Stripe integration.
//!
//! # Modules
//!
//! - `client` - REST client for sessions, line items, customers and events
//! - `signature` - Webhook signature verification
//! - `types` - Event, session and line item payloads
//! - `error` - Error types
//!
//! The checkout pipeline depends on the [`PaymentProvider`] trait rather than
//! the concrete client, so tests can substitute canned responses.

mod client;
mod error;
pub mod signature;
pub mod types;

use async_trait::async_trait;

pub use client::StripeClient;
pub use error::StripeError;
pub use signature::{SIGNATURE_HEADER, SignatureError};
pub use types::{
    CHECKOUT_SESSION_COMPLETED, CheckoutSession, Customer, LineItem, StripeEvent, WebhookEvent,
};

use crate::models::CustomerDetails;

/// Calls the checkout pipeline makes against the payment provider.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// All line items of a checkout session with their products expanded.
    async fn list_line_items(&self, session_id: &str) -> Result<Vec<LineItem>, StripeError>;

    /// Provider customer with the details' email, created if none exists.
    async fn find_or_create_customer(
        &self,
        details: &CustomerDetails,
    ) -> Result<Customer, StripeError>;

    /// Retrieve a checkout session.
    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, StripeError>;

    /// Retrieve an event.
    async fn retrieve_event(&self, event_id: &str) -> Result<StripeEvent, StripeError>;
}
