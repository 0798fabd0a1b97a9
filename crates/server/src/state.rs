//! Application state shared across handlers.

use std::sync::Arc;

use crate::db::Store;
use crate::services::{CheckoutProcessor, CheckoutSettings, Notifier};
use crate::stripe::PaymentProvider;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`. Storage, the payment provider
/// and the notifier are trait objects so tests can run the full router
/// against in-memory fakes.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    store: Arc<dyn Store>,
    payments: Arc<dyn PaymentProvider>,
    notifier: Arc<dyn Notifier>,
    checkout: CheckoutProcessor,
    shop_name: String,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        payments: Arc<dyn PaymentProvider>,
        notifier: Arc<dyn Notifier>,
        settings: CheckoutSettings,
    ) -> Self {
        let shop_name = settings.shop_name.clone();
        let checkout = CheckoutProcessor::new(
            Arc::clone(&store),
            Arc::clone(&payments),
            Arc::clone(&notifier),
            settings,
        );

        Self {
            inner: Arc::new(AppStateInner {
                store,
                payments,
                notifier,
                checkout,
                shop_name,
            }),
        }
    }

    /// Get a reference to the store.
    #[must_use]
    pub fn store(&self) -> &dyn Store {
        &*self.inner.store
    }

    /// Get a reference to the payment provider.
    #[must_use]
    pub fn payments(&self) -> &dyn PaymentProvider {
        &*self.inner.payments
    }

    /// Get a reference to the email notifier.
    #[must_use]
    pub fn notifier(&self) -> &dyn Notifier {
        &*self.inner.notifier
    }

    /// Get a reference to the checkout processor.
    #[must_use]
    pub fn checkout(&self) -> &CheckoutProcessor {
        &self.inner.checkout
    }

    /// Shop name used in customer emails.
    #[must_use]
    pub fn shop_name(&self) -> &str {
        &self.inner.shop_name
    }
}
