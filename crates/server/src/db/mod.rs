//! Storage for customers, stock and orders.
//!
//! # Tables (schema `shop`)
//!
//! - `app_user` - Customers, unique by email
//! - `product`, `product_variant`, `variant_option` - Stock-bearing catalog rows
//! - `sequence_counter` - Named counters (`orderNumber`)
//! - `customer_order`, `order_item` - Orders; each item carries its stock status,
//!   each order its confirmation email state
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p muchio-cli -- migrate
//! ```
//!
//! Components talk to storage through the traits below so the checkout
//! pipeline can run against [`PgStore`] in production and [`MemoryStore`] in
//! tests.

pub mod memory;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use muchio_core::{Email, OrderId, ProductId, StockStatus, UserId};

use crate::models::{
    CustomerSpending, NewOrder, NewUser, Order, OrderItem, OrderWithCustomer, Product,
    ProductSales, StockScope, TrackingUpdate, User,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Name of the counter that issues order numbers.
pub const ORDER_NUMBER_SEQUENCE: &str = "orderNumber";

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Result of one stock adjustment attempt for an order item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockAdjustment {
    /// Stock was decremented; `remaining` is the new count.
    Applied { scope: StockScope, remaining: i32 },
    /// The item had already been processed; nothing changed.
    AlreadySettled(StockStatus),
    /// Not enough stock; nothing was decremented.
    Insufficient { scope: StockScope, available: i32 },
    /// The referenced product does not exist.
    ProductNotFound,
    /// The referenced option value does not exist on the product.
    OptionNotFound,
    /// The product does not track inventory.
    Untracked,
}

impl StockAdjustment {
    /// Stock status recorded on the item for this outcome.
    #[must_use]
    pub const fn status(&self) -> StockStatus {
        match self {
            Self::Applied { .. } => StockStatus::Applied,
            Self::AlreadySettled(status) => *status,
            Self::Insufficient { .. } => StockStatus::Insufficient,
            Self::ProductNotFound | Self::OptionNotFound => StockStatus::Skipped,
            Self::Untracked => StockStatus::Untracked,
        }
    }
}

/// Customer storage.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Find a customer by normalized email.
    async fn find_user_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError>;

    /// Get a customer by id.
    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    /// Insert a customer.
    ///
    /// Returns `RepositoryError::Conflict` if the email is already taken.
    async fn create_user(&self, user: &NewUser) -> Result<User, RepositoryError>;

    /// Persist the mutable fields of an existing customer.
    ///
    /// Returns `RepositoryError::NotFound` if the customer does not exist.
    async fn update_user(&self, user: &User) -> Result<User, RepositoryError>;
}

/// Stock storage.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Get a product with its variants and options.
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    /// Apply the stock decrement for one order item.
    ///
    /// Claiming the item's pending status, checking and decrementing the
    /// stock, and recording the resulting status happen atomically. Calling
    /// this again for a settled item changes nothing.
    async fn apply_stock_adjustment(
        &self,
        item: &OrderItem,
    ) -> Result<StockAdjustment, RepositoryError>;
}

/// Order and order-number storage.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Atomically increment the named counter and return the new value.
    ///
    /// The first call for a name returns 1.
    async fn next_sequence_value(&self, name: &str) -> Result<i64, RepositoryError>;

    /// Insert an order with its items, all items start `pending`.
    ///
    /// Returns `RepositoryError::Conflict` if `payment_event_id` or the
    /// order number is already used.
    async fn insert_order(
        &self,
        order: &NewOrder,
        order_number: i64,
    ) -> Result<Order, RepositoryError>;

    /// Get an order by id.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Find the order created from a payment provider event.
    async fn find_order_by_payment_event(
        &self,
        event_id: &str,
    ) -> Result<Option<Order>, RepositoryError>;

    /// All orders of a customer, newest first.
    async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError>;

    /// Total number of orders.
    async fn count_orders(&self) -> Result<i64, RepositoryError>;

    /// Attach tracking details and mark the order fulfilled.
    ///
    /// Returns `None` if the order does not exist.
    async fn update_tracking(
        &self,
        id: OrderId,
        update: &TrackingUpdate,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Orders that still have items with `pending` stock status, oldest first.
    async fn orders_with_pending_stock(&self, limit: i64) -> Result<Vec<Order>, RepositoryError>;

    /// Stamp the order's confirmation as sent, unless it already is.
    ///
    /// Returns `false` when another caller holds the claim or the order does
    /// not exist; only the caller that gets `true` sends the email.
    async fn claim_confirmation(&self, id: OrderId) -> Result<bool, RepositoryError>;

    /// Clear a confirmation claim so the email is retried later.
    async fn release_confirmation(&self, id: OrderId) -> Result<(), RepositoryError>;

    /// Checkout orders whose confirmation has not been sent, oldest first.
    async fn orders_awaiting_confirmation(
        &self,
        limit: i64,
    ) -> Result<Vec<Order>, RepositoryError>;

    /// Every order with its customer, newest first.
    async fn list_orders_with_customers(&self) -> Result<Vec<OrderWithCustomer>, RepositoryError>;

    /// Delete an order and its items.
    ///
    /// Returns `false` if the order does not exist. Stock is not restored.
    async fn delete_order(&self, id: OrderId) -> Result<bool, RepositoryError>;

    /// Units sold and revenue per item name, best sellers first.
    async fn product_sales(&self) -> Result<Vec<ProductSales>, RepositoryError>;

    /// Sum of order totals per customer, biggest spenders first.
    ///
    /// Orders whose customer no longer exists are left out.
    async fn customer_spending(&self) -> Result<Vec<CustomerSpending>, RepositoryError>;
}

/// Everything the server needs from storage.
#[async_trait]
pub trait Store: UserStore + ProductStore + OrderStore {
    /// Check that storage is reachable.
    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
