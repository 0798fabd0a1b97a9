//! Business logic of the order pipeline.
//!
//! # Modules
//!
//! - `checkout` - Webhook-driven checkout processing (orchestrates the rest)
//! - `customers` - Customer resolution by email
//! - `line_items` - Provider line items to order lines
//! - `orders` - Order numbering and persistence
//! - `inventory` - Per-line stock adjustment
//! - `reconciler` - Sweeps for stock lines and confirmations left pending
//! - `email` - Customer emails and delivery

pub mod checkout;
pub mod customers;
pub mod email;
pub mod inventory;
pub mod line_items;
pub mod orders;
pub mod reconciler;

pub use checkout::{CheckoutError, CheckoutOutcome, CheckoutProcessor, CheckoutSettings};
pub use customers::{CustomerError, CustomerResolver};
pub use email::{LogNotifier, Notifier, NotifyError, SmtpNotifier};
pub use inventory::{InventoryError, InventoryLedger, InventoryReport};
pub use line_items::LineItemError;
pub use orders::{OrderPersistenceError, OrderWriter};
pub use reconciler::{ReconcileSummary, reconcile_pending, resend_confirmations, spawn_reconciler};
