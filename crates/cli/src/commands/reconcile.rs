//! Inventory reconciliation command.
//!
//! Applies the stock adjustments of order lines still marked `pending`,
//! e.g. after the server stopped between writing an order and settling its
//! stock. Safe to run repeatedly; settled lines are never touched again.
//!
//! # Usage
//!
//! ```bash
//! muchio reconcile-inventory --limit 500
//! ```

use muchio_server::db::{self, PgStore};
use muchio_server::services::reconcile_pending;

use super::{CommandError, database_url};

/// Reconcile up to `limit` orders.
///
/// # Errors
///
/// Returns `CommandError` if the database is unreachable or a storage
/// operation fails mid-sweep.
pub async fn run(limit: i64) -> Result<(), CommandError> {
    let database_url = database_url()?;
    let pool = db::create_pool(&database_url).await?;
    let store = PgStore::new(pool);

    let summary = reconcile_pending(&store, limit).await?;
    tracing::info!(
        orders = summary.orders,
        applied = summary.applied,
        insufficient = summary.insufficient,
        skipped = summary.skipped,
        "Inventory reconciliation complete"
    );
    Ok(())
}
