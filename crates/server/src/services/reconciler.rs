//! Finishes checkouts that were interrupted after their order was written.
//!
//! An order is written before its stock is adjusted and its confirmation is
//! sent. If the process stops or storage fails in between, the order keeps
//! `pending` lines or an unsent confirmation; these sweeps catch up later.
//! Stock is swept by the background task and by `muchio reconcile-inventory`,
//! confirmations by the background task only.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, instrument, warn};

use muchio_core::StockStatus;

use crate::db::{OrderStore, ProductStore, RepositoryError, Store, UserStore};

use super::email::{Notifier, deliver_confirmation};
use super::inventory::{InventoryError, InventoryLedger};

/// Orders fetched per sweep.
pub const DEFAULT_BATCH_SIZE: i64 = 100;

/// Totals of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub orders: usize,
    pub applied: usize,
    pub insufficient: usize,
    pub skipped: usize,
}

/// Run the ledger over up to `limit` orders with pending lines.
///
/// # Errors
///
/// Returns `InventoryError::Repository` on the first storage failure.
#[instrument(skip(store))]
pub async fn reconcile_pending<S>(store: &S, limit: i64) -> Result<ReconcileSummary, InventoryError>
where
    S: OrderStore + ProductStore + ?Sized,
{
    let orders = store.orders_with_pending_stock(limit).await?;
    let ledger = InventoryLedger::new(store);
    let mut summary = ReconcileSummary::default();

    for order in &orders {
        let report = ledger.apply_order(order).await?;
        summary.orders += 1;
        summary.applied += report.count(StockStatus::Applied);
        summary.insufficient += report.count(StockStatus::Insufficient);
        summary.skipped += report.count(StockStatus::Skipped);
    }

    if summary.orders > 0 {
        info!(
            orders = summary.orders,
            applied = summary.applied,
            insufficient = summary.insufficient,
            skipped = summary.skipped,
            "Reconciled pending stock"
        );
    }
    Ok(summary)
}

/// Send the confirmation of up to `limit` checkout orders that lack one.
///
/// Returns how many emails were delivered.
///
/// # Errors
///
/// Returns `RepositoryError` on the first storage failure.
#[instrument(skip(store, notifier))]
pub async fn resend_confirmations<S>(
    store: &S,
    notifier: &dyn Notifier,
    shop_name: &str,
    limit: i64,
) -> Result<usize, RepositoryError>
where
    S: OrderStore + UserStore + ?Sized,
{
    let orders = store.orders_awaiting_confirmation(limit).await?;
    let mut delivered = 0;

    for order in &orders {
        let Some(user) = store.get_user(order.user_id).await? else {
            warn!(order_number = order.order_number, "Order has no customer on file");
            continue;
        };
        if deliver_confirmation(store, notifier, order, &user, shop_name).await? {
            delivered += 1;
        }
    }

    if !orders.is_empty() {
        info!(
            orders = orders.len(),
            delivered, "Swept unsent order confirmations"
        );
    }
    Ok(delivered)
}

/// Spawn a background task running both sweeps every `period`.
pub fn spawn_reconciler(
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    shop_name: String,
    period: Duration,
) -> JoinHandle<()> {
    info!(period_secs = period.as_secs(), "Spawning order reconciler");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = reconcile_pending(&*store, DEFAULT_BATCH_SIZE).await {
                error!(error = %e, "Inventory reconciliation failed");
            }
            if let Err(e) =
                resend_confirmations(&*store, &*notifier, &shop_name, DEFAULT_BATCH_SIZE).await
            {
                error!(error = %e, "Confirmation sweep failed");
            }
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use muchio_core::{Email, InventoryType, PaymentStatus, ProductId, UserId};

    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{NewOrder, NewUser, OrderItemDraft, Product, ShippingInfo};
    use crate::services::email::LogNotifier;

    #[tokio::test]
    async fn test_settles_pending_orders_once() {
        let store = MemoryStore::new();
        store
            .insert_product(Product {
                id: ProductId::new(4),
                name: "Tea Tin".to_string(),
                sku: None,
                price: Decimal::new(800, 2),
                cost_price: None,
                current_stock: 10,
                inventory_type: InventoryType::Track,
                payment_product_id: None,
                variants: Vec::new(),
            })
            .await;

        for number in 1..=2 {
            let order = NewOrder {
                user_id: UserId::new(1),
                items: vec![OrderItemDraft {
                    product_id: ProductId::new(4),
                    variant_id: None,
                    name: "Tea Tin".to_string(),
                    variant_name: None,
                    quantity: 3,
                    price: Decimal::new(800, 2),
                    total: Decimal::new(2400, 2),
                }],
                subtotal: Decimal::new(2400, 2),
                shipping_info: ShippingInfo::default(),
                total_price: Decimal::new(2400, 2),
                payment_status: PaymentStatus::Paid,
                payment_event_id: None,
                checkout_session_id: None,
                item_stock_status: StockStatus::Pending,
            };
            store.insert_order(&order, number).await.unwrap();
        }

        let first = reconcile_pending(&store, DEFAULT_BATCH_SIZE).await.unwrap();
        assert_eq!(first.orders, 2);
        assert_eq!(first.applied, 2);

        let second = reconcile_pending(&store, DEFAULT_BATCH_SIZE).await.unwrap();
        assert_eq!(second, ReconcileSummary::default());

        let product = store.get_product(ProductId::new(4)).await.unwrap().unwrap();
        assert_eq!(product.current_stock, 4);
    }

    #[tokio::test]
    async fn test_resends_missing_confirmations_once() {
        let store = MemoryStore::new();
        let user = store
            .create_user(&NewUser {
                email: Email::parse("noa@example.com").unwrap(),
                first_name: "Noa".to_string(),
                last_name: String::new(),
                street: String::new(),
                city: String::new(),
                province: String::new(),
                postal_code: String::new(),
                country: String::new(),
                phone: String::new(),
            })
            .await
            .unwrap();

        for (number, event) in [(1, Some("evt_interrupted")), (2, None)] {
            let order = NewOrder {
                user_id: user.id,
                items: Vec::new(),
                subtotal: Decimal::new(900, 2),
                shipping_info: ShippingInfo::default(),
                total_price: Decimal::new(900, 2),
                payment_status: PaymentStatus::Paid,
                payment_event_id: event.map(str::to_string),
                checkout_session_id: None,
                item_stock_status: StockStatus::Pending,
            };
            store.insert_order(&order, number).await.unwrap();
        }

        let first = resend_confirmations(&store, &LogNotifier, "Muchio Shop", DEFAULT_BATCH_SIZE)
            .await
            .unwrap();
        let second = resend_confirmations(&store, &LogNotifier, "Muchio Shop", DEFAULT_BATCH_SIZE)
            .await
            .unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 0);
        let orders = store.orders().await;
        assert!(orders[0].confirmation_sent_at.is_some());
        assert!(orders[1].confirmation_sent_at.is_none());
    }
}
