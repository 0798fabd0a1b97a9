//! Inventory ledger: applies an order's stock decrements.
//!
//! Each order line carries its own stock status, written together with the
//! order: `pending` for checkout orders, `external` for orders recorded
//! through the order API, whose stock the checkout already took. The ledger settles pending lines one at a time through
//! [`ProductStore::apply_stock_adjustment`], which claims the line, checks
//! and decrements the stock and records the outcome in one transaction. Lines
//! are independent: a shortage on one does not hold back or undo another.
//! Running the ledger again for the same order only touches lines that are
//! still pending.

use thiserror::Error;
use tracing::instrument;

use muchio_core::{OptionValueId, OrderItemId, ProductId, StockStatus};

use crate::db::{ProductStore, RepositoryError, StockAdjustment};
use crate::models::{Order, OrderItem, StockScope};

/// Problems found while adjusting stock.
///
/// Only `Repository` aborts a ledger run; the others are recorded on the line
/// and logged.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Not enough stock for the requested quantity.
    #[error(
        "insufficient {scope} stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        variant_id: Option<OptionValueId>,
        scope: StockScope,
        requested: i32,
        available: i32,
    },

    /// Product no longer exists.
    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    /// Option value no longer exists on the product.
    #[error("option {option_id} not found on product {product_id}")]
    OptionNotFound {
        product_id: ProductId,
        option_id: OptionValueId,
    },

    /// Storage failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Outcome for one order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineOutcome {
    pub item_id: OrderItemId,
    pub product_id: ProductId,
    pub adjustment: StockAdjustment,
}

/// Result of one ledger run over an order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryReport {
    pub lines: Vec<LineOutcome>,
}

impl InventoryReport {
    /// Number of lines that ended with `status`.
    #[must_use]
    pub fn count(&self, status: StockStatus) -> usize {
        self.lines
            .iter()
            .filter(|line| line.adjustment.status() == status)
            .count()
    }

    /// Whether any line was short on stock.
    #[must_use]
    pub fn has_shortages(&self) -> bool {
        self.count(StockStatus::Insufficient) > 0
    }
}

/// Applies stock decrements for orders.
pub struct InventoryLedger<'a, S: ?Sized> {
    products: &'a S,
}

impl<'a, S: ProductStore + ?Sized> InventoryLedger<'a, S> {
    /// Create a ledger over `products`.
    #[must_use]
    pub const fn new(products: &'a S) -> Self {
        Self { products }
    }

    /// Settle every pending line of `order`.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::Repository` if storage fails; lines after the
    /// failing one stay pending for the next run.
    #[instrument(skip(self, order), fields(order_number = order.order_number))]
    pub async fn apply_order(&self, order: &Order) -> Result<InventoryReport, InventoryError> {
        let mut report = InventoryReport::default();

        for item in order.pending_items() {
            let adjustment = self.products.apply_stock_adjustment(item).await?;
            log_adjustment(order, item, adjustment);
            report.lines.push(LineOutcome {
                item_id: item.id,
                product_id: item.product_id,
                adjustment,
            });
        }

        Ok(report)
    }
}

fn log_adjustment(order: &Order, item: &OrderItem, adjustment: StockAdjustment) {
    let order_number = order.order_number;
    let product_id = item.product_id.as_i32();
    let variant_id = item.variant_id.map(|id| id.as_i32());

    let problem = match adjustment {
        StockAdjustment::Applied { scope, remaining } => {
            tracing::info!(
                order_number,
                product_id,
                variant_id,
                quantity = item.quantity,
                %scope,
                remaining,
                "Stock decremented"
            );
            return;
        }
        StockAdjustment::Untracked => {
            tracing::debug!(order_number, product_id, "Product does not track stock");
            return;
        }
        StockAdjustment::AlreadySettled(status) => {
            tracing::debug!(order_number, product_id, ?status, "Line already settled");
            return;
        }
        StockAdjustment::Insufficient { scope, available } => InventoryError::InsufficientStock {
            product_id: item.product_id,
            variant_id: item.variant_id,
            scope,
            requested: item.quantity,
            available,
        },
        StockAdjustment::ProductNotFound => InventoryError::ProductNotFound(item.product_id),
        StockAdjustment::OptionNotFound => match item.variant_id {
            Some(option_id) => InventoryError::OptionNotFound {
                product_id: item.product_id,
                option_id,
            },
            None => InventoryError::ProductNotFound(item.product_id),
        },
    };

    tracing::warn!(
        order_number,
        product_id,
        variant_id,
        error = %problem,
        "Stock adjustment needs manual follow-up"
    );
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use muchio_core::{InventoryType, UserId, VariantId};

    use super::*;
    use crate::db::{MemoryStore, OrderStore};
    use crate::models::{NewOrder, OptionValue, OrderItemDraft, Product, ShippingInfo, Variant};

    fn shirt() -> Product {
        Product {
            id: ProductId::new(1),
            name: "Linen Shirt".to_string(),
            sku: None,
            price: Decimal::new(1500, 2),
            cost_price: None,
            current_stock: 0,
            inventory_type: InventoryType::TrackByOptions,
            payment_product_id: None,
            variants: vec![Variant {
                id: VariantId::new(1),
                option_name: "Size".to_string(),
                option_values: vec![OptionValue {
                    id: OptionValueId::new(11),
                    value: "M".to_string(),
                    price: Decimal::new(1500, 2),
                    sku: None,
                    quantity: 5,
                    payment_product_id: None,
                }],
            }],
        }
    }

    fn mug(stock: i32, inventory_type: InventoryType) -> Product {
        Product {
            id: ProductId::new(2),
            name: "Mug".to_string(),
            sku: None,
            price: Decimal::new(1000, 2),
            cost_price: None,
            current_stock: stock,
            inventory_type,
            payment_product_id: None,
            variants: Vec::new(),
        }
    }

    fn line(product: i32, variant: Option<i32>, quantity: u32) -> OrderItemDraft {
        OrderItemDraft {
            product_id: ProductId::new(product),
            variant_id: variant.map(OptionValueId::new),
            name: "Line".to_string(),
            variant_name: None,
            quantity,
            price: Decimal::ONE,
            total: Decimal::from(quantity),
        }
    }

    async fn order(store: &MemoryStore, items: Vec<OrderItemDraft>) -> Order {
        let new_order = NewOrder {
            user_id: UserId::new(1),
            items,
            subtotal: Decimal::ZERO,
            shipping_info: ShippingInfo::default(),
            total_price: Decimal::ZERO,
            payment_status: muchio_core::PaymentStatus::Paid,
            payment_event_id: None,
            checkout_session_id: None,
            item_stock_status: StockStatus::Pending,
        };
        let number = store.next_sequence_value("orderNumber").await.unwrap();
        store.insert_order(&new_order, number).await.unwrap()
    }

    async fn option_stock(store: &MemoryStore) -> i32 {
        store
            .get_product(ProductId::new(1))
            .await
            .unwrap()
            .unwrap()
            .find_option(OptionValueId::new(11))
            .unwrap()
            .quantity
    }

    #[tokio::test]
    async fn test_shortage_does_not_block_other_lines() {
        let store = MemoryStore::new();
        store.insert_product(shirt()).await;
        store.insert_product(mug(0, InventoryType::Track)).await;
        let order = order(&store, vec![line(1, Some(11), 2), line(2, None, 1)]).await;

        let report = InventoryLedger::new(&store).apply_order(&order).await.unwrap();

        assert_eq!(report.count(StockStatus::Applied), 1);
        assert!(report.has_shortages());
        assert_eq!(option_stock(&store).await, 3);
        let mug = store.get_product(ProductId::new(2)).await.unwrap().unwrap();
        assert_eq!(mug.current_stock, 0);
    }

    #[tokio::test]
    async fn test_exact_stock_reaches_zero() {
        let store = MemoryStore::new();
        store.insert_product(mug(3, InventoryType::Track)).await;
        let order = order(&store, vec![line(2, None, 3)]).await;

        InventoryLedger::new(&store).apply_order(&order).await.unwrap();

        let mug = store.get_product(ProductId::new(2)).await.unwrap().unwrap();
        assert_eq!(mug.current_stock, 0);
    }

    #[tokio::test]
    async fn test_rerun_is_a_no_op() {
        let store = MemoryStore::new();
        store.insert_product(shirt()).await;
        let order = order(&store, vec![line(1, Some(11), 2)]).await;
        let ledger = InventoryLedger::new(&store);

        ledger.apply_order(&order).await.unwrap();
        // Stale copy still shows the line as pending
        let second = ledger.apply_order(&order).await.unwrap();

        assert_eq!(
            second.lines[0].adjustment,
            StockAdjustment::AlreadySettled(StockStatus::Applied)
        );
        assert_eq!(option_stock(&store).await, 3);
    }

    #[tokio::test]
    async fn test_missing_product_and_untracked() {
        let store = MemoryStore::new();
        store.insert_product(mug(1, InventoryType::DoNotTrack)).await;
        let order = order(&store, vec![line(99, None, 1), line(2, None, 4)]).await;

        let report = InventoryLedger::new(&store).apply_order(&order).await.unwrap();

        assert_eq!(report.count(StockStatus::Skipped), 1);
        assert_eq!(report.count(StockStatus::Untracked), 1);
        let mug = store.get_product(ProductId::new(2)).await.unwrap().unwrap();
        assert_eq!(mug.current_stock, 1);
    }

    #[tokio::test]
    async fn test_unknown_option_is_skipped() {
        let store = MemoryStore::new();
        store.insert_product(shirt()).await;
        let order = order(&store, vec![line(1, Some(12), 1)]).await;

        let report = InventoryLedger::new(&store).apply_order(&order).await.unwrap();
        assert_eq!(report.lines[0].adjustment, StockAdjustment::OptionNotFound);
        assert_eq!(option_stock(&store).await, 5);
    }
}
