//! In-memory implementation of the store traits.
//!
//! Used by tests and local experiments. Every operation takes one lock, so
//! each trait method is atomic in the same way the `PostgreSQL` version is.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use muchio_core::{
    Email, FulfillmentStatus, InventoryType, OrderId, OrderItemId, ProductId, StockStatus, UserId,
    UserRole,
};

use super::{OrderStore, ProductStore, RepositoryError, StockAdjustment, Store, UserStore};
use crate::models::{
    CustomerSpending, NewOrder, NewUser, Order, OrderItem, OrderWithCustomer, Product,
    ProductSales, StockScope, TrackingUpdate, User,
};

#[derive(Debug, Default)]
struct Data {
    users: BTreeMap<UserId, User>,
    products: BTreeMap<ProductId, Product>,
    orders: BTreeMap<OrderId, Order>,
    sequences: HashMap<String, i64>,
    last_user_id: i32,
    last_order_id: i32,
    last_item_id: i32,
}

/// Store holding everything in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<Data>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a catalog product.
    pub async fn insert_product(&self, product: Product) {
        self.data.lock().await.products.insert(product.id, product);
    }

    /// Snapshot of all customers, ordered by id.
    pub async fn users(&self) -> Vec<User> {
        self.data.lock().await.users.values().cloned().collect()
    }

    /// Snapshot of all orders, ordered by id.
    pub async fn orders(&self) -> Vec<Order> {
        self.data.lock().await.orders.values().cloned().collect()
    }
}

fn item_mut(data: &mut Data, id: OrderItemId) -> Option<&mut OrderItem> {
    data.orders
        .values_mut()
        .flat_map(|order| order.items.iter_mut())
        .find(|item| item.id == id)
}

fn adjust_stock(product: Option<&mut Product>, item: &OrderItem) -> StockAdjustment {
    let Some(product) = product else {
        return StockAdjustment::ProductNotFound;
    };
    if product.inventory_type == InventoryType::DoNotTrack {
        return StockAdjustment::Untracked;
    }

    let (scope, stock) = match item.variant_id {
        Some(option_id) => match product.find_option_mut(option_id) {
            Some(option) => (StockScope::Variant, &mut option.quantity),
            None => return StockAdjustment::OptionNotFound,
        },
        None => (StockScope::Product, &mut product.current_stock),
    };

    if *stock < item.quantity {
        return StockAdjustment::Insufficient {
            scope,
            available: *stock,
        };
    }
    *stock -= item.quantity;
    StockAdjustment::Applied {
        scope,
        remaining: *stock,
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let data = self.data.lock().await;
        Ok(data.users.values().find(|u| &u.email == email).cloned())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.data.lock().await.users.get(&id).cloned())
    }

    async fn create_user(&self, user: &NewUser) -> Result<User, RepositoryError> {
        let mut data = self.data.lock().await;
        if data.users.values().any(|u| u.email == user.email) {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }

        data.last_user_id += 1;
        let now = Utc::now();
        let created = User {
            id: UserId::new(data.last_user_id),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            street: user.street.clone(),
            city: user.city.clone(),
            province: user.province.clone(),
            postal_code: user.postal_code.clone(),
            country: user.country.clone(),
            phone: user.phone.clone(),
            role: UserRole::User,
            is_active: true,
            email_subscribed: false,
            sms_subscribed: false,
            payment_customer_id: None,
            created_at: now,
            updated_at: now,
        };
        data.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_user(&self, user: &User) -> Result<User, RepositoryError> {
        let mut data = self.data.lock().await;
        let stored = data.users.get_mut(&user.id).ok_or(RepositoryError::NotFound)?;

        stored.first_name.clone_from(&user.first_name);
        stored.last_name.clone_from(&user.last_name);
        stored.street.clone_from(&user.street);
        stored.city.clone_from(&user.city);
        stored.province.clone_from(&user.province);
        stored.postal_code.clone_from(&user.postal_code);
        stored.country.clone_from(&user.country);
        stored.phone.clone_from(&user.phone);
        stored.payment_customer_id.clone_from(&user.payment_customer_id);
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.data.lock().await.products.get(&id).cloned())
    }

    async fn apply_stock_adjustment(
        &self,
        item: &OrderItem,
    ) -> Result<StockAdjustment, RepositoryError> {
        let mut data = self.data.lock().await;

        let status = item_mut(&mut data, item.id)
            .map(|stored| stored.stock_status)
            .ok_or(RepositoryError::NotFound)?;
        if status.is_settled() {
            return Ok(StockAdjustment::AlreadySettled(status));
        }

        let adjustment = adjust_stock(data.products.get_mut(&item.product_id), item);

        if let Some(stored) = item_mut(&mut data, item.id) {
            stored.stock_status = adjustment.status();
        }
        Ok(adjustment)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn next_sequence_value(&self, name: &str) -> Result<i64, RepositoryError> {
        let mut data = self.data.lock().await;
        let seq = data.sequences.entry(name.to_owned()).or_insert(0);
        *seq += 1;
        Ok(*seq)
    }

    async fn insert_order(
        &self,
        order: &NewOrder,
        order_number: i64,
    ) -> Result<Order, RepositoryError> {
        let mut data = self.data.lock().await;

        if data.orders.values().any(|o| o.order_number == order_number) {
            return Err(RepositoryError::Conflict(
                "order number already exists".to_owned(),
            ));
        }
        if let Some(event_id) = &order.payment_event_id
            && data
                .orders
                .values()
                .any(|o| o.payment_event_id.as_ref() == Some(event_id))
        {
            return Err(RepositoryError::Conflict(
                "order for this payment event already exists".to_owned(),
            ));
        }

        let mut items = Vec::with_capacity(order.items.len());
        for item in &order.items {
            let quantity = i32::try_from(item.quantity).map_err(|_| {
                RepositoryError::DataCorruption(format!("quantity out of range: {}", item.quantity))
            })?;
            data.last_item_id += 1;
            items.push(OrderItem {
                id: OrderItemId::new(data.last_item_id),
                product_id: item.product_id,
                variant_id: item.variant_id,
                name: item.name.clone(),
                variant_name: item.variant_name.clone(),
                quantity,
                price: item.price,
                total: item.total,
                stock_status: order.item_stock_status,
            });
        }

        data.last_order_id += 1;
        let now = Utc::now();
        let created = Order {
            id: OrderId::new(data.last_order_id),
            user_id: order.user_id,
            order_number,
            items,
            subtotal: order.subtotal,
            shipping_info: order.shipping_info.clone(),
            total_price: order.total_price,
            payment_status: order.payment_status,
            fulfillment_status: FulfillmentStatus::Unfulfilled,
            tracking_number: None,
            carrier: None,
            payment_event_id: order.payment_event_id.clone(),
            checkout_session_id: order.checkout_session_id.clone(),
            confirmation_sent_at: None,
            created_at: now,
            updated_at: now,
        };
        data.orders.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.data.lock().await.orders.get(&id).cloned())
    }

    async fn find_order_by_payment_event(
        &self,
        event_id: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let data = self.data.lock().await;
        Ok(data
            .orders
            .values()
            .find(|o| o.payment_event_id.as_deref() == Some(event_id))
            .cloned())
    }

    async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let data = self.data.lock().await;
        Ok(data
            .orders
            .values()
            .rev()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn count_orders(&self) -> Result<i64, RepositoryError> {
        let data = self.data.lock().await;
        i64::try_from(data.orders.len())
            .map_err(|_| RepositoryError::DataCorruption("order count overflow".to_owned()))
    }

    async fn update_tracking(
        &self,
        id: OrderId,
        update: &TrackingUpdate,
    ) -> Result<Option<Order>, RepositoryError> {
        let mut data = self.data.lock().await;
        let Some(order) = data.orders.get_mut(&id) else {
            return Ok(None);
        };
        order.tracking_number = Some(update.tracking_number.clone());
        order.carrier = Some(update.carrier.clone());
        order.fulfillment_status = FulfillmentStatus::Fulfilled;
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }

    async fn orders_with_pending_stock(&self, limit: i64) -> Result<Vec<Order>, RepositoryError> {
        let limit = usize::try_from(limit).unwrap_or(0);
        let data = self.data.lock().await;
        Ok(data
            .orders
            .values()
            .filter(|o| o.pending_items().next().is_some())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn claim_confirmation(&self, id: OrderId) -> Result<bool, RepositoryError> {
        let mut data = self.data.lock().await;
        match data.orders.get_mut(&id) {
            Some(order) if order.confirmation_sent_at.is_none() => {
                order.confirmation_sent_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_confirmation(&self, id: OrderId) -> Result<(), RepositoryError> {
        if let Some(order) = self.data.lock().await.orders.get_mut(&id) {
            order.confirmation_sent_at = None;
        }
        Ok(())
    }

    async fn orders_awaiting_confirmation(
        &self,
        limit: i64,
    ) -> Result<Vec<Order>, RepositoryError> {
        let limit = usize::try_from(limit).unwrap_or(0);
        let data = self.data.lock().await;
        Ok(data
            .orders
            .values()
            .filter(|o| o.payment_event_id.is_some() && o.confirmation_sent_at.is_none())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_orders_with_customers(&self) -> Result<Vec<OrderWithCustomer>, RepositoryError> {
        let data = self.data.lock().await;
        Ok(data
            .orders
            .values()
            .rev()
            .map(|order| OrderWithCustomer {
                order: order.clone(),
                user: data.users.get(&order.user_id).cloned(),
            })
            .collect())
    }

    async fn delete_order(&self, id: OrderId) -> Result<bool, RepositoryError> {
        Ok(self.data.lock().await.orders.remove(&id).is_some())
    }

    async fn product_sales(&self) -> Result<Vec<ProductSales>, RepositoryError> {
        let data = self.data.lock().await;
        let mut by_name: BTreeMap<&str, (i64, Decimal)> = BTreeMap::new();
        for item in data.orders.values().flat_map(|o| o.items.iter()) {
            let entry = by_name.entry(item.name.as_str()).or_default();
            entry.0 += i64::from(item.quantity);
            entry.1 += item.price * Decimal::from(item.quantity);
        }

        let mut sales: Vec<ProductSales> = by_name
            .into_iter()
            .map(|(name, (total_sold, total_revenue))| ProductSales {
                name: name.to_owned(),
                total_sold,
                total_revenue,
            })
            .collect();
        sales.sort_by(|a, b| b.total_sold.cmp(&a.total_sold).then_with(|| a.name.cmp(&b.name)));
        Ok(sales)
    }

    async fn customer_spending(&self) -> Result<Vec<CustomerSpending>, RepositoryError> {
        let data = self.data.lock().await;
        let mut totals: BTreeMap<UserId, Decimal> = BTreeMap::new();
        for order in data.orders.values() {
            *totals.entry(order.user_id).or_default() += order.total_price;
        }

        let mut spending: Vec<CustomerSpending> = totals
            .into_iter()
            .filter_map(|(user_id, total_spending)| {
                let user = data.users.get(&user_id)?;
                Some(CustomerSpending {
                    user_id,
                    name: user.display_name(),
                    email: user.email.clone(),
                    total_spending,
                })
            })
            .collect();
        spending.sort_by(|a, b| {
            b.total_spending
                .cmp(&a.total_spending)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        Ok(spending)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;

    use muchio_core::{OptionValueId, PaymentStatus, VariantId};

    use super::*;
    use crate::models::{OptionValue, OrderItemDraft, ShippingInfo, Variant};

    fn product(id: i32, stock: i32) -> Product {
        Product {
            id: ProductId::new(id),
            name: format!("Product {id}"),
            sku: None,
            price: Decimal::new(1000, 2),
            cost_price: None,
            current_stock: stock,
            inventory_type: InventoryType::Track,
            payment_product_id: None,
            variants: vec![Variant {
                id: VariantId::new(id * 10),
                option_name: "Size".to_string(),
                option_values: vec![OptionValue {
                    id: OptionValueId::new(id * 100),
                    value: "M".to_string(),
                    price: Decimal::new(1000, 2),
                    sku: None,
                    quantity: 5,
                    payment_product_id: None,
                }],
            }],
        }
    }

    fn new_order(user_id: UserId, items: Vec<OrderItemDraft>, event: Option<&str>) -> NewOrder {
        NewOrder {
            user_id,
            items,
            subtotal: Decimal::new(2000, 2),
            shipping_info: ShippingInfo::default(),
            total_price: Decimal::new(2000, 2),
            payment_status: PaymentStatus::Paid,
            payment_event_id: event.map(str::to_string),
            checkout_session_id: None,
            item_stock_status: StockStatus::Pending,
        }
    }

    fn draft(product_id: i32, variant: Option<i32>, quantity: u32) -> OrderItemDraft {
        OrderItemDraft {
            product_id: ProductId::new(product_id),
            variant_id: variant.map(OptionValueId::new),
            name: "Item".to_string(),
            variant_name: None,
            quantity,
            price: Decimal::new(1000, 2),
            total: Decimal::new(1000, 2) * Decimal::from(quantity),
        }
    }

    async fn customer(store: &MemoryStore) -> User {
        store
            .create_user(&NewUser {
                email: Email::parse("kim@example.com").unwrap(),
                first_name: "Kim".to_string(),
                last_name: String::new(),
                street: String::new(),
                city: String::new(),
                province: String::new(),
                postal_code: String::new(),
                country: String::new(),
                phone: String::new(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_user_rejects_duplicate_email() {
        let store = MemoryStore::new();
        let user = customer(&store).await;
        assert!(user.is_active);
        assert_eq!(user.role, UserRole::User);

        let again = store
            .create_user(&NewUser {
                email: user.email.clone(),
                first_name: String::new(),
                last_name: String::new(),
                street: String::new(),
                city: String::new(),
                province: String::new(),
                postal_code: String::new(),
                country: String::new(),
                phone: String::new(),
            })
            .await;
        assert!(matches!(again, Err(RepositoryError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_sequence_is_monotonic_under_concurrency() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.next_sequence_value("orderNumber").await.unwrap()
            }));
        }

        let mut values = Vec::new();
        for handle in handles {
            values.push(handle.await.unwrap());
        }
        values.sort_unstable();
        assert_eq!(values, (1..=50).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn test_insert_order_rejects_duplicate_payment_event() {
        let store = MemoryStore::new();
        let user = customer(&store).await;

        let first = new_order(user.id, vec![draft(1, None, 1)], Some("evt_1"));
        store.insert_order(&first, 1).await.unwrap();
        let second = store.insert_order(&first, 2).await;
        assert!(matches!(second, Err(RepositoryError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_stock_adjustment_applies_once() {
        let store = MemoryStore::new();
        store.insert_product(product(1, 4)).await;
        let user = customer(&store).await;
        let order = store
            .insert_order(&new_order(user.id, vec![draft(1, None, 3)], None), 1)
            .await
            .unwrap();
        let item = &order.items[0];

        let first = store.apply_stock_adjustment(item).await.unwrap();
        assert_eq!(
            first,
            StockAdjustment::Applied {
                scope: StockScope::Product,
                remaining: 1
            }
        );

        let second = store.apply_stock_adjustment(item).await.unwrap();
        assert_eq!(
            second,
            StockAdjustment::AlreadySettled(StockStatus::Applied)
        );
        let stock = store
            .get_product(ProductId::new(1))
            .await
            .unwrap()
            .unwrap()
            .current_stock;
        assert_eq!(stock, 1);
    }

    #[tokio::test]
    async fn test_stock_adjustment_insufficient_leaves_stock() {
        let store = MemoryStore::new();
        store.insert_product(product(2, 1)).await;
        let user = customer(&store).await;
        let order = store
            .insert_order(&new_order(user.id, vec![draft(2, Some(200), 6)], None), 1)
            .await
            .unwrap();

        let outcome = store.apply_stock_adjustment(&order.items[0]).await.unwrap();
        assert_eq!(
            outcome,
            StockAdjustment::Insufficient {
                scope: StockScope::Variant,
                available: 5
            }
        );

        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.items[0].stock_status, StockStatus::Insufficient);
        let product = store.get_product(ProductId::new(2)).await.unwrap().unwrap();
        assert_eq!(
            product.find_option(OptionValueId::new(200)).map(|o| o.quantity),
            Some(5)
        );
    }

    #[tokio::test]
    async fn test_pending_orders_and_tracking() {
        let store = MemoryStore::new();
        let user = customer(&store).await;
        let order = store
            .insert_order(&new_order(user.id, vec![draft(9, None, 1)], None), 1)
            .await
            .unwrap();

        let pending = store.orders_with_pending_stock(10).await.unwrap();
        assert_eq!(pending.len(), 1);

        let outcome = store.apply_stock_adjustment(&order.items[0]).await.unwrap();
        assert_eq!(outcome, StockAdjustment::ProductNotFound);
        assert!(store.orders_with_pending_stock(10).await.unwrap().is_empty());

        let updated = store
            .update_tracking(
                order.id,
                &TrackingUpdate {
                    tracking_number: "1Z999".to_string(),
                    carrier: "ups".to_string(),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.fulfillment_status, FulfillmentStatus::Fulfilled);
        assert!(
            store
                .update_tracking(OrderId::new(404), &TrackingUpdate {
                    tracking_number: "x".to_string(),
                    carrier: "dhl".to_string(),
                })
                .await
                .unwrap()
                .is_none()
        );
    }
}
