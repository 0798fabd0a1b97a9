//! Order types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use muchio_core::{
    Email, FulfillmentStatus, OptionValueId, OrderId, OrderItemId, PaymentStatus, ProductId, StockStatus,
    UserId,
};

use super::address::Address;
use super::user::User;

/// Shipping block of an order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingInfo {
    #[serde(default)]
    pub carrier_name: String,
    #[serde(default)]
    pub shipping_cost: Decimal,
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(default)]
    pub shipping_option: String,
}

/// A persisted order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: OrderItemId,
    pub product_id: ProductId,
    /// Option value the customer picked, if the product has variants.
    pub variant_id: Option<OptionValueId>,
    pub name: String,
    pub variant_name: Option<String>,
    pub quantity: i32,
    /// Unit price.
    pub price: Decimal,
    /// Line total.
    pub total: Decimal,
    /// Inventory adjustment state of this line.
    pub stock_status: StockStatus,
}

/// A persisted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub order_number: i64,
    pub items: Vec<OrderItem>,
    pub subtotal: Decimal,
    pub shipping_info: ShippingInfo,
    pub total_price: Decimal,
    pub payment_status: PaymentStatus,
    pub fulfillment_status: FulfillmentStatus,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    /// Provider event that created this order. Unique when present.
    pub payment_event_id: Option<String>,
    pub checkout_session_id: Option<String>,
    /// When the confirmation email was handed to the mail transport.
    pub confirmation_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Lines whose stock adjustment has not run yet.
    pub fn pending_items(&self) -> impl Iterator<Item = &OrderItem> {
        self.items
            .iter()
            .filter(|item| item.stock_status == StockStatus::Pending)
    }
}

/// An order together with the customer who placed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderWithCustomer {
    #[serde(flatten)]
    pub order: Order,
    /// `None` when the customer record is gone.
    pub user: Option<User>,
}

/// Units sold and revenue for one item name across all orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSales {
    pub name: String,
    pub total_sold: i64,
    /// Sum of `quantity * unit price`.
    pub total_revenue: Decimal,
}

/// Total order value of one customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSpending {
    pub user_id: UserId,
    pub name: String,
    pub email: Email,
    pub total_spending: Decimal,
}

/// An order line before it is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemDraft {
    #[serde(deserialize_with = "lenient_id")]
    pub product_id: ProductId,
    #[serde(default, deserialize_with = "lenient_optional_id")]
    pub variant_id: Option<OptionValueId>,
    pub name: String,
    #[serde(default)]
    pub variant_name: Option<String>,
    pub quantity: u32,
    pub price: Decimal,
    pub total: Decimal,
}

/// An order as assembled by a caller, possibly incomplete.
///
/// Turned into a [`NewOrder`] by the order writer's validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderDraft {
    pub user_id: Option<UserId>,
    pub items: Vec<OrderItemDraft>,
    /// Defaults to the sum of line totals when absent.
    pub subtotal: Option<Decimal>,
    pub shipping_info: ShippingInfo,
    pub total_price: Option<Decimal>,
    pub payment_status: PaymentStatus,
    pub payment_event_id: Option<String>,
    pub checkout_session_id: Option<String>,
    /// Status every line starts with; `Pending` lines are for the ledger.
    pub item_stock_status: StockStatus,
}

impl OrderDraft {
    /// Sum of all line totals.
    #[must_use]
    pub fn items_total(&self) -> Decimal {
        self.items.iter().map(|item| item.total).sum()
    }
}

/// A validated order ready for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub items: Vec<OrderItemDraft>,
    pub subtotal: Decimal,
    pub shipping_info: ShippingInfo,
    pub total_price: Decimal,
    pub payment_status: PaymentStatus,
    pub payment_event_id: Option<String>,
    pub checkout_session_id: Option<String>,
    pub item_stock_status: StockStatus,
}

/// Tracking details attached when an order ships.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingUpdate {
    pub tracking_number: String,
    pub carrier: String,
}

/// Ids arrive as numbers or numeric strings depending on the client.
#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Number(i32),
    Text(String),
}

fn lenient_id<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: From<i32>,
{
    match IdRepr::deserialize(deserializer)? {
        IdRepr::Number(n) => Ok(T::from(n)),
        IdRepr::Text(s) => s
            .trim()
            .parse::<i32>()
            .map(T::from)
            .map_err(|_| serde::de::Error::custom(format!("invalid id: {s:?}"))),
    }
}

fn lenient_optional_id<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: From<i32>,
{
    match Option::<IdRepr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(IdRepr::Number(n)) => Ok(Some(T::from(n))),
        Some(IdRepr::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(IdRepr::Text(s)) => s
            .trim()
            .parse::<i32>()
            .map(|n| Some(T::from(n)))
            .map_err(|_| serde::de::Error::custom(format!("invalid id: {s:?}"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_item_draft_accepts_string_ids() {
        let item: OrderItemDraft = serde_json::from_value(serde_json::json!({
            "productId": "12",
            "variantId": "",
            "name": "Candle",
            "quantity": 2,
            "price": "9.50",
            "total": "19.00"
        }))
        .unwrap();
        assert_eq!(item.product_id, ProductId::new(12));
        assert_eq!(item.variant_id, None);
        assert_eq!(item.total, Decimal::new(1900, 2));
    }

    #[test]
    fn test_item_draft_accepts_numeric_ids() {
        let item: OrderItemDraft = serde_json::from_value(serde_json::json!({
            "productId": 3,
            "variantId": 31,
            "name": "Mug",
            "variantName": "Blue",
            "quantity": 1,
            "price": 12,
            "total": 12
        }))
        .unwrap();
        assert_eq!(item.variant_id, Some(OptionValueId::new(31)));
        assert_eq!(item.variant_name.as_deref(), Some("Blue"));
    }

    #[test]
    fn test_item_draft_rejects_garbage_id() {
        let result = serde_json::from_value::<OrderItemDraft>(serde_json::json!({
            "productId": "64f0c2a9e1",
            "name": "Mug",
            "quantity": 1,
            "price": 12,
            "total": 12
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_items_total() {
        let draft = OrderDraft {
            items: vec![
                OrderItemDraft {
                    product_id: ProductId::new(1),
                    variant_id: None,
                    name: "A".to_string(),
                    variant_name: None,
                    quantity: 2,
                    price: Decimal::new(500, 2),
                    total: Decimal::new(1000, 2),
                },
                OrderItemDraft {
                    product_id: ProductId::new(2),
                    variant_id: None,
                    name: "B".to_string(),
                    variant_name: None,
                    quantity: 1,
                    price: Decimal::new(250, 2),
                    total: Decimal::new(250, 2),
                },
            ],
            ..OrderDraft::default()
        };
        assert_eq!(draft.items_total(), Decimal::new(1250, 2));
    }
}
