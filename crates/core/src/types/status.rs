//! Status enums for catalog, order and customer entities.

use serde::{Deserialize, Serialize};

/// How a product's stock is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.inventory_type", rename_all = "snake_case")
)]
#[serde(rename_all = "camelCase")]
pub enum InventoryType {
    /// Stock lives on the product's `current_stock`.
    #[default]
    Track,
    /// Stock is not tracked; sales never decrement anything.
    DoNotTrack,
    /// Stock lives on each variant option value.
    TrackByOptions,
}

/// Payment status reported by the payment provider for a checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.payment_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Unpaid,
    NoPaymentRequired,
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Paid => write!(f, "paid"),
            Self::Unpaid => write!(f, "unpaid"),
            Self::NoPaymentRequired => write!(f, "no_payment_required"),
        }
    }
}

/// Physical shipment state of an order, independent of payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.fulfillment_status", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum FulfillmentStatus {
    #[default]
    Unfulfilled,
    Fulfilled,
}

/// Inventory adjustment state of a single order line.
///
/// Lines start `Pending` when the order is written and move to exactly one
/// terminal state when the inventory ledger processes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.stock_status", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum StockStatus {
    #[default]
    Pending,
    /// Stock was decremented.
    Applied,
    /// Not enough stock; nothing was decremented.
    Insufficient,
    /// Product or option no longer exists.
    Skipped,
    /// Product does not track inventory.
    Untracked,
    /// Stock for this line is accounted for elsewhere; the ledger never
    /// adjusts it.
    External,
}

impl StockStatus {
    /// Whether the ledger has already processed this line.
    #[must_use]
    pub const fn is_settled(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Customer account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.user_role", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    #[default]
    User,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_inventory_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&InventoryType::TrackByOptions).unwrap(),
            "\"trackByOptions\""
        );
        let parsed: InventoryType = serde_json::from_str("\"doNotTrack\"").unwrap();
        assert_eq!(parsed, InventoryType::DoNotTrack);
    }

    #[test]
    fn test_payment_status_matches_provider_values() {
        let parsed: PaymentStatus = serde_json::from_str("\"no_payment_required\"").unwrap();
        assert_eq!(parsed, PaymentStatus::NoPaymentRequired);
        assert_eq!(PaymentStatus::Paid.to_string(), "paid");
    }

    #[test]
    fn test_fulfillment_status_default() {
        assert_eq!(FulfillmentStatus::default(), FulfillmentStatus::Unfulfilled);
        assert_eq!(
            serde_json::to_string(&FulfillmentStatus::Unfulfilled).unwrap(),
            "\"unfulfilled\""
        );
    }

    #[test]
    fn test_stock_status_settled() {
        assert!(!StockStatus::Pending.is_settled());
        assert!(StockStatus::Applied.is_settled());
        assert!(StockStatus::Insufficient.is_settled());
        assert!(StockStatus::External.is_settled());
    }
}
