//! Catalog types as seen by the inventory ledger.
//!
//! Catalog management lives outside this service; only the stock-bearing
//! fields are modelled here.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use muchio_core::{InventoryType, OptionValueId, ProductId, VariantId};

/// A product with its variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub sku: Option<String>,
    pub price: Decimal,
    pub cost_price: Option<Decimal>,
    /// Stock for products without per-option tracking. Never negative.
    pub current_stock: i32,
    pub inventory_type: InventoryType,
    /// Product id registered with the payment provider.
    pub payment_product_id: Option<String>,
    pub variants: Vec<Variant>,
}

/// An option group of a product, e.g. "Size".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub id: VariantId,
    pub option_name: String,
    pub option_values: Vec<OptionValue>,
}

/// A purchasable option of a variant with its own price and stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionValue {
    pub id: OptionValueId,
    pub value: String,
    pub price: Decimal,
    pub sku: Option<String>,
    /// Never negative.
    pub quantity: i32,
    pub payment_product_id: Option<String>,
}

/// Where a stock count lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockScope {
    /// The product's own `current_stock`.
    Product,
    /// An option value's `quantity`.
    Variant,
}

impl std::fmt::Display for StockScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Product => write!(f, "product"),
            Self::Variant => write!(f, "variant"),
        }
    }
}

impl Product {
    /// Find the option value with `id` among all variants of this product.
    #[must_use]
    pub fn find_option(&self, id: OptionValueId) -> Option<&OptionValue> {
        self.variants
            .iter()
            .flat_map(|variant| variant.option_values.iter())
            .find(|option| option.id == id)
    }

    /// Mutable variant of [`Product::find_option`].
    pub fn find_option_mut(&mut self, id: OptionValueId) -> Option<&mut OptionValue> {
        self.variants
            .iter_mut()
            .flat_map(|variant| variant.option_values.iter_mut())
            .find(|option| option.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product_with_sizes() -> Product {
        Product {
            id: ProductId::new(1),
            name: "Linen Shirt".to_string(),
            sku: Some("LS-01".to_string()),
            price: Decimal::new(4500, 2),
            cost_price: None,
            current_stock: 0,
            inventory_type: InventoryType::TrackByOptions,
            payment_product_id: None,
            variants: vec![Variant {
                id: VariantId::new(10),
                option_name: "Size".to_string(),
                option_values: vec![
                    OptionValue {
                        id: OptionValueId::new(100),
                        value: "S".to_string(),
                        price: Decimal::new(4500, 2),
                        sku: None,
                        quantity: 4,
                        payment_product_id: None,
                    },
                    OptionValue {
                        id: OptionValueId::new(101),
                        value: "M".to_string(),
                        price: Decimal::new(4500, 2),
                        sku: None,
                        quantity: 2,
                        payment_product_id: None,
                    },
                ],
            }],
        }
    }

    #[test]
    fn test_find_option() {
        let product = product_with_sizes();
        let option = product.find_option(OptionValueId::new(101));
        assert_eq!(option.map(|o| o.value.as_str()), Some("M"));
        assert!(product.find_option(OptionValueId::new(999)).is_none());
    }

    #[test]
    fn test_find_option_mut() {
        let mut product = product_with_sizes();
        if let Some(option) = product.find_option_mut(OptionValueId::new(100)) {
            option.quantity -= 1;
        }
        assert_eq!(
            product.find_option(OptionValueId::new(100)).map(|o| o.quantity),
            Some(3)
        );
    }
}
