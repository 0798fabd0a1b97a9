//! Reconstruction of order lines from checkout line items.
//!
//! Each Stripe product created for the catalog carries the shop's ids in its
//! metadata (`productId`, optional `variantId` and `variantName`). Those ids
//! are the only link back to local stock, so a line item without them makes
//! the whole checkout unusable.

use thiserror::Error;

use muchio_core::{OptionValueId, ProductId, from_minor_units, unit_price};

use crate::models::OrderItemDraft;
use crate::models::address::non_blank;
use crate::stripe::LineItem;

const PRODUCT_ID_KEY: &str = "productId";
const VARIANT_ID_KEY: &str = "variantId";
const VARIANT_NAME_KEY: &str = "variantName";

/// Why a line item could not be mapped to an order line.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LineItemError {
    /// The price's product was not expanded in the listing.
    #[error("line item {line_item} has no expanded product")]
    ProductNotExpanded { line_item: String },

    /// The product has no `productId` metadata.
    #[error("line item {line_item} is missing productId metadata")]
    MissingProductId { line_item: String },

    /// A metadata id does not parse.
    #[error("line item {line_item} has invalid {key} metadata: {value:?}")]
    InvalidMetadata {
        line_item: String,
        key: &'static str,
        value: String,
    },

    /// Quantity absent or zero.
    #[error("line item {line_item} has no quantity")]
    InvalidQuantity { line_item: String },
}

/// Map every line item to an order line, failing on the first broken one.
///
/// Unit price is the line total divided by quantity, rounded to cents; the
/// line total is the provider's `amount_total`.
///
/// # Errors
///
/// Returns `LineItemError` if any item lacks its product link or quantity.
pub fn reconstruct(line_items: &[LineItem]) -> Result<Vec<OrderItemDraft>, LineItemError> {
    line_items.iter().map(reconstruct_one).collect()
}

fn reconstruct_one(line_item: &LineItem) -> Result<OrderItemDraft, LineItemError> {
    let product = line_item
        .product()
        .ok_or_else(|| LineItemError::ProductNotExpanded {
            line_item: line_item.id.clone(),
        })?;

    let metadata = |key: &str| non_blank(product.metadata.get(key).map(String::as_str));

    let raw_product_id =
        metadata(PRODUCT_ID_KEY).ok_or_else(|| LineItemError::MissingProductId {
            line_item: line_item.id.clone(),
        })?;
    let product_id: ProductId =
        raw_product_id
            .parse()
            .map_err(|_| LineItemError::InvalidMetadata {
                line_item: line_item.id.clone(),
                key: PRODUCT_ID_KEY,
                value: raw_product_id.to_string(),
            })?;

    let variant_id = metadata(VARIANT_ID_KEY)
        .map(|raw| {
            raw.parse::<OptionValueId>()
                .map_err(|_| LineItemError::InvalidMetadata {
                    line_item: line_item.id.clone(),
                    key: VARIANT_ID_KEY,
                    value: raw.to_string(),
                })
        })
        .transpose()?;

    let quantity = line_item.quantity.filter(|q| *q > 0).ok_or_else(|| {
        LineItemError::InvalidQuantity {
            line_item: line_item.id.clone(),
        }
    })?;
    let price = unit_price(line_item.amount_total, quantity).ok_or_else(|| {
        LineItemError::InvalidQuantity {
            line_item: line_item.id.clone(),
        }
    })?;

    let name = non_blank(line_item.description.as_deref())
        .or_else(|| non_blank(product.name.as_deref()))
        .unwrap_or(product.id.as_str())
        .to_string();

    Ok(OrderItemDraft {
        product_id,
        variant_id,
        name,
        variant_name: metadata(VARIANT_NAME_KEY).map(str::to_string),
        quantity,
        price,
        total: from_minor_units(line_item.amount_total),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::*;

    fn line_item(metadata: serde_json::Value, quantity: u32, amount_total: i64) -> LineItem {
        serde_json::from_value(json!({
            "id": "li_1",
            "description": "Linen Shirt",
            "quantity": quantity,
            "amount_total": amount_total,
            "price": {
                "id": "price_1",
                "unit_amount": 1500,
                "product": {
                    "id": "prod_Shirt",
                    "name": "Linen Shirt (Stripe)",
                    "metadata": metadata
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_variant_line() {
        let items = reconstruct(&[line_item(
            json!({"productId": "7", "variantId": "71", "variantName": "Size: M"}),
            2,
            3000,
        )])
        .unwrap();

        let item = &items[0];
        assert_eq!(item.product_id, ProductId::new(7));
        assert_eq!(item.variant_id, Some(OptionValueId::new(71)));
        assert_eq!(item.variant_name.as_deref(), Some("Size: M"));
        assert_eq!(item.name, "Linen Shirt");
        assert_eq!(item.quantity, 2);
        assert_eq!(item.price, Decimal::new(1500, 2));
        assert_eq!(item.total, Decimal::new(3000, 2));
    }

    #[test]
    fn test_plain_product_line() {
        let items = reconstruct(&[line_item(json!({"productId": "3", "variantId": ""}), 3, 1000)])
            .unwrap();
        assert_eq!(items[0].variant_id, None);
        assert_eq!(items[0].variant_name, None);
        assert_eq!(items[0].price, Decimal::new(333, 2));
        assert_eq!(items[0].total, Decimal::new(1000, 2));
    }

    #[test]
    fn test_missing_product_id_fails_whole_batch() {
        let result = reconstruct(&[
            line_item(json!({"productId": "3"}), 1, 500),
            line_item(json!({"variantId": "9"}), 1, 500),
        ]);
        assert_eq!(
            result,
            Err(LineItemError::MissingProductId {
                line_item: "li_1".to_string()
            })
        );
    }

    #[test]
    fn test_non_numeric_product_id() {
        let result = reconstruct(&[line_item(json!({"productId": "64f0c2a9e1"}), 1, 500)]);
        assert!(matches!(
            result,
            Err(LineItemError::InvalidMetadata {
                key: PRODUCT_ID_KEY,
                ..
            })
        ));
    }

    #[test]
    fn test_zero_quantity() {
        let result = reconstruct(&[line_item(json!({"productId": "3"}), 0, 500)]);
        assert!(matches!(result, Err(LineItemError::InvalidQuantity { .. })));
    }

    #[test]
    fn test_unexpanded_product() {
        let item: LineItem = serde_json::from_value(json!({
            "id": "li_2",
            "quantity": 1,
            "amount_total": 500,
            "price": {"id": "price_1", "product": "prod_1"}
        }))
        .unwrap();
        assert!(matches!(
            reconstruct(&[item]),
            Err(LineItemError::ProductNotExpanded { .. })
        ));
    }

    #[test]
    fn test_name_falls_back_to_product_name() {
        let mut item = line_item(json!({"productId": "3"}), 1, 500);
        item.description = None;
        let items = reconstruct(&[item]).unwrap();
        assert_eq!(items[0].name, "Linen Shirt (Stripe)");
    }
}
