//! Domain models for the order backend.
//!
//! These are validated domain types, kept separate from the database row
//! types in [`crate::db`] and the payment-provider wire types in
//! [`crate::stripe`].

pub mod address;
pub mod order;
pub mod product;
pub mod user;

pub use address::Address;
pub use order::{
    CustomerSpending, NewOrder, Order, OrderDraft, OrderItem, OrderItemDraft, OrderWithCustomer,
    ProductSales, ShippingInfo, TrackingUpdate,
};
pub use product::{OptionValue, Product, StockScope, Variant};
pub use user::{CustomerDetails, NewUser, User};
