//! Shared types for the storefront fulfillment core.
//!
//! Identifiers, money and the catalog/order records passed between the
//! store, the domain services and the HTTP adapter.

mod catalog;
mod money;
mod order;
mod types;

pub use catalog::{NewProduct, NewVariant, Product, Variant};
pub use money::Money;
pub use order::{
    Actor, AuditEntry, NewOrder, NewOrderItem, Order, OrderItem, OrderStatus, ParseEnumError,
    PaymentMethod,
};
pub use types::{OrderId, OrderItemId, ProductId, UserId, VariantId};
