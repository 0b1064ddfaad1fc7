//! Domain error types.

use common::{Money, OrderId, OrderStatus, ProductId, VariantId};
use store::StoreError;
use thiserror::Error;

/// How an error should be reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself is malformed.
    Validation,
    /// A referenced product, variant or order does not exist for the caller.
    NotFound,
    /// The request is well-formed but conflicts with current state.
    Conflict,
    /// An infrastructure failure; details must not reach the caller.
    Internal,
}

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Invalid quantity {quantity} for variant {variant_id} (must be greater than 0)")]
    InvalidQuantity { variant_id: VariantId, quantity: u32 },

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// The client-declared total disagrees with the server-side price.
    #[error("Total mismatch: declared {declared}, computed {computed}")]
    TotalMismatch { declared: Money, computed: Money },

    #[error("Invalid total {0} (must be greater than 0)")]
    InvalidTotal(Money),

    /// Line totals do not fit in a monetary amount.
    #[error("Order amount out of range")]
    AmountOverflow,

    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The variant does not exist or belongs to another product.
    #[error("Variant not found: {0}")]
    VariantNotFound(VariantId),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error(
        "Insufficient stock for variant {variant_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        variant_id: VariantId,
        requested: u32,
        available: u32,
    },

    /// The status graph has no edge from `current` to `target`.
    #[error(
        "Invalid status transition for order {order_id}: cannot move from {current} to {target}"
    )]
    IllegalTransition {
        order_id: OrderId,
        current: OrderStatus,
        target: OrderStatus,
    },

    #[error("Order {0} is cancelled")]
    AlreadyCancelled(OrderId),

    /// The status kept changing underneath every retry.
    #[error("Order {0} was modified concurrently, retry the request")]
    ConcurrentModification(OrderId),

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl OrderError {
    /// Classifies the error for the transport layer.
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::EmptyCart
            | OrderError::InvalidQuantity { .. }
            | OrderError::MissingField(_)
            | OrderError::TotalMismatch { .. }
            | OrderError::InvalidTotal(_)
            | OrderError::AmountOverflow => ErrorKind::Validation,
            OrderError::ProductNotFound(_)
            | OrderError::VariantNotFound(_)
            | OrderError::OrderNotFound(_) => ErrorKind::NotFound,
            OrderError::InsufficientStock { .. }
            | OrderError::IllegalTransition { .. }
            | OrderError::AlreadyCancelled(_)
            | OrderError::ConcurrentModification(_) => ErrorKind::Conflict,
            OrderError::Store(_) => ErrorKind::Internal,
        }
    }

    /// Short label used as a metrics dimension.
    pub fn reason(&self) -> &'static str {
        match self {
            OrderError::EmptyCart => "empty_cart",
            OrderError::InvalidQuantity { .. } => "invalid_quantity",
            OrderError::MissingField(_) => "missing_field",
            OrderError::TotalMismatch { .. } => "total_mismatch",
            OrderError::InvalidTotal(_) => "invalid_total",
            OrderError::AmountOverflow => "amount_overflow",
            OrderError::ProductNotFound(_) => "product_not_found",
            OrderError::VariantNotFound(_) => "variant_not_found",
            OrderError::OrderNotFound(_) => "order_not_found",
            OrderError::InsufficientStock { .. } => "insufficient_stock",
            OrderError::IllegalTransition { .. } => "illegal_transition",
            OrderError::AlreadyCancelled(_) => "already_cancelled",
            OrderError::ConcurrentModification(_) => "concurrent_modification",
            OrderError::Store(_) => "store",
        }
    }
}

impl From<StoreError> for OrderError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InsufficientStock {
                variant_id,
                requested,
                available,
            } => OrderError::InsufficientStock {
                variant_id,
                requested,
                available,
            },
            StoreError::ProductNotFound(id) => OrderError::ProductNotFound(id),
            StoreError::VariantNotFound(id) => OrderError::VariantNotFound(id),
            StoreError::OrderNotFound(id) => OrderError::OrderNotFound(id),
            other => OrderError::Store(other),
        }
    }
}
