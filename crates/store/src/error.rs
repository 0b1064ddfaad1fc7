use common::{OrderId, OrderStatus, ProductId, VariantId};
use thiserror::Error;

/// Errors that can occur when interacting with the fulfillment store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A reservation asked for more units than the variant holds.
    #[error(
        "Insufficient stock for variant {variant_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        variant_id: VariantId,
        requested: u32,
        available: u32,
    },

    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("Variant not found: {0}")]
    VariantNotFound(VariantId),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// A compare-and-set on the order status lost against another writer.
    #[error("Status conflict for order {order_id}: expected {expected}, found {actual}")]
    StatusConflict {
        order_id: OrderId,
        expected: OrderStatus,
        actual: OrderStatus,
    },

    /// The transaction was used after commit.
    #[error("Transaction already closed")]
    TransactionClosed,

    /// A product was rejected before being written.
    #[error("Invalid product: {0}")]
    InvalidProduct(String),

    /// A persisted row could not be mapped back to a record.
    #[error("Invalid row: {0}")]
    InvalidRow(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
