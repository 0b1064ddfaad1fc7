use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    AuditEntry, Money, NewOrder, NewOrderItem, NewProduct, NewVariant, Order, OrderId, OrderItem,
    OrderStatus, Product, ProductId, UserId, Variant, VariantId,
};
use serde::{Deserialize, Serialize};

use crate::{InventoryLedger, Result, StoreError};

/// Checks the rules every backend enforces before storing a product.
pub(crate) fn validate_product(product: &NewProduct) -> Result<()> {
    if product.name.trim().is_empty() {
        return Err(StoreError::InvalidProduct("name is empty".to_string()));
    }
    if !product.base_price.is_positive() {
        return Err(StoreError::InvalidProduct(format!(
            "base price {} must be greater than 0",
            product.base_price
        )));
    }
    Ok(())
}

/// Read access to the catalog plus the admin restock operation.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Registers a product and returns it with its assigned id.
    async fn insert_product(&self, product: NewProduct) -> Result<Product>;

    /// Registers a variant of an existing product.
    async fn insert_variant(&self, variant: NewVariant) -> Result<Variant>;

    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>>;

    async fn get_variant(&self, variant_id: VariantId) -> Result<Option<Variant>>;

    /// Adds `quantity` units to the variant's stock.
    async fn restock(&self, variant_id: VariantId, quantity: u32) -> Result<Variant>;
}

/// A unit of work that creates one order.
///
/// Nothing written through the transaction is visible or durable until
/// [`commit`](OrderTransaction::commit) succeeds. Dropping an uncommitted
/// transaction rolls back the header, the items and every reservation.
#[async_trait]
pub trait OrderTransaction: InventoryLedger {
    /// Inserts the order header and returns it with its assigned id and
    /// timestamps. The returned order has no items yet.
    async fn insert_order(&mut self, order: NewOrder) -> Result<Order>;

    /// Inserts one immutable order line.
    async fn insert_item(&mut self, order_id: OrderId, item: &NewOrderItem) -> Result<OrderItem>;

    /// Makes every write of the transaction durable.
    async fn commit(&mut self) -> Result<()>;
}

/// A request to move an order from one status to the next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub order_id: OrderId,
    pub expected: OrderStatus,
    pub next: OrderStatus,
    pub audit: AuditEntry,
}

/// Outcome label stored with a payment notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationOutcome {
    Confirmed,
    AlreadyProcessed,
    Rejected,
}

impl NotificationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationOutcome::Confirmed => "confirmed",
            NotificationOutcome::AlreadyProcessed => "already_processed",
            NotificationOutcome::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for NotificationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for NotificationOutcome {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(NotificationOutcome::Confirmed),
            "already_processed" => Ok(NotificationOutcome::AlreadyProcessed),
            "rejected" => Ok(NotificationOutcome::Rejected),
            other => Err(format!("unknown notification outcome: {other}")),
        }
    }
}

/// A payment notification as received, with the reconciliation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentNotificationRecord {
    pub received_at: DateTime<Utc>,
    pub transaction_id: String,
    pub description: String,
    pub amount: Money,
    /// Order the description resolved to, if any.
    pub order_id: Option<OrderId>,
    pub outcome: NotificationOutcome,
    pub message: String,
}

/// Persistence for catalog, orders and the payment notification log.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait FulfillmentStore: CatalogStore {
    type Transaction: OrderTransaction + 'static;

    /// Opens an order transaction.
    async fn begin(&self) -> Result<Self::Transaction>;

    /// Retrieves an order with its items.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Lists orders, newest first, optionally filtered by status.
    async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>>;

    /// Lists a user's orders, newest first, optionally filtered by status.
    async fn list_orders_for_user(
        &self,
        user_id: UserId,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>>;

    /// Sets the order status to `change.next` only if it is currently
    /// `change.expected`, appending `change.audit` to the audit log.
    ///
    /// Fails with `StatusConflict` (carrying the actual status) when another
    /// writer got there first and with `OrderNotFound` for unknown orders.
    async fn compare_and_set_status(&self, change: StatusChange) -> Result<Order>;

    /// Appends a payment notification to the operator log.
    async fn record_payment_notification(&self, record: PaymentNotificationRecord) -> Result<()>;

    /// Returns the payment notification log, oldest first.
    async fn list_payment_notifications(&self) -> Result<Vec<PaymentNotificationRecord>>;

    /// Short backend name reported by health checks.
    fn backend(&self) -> &'static str;
}
