use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{
    NewOrder, NewOrderItem, NewProduct, NewVariant, Order, OrderId, OrderItem, OrderItemId,
    OrderStatus, Product, ProductId, UserId, Variant, VariantId,
};
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

use crate::{
    InventoryLedger, Reservation, Result, StoreError,
    store::{
        CatalogStore, FulfillmentStore, OrderTransaction, PaymentNotificationRecord, StatusChange,
        validate_product,
    },
};

#[derive(Default)]
struct MemoryState {
    products: BTreeMap<ProductId, Product>,
    variants: BTreeMap<VariantId, Variant>,
    orders: BTreeMap<OrderId, Order>,
    notifications: Vec<PaymentNotificationRecord>,
    last_product_id: i64,
    last_variant_id: i64,
    last_order_id: i64,
    last_item_id: i64,
}

impl MemoryState {
    fn orders_newest_first<'a>(
        &'a self,
        filter: impl Fn(&Order) -> bool + 'a,
    ) -> impl Iterator<Item = Order> + 'a {
        self.orders
            .values()
            .rev()
            .filter(move |order| filter(*order))
            .cloned()
    }
}

/// In-memory fulfillment store.
///
/// Provides the same interface and atomicity as the PostgreSQL store. An open
/// order transaction holds the write lock, so transactions are serialized.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn insert_product(&self, product: NewProduct) -> Result<Product> {
        validate_product(&product)?;
        let mut state = self.state.write().await;
        state.last_product_id += 1;
        let product = Product {
            id: ProductId::new(state.last_product_id),
            name: product.name,
            base_price: product.base_price,
            size_threshold: product.size_threshold,
            size_surcharge_pct: product.size_surcharge_pct,
            discount_pct: product.discount_pct,
            promo_start: product.promo_start,
            promo_end: product.promo_end,
            promo_name: product.promo_name,
        };
        state.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn insert_variant(&self, variant: NewVariant) -> Result<Variant> {
        let mut state = self.state.write().await;
        if !state.products.contains_key(&variant.product_id) {
            return Err(StoreError::ProductNotFound(variant.product_id));
        }
        state.last_variant_id += 1;
        let variant = Variant {
            id: VariantId::new(state.last_variant_id),
            product_id: variant.product_id,
            size_label: variant.size_label,
            stock: variant.stock,
            sku: variant.sku,
        };
        state.variants.insert(variant.id, variant.clone());
        Ok(variant)
    }

    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&product_id).cloned())
    }

    async fn get_variant(&self, variant_id: VariantId) -> Result<Option<Variant>> {
        Ok(self.state.read().await.variants.get(&variant_id).cloned())
    }

    async fn restock(&self, variant_id: VariantId, quantity: u32) -> Result<Variant> {
        let mut state = self.state.write().await;
        let variant = state
            .variants
            .get_mut(&variant_id)
            .ok_or(StoreError::VariantNotFound(variant_id))?;
        variant.stock = variant.stock.saturating_add(quantity);
        Ok(variant.clone())
    }
}

#[async_trait]
impl FulfillmentStore for InMemoryStore {
    type Transaction = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction> {
        let guard = self.state.clone().write_owned().await;
        Ok(InMemoryTransaction {
            state: Some(guard),
            journal: Vec::new(),
        })
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&order_id).cloned())
    }

    async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders_newest_first(|order| status.is_none_or(|s| order.status == s))
            .collect())
    }

    async fn list_orders_for_user(
        &self,
        user_id: UserId,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders_newest_first(|order| {
                order.user_id == user_id && status.is_none_or(|s| order.status == s)
            })
            .collect())
    }

    async fn compare_and_set_status(&self, change: StatusChange) -> Result<Order> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(&change.order_id)
            .ok_or(StoreError::OrderNotFound(change.order_id))?;

        if order.status != change.expected {
            return Err(StoreError::StatusConflict {
                order_id: change.order_id,
                expected: change.expected,
                actual: order.status,
            });
        }

        order.status = change.next;
        order.updated_at = change.audit.timestamp;
        order.audit_log.push(change.audit);
        Ok(order.clone())
    }

    async fn record_payment_notification(&self, record: PaymentNotificationRecord) -> Result<()> {
        self.state.write().await.notifications.push(record);
        Ok(())
    }

    async fn list_payment_notifications(&self) -> Result<Vec<PaymentNotificationRecord>> {
        Ok(self.state.read().await.notifications.clone())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// Write performed by a transaction, recorded so it can be undone.
enum Undo {
    Stock { variant_id: VariantId, previous: u32 },
    Order(OrderId),
}

/// Order transaction over the in-memory store.
///
/// Holds the store's write lock until committed or dropped. Dropping it
/// uncommitted replays the undo journal in reverse.
pub struct InMemoryTransaction {
    state: Option<OwnedRwLockWriteGuard<MemoryState>>,
    journal: Vec<Undo>,
}

impl InMemoryTransaction {
    fn state(&mut self) -> Result<&mut MemoryState> {
        self.state
            .as_deref_mut()
            .ok_or(StoreError::TransactionClosed)
    }
}

#[async_trait]
impl InventoryLedger for InMemoryTransaction {
    async fn reserve(&mut self, variant_id: VariantId, quantity: u32) -> Result<Reservation> {
        let state = self.state()?;
        let variant = state
            .variants
            .get_mut(&variant_id)
            .ok_or(StoreError::VariantNotFound(variant_id))?;

        let previous = variant.stock;
        let Some(remaining) = previous.checked_sub(quantity) else {
            metrics::counter!("stock_reservations_total", "result" => "insufficient").increment(1);
            return Err(StoreError::InsufficientStock {
                variant_id,
                requested: quantity,
                available: previous,
            });
        };
        variant.stock = remaining;

        self.journal.push(Undo::Stock {
            variant_id,
            previous,
        });
        metrics::counter!("stock_reservations_total", "result" => "reserved").increment(1);

        Ok(Reservation {
            variant_id,
            quantity,
            remaining,
        })
    }
}

#[async_trait]
impl OrderTransaction for InMemoryTransaction {
    async fn insert_order(&mut self, order: NewOrder) -> Result<Order> {
        let state = self.state()?;
        state.last_order_id += 1;
        let now = Utc::now();
        let order = Order {
            id: OrderId::new(state.last_order_id),
            user_id: order.user_id,
            customer_name: order.customer_name,
            customer_phone: order.customer_phone,
            shipping_address: order.shipping_address,
            total_amount: order.total_amount,
            shipping_fee: order.shipping_fee,
            status: order.status,
            payment_method: order.payment_method,
            note: order.note,
            audit_log: order.audit_log,
            items: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        state.orders.insert(order.id, order.clone());
        self.journal.push(Undo::Order(order.id));
        Ok(order)
    }

    async fn insert_item(&mut self, order_id: OrderId, item: &NewOrderItem) -> Result<OrderItem> {
        let state = self.state()?;
        state.last_item_id += 1;
        let item = OrderItem {
            id: OrderItemId::new(state.last_item_id),
            order_id,
            product_id: item.product_id,
            variant_id: item.variant_id,
            quantity: item.quantity,
            price_at_purchase: item.price_at_purchase,
        };
        // Items live inside their order, so undoing the order removes them.
        state
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?
            .items
            .push(item.clone());
        Ok(item)
    }

    async fn commit(&mut self) -> Result<()> {
        self.state.take().ok_or(StoreError::TransactionClosed)?;
        self.journal.clear();
        Ok(())
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        let Some(state) = self.state.as_deref_mut() else {
            return;
        };
        if !self.journal.is_empty() {
            tracing::debug!(writes = self.journal.len(), "rolling back in-memory transaction");
        }
        for undo in self.journal.drain(..).rev() {
            match undo {
                Undo::Stock {
                    variant_id,
                    previous,
                } => {
                    if let Some(variant) = state.variants.get_mut(&variant_id) {
                        variant.stock = previous;
                    }
                }
                Undo::Order(order_id) => {
                    state.orders.remove(&order_id);
                }
            }
        }
    }
}
