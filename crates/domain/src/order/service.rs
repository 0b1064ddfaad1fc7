//! Order service: creation, status transitions and queries.

use std::time::Instant;

use chrono::Utc;
use common::{Actor, AuditEntry, NewOrderItem, Order, OrderId, OrderStatus, UserId};
use store::{FulfillmentStore, InventoryLedger, OrderTransaction, StatusChange, StoreError};

use crate::error::{ErrorKind, OrderError};
use crate::events::{EventPublisher, OrderEvent, OrderSummary};
use crate::pricing;

use super::builder::{CreateOrder, OrderPolicy, plan_order};
use super::state::{OrderAction, ensure_transition};

/// Attempts made when a status compare-and-set loses a race.
pub const MAX_TRANSITION_ATTEMPTS: usize = 3;

/// Records metrics, logs and publishes events for a committed transition.
pub(crate) fn transition_committed<P: EventPublisher>(
    publisher: &P,
    from: OrderStatus,
    order: &Order,
) {
    metrics::counter!("order_transitions_total", "to" => order.status.as_str()).increment(1);
    tracing::info!(order_id = %order.id, from = %from, to = %order.status, "order status changed");

    let summary = OrderSummary::from(order);
    match order.status {
        OrderStatus::Shipped => publisher.publish(OrderEvent::Shipped(summary.clone())),
        OrderStatus::Delivered => {
            tracing::info!(
                order_id = %order.id,
                total = %order.total_amount,
                "order delivered, eligible for sales reporting"
            );
        }
        _ => {}
    }
    publisher.publish(OrderEvent::StatusChanged {
        order: summary,
        from,
        to: order.status,
    });
}

/// Service for managing orders.
///
/// Generic over the store so the same code runs against the in-memory and
/// PostgreSQL backends.
pub struct OrderService<S, P> {
    store: S,
    publisher: P,
    policy: OrderPolicy,
}

impl<S: FulfillmentStore, P: EventPublisher> OrderService<S, P> {
    /// Creates a new order service with the default policy.
    pub fn new(store: S, publisher: P) -> Self {
        Self::with_policy(store, publisher, OrderPolicy::default())
    }

    pub fn with_policy(store: S, publisher: P, policy: OrderPolicy) -> Self {
        Self {
            store,
            publisher,
            policy,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> &OrderPolicy {
        &self.policy
    }

    /// Places an order: prices the cart, checks the declared total, then
    /// writes the order and reserves stock in one transaction.
    ///
    /// Any failure leaves stock and orders untouched.
    #[tracing::instrument(skip(self, cmd), fields(user_id = %cmd.user_id, lines = cmd.lines.len()))]
    pub async fn create_order(&self, cmd: CreateOrder) -> Result<Order, OrderError> {
        let started = Instant::now();
        let result = self.place_order(cmd).await;
        metrics::histogram!("order_create_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(order) => {
                metrics::counter!("orders_created_total").increment(1);
                tracing::info!(
                    order_id = %order.id,
                    total = %order.total_amount,
                    status = %order.status,
                    "order created"
                );
                self.publisher
                    .publish(OrderEvent::Created(OrderSummary::from(order)));
            }
            Err(e) => {
                metrics::counter!("orders_rejected_total", "reason" => e.reason()).increment(1);
                if e.kind() == ErrorKind::Internal {
                    tracing::error!(error = %e, "order creation failed");
                } else {
                    tracing::info!(error = %e, "order rejected");
                }
            }
        }
        result
    }

    async fn place_order(&self, cmd: CreateOrder) -> Result<Order, OrderError> {
        cmd.validate()?;

        let now = Utc::now();
        let mut items = Vec::with_capacity(cmd.lines.len());
        for line in &cmd.lines {
            let product = self
                .store
                .get_product(line.product_id)
                .await?
                .ok_or(OrderError::ProductNotFound(line.product_id))?;
            let variant = self
                .store
                .get_variant(line.variant_id)
                .await?
                .filter(|variant| variant.product_id == product.id)
                .ok_or(OrderError::VariantNotFound(line.variant_id))?;

            items.push(NewOrderItem {
                product_id: product.id,
                variant_id: variant.id,
                quantity: line.quantity,
                price_at_purchase: pricing::price(&product, &variant.size_label, now),
            });
        }

        let plan = plan_order(cmd, items, &self.policy)?;
        let reservations = plan.reservations();

        // Dropping `tx` on any early return rolls everything back.
        let mut tx = self.store.begin().await?;
        let mut order = tx.insert_order(plan.header).await?;
        for item in &plan.items {
            let item = tx.insert_item(order.id, item).await?;
            order.items.push(item);
        }
        for (variant_id, quantity) in reservations {
            let reservation = tx.reserve(variant_id, quantity).await?;
            tracing::debug!(
                variant_id = %variant_id,
                quantity,
                remaining = reservation.remaining,
                "stock reserved"
            );
        }
        tx.commit().await?;

        Ok(order)
    }

    /// Applies an administrative action to an order.
    #[tracing::instrument(skip(self))]
    pub async fn transition_order(
        &self,
        order_id: OrderId,
        action: OrderAction,
        actor: Actor,
    ) -> Result<Order, OrderError> {
        self.apply_transition(order_id, action.target(), actor, |_| Ok(()))
            .await
    }

    /// Marks a shipped order as delivered on behalf of its owner.
    ///
    /// Orders of other users are reported as not found.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_delivery(
        &self,
        order_id: OrderId,
        user_id: UserId,
    ) -> Result<Order, OrderError> {
        self.apply_transition(
            order_id,
            OrderStatus::Delivered,
            Actor::Customer(user_id),
            |order| {
                if order.user_id == user_id {
                    Ok(())
                } else {
                    Err(OrderError::OrderNotFound(order_id))
                }
            },
        )
        .await
    }

    /// Moves the order to `target` with a compare-and-set on its current
    /// status, re-reading and re-checking after a lost race.
    async fn apply_transition(
        &self,
        order_id: OrderId,
        target: OrderStatus,
        actor: Actor,
        authorize: impl Fn(&Order) -> Result<(), OrderError> + Send + Sync,
    ) -> Result<Order, OrderError> {
        for attempt in 1..=MAX_TRANSITION_ATTEMPTS {
            let order = self.get_order(order_id).await?;
            authorize(&order)?;

            if let Err(e) = ensure_transition(order_id, order.status, target) {
                metrics::counter!("orders_rejected_total", "reason" => e.reason()).increment(1);
                return Err(e);
            }

            let change = StatusChange {
                order_id,
                expected: order.status,
                next: target,
                audit: AuditEntry::now(
                    actor.clone(),
                    format!("Status changed from {} to {}", order.status, target),
                ),
            };

            match self.store.compare_and_set_status(change).await {
                Ok(updated) => {
                    transition_committed(&self.publisher, order.status, &updated);
                    return Ok(updated);
                }
                Err(StoreError::StatusConflict { actual, .. }) => {
                    tracing::debug!(
                        attempt,
                        actual = %actual,
                        "status changed concurrently, retrying"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::warn!(%order_id, "giving up after repeated status conflicts");
        Err(OrderError::ConcurrentModification(order_id))
    }

    /// Loads an order with its items.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order, OrderError> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))
    }

    /// Loads an order owned by `user_id`; anyone else's order is not found.
    #[tracing::instrument(skip(self))]
    pub async fn get_order_for_user(
        &self,
        order_id: OrderId,
        user_id: UserId,
    ) -> Result<Order, OrderError> {
        let order = self.get_order(order_id).await?;
        if order.user_id != user_id {
            return Err(OrderError::OrderNotFound(order_id));
        }
        Ok(order)
    }

    /// Lists every order, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_orders(
        &self,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, OrderError> {
        Ok(self.store.list_orders(status).await?)
    }

    /// Lists a user's orders, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, OrderError> {
        Ok(self.store.list_orders_for_user(user_id, None).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_orders_for_user_by_status(
        &self,
        user_id: UserId,
        status: OrderStatus,
    ) -> Result<Vec<Order>, OrderError> {
        Ok(self
            .store
            .list_orders_for_user(user_id, Some(status))
            .await?)
    }
}
