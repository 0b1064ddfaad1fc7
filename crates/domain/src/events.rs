//! Domain events emitted after order changes are committed.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use common::{Money, Order, OrderId, OrderStatus, UserId};
use serde::{Deserialize, Serialize};

/// Order fields carried by every order event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub customer_name: String,
    pub total_amount: Money,
    pub created_at: DateTime<Utc>,
}

impl From<&Order> for OrderSummary {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            user_id: order.user_id,
            customer_name: order.customer_name.clone(),
            total_amount: order.total_amount,
            created_at: order.created_at,
        }
    }
}

/// Events published by the order services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    /// A new order was committed.
    Created(OrderSummary),

    /// The order was handed to the carrier.
    Shipped(OrderSummary),

    /// Any status transition, including the one to `Shipped`.
    StatusChanged {
        #[serde(flatten)]
        order: OrderSummary,
        from: OrderStatus,
        to: OrderStatus,
    },
}

impl OrderEvent {
    /// Dotted event name used by subscribers.
    pub fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Created(_) => "order.created",
            OrderEvent::Shipped(_) => "order.shipped",
            OrderEvent::StatusChanged { .. } => "order.status_changed",
        }
    }

    pub fn summary(&self) -> &OrderSummary {
        match self {
            OrderEvent::Created(summary) | OrderEvent::Shipped(summary) => summary,
            OrderEvent::StatusChanged { order, .. } => order,
        }
    }
}

/// Fire-and-forget sink for order events.
///
/// Publishing never fails from the caller's point of view; an implementation
/// that cannot deliver drops the event.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: OrderEvent);
}

impl<T: EventPublisher + ?Sized> EventPublisher for Arc<T> {
    fn publish(&self, event: OrderEvent) {
        (**self).publish(event)
    }
}

/// Publisher that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPublisher;

impl EventPublisher for NoopPublisher {
    fn publish(&self, _event: OrderEvent) {}
}

/// Publisher that records events in memory, for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventPublisher {
    events: Arc<Mutex<Vec<OrderEvent>>>,
}

impl InMemoryEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every event published so far, oldest first.
    pub fn events(&self) -> Vec<OrderEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Returns the dotted names of published events, oldest first.
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events().iter().map(OrderEvent::event_type).collect()
    }
}

impl EventPublisher for InMemoryEventPublisher {
    fn publish(&self, event: OrderEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}
