//! Order status state machine.
//!
//! ```text
//! Pending ──► Processing ──► Shipped ──► Delivered
//!    │            │             │
//!    └────────────┴─────────────┴──► Cancelled
//! ```

use common::{OrderId, OrderStatus};
use serde::{Deserialize, Serialize};

use crate::OrderError;

/// Administrative actions that move an order along the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderAction {
    Process,
    Ship,
    Deliver,
    Cancel,
}

impl OrderAction {
    /// The status this action moves the order to.
    pub fn target(&self) -> OrderStatus {
        match self {
            OrderAction::Process => OrderStatus::Processing,
            OrderAction::Ship => OrderStatus::Shipped,
            OrderAction::Deliver => OrderStatus::Delivered,
            OrderAction::Cancel => OrderStatus::Cancelled,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderAction::Process => "process",
            OrderAction::Ship => "ship",
            OrderAction::Deliver => "deliver",
            OrderAction::Cancel => "cancel",
        }
    }
}

impl std::fmt::Display for OrderAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Returns true if the graph has an edge from `from` to `to`.
pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;
    matches!(
        (from, to),
        (Pending, Processing)
            | (Processing, Shipped)
            | (Shipped, Delivered)
            | (Pending | Processing | Shipped, Cancelled)
    )
}

/// Checks a transition, distinguishing cancelled orders from other illegal moves.
pub fn ensure_transition(
    order_id: OrderId,
    from: OrderStatus,
    to: OrderStatus,
) -> Result<(), OrderError> {
    if from == OrderStatus::Cancelled {
        return Err(OrderError::AlreadyCancelled(order_id));
    }
    if !can_transition(from, to) {
        return Err(OrderError::IllegalTransition {
            order_id,
            current: from,
            target: to,
        });
    }
    Ok(())
}
