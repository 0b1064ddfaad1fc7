//! Order creation, status transitions and queries.

pub mod builder;
mod service;
pub mod state;

pub use builder::{CartLine, CreateOrder, OrderPlan, OrderPolicy, plan_order};
pub use service::{MAX_TRANSITION_ATTEMPTS, OrderService};
pub(crate) use service::transition_committed;
pub use state::{OrderAction, can_transition, ensure_transition};
