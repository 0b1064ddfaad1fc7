//! Order fulfillment domain.
//!
//! This crate holds the business rules of the shop:
//! - variant pricing with size surcharges and time-boxed discounts
//! - atomic order placement with stock reservation
//! - the order status state machine
//! - reconciliation of bank-transfer payment notifications
//!
//! Persistence goes through the [`store`] traits; notifications go out
//! through an [`EventPublisher`].

pub mod error;
pub mod events;
pub mod order;
pub mod payment;
pub mod pricing;

pub use error::{ErrorKind, OrderError};
pub use events::{EventPublisher, InMemoryEventPublisher, NoopPublisher, OrderEvent, OrderSummary};
pub use order::{
    CartLine, CreateOrder, MAX_TRANSITION_ATTEMPTS, OrderAction, OrderPlan, OrderPolicy,
    OrderService, can_transition, ensure_transition, plan_order,
};
pub use payment::{
    CorrelationParser, DEFAULT_MARKER, MarkerError, PaymentReconciler, ReconciliationOutcome,
    ReconcilerConfig, RejectionReason,
};
pub use pricing::{PRICE_DECIMALS, PriceQuote, SIZE_SCALE, price, quote};
