//! Reconciliation of bank-transfer notifications against pending orders.

use chrono::Utc;
use common::{Actor, AuditEntry, Money, Order, OrderId, OrderStatus};
use store::{FulfillmentStore, NotificationOutcome, PaymentNotificationRecord, StatusChange, StoreError};

use crate::error::ErrorKind;
use crate::events::EventPublisher;
use crate::order::transition_committed;

use super::correlation::{CorrelationParser, DEFAULT_MARKER, MarkerError};

/// Reconciler settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Token preceding the order id in transfer descriptions.
    pub marker: String,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            marker: DEFAULT_MARKER.to_string(),
        }
    }
}

/// Why a notification did not confirm an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    MissingTransactionId,
    InvalidAmount(Money),
    MissingCorrelationId,
    OrderNotFound(OrderId),
    Underpaid {
        order_id: OrderId,
        owed: Money,
        paid: Money,
    },
    /// The store failed; the notification may be retried later.
    StoreUnavailable,
}

impl RejectionReason {
    /// Error class the rejection corresponds to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RejectionReason::MissingTransactionId
            | RejectionReason::InvalidAmount(_)
            | RejectionReason::MissingCorrelationId => ErrorKind::Validation,
            RejectionReason::OrderNotFound(_) => ErrorKind::NotFound,
            RejectionReason::Underpaid { .. } => ErrorKind::Conflict,
            RejectionReason::StoreUnavailable => ErrorKind::Internal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::MissingTransactionId => "missing_transaction_id",
            RejectionReason::InvalidAmount(_) => "invalid_amount",
            RejectionReason::MissingCorrelationId => "missing_correlation_id",
            RejectionReason::OrderNotFound(_) => "order_not_found",
            RejectionReason::Underpaid { .. } => "underpaid",
            RejectionReason::StoreUnavailable => "store_unavailable",
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionReason::MissingTransactionId => write!(f, "Missing transaction id"),
            RejectionReason::InvalidAmount(amount) => {
                write!(f, "Invalid amount {amount} (must be greater than 0)")
            }
            RejectionReason::MissingCorrelationId => {
                write!(f, "No order id found in the transfer description")
            }
            RejectionReason::OrderNotFound(id) => write!(f, "Order {id} not found"),
            RejectionReason::Underpaid {
                order_id,
                owed,
                paid,
            } => write!(f, "Payment of {paid} does not cover order {order_id} ({owed})"),
            RejectionReason::StoreUnavailable => {
                write!(f, "Payment could not be processed, please retry later")
            }
        }
    }
}

/// Result of handling one payment notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconciliationOutcome {
    /// The order moved from `Pending` to `Processing`.
    Confirmed(Order),

    /// The order had already left `Pending`; nothing changed.
    AlreadyProcessed {
        order_id: OrderId,
        status: OrderStatus,
    },

    Rejected {
        order_id: Option<OrderId>,
        reason: RejectionReason,
    },
}

impl ReconciliationOutcome {
    fn rejected(order_id: Option<OrderId>, reason: RejectionReason) -> Self {
        ReconciliationOutcome::Rejected { order_id, reason }
    }

    /// True unless the notification was rejected.
    pub fn is_success(&self) -> bool {
        !matches!(self, ReconciliationOutcome::Rejected { .. })
    }

    pub fn order_id(&self) -> Option<OrderId> {
        match self {
            ReconciliationOutcome::Confirmed(order) => Some(order.id),
            ReconciliationOutcome::AlreadyProcessed { order_id, .. } => Some(*order_id),
            ReconciliationOutcome::Rejected { order_id, .. } => *order_id,
        }
    }

    pub fn outcome(&self) -> NotificationOutcome {
        match self {
            ReconciliationOutcome::Confirmed(_) => NotificationOutcome::Confirmed,
            ReconciliationOutcome::AlreadyProcessed { .. } => NotificationOutcome::AlreadyProcessed,
            ReconciliationOutcome::Rejected { .. } => NotificationOutcome::Rejected,
        }
    }

    /// Human-readable summary returned to the payment gateway.
    pub fn message(&self) -> String {
        match self {
            ReconciliationOutcome::Confirmed(order) => {
                format!("Order {} confirmed", order.id)
            }
            ReconciliationOutcome::AlreadyProcessed { order_id, status } => {
                format!("Order {order_id} already processed ({status})")
            }
            ReconciliationOutcome::Rejected { reason, .. } => reason.to_string(),
        }
    }
}

/// Matches payment notifications to pending orders and confirms them.
///
/// Never returns an error: every notification, including ones that fail on
/// the store, ends in a [`ReconciliationOutcome`] and is written to the
/// notification log.
pub struct PaymentReconciler<S, P> {
    store: S,
    publisher: P,
    parser: CorrelationParser,
}

impl<S: FulfillmentStore, P: EventPublisher> PaymentReconciler<S, P> {
    pub fn new(store: S, publisher: P, config: ReconcilerConfig) -> Result<Self, MarkerError> {
        Ok(Self {
            store,
            publisher,
            parser: CorrelationParser::new(&config.marker)?,
        })
    }

    /// Handles one notification from the payment gateway.
    #[tracing::instrument(skip(self, description, amount), fields(outcome = tracing::field::Empty))]
    pub async fn handle_notification(
        &self,
        description: &str,
        amount: Money,
        transaction_id: &str,
    ) -> ReconciliationOutcome {
        let transaction_id = transaction_id.trim();
        let outcome = self.reconcile(description, amount, transaction_id).await;

        let label = match &outcome {
            ReconciliationOutcome::Rejected { reason, .. } => reason.as_str(),
            other => other.outcome().as_str(),
        };
        tracing::Span::current().record("outcome", label);
        metrics::counter!("payment_notifications_total", "outcome" => label).increment(1);

        match &outcome {
            ReconciliationOutcome::Rejected { order_id, reason } => {
                tracing::warn!(
                    transaction_id,
                    description,
                    amount = %amount,
                    order_id = ?order_id,
                    reason = %reason,
                    "payment notification rejected, needs manual reconciliation"
                );
            }
            ReconciliationOutcome::AlreadyProcessed { order_id, status } => {
                tracing::info!(%order_id, %status, "payment notification for processed order ignored");
            }
            ReconciliationOutcome::Confirmed(order) => {
                tracing::info!(order_id = %order.id, amount = %amount, "payment confirmed");
            }
        }

        let record = PaymentNotificationRecord {
            received_at: Utc::now(),
            transaction_id: transaction_id.to_string(),
            description: description.to_string(),
            amount,
            order_id: outcome.order_id(),
            outcome: outcome.outcome(),
            message: outcome.message(),
        };
        if let Err(e) = self.store.record_payment_notification(record).await {
            tracing::error!(error = %e, transaction_id, "failed to log payment notification");
        }

        outcome
    }

    async fn reconcile(
        &self,
        description: &str,
        amount: Money,
        transaction_id: &str,
    ) -> ReconciliationOutcome {
        if transaction_id.is_empty() {
            return ReconciliationOutcome::rejected(None, RejectionReason::MissingTransactionId);
        }
        if !amount.is_positive() {
            return ReconciliationOutcome::rejected(None, RejectionReason::InvalidAmount(amount));
        }
        let Some(order_id) = self.parser.parse(description) else {
            return ReconciliationOutcome::rejected(None, RejectionReason::MissingCorrelationId);
        };

        let order = match self.store.get_order(order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                return ReconciliationOutcome::rejected(
                    Some(order_id),
                    RejectionReason::OrderNotFound(order_id),
                );
            }
            Err(e) => return self.store_failure(order_id, e),
        };

        if order.status != OrderStatus::Pending {
            return ReconciliationOutcome::AlreadyProcessed {
                order_id,
                status: order.status,
            };
        }
        if amount < order.total_amount {
            return ReconciliationOutcome::rejected(
                Some(order_id),
                RejectionReason::Underpaid {
                    order_id,
                    owed: order.total_amount,
                    paid: amount,
                },
            );
        }

        let mut message = format!("Payment confirmed, transaction {transaction_id}, amount {amount}");
        if amount > order.total_amount {
            message.push_str(&format!(", overpaid by {}", amount - order.total_amount));
        }

        let change = StatusChange {
            order_id,
            expected: OrderStatus::Pending,
            next: OrderStatus::Processing,
            audit: AuditEntry::now(Actor::PaymentGateway, message),
        };

        match self.store.compare_and_set_status(change).await {
            Ok(updated) => {
                transition_committed(&self.publisher, OrderStatus::Pending, &updated);
                ReconciliationOutcome::Confirmed(updated)
            }
            // Another delivery of the same payment, or an admin, got there first.
            Err(StoreError::StatusConflict { actual, .. }) => {
                ReconciliationOutcome::AlreadyProcessed {
                    order_id,
                    status: actual,
                }
            }
            Err(StoreError::OrderNotFound(_)) => ReconciliationOutcome::rejected(
                Some(order_id),
                RejectionReason::OrderNotFound(order_id),
            ),
            Err(e) => self.store_failure(order_id, e),
        }
    }

    fn store_failure(&self, order_id: OrderId, error: StoreError) -> ReconciliationOutcome {
        tracing::error!(%order_id, error = %error, "store failure during payment reconciliation");
        ReconciliationOutcome::rejected(Some(order_id), RejectionReason::StoreUnavailable)
    }
}
