//! Bank-transfer payment reconciliation.

mod correlation;
mod reconciler;

pub use correlation::{CorrelationParser, DEFAULT_MARKER, MarkerError};
pub use reconciler::{
    PaymentReconciler, ReconciliationOutcome, ReconcilerConfig, RejectionReason,
};
