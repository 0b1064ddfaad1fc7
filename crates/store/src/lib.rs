//! Persistence for the storefront fulfillment core.
//!
//! [`FulfillmentStore`] covers catalog reads, order transactions with stock
//! reservation, guarded status updates and the payment notification log.
//! [`InMemoryStore`] and [`PostgresStore`] provide the same guarantees.

pub mod error;
pub mod ledger;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use ledger::{InventoryLedger, Reservation};
pub use memory::{InMemoryStore, InMemoryTransaction};
pub use postgres::{PostgresStore, PostgresTransaction};
pub use store::{
    CatalogStore, FulfillmentStore, NotificationOutcome, OrderTransaction,
    PaymentNotificationRecord, StatusChange,
};
