//! Notification error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotificationError {
    /// The hub dropped the subscriber's channel.
    #[error("Subscription closed")]
    Closed,

    #[error("Notification serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NotificationError>;
