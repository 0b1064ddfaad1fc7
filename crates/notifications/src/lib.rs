//! Push notifications for order events.
//!
//! [`NotificationHub`] implements [`domain::EventPublisher`], so the order
//! services publish into it directly. Connected clients hold a
//! [`Subscription`]; [`route`] decides who hears about what.

pub mod error;
pub mod hub;
pub mod routing;

pub use error::{NotificationError, Result};
pub use hub::{DEFAULT_CAPACITY, Notification, NotificationHub, Subscription};
pub use routing::{Route, SubscriberRole, route};
