//! Who receives which order event.

use common::UserId;
use domain::OrderEvent;
use serde::{Deserialize, Serialize};

/// Role a connection subscribed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriberRole {
    Customer,
    Admin,
}

/// Recipients of one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    /// The order's owner, when they should hear about it.
    pub owner: Option<UserId>,
    pub admins: bool,
}

impl Route {
    /// Returns true if a subscriber with this identity is a recipient.
    pub fn includes(&self, user_id: UserId, role: SubscriberRole) -> bool {
        (self.admins && role == SubscriberRole::Admin) || self.owner == Some(user_id)
    }
}

/// New orders go to admins, shipments to the owner, and every status
/// change to both.
pub fn route(event: &OrderEvent) -> Route {
    let owner = event.summary().user_id;
    match event {
        OrderEvent::Created(_) => Route {
            owner: None,
            admins: true,
        },
        OrderEvent::Shipped(_) => Route {
            owner: Some(owner),
            admins: false,
        },
        OrderEvent::StatusChanged { .. } => Route {
            owner: Some(owner),
            admins: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{Money, OrderId, OrderStatus};
    use domain::OrderSummary;

    fn summary() -> OrderSummary {
        OrderSummary {
            order_id: OrderId::new(1),
            user_id: UserId::new(10),
            customer_name: "Lan".to_string(),
            total_amount: Money::from_major(80_000),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn created_goes_to_admins_only() {
        let route = route(&OrderEvent::Created(summary()));
        assert!(route.includes(UserId::new(1), SubscriberRole::Admin));
        assert!(!route.includes(UserId::new(10), SubscriberRole::Customer));
    }

    #[test]
    fn shipped_goes_to_owner_only() {
        let route = route(&OrderEvent::Shipped(summary()));
        assert!(route.includes(UserId::new(10), SubscriberRole::Customer));
        assert!(!route.includes(UserId::new(11), SubscriberRole::Customer));
        assert!(!route.includes(UserId::new(1), SubscriberRole::Admin));
    }

    #[test]
    fn status_change_goes_to_owner_and_admins() {
        let route = route(&OrderEvent::StatusChanged {
            order: summary(),
            from: OrderStatus::Pending,
            to: OrderStatus::Processing,
        });
        assert!(route.includes(UserId::new(10), SubscriberRole::Customer));
        assert!(route.includes(UserId::new(1), SubscriberRole::Admin));
        assert!(!route.includes(UserId::new(11), SubscriberRole::Customer));
    }
}
