//! In-process fan-out of order events to connected users.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use common::UserId;
use domain::{EventPublisher, OrderEvent};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use crate::routing::{SubscriberRole, route};
use crate::{NotificationError, Result};

/// Messages buffered per user before slow receivers start lagging.
pub const DEFAULT_CAPACITY: usize = 64;

/// A message pushed to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Dotted event name, e.g. `order.created`.
    pub event: &'static str,
    pub data: OrderEvent,
    pub published_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(event: OrderEvent) -> Self {
        Self {
            event: event.event_type(),
            data: event,
            published_at: Utc::now(),
        }
    }

    /// Wire form sent to clients.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

struct Connection {
    role: SubscriberRole,
    sender: broadcast::Sender<Arc<Notification>>,
}

struct Registry {
    connections: RwLock<HashMap<UserId, Connection>>,
    capacity: usize,
}

/// Registry of connected users that routes each published event to its
/// recipients.
///
/// Every user has one broadcast channel shared by all of their open
/// subscriptions. Channels without receivers are pruned on the next publish
/// that reaches them.
#[derive(Clone)]
pub struct NotificationHub {
    registry: Arc<Registry>,
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            registry: Arc::new(Registry {
                connections: RwLock::new(HashMap::new()),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Registers a connection for `user_id`. The latest role wins when a user
    /// subscribes more than once.
    pub fn subscribe(&self, user_id: UserId, role: SubscriberRole) -> Subscription {
        let mut connections = self
            .registry
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let connection = connections.entry(user_id).or_insert_with(|| Connection {
            role,
            sender: broadcast::channel(self.registry.capacity).0,
        });
        connection.role = role;

        tracing::debug!(%user_id, ?role, "subscriber connected");
        Subscription {
            user_id,
            receiver: connection.sender.subscribe(),
        }
    }

    /// Number of users with at least one open subscription.
    pub fn connected_users(&self) -> usize {
        self.registry
            .connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|connection| connection.sender.receiver_count() > 0)
            .count()
    }

    /// Sends `event` to every connected recipient and returns how many users
    /// it reached.
    pub fn dispatch(&self, event: OrderEvent) -> usize {
        let route = route(&event);
        let notification = Arc::new(Notification::new(event));
        let mut delivered = 0;
        let mut disconnected = Vec::new();

        {
            let connections = self
                .registry
                .connections
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            for (user_id, connection) in connections.iter() {
                if !route.includes(*user_id, connection.role) {
                    continue;
                }
                match connection.sender.send(Arc::clone(&notification)) {
                    Ok(_) => delivered += 1,
                    Err(_) => disconnected.push(*user_id),
                }
            }
        }

        if !disconnected.is_empty() {
            let mut connections = self
                .registry
                .connections
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            for user_id in disconnected {
                // Re-check: the user may have reconnected since the read pass.
                if connections
                    .get(&user_id)
                    .is_some_and(|connection| connection.sender.receiver_count() == 0)
                {
                    connections.remove(&user_id);
                }
            }
        }

        metrics::counter!("notifications_delivered_total", "event" => notification.event)
            .increment(delivered as u64);
        tracing::debug!(
            event = notification.event,
            order_id = %notification.data.summary().order_id,
            delivered,
            "notification dispatched"
        );
        delivered
    }
}

impl EventPublisher for NotificationHub {
    fn publish(&self, event: OrderEvent) {
        self.dispatch(event);
    }
}

/// One open connection's view of the hub.
pub struct Subscription {
    user_id: UserId,
    receiver: broadcast::Receiver<Arc<Notification>>,
}

impl Subscription {
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Waits for the next notification, skipping any the receiver lagged
    /// past.
    pub async fn recv(&mut self) -> Result<Arc<Notification>> {
        loop {
            match self.receiver.recv().await {
                Ok(notification) => return Ok(notification),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(user_id = %self.user_id, skipped, "subscriber lagged");
                }
                Err(RecvError::Closed) => return Err(NotificationError::Closed),
            }
        }
    }

    /// Returns the next queued notification without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<Notification>> {
        loop {
            match self.receiver.try_recv() {
                Ok(notification) => return Some(notification),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(user_id = %self.user_id, skipped, "subscriber lagged");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }
}
