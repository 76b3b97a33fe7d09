//! Outbound notification port.
//!
//! The services publish a named event with the full order after a commit.
//! Which channels receive it (restaurant room, waiter, order, table) is
//! decided here, not by the services.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{KitchenOrder, Order};
use crate::services::order_state::kitchen_status;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OrderEventName {
    #[serde(rename = "order:created")]
    OrderCreated,
    #[serde(rename = "order:updated")]
    OrderUpdated,
    #[serde(rename = "item:updated")]
    ItemUpdated,
    #[serde(rename = "item:added")]
    ItemAdded,
    #[serde(rename = "paymethod:selected")]
    PaymentMethodSelected,
}

impl OrderEventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderEventName::OrderCreated => "order:created",
            OrderEventName::OrderUpdated => "order:updated",
            OrderEventName::ItemUpdated => "item:updated",
            OrderEventName::ItemAdded => "item:added",
            OrderEventName::PaymentMethodSelected => "paymethod:selected",
        }
    }
}

impl fmt::Display for OrderEventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Channel {
    Restaurant(Uuid),
    Waiter(Uuid),
    Order(Uuid),
    Table(Uuid),
}

impl Channel {
    /// Every audience interested in a change to `order`.
    pub fn for_order(order: &Order) -> Vec<Channel> {
        let mut channels = vec![Channel::Restaurant(order.restaurant_id), Channel::Order(order.id)];
        if let Some(waiter_id) = order.waiter_id {
            channels.push(Channel::Waiter(waiter_id));
        }
        if let Some(table_id) = order.table_id {
            channels.push(Channel::Table(table_id));
        }
        channels
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification transport failed: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub event: OrderEventName,
    pub payload: serde_json::Value,
    pub channels: Vec<Channel>,
}

#[async_trait]
pub trait NotificationPort: Send + Sync {
    async fn publish(
        &self,
        event: OrderEventName,
        payload: serde_json::Value,
        channels: Vec<Channel>,
    ) -> Result<(), NotifyError>;
}

/// Publishes `event` for `order` and logs, never returns, a failure.
pub async fn publish_order_event(port: &dyn NotificationPort, event: OrderEventName, order: &Order) {
    let item_statuses: Vec<_> = order.items.iter().map(|item| item.status).collect();
    let body = KitchenOrder {
        order: order.clone(),
        kitchen_status: kitchen_status(&item_statuses),
    };
    let payload = match serde_json::to_value(&body) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::warn!(event = %event, order_id = %order.id, error = %err, "notification encode failed");
            return;
        }
    };
    if let Err(err) = port.publish(event, payload, Channel::for_order(order)).await {
        tracing::warn!(event = %event, order_id = %order.id, error = %err, "notification dropped");
    }
}

/// In-process fan-out over a `tokio::sync::broadcast` channel. Transports
/// (websocket gateways, log sinks) subscribe and filter by channel.
#[derive(Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl NotificationPort for BroadcastNotifier {
    async fn publish(
        &self,
        event: OrderEventName,
        payload: serde_json::Value,
        channels: Vec<Channel>,
    ) -> Result<(), NotifyError> {
        let notification = Notification {
            event,
            payload,
            channels,
        };
        // No subscriber is not an error: nobody is watching right now.
        if self.sender.send(notification).is_err() {
            tracing::debug!(event = %event, "no notification subscribers");
        }
        Ok(())
    }
}
