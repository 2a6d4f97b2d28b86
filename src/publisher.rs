//! Order event publishing over NATS.
//!
//! Publishing is fire-and-forget: the order is already committed when an
//! event goes out, so failures are logged and swallowed.

use crate::domain::events::OrderEvent;

pub const SUBJECT_PREFIX: &str = "shop.orders";

#[derive(Clone, Default)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }

    /// A publisher that drops every event.
    pub fn disabled() -> Self { Self::default() }

    pub fn is_enabled(&self) -> bool { self.nats.is_some() }

    pub fn subject(event: &OrderEvent) -> String { format!("{SUBJECT_PREFIX}.{}", event.name()) }

    pub async fn publish(&self, event: OrderEvent) {
        let Some(client) = &self.nats else {
            tracing::trace!(event = event.name(), order_id = %event.order_id(), "event publishing disabled");
            return;
        };
        let payload = match serde_json::to_vec(&event) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, event = event.name(), "could not encode order event");
                return;
            }
        };
        if let Err(e) = client.publish(Self::subject(&event), payload.into()).await {
            tracing::warn!(error = %e, event = event.name(), order_id = %event.order_id(), "failed to publish order event");
        }
    }
}
