//! Domain event system: decoupled observation of the request pipeline.
//!
//! Events are published when a request is received, routed, answered or
//! fails. Other components can subscribe to react without tight coupling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// An input entered the pipeline
    InputReceived {
        agent_id: String,
        user_id: String,
        room_id: String,
        timestamp: DateTime<Utc>,
    },

    /// The router picked a route
    RouteSelected {
        route: String,
        confidence: f64,
        timestamp: DateTime<Utc>,
    },

    /// The router picked a route below the confidence threshold
    LowConfidenceRoute {
        route: String,
        confidence: f64,
        reasoning: String,
        timestamp: DateTime<Utc>,
    },

    /// A success response was delivered
    ResponseSent {
        room_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A request failed
    RequestFailed {
        room_id: String,
        kind: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::RouteSelected {
            route: "conversation".into(),
            confidence: 0.92,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::RouteSelected { route, confidence, .. } => {
                assert_eq!(route, "conversation");
                assert!(*confidence > 0.9);
            }
            _ => panic!("Expected RouteSelected event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::RequestFailed {
            room_id: "room".into(),
            kind: "routing".into(),
            error_message: "no subscribers".into(),
            timestamp: Utc::now(),
        });
    }
}
