//! In-process async publish/subscribe bus shared by every service.
//!
//! Lightweight by design: one process, one topic registry, no durability.
//! Leaves room to swap in a real broker later without touching call sites.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::warn;

/// Anything that can receive a published payload.
///
/// Payloads cross the bus as `serde_json::Value` rather than a generic `T`
/// so that handlers for different topics can live in the same registry
/// without a type parameter on `EventBus` itself; each handler deserializes
/// into the type it expects.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, payload: serde_json::Value);
}

type HandlerId = u64;

struct Registry {
    handlers: HashMap<String, Vec<(HandlerId, Arc<dyn Handler>)>>,
    next_id: HandlerId,
}

/// Topic-keyed publish/subscribe bus.
///
/// `publish` snapshots the handler list for a topic under the lock, then
/// releases it before awaiting each handler in registration order — a
/// handler that subscribes or unsubscribes mid-publish never deadlocks and
/// never observes a half-updated list. Handlers run sequentially and
/// un-isolated: a handler that panics unwinds the `publish` call itself and
/// the remaining subscribers for that publish are skipped, matching
/// `event_bus.py`'s own behavior of not trapping handler failures.
pub struct EventBus {
    registry: Mutex<Registry>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry {
                handlers: HashMap::new(),
                next_id: 0,
            }),
        }
    }

    /// Publish `payload` to every handler currently subscribed to `topic`.
    pub async fn publish(&self, topic: &str, payload: serde_json::Value) {
        let handlers = {
            let registry = self.registry.lock();
            registry
                .handlers
                .get(topic)
                .map(|hs| hs.iter().map(|(_, h)| h.clone()).collect::<Vec<_>>())
                .unwrap_or_default()
        };
        for handler in handlers {
            handler.call(payload.clone()).await;
        }
    }

    /// Publish a typed value, logging and swallowing serialization failure.
    pub async fn publish_value<T: serde::Serialize>(&self, topic: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(payload) => self.publish(topic, payload).await,
            Err(err) => warn!(topic, %err, "failed to serialize event for publish"),
        }
    }

    /// Subscribe `handler` to `topic`, returning an id usable with `unsubscribe`.
    pub fn subscribe(&self, topic: &str, handler: Arc<dyn Handler>) -> HandlerId {
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry
            .handlers
            .entry(topic.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    /// Remove a previously subscribed handler by id.
    pub fn unsubscribe(&self, topic: &str, id: HandlerId) {
        let mut registry = self.registry.lock();
        if let Some(handlers) = registry.handlers.get_mut(topic) {
            handlers.retain(|(hid, _)| *hid != id);
        }
    }

    /// Subscribe `handler` to `topic`, returning a guard that unsubscribes on drop.
    pub fn subscription(self: &Arc<Self>, topic: &str, handler: Arc<dyn Handler>) -> Subscription {
        let id = self.subscribe(topic, handler);
        Subscription {
            bus: self.clone(),
            topic: topic.to_string(),
            id,
        }
    }
}

/// Scoped subscription: unsubscribes automatically when dropped.
pub struct Subscription {
    bus: Arc<EventBus>,
    topic: String,
    id: HandlerId,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(&self.topic, self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Handler for CountingHandler {
        async fn call(&self, _payload: serde_json::Value) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn publish_delivers_to_all_subscribers() {
        let bus = Arc::new(EventBus::new());
        let count = Arc::new(AtomicUsize::new(0));
        let _a = bus.subscription(
            "tick",
            Arc::new(CountingHandler {
                count: count.clone(),
            }),
        );
        let _b = bus.subscription(
            "tick",
            Arc::new(CountingHandler {
                count: count.clone(),
            }),
        );

        bus.publish("tick", serde_json::json!({"x": 1})).await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = Arc::new(EventBus::new());
        let count = Arc::new(AtomicUsize::new(0));
        let sub = bus.subscription(
            "tick",
            Arc::new(CountingHandler {
                count: count.clone(),
            }),
        );
        drop(sub);

        bus.publish("tick", serde_json::json!({})).await;

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn publish_to_unknown_topic_is_a_noop() {
        let bus = EventBus::new();
        bus.publish("nobody.listens", serde_json::json!(null)).await;
    }
}
