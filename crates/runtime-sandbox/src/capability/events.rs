//! Events capability facade (spec §4.1, §9, permission `events`).
//!
//! Bounded in-process pub/sub. `emit` is non-blocking; `on` binds a
//! handler queue in the *subscriber's own* sandbox so a busy
//! subscriber never causes reentrancy into a sandbox that is mid-call
//! (spec §9's event-bus-cycle note) — delivery just queues and waits
//! for the per-plugin bound, dropping and counting beyond it.

use std::collections::HashMap;
use std::sync::Mutex;

use runtime_core::PluginError;
use tokio::sync::mpsc;

const QUEUE_BOUND: usize = 256;

#[derive(Debug, Clone)]
pub struct EventMessage {
    pub topic: String,
    pub payload: serde_json::Value,
}

struct Subscription {
    topic: String,
    sender: mpsc::Sender<EventMessage>,
}

/// Shared across every plugin's `EventsCapability` in a Manager.
/// Payloads are cloned (deep-copied, since `serde_json::Value` owns
/// its data) at both emit and receive, so no reference ever crosses
/// a sandbox boundary.
pub struct EventBus {
    subscriptions: Mutex<HashMap<String, Vec<Subscription>>>,
    dropped: Mutex<HashMap<String, u64>>,
}

impl Default for EventBus {
    fn default() -> Self {
        EventBus {
            subscriptions: Mutex::new(HashMap::new()),
            dropped: Mutex::new(HashMap::new()),
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribe(&self, plugin_id: &str, topic: &str) -> mpsc::Receiver<EventMessage> {
        let (tx, rx) = mpsc::channel(QUEUE_BOUND);
        self.subscriptions
            .lock()
            .unwrap()
            .entry(plugin_id.to_string())
            .or_default()
            .push(Subscription {
                topic: topic.to_string(),
                sender: tx,
            });
        rx
    }

    fn emit(&self, topic: &str, payload: serde_json::Value) {
        let subs = self.subscriptions.lock().unwrap();
        for (plugin_id, subscriptions) in subs.iter() {
            for sub in subscriptions.iter().filter(|s| s.topic == topic) {
                let message = EventMessage {
                    topic: topic.to_string(),
                    payload: payload.clone(),
                };
                if sub.sender.try_send(message).is_err() {
                    *self.dropped.lock().unwrap().entry(plugin_id.clone()).or_insert(0) += 1;
                }
            }
        }
    }

    pub fn dropped_count(&self, plugin_id: &str) -> u64 {
        *self.dropped.lock().unwrap().get(plugin_id).unwrap_or(&0)
    }
}

pub struct EventsCapability {
    plugin_id: String,
    bus: std::sync::Arc<EventBus>,
}

impl EventsCapability {
    pub fn new(plugin_id: impl Into<String>, bus: std::sync::Arc<EventBus>) -> Self {
        EventsCapability {
            plugin_id: plugin_id.into(),
            bus,
        }
    }

    pub fn emit(&self, topic: &str, payload: serde_json::Value) -> Result<(), PluginError> {
        self.bus.emit(topic, payload);
        Ok(())
    }

    pub fn on(&self, topic: &str) -> mpsc::Receiver<EventMessage> {
        self.bus.subscribe(&self.plugin_id, topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn emit_reaches_subscribed_topic_only() {
        let bus = Arc::new(EventBus::new());
        let subscriber = EventsCapability::new("sub", bus.clone());
        let mut rx = subscriber.on("topic.a");

        let emitter = EventsCapability::new("emitter", bus);
        emitter.emit("topic.a", serde_json::json!({"x": 1})).unwrap();
        emitter.emit("topic.b", serde_json::json!({"x": 2})).unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.topic, "topic.a");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_queue_counts_a_drop_instead_of_blocking() {
        let bus = Arc::new(EventBus::new());
        let subscriber = EventsCapability::new("sub", bus.clone());
        let _rx = subscriber.on("flood");

        let emitter = EventsCapability::new("emitter", bus.clone());
        for _ in 0..(QUEUE_BOUND + 5) {
            emitter.emit("flood", serde_json::json!(1)).unwrap();
        }
        assert!(bus.dropped_count("sub") > 0);
    }
}
