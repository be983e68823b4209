//! In-process event bus (§6.4): `subscribe(event_type, handler)`,
//! `publish(event)` awaits each handler. No persistence, no reorder.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::dispatch::NarrativeEvent;

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &NarrativeEvent);
}

#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<HashMap<String, Vec<Arc<dyn EventHandler>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, event_type: impl Into<String>, handler: Arc<dyn EventHandler>) {
        self.subscribers
            .lock()
            .expect("event bus lock poisoned")
            .entry(event_type.into())
            .or_default()
            .push(handler);
    }

    /// Fire-and-forget to every handler registered for this event's type,
    /// in subscription order. No handler failure blocks another.
    pub async fn publish(&self, event: &NarrativeEvent) {
        let handlers = {
            let subscribers = self.subscribers.lock().expect("event bus lock poisoned");
            subscribers.get(&event.event_type).cloned().unwrap_or_default()
        };
        for handler in handlers {
            handler.handle(event).await;
        }
    }
}
