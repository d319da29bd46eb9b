//! Typed publish/subscribe bus for channel events.
//!
//! Replaces ad-hoc on/off callback pairs scattered across call sites:
//! named events, multiple handlers per event, explicit unsubscribe by
//! id. Handlers are synchronous; anything slow should spawn.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Deserialize;

use crate::traits::ChannelError;

/// Handle returned by [`EventBus::on`], used to unsubscribe.
pub type SubscriptionId = u64;

type Handler = Arc<dyn Fn(&ChannelEvent) + Send + Sync>;

/// A named event with its JSON payload.
#[derive(Debug, Clone)]
pub struct ChannelEvent {
    pub name: String,
    pub data: serde_json::Value,
}

#[derive(Deserialize)]
struct WireEvent {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl ChannelEvent {
    pub fn new(name: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Parse a raw channel frame (`{"event": "...", "data": {...}}`).
    pub fn from_frame(frame: &str) -> Result<Self, ChannelError> {
        let wire: WireEvent =
            serde_json::from_str(frame).map_err(|e| ChannelError::Parse(e.to_string()))?;
        Ok(Self {
            name: wire.event,
            data: wire.data,
        })
    }
}

struct BusInner {
    next_id: SubscriptionId,
    handlers: HashMap<String, Vec<(SubscriptionId, Handler)>>,
}

/// Publish/subscribe bus keyed by event name. Cheap to clone; clones
/// share the handler registry.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                next_id: 1,
                handlers: HashMap::new(),
            })),
        }
    }

    /// Register `handler` for `event`. Multiple handlers per event are
    /// allowed and run in registration order.
    pub fn on<F>(&self, event: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&ChannelEvent) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        inner
            .handlers
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove the handler registered under `id`. Returns whether a
    /// handler was removed.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock().unwrap();
        for handlers in inner.handlers.values_mut() {
            if let Some(pos) = handlers.iter().position(|(hid, _)| *hid == id) {
                handlers.remove(pos);
                return true;
            }
        }
        false
    }

    /// Deliver `event` to every handler registered for its name.
    ///
    /// Handlers are cloned out before invocation so they may call back
    /// into the bus without deadlocking.
    pub fn emit(&self, event: &ChannelEvent) {
        let handlers: Vec<Handler> = {
            let inner = self.inner.lock().unwrap();
            match inner.handlers.get(&event.name) {
                Some(list) => list.iter().map(|(_, h)| Arc::clone(h)).collect(),
                None => return,
            }
        };
        for handler in handlers {
            handler(event);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
