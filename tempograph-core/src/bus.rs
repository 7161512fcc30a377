//! In-process event bus
//!
//! Subscribe-by-name, publish-by-name, arbitrary JSON payloads. Delivery is
//! synchronous: `publish` invokes every handler registered for the topic in
//! subscription order on the caller's thread, and each handler runs to
//! completion before the next is dispatched. Handlers may publish while
//! handling (dispatch nests depth-first) but must not subscribe or
//! unsubscribe from inside a dispatch.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, warn};

// ============================================
// Topics
// ============================================

/// Topic names the engine subscribes to and publishes on
pub mod topics {
    /// Host reports a playback-speed change: `{speed, action?, hostname?}`
    pub const SPEED_CHANGE: &str = "speed_change";
    /// Host reports a keyboard shortcut: `{key, action}`
    pub const KEYBOARD_SHORTCUT: &str = "keyboard_shortcut";
    /// Host reports the popup opening: `{}`
    pub const POPUP_OPEN: &str = "popup_open";
    /// Host reports a page visibility flip: `{hidden}`
    pub const VISIBILITY_CHANGE: &str = "visibility_change";
    /// Host reports the page unloading: `{}`
    pub const PAGE_UNLOAD: &str = "page_unload";
    /// Outbound analytics events, [`super::AnalyticsEvent`] envelope
    pub const ANALYTICS: &str = "analytics";
}

// ============================================
// Outbound envelope
// ============================================

/// Kind of an outbound analytics event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsEventKind {
    SpeedChange,
    KeyboardShortcut,
    PopupOpen,
    Cleared,
}

impl AnalyticsEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyticsEventKind::SpeedChange => "speed_change",
            AnalyticsEventKind::KeyboardShortcut => "keyboard_shortcut",
            AnalyticsEventKind::PopupOpen => "popup_open",
            AnalyticsEventKind::Cleared => "cleared",
        }
    }
}

/// Envelope published on the [`topics::ANALYTICS`] topic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    /// What happened
    #[serde(rename = "type")]
    pub kind: AnalyticsEventKind,
    /// Kind-specific payload
    pub data: Value,
    /// When it was emitted (ms since epoch)
    pub timestamp: i64,
}

// ============================================
// Bus
// ============================================

/// Handler invoked synchronously for every payload published on its topic
pub type Handler = Box<dyn Fn(&Value)>;

/// Identifies a subscription for later removal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

/// Shared handle to a bus instance
pub type SharedBus = Rc<EventBus>;

/// Synchronous in-process publish/subscribe bus
#[derive(Default)]
pub struct EventBus {
    next_id: Cell<u64>,
    handlers: RefCell<HashMap<String, Vec<(SubscriptionId, Handler)>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `topic`; the returned id removes it again
    pub fn subscribe(&self, topic: &str, handler: impl Fn(&Value) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(self.next_id.get() + 1);
        self.handlers
            .borrow_mut()
            .entry(topic.to_string())
            .or_default()
            .push((id, Box::new(handler)));
        id
    }

    /// Remove a subscription; unknown ids are ignored
    pub fn unsubscribe(&self, topic: &str, id: SubscriptionId) {
        if let Some(list) = self.handlers.borrow_mut().get_mut(topic) {
            list.retain(|(sid, _)| *sid != id);
        }
    }

    /// Dispatch `payload` to every handler subscribed to `topic`, in
    /// subscription order. Returns the number of handlers invoked.
    pub fn publish(&self, topic: &str, payload: &Value) -> usize {
        let handlers = self.handlers.borrow();
        let Some(list) = handlers.get(topic) else {
            return 0;
        };
        for (_, handler) in list.iter() {
            handler(payload);
        }
        list.len()
    }

    /// Wrap `data` in an [`AnalyticsEvent`] envelope and publish it on the
    /// [`topics::ANALYTICS`] topic
    pub fn emit_analytics(&self, kind: AnalyticsEventKind, data: Value, timestamp: i64) {
        let event = AnalyticsEvent {
            kind,
            data,
            timestamp,
        };
        match serde_json::to_value(&event) {
            Ok(payload) => {
                let delivered = self.publish(topics::ANALYTICS, &payload);
                debug!(kind = event.kind.as_str(), delivered, "analytics event");
            }
            Err(error) => warn!(%error, "failed to encode analytics event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_publish_reaches_subscriber() {
        let bus = EventBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let seen_clone = Rc::clone(&seen);
        bus.subscribe(topics::SPEED_CHANGE, move |payload| {
            seen_clone.borrow_mut().push(payload.clone());
        });

        let delivered = bus.publish(topics::SPEED_CHANGE, &json!({"speed": 1.5}));
        assert_eq!(delivered, 1);
        assert_eq!(seen.borrow().as_slice(), &[json!({"speed": 1.5})]);
    }

    #[test]
    fn test_publish_without_subscribers_delivers_nothing() {
        let bus = EventBus::new();
        assert_eq!(bus.publish("nobody-home", &json!({})), 0);
    }

    #[test]
    fn test_handlers_run_in_subscription_order() {
        let bus = EventBus::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order_clone = Rc::clone(&order);
            bus.subscribe("t", move |_| order_clone.borrow_mut().push(tag));
        }

        bus.publish("t", &json!({}));
        assert_eq!(order.borrow().as_slice(), &["first", "second", "third"]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let count = Rc::new(Cell::new(0));

        let count_clone = Rc::clone(&count);
        let id = bus.subscribe("t", move |_| count_clone.set(count_clone.get() + 1));

        bus.publish("t", &json!({}));
        bus.unsubscribe("t", id);
        bus.publish("t", &json!({}));

        assert_eq!(count.get(), 1);
        // Unknown ids are ignored
        bus.unsubscribe("t", id);
        bus.unsubscribe("never-subscribed", id);
    }

    #[test]
    fn test_analytics_envelope_serializes_kind_as_type() {
        let event = AnalyticsEvent {
            kind: AnalyticsEventKind::SpeedChange,
            data: json!({"speed": 2.0, "action": "manual", "hostname": "youtube.com"}),
            timestamp: 1_000,
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "speed_change");
        assert_eq!(value["data"]["hostname"], "youtube.com");
        assert_eq!(value["timestamp"], 1_000);

        let back: AnalyticsEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back.kind, AnalyticsEventKind::SpeedChange);
    }
}
