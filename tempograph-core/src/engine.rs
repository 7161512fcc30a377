//! Analytics engine facade
//!
//! Owns the session tracker and the aggregate manager, wires them to the
//! event bus, and exposes the operations presentation layers consume. One
//! engine is constructed at host startup and passed around by reference; a
//! total analytics failure never blocks the host, so the event-facing
//! methods log instead of returning errors.

use crate::aggregate::AggregateManager;
use crate::bus::{topics, AnalyticsEventKind, SharedBus, SubscriptionId};
use crate::clock::SharedClock;
use crate::config::TrackingConfig;
use crate::insights::{self, ExportBundle, QuickStats, UsageInsights};
use crate::storage::SharedStore;
use crate::tracker::SessionTracker;
use crate::types::{Aggregate, Session, SESSION_KEY};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info, warn};

// ============================================
// Engine
// ============================================

/// Facade over session tracking, aggregation, and insight derivation.
///
/// Construction starts the first session immediately. Call
/// [`AnalyticsEngine::attach`] to drive the engine from bus events; the host
/// is responsible for invoking [`AnalyticsEngine::tick`] every
/// [`AnalyticsEngine::tick_interval`].
pub struct AnalyticsEngine {
    tracker: SessionTracker,
    manager: AggregateManager,
    clock: SharedClock,
    snapshots: SharedStore,
    bus: SharedBus,
    tick_interval: Duration,
    subscriptions: Vec<(&'static str, SubscriptionId)>,
}

impl AnalyticsEngine {
    pub fn new(
        durable: SharedStore,
        snapshots: SharedStore,
        bus: SharedBus,
        clock: SharedClock,
        tracking: &TrackingConfig,
    ) -> Self {
        let manager = AggregateManager::new(
            Rc::clone(&durable),
            Rc::clone(&clock),
            tracking.max_history_days,
        );
        let mut tracker = SessionTracker::new(
            Rc::clone(&clock),
            Rc::clone(&snapshots),
            Rc::clone(&bus),
        );
        tracker.start_session();

        Self {
            tracker,
            manager,
            clock,
            snapshots,
            bus,
            tick_interval: Duration::from_secs(tracking.tick_interval_secs),
            subscriptions: Vec::new(),
        }
    }

    /// How often the host should call [`AnalyticsEngine::tick`]
    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn current_session(&self) -> Option<&Session> {
        self.tracker.current_session()
    }

    pub fn set_hostname(&mut self, hostname: impl Into<String>) {
        self.tracker.set_hostname(hostname);
    }

    pub fn start_session(&mut self) {
        self.tracker.start_session();
    }

    pub fn record_speed_change(&mut self, speed: f64, action: Option<&str>) {
        self.tracker.record_speed_change(speed, action);
    }

    pub fn record_shortcut(&mut self, key: &str, action: &str) {
        self.tracker.record_shortcut(key, action);
    }

    pub fn record_popup_open(&mut self) {
        self.tracker.record_popup_open();
    }

    pub fn on_visibility_change(&mut self, hidden: bool) {
        self.tracker.on_visibility_change(hidden);
    }

    pub fn tick(&mut self) {
        self.tracker.tick();
    }

    /// Finish the current session and fold it into the durable aggregate.
    /// A duplicate end signal is logged and ignored.
    pub fn end_session(&mut self) {
        match self.tracker.end_session() {
            Ok(session) => {
                self.manager.merge_session(&session);
            }
            Err(error) => debug!(%error, "session end skipped"),
        }
    }

    pub fn load_aggregate(&self) -> Aggregate {
        self.manager.load_aggregate()
    }

    pub fn get_usage_insights(&self) -> UsageInsights {
        insights::usage_insights(&self.manager.load_aggregate(), self.clock.now_ms())
    }

    pub fn get_quick_stats(&self) -> QuickStats {
        insights::quick_stats(&self.manager.load_aggregate(), self.clock.now_ms())
    }

    pub fn export_analytics(&self) -> ExportBundle {
        insights::export(&self.manager.load_aggregate(), self.clock.now_ms())
    }

    /// Privacy reset: delete the durable aggregate and the session snapshot,
    /// then start over with a fresh session. Returns whether the deletion
    /// succeeded; on failure the existing data stays untouched where the
    /// failure left it.
    pub fn clear_analytics(&mut self) -> bool {
        let cleared = self
            .manager
            .clear()
            .and_then(|()| self.snapshots.remove(SESSION_KEY));
        match cleared {
            Ok(()) => {
                self.tracker.start_session();
                self.bus
                    .emit_analytics(AnalyticsEventKind::Cleared, json!({}), self.clock.now_ms());
                info!("analytics cleared");
                true
            }
            Err(error) => {
                warn!(%error, "failed to clear analytics");
                false
            }
        }
    }

    // ============================================
    // Bus wiring
    // ============================================

    /// Subscribe the engine to the inbound topics.
    ///
    /// Handlers hold the engine mutably borrowed for the duration of a
    /// dispatch, so subscribers of the outbound analytics topic must not
    /// call back into the engine from their handlers. Handlers capture the
    /// engine weakly; dropping the engine disarms them.
    pub fn attach(engine: &Rc<RefCell<AnalyticsEngine>>) {
        let bus = Rc::clone(&engine.borrow().bus);

        let handle = Rc::downgrade(engine);
        let speed_change = bus.subscribe(topics::SPEED_CHANGE, move |payload| {
            let Some(engine) = handle.upgrade() else {
                return;
            };
            let Some(speed) = payload.get("speed").and_then(Value::as_f64) else {
                debug!(%payload, "dropping speed change event without numeric speed");
                return;
            };
            let action = payload
                .get("action")
                .and_then(Value::as_str)
                .map(str::to_string);
            let hostname = payload
                .get("hostname")
                .and_then(Value::as_str)
                .map(str::to_string);

            let mut engine = engine.borrow_mut();
            if let Some(hostname) = hostname {
                engine.set_hostname(hostname);
            }
            engine.record_speed_change(speed, action.as_deref());
        });

        let handle = Rc::downgrade(engine);
        let keyboard_shortcut = bus.subscribe(topics::KEYBOARD_SHORTCUT, move |payload| {
            let Some(engine) = handle.upgrade() else {
                return;
            };
            let key = payload.get("key").and_then(Value::as_str);
            let action = payload.get("action").and_then(Value::as_str);
            let (Some(key), Some(action)) = (key, action) else {
                debug!(%payload, "dropping shortcut event without key and action");
                return;
            };
            engine.borrow_mut().record_shortcut(key, action);
        });

        let handle = Rc::downgrade(engine);
        let popup_open = bus.subscribe(topics::POPUP_OPEN, move |_payload| {
            let Some(engine) = handle.upgrade() else {
                return;
            };
            engine.borrow_mut().record_popup_open();
        });

        let handle = Rc::downgrade(engine);
        let visibility_change = bus.subscribe(topics::VISIBILITY_CHANGE, move |payload| {
            let Some(engine) = handle.upgrade() else {
                return;
            };
            let Some(hidden) = payload.get("hidden").and_then(Value::as_bool) else {
                debug!(%payload, "dropping visibility event without hidden flag");
                return;
            };
            engine.borrow_mut().on_visibility_change(hidden);
        });

        let handle = Rc::downgrade(engine);
        let page_unload = bus.subscribe(topics::PAGE_UNLOAD, move |_payload| {
            let Some(engine) = handle.upgrade() else {
                return;
            };
            engine.borrow_mut().end_session();
        });

        engine.borrow_mut().subscriptions = vec![
            (topics::SPEED_CHANGE, speed_change),
            (topics::KEYBOARD_SHORTCUT, keyboard_shortcut),
            (topics::POPUP_OPEN, popup_open),
            (topics::VISIBILITY_CHANGE, visibility_change),
            (topics::PAGE_UNLOAD, page_unload),
        ];
        debug!("engine attached to event bus");
    }

    /// Remove every bus subscription installed by [`AnalyticsEngine::attach`]
    pub fn detach(&mut self) {
        for (topic, id) in self.subscriptions.drain(..) {
            self.bus.unsubscribe(topic, id);
        }
        debug!("engine detached from event bus");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::clock::ManualClock;
    use crate::storage::{KvStore, MemoryStore};
    use crate::types::AGGREGATE_KEY;

    const NOON: i64 = 1_718_454_600_000; // 2024-06-15T12:30:00Z

    struct Fixture {
        engine: Rc<RefCell<AnalyticsEngine>>,
        clock: Rc<ManualClock>,
        durable: Rc<MemoryStore>,
        snapshots: Rc<MemoryStore>,
        bus: SharedBus,
    }

    fn fixture() -> Fixture {
        let clock = Rc::new(ManualClock::new(NOON));
        let durable = Rc::new(MemoryStore::new());
        let snapshots = Rc::new(MemoryStore::new());
        let bus: SharedBus = Rc::new(EventBus::new());

        let engine = Rc::new(RefCell::new(AnalyticsEngine::new(
            durable.clone(),
            snapshots.clone(),
            Rc::clone(&bus),
            clock.clone(),
            &TrackingConfig::default(),
        )));
        AnalyticsEngine::attach(&engine);

        Fixture {
            engine,
            clock,
            durable,
            snapshots,
            bus,
        }
    }

    #[test]
    fn test_construction_starts_a_session() {
        let fx = fixture();
        let engine = fx.engine.borrow();
        let session = engine.current_session().expect("session started");
        assert_eq!(session.speed_changes, 0);
        assert!(!session.merged);
        assert!(fx.snapshots.get(SESSION_KEY).unwrap().is_some());
    }

    #[test]
    fn test_bus_events_drive_tracking() {
        let fx = fixture();

        fx.bus.publish(
            topics::SPEED_CHANGE,
            &json!({"speed": 1.5, "action": "increase", "hostname": "www.youtube.com"}),
        );
        fx.bus.publish(
            topics::KEYBOARD_SHORTCUT,
            &json!({"key": "s", "action": "decrease"}),
        );
        fx.bus.publish(topics::POPUP_OPEN, &json!({}));

        let engine = fx.engine.borrow();
        let session = engine.current_session().unwrap();
        assert_eq!(session.speed_changes, 1);
        assert_eq!(session.keyboard_shortcuts, 1);
        assert_eq!(session.popup_opens, 1);
        assert_eq!(session.most_used_speeds["1.5"], 1);
        assert_eq!(session.sites_used, vec!["www.youtube.com".to_string()]);
    }

    #[test]
    fn test_page_unload_merges_once() {
        let fx = fixture();
        fx.bus
            .publish(topics::SPEED_CHANGE, &json!({"speed": 2.0}));

        fx.bus.publish(topics::PAGE_UNLOAD, &json!({}));
        fx.bus.publish(topics::PAGE_UNLOAD, &json!({}));

        let stored = fx.durable.get(AGGREGATE_KEY).unwrap().expect("merged");
        assert_eq!(stored["total_sessions"], 1);
        assert_eq!(stored["total_speed_changes"], 1);
    }

    #[test]
    fn test_malformed_payloads_are_dropped() {
        let fx = fixture();

        fx.bus
            .publish(topics::SPEED_CHANGE, &json!({"speed": "fast"}));
        fx.bus
            .publish(topics::KEYBOARD_SHORTCUT, &json!({"key": "s"}));
        fx.bus
            .publish(topics::VISIBILITY_CHANGE, &json!({"hidden": "yes"}));

        let engine = fx.engine.borrow();
        let session = engine.current_session().unwrap();
        assert_eq!(session.speed_changes, 0);
        assert_eq!(session.keyboard_shortcuts, 0);
    }

    #[test]
    fn test_visibility_events_gate_active_time() {
        let fx = fixture();

        fx.clock.advance(5_000);
        fx.bus
            .publish(topics::VISIBILITY_CHANGE, &json!({"hidden": true}));
        fx.clock.advance(60_000);
        fx.bus
            .publish(topics::VISIBILITY_CHANGE, &json!({"hidden": false}));
        fx.clock.advance(2_000);
        fx.bus.publish(topics::PAGE_UNLOAD, &json!({}));

        let stored = fx.durable.get(AGGREGATE_KEY).unwrap().unwrap();
        assert_eq!(stored["total_time_active_ms"], 7_000);
    }

    #[test]
    fn test_clear_analytics_resets_everything() {
        let fx = fixture();
        let events = Rc::new(RefCell::new(Vec::new()));
        let events_clone = Rc::clone(&events);
        fx.bus.subscribe(topics::ANALYTICS, move |payload| {
            events_clone.borrow_mut().push(payload.clone());
        });

        fx.bus
            .publish(topics::SPEED_CHANGE, &json!({"speed": 1.5}));
        fx.bus.publish(topics::PAGE_UNLOAD, &json!({}));
        let old_id = fx.engine.borrow().current_session().unwrap().id.clone();

        assert!(fx.engine.borrow_mut().clear_analytics());

        assert!(fx.durable.get(AGGREGATE_KEY).unwrap().is_none());
        let engine = fx.engine.borrow();
        let session = engine.current_session().unwrap();
        assert_ne!(session.id, old_id);
        assert!(!session.merged);
        assert_eq!(session.speed_changes, 0);

        let events = events.borrow();
        let cleared = events.iter().find(|e| e["type"] == "cleared");
        assert!(cleared.is_some(), "cleared event emitted");

        // Insights over the wiped store fall back to defaults
        let insights = engine.get_usage_insights();
        assert_eq!(insights.overview.total_sessions, 0);
        assert_eq!(insights.speed_preferences.most_used_speed, 1.0);
    }

    #[test]
    fn test_detach_stops_event_handling() {
        let fx = fixture();
        fx.engine.borrow_mut().detach();

        fx.bus
            .publish(topics::SPEED_CHANGE, &json!({"speed": 1.5}));
        assert_eq!(
            fx.engine.borrow().current_session().unwrap().speed_changes,
            0
        );
    }

    #[test]
    fn test_insights_read_through_engine() {
        let fx = fixture();
        for _ in 0..5 {
            fx.bus
                .publish(topics::SPEED_CHANGE, &json!({"speed": 2.0}));
        }
        fx.bus.publish(topics::PAGE_UNLOAD, &json!({}));

        let engine = fx.engine.borrow();
        let insights = engine.get_usage_insights();
        assert_eq!(insights.overview.total_sessions, 1);
        assert_eq!(insights.overview.total_speed_changes, 5);
        assert_eq!(insights.speed_preferences.most_used_speed, 2.0);

        let quick = engine.get_quick_stats();
        assert_eq!(quick.total_sessions, 1);
        assert_eq!(quick.avg_speed, 2.0);

        let bundle = engine.export_analytics();
        assert_eq!(bundle.raw_data.total_speed_changes, 5);
        assert_eq!(bundle.version, env!("CARGO_PKG_VERSION"));
    }
}
