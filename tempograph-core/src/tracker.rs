//! Session tracking
//!
//! One [`Session`] per page lifetime. Inbound events mutate the in-memory
//! session and persist a best-effort snapshot to the ephemeral store; active
//! time accrues only while the page is visible, folded from a wall-clock
//! marker on visibility flips, on the periodic tick, and at session end.

use crate::bus::{AnalyticsEventKind, SharedBus};
use crate::clock::SharedClock;
use crate::error::{Error, Result};
use crate::storage::SharedStore;
use crate::types::{shortcut_key, speed_key, Session, SESSION_KEY};
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

// ============================================
// Session tracker
// ============================================

/// Tracks the current session and emits analytics events as they happen.
///
/// The active-time marker is armed at session start and whenever the page
/// becomes visible, and cleared when it hides; hosts that start hidden
/// should call [`SessionTracker::on_visibility_change`] right after
/// [`SessionTracker::start_session`].
pub struct SessionTracker {
    clock: SharedClock,
    snapshots: SharedStore,
    bus: SharedBus,
    hostname: Option<String>,
    session: Option<Session>,
    active_since: Option<i64>,
}

impl SessionTracker {
    pub fn new(clock: SharedClock, snapshots: SharedStore, bus: SharedBus) -> Self {
        Self {
            clock,
            snapshots,
            bus,
            hostname: None,
            session: None,
            active_since: None,
        }
    }

    /// Set the hostname attributed to subsequent events
    pub fn set_hostname(&mut self, hostname: impl Into<String>) {
        self.hostname = Some(hostname.into());
    }

    pub fn current_session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Begin a fresh session, replacing any prior one, and arm the
    /// active-time marker
    pub fn start_session(&mut self) -> &Session {
        let now = self.clock.now_ms();
        let session = Session::new(session_id(now), now);
        debug!(session_id = %session.id, "session started");

        self.session = Some(session);
        self.active_since = Some(now);
        self.persist_snapshot();
        self.session.as_ref().unwrap()
    }

    /// Record a playback-speed change; `action` defaults to `"manual"`
    pub fn record_speed_change(&mut self, speed: f64, action: Option<&str>) {
        let now = self.clock.now_ms();
        let action = action.unwrap_or("manual");
        let hostname = self.hostname.clone();

        let Some(session) = self.live_session_mut() else {
            debug!("speed change ignored, no active session");
            return;
        };
        session.speed_changes += 1;
        *session.most_used_speeds.entry(speed_key(speed)).or_insert(0) += 1;
        if let Some(host) = &hostname {
            session.add_site(host);
        }
        session.last_activity_ms = now;

        self.persist_snapshot();
        self.bus.emit_analytics(
            AnalyticsEventKind::SpeedChange,
            json!({ "speed": speed, "action": action, "hostname": hostname }),
            now,
        );
    }

    /// Record a keyboard shortcut, keyed by shortcut identifier and action
    pub fn record_shortcut(&mut self, key: &str, action: &str) {
        let now = self.clock.now_ms();

        let Some(session) = self.live_session_mut() else {
            debug!("shortcut ignored, no active session");
            return;
        };
        session.keyboard_shortcuts += 1;
        *session
            .most_used_shortcuts
            .entry(shortcut_key(key, action))
            .or_insert(0) += 1;
        session.last_activity_ms = now;

        self.persist_snapshot();
        self.bus.emit_analytics(
            AnalyticsEventKind::KeyboardShortcut,
            json!({ "key": key, "action": action }),
            now,
        );
    }

    /// Record the popup being opened
    pub fn record_popup_open(&mut self) {
        let now = self.clock.now_ms();

        let Some(session) = self.live_session_mut() else {
            debug!("popup open ignored, no active session");
            return;
        };
        session.popup_opens += 1;
        session.last_activity_ms = now;

        self.persist_snapshot();
        self.bus
            .emit_analytics(AnalyticsEventKind::PopupOpen, json!({}), now);
    }

    /// Fold or arm the active-time marker as the page hides or shows
    pub fn on_visibility_change(&mut self, hidden: bool) {
        let now = self.clock.now_ms();
        if self.live_session_mut().is_none() {
            return;
        }
        // Folding first means a repeated visible signal drops no elapsed time
        self.fold_active_time(now);
        if !hidden {
            self.active_since = Some(now);
        }
    }

    /// Periodic checkpoint: fold elapsed active time, re-arm the marker,
    /// stamp activity, persist the snapshot
    pub fn tick(&mut self) {
        let now = self.clock.now_ms();
        if self.live_session_mut().is_none() {
            return;
        }
        if self.active_since.is_some() {
            self.fold_active_time(now);
            self.active_since = Some(now);
        }
        if let Some(session) = self.session.as_mut() {
            session.last_activity_ms = now;
        }
        self.persist_snapshot();
    }

    /// Finish the current session and return it for merging.
    ///
    /// The session stays in memory marked as merged; a second call without
    /// an intervening [`SessionTracker::start_session`] returns
    /// [`Error::InvalidSession`] so it can never be merged twice.
    pub fn end_session(&mut self) -> Result<Session> {
        let now = self.clock.now_ms();
        self.fold_active_time(now);

        let Some(session) = self.session.as_mut() else {
            return Err(Error::InvalidSession("no active session".into()));
        };
        if session.merged {
            return Err(Error::InvalidSession(format!(
                "session {} already ended",
                session.id
            )));
        }
        session.last_activity_ms = now;
        session.merged = true;
        let completed = session.clone();

        self.persist_snapshot();
        debug!(
            session_id = %completed.id,
            active_ms = completed.total_time_active_ms,
            "session ended"
        );
        Ok(completed)
    }

    // A session that has already been handed off for merging no longer
    // accepts events
    fn live_session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut().filter(|session| !session.merged)
    }

    fn fold_active_time(&mut self, now: i64) {
        if let (Some(session), Some(since)) = (self.session.as_mut(), self.active_since.take()) {
            session.total_time_active_ms += (now - since).max(0) as u64;
        }
    }

    // Snapshot persistence is best-effort: a failed write is logged and
    // tracking continues in memory
    fn persist_snapshot(&self) {
        let Some(session) = &self.session else {
            return;
        };
        let value = match serde_json::to_value(session) {
            Ok(value) => value,
            Err(error) => {
                warn!(%error, "failed to encode session snapshot");
                return;
            }
        };
        if let Err(error) = self.snapshots.set(SESSION_KEY, &value) {
            warn!(%error, "failed to persist session snapshot");
        }
    }
}

fn session_id(now_ms: i64) -> String {
    let token = Uuid::new_v4().simple().to_string();
    format!("session_{}_{}", now_ms, &token[..8])
}
