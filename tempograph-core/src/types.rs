//! Core domain types for tempograph
//!
//! The data model has two layers: an ephemeral [`Session`] owned by the
//! session tracker for one page lifetime, and the durable [`Aggregate`]
//! that finished sessions are folded into.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Session** | The analytics record for one page's active lifetime |
//! | **Aggregate** | The durable, cross-session cumulative statistics store |
//! | **Merge** | Folding a finished Session's counters into the Aggregate |
//! | **Retention trimming** | Deleting daily stats older than the history window |
//! | **Date key** | Calendar date in `YYYY-MM-DD` form, buckets daily stats |
//!
//! Set-valued fields (`sites_used`, `unique_sites`) are stored as ordered
//! sequences; the `add_site` mutators enforce uniqueness so no set type
//! ever crosses the storage boundary.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================
// Storage keys
// ============================================

/// Durable-store key holding the serialized [`Aggregate`]
pub const AGGREGATE_KEY: &str = "tempograph_aggregate";

/// Ephemeral-store key holding the current [`Session`] snapshot
pub const SESSION_KEY: &str = "tempograph_session";

// ============================================
// Stat key builders
// ============================================

/// Bucket a playback speed to its one-decimal stat key (`"1.5"`, `"2.0"`)
pub fn speed_key(speed: f64) -> String {
    format!("{:.1}", speed)
}

/// Composite stat key for a shortcut identifier and its action label.
///
/// The identifier must not itself contain `_`; [`split_shortcut_key`]
/// splits on the first underscore.
pub fn shortcut_key(key: &str, action: &str) -> String {
    format!("{}_{}", key, action)
}

/// Split a composite shortcut key back into (identifier, action)
pub fn split_shortcut_key(composite: &str) -> (String, String) {
    match composite.split_once('_') {
        Some((key, action)) => (key.to_string(), action.to_string()),
        None => (composite.to_string(), String::new()),
    }
}

// ============================================
// Session
// ============================================

/// The analytics record for one page's active lifetime.
///
/// Owned exclusively by the session tracker; superseded by a fresh session
/// once merged into the durable aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque unique token generated at session start
    pub id: String,
    /// When the session started (ms since epoch)
    pub start_time_ms: i64,
    /// Timestamp of the most recent tracked event (ms since epoch)
    pub last_activity_ms: i64,
    /// Speed changes recorded this session
    pub speed_changes: u64,
    /// Keyboard shortcuts recorded this session
    pub keyboard_shortcuts: u64,
    /// Popup opens recorded this session
    pub popup_opens: u64,
    /// Milliseconds the page was visible and tracked
    pub total_time_active_ms: u64,
    /// Occurrences per one-decimal speed key
    pub most_used_speeds: BTreeMap<String, u64>,
    /// Occurrences per composite shortcut key
    pub most_used_shortcuts: BTreeMap<String, u64>,
    /// Hostnames visited this session (ordered, unique)
    pub sites_used: Vec<String>,
    /// Set once the session has been folded into the aggregate
    #[serde(default)]
    pub merged: bool,
}

impl Session {
    /// Fresh zeroed session starting now
    pub fn new(id: impl Into<String>, now_ms: i64) -> Self {
        Self {
            id: id.into(),
            start_time_ms: now_ms,
            last_activity_ms: now_ms,
            speed_changes: 0,
            keyboard_shortcuts: 0,
            popup_opens: 0,
            total_time_active_ms: 0,
            most_used_speeds: BTreeMap::new(),
            most_used_shortcuts: BTreeMap::new(),
            sites_used: Vec::new(),
            merged: false,
        }
    }

    /// Record a hostname, keeping `sites_used` an ordered set
    pub fn add_site(&mut self, hostname: &str) {
        if !self.sites_used.iter().any(|s| s == hostname) {
            self.sites_used.push(hostname.to_string());
        }
    }
}

// ============================================
// Daily stats
// ============================================

/// Per-day counters inside the aggregate, keyed by date key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyStat {
    /// Sessions merged on this date
    pub sessions: u64,
    /// Speed changes merged on this date
    pub speed_changes: u64,
    /// Keyboard shortcuts merged on this date
    pub keyboard_shortcuts: u64,
    /// Popup opens merged on this date
    pub popup_opens: u64,
    /// Milliseconds active on this date
    pub time_active_ms: u64,
    /// Hostnames active on this date (ordered, unique)
    pub unique_sites: Vec<String>,
}

impl DailyStat {
    /// Record a hostname, keeping `unique_sites` an ordered set
    pub fn add_site(&mut self, hostname: &str) {
        if !self.unique_sites.iter().any(|s| s == hostname) {
            self.unique_sites.push(hostname.to_string());
        }
    }
}

// ============================================
// Aggregate
// ============================================

/// The durable, cross-session cumulative statistics store.
///
/// Created lazily on first read, mutated only through the merge operation,
/// survives until an explicit clear. Every running total equals the sum of
/// the corresponding counters across all sessions merged since
/// `first_install_ms`; retention trimming prunes `daily_stats` only, never
/// the totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    /// Sessions merged since install
    pub total_sessions: u64,
    /// Speed changes across all merged sessions
    pub total_speed_changes: u64,
    /// Keyboard shortcuts across all merged sessions
    pub total_keyboard_shortcuts: u64,
    /// Popup opens across all merged sessions
    pub total_popup_opens: u64,
    /// Active milliseconds across all merged sessions
    pub total_time_active_ms: u64,
    /// Per-day counters keyed `YYYY-MM-DD`, bounded by the retention window
    pub daily_stats: BTreeMap<String, DailyStat>,
    /// Cumulative occurrences per one-decimal speed key
    pub speed_usage_stats: BTreeMap<String, u64>,
    /// Cumulative occurrences per composite shortcut key
    pub shortcut_usage_stats: BTreeMap<String, u64>,
    /// Sessions touching each hostname (one increment per session)
    pub site_usage_stats: BTreeMap<String, u64>,
    /// Set once at first initialization, never mutated afterwards
    pub first_install_ms: i64,
    /// `last_activity_ms` of the most recently merged session
    pub last_activity_ms: i64,
}

impl Aggregate {
    /// Fresh store for a new install
    pub fn new(now_ms: i64) -> Self {
        Self {
            total_sessions: 0,
            total_speed_changes: 0,
            total_keyboard_shortcuts: 0,
            total_popup_opens: 0,
            total_time_active_ms: 0,
            daily_stats: BTreeMap::new(),
            speed_usage_stats: BTreeMap::new(),
            shortcut_usage_stats: BTreeMap::new(),
            site_usage_stats: BTreeMap::new(),
            first_install_ms: now_ms,
            last_activity_ms: now_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_key_buckets_to_one_decimal() {
        assert_eq!(speed_key(1.0), "1.0");
        assert_eq!(speed_key(1.499), "1.5");
        assert_eq!(speed_key(2.0), "2.0");
        assert_eq!(speed_key(0.75), "0.8");
    }

    #[test]
    fn test_shortcut_key_round_trip() {
        let composite = shortcut_key("S", "slower");
        assert_eq!(composite, "S_slower");
        assert_eq!(
            split_shortcut_key(&composite),
            ("S".to_string(), "slower".to_string())
        );

        // Action labels may themselves contain underscores
        let composite = shortcut_key("R", "reset_speed");
        assert_eq!(
            split_shortcut_key(&composite),
            ("R".to_string(), "reset_speed".to_string())
        );

        // Degenerate key without separator
        assert_eq!(
            split_shortcut_key("bare"),
            ("bare".to_string(), String::new())
        );
    }

    #[test]
    fn test_add_site_enforces_uniqueness() {
        let mut session = Session::new("s1", 1_000);
        session.add_site("youtube.com");
        session.add_site("vimeo.com");
        session.add_site("youtube.com");
        assert_eq!(session.sites_used, vec!["youtube.com", "vimeo.com"]);

        let mut day = DailyStat::default();
        day.add_site("example.com");
        day.add_site("example.com");
        assert_eq!(day.unique_sites, vec!["example.com"]);
    }

    #[test]
    fn test_new_session_is_zeroed() {
        let session = Session::new("s1", 42);
        assert_eq!(session.start_time_ms, 42);
        assert_eq!(session.last_activity_ms, 42);
        assert_eq!(session.speed_changes, 0);
        assert_eq!(session.total_time_active_ms, 0);
        assert!(session.most_used_speeds.is_empty());
        assert!(!session.merged);
    }
}
