//! Aggregate store management
//!
//! Folds finished sessions into the durable cross-session aggregate with a
//! full load-modify-store cycle per merge. Storage failures are recovered
//! locally: a failed read falls back to a fresh aggregate, a failed write
//! keeps the merged state in memory and retries on the next merge.
//! Concurrent merges from separate processes are last-write-wins.

use crate::clock::{SharedClock, MS_PER_DAY};
use crate::error::Result;
use crate::storage::SharedStore;
use crate::types::{Aggregate, Session, AGGREGATE_KEY};
use std::cell::RefCell;
use tracing::{debug, info, warn};

// ============================================
// Aggregate manager
// ============================================

/// Owns all mutation of the durable aggregate
pub struct AggregateManager {
    store: SharedStore,
    clock: SharedClock,
    max_history_days: u32,
    // Merged state a failed write left unpersisted; newer than the store
    pending: RefCell<Option<Aggregate>>,
}

impl AggregateManager {
    pub fn new(store: SharedStore, clock: SharedClock, max_history_days: u32) -> Self {
        Self {
            store,
            clock,
            max_history_days,
            pending: RefCell::new(None),
        }
    }

    /// Read the durable aggregate, or a freshly initialized one when absent
    /// or unreadable. Initialization is lazy: nothing is written until the
    /// first merge.
    pub fn load_aggregate(&self) -> Aggregate {
        if let Some(pending) = self.pending.borrow().as_ref() {
            return pending.clone();
        }

        let now = self.clock.now_ms();
        match self.store.get(AGGREGATE_KEY) {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(aggregate) => aggregate,
                Err(error) => {
                    warn!(%error, "stored aggregate is corrupt, starting fresh");
                    Aggregate::new(now)
                }
            },
            Ok(None) => Aggregate::new(now),
            Err(error) => {
                warn!(%error, "failed to read aggregate, starting fresh");
                Aggregate::new(now)
            }
        }
    }

    /// Fold a finished session into the aggregate, trim daily statistics to
    /// the retention window, and persist. Every completed session counts,
    /// including one with zero recorded events.
    pub fn merge_session(&self, session: &Session) -> Aggregate {
        let now = self.clock.now_ms();
        let today = self.clock.date_key(now);
        let mut aggregate = self.load_aggregate();

        aggregate.total_sessions += 1;
        aggregate.total_speed_changes += session.speed_changes;
        aggregate.total_keyboard_shortcuts += session.keyboard_shortcuts;
        aggregate.total_popup_opens += session.popup_opens;
        aggregate.total_time_active_ms += session.total_time_active_ms;
        aggregate.last_activity_ms = session.last_activity_ms;

        let daily = aggregate.daily_stats.entry(today.clone()).or_default();
        daily.sessions += 1;
        daily.speed_changes += session.speed_changes;
        daily.keyboard_shortcuts += session.keyboard_shortcuts;
        daily.popup_opens += session.popup_opens;
        daily.time_active_ms += session.total_time_active_ms;
        for site in &session.sites_used {
            daily.add_site(site);
        }

        for (key, count) in &session.most_used_speeds {
            *aggregate.speed_usage_stats.entry(key.clone()).or_insert(0) += count;
        }
        for (key, count) in &session.most_used_shortcuts {
            *aggregate
                .shortcut_usage_stats
                .entry(key.clone())
                .or_insert(0) += count;
        }
        // Site popularity counts sessions touching the site, not events on it
        for site in &session.sites_used {
            *aggregate.site_usage_stats.entry(site.clone()).or_insert(0) += 1;
        }

        self.trim_history(&mut aggregate, now);
        debug!(
            session_id = %session.id,
            total_sessions = aggregate.total_sessions,
            date = %today,
            "session merged"
        );

        self.persist(aggregate.clone());
        aggregate
    }

    /// Delete the durable aggregate. Irreversible.
    pub fn clear(&self) -> Result<()> {
        self.pending.replace(None);
        self.store.remove(AGGREGATE_KEY)?;
        info!("aggregate cleared");
        Ok(())
    }

    pub fn max_history_days(&self) -> u32 {
        self.max_history_days
    }

    // Retention keeps exactly `max_history_days` calendar days ending today;
    // date keys sort lexicographically
    fn trim_history(&self, aggregate: &mut Aggregate, now: i64) {
        let cutoff = self
            .clock
            .date_key(now - i64::from(self.max_history_days) * MS_PER_DAY);
        let before = aggregate.daily_stats.len();
        aggregate.daily_stats.retain(|key, _| key.as_str() > cutoff.as_str());

        let trimmed = before - aggregate.daily_stats.len();
        if trimmed > 0 {
            debug!(trimmed, %cutoff, "trimmed daily statistics");
        }
    }

    fn persist(&self, aggregate: Aggregate) {
        let value = match serde_json::to_value(&aggregate) {
            Ok(value) => value,
            Err(error) => {
                warn!(%error, "failed to encode aggregate, keeping it in memory");
                self.pending.replace(Some(aggregate));
                return;
            }
        };
        match self.store.set(AGGREGATE_KEY, &value) {
            Ok(()) => {
                self.pending.replace(None);
            }
            Err(error) => {
                warn!(%error, "failed to persist aggregate, keeping it in memory");
                self.pending.replace(Some(aggregate));
            }
        }
    }
}
