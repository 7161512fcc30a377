//! Clock abstraction for time arithmetic and date bucketing
//!
//! Every timestamp the tracker and aggregate manager touch flows through
//! [`Clock`], so active-time folds, daily bucketing, and retention cutoffs
//! can be driven deterministically in tests via [`ManualClock`].

use std::cell::Cell;
use std::rc::Rc;

use chrono::{TimeZone, Utc};

/// Milliseconds in one calendar day
pub const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Shared handle to a clock implementation
pub type SharedClock = Rc<dyn Clock>;

/// Source of wall-clock time and calendar date keys
pub trait Clock {
    /// Current time in milliseconds since the Unix epoch
    fn now_ms(&self) -> i64;

    /// `YYYY-MM-DD` key (UTC) for a millisecond timestamp
    fn date_key(&self, ts_ms: i64) -> String {
        Utc.timestamp_millis_opt(ts_ms)
            .single()
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "1970-01-01".to_string())
    }

    /// Date key for the current moment
    fn today(&self) -> String {
        self.date_key(self.now_ms())
    }
}

/// Wall clock backed by system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Manually driven clock for tests and embedders that own their own timer
#[derive(Debug)]
pub struct ManualClock {
    now_ms: Cell<i64>,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: Cell::new(start_ms),
        }
    }

    pub fn set(&self, ts_ms: i64) {
        self.now_ms.set(ts_ms);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now_ms.set(self.now_ms.get() + delta_ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_key_formats_utc_date() {
        let clock = ManualClock::new(0);
        // 2024-06-15T12:30:00Z
        assert_eq!(clock.date_key(1_718_454_600_000), "2024-06-15");
        // Epoch
        assert_eq!(clock.date_key(0), "1970-01-01");
    }

    #[test]
    fn test_date_key_is_stable_across_a_day() {
        let clock = ManualClock::new(0);
        let midnight = 1_718_409_600_000; // 2024-06-15T00:00:00Z
        assert_eq!(clock.date_key(midnight), "2024-06-15");
        assert_eq!(clock.date_key(midnight + MS_PER_DAY - 1), "2024-06-15");
        assert_eq!(clock.date_key(midnight + MS_PER_DAY), "2024-06-16");
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_ms(), 1_000);
        clock.advance(500);
        assert_eq!(clock.now_ms(), 1_500);
        clock.set(10_000);
        assert_eq!(clock.now_ms(), 10_000);
        assert_eq!(clock.today(), clock.date_key(10_000));
    }

    #[test]
    fn test_system_clock_is_monotonic_enough() {
        let clock = SystemClock;
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
        assert!(a > 1_600_000_000_000); // after 2020
    }
}
