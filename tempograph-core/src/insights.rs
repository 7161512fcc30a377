//! Insight derivation
//!
//! Pure, read-only transformations from a loaded [`Aggregate`] into the
//! presentation-facing statistics: overview, speed preferences, keyboard
//! usage, site usage, trends, quick stats, and the export bundle. Nothing
//! here mutates state or touches storage.

use crate::clock::MS_PER_DAY;
use crate::types::{split_shortcut_key, Aggregate, DailyStat};
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================
// Site categories
// ============================================

// Fixed allow-lists matched by substring containment against the hostname.
// A site matching several categories counts into every one of them;
// unmatched sites fall into `other`.
const SITE_CATEGORIES: &[(&str, &[&str])] = &[
    (
        "video",
        &[
            "youtube.com",
            "netflix.com",
            "vimeo.com",
            "twitch.tv",
            "dailymotion.com",
        ],
    ),
    (
        "education",
        &[
            "coursera.org",
            "udemy.com",
            "khanacademy.org",
            "edx.org",
            "pluralsight.com",
        ],
    ),
    (
        "social",
        &[
            "facebook.com",
            "instagram.com",
            "twitter.com",
            "tiktok.com",
            "linkedin.com",
        ],
    ),
    (
        "news",
        &["cnn.com", "bbc.com", "reuters.com", "npr.org", "bloomberg.com"],
    ),
];

const OTHER_CATEGORY: &str = "other";

// ============================================
// Insight views
// ============================================

/// Headline figures for the popup's summary panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverviewInsights {
    pub total_sessions: u64,
    pub total_speed_changes: u64,
    /// One decimal place
    pub avg_speed_changes_per_session: f64,
    /// Whole minutes, rounded
    pub avg_time_per_session_mins: u64,
    /// Shortcuts per hundred speed changes, one decimal place
    pub keyboard_usage_rate: f64,
    pub total_sites_used: usize,
    pub days_since_install: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedEntry {
    pub speed: f64,
    pub count: u64,
}

/// Which playback speeds the user actually lives at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedInsights {
    pub most_used_speed: f64,
    pub speed_range: SpeedRange,
    /// Top ten speeds by occurrence count, descending
    pub speed_distribution: Vec<SpeedEntry>,
    /// Occurrence-weighted mean speed
    pub average_speed: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortcutEntry {
    pub key: String,
    pub action: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyboardInsights {
    pub total_shortcuts: u64,
    /// Shortcuts per hundred speed changes, one decimal place
    pub keyboard_efficiency: f64,
    /// Top five shortcuts by occurrence count, descending
    pub most_used_shortcuts: Vec<ShortcutEntry>,
    /// Occurrences summed per action label
    pub shortcut_distribution: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteEntry {
    pub site: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteInsights {
    pub total_sites: usize,
    /// Top ten sites by sessions touching them, descending
    pub most_used_sites: Vec<SiteEntry>,
    /// Session counts per category; every category key is always present
    pub site_categories: BTreeMap<String, u64>,
}

/// Totals over a window of populated dates; `unique_sites` sums each day's
/// cardinality rather than the union
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodStats {
    pub sessions: u64,
    pub speed_changes: u64,
    pub keyboard_shortcuts: u64,
    pub time_active_ms: u64,
    pub unique_sites: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendInsights {
    pub last_7_days: PeriodStats,
    pub last_30_days: PeriodStats,
    /// Percent change in daily speed changes across halves of the 7-day window
    pub weekly_trend: f64,
    /// Percent change in daily speed changes across halves of the 30-day window
    pub monthly_trend: f64,
}

/// Everything the popup renders, derived in one pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageInsights {
    pub overview: OverviewInsights,
    pub speed_preferences: SpeedInsights,
    pub keyboard_usage: KeyboardInsights,
    pub site_usage: SiteInsights,
    pub trends: TrendInsights,
}

/// Compact figures for badge-style display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickStats {
    pub total_sessions: u64,
    /// One decimal place
    pub avg_speed: f64,
    /// One decimal place
    pub most_used_speed: f64,
    pub keyboard_usage: f64,
    pub total_sites: usize,
    pub days_since_install: i64,
}

/// Deep snapshot for user-initiated export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportBundle {
    pub summary: OverviewInsights,
    pub speed_preferences: SpeedInsights,
    pub keyboard_usage: KeyboardInsights,
    pub site_usage: SiteInsights,
    pub trends: TrendInsights,
    pub raw_data: Aggregate,
    /// RFC 3339 export timestamp
    pub export_date: String,
    /// Crate version the export was produced by
    pub version: String,
}

// ============================================
// Derivations
// ============================================

pub fn usage_insights(aggregate: &Aggregate, now_ms: i64) -> UsageInsights {
    UsageInsights {
        overview: overview(aggregate, now_ms),
        speed_preferences: speed_preferences(aggregate),
        keyboard_usage: keyboard_usage(aggregate),
        site_usage: site_usage(aggregate),
        trends: trends(aggregate),
    }
}

pub fn overview(aggregate: &Aggregate, now_ms: i64) -> OverviewInsights {
    let avg_speed_changes_per_session = if aggregate.total_sessions > 0 {
        round1(aggregate.total_speed_changes as f64 / aggregate.total_sessions as f64)
    } else {
        0.0
    };
    let avg_time_per_session_mins = if aggregate.total_sessions > 0 {
        let avg_ms = aggregate.total_time_active_ms as f64 / aggregate.total_sessions as f64;
        (avg_ms / 60_000.0).round() as u64
    } else {
        0
    };

    OverviewInsights {
        total_sessions: aggregate.total_sessions,
        total_speed_changes: aggregate.total_speed_changes,
        avg_speed_changes_per_session,
        avg_time_per_session_mins,
        keyboard_usage_rate: usage_rate(
            aggregate.total_keyboard_shortcuts,
            aggregate.total_speed_changes,
        ),
        total_sites_used: aggregate.site_usage_stats.len(),
        days_since_install: days_since(aggregate.first_install_ms, now_ms),
    }
}

pub fn speed_preferences(aggregate: &Aggregate) -> SpeedInsights {
    let mut entries: Vec<SpeedEntry> = aggregate
        .speed_usage_stats
        .iter()
        .map(|(key, &count)| SpeedEntry {
            speed: key.parse().unwrap_or(1.0),
            count,
        })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count));

    let most_used_speed = entries.first().map_or(1.0, |entry| entry.speed);
    let speed_range = if entries.is_empty() {
        SpeedRange { min: 1.0, max: 1.0 }
    } else {
        SpeedRange {
            min: entries.iter().map(|e| e.speed).fold(f64::INFINITY, f64::min),
            max: entries
                .iter()
                .map(|e| e.speed)
                .fold(f64::NEG_INFINITY, f64::max),
        }
    };
    let average_speed = weighted_average_speed(&entries);

    entries.truncate(10);
    SpeedInsights {
        most_used_speed,
        speed_range,
        speed_distribution: entries,
        average_speed,
    }
}

fn weighted_average_speed(entries: &[SpeedEntry]) -> f64 {
    let total_count: u64 = entries.iter().map(|e| e.count).sum();
    if total_count == 0 {
        return 1.0;
    }
    let weighted: f64 = entries.iter().map(|e| e.speed * e.count as f64).sum();
    weighted / total_count as f64
}

pub fn keyboard_usage(aggregate: &Aggregate) -> KeyboardInsights {
    let mut entries: Vec<ShortcutEntry> = aggregate
        .shortcut_usage_stats
        .iter()
        .map(|(composite, &count)| {
            let (key, action) = split_shortcut_key(composite);
            ShortcutEntry { key, action, count }
        })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count));

    let mut shortcut_distribution: BTreeMap<String, u64> = BTreeMap::new();
    for entry in &entries {
        *shortcut_distribution.entry(entry.action.clone()).or_insert(0) += entry.count;
    }

    entries.truncate(5);
    KeyboardInsights {
        total_shortcuts: aggregate.total_keyboard_shortcuts,
        keyboard_efficiency: usage_rate(
            aggregate.total_keyboard_shortcuts,
            aggregate.total_speed_changes,
        ),
        most_used_shortcuts: entries,
        shortcut_distribution,
    }
}

pub fn site_usage(aggregate: &Aggregate) -> SiteInsights {
    let mut entries: Vec<SiteEntry> = aggregate
        .site_usage_stats
        .iter()
        .map(|(site, &count)| SiteEntry {
            site: site.clone(),
            count,
        })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count));

    let site_categories = categorize_sites(&entries);

    let total_sites = entries.len();
    entries.truncate(10);
    SiteInsights {
        total_sites,
        most_used_sites: entries,
        site_categories,
    }
}

fn categorize_sites(entries: &[SiteEntry]) -> BTreeMap<String, u64> {
    let mut categorized: BTreeMap<String, u64> = SITE_CATEGORIES
        .iter()
        .map(|(name, _)| (name.to_string(), 0))
        .chain(std::iter::once((OTHER_CATEGORY.to_string(), 0)))
        .collect();

    for entry in entries {
        let mut matched = false;
        for (name, domains) in SITE_CATEGORIES {
            if domains.iter().any(|domain| entry.site.contains(domain)) {
                *categorized.entry((*name).to_string()).or_insert(0) += entry.count;
                matched = true;
            }
        }
        if !matched {
            *categorized.entry(OTHER_CATEGORY.to_string()).or_insert(0) += entry.count;
        }
    }
    categorized
}

pub fn trends(aggregate: &Aggregate) -> TrendInsights {
    let dates: Vec<&String> = aggregate.daily_stats.keys().collect();
    let last_7 = tail(&dates, 7);
    let last_30 = tail(&dates, 30);

    TrendInsights {
        last_7_days: period_stats(&aggregate.daily_stats, last_7),
        last_30_days: period_stats(&aggregate.daily_stats, last_30),
        weekly_trend: period_trend(&aggregate.daily_stats, last_7),
        monthly_trend: period_trend(&aggregate.daily_stats, last_30),
    }
}

fn tail<'a>(dates: &'a [&'a String], n: usize) -> &'a [&'a String] {
    &dates[dates.len().saturating_sub(n)..]
}

fn period_stats(daily_stats: &BTreeMap<String, DailyStat>, dates: &[&String]) -> PeriodStats {
    let mut totals = PeriodStats::default();
    for date in dates {
        if let Some(day) = daily_stats.get(*date) {
            totals.sessions += day.sessions;
            totals.speed_changes += day.speed_changes;
            totals.keyboard_shortcuts += day.keyboard_shortcuts;
            totals.time_active_ms += day.time_active_ms;
            totals.unique_sites += day.unique_sites.len();
        }
    }
    totals
}

// Percent change in average daily speed changes between the first and second
// half of the window; zero when there is nothing to compare against
fn period_trend(daily_stats: &BTreeMap<String, DailyStat>, dates: &[&String]) -> f64 {
    if dates.len() < 2 {
        return 0.0;
    }
    let half = dates.len() / 2;
    let first_avg = period_average(daily_stats, &dates[..half]);
    let second_avg = period_average(daily_stats, &dates[half..]);

    if first_avg == 0.0 {
        return 0.0;
    }
    (second_avg - first_avg) / first_avg * 100.0
}

fn period_average(daily_stats: &BTreeMap<String, DailyStat>, dates: &[&String]) -> f64 {
    if dates.is_empty() {
        return 0.0;
    }
    let total: u64 = dates
        .iter()
        .filter_map(|date| daily_stats.get(*date))
        .map(|day| day.speed_changes)
        .sum();
    total as f64 / dates.len() as f64
}

pub fn quick_stats(aggregate: &Aggregate, now_ms: i64) -> QuickStats {
    let speeds = speed_preferences(aggregate);
    let keyboard = keyboard_usage(aggregate);

    QuickStats {
        total_sessions: aggregate.total_sessions,
        avg_speed: round1(speeds.average_speed),
        most_used_speed: round1(speeds.most_used_speed),
        keyboard_usage: keyboard.keyboard_efficiency,
        total_sites: aggregate.site_usage_stats.len(),
        days_since_install: days_since(aggregate.first_install_ms, now_ms),
    }
}

pub fn export(aggregate: &Aggregate, now_ms: i64) -> ExportBundle {
    let insights = usage_insights(aggregate, now_ms);
    let export_date = Utc
        .timestamp_millis_opt(now_ms)
        .single()
        .unwrap_or_default()
        .to_rfc3339();

    ExportBundle {
        summary: insights.overview,
        speed_preferences: insights.speed_preferences,
        keyboard_usage: insights.keyboard_usage,
        site_usage: insights.site_usage,
        trends: insights.trends,
        raw_data: aggregate.clone(),
        export_date,
        version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

// ============================================
// Shared arithmetic
// ============================================

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn usage_rate(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    round1(numerator as f64 / denominator as f64 * 100.0)
}

fn days_since(install_ms: i64, now_ms: i64) -> i64 {
    (now_ms - install_ms).max(0) / MS_PER_DAY
}
