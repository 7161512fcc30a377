//! tempograph - local playback-speed usage analytics
//!
//! Inspect, export, and reset the usage aggregate tracked on this machine.
//! Everything is read from the local store; nothing leaves the device.

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use std::rc::Rc;
use tempograph_core::aggregate::AggregateManager;
use tempograph_core::insights::{self, UsageInsights};
use tempograph_core::storage::SqliteStore;
use tempograph_core::{Clock, Config, SystemClock};

#[derive(Parser, Debug)]
#[command(name = "tempograph")]
#[command(about = "Local playback-speed usage analytics")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the full usage report (default)
    Insights {
        /// Output JSON instead of the terminal report
        #[arg(long)]
        json: bool,
    },
    /// Show compact headline stats
    Quick {
        /// Output JSON instead of one-line stats
        #[arg(long)]
        json: bool,
    },
    /// Export the full analytics snapshot as JSON
    Export {
        /// Destination file (default: tempograph-export-YYYY-MM-DD.json)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Print the snapshot to stdout instead of writing a file
        #[arg(long)]
        stdout: bool,
    },
    /// Permanently delete all locally tracked analytics
    Clear {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();
    let config = Config::load().context("failed to load configuration")?;
    let _log_guard = tempograph_core::logging::init(&config.logging).ok();

    let db_path = config.database_path();
    let store = Rc::new(SqliteStore::open(&db_path).context("failed to open analytics store")?);
    let clock = Rc::new(SystemClock);
    let manager = AggregateManager::new(store, clock.clone(), config.tracking.max_history_days);

    match args.command.unwrap_or(Commands::Insights { json: false }) {
        Commands::Insights { json } => show_insights(&manager, clock.as_ref(), json),
        Commands::Quick { json } => show_quick(&manager, clock.as_ref(), json),
        Commands::Export { output, stdout } => {
            run_export(&manager, clock.as_ref(), output, stdout)
        }
        Commands::Clear { yes } => run_clear(&manager, yes),
    }
}

fn show_insights(manager: &AggregateManager, clock: &dyn Clock, json: bool) -> Result<()> {
    let aggregate = manager.load_aggregate();
    let view = insights::usage_insights(&aggregate, clock.now_ms());

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }
    print_report(&view);
    Ok(())
}

fn show_quick(manager: &AggregateManager, clock: &dyn Clock, json: bool) -> Result<()> {
    let stats = insights::quick_stats(&manager.load_aggregate(), clock.now_ms());

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    println!(
        "Sessions: {}   Avg speed: {:.1}x   Preferred: {:.1}x",
        stats.total_sessions, stats.avg_speed, stats.most_used_speed
    );
    println!(
        "Keyboard usage: {:.1}%   Sites: {}   Days since install: {}",
        stats.keyboard_usage, stats.total_sites, stats.days_since_install
    );
    Ok(())
}

fn run_export(
    manager: &AggregateManager,
    clock: &dyn Clock,
    output: Option<PathBuf>,
    to_stdout: bool,
) -> Result<()> {
    let aggregate = manager.load_aggregate();
    let bundle = insights::export(&aggregate, clock.now_ms());
    let text = serde_json::to_string_pretty(&bundle)?;

    if to_stdout {
        println!("{text}");
        return Ok(());
    }

    let path = output.unwrap_or_else(|| {
        PathBuf::from(format!(
            "tempograph-export-{}.json",
            Local::now().format("%Y-%m-%d")
        ))
    });
    std::fs::write(&path, &text)
        .with_context(|| format!("failed to write export to {}", path.display()))?;
    println!(
        "Exported {} sessions to {}",
        bundle.raw_data.total_sessions,
        path.display()
    );
    Ok(())
}

fn run_clear(manager: &AggregateManager, yes: bool) -> Result<()> {
    if !yes && !confirm("This permanently deletes all locally tracked analytics. Continue?")? {
        println!("Aborted.");
        return Ok(());
    }

    manager.clear().context("failed to clear analytics")?;
    println!("Analytics cleared.");
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}

fn print_report(view: &UsageInsights) {
    // Header
    println!();
    println!("╭{}╮", "─".repeat(60));
    println!("│{:^60}│", "TEMPOGRAPH USAGE REPORT");
    println!("╰{}╯", "─".repeat(60));
    println!();

    if view.overview.total_sessions == 0 {
        println!("  No analytics recorded yet.");
        println!();
        return;
    }

    // Overview
    println!("OVERVIEW");
    println!(
        "   Sessions: {:<12} Speed changes: {}",
        view.overview.total_sessions, view.overview.total_speed_changes
    );
    println!(
        "   Per session: {} changes, {} min active",
        view.overview.avg_speed_changes_per_session, view.overview.avg_time_per_session_mins
    );
    println!(
        "   Keyboard usage: {:.1}%   Sites: {}   Installed: {} days ago",
        view.overview.keyboard_usage_rate,
        view.overview.total_sites_used,
        view.overview.days_since_install
    );
    println!();

    // Speed preferences
    println!("SPEED PREFERENCES");
    println!(
        "   Preferred: {:.1}x   Weighted average: {:.2}x   Range: {:.1}x-{:.1}x",
        view.speed_preferences.most_used_speed,
        view.speed_preferences.average_speed,
        view.speed_preferences.speed_range.min,
        view.speed_preferences.speed_range.max
    );
    for entry in &view.speed_preferences.speed_distribution {
        println!("   {:>5.1}x {:>8}", entry.speed, entry.count);
    }
    println!();

    // Keyboard usage
    if !view.keyboard_usage.most_used_shortcuts.is_empty() {
        println!("KEYBOARD USAGE");
        println!(
            "   Shortcuts: {}   Efficiency: {:.1}%",
            view.keyboard_usage.total_shortcuts, view.keyboard_usage.keyboard_efficiency
        );
        for entry in &view.keyboard_usage.most_used_shortcuts {
            println!("   {:<14} {:>8}", format!("{} ({})", entry.key, entry.action), entry.count);
        }
        println!();
    }

    // Sites
    if !view.site_usage.most_used_sites.is_empty() {
        println!("TOP SITES");
        for entry in &view.site_usage.most_used_sites {
            println!("   {:<32} {:>8}", entry.site, entry.count);
        }
        let categories: Vec<String> = view
            .site_usage
            .site_categories
            .iter()
            .filter(|(_, &count)| count > 0)
            .map(|(name, count)| format!("{name} {count}"))
            .collect();
        if !categories.is_empty() {
            println!("   Categories: {}", categories.join(", "));
        }
        println!();
    }

    // Trends
    println!("TRENDS");
    println!(
        "   Last 7 days:  {} sessions, {} speed changes, {} active",
        view.trends.last_7_days.sessions,
        view.trends.last_7_days.speed_changes,
        format_duration(view.trends.last_7_days.time_active_ms)
    );
    println!(
        "   Last 30 days: {} sessions, {} speed changes, {} active",
        view.trends.last_30_days.sessions,
        view.trends.last_30_days.speed_changes,
        format_duration(view.trends.last_30_days.time_active_ms)
    );
    println!(
        "   Weekly trend: {}   Monthly trend: {}",
        format_delta(view.trends.weekly_trend),
        format_delta(view.trends.monthly_trend)
    );
    println!();
}

fn format_delta(pct: f64) -> String {
    if pct > 0.0 {
        format!("+{:.1}%", pct)
    } else {
        format!("{:.1}%", pct)
    }
}

fn format_duration(ms: u64) -> String {
    let mins = ms / 60_000;
    if mins >= 60 {
        format!("{}h {}m", mins / 60, mins % 60)
    } else {
        format!("{}m", mins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_delta_signs() {
        assert_eq!(format_delta(12.34), "+12.3%");
        assert_eq!(format_delta(-3.21), "-3.2%");
        assert_eq!(format_delta(0.0), "0.0%");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0m");
        assert_eq!(format_duration(59 * 60_000), "59m");
        assert_eq!(format_duration(135 * 60_000), "2h 15m");
    }
}
