//! Plain-text rendering of the dashboard state.

use dashboard_core::formatting::{format_count, format_generated_at, format_rating, format_record};
use dashboard_core::models::{CurrentStats, DataSource};
use dashboard_data::series::RatingSeries;
use dashboard_runtime::orchestrator::FetchProgress;
use dashboard_runtime::session::{DataStatus, RangeView};

/// Status banner, with the snapshot age when a snapshot is on screen.
pub fn status_line(status: DataStatus, snapshot_generated_at: Option<i64>, tz: &str) -> String {
    match snapshot_generated_at {
        Some(millis) => format!(
            "[{}] snapshot generated {}",
            status.label(),
            format_generated_at(millis, tz)
        ),
        None => format!("[{}]", status.label()),
    }
}

pub fn stats_block(username: &str, stats: &CurrentStats) -> String {
    let mut out = format!("{username}\n");
    out.push_str(&format!(
        "  Rapid {:>6}   Blitz {:>6}   Bullet {:>6}   Puzzles {:>6}\n",
        format_rating(stats.rapid_rating),
        format_rating(stats.blitz_rating),
        format_rating(stats.bullet_rating),
        format_rating(stats.puzzle_rating),
    ));
    if let Some(total) = stats.total_games {
        out.push_str(&format!(
            "  {} games   {}\n",
            format_count(u64::from(total)),
            format_record(stats)
        ));
    }
    if let Some(updated) = &stats.last_updated {
        out.push_str(&format!("  last updated {updated}\n"));
    }
    out
}

/// One progress line per month, e.g. `Loading chess history... 2/12 (2024-02)`.
pub fn progress_line(progress: &FetchProgress, source: DataSource) -> String {
    format!(
        "{} {}/{} ({})",
        source.loading_message(),
        progress.current,
        progress.total,
        progress.current_month
    )
}

pub fn range_block(range_label: &str, view: &RangeView) -> String {
    let series = RatingSeries::build(&view.records, view.start, view.end);

    let mut out = format!(
        "Rating history, {range_label} ({} to {})",
        view.start, view.end
    );
    if view.report.from_cache {
        out.push_str(" [cached]");
    }
    out.push('\n');
    out.push_str(&format!(
        "  {} of {} days with games\n",
        format_count(series.days_with_games() as u64),
        format_count(series.len() as u64)
    ));

    for summary in series.summary() {
        out.push_str(&format!(
            "  {:<7} latest {:>6}   peak {:>6}\n",
            summary.mode.label(),
            format_rating(summary.latest),
            format_rating(summary.peak)
        ));
    }

    if view.is_partial() {
        let failed: Vec<String> = view
            .report
            .failed_months
            .iter()
            .map(|m| m.to_string())
            .collect();
        out.push_str(&format!(
            "  warning: {} of {} months could not be loaded ({})\n",
            failed.len(),
            view.report.months_requested,
            failed.join(", ")
        ));
    }

    out
}
