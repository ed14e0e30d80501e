use chrono_tz::Tz;

use crate::models::CurrentStats;
use crate::time_utils::from_epoch_millis;

/// Format an optional rating, rendering a missing value as `"-"`.
///
/// # Examples
///
/// ```
/// use dashboard_core::formatting::format_rating;
///
/// assert_eq!(format_rating(Some(1523)), "1523");
/// assert_eq!(format_rating(None), "-");
/// ```
pub fn format_rating(rating: Option<i32>) -> String {
    match rating {
        Some(r) => r.to_string(),
        None => "-".to_string(),
    }
}

/// Format a non-negative count with thousands separators.
///
/// # Examples
///
/// ```
/// use dashboard_core::formatting::format_count;
///
/// assert_eq!(format_count(999), "999");
/// assert_eq!(format_count(12_345), "12,345");
/// assert_eq!(format_count(1_234_567), "1,234,567");
/// ```
pub fn format_count(value: u64) -> String {
    group_thousands(&value.to_string())
}

/// Calculate `(part / whole) * 100`, rounded to `decimal_places`.
///
/// Returns `0.0` if `whole` is zero to avoid division by zero.
///
/// # Examples
///
/// ```
/// use dashboard_core::formatting::percentage;
///
/// assert!((percentage(50.0, 200.0, 1) - 25.0).abs() < 1e-9);
/// assert_eq!(percentage(0.0, 0.0, 2), 0.0);
/// ```
pub fn percentage(part: f64, whole: f64, decimal_places: u32) -> f64 {
    if whole == 0.0 {
        return 0.0;
    }
    let raw = (part / whole) * 100.0;
    let factor = 10_f64.powi(decimal_places as i32);
    (raw * factor).round() / factor
}

/// Win / loss / draw record line, e.g. `"W 120 / L 80 / D 10 (57.1%)"`.
///
/// The win rate is computed over decided and drawn games; missing counts are
/// treated as zero.
pub fn format_record(stats: &CurrentStats) -> String {
    let wins = stats.wins.unwrap_or(0);
    let losses = stats.losses.unwrap_or(0);
    let draws = stats.draws.unwrap_or(0);
    let played = u64::from(wins) + u64::from(losses) + u64::from(draws);
    let rate = percentage(f64::from(wins), played as f64, 1);
    format!(
        "W {} / L {} / D {} ({:.1}%)",
        format_count(u64::from(wins)),
        format_count(u64::from(losses)),
        format_count(u64::from(draws)),
        rate
    )
}

/// Render a snapshot generation time (epoch millis) in the given timezone.
///
/// Unrecognised timezone names fall back to UTC; an out-of-range timestamp
/// renders as `"unknown"`.
pub fn format_generated_at(millis: i64, tz_name: &str) -> String {
    let tz = tz_name.parse::<Tz>().unwrap_or(Tz::UTC);
    match from_epoch_millis(millis) {
        Some(dt) => dt.with_timezone(&tz).format("%Y-%m-%d %H:%M %Z").to_string(),
        None => "unknown".to_string(),
    }
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Insert commas every three digits from the right of an integer string.
fn group_thousands(s: &str) -> String {
    let len = s.len();
    let mut result = String::with_capacity(len + len / 3);
    for (i, c) in s.chars().enumerate() {
        if i != 0 && (len - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}
