use std::fmt;

use chrono::{DateTime, Days, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::warn;

use crate::error::{DashboardError, Result};
use crate::models::MonthKey;

// ── System timezone detection ─────────────────────────────────────────────────

/// Detect the IANA timezone name of the running system.
///
/// Falls back to `"UTC"` if detection fails.
pub fn get_system_timezone() -> String {
    iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string())
}

/// Today's calendar date in the named IANA timezone.
///
/// Unrecognised names fall back to UTC with a warning.
pub fn today_in(tz_name: &str) -> NaiveDate {
    date_in(Utc::now(), tz_name)
}

/// Calendar date of `instant` as observed in the named timezone.
pub fn date_in(instant: DateTime<Utc>, tz_name: &str) -> NaiveDate {
    let tz = tz_name.parse::<Tz>().unwrap_or_else(|_| {
        warn!("unrecognised timezone \"{}\", falling back to UTC", tz_name);
        Tz::UTC
    });
    instant.with_timezone(&tz).date_naive()
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| DashboardError::InvalidDate(s.to_string()))
}

/// Convert epoch milliseconds into a UTC timestamp.
pub fn from_epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
}

// ── Month decomposition ───────────────────────────────────────────────────────

/// Ordered, consecutive months covering `[start, end]` inclusively.
///
/// Both ends are widened to their month, so a partial end month is still
/// included whole. Returns an empty list when `start` lies in a later month
/// than `end`.
pub fn months_between(start: NaiveDate, end: NaiveDate) -> Vec<MonthKey> {
    let last = MonthKey::of(end);
    let mut months = Vec::new();
    let mut current = Some(MonthKey::of(start));

    while let Some(month) = current {
        if month > last {
            break;
        }
        months.push(month);
        current = month.next();
    }

    months
}

// ── TimeRange ─────────────────────────────────────────────────────────────────

/// A dashboard time-range selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    /// The last `n` days up to and including today.
    Days(u32),
    /// Everything since the account's join date.
    All,
    /// Whole months from `start` through `end`.
    Custom { start: MonthKey, end: MonthKey },
}

impl TimeRange {
    /// Build a range from the `--range` option value and optional custom months.
    ///
    /// `option` is one of `7`, `30`, `90`, `365`, `all` or `custom`.
    pub fn from_option(
        option: &str,
        start_month: Option<&str>,
        end_month: Option<&str>,
    ) -> Result<Self> {
        match option {
            "all" => Ok(TimeRange::All),
            "custom" => {
                let start = start_month
                    .ok_or_else(|| {
                        DashboardError::Config("custom range needs --start-month".to_string())
                    })?
                    .parse::<MonthKey>()?;
                let end = end_month
                    .ok_or_else(|| {
                        DashboardError::Config("custom range needs --end-month".to_string())
                    })?
                    .parse::<MonthKey>()?;
                if start > end {
                    return Err(DashboardError::InvalidRange {
                        start: start.to_string(),
                        end: end.to_string(),
                    });
                }
                Ok(TimeRange::Custom { start, end })
            }
            days => days
                .parse::<u32>()
                .map(TimeRange::Days)
                .map_err(|_| DashboardError::Config(format!("unknown time range: {days}"))),
        }
    }

    /// Resolve to concrete `(start, end)` dates.
    ///
    /// `join_date` bounds the `All` option; a join date after `today`
    /// collapses the range to today.
    pub fn resolve(&self, today: NaiveDate, join_date: NaiveDate) -> (NaiveDate, NaiveDate) {
        match *self {
            TimeRange::Days(n) => {
                let start = today
                    .checked_sub_days(Days::new(u64::from(n)))
                    .unwrap_or(NaiveDate::MIN);
                (start, today)
            }
            TimeRange::All => (join_date.min(today), today),
            TimeRange::Custom { start, end } => (start.first_day(), end.last_day()),
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeRange::Days(n) => write!(f, "last {n} days"),
            TimeRange::All => f.write_str("all time"),
            TimeRange::Custom { start, end } => write!(f, "{start} to {end}"),
        }
    }
}
