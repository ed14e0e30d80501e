use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{DashboardError, Result};

// ── DailyRating ───────────────────────────────────────────────────────────────

/// One user's ratings for a single calendar day.
///
/// A `None` rating means no game of that kind was played that day. Records
/// are never merged field by field: a later record for the same date
/// replaces the earlier one wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyRating {
    /// Chess.com username the ratings belong to.
    pub username: String,
    /// Calendar day, serialised as `YYYY-MM-DD`.
    pub date: NaiveDate,
    /// Rapid rating at the end of the day.
    #[serde(default)]
    pub rapid_rating: Option<i32>,
    /// Blitz rating at the end of the day.
    #[serde(default)]
    pub blitz_rating: Option<i32>,
    /// Bullet rating at the end of the day.
    #[serde(default)]
    pub bullet_rating: Option<i32>,
}

impl DailyRating {
    /// `true` when at least one game mode has a rating for this day.
    pub fn has_games(&self) -> bool {
        self.rapid_rating.is_some() || self.blitz_rating.is_some() || self.bullet_rating.is_some()
    }
}

// ── MonthKey ──────────────────────────────────────────────────────────────────

/// A calendar month, the unit of fetch granularity.
///
/// Ordered chronologically. Internally anchored on the first day of the
/// month, so every `MonthKey` is a valid calendar month by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    first_day: NaiveDate,
}

impl MonthKey {
    /// Build a key from a year and a 1-based month; `None` if out of range.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|first_day| Self { first_day })
    }

    /// The month containing `date`.
    pub fn of(date: NaiveDate) -> Self {
        Self {
            first_day: date.with_day(1).unwrap_or(date),
        }
    }

    pub fn year(&self) -> i32 {
        self.first_day.year()
    }

    /// 1-based month number.
    pub fn month(&self) -> u32 {
        self.first_day.month()
    }

    pub fn first_day(&self) -> NaiveDate {
        self.first_day
    }

    /// Last calendar day of the month (handles leap years).
    pub fn last_day(&self) -> NaiveDate {
        self.next()
            .and_then(|next| next.first_day.pred_opt())
            .unwrap_or(NaiveDate::MAX)
    }

    /// The following month, or `None` past the end of the supported calendar.
    pub fn next(&self) -> Option<Self> {
        self.first_day
            .checked_add_months(Months::new(1))
            .map(|first_day| Self { first_day })
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

impl FromStr for MonthKey {
    type Err = DashboardError;

    /// Parse a `YYYY-MM` string.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || DashboardError::InvalidMonth(s.to_string());
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        MonthKey::new(year, month).ok_or_else(invalid)
    }
}

// ── CoveredRange ──────────────────────────────────────────────────────────────

/// Month-granular bounds that a cache guarantees to be fully populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoveredRange {
    pub start: MonthKey,
    pub end: MonthKey,
}

impl CoveredRange {
    /// Widen a pair of dates to the months that contain them.
    pub fn from_dates(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: MonthKey::of(start),
            end: MonthKey::of(end),
        }
    }

    /// First day of the start month.
    pub fn start_date(&self) -> NaiveDate {
        self.start.first_day()
    }

    /// Last day of the end month.
    pub fn end_date(&self) -> NaiveDate {
        self.end.last_day()
    }

    /// `true` when `[start, end]` lies entirely within the covered months.
    pub fn contains(&self, start: NaiveDate, end: NaiveDate) -> bool {
        start >= self.start_date() && end <= self.end_date()
    }
}

// ── Fetch request ─────────────────────────────────────────────────────────────

/// Which backend endpoint serves a month of history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Read what the backend database already holds.
    DatabaseRead,
    /// Ask the backend to pull from Chess.com and persist the result.
    DatabaseRefresh,
    /// Pull from Chess.com through the backend without persisting.
    GuestDirect,
}

impl DataSource {
    /// Status line shown while a fetch from this source is running.
    pub fn loading_message(&self) -> &'static str {
        match self {
            DataSource::DatabaseRead => "Loading from database...",
            DataSource::DatabaseRefresh => "Updating from Chess.com API...",
            DataSource::GuestDirect => "Loading chess history...",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataSource::DatabaseRead => "database",
            DataSource::DatabaseRefresh => "update",
            DataSource::GuestDirect => "guest",
        };
        f.write_str(name)
    }
}

/// How a completed fetch is written back into the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// All-or-nothing: a cache hit short-circuits, a miss replaces everything.
    ReplaceAll,
    /// Hybrid: keep cached months before the last cached month, re-fetch from it.
    MergeFromMonth,
}

/// One request for a date range of daily ratings. Lives for a single run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub username: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub data_source: DataSource,
    pub merge_mode: MergeMode,
}

impl FetchRequest {
    pub fn new(
        username: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        data_source: DataSource,
        merge_mode: MergeMode,
    ) -> Self {
        Self {
            username: username.into(),
            start_date,
            end_date,
            data_source,
            merge_mode,
        }
    }

    /// Reject ranges whose start lies after their end.
    pub fn validate(&self) -> Result<()> {
        if self.start_date > self.end_date {
            return Err(DashboardError::InvalidRange {
                start: self.start_date.to_string(),
                end: self.end_date.to_string(),
            });
        }
        Ok(())
    }
}

// ── Current stats & verification ──────────────────────────────────────────────

/// Latest ratings and game totals for a user, as served by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentStats {
    pub username: String,
    #[serde(default)]
    pub rapid_rating: Option<i32>,
    #[serde(default)]
    pub blitz_rating: Option<i32>,
    #[serde(default)]
    pub bullet_rating: Option<i32>,
    #[serde(default)]
    pub puzzle_rating: Option<i32>,
    #[serde(default)]
    pub total_games: Option<u32>,
    #[serde(default)]
    pub wins: Option<u32>,
    #[serde(default)]
    pub losses: Option<u32>,
    #[serde(default)]
    pub draws: Option<u32>,
    /// Date the backend last refreshed these figures.
    #[serde(default)]
    pub last_updated: Option<String>,
}

/// Result of asking the backend whether a Chess.com user exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserVerification {
    pub exists: bool,
    #[serde(default)]
    pub username: Option<String>,
    /// Account creation time in epoch seconds.
    #[serde(default)]
    pub joined_timestamp: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

impl UserVerification {
    /// Calendar day the account was created, when known.
    pub fn joined_date(&self) -> Option<NaiveDate> {
        self.joined_timestamp
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            .map(|dt| dt.date_naive())
    }
}

// ── Snapshot ──────────────────────────────────────────────────────────────────

/// A precomputed static data set used for instant display before any
/// network round-trip completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotData {
    pub stats: CurrentStats,
    /// Historical daily ratings, sorted ascending by date.
    pub historical_data: Vec<DailyRating>,
    /// Generation time in epoch milliseconds.
    pub generated_at: i64,
}

// ── Username validation ───────────────────────────────────────────────────────

/// Trim `raw` and check it against the Chess.com username rules
/// (3–25 characters of letters, digits, `_` or `-`).
pub fn validate_username(raw: &str) -> Result<String> {
    let re = Regex::new(r"^[A-Za-z0-9_-]{3,25}$").expect("regex is valid");
    let trimmed = raw.trim();
    if re.is_match(trimmed) {
        Ok(trimmed.to_string())
    } else {
        Err(DashboardError::InvalidUsername(raw.to_string()))
    }
}
