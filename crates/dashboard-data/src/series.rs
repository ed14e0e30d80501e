//! Day-by-day rating series for the chart layer.
//!
//! Charts expect one label per calendar day with aligned values per game
//! mode, so days without a record (or with a zero rating) become `None`
//! gaps rather than being skipped.

use std::collections::HashMap;

use chrono::NaiveDate;
use dashboard_core::models::DailyRating;

/// Game modes tracked in the daily history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameMode {
    Rapid,
    Blitz,
    Bullet,
}

impl GameMode {
    pub const ALL: [GameMode; 3] = [GameMode::Rapid, GameMode::Blitz, GameMode::Bullet];

    pub fn label(&self) -> &'static str {
        match self {
            GameMode::Rapid => "Rapid",
            GameMode::Blitz => "Blitz",
            GameMode::Bullet => "Bullet",
        }
    }

    fn rating(&self, record: &DailyRating) -> Option<i32> {
        let value = match self {
            GameMode::Rapid => record.rapid_rating,
            GameMode::Blitz => record.blitz_rating,
            GameMode::Bullet => record.bullet_rating,
        };
        value.filter(|r| *r != 0)
    }
}

/// Latest and peak rating of one mode over a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeSummary {
    pub mode: GameMode,
    pub latest: Option<i32>,
    pub peak: Option<i32>,
}

/// Dense daily series over an inclusive date range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatingSeries {
    /// One `YYYY-MM-DD` label per day.
    pub labels: Vec<String>,
    pub rapid: Vec<Option<i32>>,
    pub blitz: Vec<Option<i32>>,
    pub bullet: Vec<Option<i32>>,
}

impl RatingSeries {
    /// Build the series for `[start, end]`; empty when `start > end`.
    pub fn build(records: &[DailyRating], start: NaiveDate, end: NaiveDate) -> Self {
        let by_date: HashMap<NaiveDate, &DailyRating> =
            records.iter().map(|r| (r.date, r)).collect();

        let mut series = RatingSeries {
            labels: Vec::new(),
            rapid: Vec::new(),
            blitz: Vec::new(),
            bullet: Vec::new(),
        };

        for day in start.iter_days().take_while(|d| *d <= end) {
            let record = by_date.get(&day).copied();
            series.labels.push(day.format("%Y-%m-%d").to_string());
            series.rapid.push(record.and_then(|r| GameMode::Rapid.rating(r)));
            series.blitz.push(record.and_then(|r| GameMode::Blitz.rating(r)));
            series.bullet.push(record.and_then(|r| GameMode::Bullet.rating(r)));
        }

        series
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn values(&self, mode: GameMode) -> &[Option<i32>] {
        match mode {
            GameMode::Rapid => &self.rapid,
            GameMode::Blitz => &self.blitz,
            GameMode::Bullet => &self.bullet,
        }
    }

    /// Days on which any mode has a rating.
    pub fn days_with_games(&self) -> usize {
        (0..self.len())
            .filter(|&i| self.rapid[i].is_some() || self.blitz[i].is_some() || self.bullet[i].is_some())
            .count()
    }

    /// Latest and peak rating for each mode.
    pub fn summary(&self) -> Vec<ModeSummary> {
        GameMode::ALL
            .iter()
            .map(|&mode| {
                let values = self.values(mode);
                ModeSummary {
                    mode,
                    latest: values.iter().rev().find_map(|v| *v),
                    peak: values.iter().filter_map(|v| *v).max(),
                }
            })
            .collect()
    }
}
