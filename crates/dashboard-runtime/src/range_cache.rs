//! Month-granular cache of daily ratings for the active user.
//!
//! [`RangeCache`] holds a date-sorted, de-duplicated list of
//! [`DailyRating`]s together with the [`CoveredRange`] of whole months it
//! guarantees to be populated. Inside that range a missing day means "no
//! games that day", never "not fetched". Writes are whole-sale
//! ([`RangeCache::replace`]) or incremental from a boundary month onward
//! ([`RangeCache::merge_from`]); there is no field-level merging.

use chrono::NaiveDate;
use dashboard_core::models::{CoveredRange, DailyRating, MonthKey};
use tracing::debug;

// ── RangeCache ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeCache {
    /// Ascending by date, no duplicate dates.
    records: Vec<DailyRating>,
    /// Months guaranteed fully populated; `None` when empty.
    covered: Option<CoveredRange>,
}

impl RangeCache {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Queries ───────────────────────────────────────────────────────────

    /// `true` when `[start, end]` lies within the covered months and the
    /// cache holds at least one record. An empty cache is never covered.
    pub fn is_covered(&self, start: NaiveDate, end: NaiveDate) -> bool {
        match self.covered {
            Some(range) if !self.records.is_empty() => range.contains(start, end),
            _ => false,
        }
    }

    /// Records dated within `[start, end]`, or `None` if the range is not
    /// covered.
    pub fn slice(&self, start: NaiveDate, end: NaiveDate) -> Option<Vec<DailyRating>> {
        if !self.is_covered(start, end) {
            return None;
        }
        let from = self.records.partition_point(|r| r.date < start);
        let to = self.records.partition_point(|r| r.date <= end);
        Some(self.records[from..to.max(from)].to_vec())
    }

    /// Month of the most recent record, independent of the covered range.
    pub fn last_covered_month(&self) -> Option<MonthKey> {
        self.records.last().map(|r| MonthKey::of(r.date))
    }

    pub fn records(&self) -> &[DailyRating] {
        &self.records
    }

    pub fn covered_range(&self) -> Option<CoveredRange> {
        self.covered
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    // ── Mutations ─────────────────────────────────────────────────────────

    /// Discard everything and store `records` as covering the months of
    /// `[start, end]`.
    pub fn replace(&mut self, records: Vec<DailyRating>, start: NaiveDate, end: NaiveDate) {
        self.records = normalize(records);
        self.covered = Some(CoveredRange::from_dates(start, end));
        debug!(records = self.records.len(), %start, %end, "cache replaced");
    }

    /// Keep records dated before `overwrite_from`, append `new_records`, and
    /// mark `[full_start, full_end]` as covered.
    ///
    /// Everything from the first day of `overwrite_from` onward is taken from
    /// `new_records` alone, even days the cache already held.
    pub fn merge_from(
        &mut self,
        new_records: Vec<DailyRating>,
        full_start: NaiveDate,
        full_end: NaiveDate,
        overwrite_from: MonthKey,
    ) {
        let cutoff = overwrite_from.first_day();
        let mut merged: Vec<DailyRating> = self
            .records
            .drain(..)
            .take_while(|r| r.date < cutoff)
            .collect();
        let kept = merged.len();
        merged.extend(new_records);

        self.records = normalize(merged);
        self.covered = Some(CoveredRange::from_dates(full_start, full_end));
        debug!(
            kept,
            total = self.records.len(),
            %overwrite_from,
            "cache merged"
        );
    }

    /// Populate from snapshot history, covering the months of its earliest
    /// and latest records. An empty list clears the cache.
    pub fn populate_from_snapshot(&mut self, records: Vec<DailyRating>) {
        let records = normalize(records);
        match (records.first(), records.last()) {
            (Some(first), Some(last)) => {
                let (start, end) = (first.date, last.date);
                self.records = records;
                self.covered = Some(CoveredRange::from_dates(start, end));
                debug!(records = self.records.len(), %start, %end, "cache populated from snapshot");
            }
            _ => self.clear(),
        }
    }

    /// Reset to the empty state.
    pub fn clear(&mut self) {
        self.records.clear();
        self.covered = None;
        debug!("cache cleared");
    }
}

/// Sort by date and drop duplicate dates, keeping the last occurrence.
fn normalize(mut records: Vec<DailyRating>) -> Vec<DailyRating> {
    // Stable sort keeps insertion order among equal dates.
    records.sort_by_key(|r| r.date);
    let mut out: Vec<DailyRating> = Vec::with_capacity(records.len());
    for record in records {
        match out.last_mut() {
            Some(prev) if prev.date == record.date => *prev = record,
            _ => out.push(record),
        }
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
