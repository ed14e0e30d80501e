//! Range fetch orchestration.
//!
//! [`RangeFetchOrchestrator::run`] turns a [`FetchRequest`] into a sequence
//! of month fetches, writes the result back into a [`RangeCache`], and
//! publishes its phase and progress on `watch` channels so a renderer can
//! follow along without sharing mutable state.
//!
//! Phases move `Idle → Planning → Fetching → (Merging | Cancelled | Failed)`
//! and always return to `Idle` when the run ends.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use dashboard_core::models::{DailyRating, FetchRequest, MergeMode, MonthKey};
use dashboard_core::time_utils::months_between;
use dashboard_data::month_fetcher::{MonthFetcher, DEFAULT_MAX_RETRIES};
use dashboard_data::source::HistorySource;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::range_cache::RangeCache;

/// Pause between consecutive month requests.
pub const MONTH_PACING: Duration = Duration::from_millis(300);

/// Attempts per month.
pub const MONTH_MAX_RETRIES: u32 = DEFAULT_MAX_RETRIES;

// ── Public types ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPhase {
    Idle,
    Planning,
    Fetching,
    Merging,
    Cancelled,
    Failed,
}

/// Position of a running fetch, published before each month's request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchProgress {
    /// 1-based index of the month being fetched.
    pub current: usize,
    pub total: usize,
    pub current_month: MonthKey,
}

impl FetchProgress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.current as f64 / self.total as f64 * 100.0
    }
}

/// What a completed run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub months_requested: usize,
    pub months_succeeded: usize,
    /// Months whose every attempt failed, in fetch order.
    pub failed_months: Vec<MonthKey>,
    /// Served from the cache without any network request.
    pub from_cache: bool,
}

impl FetchReport {
    fn cached() -> Self {
        Self {
            from_cache: true,
            ..Self::default()
        }
    }

    /// At least one month was requested and none succeeded.
    pub fn all_failed(&self) -> bool {
        self.months_requested > 0 && self.months_succeeded == 0
    }

    pub fn has_failures(&self) -> bool {
        !self.failed_months.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Records for the requested range, sorted by date.
    Completed {
        records: Vec<DailyRating>,
        report: FetchReport,
    },
    /// Cancelled before completion; the cache was left untouched.
    Cancelled,
    /// The request itself was invalid; nothing was fetched.
    Failed(String),
}

/// How a run will reach its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Plan {
    /// Serve the cached slice.
    FromCache,
    /// Fetch from `fetch_from` to the requested end, then merge from
    /// `overwrite_from` when set, or replace otherwise.
    Fetch {
        fetch_from: NaiveDate,
        overwrite_from: Option<MonthKey>,
    },
}

// ── RangeFetchOrchestrator ────────────────────────────────────────────────────

/// Drives one range fetch at a time. Holds no cache of its own.
pub struct RangeFetchOrchestrator {
    fetcher: MonthFetcher,
    pacing: Duration,
    max_retries: u32,
    phase_tx: watch::Sender<FetchPhase>,
    progress_tx: watch::Sender<Option<FetchProgress>>,
}

impl RangeFetchOrchestrator {
    pub fn new(source: Arc<dyn HistorySource>) -> Self {
        Self::with_fetcher(MonthFetcher::new(source))
    }

    pub fn with_fetcher(fetcher: MonthFetcher) -> Self {
        let (phase_tx, _) = watch::channel(FetchPhase::Idle);
        let (progress_tx, _) = watch::channel(None);
        Self {
            fetcher,
            pacing: MONTH_PACING,
            max_retries: MONTH_MAX_RETRIES,
            phase_tx,
            progress_tx,
        }
    }

    /// Override the pause between month requests.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<FetchPhase> {
        self.phase_tx.subscribe()
    }

    /// `None` whenever no month request is pending.
    pub fn subscribe_progress(&self) -> watch::Receiver<Option<FetchProgress>> {
        self.progress_tx.subscribe()
    }

    pub fn phase(&self) -> FetchPhase {
        *self.phase_tx.borrow()
    }

    /// Run `request` against `cache`.
    ///
    /// The cache is only written once every month has been attempted; a
    /// cancelled run leaves it exactly as it was. Months that fail after all
    /// retries are skipped and listed in the report.
    pub async fn run(
        &self,
        request: &FetchRequest,
        cache: &mut RangeCache,
        cancel: &CancellationToken,
    ) -> FetchOutcome {
        let outcome = self.run_inner(request, cache, cancel).await;
        self.progress_tx.send_replace(None);
        self.phase_tx.send_replace(FetchPhase::Idle);
        outcome
    }

    async fn run_inner(
        &self,
        request: &FetchRequest,
        cache: &mut RangeCache,
        cancel: &CancellationToken,
    ) -> FetchOutcome {
        self.set_phase(FetchPhase::Planning);

        if let Err(e) = request.validate() {
            warn!(error = %e, "rejecting fetch request");
            self.set_phase(FetchPhase::Failed);
            return FetchOutcome::Failed(e.to_string());
        }

        let (start, end) = (request.start_date, request.end_date);
        let (fetch_from, overwrite_from) = match plan(request, cache) {
            Plan::FromCache => {
                if let Some(records) = cache.slice(start, end) {
                    debug!(%start, %end, records = records.len(), "range served from cache");
                    return FetchOutcome::Completed {
                        records,
                        report: FetchReport::cached(),
                    };
                }
                // Unreachable in practice: planning only picks the cache when covered.
                (start, None)
            }
            Plan::Fetch {
                fetch_from,
                overwrite_from,
            } => (fetch_from, overwrite_from),
        };

        let months = months_between(fetch_from, end);
        info!(
            username = %request.username,
            source = %request.data_source,
            %fetch_from,
            %end,
            months = months.len(),
            merge = overwrite_from.is_some(),
            "starting range fetch"
        );

        self.set_phase(FetchPhase::Fetching);
        let mut accumulated: Vec<DailyRating> = Vec::new();
        let mut report = FetchReport {
            months_requested: months.len(),
            ..FetchReport::default()
        };

        for (index, &month) in months.iter().enumerate() {
            if cancel.is_cancelled() {
                return self.cancelled(month);
            }

            if index > 0 {
                tokio::select! {
                    _ = cancel.cancelled() => return self.cancelled(month),
                    _ = tokio::time::sleep(self.pacing) => {}
                }
                // A cancel racing the pacing timer still wins.
                if cancel.is_cancelled() {
                    return self.cancelled(month);
                }
            }

            self.progress_tx.send_replace(Some(FetchProgress {
                current: index + 1,
                total: months.len(),
                current_month: month,
            }));

            match self
                .fetcher
                .fetch(&request.username, month, request.data_source, self.max_retries)
                .await
            {
                Ok(records) => {
                    report.months_succeeded += 1;
                    accumulated.extend(records);
                }
                Err(e) => {
                    warn!(%month, error = %e, "skipping month");
                    report.failed_months.push(month);
                }
            }
        }

        // The last request may have finished after a cancel; drop its result.
        if cancel.is_cancelled() {
            let last = months.last().copied().unwrap_or_else(|| MonthKey::of(end));
            return self.cancelled(last);
        }

        self.progress_tx.send_replace(None);
        self.set_phase(FetchPhase::Merging);

        let records = match overwrite_from {
            Some(boundary) => {
                cache.merge_from(accumulated.clone(), start, end, boundary);
                match cache.slice(start, end) {
                    Some(merged) if !merged.is_empty() => merged,
                    _ => sorted(accumulated),
                }
            }
            None => {
                cache.replace(accumulated.clone(), start, end);
                sorted(accumulated)
            }
        };

        info!(
            records = records.len(),
            succeeded = report.months_succeeded,
            failed = report.failed_months.len(),
            "range fetch complete"
        );
        FetchOutcome::Completed { records, report }
    }

    fn set_phase(&self, phase: FetchPhase) {
        self.phase_tx.send_replace(phase);
    }

    fn cancelled(&self, at: MonthKey) -> FetchOutcome {
        info!(month = %at, "range fetch cancelled");
        self.progress_tx.send_replace(None);
        self.set_phase(FetchPhase::Cancelled);
        FetchOutcome::Cancelled
    }
}

/// Decide how `request` is served given what `cache` holds.
fn plan(request: &FetchRequest, cache: &RangeCache) -> Plan {
    let (start, end) = (request.start_date, request.end_date);
    let full = Plan::Fetch {
        fetch_from: start,
        overwrite_from: None,
    };

    match request.merge_mode {
        MergeMode::ReplaceAll if cache.is_covered(start, end) => Plan::FromCache,
        MergeMode::ReplaceAll => full,
        MergeMode::MergeFromMonth => match cache.last_covered_month() {
            Some(last) if last <= MonthKey::of(end) => {
                debug!(boundary = %last, "hybrid fetch from last cached month");
                Plan::Fetch {
                    fetch_from: last.first_day(),
                    overwrite_from: Some(last),
                }
            }
            // Cached data already runs past the requested end.
            Some(_) if cache.is_covered(start, end) => Plan::FromCache,
            _ => full,
        },
    }
}

fn sorted(mut records: Vec<DailyRating>) -> Vec<DailyRating> {
    records.sort_by_key(|r| r.date);
    records
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dashboard_core::models::DataSource;
    use dashboard_data::client::ApiError;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use tokio::time::Instant;

    // ── helpers ───────────────────────────────────────────────────────────

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn key(year: i32, month: u32) -> MonthKey {
        MonthKey::new(year, month).unwrap()
    }

    /// One record for every day of `month`, rapid rating = day of month.
    fn full_month(username: &str, month: MonthKey, rapid_base: i32) -> Vec<DailyRating> {
        month
            .first_day()
            .iter_days()
            .take_while(|d| *d <= month.last_day())
            .enumerate()
            .map(|(i, d)| DailyRating {
                username: username.to_string(),
                date: d,
                rapid_rating: Some(rapid_base + i as i32),
                blitz_rating: None,
                bullet_rating: None,
            })
            .collect()
    }

    /// In-memory history that can fail chosen months and cancel a token
    /// once a chosen month has been served.
    struct FakeHistory {
        failing: HashSet<MonthKey>,
        rapid_base: i32,
        cancel_after: Option<(MonthKey, CancellationToken)>,
        calls: Mutex<Vec<(MonthKey, Instant)>>,
    }

    impl FakeHistory {
        fn new() -> Self {
            Self {
                failing: HashSet::new(),
                rapid_base: 1000,
                cancel_after: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing(mut self, months: &[MonthKey]) -> Self {
            self.failing.extend(months.iter().copied());
            self
        }

        fn rapid_base(mut self, base: i32) -> Self {
            self.rapid_base = base;
            self
        }

        fn cancel_after(mut self, month: MonthKey, token: CancellationToken) -> Self {
            self.cancel_after = Some((month, token));
            self
        }

        fn months_called(&self) -> Vec<MonthKey> {
            let mut seen: Vec<MonthKey> = Vec::new();
            for (m, _) in self.calls.lock().unwrap().iter() {
                if seen.last() != Some(m) {
                    seen.push(*m);
                }
            }
            seen
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn respond(&self, username: &str, month: MonthKey) -> Result<Vec<DailyRating>, ApiError> {
            self.calls.lock().unwrap().push((month, Instant::now()));
            if let Some((at, token)) = &self.cancel_after {
                if *at == month {
                    token.cancel();
                }
            }
            if self.failing.contains(&month) {
                return Err(ApiError::Status {
                    status: 502,
                    message: "Chess.com unavailable".to_string(),
                });
            }
            Ok(full_month(username, month, self.rapid_base))
        }
    }

    #[async_trait]
    impl HistorySource for FakeHistory {
        async fn month_history(&self, u: &str, m: MonthKey) -> Result<Vec<DailyRating>, ApiError> {
            self.respond(u, m)
        }
        async fn refresh_month_history(
            &self,
            u: &str,
            m: MonthKey,
        ) -> Result<Vec<DailyRating>, ApiError> {
            self.respond(u, m)
        }
        async fn guest_month_history(
            &self,
            u: &str,
            m: MonthKey,
        ) -> Result<Vec<DailyRating>, ApiError> {
            self.respond(u, m)
        }
    }

    fn guest_request(start: &str, end: &str) -> FetchRequest {
        FetchRequest::new(
            "hikaru",
            date(start),
            date(end),
            DataSource::GuestDirect,
            MergeMode::ReplaceAll,
        )
    }

    fn stored_request(start: &str, end: &str) -> FetchRequest {
        FetchRequest::new(
            "shia_justdoit",
            date(start),
            date(end),
            DataSource::DatabaseRead,
            MergeMode::MergeFromMonth,
        )
    }

    // ── end-to-end ────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_two_month_leap_year_fetch() {
        let source = Arc::new(FakeHistory::new());
        let orchestrator = RangeFetchOrchestrator::new(source.clone());
        let mut cache = RangeCache::new();

        let outcome = orchestrator
            .run(
                &guest_request("2024-01-01", "2024-02-29"),
                &mut cache,
                &CancellationToken::new(),
            )
            .await;

        let FetchOutcome::Completed { records, report } = outcome else {
            panic!("expected completion");
        };
        assert_eq!(records.len(), 31 + 29);
        assert_eq!(report.months_requested, 2);
        assert_eq!(report.months_succeeded, 2);
        assert!(!report.from_cache);
        assert!(cache.is_covered(date("2024-01-01"), date("2024-02-29")));
        assert_eq!(source.months_called(), vec![key(2024, 1), key(2024, 2)]);
        assert_eq!(orchestrator.phase(), FetchPhase::Idle);
        assert!(orchestrator.subscribe_progress().borrow().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_28_plus_29_records_scenario() {
        /// January with 28 records, February with 29.
        struct Sparse;

        #[async_trait]
        impl HistorySource for Sparse {
            async fn month_history(&self, _: &str, _: MonthKey) -> Result<Vec<DailyRating>, ApiError> {
                unreachable!()
            }
            async fn refresh_month_history(
                &self,
                _: &str,
                _: MonthKey,
            ) -> Result<Vec<DailyRating>, ApiError> {
                unreachable!()
            }
            async fn guest_month_history(
                &self,
                u: &str,
                m: MonthKey,
            ) -> Result<Vec<DailyRating>, ApiError> {
                let mut records = full_month(u, m, 1200);
                records.truncate(if m.month() == 1 { 28 } else { 29 });
                Ok(records)
            }
        }

        let orchestrator = RangeFetchOrchestrator::new(Arc::new(Sparse));
        let mut cache = RangeCache::new();
        let outcome = orchestrator
            .run(
                &guest_request("2024-01-01", "2024-02-29"),
                &mut cache,
                &CancellationToken::new(),
            )
            .await;

        match outcome {
            FetchOutcome::Completed { records, .. } => assert_eq!(records.len(), 57),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(cache.len(), 57);
        assert!(cache.is_covered(date("2024-01-01"), date("2024-02-29")));
    }

    // ── partial failures ──────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_failed_month_is_skipped() {
        let source = Arc::new(FakeHistory::new().failing(&[key(2024, 2)]));
        let orchestrator = RangeFetchOrchestrator::new(source.clone());
        let mut cache = RangeCache::new();

        let outcome = orchestrator
            .run(
                &guest_request("2024-01-01", "2024-03-31"),
                &mut cache,
                &CancellationToken::new(),
            )
            .await;

        let FetchOutcome::Completed { records, report } = outcome else {
            panic!("expected completion");
        };
        assert_eq!(records.len(), 31 + 31);
        assert!(records
            .iter()
            .all(|r| MonthKey::of(r.date) != key(2024, 2)));
        assert_eq!(report.failed_months, vec![key(2024, 2)]);
        assert_eq!(report.months_succeeded, 2);
        assert!(report.has_failures());
        assert!(!report.all_failed());
        // three attempts for the failing month, one each for the others
        assert_eq!(source.call_count(), 1 + 3 + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_months_failing_still_completes() {
        let months = [key(2024, 1), key(2024, 2)];
        let source = Arc::new(FakeHistory::new().failing(&months));
        let orchestrator = RangeFetchOrchestrator::new(source);
        let mut cache = RangeCache::new();

        let outcome = orchestrator
            .run(
                &guest_request("2024-01-01", "2024-02-29"),
                &mut cache,
                &CancellationToken::new(),
            )
            .await;

        let FetchOutcome::Completed { records, report } = outcome else {
            panic!("expected completion");
        };
        assert!(records.is_empty());
        assert!(report.all_failed());
        assert!(cache.is_empty());
    }

    // ── cancellation ──────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_first_month_leaves_cache_untouched() {
        let token = CancellationToken::new();
        let source = Arc::new(FakeHistory::new().cancel_after(key(2024, 1), token.clone()));
        let orchestrator = RangeFetchOrchestrator::new(source.clone());

        let mut cache = RangeCache::new();
        cache.replace(
            full_month("hikaru", key(2023, 6), 900),
            date("2023-06-01"),
            date("2023-06-30"),
        );
        let before = cache.clone();

        let outcome = orchestrator
            .run(&guest_request("2024-01-01", "2024-03-31"), &mut cache, &token)
            .await;

        assert_eq!(outcome, FetchOutcome::Cancelled);
        assert_eq!(cache, before);
        assert_eq!(source.months_called(), vec![key(2024, 1)]);
        assert_eq!(orchestrator.phase(), FetchPhase::Idle);
        assert!(orchestrator.subscribe_progress().borrow().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_last_request_discards_result() {
        let token = CancellationToken::new();
        let source = Arc::new(FakeHistory::new().cancel_after(key(2024, 1), token.clone()));
        let orchestrator = RangeFetchOrchestrator::new(source);
        let mut cache = RangeCache::new();

        let outcome = orchestrator
            .run(&guest_request("2024-01-01", "2024-01-31"), &mut cache, &token)
            .await;

        assert_eq!(outcome, FetchOutcome::Cancelled);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_pacing_delay() {
        let source = Arc::new(FakeHistory::new());
        let orchestrator =
            RangeFetchOrchestrator::new(source.clone()).with_pacing(Duration::from_secs(60));
        let token = CancellationToken::new();
        let mut cache = RangeCache::new();

        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                token.cancel();
            })
        };

        let started = Instant::now();
        let outcome = orchestrator
            .run(&guest_request("2024-01-01", "2024-02-29"), &mut cache, &token)
            .await;
        canceller.await.unwrap();

        assert_eq!(outcome, FetchOutcome::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(60));
        assert_eq!(source.months_called(), vec![key(2024, 1)]);
    }

    // ── cache short-circuit ───────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_covered_guest_range_makes_no_request() {
        let source = Arc::new(FakeHistory::new());
        let orchestrator = RangeFetchOrchestrator::new(source.clone());
        let mut cache = RangeCache::new();
        cache.replace(
            full_month("hikaru", key(2024, 1), 1000),
            date("2024-01-01"),
            date("2024-01-31"),
        );

        let outcome = orchestrator
            .run(
                &guest_request("2024-01-10", "2024-01-20"),
                &mut cache,
                &CancellationToken::new(),
            )
            .await;

        let FetchOutcome::Completed { records, report } = outcome else {
            panic!("expected completion");
        };
        assert_eq!(records.len(), 11);
        assert!(report.from_cache);
        assert_eq!(source.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_uncovered_guest_range_replaces_cache() {
        let source = Arc::new(FakeHistory::new());
        let orchestrator = RangeFetchOrchestrator::new(source.clone());
        let mut cache = RangeCache::new();
        cache.replace(
            full_month("hikaru", key(2023, 1), 1000),
            date("2023-01-01"),
            date("2023-01-31"),
        );

        orchestrator
            .run(
                &guest_request("2024-01-01", "2024-01-31"),
                &mut cache,
                &CancellationToken::new(),
            )
            .await;

        assert!(!cache.is_covered(date("2023-01-01"), date("2023-01-31")));
        assert!(cache.is_covered(date("2024-01-01"), date("2024-01-31")));
    }

    // ── hybrid merge ──────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_hybrid_fetches_from_last_cached_month() {
        let source = Arc::new(FakeHistory::new().rapid_base(2000));
        let orchestrator = RangeFetchOrchestrator::new(source.clone());

        let mut cache = RangeCache::new();
        let mut seeded = full_month("shia_justdoit", key(2024, 1), 1000);
        seeded.extend(full_month("shia_justdoit", key(2024, 2), 1000));
        seeded.truncate(31 + 10); // through 2024-02-10
        cache.replace(seeded, date("2024-01-01"), date("2024-02-29"));

        let outcome = orchestrator
            .run(
                &stored_request("2024-01-01", "2024-03-15"),
                &mut cache,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(source.months_called(), vec![key(2024, 2), key(2024, 3)]);

        let FetchOutcome::Completed { records, .. } = outcome else {
            panic!("expected completion");
        };
        // January kept from cache, February refreshed in full, March up to the 15th
        assert_eq!(records.len(), 31 + 29 + 15);
        assert_eq!(records[0].rapid_rating, Some(1000));
        let feb_first = records.iter().find(|r| r.date == date("2024-02-01")).unwrap();
        assert_eq!(feb_first.rapid_rating, Some(2000));
        assert!(cache.is_covered(date("2024-01-01"), date("2024-03-31")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hybrid_with_empty_cache_fetches_full_range() {
        let source = Arc::new(FakeHistory::new());
        let orchestrator = RangeFetchOrchestrator::new(source.clone());
        let mut cache = RangeCache::new();

        orchestrator
            .run(
                &stored_request("2023-11-05", "2024-01-02"),
                &mut cache,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(
            source.months_called(),
            vec![key(2023, 11), key(2023, 12), key(2024, 1)]
        );
        assert!(cache.is_covered(date("2023-11-01"), date("2024-01-31")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hybrid_range_before_cached_data_served_from_cache() {
        let source = Arc::new(FakeHistory::new());
        let orchestrator = RangeFetchOrchestrator::new(source.clone());
        let mut cache = RangeCache::new();
        let mut seeded = full_month("shia_justdoit", key(2024, 1), 1000);
        seeded.extend(full_month("shia_justdoit", key(2024, 2), 1000));
        cache.replace(seeded, date("2024-01-01"), date("2024-02-29"));

        let outcome = orchestrator
            .run(
                &stored_request("2024-01-01", "2024-01-31"),
                &mut cache,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(source.call_count(), 0);
        match outcome {
            FetchOutcome::Completed { records, report } => {
                assert_eq!(records.len(), 31);
                assert!(report.from_cache);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(cache.len(), 31 + 29);
    }

    // ── pacing & progress ─────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_pacing_between_months() {
        let source = Arc::new(FakeHistory::new());
        let orchestrator = RangeFetchOrchestrator::new(source.clone());
        let mut cache = RangeCache::new();

        orchestrator
            .run(
                &guest_request("2024-01-01", "2024-03-31"),
                &mut cache,
                &CancellationToken::new(),
            )
            .await;

        let calls = source.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 3);
        for pair in calls.windows(2) {
            let gap = pair[1].1 - pair[0].1;
            assert!(gap >= MONTH_PACING && gap < MONTH_PACING + Duration::from_millis(50));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_published_per_month() {
        /// Reads the published progress each time a month is requested.
        #[derive(Default)]
        struct ProgressRecorder {
            progress_rx: Mutex<Option<watch::Receiver<Option<FetchProgress>>>>,
            seen: Mutex<Vec<Option<FetchProgress>>>,
        }

        impl ProgressRecorder {
            fn record(&self, username: &str, month: MonthKey) -> Result<Vec<DailyRating>, ApiError> {
                let current = self
                    .progress_rx
                    .lock()
                    .unwrap()
                    .as_ref()
                    .and_then(|rx| *rx.borrow());
                self.seen.lock().unwrap().push(current);
                Ok(full_month(username, month, 1000))
            }
        }

        #[async_trait]
        impl HistorySource for ProgressRecorder {
            async fn month_history(&self, u: &str, m: MonthKey) -> Result<Vec<DailyRating>, ApiError> {
                self.record(u, m)
            }
            async fn refresh_month_history(
                &self,
                u: &str,
                m: MonthKey,
            ) -> Result<Vec<DailyRating>, ApiError> {
                self.record(u, m)
            }
            async fn guest_month_history(
                &self,
                u: &str,
                m: MonthKey,
            ) -> Result<Vec<DailyRating>, ApiError> {
                self.record(u, m)
            }
        }

        let source = Arc::new(ProgressRecorder::default());
        let orchestrator = RangeFetchOrchestrator::new(source.clone());
        *source.progress_rx.lock().unwrap() = Some(orchestrator.subscribe_progress());

        let mut cache = RangeCache::new();
        orchestrator
            .run(
                &guest_request("2024-01-01", "2024-03-31"),
                &mut cache,
                &CancellationToken::new(),
            )
            .await;

        let seen: Vec<_> = source
            .seen
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.map(|p| (p.current, p.total, p.current_month)))
            .collect();
        assert_eq!(
            seen,
            vec![
                Some((1, 3, key(2024, 1))),
                Some((2, 3, key(2024, 2))),
                Some((3, 3, key(2024, 3))),
            ]
        );
        assert!(orchestrator.subscribe_progress().borrow().is_none());
    }

    #[tokio::test]
    async fn test_invalid_request_fails() {
        let orchestrator = RangeFetchOrchestrator::new(Arc::new(FakeHistory::new()));
        let mut cache = RangeCache::new();
        let outcome = orchestrator
            .run(
                &guest_request("2024-02-01", "2024-01-01"),
                &mut cache,
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(outcome, FetchOutcome::Failed(_)));
        assert_eq!(orchestrator.phase(), FetchPhase::Idle);
    }

    #[test]
    fn test_progress_percent() {
        let p = FetchProgress {
            current: 1,
            total: 4,
            current_month: key(2024, 1),
        };
        assert_eq!(p.percent(), 25.0);
    }
}
