//! Dashboard session state.
//!
//! [`DashboardSession`] owns the [`RangeCache`] and everything the dashboard
//! needs to decide what to show: which user is active, whether the backend
//! answered its last health check, whether the data on screen came from a
//! static snapshot, and the current stats. It drives the
//! [`RangeFetchOrchestrator`] for range loads and applies the failure
//! threshold to its results.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use dashboard_core::error::DashboardError;
use dashboard_core::models::{
    validate_username, CurrentStats, DailyRating, DataSource, FetchRequest, MergeMode,
};
use dashboard_core::time_utils::{today_in, TimeRange};
use dashboard_data::client::{ApiClient, ApiError};
use dashboard_data::health::{ServerHealthProbe, DEFAULT_HEALTH_TIMEOUT};
use dashboard_data::snapshot::{SnapshotLoader, SnapshotSource};
use dashboard_data::source::{HistorySource, StatsSource};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::orchestrator::{FetchOutcome, FetchReport, RangeFetchOrchestrator};
use crate::range_cache::RangeCache;

// ── Public types ──────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SessionError {
    /// The requested Chess.com user does not exist.
    #[error("user verification failed: {0}")]
    Verification(String),

    /// The backend is unreachable and nothing cached covers the request.
    #[error("server is offline and no cached data covers the request")]
    Offline,

    /// Every month of the range failed and no records were produced.
    #[error("no data could be loaded: all {0} months failed")]
    NoData(usize),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Dashboard(#[from] DashboardError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Whose data the session shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserMode {
    /// The configured user, whose history the backend stores.
    Stored,
    /// Any Chess.com user, fetched live and never persisted.
    Guest {
        username: String,
        joined: Option<NaiveDate>,
    },
}

/// Where the data on screen comes from, as shown in the status banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataStatus {
    /// Health check not finished yet.
    Checking,
    /// Backend down, showing the snapshot.
    OfflineSnapshot,
    /// Backend up, still showing the snapshot.
    OnlineSnapshot,
    /// Showing data loaded from the backend.
    Live,
    /// Backend down and no snapshot.
    Offline,
}

impl DataStatus {
    pub fn label(&self) -> &'static str {
        match self {
            DataStatus::Checking => "Checking server...",
            DataStatus::OfflineSnapshot => "Server offline - showing snapshot data",
            DataStatus::OnlineSnapshot => "Server online - showing snapshot data",
            DataStatus::Live => "Live data",
            DataStatus::Offline => "Server offline",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub stored_username: String,
    /// Start of the "all" range for the stored user.
    pub stored_join_date: NaiveDate,
    pub snapshot: Option<SnapshotSource>,
    pub health_timeout: Duration,
    /// IANA name used to decide what "today" is.
    pub timezone: String,
}

impl SessionConfig {
    pub fn new(stored_username: impl Into<String>, stored_join_date: NaiveDate) -> Self {
        Self {
            stored_username: stored_username.into(),
            stored_join_date,
            snapshot: None,
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
            timezone: "UTC".to_string(),
        }
    }
}

/// Records for one resolved range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeView {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub records: Vec<DailyRating>,
    pub report: FetchReport,
}

impl RangeView {
    /// Some months failed but the rest loaded.
    pub fn is_partial(&self) -> bool {
        self.report.has_failures()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeLoad {
    Loaded(RangeView),
    Cancelled,
}

// ── DashboardSession ──────────────────────────────────────────────────────────

pub struct DashboardSession {
    config: SessionConfig,
    stats_source: Arc<dyn StatsSource>,
    probe: ServerHealthProbe,
    orchestrator: RangeFetchOrchestrator,
    snapshot_loader: Option<SnapshotLoader>,
    cache: RangeCache,
    mode: UserMode,
    stats: Option<CurrentStats>,
    /// `None` until the first health check completes.
    online: Option<bool>,
    using_snapshot: bool,
    snapshot_generated_at: Option<i64>,
    cancel: CancellationToken,
}

impl DashboardSession {
    /// Session backed by the HTTP client; URL snapshots share its connection pool.
    pub fn new(config: SessionConfig, client: Arc<ApiClient>) -> Self {
        let http = client.http().clone();
        let snapshot_loader = config
            .snapshot
            .clone()
            .map(|source| SnapshotLoader::with_client(source, http));
        let mut session = Self::with_sources(config, client.clone(), client);
        session.snapshot_loader = snapshot_loader;
        session
    }

    pub fn with_sources(
        config: SessionConfig,
        history: Arc<dyn HistorySource>,
        stats: Arc<dyn StatsSource>,
    ) -> Self {
        let snapshot_loader = config.snapshot.clone().map(SnapshotLoader::new);
        Self::with_orchestrator(config, RangeFetchOrchestrator::new(history), stats, snapshot_loader)
    }

    fn with_orchestrator(
        config: SessionConfig,
        orchestrator: RangeFetchOrchestrator,
        stats_source: Arc<dyn StatsSource>,
        snapshot_loader: Option<SnapshotLoader>,
    ) -> Self {
        Self {
            config,
            probe: ServerHealthProbe::new(stats_source.clone()),
            stats_source,
            orchestrator,
            snapshot_loader,
            cache: RangeCache::new(),
            mode: UserMode::Stored,
            stats: None,
            online: None,
            using_snapshot: false,
            snapshot_generated_at: None,
            cancel: CancellationToken::new(),
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    pub fn mode(&self) -> &UserMode {
        &self.mode
    }

    pub fn username(&self) -> &str {
        match &self.mode {
            UserMode::Stored => &self.config.stored_username,
            UserMode::Guest { username, .. } => username,
        }
    }

    pub fn is_guest(&self) -> bool {
        matches!(self.mode, UserMode::Guest { .. })
    }

    pub fn stats(&self) -> Option<&CurrentStats> {
        self.stats.as_ref()
    }

    pub fn cache(&self) -> &RangeCache {
        &self.cache
    }

    pub fn orchestrator(&self) -> &RangeFetchOrchestrator {
        &self.orchestrator
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn using_snapshot(&self) -> bool {
        self.using_snapshot
    }

    /// Generation time of the snapshot on screen, in epoch milliseconds.
    pub fn snapshot_generated_at(&self) -> Option<i64> {
        self.snapshot_generated_at.filter(|_| self.using_snapshot)
    }

    pub fn status(&self) -> DataStatus {
        match (self.online, self.using_snapshot) {
            (None, _) => DataStatus::Checking,
            (Some(false), true) => DataStatus::OfflineSnapshot,
            (Some(false), false) => DataStatus::Offline,
            (Some(true), true) => DataStatus::OnlineSnapshot,
            (Some(true), false) => DataStatus::Live,
        }
    }

    /// Token for the next or in-flight range load. Cancelling it stops that
    /// load; the session hands out a fresh token afterwards.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────

    /// Show the snapshot (stored user only), probe the backend, and refresh
    /// current stats when it is online.
    pub async fn start(&mut self) -> DataStatus {
        self.online = None;

        if self.mode == UserMode::Stored {
            self.load_snapshot().await;
        }

        if self.check_server().await {
            match self.fetch_stats(false).await {
                Ok(stats) => self.stats = Some(stats),
                Err(e) => warn!(error = %e, "failed to refresh current stats"),
            }
        }

        let status = self.status();
        info!(username = self.username(), status = ?status, "session started");
        status
    }

    /// Probe the backend once and remember the answer.
    pub async fn check_server(&mut self) -> bool {
        let online = self.probe.check(self.config.health_timeout).await;
        self.online = Some(online);
        online
    }

    async fn load_snapshot(&mut self) {
        let Some(loader) = &self.snapshot_loader else {
            return;
        };
        let Some(snapshot) = loader.load().await else {
            return;
        };

        self.cache.populate_from_snapshot(snapshot.historical_data);
        self.stats = Some(snapshot.stats);
        self.snapshot_generated_at = Some(snapshot.generated_at);
        self.using_snapshot = true;
    }

    /// Verify `raw_username` with the backend and switch to it.
    ///
    /// The cache is cleared only after verification succeeds, so a failed
    /// switch leaves the current user untouched.
    pub async fn switch_to_guest(&mut self, raw_username: &str) -> Result<(), SessionError> {
        let username = validate_username(raw_username)?;

        let verification = self.stats_source.verify_user(&username).await?;
        if !verification.exists {
            let message = verification
                .message
                .unwrap_or_else(|| format!("user '{username}' not found"));
            return Err(SessionError::Verification(message));
        }

        let username = verification.username.clone().unwrap_or(username);
        info!(%username, "switching to guest user");

        self.cancel_in_flight();
        self.cache.clear();
        self.using_snapshot = false;
        self.snapshot_generated_at = None;
        self.mode = UserMode::Guest {
            username,
            joined: verification.joined_date(),
        };

        self.stats = match self.fetch_stats(false).await {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!(error = %e, "failed to load guest stats");
                None
            }
        };
        Ok(())
    }

    /// Return to the stored user and start over.
    pub async fn switch_to_stored(&mut self) -> DataStatus {
        info!("switching to stored user");
        self.cancel_in_flight();
        self.cache.clear();
        self.mode = UserMode::Stored;
        self.stats = None;
        self.using_snapshot = false;
        self.snapshot_generated_at = None;
        self.start().await
    }

    // ── Range loading ─────────────────────────────────────────────────────

    /// Join date bounding the "all" range for the active user.
    pub fn join_date(&self) -> NaiveDate {
        match &self.mode {
            UserMode::Guest {
                joined: Some(joined),
                ..
            } => *joined,
            _ => self.config.stored_join_date,
        }
    }

    /// Resolve `range` against today in the configured timezone.
    pub fn resolve_range(&self, range: &TimeRange) -> (NaiveDate, NaiveDate) {
        range.resolve(today_in(&self.config.timezone), self.join_date())
    }

    /// Load `range` for the active user.
    ///
    /// `refresh` asks the backend to pull fresh data from Chess.com (stored
    /// user) or bypasses the cache (guest). When the backend is known to be
    /// offline, a covered range is served from the cache instead.
    pub async fn load_range(
        &mut self,
        range: &TimeRange,
        refresh: bool,
    ) -> Result<RangeLoad, SessionError> {
        let (start, end) = self.resolve_range(range);
        self.load_dates(start, end, refresh).await
    }

    /// Load an explicit `[start, end]` date range.
    pub async fn load_dates(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
        refresh: bool,
    ) -> Result<RangeLoad, SessionError> {
        if start > end {
            return Err(SessionError::InvalidRequest(format!(
                "start {start} is after end {end}"
            )));
        }

        if self.online == Some(false) {
            return match self.cache.slice(start, end) {
                Some(records) => {
                    debug!(%start, %end, "server offline; serving cached range");
                    Ok(RangeLoad::Loaded(RangeView {
                        start,
                        end,
                        records,
                        report: FetchReport {
                            from_cache: true,
                            ..FetchReport::default()
                        },
                    }))
                }
                None => Err(SessionError::Offline),
            };
        }

        let request = self.build_request(start, end, refresh);
        if refresh && self.is_guest() {
            self.cache.clear();
        }
        info!(
            username = %request.username,
            %start,
            %end,
            loading = request.data_source.loading_message(),
            "loading range"
        );

        let cancel = self.cancel.clone();
        let outcome = self.orchestrator.run(&request, &mut self.cache, &cancel).await;

        match outcome {
            FetchOutcome::Completed { records, report } => {
                if report.all_failed() && records.is_empty() {
                    return Err(SessionError::NoData(report.months_requested));
                }
                if !report.from_cache {
                    self.using_snapshot = false;
                }
                if report.has_failures() {
                    warn!(
                        failed = report.failed_months.len(),
                        requested = report.months_requested,
                        "range loaded with missing months"
                    );
                }
                Ok(RangeLoad::Loaded(RangeView {
                    start,
                    end,
                    records,
                    report,
                }))
            }
            FetchOutcome::Cancelled => {
                self.cancel = CancellationToken::new();
                Ok(RangeLoad::Cancelled)
            }
            FetchOutcome::Failed(reason) => Err(SessionError::InvalidRequest(reason)),
        }
    }

    fn build_request(&self, start: NaiveDate, end: NaiveDate, refresh: bool) -> FetchRequest {
        let (data_source, merge_mode) = match (&self.mode, refresh) {
            (UserMode::Guest { .. }, _) => (DataSource::GuestDirect, MergeMode::ReplaceAll),
            (UserMode::Stored, false) => (DataSource::DatabaseRead, MergeMode::MergeFromMonth),
            (UserMode::Stored, true) => (DataSource::DatabaseRefresh, MergeMode::MergeFromMonth),
        };
        FetchRequest::new(self.username(), start, end, data_source, merge_mode)
    }

    async fn fetch_stats(&self, refresh: bool) -> Result<CurrentStats, ApiError> {
        match &self.mode {
            UserMode::Guest { username, .. } => self.stats_source.guest_current_stats(username).await,
            UserMode::Stored if refresh => {
                self.stats_source
                    .refresh_stats(&self.config.stored_username)
                    .await
            }
            UserMode::Stored => {
                self.stats_source
                    .current_stats(&self.config.stored_username)
                    .await
            }
        }
    }

    /// Ask the backend to refresh current stats for the active user.
    pub async fn refresh_stats(&mut self) -> Result<&CurrentStats, SessionError> {
        let stats = self.fetch_stats(true).await?;
        Ok(self.stats.insert(stats))
    }

    fn cancel_in_flight(&mut self) {
        if !self.cancel.is_cancelled() {
            self.cancel.cancel();
        }
        self.cancel = CancellationToken::new();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
