//! Single-month history fetch with bounded retry.
//!
//! [`MonthFetcher::fetch`] selects the endpoint purely from the
//! [`DataSource`], retries transient failures up to `max_retries` attempts in
//! total, and waits `base_backoff * 2^(k-1)` between attempt *k* and *k+1*
//! (500 ms, 1000 ms, 2000 ms ... with the default base). There is no jitter.
//! The fetcher never touches a cache.

use std::sync::Arc;
use std::time::Duration;

use dashboard_core::models::{DailyRating, DataSource, MonthKey};
use thiserror::Error;
use tracing::{debug, warn};

use crate::client::ApiError;
use crate::source::HistorySource;

/// Attempts per month when the caller does not say otherwise.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Wait before the first retry; doubles for each later retry.
pub const DEFAULT_BASE_BACKOFF: Duration = Duration::from_millis(500);

// ── MonthFetchError ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum MonthFetchError {
    /// Every attempt failed; `cause` is the last error observed.
    #[error("failed to fetch {year}-{month:02} after {attempts} attempts: {cause}")]
    MonthFetchFailed {
        year: i32,
        month: u32,
        attempts: u32,
        #[source]
        cause: ApiError,
    },

    /// `max_retries` of zero allows no attempt at all.
    #[error("max_retries must be at least 1")]
    NoAttempts,
}

// ── MonthFetcher ──────────────────────────────────────────────────────────────

/// Stateless fetcher for one calendar month of daily ratings.
#[derive(Clone)]
pub struct MonthFetcher {
    source: Arc<dyn HistorySource>,
    base_backoff: Duration,
}

impl MonthFetcher {
    pub fn new(source: Arc<dyn HistorySource>) -> Self {
        Self {
            source,
            base_backoff: DEFAULT_BASE_BACKOFF,
        }
    }

    /// Override the first retry delay.
    pub fn with_base_backoff(mut self, base_backoff: Duration) -> Self {
        self.base_backoff = base_backoff;
        self
    }

    /// Delay after failed attempt `attempt` (1-based) before the next one.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_backoff.saturating_mul(factor)
    }

    /// Fetch `month` for `username` from `data_source`.
    ///
    /// Makes at most `max_retries` calls to the source. Returns the first
    /// successful result, or [`MonthFetchError::MonthFetchFailed`] carrying
    /// the last cause once all attempts are exhausted.
    pub async fn fetch(
        &self,
        username: &str,
        month: MonthKey,
        data_source: DataSource,
        max_retries: u32,
    ) -> Result<Vec<DailyRating>, MonthFetchError> {
        if max_retries == 0 {
            return Err(MonthFetchError::NoAttempts);
        }

        let mut attempt = 1;
        loop {
            match self.fetch_once(username, month, data_source).await {
                Ok(ratings) => {
                    debug!(%month, %data_source, attempt, records = ratings.len(), "month fetched");
                    return Ok(ratings);
                }
                Err(cause) => {
                    warn!(
                        %month,
                        attempt,
                        max_retries,
                        error = %cause,
                        "month fetch attempt failed"
                    );
                    if attempt >= max_retries {
                        return Err(MonthFetchError::MonthFetchFailed {
                            year: month.year(),
                            month: month.month(),
                            attempts: attempt,
                            cause,
                        });
                    }
                    tokio::time::sleep(self.backoff_delay(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn fetch_once(
        &self,
        username: &str,
        month: MonthKey,
        data_source: DataSource,
    ) -> Result<Vec<DailyRating>, ApiError> {
        match data_source {
            DataSource::DatabaseRead => self.source.month_history(username, month).await,
            DataSource::DatabaseRefresh => {
                self.source.refresh_month_history(username, month).await
            }
            DataSource::GuestDirect => self.source.guest_month_history(username, month).await,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
