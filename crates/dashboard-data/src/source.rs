//! Source traits for backend data.
//!
//! [`HistorySource`] serves one month of daily ratings per call and
//! [`StatsSource`] serves liveness, verification and current stats. The
//! HTTP client implements both; tests substitute in-memory fakes.

use std::time::Duration;

use async_trait::async_trait;
use dashboard_core::models::{CurrentStats, DailyRating, MonthKey, UserVerification};

use crate::client::ApiError;

/// One month of daily ratings from each of the three history endpoints.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Ratings already stored in the backend database.
    async fn month_history(
        &self,
        username: &str,
        month: MonthKey,
    ) -> Result<Vec<DailyRating>, ApiError>;

    /// Pull from Chess.com, persist in the backend, and return the result.
    async fn refresh_month_history(
        &self,
        username: &str,
        month: MonthKey,
    ) -> Result<Vec<DailyRating>, ApiError>;

    /// Pull from Chess.com through the backend without persisting.
    async fn guest_month_history(
        &self,
        username: &str,
        month: MonthKey,
    ) -> Result<Vec<DailyRating>, ApiError>;
}

/// Liveness, user verification and current statistics.
#[async_trait]
pub trait StatsSource: Send + Sync {
    /// A single liveness request bounded by `timeout`.
    async fn health(&self, timeout: Duration) -> Result<(), ApiError>;

    async fn verify_user(&self, username: &str) -> Result<UserVerification, ApiError>;

    /// Current stats for a user without persisted history.
    async fn guest_current_stats(&self, username: &str) -> Result<CurrentStats, ApiError>;

    /// Current stats from the backend database.
    async fn current_stats(&self, username: &str) -> Result<CurrentStats, ApiError>;

    /// Ask the backend to refresh current stats from Chess.com.
    async fn refresh_stats(&self, username: &str) -> Result<CurrentStats, ApiError>;
}
