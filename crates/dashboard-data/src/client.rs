//! HTTP client for the dashboard backend.
//!
//! All endpoints live under `{base_url}/api/chess/`. Requests use a 10 s
//! default timeout; the guest month endpoint, which proxies Chess.com live,
//! gets 30 s. Non-success responses are turned into [`ApiError::Status`],
//! carrying the backend's `{"error": "..."}` message when one is present.

use std::time::Duration;

use async_trait::async_trait;
use dashboard_core::models::{CurrentStats, DailyRating, MonthKey, UserVerification};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::source::{HistorySource, StatsSource};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for the guest month endpoint.
pub const GUEST_MONTH_TIMEOUT: Duration = Duration::from_secs(30);

// ── ApiError ──────────────────────────────────────────────────────────────────

/// Failures talking to the backend.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network failure, timeout, or client construction error.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The response body did not match the expected shape.
    #[error("unexpected response body: {0}")]
    Decode(#[source] reqwest::Error),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Status { status: 404, .. })
    }
}

/// Error body shape used by the backend controllers.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

// ── ApiClient ─────────────────────────────────────────────────────────────────

/// `reqwest`-backed implementation of [`HistorySource`] and [`StatsSource`].
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a client for the backend at `base_url` (trailing `/` ignored).
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Wrap an existing `reqwest` client.
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The underlying HTTP client, shared with the snapshot loader.
    pub fn http(&self) -> &Client {
        &self.client
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/chess/{}", self.base_url, path)
    }

    fn month_request(&self, builder: RequestBuilder, username: &str, month: MonthKey) -> RequestBuilder {
        builder.query(&[
            ("username", username.to_string()),
            ("year", month.year().to_string()),
            ("month", month.month().to_string()),
        ])
    }

    async fn send<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, ApiError> {
        let response = builder.send().await?;
        decode(response).await
    }
}

/// Turn a response into `T`, or into [`ApiError::Status`] for non-2xx codes.
pub(crate) async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();
    if !status.is_success() {
        let fallback = status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string();
        let message = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|body| body.error)
            .unwrap_or(fallback);
        return Err(ApiError::Status {
            status: status.as_u16(),
            message,
        });
    }
    response.json::<T>().await.map_err(ApiError::Decode)
}

#[async_trait]
impl HistorySource for ApiClient {
    async fn month_history(
        &self,
        username: &str,
        month: MonthKey,
    ) -> Result<Vec<DailyRating>, ApiError> {
        debug!(username, %month, "GET history/month");
        let builder = self.client.get(self.endpoint("history/month"));
        Self::send(self.month_request(builder, username, month)).await
    }

    async fn refresh_month_history(
        &self,
        username: &str,
        month: MonthKey,
    ) -> Result<Vec<DailyRating>, ApiError> {
        debug!(username, %month, "POST history/refresh");
        let builder = self.client.post(self.endpoint("history/refresh"));
        Self::send(self.month_request(builder, username, month)).await
    }

    async fn guest_month_history(
        &self,
        username: &str,
        month: MonthKey,
    ) -> Result<Vec<DailyRating>, ApiError> {
        debug!(username, %month, "GET history/guest-month");
        let builder = self
            .client
            .get(self.endpoint("history/guest-month"))
            .timeout(GUEST_MONTH_TIMEOUT);
        Self::send(self.month_request(builder, username, month)).await
    }
}

#[async_trait]
impl StatsSource for ApiClient {
    async fn health(&self, timeout: Duration) -> Result<(), ApiError> {
        let response = self
            .client
            .get(self.endpoint("stats/health"))
            .timeout(timeout)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ApiError::Status {
                status: status.as_u16(),
                message: "health check failed".to_string(),
            })
        }
    }

    async fn verify_user(&self, username: &str) -> Result<UserVerification, ApiError> {
        let builder = self
            .client
            .get(self.endpoint("stats/verify"))
            .query(&[("username", username)]);
        Self::send(builder).await
    }

    async fn guest_current_stats(&self, username: &str) -> Result<CurrentStats, ApiError> {
        let builder = self
            .client
            .get(self.endpoint("stats/guest-current"))
            .query(&[("username", username)]);
        Self::send(builder).await
    }

    /// Falls back to a refresh when the backend has no stats stored yet.
    async fn current_stats(&self, username: &str) -> Result<CurrentStats, ApiError> {
        let builder = self
            .client
            .get(self.endpoint("stats/current"))
            .query(&[("username", username)]);
        match Self::send(builder).await {
            Err(e) if e.is_not_found() => {
                debug!(username, "no stored stats; requesting refresh");
                self.refresh_stats(username).await
            }
            other => other,
        }
    }

    async fn refresh_stats(&self, username: &str) -> Result<CurrentStats, ApiError> {
        let builder = self
            .client
            .post(self.endpoint("stats/refresh"))
            .query(&[("username", username)]);
        Self::send(builder).await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
