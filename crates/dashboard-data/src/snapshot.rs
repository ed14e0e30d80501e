//! Static snapshot loading.
//!
//! A snapshot is a JSON document produced offline:
//! `{ "username"?, "currentStats", "historicalData": [...], "generatedAt" }`.
//! It gives the dashboard something to show before the backend (which may be
//! asleep) answers. A missing, unreadable or incomplete snapshot is an
//! expected condition and yields `None`, never an error.

use std::path::PathBuf;

use dashboard_core::error::DashboardError;
use dashboard_core::models::{CurrentStats, DailyRating, SnapshotData};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::client::{decode, ApiError};

/// Where the snapshot document lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotSource {
    File(PathBuf),
    Url(String),
}

impl SnapshotSource {
    /// `http://` and `https://` locations are URLs; anything else is a path.
    pub fn parse(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            SnapshotSource::Url(location.to_string())
        } else {
            SnapshotSource::File(PathBuf::from(location))
        }
    }
}

/// Why a snapshot document could not be read.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Local file unreadable or not valid JSON.
    #[error(transparent)]
    Local(#[from] DashboardError),

    #[error(transparent)]
    Remote(#[from] ApiError),
}

/// Wire shape of the snapshot document.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotDocument {
    #[serde(default)]
    current_stats: Option<CurrentStats>,
    #[serde(default)]
    historical_data: Vec<DailyRating>,
    #[serde(default)]
    generated_at: i64,
}

impl SnapshotDocument {
    /// Incomplete documents (no stats or no history) are treated as absent.
    fn into_data(self) -> Option<SnapshotData> {
        let stats = self.current_stats?;
        if self.historical_data.is_empty() {
            return None;
        }
        let mut historical_data = self.historical_data;
        historical_data.sort_by_key(|r| r.date);
        Some(SnapshotData {
            stats,
            historical_data,
            generated_at: self.generated_at,
        })
    }
}

// ── SnapshotLoader ────────────────────────────────────────────────────────────

pub struct SnapshotLoader {
    source: SnapshotSource,
    client: Client,
}

impl SnapshotLoader {
    pub fn new(source: SnapshotSource) -> Self {
        Self::with_client(source, Client::new())
    }

    /// Reuse an existing HTTP client for URL sources.
    pub fn with_client(source: SnapshotSource, client: Client) -> Self {
        Self { source, client }
    }

    pub fn source(&self) -> &SnapshotSource {
        &self.source
    }

    /// Load the snapshot, or `None` when it is missing or incomplete.
    pub async fn load(&self) -> Option<SnapshotData> {
        let document = match self.read_document().await {
            Ok(doc) => doc,
            Err(error) => {
                warn!(source = ?self.source, %error, "snapshot unavailable");
                return None;
            }
        };

        let data = document.into_data();
        match &data {
            Some(d) => info!(
                records = d.historical_data.len(),
                generated_at = d.generated_at,
                "snapshot loaded"
            ),
            None => debug!(source = ?self.source, "snapshot incomplete; ignoring"),
        }
        data
    }

    async fn read_document(&self) -> Result<SnapshotDocument, SnapshotError> {
        match &self.source {
            SnapshotSource::File(path) => {
                let content = tokio::fs::read_to_string(path).await.map_err(|source| {
                    DashboardError::FileRead {
                        path: path.clone(),
                        source,
                    }
                })?;
                let document = serde_json::from_str(&content).map_err(DashboardError::from)?;
                Ok(document)
            }
            SnapshotSource::Url(url) => {
                let response = self.client.get(url).send().await.map_err(ApiError::from)?;
                Ok(decode(response).await?)
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
