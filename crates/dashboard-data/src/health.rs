//! Backend liveness probe.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::source::StatsSource;

/// Timeout used by callers that have no preference.
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_millis(5000);

/// Issues a single bounded-timeout health request. Never retries; callers
/// decide their own retry policy.
#[derive(Clone)]
pub struct ServerHealthProbe {
    source: Arc<dyn StatsSource>,
}

impl ServerHealthProbe {
    pub fn new(source: Arc<dyn StatsSource>) -> Self {
        Self { source }
    }

    /// `true` only when the backend answered with a success status within
    /// `timeout`. Timeouts, network errors and error statuses yield `false`.
    pub async fn check(&self, timeout: Duration) -> bool {
        let outcome = tokio::time::timeout(timeout, self.source.health(timeout)).await;
        match outcome {
            Ok(Ok(())) => {
                debug!("backend is online");
                true
            }
            Ok(Err(e)) => {
                info!(error = %e, "backend health check failed");
                false
            }
            Err(_) => {
                info!(timeout_ms = timeout.as_millis() as u64, "backend health check timed out");
                false
            }
        }
    }
}
