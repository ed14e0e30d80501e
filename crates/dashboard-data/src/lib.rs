//! Data access layer for the chess statistics dashboard.
//!
//! Talks to the backend REST API (month history, stats, verification,
//! health), loads the static snapshot, retries single-month fetches with
//! exponential back-off, and shapes daily ratings into chart-ready series.

pub mod client;
pub mod health;
pub mod month_fetcher;
pub mod series;
pub mod snapshot;
pub mod source;

pub use dashboard_core as core;

#[cfg(test)]
pub(crate) mod test_support;
