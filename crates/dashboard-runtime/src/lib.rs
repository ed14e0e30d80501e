//! Runtime layer for the chess dashboard.
//!
//! Owns the range cache, sequences month fetches into range loads, and keeps
//! the session state (active user, server status, snapshot use) that the
//! binary renders.

pub mod orchestrator;
pub mod range_cache;
pub mod session;

pub use dashboard_core as core;
pub use dashboard_data as data;
