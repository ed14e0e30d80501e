//! Core types for the chess statistics dashboard.
//!
//! Holds the domain model shared by the data and runtime layers (daily
//! ratings, month keys, covered ranges, current stats, snapshots), the
//! unified error type, calendar helpers, display formatting, and the
//! command-line settings with their persisted last-used values.

pub mod error;
pub mod formatting;
pub mod models;
pub mod settings;
pub mod time_utils;
