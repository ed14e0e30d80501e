use std::path::PathBuf;
use std::time::Duration;

use dashboard_core::settings::Settings;
use dashboard_data::snapshot::SnapshotSource;
use dashboard_runtime::session::SessionConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ── Directory bootstrap ────────────────────────────────────────────────────────

/// Ensure `~/.chess-dashboard/` exists so last-used settings can be saved.
pub fn ensure_directories() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    let dashboard_dir = home.join(".chess-dashboard");
    std::fs::create_dir_all(&dashboard_dir)?;
    Ok(dashboard_dir)
}

// ── Logging bootstrap ──────────────────────────────────────────────────────────

/// Map a `DEBUG|INFO|WARNING|ERROR` level name to an `EnvFilter` directive.
fn filter_directive(log_level: &str) -> String {
    match log_level.to_uppercase().as_str() {
        "DEBUG" => "debug".to_string(),
        "INFO" => "info".to_string(),
        "WARNING" => "warn".to_string(),
        "ERROR" => "error".to_string(),
        other => other.to_lowercase(),
    }
}

/// Initialise the global `tracing` subscriber, writing to stderr.
///
/// Unrecognised levels fall back to `info`.
pub fn setup_logging(log_level: &str) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_new(filter_directive(log_level)).unwrap_or_else(|_| EnvFilter::new("info"));

    let layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry().with(filter).with(layer).try_init()?;

    Ok(())
}

// ── Session configuration ──────────────────────────────────────────────────────

pub fn session_config(settings: &Settings) -> SessionConfig {
    SessionConfig {
        stored_username: settings.username.clone(),
        stored_join_date: settings.join_date,
        snapshot: settings.snapshot.as_deref().map(SnapshotSource::parse),
        health_timeout: Duration::from_millis(settings.health_timeout_ms),
        timezone: settings.timezone.clone(),
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_directories() {
        let tmp = TempDir::new().expect("tempdir");

        // Override HOME so that dirs::home_dir() resolves to our temp dir.
        let original_home = std::env::var_os("HOME");
        std::env::set_var("HOME", tmp.path());

        let result = ensure_directories();

        match original_home {
            Some(v) => std::env::set_var("HOME", v),
            None => std::env::remove_var("HOME"),
        }

        let dir = result.expect("ensure_directories should succeed");
        assert_eq!(dir, tmp.path().join(".chess-dashboard"));
        assert!(dir.is_dir());
    }

    #[test]
    fn test_filter_directive() {
        assert_eq!(filter_directive("DEBUG"), "debug");
        assert_eq!(filter_directive("warning"), "warn");
        assert_eq!(filter_directive("ERROR"), "error");
        assert_eq!(filter_directive("trace"), "trace");
    }

    #[test]
    fn test_session_config_from_settings() {
        let settings = Settings::parse_from([
            "chess-dashboard",
            "--username",
            "shia_justdoit",
            "--snapshot",
            "https://example.test/snapshot.json",
            "--health-timeout-ms",
            "2500",
            "--timezone",
            "Europe/Warsaw",
        ]);

        let config = session_config(&settings);
        assert_eq!(config.stored_username, "shia_justdoit");
        assert_eq!(config.stored_join_date.to_string(), "2020-06-09");
        assert_eq!(
            config.snapshot,
            Some(SnapshotSource::Url("https://example.test/snapshot.json".to_string()))
        );
        assert_eq!(config.health_timeout, Duration::from_millis(2500));
        assert_eq!(config.timezone, "Europe/Warsaw");
    }

    #[test]
    fn test_session_config_without_snapshot() {
        let settings = Settings::parse_from(["chess-dashboard"]);
        assert!(session_config(&settings).snapshot.is_none());
    }
}
