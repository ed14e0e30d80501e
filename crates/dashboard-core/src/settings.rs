use chrono::NaiveDate;
use clap::{CommandFactory, Parser};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;
use crate::time_utils::TimeRange;

/// Username shown when no guest user is selected.
pub const DEFAULT_USERNAME: &str = "shia_justdoit";

/// Backend base URL used when none is configured.
pub const DEFAULT_API_URL: &str = "http://localhost:8080";

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Headless driver for the chess statistics dashboard
#[derive(Parser, Debug, Clone)]
#[command(
    name = "chess-dashboard",
    about = "Headless driver for the chess statistics dashboard",
    version
)]
pub struct Settings {
    /// Stored user whose history lives in the backend database
    #[arg(long, default_value = DEFAULT_USERNAME)]
    pub username: String,

    /// Look up a guest user directly from Chess.com instead
    #[arg(long)]
    pub guest: Option<String>,

    /// Backend base URL
    #[arg(long, env = "CHESS_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Static snapshot location (file path or http(s) URL)
    #[arg(long)]
    pub snapshot: Option<String>,

    /// Join date of the stored user, used by the "all" time range
    #[arg(long, default_value = "2020-06-09")]
    pub join_date: NaiveDate,

    /// Time range
    #[arg(long, default_value = "30", value_parser = ["7", "30", "90", "365", "all", "custom"])]
    pub range: String,

    /// First month of a custom range (YYYY-MM)
    #[arg(long)]
    pub start_month: Option<String>,

    /// Last month of a custom range (YYYY-MM)
    #[arg(long)]
    pub end_month: Option<String>,

    /// Pull fresh data from Chess.com instead of reading the database
    #[arg(long)]
    pub refresh: bool,

    /// Timezone used to decide "today" (auto-detected if not specified)
    #[arg(long, default_value = "auto")]
    pub timezone: String,

    /// Health probe timeout in milliseconds
    #[arg(long, default_value = "5000")]
    pub health_timeout_ms: u64,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"])]
    pub log_level: String,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Clear saved configuration
    #[arg(long)]
    pub clear: bool,
}

// ── LastUsedParams ─────────────────────────────────────────────────────────────

/// Persisted last-used parameters saved to `~/.chess-dashboard/last_used.json`.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct LastUsedParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_month: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_month: Option<String>,
}

impl LastUsedParams {
    /// Return the default path to the persisted config file.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Return the config path rooted at `base_dir` (used for testing).
    pub fn config_path_in(base_dir: &std::path::Path) -> PathBuf {
        base_dir.join(".chess-dashboard").join("last_used.json")
    }

    /// Load persisted params from an explicit path.
    /// Returns `Default` when the file is absent or cannot be parsed.
    pub fn load_from(path: &std::path::Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_default()
    }

    /// Atomically write params to an explicit path, creating parent
    /// directories if needed.
    pub fn save_to(&self, path: &std::path::Path) -> std::result::Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }

    /// Delete the config file at an explicit path if it exists.
    pub fn clear_at(path: &std::path::Path) -> std::result::Result<(), std::io::Error> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse CLI arguments, merge with last-used params where no explicit
    /// value was provided, resolve `"auto"` values, and persist the result.
    pub fn load_with_last_used() -> Self {
        Self::load_with_last_used_impl(
            std::env::args_os().collect(),
            &LastUsedParams::config_path(),
        )
    }

    /// Full implementation; accepts args and an explicit config path so that
    /// tests can redirect to a temporary directory.
    pub fn load_with_last_used_impl(
        args: Vec<std::ffi::OsString>,
        config_path: &std::path::Path,
    ) -> Self {
        let matches = Settings::command().get_matches_from(args.clone());
        let mut settings = Settings::parse_from(args);

        if settings.clear {
            let _ = LastUsedParams::clear_at(config_path);
            return Self::resolve_auto_values(settings);
        }

        let last = LastUsedParams::load_from(config_path);

        // CLI and environment always win over persisted values.
        if !is_arg_explicitly_set(&matches, "username") {
            if let Some(v) = last.username {
                settings.username = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "range") {
            if let Some(v) = last.range {
                settings.range = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "timezone") {
            if let Some(v) = last.timezone {
                settings.timezone = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "api_url") {
            if let Some(v) = last.api_url {
                settings.api_url = v;
            }
        }
        // A persisted `custom` range is unusable without its bounds.
        if !is_arg_explicitly_set(&matches, "start_month") && last.start_month.is_some() {
            settings.start_month = last.start_month;
        }
        if !is_arg_explicitly_set(&matches, "end_month") && last.end_month.is_some() {
            settings.end_month = last.end_month;
        }

        settings = Self::resolve_auto_values(settings);

        let params = LastUsedParams::from(&settings);
        let _ = params.save_to(config_path);

        settings
    }

    /// The selected time range.
    pub fn time_range(&self) -> Result<TimeRange> {
        TimeRange::from_option(
            &self.range,
            self.start_month.as_deref(),
            self.end_month.as_deref(),
        )
    }

    /// Resolve `"auto"` sentinel values and apply the `--debug` flag.
    fn resolve_auto_values(mut settings: Settings) -> Settings {
        if settings.timezone == "auto" {
            settings.timezone = crate::time_utils::get_system_timezone();
        }

        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }

        settings
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────────

impl From<&Settings> for LastUsedParams {
    fn from(s: &Settings) -> Self {
        LastUsedParams {
            username: Some(s.username.clone()),
            range: Some(s.range.clone()),
            timezone: Some(s.timezone.clone()),
            api_url: Some(s.api_url.clone()),
            start_month: s.start_month.clone(),
            end_month: s.end_month.clone(),
        }
    }
}

/// Returns `true` when `name` was supplied on the command line or through
/// its environment variable (not via a default value).
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches!(
        matches.value_source(name),
        Some(clap::parser::ValueSource::CommandLine) | Some(clap::parser::ValueSource::EnvVariable)
    )
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tmp_config_path(tmp: &TempDir) -> PathBuf {
        LastUsedParams::config_path_in(tmp.path())
    }

    #[test]
    fn test_last_used_params_save_load() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        let params = LastUsedParams {
            username: Some("hikaru".to_string()),
            range: Some("90".to_string()),
            timezone: Some("Europe/Oslo".to_string()),
            api_url: Some("https://api.example.test".to_string()),
            ..Default::default()
        };

        params.save_to(&path).expect("save");
        let loaded = LastUsedParams::load_from(&path);

        assert_eq!(loaded.username.as_deref(), Some("hikaru"));
        assert_eq!(loaded.range.as_deref(), Some("90"));
        assert_eq!(loaded.timezone.as_deref(), Some("Europe/Oslo"));
        assert_eq!(loaded.api_url.as_deref(), Some("https://api.example.test"));
    }

    #[test]
    fn test_last_used_params_default_when_missing_or_corrupt() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        assert!(LastUsedParams::load_from(&path).username.is_none());

        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json").unwrap();
        assert!(LastUsedParams::load_from(&path).range.is_none());
    }

    #[test]
    fn test_last_used_params_clear() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        LastUsedParams::default().save_to(&path).expect("save");
        assert!(path.exists());

        LastUsedParams::clear_at(&path).expect("clear");
        assert!(!path.exists());
    }

    #[test]
    fn test_settings_default_values() {
        let settings = Settings::parse_from(["chess-dashboard", "--api-url", DEFAULT_API_URL]);

        assert_eq!(settings.username, DEFAULT_USERNAME);
        assert!(settings.guest.is_none());
        assert!(settings.snapshot.is_none());
        assert_eq!(settings.join_date, NaiveDate::from_ymd_opt(2020, 6, 9).unwrap());
        assert_eq!(settings.range, "30");
        assert!(!settings.refresh);
        assert_eq!(settings.timezone, "auto");
        assert_eq!(settings.health_timeout_ms, 5000);
        assert_eq!(settings.log_level, "INFO");
        assert!(!settings.debug);
        assert!(!settings.clear);
    }

    #[test]
    fn test_settings_custom_range() {
        let settings = Settings::parse_from([
            "chess-dashboard",
            "--range",
            "custom",
            "--start-month",
            "2023-10",
            "--end-month",
            "2024-01",
        ]);
        assert!(matches!(
            settings.time_range().unwrap(),
            TimeRange::Custom { .. }
        ));
    }

    #[test]
    fn test_load_with_last_used_merges_persisted_values() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);
        LastUsedParams {
            username: Some("hikaru".to_string()),
            range: Some("365".to_string()),
            timezone: Some("UTC".to_string()),
            ..Default::default()
        }
        .save_to(&config_path)
        .expect("save");

        let settings =
            Settings::load_with_last_used_impl(vec!["chess-dashboard".into()], &config_path);
        assert_eq!(settings.username, "hikaru");
        assert_eq!(settings.range, "365");
        assert_eq!(settings.timezone, "UTC");
    }

    #[test]
    fn test_load_with_last_used_cli_overrides_persisted() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);
        LastUsedParams {
            range: Some("365".to_string()),
            timezone: Some("UTC".to_string()),
            ..Default::default()
        }
        .save_to(&config_path)
        .expect("save");

        let settings = Settings::load_with_last_used_impl(
            vec!["chess-dashboard".into(), "--range".into(), "7".into()],
            &config_path,
        );
        assert_eq!(settings.range, "7");
    }

    #[test]
    fn test_load_with_last_used_clear_removes_file() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);
        LastUsedParams::default().save_to(&config_path).expect("save");

        Settings::load_with_last_used_impl(
            vec!["chess-dashboard".into(), "--clear".into()],
            &config_path,
        );
        assert!(!config_path.exists());
    }

    #[test]
    fn test_load_with_last_used_debug_overrides_log_level() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);

        let settings = Settings::load_with_last_used_impl(
            vec![
                "chess-dashboard".into(),
                "--debug".into(),
                "--timezone".into(),
                "UTC".into(),
            ],
            &config_path,
        );
        assert_eq!(settings.log_level, "DEBUG");
        assert_eq!(settings.timezone, "UTC");
    }

    #[test]
    fn test_load_with_last_used_persists_after_run() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);

        Settings::load_with_last_used_impl(
            vec![
                "chess-dashboard".into(),
                "--username".into(),
                "magnuscarlsen".into(),
            ],
            &config_path,
        );

        let loaded = LastUsedParams::load_from(&config_path);
        assert_eq!(loaded.username.as_deref(), Some("magnuscarlsen"));
    }

    #[test]
    fn test_custom_range_months_persist_between_runs() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);

        Settings::load_with_last_used_impl(
            vec![
                "chess-dashboard".into(),
                "--range".into(),
                "custom".into(),
                "--start-month".into(),
                "2023-10".into(),
                "--end-month".into(),
                "2024-01".into(),
            ],
            &config_path,
        );

        let settings =
            Settings::load_with_last_used_impl(vec!["chess-dashboard".into()], &config_path);
        assert_eq!(settings.range, "custom");
        assert_eq!(settings.start_month.as_deref(), Some("2023-10"));
        assert_eq!(settings.end_month.as_deref(), Some("2024-01"));
        assert!(matches!(
            settings.time_range().expect("persisted custom range resolves"),
            TimeRange::Custom { .. }
        ));
    }

    #[test]
    fn test_explicit_start_month_overrides_persisted() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);
        LastUsedParams {
            range: Some("custom".to_string()),
            start_month: Some("2023-10".to_string()),
            end_month: Some("2024-01".to_string()),
            ..Default::default()
        }
        .save_to(&config_path)
        .expect("save");

        let settings = Settings::load_with_last_used_impl(
            vec![
                "chess-dashboard".into(),
                "--start-month".into(),
                "2023-12".into(),
            ],
            &config_path,
        );
        assert_eq!(settings.start_month.as_deref(), Some("2023-12"));
        assert_eq!(settings.end_month.as_deref(), Some("2024-01"));
    }
}
