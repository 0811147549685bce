use crate::errors::TrackerError;
use config::{Config, Environment, File as ConfigFile};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

// The main Settings struct used throughout the tracker.
#[derive(Debug, Clone)]
pub struct Settings {
    pub endpoint_url: String,

    pub inactivity_threshold_ms: u64,
    pub interval_flush_ms: u64,
    /// How often the runtime polls the activity monitor for idle onset.
    pub idle_poll_ms: u64,

    pub preload_ahead_count: u32,
    pub preload_behind_count: u32,
    pub min_preloaded_count: u32,

    pub request_timeout_ms: u64,
    pub connect_timeout_ms: u64,

    pub internal_log_level: String,
    pub internal_log_file_dir: PathBuf,
    pub internal_log_file_name: String,
}

// Struct to directly deserialize from view_tracker.toml. Every field has a
// default so a minimal (or empty) file works per deployment.
#[derive(Debug, Deserialize)]
struct RawSettings {
    endpoint_url: String,

    #[serde(default = "default_inactivity_threshold_ms")]
    inactivity_threshold_ms: u64,
    #[serde(default = "default_interval_flush_ms")]
    interval_flush_ms: u64,
    #[serde(default = "default_idle_poll_ms")]
    idle_poll_ms: u64,

    #[serde(default = "default_preload_ahead_count")]
    preload_ahead_count: u32,
    #[serde(default = "default_preload_behind_count")]
    preload_behind_count: u32,
    #[serde(default = "default_min_preloaded_count")]
    min_preloaded_count: u32,

    #[serde(default = "default_request_timeout_ms")]
    request_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    connect_timeout_ms: u64,

    #[serde(default = "default_log_level")]
    internal_log_level: String,
    #[serde(default = "default_log_dir")]
    internal_log_file_dir: String,
    #[serde(default = "default_log_file_name")]
    internal_log_file_name: String,
}

fn default_inactivity_threshold_ms() -> u64 { 60_000 }
fn default_interval_flush_ms() -> u64 { 10_000 }
fn default_idle_poll_ms() -> u64 { 1_000 }
fn default_preload_ahead_count() -> u32 { 2 }
fn default_preload_behind_count() -> u32 { 4 }
fn default_min_preloaded_count() -> u32 { 5 }
fn default_request_timeout_ms() -> u64 { 15_000 }
fn default_connect_timeout_ms() -> u64 { 5_000 }
fn default_log_level() -> String { "info".to_string() }
fn default_log_dir() -> String { "logs".to_string() }
fn default_log_file_name() -> String { "view_tracker.log".to_string() }

impl Settings {
    /// Loads `view_tracker.toml` from the standard locations, then applies
    /// `DVT__`-prefixed environment overrides.
    pub fn new() -> Result<Arc<Self>, TrackerError> {
        // Config path candidates:
        // 1. executable_dir/config/view_tracker.toml
        // 2. executable_dir/view_tracker.toml
        // 3. current_dir/config/view_tracker.toml (for dev)
        // 4. current_dir/view_tracker.toml (for dev)
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()));

        let mut config_paths_to_try = Vec::new();
        if let Some(dir) = &exe_dir {
            config_paths_to_try.push(dir.join("config").join("view_tracker.toml"));
            config_paths_to_try.push(dir.join("view_tracker.toml"));
        }
        config_paths_to_try.push(PathBuf::from("config").join("view_tracker.toml"));
        config_paths_to_try.push(PathBuf::from("view_tracker.toml"));

        let mut config_builder = Config::builder();
        let mut loaded_from_file = false;

        for path_to_try in &config_paths_to_try {
            if path_to_try.exists() {
                config_builder =
                    config_builder.add_source(ConfigFile::from(path_to_try.clone()).required(true));
                loaded_from_file = true;
                break;
            }
        }

        if !loaded_from_file {
            return Err(TrackerError::Config(
                "view_tracker.toml not found in standard locations.".to_string(),
            ));
        }

        config_builder = config_builder.add_source(
            Environment::with_prefix("DVT") // Document View Tracker
                .separator("__")
                .try_parsing(true),
        );

        let raw: RawSettings = config_builder
            .build()
            .map_err(|e| TrackerError::Config(format!("Failed to build configuration: {}", e)))?
            .try_deserialize()
            .map_err(|e| {
                TrackerError::Config(format!("Failed to deserialize configuration: {}", e))
            })?;

        Settings::from_raw(raw, exe_dir).map(Arc::new)
    }

    /// Builds Settings from an explicit TOML file path. Used by hosts that
    /// manage their own config discovery.
    pub fn from_file(path: &std::path::Path) -> Result<Arc<Self>, TrackerError> {
        let raw: RawSettings = Config::builder()
            .add_source(ConfigFile::from(path.to_path_buf()).required(true))
            .add_source(Environment::with_prefix("DVT").separator("__").try_parsing(true))
            .build()
            .map_err(|e| TrackerError::Config(format!("Failed to build configuration: {}", e)))?
            .try_deserialize()
            .map_err(|e| {
                TrackerError::Config(format!("Failed to deserialize configuration: {}", e))
            })?;
        Settings::from_raw(raw, None).map(Arc::new)
    }

    fn from_raw(raw: RawSettings, exe_dir: Option<PathBuf>) -> Result<Self, TrackerError> {
        if raw.endpoint_url.is_empty() {
            return Err(TrackerError::Config("endpoint_url must not be empty.".to_string()));
        }
        if raw.interval_flush_ms == 0 {
            return Err(TrackerError::Config("interval_flush_ms must be > 0.".to_string()));
        }
        if raw.inactivity_threshold_ms == 0 {
            return Err(TrackerError::Config(
                "inactivity_threshold_ms must be > 0.".to_string(),
            ));
        }

        let log_dir = PathBuf::from(&raw.internal_log_file_dir);
        let internal_log_file_dir = match (&exe_dir, log_dir.is_absolute()) {
            (Some(dir), false) => dir.join(log_dir),
            _ => log_dir,
        };

        Ok(Settings {
            endpoint_url: raw.endpoint_url,
            inactivity_threshold_ms: raw.inactivity_threshold_ms,
            interval_flush_ms: raw.interval_flush_ms,
            idle_poll_ms: raw.idle_poll_ms,
            preload_ahead_count: raw.preload_ahead_count,
            preload_behind_count: raw.preload_behind_count,
            min_preloaded_count: raw.min_preloaded_count,
            request_timeout_ms: raw.request_timeout_ms,
            connect_timeout_ms: raw.connect_timeout_ms,
            internal_log_level: raw.internal_log_level,
            internal_log_file_dir,
            internal_log_file_name: raw.internal_log_file_name,
        })
    }

    pub fn inactivity_threshold(&self) -> Duration {
        Duration::from_millis(self.inactivity_threshold_ms)
    }

    pub fn interval_flush(&self) -> Duration {
        Duration::from_millis(self.interval_flush_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("view_tracker.toml");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn minimal_toml_gets_defaults() {
        let (_dir, path) =
            write_config("endpoint_url = \"https://example.com/api/record_view\"\n");
        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.endpoint_url, "https://example.com/api/record_view");
        assert_eq!(settings.interval_flush_ms, 10_000);
        assert_eq!(settings.inactivity_threshold_ms, 60_000);
        assert_eq!(settings.preload_ahead_count, 2);
        assert_eq!(settings.preload_behind_count, 4);
        assert_eq!(settings.min_preloaded_count, 5);
    }

    #[test]
    fn zero_flush_interval_rejected() {
        let (_dir, path) = write_config(
            "endpoint_url = \"https://example.com/api/record_view\"\ninterval_flush_ms = 0\n",
        );
        let err = Settings::from_file(&path).unwrap_err();
        assert!(matches!(err, TrackerError::Config(_)));
    }

    #[test]
    fn explicit_values_override_defaults() {
        let (_dir, path) = write_config(
            "endpoint_url = \"https://example.com/api/record_view\"\n\
             inactivity_threshold_ms = 30000\n\
             min_preloaded_count = 10\n",
        );
        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.inactivity_threshold_ms, 30_000);
        assert_eq!(settings.min_preloaded_count, 10);
    }
}
