use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Settings loaded from `snapview.toml`. Every field has a default, so an
/// absent file is equivalent to an empty one.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub watch: WatchConfig,
    pub scheduler: SchedulerConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Snapshot file used when none is given on the command line.
    pub file: PathBuf,
    pub check_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Upper bound on each interactive-event poll.
    pub poll_timeout_ms: u64,
    /// Idle sleep between loop iterations.
    pub idle_sleep_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("dump"),
            check_interval_secs: 2,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: 100,
            idle_sleep_ms: 50,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 7100,
        }
    }
}

/// Load settings from `path`, or defaults.
///
/// A missing file is not an error. A file that fails to parse is reported
/// and ignored.
pub fn load_config(path: &Path) -> ViewerConfig {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(cfg) => {
                tracing::debug!(path = %path.display(), "loaded settings");
                cfg
            }
            Err(e) => {
                tracing::warn!("failed to parse {}: {e}", path.display());
                ViewerConfig::default()
            }
        },
        Err(_) => ViewerConfig::default(),
    }
}
