//! Configuration types for media-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Worker pool and polling settings
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Pool size used when the caller does not pass one (default: 2)
    #[serde(default = "default_pool_size")]
    pub default_pool_size: usize,

    /// Sleep between orchestrator loop iterations (default: 100ms)
    #[serde(default = "default_poll_interval", with = "millis_serde")]
    pub orchestrator_poll_interval: Duration,

    /// Sleep between idle worker polls (default: 100ms)
    #[serde(default = "default_poll_interval", with = "millis_serde")]
    pub worker_poll_interval: Duration,

    /// Sleep between process adapter polls while the child is alive (default: 100ms)
    #[serde(default = "default_poll_interval", with = "millis_serde")]
    pub adapter_poll_interval: Duration,

    /// Buffer size of the event broadcast channel (default: 1000)
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            default_pool_size: default_pool_size(),
            orchestrator_poll_interval: default_poll_interval(),
            worker_poll_interval: default_poll_interval(),
            adapter_poll_interval: default_poll_interval(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// External downloader binary settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Path to the downloader executable (auto-detected if None)
    #[serde(default)]
    pub binary_path: Option<PathBuf>,

    /// Whether to search PATH for the binary if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Executable names tried in order when searching PATH
    #[serde(default = "default_binary_names")]
    pub binary_names: Vec<String>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            binary_path: None,
            search_path: true,
            binary_names: default_binary_names(),
        }
    }
}

/// Container scan heuristics
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Stop a container scan after this many already-known items (None = never)
    #[serde(default)]
    pub early_stop_limit: Option<u32>,

    /// How long a simulated run may go without reporting an item (default: 60s)
    #[serde(default = "default_json_wait", with = "duration_serde")]
    pub json_wait: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            early_stop_limit: None,
            json_wait: default_json_wait(),
        }
    }
}

/// Patterns used to classify the tool's stderr after it exits
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StderrConfig {
    /// Messages that are dropped without affecting the outcome
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Messages that count as warnings (default: `^WARNING:`)
    #[serde(default = "default_warning_pattern")]
    pub warning_pattern: String,

    /// Messages that are debug chatter (default: `^\[debug\]`)
    #[serde(default = "default_debug_pattern")]
    pub debug_pattern: String,
}

impl Default for StderrConfig {
    fn default() -> Self {
        Self {
            ignore_patterns: Vec::new(),
            warning_pattern: default_warning_pattern(),
            debug_pattern: default_debug_pattern(),
        }
    }
}

/// Which side-files a simulated run keeps next to the media
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SideFileConfig {
    /// Write `<name>.description`
    #[serde(default)]
    pub keep_description: bool,

    /// Write `<name>.info.json`
    #[serde(default)]
    pub keep_info_json: bool,

    /// Fetch and write the thumbnail image
    #[serde(default)]
    pub keep_thumbnail: bool,
}

/// Main configuration for the download orchestrator
///
/// Fields are organized into logical sub-configs:
/// - [`pool`](PoolConfig) — pool size, polling intervals, event buffer
/// - [`tool`](ToolConfig) — external binary discovery
/// - [`scan`](ScanConfig) — early-stop and stall watchdog
/// - [`stderr`](StderrConfig) — stderr classification patterns
/// - [`side_files`](SideFileConfig) — description/metadata/thumbnail files
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Worker pool settings
    #[serde(default)]
    pub pool: PoolConfig,

    /// External binary settings
    #[serde(default)]
    pub tool: ToolConfig,

    /// Container scan heuristics
    #[serde(default)]
    pub scan: ScanConfig,

    /// Stderr classification
    #[serde(default)]
    pub stderr: StderrConfig,

    /// Side-file retention
    #[serde(default)]
    pub side_files: SideFileConfig,
}

impl Config {
    /// Check the configuration for values the engine cannot run with
    ///
    /// Compiles every stderr pattern so that a bad regex is reported here rather
    /// than in the middle of a run.
    pub fn validate(&self) -> Result<()> {
        if self.pool.default_pool_size == 0 {
            return Err(Error::config(
                "pool.default_pool_size",
                "pool size must be at least 1",
            ));
        }
        if self.pool.event_capacity == 0 {
            return Err(Error::config(
                "pool.event_capacity",
                "event capacity must be at least 1",
            ));
        }
        for (key, interval) in [
            ("pool.orchestrator_poll_interval", self.pool.orchestrator_poll_interval),
            ("pool.worker_poll_interval", self.pool.worker_poll_interval),
            ("pool.adapter_poll_interval", self.pool.adapter_poll_interval),
        ] {
            if interval.is_zero() {
                return Err(Error::config(key, "poll interval must be non-zero"));
            }
        }
        if self.scan.early_stop_limit == Some(0) {
            return Err(Error::config(
                "scan.early_stop_limit",
                "early stop limit must be at least 1 (use None to disable)",
            ));
        }
        crate::process::StderrClassifier::from_config(&self.stderr)?;
        Ok(())
    }
}

fn default_pool_size() -> usize {
    2
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_event_capacity() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

fn default_binary_names() -> Vec<String> {
    vec!["yt-dlp".to_string(), "youtube-dl".to_string()]
}

fn default_json_wait() -> Duration {
    Duration::from_secs(60)
}

fn default_warning_pattern() -> String {
    r"^WARNING:".to_string()
}

fn default_debug_pattern() -> String {
    r"^\[debug\]".to_string()
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds, for poll intervals)
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
