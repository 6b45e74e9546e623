//! SourceConfig data types

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default frame width
pub const DEFAULT_WIDTH: u32 = 640;
/// Default frame height
pub const DEFAULT_HEIGHT: u32 = 480;
/// Default refresh interval (ms)
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 1000;
/// Default offline timeout (ms)
pub const DEFAULT_OFFLINE_TIMEOUT_MS: u64 = 8000;
/// Lower bound applied to the refresh interval when scheduling
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Operating mode of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// Local camera device via an external capture program
    #[default]
    Local,
    /// Remote HTTP snapshot endpoint
    Snapshot,
    /// Live MJPEG stream, rendered by the display directly
    Stream,
}

impl SourceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceMode::Local => "local",
            SourceMode::Snapshot => "snapshot",
            SourceMode::Stream => "stream",
        }
    }
}

/// Validated configuration for one source.
///
/// Built once from a [`RawSourceConfig`] and never re-derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    pub mode: SourceMode,
    /// Snapshot / stream URL. `None` when absent or blank.
    pub url: Option<String>,
    pub width: u32,
    pub height: u32,
    #[serde(with = "duration_ms")]
    pub refresh_interval: Duration,
    pub show_status: bool,
    /// Zero disables liveness checking
    #[serde(with = "duration_ms")]
    pub offline_timeout: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            mode: SourceMode::Local,
            url: None,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            refresh_interval: Duration::from_millis(DEFAULT_REFRESH_INTERVAL_MS),
            show_status: true,
            offline_timeout: Duration::from_millis(DEFAULT_OFFLINE_TIMEOUT_MS),
        }
    }
}

impl SourceConfig {
    /// Whether the scheduler runs a polling loop for this source
    pub fn polls(&self) -> bool {
        match self.mode {
            SourceMode::Local => true,
            SourceMode::Snapshot => !self.refresh_interval.is_zero(),
            SourceMode::Stream => false,
        }
    }

    /// Wait between the end of one acquisition and the start of the next
    pub fn poll_interval(&self) -> Duration {
        self.refresh_interval.max(MIN_POLL_INTERVAL)
    }

    /// Whether recency-based liveness derivation applies
    pub fn liveness_enabled(&self) -> bool {
        !self.offline_timeout.is_zero()
    }
}

/// Loosely-typed source options as they arrive from a display or the
/// sources file. Values may be numbers, numeric strings or garbage.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSourceConfig {
    #[serde(default)]
    pub mode: Option<serde_json::Value>,
    #[serde(default)]
    pub url: Option<serde_json::Value>,
    #[serde(default)]
    pub width: Option<serde_json::Value>,
    #[serde(default)]
    pub height: Option<serde_json::Value>,
    #[serde(default, alias = "refreshSnapshotInterval")]
    pub refresh_interval: Option<serde_json::Value>,
    #[serde(default)]
    pub show_status: Option<serde_json::Value>,
    #[serde(default)]
    pub offline_timeout: Option<serde_json::Value>,
}

/// One entry of the sources file
#[derive(Debug, Clone, Deserialize)]
pub struct SourceEntry {
    pub identifier: String,
    #[serde(default)]
    pub config: RawSourceConfig,
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }
}
