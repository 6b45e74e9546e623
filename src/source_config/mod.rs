//! SourceConfig - validated per-source options
//!
//! ## Responsibilities
//!
//! - Coerce loosely-typed display payloads into [`SourceConfig`]
//! - Load the start-up sources file

mod types;

pub use types::*;

use crate::error::{Error, Result};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

impl RawSourceConfig {
    /// Apply defaulting and coercion rules
    ///
    /// - unknown `mode` falls back to local
    /// - `width`/`height` must be positive, else 640x480
    /// - `refreshInterval`/`offlineTimeout` default when absent or
    ///   non-numeric, negative values clamp to zero
    pub fn into_config(self) -> SourceConfig {
        let mode = match self.mode.as_ref().and_then(Value::as_str) {
            Some(m) if m.eq_ignore_ascii_case("snapshot") => SourceMode::Snapshot,
            Some(m) if m.eq_ignore_ascii_case("stream") => SourceMode::Stream,
            _ => SourceMode::Local,
        };

        let url = self
            .url
            .as_ref()
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string);

        SourceConfig {
            mode,
            url,
            width: positive_dimension(self.width.as_ref(), DEFAULT_WIDTH),
            height: positive_dimension(self.height.as_ref(), DEFAULT_HEIGHT),
            refresh_interval: non_negative_ms(
                self.refresh_interval.as_ref(),
                DEFAULT_REFRESH_INTERVAL_MS,
            ),
            show_status: self
                .show_status
                .as_ref()
                .and_then(Value::as_bool)
                .unwrap_or(true),
            offline_timeout: non_negative_ms(
                self.offline_timeout.as_ref(),
                DEFAULT_OFFLINE_TIMEOUT_MS,
            ),
        }
    }
}

impl From<RawSourceConfig> for SourceConfig {
    fn from(raw: RawSourceConfig) -> Self {
        raw.into_config()
    }
}

/// Read a number from a JSON number or numeric string
fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn positive_dimension(value: Option<&Value>, default: u32) -> u32 {
    match value.and_then(as_number) {
        Some(n) if n >= 1.0 && n <= u32::MAX as f64 => n.round() as u32,
        _ => default,
    }
}

fn non_negative_ms(value: Option<&Value>, default_ms: u64) -> Duration {
    match value.and_then(as_number) {
        Some(n) if n <= 0.0 => Duration::ZERO,
        Some(n) => Duration::from_millis(n.round() as u64),
        None => Duration::from_millis(default_ms),
    }
}

/// Load sources from a JSON file.
///
/// A missing file is not an error and yields no sources.
pub async fn load_sources_file(path: &Path) -> Result<Vec<SourceEntry>> {
    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "Sources file not found, starting empty");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let entries: Vec<SourceEntry> = serde_json::from_slice(&data)?;

    if let Some(entry) = entries.iter().find(|e| e.identifier.trim().is_empty()) {
        return Err(Error::Config(format!(
            "Source entry with empty identifier in {} ({:?})",
            path.display(),
            entry.config
        )));
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(v: Value) -> SourceConfig {
        serde_json::from_value::<RawSourceConfig>(v)
            .unwrap()
            .into_config()
    }

    #[test]
    fn test_empty_payload_uses_defaults() {
        let config = parse(json!({}));
        assert_eq!(config, SourceConfig::default());
        assert_eq!(config.width, 640);
        assert_eq!(config.height, 480);
        assert_eq!(config.refresh_interval, Duration::from_millis(1000));
        assert_eq!(config.offline_timeout, Duration::from_millis(8000));
        assert!(config.show_status);
    }

    #[test]
    fn test_invalid_mode_falls_back_to_local() {
        assert_eq!(parse(json!({"mode": "rtsp"})).mode, SourceMode::Local);
        assert_eq!(parse(json!({"mode": 3})).mode, SourceMode::Local);
        assert_eq!(parse(json!({"mode": "Snapshot"})).mode, SourceMode::Snapshot);
        assert_eq!(parse(json!({"mode": "stream"})).mode, SourceMode::Stream);
    }

    #[test]
    fn test_dimensions_coerced() {
        let config = parse(json!({"width": "800", "height": 600.4}));
        assert_eq!((config.width, config.height), (800, 600));

        let config = parse(json!({"width": -5, "height": "abc"}));
        assert_eq!((config.width, config.height), (640, 480));

        let config = parse(json!({"width": 0}));
        assert_eq!(config.width, 640);
    }

    #[test]
    fn test_durations_clamped() {
        let config = parse(json!({"refreshInterval": -100, "offlineTimeout": "-1"}));
        assert_eq!(config.refresh_interval, Duration::ZERO);
        assert_eq!(config.offline_timeout, Duration::ZERO);
        assert!(!config.liveness_enabled());

        let config = parse(json!({"refreshInterval": "nope"}));
        assert_eq!(config.refresh_interval, Duration::from_millis(1000));
    }

    #[test]
    fn test_legacy_refresh_alias() {
        let config = parse(json!({"refreshSnapshotInterval": 2500}));
        assert_eq!(config.refresh_interval, Duration::from_millis(2500));
    }

    #[test]
    fn test_blank_url_is_none() {
        assert_eq!(parse(json!({"url": "  "})).url, None);
        assert_eq!(
            parse(json!({"url": "http://cam/snap.jpg"})).url.as_deref(),
            Some("http://cam/snap.jpg")
        );
    }

    #[test]
    fn test_poll_interval_floor() {
        let mut config = SourceConfig {
            refresh_interval: Duration::from_millis(100),
            ..Default::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_millis(500));

        config.refresh_interval = Duration::from_millis(1500);
        assert_eq!(config.poll_interval(), Duration::from_millis(1500));
    }

    #[test]
    fn test_polls_by_mode() {
        let local = SourceConfig {
            refresh_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(local.polls());

        let snapshot_off = SourceConfig {
            mode: SourceMode::Snapshot,
            refresh_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(!snapshot_off.polls());

        let stream = SourceConfig {
            mode: SourceMode::Stream,
            ..Default::default()
        };
        assert!(!stream.polls());
    }

    #[tokio::test]
    async fn test_missing_sources_file_is_empty() {
        let entries = load_sources_file(Path::new("/nonexistent/picam/sources.json"))
            .await
            .unwrap();
        assert!(entries.is_empty());
    }
}
