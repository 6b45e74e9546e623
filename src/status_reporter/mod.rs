//! StatusReporter - acquisition outcome to display report
//!
//! Success yields the frame plus an online status, failure yields only
//! an offline status so the display keeps its previous image. Error
//! logging is throttled per source by wall-clock gap, not by error kind.

use crate::acquirer::{AcquireError, Frame};
use crate::source_config::SourceMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Minimum gap between two logged errors of one source
pub const ERROR_LOG_WINDOW: Duration = Duration::from_millis(5000);

/// Coarse source liveness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LivenessStatus {
    Connecting,
    Online,
    Offline,
}

impl LivenessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LivenessStatus::Connecting => "connecting",
            LivenessStatus::Online => "online",
            LivenessStatus::Offline => "offline",
        }
    }
}

/// What the scheduler tells the display about one source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    /// A new frame, always reported as online
    Snapshot {
        /// `data:` URI of the frame
        image: String,
        timestamp: DateTime<Utc>,
    },
    /// Status only; the display keeps its last image
    Status(LivenessStatus),
}

impl ReportOutcome {
    pub fn status(&self) -> LivenessStatus {
        match self {
            ReportOutcome::Snapshot { .. } => LivenessStatus::Online,
            ReportOutcome::Status(status) => *status,
        }
    }
}

/// Report addressed to one source's display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub identifier: String,
    pub outcome: ReportOutcome,
}

/// Per-source error log throttle
#[derive(Debug, Clone, Default)]
pub struct ErrorThrottle {
    last_logged_at: Option<Instant>,
}

impl ErrorThrottle {
    /// Returns true (and opens a new window) if an error may be logged now
    pub fn should_log(&mut self, now: Instant) -> bool {
        match self.last_logged_at {
            Some(last) if now.duration_since(last) < ERROR_LOG_WINDOW => false,
            _ => {
                self.last_logged_at = Some(now);
                true
            }
        }
    }

    pub fn last_logged_at(&self) -> Option<Instant> {
        self.last_logged_at
    }
}

/// Sends reports to the display side
#[derive(Debug, Clone)]
pub struct StatusReporter {
    tx: mpsc::UnboundedSender<SourceReport>,
}

impl StatusReporter {
    pub fn new(tx: mpsc::UnboundedSender<SourceReport>) -> Self {
        Self { tx }
    }

    /// Report a freshly acquired frame
    pub fn frame(&self, identifier: &str, frame: &Frame) {
        tracing::debug!(
            identifier = %identifier,
            size = frame.data.len(),
            content_type = %frame.content_type,
            "Frame acquired"
        );

        self.send(
            identifier,
            ReportOutcome::Snapshot {
                image: frame.to_data_uri(),
                timestamp: Utc::now(),
            },
        );
    }

    /// Report a failed acquisition, logging it unless throttled
    pub fn failure(
        &self,
        identifier: &str,
        mode: SourceMode,
        error: &AcquireError,
        throttle: &mut ErrorThrottle,
    ) {
        if throttle.should_log(Instant::now()) {
            tracing::error!(
                identifier = %identifier,
                mode = %mode.as_str(),
                kind = error.kind(),
                error = %error,
                "Snapshot capture error"
            );
        }

        self.status(identifier, LivenessStatus::Offline);
    }

    /// Report a bare status
    pub fn status(&self, identifier: &str, status: LivenessStatus) {
        self.send(identifier, ReportOutcome::Status(status));
    }

    fn send(&self, identifier: &str, outcome: ReportOutcome) {
        let report = SourceReport {
            identifier: identifier.to_string(),
            outcome,
        };
        if self.tx.send(report).is_err() {
            tracing::debug!(identifier = %identifier, "Report receiver dropped");
        }
    }
}
