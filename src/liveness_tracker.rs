//! Liveness Tracker
//!
//! Display-side view of each source: derives Connecting/Online/Offline
//! from the recency of reports (polling modes) or of transport events
//! (stream mode). Only transitions are logged.

use crate::error::{Error, Result};
use crate::source_config::{SourceConfig, SourceMode};
use crate::status_reporter::{LivenessStatus, ReportOutcome, SourceReport};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Derive liveness from the last ping.
///
/// Returns `None` when `offline_timeout` is zero, which disables
/// derivation (the last explicitly set status stands).
pub fn derive_status(
    last_ping: Option<Instant>,
    now: Instant,
    offline_timeout: Duration,
) -> Option<LivenessStatus> {
    if offline_timeout.is_zero() {
        return None;
    }

    let status = match last_ping {
        None => LivenessStatus::Connecting,
        Some(t0) if now.saturating_duration_since(t0) < offline_timeout => LivenessStatus::Online,
        Some(_) => LivenessStatus::Offline,
    };
    Some(status)
}

/// Transport-level signal from a display rendering a stream directly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamEvent {
    /// A frame of the stream loaded
    Load,
    /// The stream errored
    Error,
}

/// Source status transition event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatusEvent {
    /// Source went offline
    Lost,
    /// Source came back online
    Recovered,
}

/// A status change produced by periodic evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub identifier: String,
    pub status: LivenessStatus,
    pub event: Option<SourceStatusEvent>,
}

/// Displayed status of one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceStatus {
    pub identifier: String,
    pub mode: SourceMode,
    pub status: LivenessStatus,
    pub show_status: bool,
    pub liveness_enabled: bool,
    /// Milliseconds since the last ping, if any
    pub last_ping_ms_ago: Option<u64>,
}

#[derive(Debug, Clone)]
struct TrackerEntry {
    mode: SourceMode,
    offline_timeout: Duration,
    show_status: bool,
    last_ping: Option<Instant>,
    status: LivenessStatus,
}

impl TrackerEntry {
    fn new(config: &SourceConfig) -> Self {
        Self {
            mode: config.mode,
            offline_timeout: config.offline_timeout,
            show_status: config.show_status,
            last_ping: None,
            status: LivenessStatus::Connecting,
        }
    }

    fn view(&self, identifier: &str, now: Instant) -> SourceStatus {
        SourceStatus {
            identifier: identifier.to_string(),
            mode: self.mode,
            status: self.status,
            show_status: self.show_status,
            liveness_enabled: !self.offline_timeout.is_zero(),
            last_ping_ms_ago: self
                .last_ping
                .map(|t| now.saturating_duration_since(t).as_millis() as u64),
        }
    }
}

/// Tracks displayed liveness per source
pub struct LivenessTracker {
    entries: RwLock<HashMap<String, TrackerEntry>>,
}

impl LivenessTracker {
    /// Create new tracker
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Start tracking a source, or update the options of a tracked one.
    ///
    /// Re-registering keeps the last ping and status so a repeated
    /// configure does not reset the display. Returns true if the source
    /// was not tracked before.
    pub async fn register(&self, identifier: &str, config: &SourceConfig) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get_mut(identifier) {
            Some(entry) => {
                entry.mode = config.mode;
                entry.offline_timeout = config.offline_timeout;
                entry.show_status = config.show_status;
                false
            }
            None => {
                entries.insert(identifier.to_string(), TrackerEntry::new(config));
                true
            }
        }
    }

    /// Stop tracking a source
    pub async fn remove(&self, identifier: &str) -> bool {
        self.entries.write().await.remove(identifier).is_some()
    }

    /// Apply a scheduler report. Unknown sources are ignored.
    pub async fn apply_report(
        &self,
        report: &SourceReport,
        now: Instant,
    ) -> Option<SourceStatusEvent> {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(&report.identifier)?;

        let status = report.outcome.status();
        if matches!(report.outcome, ReportOutcome::Snapshot { .. })
            || status == LivenessStatus::Online
        {
            entry.last_ping = Some(now);
        }

        set_status(&report.identifier, entry, status)
    }

    /// Apply a transport event for a stream source
    pub async fn record_stream_event(
        &self,
        identifier: &str,
        event: StreamEvent,
        now: Instant,
    ) -> Result<(LivenessStatus, Option<SourceStatusEvent>)> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(identifier)
            .ok_or_else(|| Error::NotFound(format!("Source {} not found", identifier)))?;

        let status = match event {
            StreamEvent::Load => {
                entry.last_ping = Some(now);
                LivenessStatus::Online
            }
            StreamEvent::Error => LivenessStatus::Offline,
        };

        let transition = set_status(identifier, entry, status);
        Ok((status, transition))
    }

    /// Re-derive every source with status display and liveness enabled,
    /// returning only the ones whose status changed
    pub async fn evaluate(&self, now: Instant) -> Vec<StatusChange> {
        let mut entries = self.entries.write().await;
        let mut changes = Vec::new();

        for (identifier, entry) in entries.iter_mut() {
            if !entry.show_status {
                continue;
            }
            let Some(status) = derive_status(entry.last_ping, now, entry.offline_timeout) else {
                continue;
            };
            if status == entry.status {
                continue;
            }

            let event = set_status(identifier, entry, status);
            changes.push(StatusChange {
                identifier: identifier.clone(),
                status,
                event,
            });
        }

        changes.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        changes
    }

    /// Get displayed status for a source
    pub async fn status(&self, identifier: &str, now: Instant) -> Option<SourceStatus> {
        self.entries
            .read()
            .await
            .get(identifier)
            .map(|entry| entry.view(identifier, now))
    }

    /// Get displayed status for every source, ordered by identifier
    pub async fn all(&self, now: Instant) -> Vec<SourceStatus> {
        let entries = self.entries.read().await;
        let mut all: Vec<_> = entries
            .iter()
            .map(|(id, entry)| entry.view(id, now))
            .collect();
        all.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        all
    }

    /// Get all offline sources
    pub async fn offline_sources(&self) -> Vec<String> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|(_, entry)| entry.status == LivenessStatus::Offline)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

impl Default for LivenessTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Store a new status and classify the transition
fn set_status(
    identifier: &str,
    entry: &mut TrackerEntry,
    new_status: LivenessStatus,
) -> Option<SourceStatusEvent> {
    let prev = std::mem::replace(&mut entry.status, new_status);

    match (prev, new_status) {
        (LivenessStatus::Online, LivenessStatus::Offline) => {
            tracing::warn!(identifier = %identifier, "Source connection lost");
            Some(SourceStatusEvent::Lost)
        }
        (LivenessStatus::Offline, LivenessStatus::Online) => {
            tracing::info!(identifier = %identifier, "Source connection recovered");
            Some(SourceStatusEvent::Recovered)
        }
        // First result is a failure
        (LivenessStatus::Connecting, LivenessStatus::Offline) => {
            tracing::warn!(
                identifier = %identifier,
                "Source initial acquisition failed - marking as lost"
            );
            Some(SourceStatusEvent::Lost)
        }
        _ => None,
    }
}
