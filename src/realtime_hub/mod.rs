//! RealtimeHub - WebSocket distribution of source reports
//!
//! ## Responsibilities
//!
//! - WebSocket connection management
//! - Broadcasting snapshots and status changes to every display

use crate::status_reporter::{LivenessStatus, ReportOutcome, SourceReport};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Hub message types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum HubMessage {
    /// New frame for a polling source
    Snapshot(SnapshotMessage),
    /// Status change without a new frame
    Status(StatusMessage),
}

/// Snapshot message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMessage {
    pub identifier: String,
    /// `data:` URI of the frame
    pub image: String,
    /// Capture time, milliseconds since the epoch
    pub timestamp: i64,
    pub status: LivenessStatus,
}

/// Status message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusMessage {
    pub identifier: String,
    pub status: LivenessStatus,
}

impl From<&SourceReport> for HubMessage {
    fn from(report: &SourceReport) -> Self {
        match &report.outcome {
            ReportOutcome::Snapshot { image, timestamp } => HubMessage::Snapshot(SnapshotMessage {
                identifier: report.identifier.clone(),
                image: image.clone(),
                timestamp: timestamp.timestamp_millis(),
                status: LivenessStatus::Online,
            }),
            ReportOutcome::Status(status) => HubMessage::Status(StatusMessage {
                identifier: report.identifier.clone(),
                status: *status,
            }),
        }
    }
}

/// Client connection
struct ClientConnection {
    id: Uuid,
    tx: mpsc::UnboundedSender<String>,
}

/// RealtimeHub instance
pub struct RealtimeHub {
    connections: RwLock<HashMap<Uuid, ClientConnection>>,
    connection_count: AtomicU64,
}

impl RealtimeHub {
    /// Create new RealtimeHub
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            connection_count: AtomicU64::new(0),
        }
    }

    /// Register a new client
    pub async fn register(&self) -> (Uuid, mpsc::UnboundedReceiver<String>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        {
            let mut connections = self.connections.write().await;
            connections.insert(id, ClientConnection { id, tx });
        }

        self.connection_count.fetch_add(1, Ordering::Relaxed);

        tracing::info!(connection_id = %id, "Client connected");

        (id, rx)
    }

    /// Unregister a client
    pub async fn unregister(&self, id: &Uuid) {
        let mut connections = self.connections.write().await;
        if connections.remove(id).is_some() {
            self.connection_count.fetch_sub(1, Ordering::Relaxed);
            tracing::info!(connection_id = %id, "Client disconnected");
        }
    }

    /// Broadcast message to all clients
    pub async fn broadcast(&self, message: HubMessage) {
        let json = match serde_json::to_string(&message) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize message");
                return;
            }
        };

        let connections = self.connections.read().await;
        for conn in connections.values() {
            if let Err(e) = conn.tx.send(json.clone()) {
                tracing::warn!(connection_id = %conn.id, error = %e, "Failed to send message");
            }
        }
    }

    /// Get connection count
    pub fn connection_count(&self) -> u64 {
        self.connection_count.load(Ordering::Relaxed)
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn test_broadcast_reaches_all_clients() {
        let hub = RealtimeHub::new();
        let (_a, mut rx_a) = hub.register().await;
        let (b, mut rx_b) = hub.register().await;
        assert_eq!(hub.connection_count(), 2);

        hub.broadcast(HubMessage::Status(StatusMessage {
            identifier: "camA".to_string(),
            status: LivenessStatus::Offline,
        }))
        .await;

        let expected = r#"{"type":"status","data":{"identifier":"camA","status":"offline"}}"#;
        assert_eq!(rx_a.recv().await.unwrap(), expected);
        assert_eq!(rx_b.recv().await.unwrap(), expected);

        hub.unregister(&b).await;
        assert_eq!(hub.connection_count(), 1);
    }

    #[test]
    fn test_snapshot_report_message() {
        let report = SourceReport {
            identifier: "camA".to_string(),
            outcome: ReportOutcome::Snapshot {
                image: "data:image/jpeg;base64,AA==".to_string(),
                timestamp: Utc.timestamp_millis_opt(1_700_000_000_123).unwrap(),
            },
        };

        let json = serde_json::to_value(HubMessage::from(&report)).unwrap();
        assert_eq!(json["type"], "snapshot");
        assert_eq!(json["data"]["identifier"], "camA");
        assert_eq!(json["data"]["timestamp"], 1_700_000_000_123i64);
        assert_eq!(json["data"]["status"], "online");
    }
}
