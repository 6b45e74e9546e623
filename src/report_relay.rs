//! Report relay
//!
//! Moves scheduler reports into the liveness tracker and out to
//! connected displays, and periodically re-evaluates liveness.

use crate::liveness_tracker::LivenessTracker;
use crate::realtime_hub::{HubMessage, RealtimeHub, StatusMessage};
use crate::status_reporter::SourceReport;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Forward reports until the scheduler side of the channel closes
pub async fn run_report_relay(
    mut rx: mpsc::UnboundedReceiver<SourceReport>,
    tracker: Arc<LivenessTracker>,
    hub: Arc<RealtimeHub>,
) {
    while let Some(report) = rx.recv().await {
        tracker.apply_report(&report, Instant::now()).await;
        hub.broadcast(HubMessage::from(&report)).await;
    }

    tracing::info!("Report relay stopped");
}

/// Spawn the periodic liveness evaluation
pub fn spawn_liveness_monitor(
    tracker: Arc<LivenessTracker>,
    hub: Arc<RealtimeHub>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            for change in tracker.evaluate(Instant::now()).await {
                tracing::debug!(
                    identifier = %change.identifier,
                    status = %change.status.as_str(),
                    "Liveness changed"
                );
                hub.broadcast(HubMessage::Status(StatusMessage {
                    identifier: change.identifier,
                    status: change.status,
                }))
                .await;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source_config::SourceConfig;
    use crate::status_reporter::{LivenessStatus, ReportOutcome};

    #[tokio::test(start_paused = true)]
    async fn test_relay_updates_tracker_and_broadcasts() {
        let tracker = Arc::new(LivenessTracker::new());
        let hub = Arc::new(RealtimeHub::new());
        tracker.register("camA", &SourceConfig::default()).await;
        let (_id, mut client) = hub.register().await;

        let (tx, rx) = mpsc::unbounded_channel();
        let relay = tokio::spawn(run_report_relay(rx, tracker.clone(), hub.clone()));

        tx.send(SourceReport {
            identifier: "camA".to_string(),
            outcome: ReportOutcome::Status(LivenessStatus::Offline),
        })
        .unwrap();

        let msg = client.recv().await.unwrap();
        assert!(msg.contains(r#""status":"offline""#));
        let status = tracker.status("camA", Instant::now()).await.unwrap();
        assert_eq!(status.status, LivenessStatus::Offline);

        drop(tx);
        relay.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_broadcasts_offline_after_timeout() {
        let tracker = Arc::new(LivenessTracker::new());
        let hub = Arc::new(RealtimeHub::new());
        tracker.register("camA", &SourceConfig::default()).await;
        tracker
            .apply_report(
                &SourceReport {
                    identifier: "camA".to_string(),
                    outcome: ReportOutcome::Status(LivenessStatus::Online),
                },
                Instant::now(),
            )
            .await;
        let (_id, mut client) = hub.register().await;

        let monitor = spawn_liveness_monitor(tracker.clone(), hub.clone(), Duration::from_millis(1000));

        let msg = tokio::time::timeout(Duration::from_secs(20), client.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            msg,
            r#"{"type":"status","data":{"identifier":"camA","status":"offline"}}"#
        );

        monitor.abort();
    }
}
