//! Application state
//!
//! Holds all shared components and state

use crate::acquirer::{SnapshotAcquirer, DEFAULT_CAPTURE_PROGRAM};
use crate::error::Result;
use crate::liveness_tracker::LivenessTracker;
use crate::realtime_hub::RealtimeHub;
use crate::scheduler::Scheduler;
use crate::source_config::SourceConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use std::time::{Duration, Instant};

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// JSON file with sources configured at start-up
    pub sources_file: PathBuf,
    /// Local capture executable
    pub capture_program: String,
    /// Period of the liveness re-evaluation
    pub liveness_check: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            sources_file: std::env::var("SOURCES_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("sources.json")),
            capture_program: std::env::var("CAPTURE_PROGRAM")
                .unwrap_or_else(|_| DEFAULT_CAPTURE_PROGRAM.to_string()),
            liveness_check: std::env::var("LIVENESS_CHECK_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(Duration::from_millis(1000)),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// Scheduler (acquisition loops)
    pub scheduler: Scheduler<SnapshotAcquirer>,
    /// LivenessTracker (displayed status)
    pub tracker: Arc<LivenessTracker>,
    /// RealtimeHub (WebSocket)
    pub realtime: Arc<RealtimeHub>,
    /// Process start time
    pub started_at: Instant,
    /// Orders tracker and scheduler updates of concurrent configures
    configure_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        scheduler: Scheduler<SnapshotAcquirer>,
        tracker: Arc<LivenessTracker>,
        realtime: Arc<RealtimeHub>,
    ) -> Self {
        Self {
            config,
            scheduler,
            tracker,
            realtime,
            started_at: Instant::now(),
            configure_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Register a source with the tracker and (re)configure its loop.
    ///
    /// The tracker is registered first so the first report of the new
    /// loop finds its entry. A rejected configure removes an entry it
    /// created.
    pub async fn configure_source(&self, identifier: &str, config: SourceConfig) -> Result<()> {
        let _guard = self.configure_lock.lock().await;

        let created = self.tracker.register(identifier, &config).await;
        let result = self.scheduler.configure(identifier, config).await;
        if result.is_err() && created {
            self.tracker.remove(identifier).await;
        }
        result
    }
}
