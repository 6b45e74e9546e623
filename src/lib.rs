//! picam-poller Library
//!
//! Per-source camera frame polling with liveness tracking
//!
//! ## Architecture (7 Components)
//!
//! 1. SourceConfig - Per-source options and coercion of loose input
//! 2. Acquirer - One frame per call (local capture or HTTP snapshot)
//! 3. Scheduler - Per-source polling loops (timer, pause, generations)
//! 4. StatusReporter - Frame/failure reports and error log throttling
//! 5. LivenessTracker - Displayed online/offline status
//! 6. RealtimeHub - WebSocket distribution
//! 7. WebAPI - REST API endpoints
//!
//! ## Design Principles
//!
//! - One in-flight acquisition per source
//! - Superseded loops never report

pub mod acquirer;
pub mod error;
pub mod liveness_tracker;
pub mod models;
pub mod realtime_hub;
pub mod report_relay;
pub mod scheduler;
pub mod source_config;
pub mod state;
pub mod status_reporter;
pub mod web_api;

pub use error::{Error, Result};
pub use state::AppState;
