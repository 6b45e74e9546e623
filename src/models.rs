//! Shared API models

use crate::source_config::SourceMode;
use crate::status_reporter::LivenessStatus;
use serde::{Deserialize, Serialize};

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_sec: u64,
    pub sources: usize,
    pub offline: usize,
    pub clients: u64,
}

/// One row of the source listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceView {
    pub identifier: String,
    pub mode: SourceMode,
    pub paused: bool,
    pub in_progress: bool,
    pub timer_pending: bool,
    /// Displayed status, absent if the tracker has not seen the source
    pub status: Option<LivenessStatus>,
}
