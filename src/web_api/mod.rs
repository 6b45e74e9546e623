//! WebAPI - control and display endpoints
//!
//! ## Responsibilities
//!
//! - Configure / pause / resume sources
//! - Expose displayed liveness
//! - WebSocket feed of reports

mod routes;

pub use routes::create_router;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_sec: state.started_at.elapsed().as_secs(),
        sources: state.scheduler.instances().await.len(),
        offline: state.tracker.offline_sources().await.len(),
        clients: state.realtime.connection_count(),
    };

    Json(response)
}
