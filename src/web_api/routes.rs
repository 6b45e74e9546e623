//! API Routes

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::liveness_tracker::{SourceStatus, StreamEvent};
use crate::models::{ApiResponse, SourceView};
use crate::realtime_hub::{HubMessage, StatusMessage};
use crate::source_config::{RawSourceConfig, SourceConfig};
use crate::state::AppState;
use crate::status_reporter::LivenessStatus;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(super::health_check))
        .route("/api/sources", get(list_sources))
        .route("/api/sources/:id", get(get_source).put(configure_source))
        .route("/api/sources/:id/pause", post(pause_source))
        .route("/api/sources/:id/resume", post(resume_source))
        .route("/api/sources/:id/status", get(source_status))
        .route("/api/sources/:id/stream-event", post(stream_event))
        .route("/api/ws", get(websocket_handler))
        .with_state(state)
}

// ========================================
// Sources
// ========================================

/// GET /api/sources
async fn list_sources(State(state): State<AppState>) -> Json<ApiResponse<Vec<SourceView>>> {
    let statuses: HashMap<String, LivenessStatus> = state
        .tracker
        .all(Instant::now())
        .await
        .into_iter()
        .map(|s| (s.identifier, s.status))
        .collect();

    let views = state
        .scheduler
        .instances()
        .await
        .into_iter()
        .map(|info| SourceView {
            status: statuses.get(&info.identifier).copied(),
            identifier: info.identifier,
            mode: info.mode,
            paused: info.paused,
            in_progress: info.in_progress,
            timer_pending: info.timer_pending,
        })
        .collect();

    Json(ApiResponse::success(views))
}

/// GET /api/sources/:id
async fn get_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<SourceConfig>>> {
    state
        .scheduler
        .config(&id)
        .await
        .map(|config| Json(ApiResponse::success(config)))
        .ok_or_else(|| Error::NotFound(format!("Source {} not found", id)))
}

/// PUT /api/sources/:id
///
/// Re-sending the same configuration is harmless.
async fn configure_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<ApiResponse<SourceConfig>>> {
    if id.trim().is_empty() {
        return Err(Error::Validation("identifier must not be empty".to_string()));
    }

    let config = serde_json::from_value::<RawSourceConfig>(body)?.into_config();
    state.configure_source(&id, config.clone()).await?;

    Ok(Json(ApiResponse::success(config)))
}

/// POST /api/sources/:id/pause
async fn pause_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<String>>> {
    if !state.scheduler.pause(&id).await {
        return Err(Error::NotFound(format!("Source {} not found", id)));
    }
    Ok(Json(ApiResponse::success(id)))
}

/// POST /api/sources/:id/resume
async fn resume_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<String>>> {
    if !state.scheduler.resume(&id).await {
        return Err(Error::NotFound(format!("Source {} not found", id)));
    }
    Ok(Json(ApiResponse::success(id)))
}

/// GET /api/sources/:id/status
async fn source_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<SourceStatus>>> {
    state
        .tracker
        .status(&id, Instant::now())
        .await
        .map(|status| Json(ApiResponse::success(status)))
        .ok_or_else(|| Error::NotFound(format!("Source {} not found", id)))
}

#[derive(Debug, Deserialize)]
struct StreamEventRequest {
    event: StreamEvent,
}

/// POST /api/sources/:id/stream-event
///
/// Load/error signals from a display rendering a stream directly.
async fn stream_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<ApiResponse<SourceStatus>>> {
    let req: StreamEventRequest = serde_json::from_value(body)?;
    let now = Instant::now();
    let (status, _) = state
        .tracker
        .record_stream_event(&id, req.event, now)
        .await?;

    state
        .realtime
        .broadcast(HubMessage::Status(StatusMessage {
            identifier: id.clone(),
            status,
        }))
        .await;

    state
        .tracker
        .status(&id, now)
        .await
        .map(|status| Json(ApiResponse::success(status)))
        .ok_or_else(|| Error::NotFound(format!("Source {} not found", id)))
}

// ========================================
// WebSocket Handler
// ========================================

/// WebSocket upgrade handler
async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle WebSocket connection
async fn handle_websocket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let (conn_id, mut rx) = state.realtime.register().await;

    // Forward hub messages to the socket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) => {
                    tracing::info!(connection_id = %conn_id, "WebSocket client disconnected");
                    break;
                }
                Err(e) => {
                    tracing::warn!(connection_id = %conn_id, error = %e, "WebSocket error");
                    break;
                }
                _ => {}
            }
        }
        conn_id
    });

    let conn_id = tokio::select! {
        _ = send_task => conn_id,
        result = recv_task => result.unwrap_or(conn_id),
    };

    state.realtime.unregister(&conn_id).await;
}
