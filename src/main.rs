//! picam-poller
//!
//! Main entry point for the poller service.

use picam_poller::{
    acquirer::SnapshotAcquirer,
    liveness_tracker::LivenessTracker,
    realtime_hub::RealtimeHub,
    report_relay::{run_report_relay, spawn_liveness_monitor},
    scheduler::Scheduler,
    source_config::load_sources_file,
    state::{AppConfig, AppState},
    web_api,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "picam_poller=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting picam-poller v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        host = %config.host,
        port = config.port,
        sources_file = %config.sources_file.display(),
        capture_program = %config.capture_program,
        liveness_check_ms = config.liveness_check.as_millis() as u64,
        "Configuration loaded"
    );

    // Initialize components
    let acquirer = SnapshotAcquirer::new(config.capture_program.clone())?;
    tracing::info!(
        capture_program = %acquirer.capture_program(),
        "Acquirer initialized"
    );
    let (reports_tx, reports_rx) = tokio::sync::mpsc::unbounded_channel();
    let scheduler = Scheduler::new(acquirer, reports_tx);
    let tracker = Arc::new(LivenessTracker::new());
    let realtime = Arc::new(RealtimeHub::new());

    let relay = tokio::spawn(run_report_relay(
        reports_rx,
        tracker.clone(),
        realtime.clone(),
    ));
    let monitor = spawn_liveness_monitor(tracker.clone(), realtime.clone(), config.liveness_check);
    tracing::info!("Report relay and liveness monitor started");

    let state = AppState::new(config.clone(), scheduler.clone(), tracker, realtime);

    // Sources configured at start-up
    let entries = load_sources_file(&config.sources_file).await?;
    for entry in entries {
        let source_config = entry.config.into_config();
        tracing::info!(
            identifier = %entry.identifier,
            mode = %source_config.mode.as_str(),
            "Configuring source"
        );
        state.configure_source(&entry.identifier, source_config).await?;
    }

    // Build router
    let app = web_api::create_router(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown().await;
    monitor.abort();
    relay.abort();
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
