//! `triage serve` -- HTTP JSON API for the triage UI.
//!
//! Request handlers validate their input, resolve the suite and hand off
//! to the platform client and the failure pipeline.
//!
//! Endpoints:
//! - GET  /health                        - Server status and configured suites
//! - POST /api/generate-report           - Enrich a run's failures and write the report file
//! - POST /api/compare-runs              - Every test case of a run with its status
//! - POST /api/download-summary-report   - Multi-run summary spreadsheet
//! - POST /api/load-failed-tests         - A run's failures, listing data only
//! - POST /api/rerun-failed              - Rerun every failed test case of a run
//! - POST /api/rerun-selected            - Rerun the given test cases
//! - GET  /api/download-report/{filename} - A previously generated report
//!
//! Errors are JSON `{"error": "..."}` bodies.

mod handlers;
mod state;

pub use state::AppState;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use self::handlers::{
    handle_compare_runs, handle_download_report, handle_download_summary_report,
    handle_generate_report, handle_health, handle_load_failed_tests, handle_not_found,
    handle_rerun_failed, handle_rerun_selected,
};

/// Maximum request body size: 10 MB.
const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

pub const DEFAULT_PORT: u16 = 5000;

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({"error": message})))
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/generate-report", post(handle_generate_report))
        .route("/api/compare-runs", post(handle_compare_runs))
        .route(
            "/api/download-summary-report",
            post(handle_download_summary_report),
        )
        .route("/api/load-failed-tests", post(handle_load_failed_tests))
        .route("/api/rerun-failed", post(handle_rerun_failed))
        .route("/api/rerun-selected", post(handle_rerun_selected))
        .route("/api/download-report/{filename}", get(handle_download_report))
        .fallback(handle_not_found)
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Serve on `0.0.0.0:<port>` until Ctrl+C.
pub async fn start_server(port: u16, state: AppState) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        suites = ?state.config().suite_names(),
        reports_dir = %state.reports_dir().display(),
        "starting server"
    );
    let app = build_router(Arc::new(state));

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("triage listening on http://{}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("server shut down");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received shutdown signal"),
        Err(e) => {
            warn!(error = %e, "could not listen for Ctrl+C; serving until killed");
            std::future::pending::<()>().await;
        }
    }
}
