//! HTTP route handlers.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use time::OffsetDateTime;
use tracing::{info, warn};

use triage_client::PlatformClient;
use triage_core::trace::display_command_trace;
use triage_core::{
    FailureRecord, PlatformError, RunDetails, RunReference, TestCaseRecord, NOT_AVAILABLE,
};
use triage_pipeline::{process_minimal, BatchProcessor};

use super::json_error;
use super::state::AppState;
use crate::config::ConfigError;
use crate::report::{display_time, FailureReport, SummaryRequest, XLSX_CONTENT_TYPE};
use crate::rerun::{self, RerunError, RerunScope};

/// Shown for both an unknown run id and a run of another suite.
const RUN_MISMATCH: &str = "Suite selected and provided Run ID does not match";

// ── Errors ───────────────────────────────────────────────────────────────────

/// A failed request: status code plus the text of the `error` field.
#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        ApiError::new(StatusCode::BAD_REQUEST, message)
    }

    /// Map a run lookup failure to what the UI shows.
    fn run_lookup(err: &PlatformError) -> Self {
        match err {
            PlatformError::NotFound | PlatformError::SuiteMismatch { .. } => {
                ApiError::bad_request(RUN_MISMATCH)
            }
            PlatformError::AuthFailed { .. } => ApiError::new(
                StatusCode::UNAUTHORIZED,
                "Authentication failed. Please check API credentials",
            ),
            PlatformError::Transport {
                status: Some(status),
                ..
            }
            | PlatformError::Rejected { status, .. } => ApiError::bad_request(format!(
                "Failed to fetch run details. Status code: {}",
                status
            )),
            PlatformError::Transport { status: None, .. } | PlatformError::Decode(_) => {
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Error connecting to the test platform: {}", err),
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        json_error(self.status, &self.message).into_response()
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::bad_request(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::new(rejection.status(), rejection.body_text())
    }
}

impl From<RerunError> for ApiError {
    fn from(err: RerunError) -> Self {
        match &err {
            RerunError::RunLookup(cause) => {
                let lookup = ApiError::run_lookup(cause);
                ApiError::new(
                    lookup.status,
                    format!("Failed to fetch run details: {}", lookup.message),
                )
            }
            RerunError::Rejected { status, .. } => {
                ApiError::new(status_or_bad_gateway(*status), err.to_string())
            }
            RerunError::Platform(_) => {
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            RerunError::NothingSelected
            | RerunError::MissingAppUrl
            | RerunError::NoTestCases
            | RerunError::NoFailures => ApiError::bad_request(err.to_string()),
        }
    }
}

fn status_or_bad_gateway(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY)
}

// ── Requests ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RunRequest {
    suite: Option<String>,
    run_id: Option<String>,
    custom_name: Option<String>,
    #[serde(default)]
    test_case_uuids: Vec<String>,
}

impl RunRequest {
    /// The suite name and run id, both required.
    fn target(&self) -> Result<RunReference, ApiError> {
        let suite = self
            .suite
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ApiError::bad_request("Suite is required"))?;
        let run_id = self
            .run_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ApiError::bad_request("Run ID is required"))?;
        Ok(RunReference::new(run_id, suite))
    }
}

/// Resolve the suite's client and look the run up.
async fn open_run(
    state: &AppState,
    suite: &str,
    run_id: &str,
) -> Result<(Arc<dyn PlatformClient>, RunDetails), ApiError> {
    let client: Arc<dyn PlatformClient> = Arc::new(state.client(suite)?);
    let run = client
        .run_details(run_id)
        .await
        .map_err(|e| ApiError::run_lookup(&e))?;
    Ok((client, run))
}

fn failure_view(failure: &FailureRecord) -> Value {
    let failed_command = if failure.command_trace.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        display_command_trace(&failure.command_trace)
    };
    json!({
        "test_case_id": failure.test_case_id,
        "test_case_uuid": failure.test_case_uuid,
        "test_name": failure.test_name,
        "status": failure.status,
        "screenshot_number": failure.failing_step,
        "failed_command": failed_command,
        "error_message": failure.error_message,
        "screenshot_urls": failure.screenshot_urls,
    })
}

fn comparison_entry(test_case: &TestCaseRecord) -> Value {
    let name = test_case.name.as_deref().unwrap_or(NOT_AVAILABLE);
    let status = match test_case.status.as_str() {
        "" => NOT_AVAILABLE,
        status => status,
    };
    json!({
        "test_case_id": test_case.reference_name.as_deref().unwrap_or(name),
        "test_name": name,
        "status": status,
    })
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = json!({
        "status": "ok",
        "suites": state.config().suite_names(),
    });
    (StatusCode::OK, Json(response))
}

/// POST /api/generate-report
pub(crate) async fn handle_generate_report(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let target = request.target()?;
    let (suite, run_id) = (target.suite.as_str(), target.run_id.as_str());
    let (client, run) = open_run(&state, suite, run_id).await?;

    let test_cases = client.list_test_cases(run_id).await;
    let processor = BatchProcessor::from_settings(client, state.probe(), &state.config().pipeline);
    let failures = processor.process(run_id, &test_cases).await;

    let report = FailureReport {
        suite,
        run_id,
        run: &run,
        failures: &failures,
        generated_at: OffsetDateTime::now_utc(),
    };
    report.save(state.reports_dir()).await.map_err(|e| {
        warn!(run_id, error = %e, "report not written");
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    info!(suite, run_id, total = test_cases.len(), failed = failures.len(), "report generated");

    Ok(Json(json!({
        "success": true,
        "message": "Report generated successfully",
        "report_path": report.file_name(),
        "total_tests": test_cases.len(),
        "failed_tests": failures.len(),
        "report_data": {
            "suite_name": suite,
            "run_id": run_id,
            "run_name": run.custom_name(),
            "status": run.status(),
            "generated_on": display_time(report.generated_at),
            "failures": failures.iter().map(failure_view).collect::<Vec<_>>(),
        },
    })))
}

/// POST /api/compare-runs
pub(crate) async fn handle_compare_runs(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let target = request.target()?;
    let (suite, run_id) = (target.suite.as_str(), target.run_id.as_str());
    let (client, run) = open_run(&state, suite, run_id).await?;
    let test_cases = client.list_test_cases(run_id).await;

    Ok(Json(json!({
        "success": true,
        "run_name": run.run_name(),
        "run_date": run.run_date(),
        "total_tests": test_cases.len(),
        "all_tests": test_cases.iter().map(comparison_entry).collect::<Vec<_>>(),
    })))
}

/// POST /api/download-summary-report
pub(crate) async fn handle_download_summary_report(
    payload: Result<Json<SummaryRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    let generated_at = OffsetDateTime::now_utc();
    let file_name = request.file_name(generated_at);
    let body = request.to_xlsx(generated_at).map_err(|e| {
        warn!(error = %e, "summary report not rendered");
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    info!(runs = request.summary.runs.len(), tests = request.detailed_tests.len(), %file_name, "summary report rendered");

    Ok((
        [
            (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        body,
    )
        .into_response())
}

/// POST /api/load-failed-tests
pub(crate) async fn handle_load_failed_tests(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let target = request.target()?;
    let (suite, run_id) = (target.suite.as_str(), target.run_id.as_str());
    let (client, run) = open_run(&state, suite, run_id).await?;
    let test_cases = client.list_test_cases(run_id).await;
    let failures = process_minimal(&test_cases);

    Ok(Json(json!({
        "success": true,
        "message": "Failed tests loaded successfully",
        "total_tests": test_cases.len(),
        "failed_tests": failures.len(),
        "report_data": {
            "suite_name": suite,
            "run_id": run_id,
            "run_name": run.custom_name(),
            "status": run.status(),
            "generated_on": display_time(OffsetDateTime::now_utc()),
            "failures": failures,
        },
    })))
}

/// POST /api/rerun-failed
pub(crate) async fn handle_rerun_failed(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let target = request.target()?;
    let (suite, run_id) = (target.suite.as_str(), target.run_id.as_str());
    let client = state.client(suite)?;
    let outcome = rerun::trigger(
        &client,
        run_id,
        RerunScope::Failed,
        request.custom_name.clone(),
    )
    .await?;
    Ok(Json(outcome.to_json()))
}

/// POST /api/rerun-selected
pub(crate) async fn handle_rerun_selected(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let target = request.target()?;
    let (suite, run_id) = (target.suite.as_str(), target.run_id.as_str());
    if request.test_case_uuids.is_empty() {
        return Err(RerunError::NothingSelected.into());
    }
    let client = state.client(suite)?;
    let outcome = rerun::trigger(
        &client,
        run_id,
        RerunScope::Selected(request.test_case_uuids.clone()),
        request.custom_name.clone(),
    )
    .await?;
    Ok(Json(outcome.to_json()))
}

/// GET /api/download-report/{filename}
pub(crate) async fn handle_download_report(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    if filename.is_empty() || filename.contains(['/', '\\']) || filename.contains("..") {
        return Err(ApiError::bad_request("Invalid report name"));
    }

    let path = state.reports_dir().join(&filename);
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok((
            [
                (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", filename),
                ),
            ],
            bytes,
        )
            .into_response()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ApiError::new(StatusCode::NOT_FOUND, "Report not found"))
        }
        Err(e) => Err(ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}
