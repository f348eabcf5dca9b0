//! Rerun triggering, shared by the HTTP server and the `rerun` subcommand.

use serde_json::Value;
use tracing::info;

use triage_client::{PlatformClient, RerunReceipt, RerunRequest};
use triage_core::PlatformError;

/// Which test cases of a run to queue again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RerunScope {
    /// Every failed test case of the run.
    Failed,
    /// Exactly these test case uuids.
    Selected(Vec<String>),
}

impl RerunScope {
    fn default_name(&self, run_id: &str) -> String {
        match self {
            RerunScope::Failed => format!("Rerun of failed tests - {}", run_id),
            RerunScope::Selected(_) => format!("Rerun selected tests - {}", run_id),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            RerunScope::Failed => "failed",
            RerunScope::Selected(_) => "selected",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RerunError {
    #[error("No test case UUIDs provided")]
    NothingSelected,

    #[error("Failed to fetch run details: {0}")]
    RunLookup(#[source] PlatformError),

    #[error("Application URL not found in run details. Cannot trigger rerun.")]
    MissingAppUrl,

    #[error("No test cases found for this run")]
    NoTestCases,

    #[error("No failed test cases found in this run")]
    NoFailures,

    #[error("Failed to trigger rerun: {body}")]
    Rejected { status: u16, body: String },

    #[error("Failed to trigger rerun: {0}")]
    Platform(#[source] PlatformError),
}

/// A rerun the platform accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct RerunOutcome {
    pub count: usize,
    pub message: String,
    pub receipt: RerunReceipt,
}

impl RerunOutcome {
    /// The `{success, message, failed_tests_count, task_id, queue_id, result}`
    /// envelope returned to the UI.
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "success": true,
            "message": self.message,
            "failed_tests_count": self.count,
            "task_id": self.receipt.task_id,
            "queue_id": self.receipt.queue_id,
            "result": self.receipt.result,
        })
    }
}

/// Queue a rerun of `scope` for `run_id`.
///
/// The run is looked up first: its application URL is part of the rerun
/// request, and the lookup rejects runs of other suites.
pub async fn trigger(
    client: &dyn PlatformClient,
    run_id: &str,
    scope: RerunScope,
    custom_name: Option<String>,
) -> Result<RerunOutcome, RerunError> {
    if matches!(&scope, RerunScope::Selected(uuids) if uuids.is_empty()) {
        return Err(RerunError::NothingSelected);
    }

    let run = client
        .run_details(run_id)
        .await
        .map_err(RerunError::RunLookup)?;
    let app_url = run.app_url().ok_or(RerunError::MissingAppUrl)?.to_string();

    let custom_name = custom_name.unwrap_or_else(|| scope.default_name(run_id));
    let label = scope.label();
    let test_case_uuids = match scope {
        RerunScope::Selected(uuids) => uuids,
        RerunScope::Failed => {
            let test_cases = client.list_test_cases(run_id).await;
            if test_cases.is_empty() {
                return Err(RerunError::NoTestCases);
            }
            let failed: Vec<String> = test_cases
                .into_iter()
                .filter(|tc| tc.is_failure())
                .filter_map(|tc| tc.uuid)
                .collect();
            if failed.is_empty() {
                return Err(RerunError::NoFailures);
            }
            failed
        }
    };

    let count = test_case_uuids.len();
    info!(run_id, count, scope = label, "requesting rerun");
    let request = RerunRequest {
        test_case_uuids,
        custom_name,
        url: app_url,
    };
    let receipt = client
        .trigger_rerun(&request)
        .await
        .map_err(|e| match e {
            PlatformError::Rejected { status, body } => RerunError::Rejected { status, body },
            other => RerunError::Platform(other),
        })?;

    Ok(RerunOutcome {
        count,
        message: format!("Successfully triggered rerun of {} {} test(s)", count, label),
        receipt,
    })
}
