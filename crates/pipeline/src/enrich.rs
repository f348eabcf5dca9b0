//! Per-failure enrichment.
//!
//! [`FailureEnricher::enrich`] turns one failed test case into a
//! [`FailureRecord`]: it fetches the latest execution, finds the first
//! failing step, rebuilds the command trace leading up to it and resolves
//! screenshot evidence. It never fails; anything that goes wrong becomes
//! placeholder text in the record's `error_message`.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::{debug, warn};

use triage_client::PlatformClient;
use triage_core::trace::{build_command_trace, trace_window};
use triage_core::{EnrichmentError, FailingStep, FailureRecord, StepRecord, TestCaseRecord};
use triage_core::NO_ERROR_DETAILS;

use crate::pool::panic_message;
use crate::resolver::{ScreenshotResolver, ScreenshotTemplate};

pub struct FailureEnricher {
    client: Arc<dyn PlatformClient>,
    resolver: ScreenshotResolver,
    template: ScreenshotTemplate,
}

impl FailureEnricher {
    pub fn new(
        client: Arc<dyn PlatformClient>,
        resolver: ScreenshotResolver,
        template: ScreenshotTemplate,
    ) -> Self {
        FailureEnricher {
            client,
            resolver,
            template,
        }
    }

    /// Build the failure record for `test_case`.
    ///
    /// Deterministic for a deterministic platform: the same inputs always
    /// produce an identical record.
    pub async fn enrich(&self, run_id: &str, test_case: &TestCaseRecord) -> FailureRecord {
        let attempt = AssertUnwindSafe(self.try_enrich(run_id, test_case))
            .catch_unwind()
            .await;
        match attempt {
            Ok(Ok(record)) => record,
            Ok(Err(reason)) => {
                debug!(run_id, test = test_case.display_name(), %reason, "failure left as placeholder");
                FailureRecord::placeholder(test_case, reason.to_string())
            }
            Err(payload) => {
                let reason = EnrichmentError::Internal(panic_message(payload.as_ref()));
                warn!(run_id, test = test_case.display_name(), %reason, "enrichment aborted");
                FailureRecord::placeholder(test_case, reason.to_string())
            }
        }
    }

    async fn try_enrich(
        &self,
        run_id: &str,
        test_case: &TestCaseRecord,
    ) -> Result<FailureRecord, EnrichmentError> {
        let test_case_uuid = test_case
            .uuid
            .as_deref()
            .ok_or(EnrichmentError::NoTestCaseUuid)?;
        let execution = test_case
            .latest_execution()
            .ok_or(EnrichmentError::NoExecutionData)?;
        let execution_uuid = execution
            .uuid
            .as_deref()
            .ok_or(EnrichmentError::NoExecutionUuid)?;

        let mut record = FailureRecord::placeholder(test_case, NO_ERROR_DETAILS);

        let Some(steps) = self
            .client
            .execution_details(run_id, test_case_uuid, execution_uuid)
            .await
        else {
            return Ok(record);
        };

        // No failing step is a tolerated outcome: the record keeps its defaults.
        let Some(failing) = steps.iter().find(|s| s.is_failure()) else {
            debug!(run_id, test_case_uuid, steps = steps.len(), "no failing step located");
            return Ok(record);
        };

        record.failing_step = FailingStep::Number(failing.step_number);
        if let Some(description) = &failing.description {
            record.error_message = description.clone();
        }
        record.command_trace = build_command_trace(&steps, failing.step_number);
        record.screenshot_urls = self.screenshots(execution_uuid, failing).await;

        debug!(
            run_id,
            test_case_id = %record.test_case_id,
            step = failing.step_number,
            screenshots = record.screenshot_urls.len(),
            "failure enriched"
        );
        Ok(record)
    }

    /// Direct step field, then nested error objects, then probed storage
    /// candidates for every step of the trace window.
    async fn screenshots(&self, execution_uuid: &str, failing: &StepRecord) -> Vec<String> {
        if let Some(url) = failing
            .direct_screenshot()
            .or_else(|| failing.nested_screenshot())
        {
            return vec![url.to_string()];
        }

        let candidates: Vec<String> = trace_window(failing.step_number)
            .map(|step| self.template.candidate(execution_uuid, step))
            .collect();
        self.resolver
            .probe_batch(&candidates)
            .await
            .into_iter()
            .flatten()
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pool::TaskPool;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::{HashMap, HashSet};
    use std::time::Duration;
    use triage_client::{Presence, RerunReceipt, RerunRequest, ScreenshotProbe};
    use triage_core::{PlatformError, RunDetails, Status};

    pub(crate) const STORE: &str = "http://store";

    /// In-memory platform keyed by execution uuid.
    #[derive(Default)]
    pub(crate) struct FakePlatform {
        pub executions: HashMap<String, Value>,
        /// Execution uuids whose fetch fails.
        pub broken: HashSet<String>,
        /// Execution uuids whose fetch panics.
        pub explosive: HashSet<String>,
        pub latency: HashMap<String, Duration>,
    }

    impl FakePlatform {
        pub fn with_execution(mut self, execution_uuid: &str, steps: Value) -> Self {
            self.executions.insert(execution_uuid.to_string(), steps);
            self
        }
    }

    #[async_trait]
    impl PlatformClient for FakePlatform {
        async fn run_details(&self, _run_id: &str) -> Result<RunDetails, PlatformError> {
            Err(PlatformError::NotFound)
        }

        async fn list_test_cases(&self, _run_id: &str) -> Vec<TestCaseRecord> {
            Vec::new()
        }

        async fn execution_details(
            &self,
            _run_id: &str,
            _test_case_uuid: &str,
            execution_uuid: &str,
        ) -> Option<Vec<StepRecord>> {
            if let Some(delay) = self.latency.get(execution_uuid) {
                tokio::time::sleep(*delay).await;
            }
            if self.explosive.contains(execution_uuid) {
                panic!("malformed execution {}", execution_uuid);
            }
            if self.broken.contains(execution_uuid) {
                return None;
            }
            self.executions
                .get(execution_uuid)
                .map(triage_core::model::steps_from_json)
        }

        async fn trigger_rerun(&self, _request: &RerunRequest) -> Result<RerunReceipt, PlatformError> {
            Err(PlatformError::transport("not supported"))
        }
    }

    /// Screenshot store holding a fixed set of objects.
    #[derive(Default)]
    pub(crate) struct FakeStore {
        pub objects: HashSet<String>,
    }

    impl FakeStore {
        pub fn holding(names: &[&str]) -> Self {
            FakeStore {
                objects: names.iter().map(|n| format!("{}/{}", STORE, n)).collect(),
            }
        }
    }

    #[async_trait]
    impl ScreenshotProbe for FakeStore {
        async fn check(&self, url: &str) -> Presence {
            if self.objects.contains(url) {
                Presence::Found
            } else {
                Presence::Missing
            }
        }
    }

    pub(crate) fn failed_case(uuid: &str, name: &str, execution: Option<&str>) -> TestCaseRecord {
        let executions: Vec<Value> = execution.map(|e| json!({"uuid": e})).into_iter().collect();
        TestCaseRecord::from_json(&json!({
            "testCaseUuid": uuid,
            "name": name,
            "status": "Failed",
            "executions": executions
        }))
        .unwrap()
    }

    pub(crate) fn enricher(platform: FakePlatform, store: FakeStore) -> FailureEnricher {
        FailureEnricher::new(
            Arc::new(platform),
            ScreenshotResolver::new(Arc::new(store), TaskPool::new(1)),
            ScreenshotTemplate::new(STORE),
        )
    }

    fn login_steps() -> Value {
        json!([
            {"step": 1, "status": "Passed", "command": "open url \"/login\""},
            {"step": 2, "status": "Passed", "action": "enter \"bob\" into \"User\""},
            {"step": 3, "status": "Passed", "stepDescription": "Typed password"},
            {"step": 4, "status": "Passed", "testCommand": "click \"Login\""},
            {"step": 5, "status": "Failed", "command": "check that page contains \"Welcome\"",
             "stepDescription": "Page does not contain \"Welcome\""},
            {"step": 6, "status": "Passed", "command": "never reached"}
        ])
    }

    #[tokio::test]
    async fn enriches_failing_step_trace_and_probed_screenshots() {
        let platform = FakePlatform::default().with_execution("ex-1", login_steps());
        let store = FakeStore::holding(&["web-app_ex-1_3.png", "web-app_ex-1_5_highlighted.png"]);
        let tc = failed_case("tc-1", "C1234 Login test", Some("ex-1"));

        let record = enricher(platform, store).enrich("run-1", &tc).await;

        assert_eq!(record.test_case_id, "C1234");
        assert_eq!(record.failing_step, FailingStep::Number(5));
        assert_eq!(record.error_message, "Page does not contain \"Welcome\"");
        assert_eq!(
            record.command_trace,
            "Step 2: enter \"bob\" into \"User\"\n\
             Step 3: Typed password\n\
             Step 4: click \"Login\"\n\
             Step 5: check that page contains \"Welcome\""
        );
        assert_eq!(
            record.screenshot_urls,
            vec![
                format!("{}/web-app_ex-1_3.png", STORE),
                format!("{}/web-app_ex-1_5_highlighted.png", STORE),
            ]
        );
    }

    #[tokio::test]
    async fn direct_screenshot_skips_probing() {
        let platform = FakePlatform::default().with_execution(
            "ex-1",
            json!([{"step": 1, "status": "error", "screenshotUrl": "https://cdn/shot.png",
                    "errors": [{"image": "https://cdn/nested.png"}]}]),
        );
        let tc = failed_case("tc-1", "C9 Smoke", Some("ex-1"));

        let record = enricher(platform, FakeStore::holding(&["web-app_ex-1_1.png"]))
            .enrich("run-1", &tc)
            .await;

        assert_eq!(record.screenshot_urls, vec!["https://cdn/shot.png".to_string()]);
        assert_eq!(record.command_trace, "Step 1: N/A");
        // no stepDescription: default message stays
        assert_eq!(record.error_message, NO_ERROR_DETAILS);
    }

    #[tokio::test]
    async fn nested_error_screenshot_is_second_choice() {
        let platform = FakePlatform::default().with_execution(
            "ex-1",
            json!({"data": [{"step": 2, "status": "Failed", "stepDescription": "boom",
                             "errors": [{"message": "x"}, {"screenshot": "https://cdn/nested.png"}]}]}),
        );
        let tc = failed_case("tc-1", "Checkout", Some("ex-1"));

        let record = enricher(platform, FakeStore::default()).enrich("run-1", &tc).await;

        assert_eq!(record.test_case_id, "N/A");
        assert_eq!(record.screenshot_urls, vec!["https://cdn/nested.png".to_string()]);
        assert_eq!(record.command_trace, "Step 2: boom");
    }

    #[tokio::test]
    async fn missing_execution_data_is_a_placeholder() {
        let tc = failed_case("tc-1", "C1 Login", None);
        let record = enricher(FakePlatform::default(), FakeStore::default())
            .enrich("run-1", &tc)
            .await;
        assert_eq!(record.error_message, "No execution data available");
        assert_eq!(record.failing_step, FailingStep::NotAvailable);
        assert!(record.command_trace.is_empty());
        assert!(record.screenshot_urls.is_empty());

        let mut no_uuid = failed_case("tc-2", "C2 Login", Some("ex-2"));
        no_uuid.execution_refs[0].uuid = None;
        let record = enricher(FakePlatform::default(), FakeStore::default())
            .enrich("run-1", &no_uuid)
            .await;
        assert_eq!(record.error_message, "No execution UUID available");

        let mut anonymous = failed_case("tc-3", "C3 Login", Some("ex-3"));
        anonymous.uuid = None;
        let record = enricher(FakePlatform::default(), FakeStore::default())
            .enrich("run-1", &anonymous)
            .await;
        assert_eq!(record.error_message, "No test case UUID available");
    }

    #[tokio::test]
    async fn failed_fetch_and_no_failing_step_keep_defaults() {
        let mut platform = FakePlatform::default()
            .with_execution("ex-ok", json!([{"step": 1, "status": "Passed"}]));
        platform.broken.insert("ex-bad".into());
        let enricher = enricher(platform, FakeStore::default());

        for execution in ["ex-bad", "ex-ok"] {
            let record = enricher
                .enrich("run-1", &failed_case("tc-1", "C5 Cart", Some(execution)))
                .await;
            assert_eq!(record.error_message, NO_ERROR_DETAILS);
            assert_eq!(record.failing_step, FailingStep::NotAvailable);
            assert_eq!(record.command_trace, "");
            assert!(record.screenshot_urls.is_empty());
            assert_eq!(record.status, Status::Failed);
        }
    }

    #[tokio::test]
    async fn panic_becomes_processing_placeholder() {
        let mut platform = FakePlatform::default();
        platform.explosive.insert("ex-1".into());
        let tc = failed_case("tc-1", "C7 Search", Some("ex-1"));

        let record = enricher(platform, FakeStore::default()).enrich("run-1", &tc).await;

        assert_eq!(record.error_message, "Error processing: malformed execution ex-1");
        assert_eq!(record.test_case_uuid.as_deref(), Some("tc-1"));
    }

    #[tokio::test]
    async fn enrichment_is_idempotent() {
        let platform = FakePlatform::default().with_execution("ex-1", login_steps());
        let store = FakeStore::holding(&["web-app_ex-1_2.png", "web-app_ex-1_4.png"]);
        let enricher = enricher(platform, store);
        let tc = failed_case("tc-1", "C1234 Login test", Some("ex-1"));

        let first = enricher.enrich("run-1", &tc).await;
        let second = enricher.enrich("run-1", &tc).await;

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn early_failure_clamps_window_at_step_one() {
        let platform = FakePlatform::default().with_execution(
            "ex-1",
            json!([
                {"step": 1, "status": "Passed", "command": "open"},
                {"step": 2, "status": "Failed", "command": "click"}
            ]),
        );
        let store = FakeStore::holding(&["web-app_ex-1_1.png", "web-app_ex-1_2.png"]);
        let tc = failed_case("tc-1", "C2 Nav", Some("ex-1"));

        let record = enricher(platform, store).enrich("run-1", &tc).await;

        assert_eq!(record.command_trace, "Step 1: open\nStep 2: click");
        assert_eq!(record.screenshot_urls.len(), 2);
        assert_eq!(record.screenshot_url(), Some("http://store/web-app_ex-1_1.png"));
    }
}
