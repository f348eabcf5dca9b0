//! Remote test platform client.
//!
//! [`PlatformClient`] is the seam the pipeline and the server depend on;
//! [`HttpPlatformClient`] talks to the real API. Every request carries the
//! suite's static token in the `auth-token` header.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use triage_core::model::steps_from_json;
use triage_core::{PlatformError, RunDetails, StepRecord, TestCaseRecord};

use crate::suite::SuiteConfig;

/// Test cases requested per listing page.
pub const PAGE_SIZE: usize = 100;

/// Body of a rerun request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RerunRequest {
    pub test_case_uuids: Vec<String>,
    pub custom_name: String,
    /// URL of the application under test.
    pub url: String,
}

/// What the platform answers when a rerun is queued.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RerunReceipt {
    #[serde(default)]
    pub task_id: Option<Value>,
    #[serde(default)]
    pub queue_id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
}

/// Operations the triage pipeline needs from the test platform.
///
/// Implementations must be `Send + Sync` so one client can be shared by
/// every enrichment task of a batch.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Look up a run and check that it belongs to this suite's application.
    async fn run_details(&self, run_id: &str) -> Result<RunDetails, PlatformError>;

    /// Every test case of the run, in platform order.
    ///
    /// A failing page ends pagination early; whatever was accumulated so
    /// far is returned.
    async fn list_test_cases(&self, run_id: &str) -> Vec<TestCaseRecord>;

    /// Ordered steps of one execution, or `None` if they could not be fetched.
    async fn execution_details(
        &self,
        run_id: &str,
        test_case_uuid: &str,
        execution_uuid: &str,
    ) -> Option<Vec<StepRecord>>;

    /// Queue a rerun of the given test cases.
    async fn trigger_rerun(&self, request: &RerunRequest) -> Result<RerunReceipt, PlatformError>;
}

/// Status and raw text of a completed HTTP exchange.
struct Reply {
    status: u16,
    body: String,
}

impl Reply {
    fn json(&self) -> Result<Value, PlatformError> {
        serde_json::from_str(&self.body).map_err(|e| PlatformError::Decode(e.to_string()))
    }
}

/// [`PlatformClient`] backed by blocking `ureq` calls.
///
/// The agent has a global deadline per request so that abandoned calls
/// (e.g. after an enrichment task timed out) are bounded.
#[derive(Clone)]
pub struct HttpPlatformClient {
    suite: SuiteConfig,
    agent: ureq::Agent,
}

impl HttpPlatformClient {
    pub fn new(suite: SuiteConfig, request_timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(request_timeout))
            .build()
            .into();
        HttpPlatformClient { suite, agent }
    }

    async fn get(&self, url: String) -> Result<Reply, PlatformError> {
        let agent = self.agent.clone();
        let token = self.suite.auth_token.clone();
        tokio::task::spawn_blocking(move || {
            let response = agent
                .get(&url)
                .header("auth-token", token.as_str())
                .call()
                .map_err(|e| PlatformError::transport(e.to_string()))?;
            read_reply(response)
        })
        .await
        .map_err(|e| PlatformError::transport(format!("task join error: {}", e)))?
    }

    async fn post_json(&self, url: String, body: Value) -> Result<Reply, PlatformError> {
        let agent = self.agent.clone();
        let token = self.suite.auth_token.clone();
        tokio::task::spawn_blocking(move || {
            let response = agent
                .post(&url)
                .header("auth-token", token.as_str())
                .header("Content-Type", "application/json")
                .send_json(&body)
                .map_err(|e| PlatformError::transport(e.to_string()))?;
            read_reply(response)
        })
        .await
        .map_err(|e| PlatformError::transport(format!("task join error: {}", e)))?
    }
}

fn read_reply(response: ureq::http::Response<ureq::Body>) -> Result<Reply, PlatformError> {
    let status = response.status().as_u16();
    let body = response
        .into_body()
        .read_to_string()
        .map_err(|e| PlatformError::transport(format!("failed to read response body: {}", e)))?;
    Ok(Reply { status, body })
}

#[async_trait]
impl PlatformClient for HttpPlatformClient {
    async fn run_details(&self, run_id: &str) -> Result<RunDetails, PlatformError> {
        let url = format!("{}/runs/{}", self.suite.api_base(), run_id);
        let expected = self.suite.application_id();
        debug!(run_id, %url, expected_application = expected, "fetching run details");

        let reply = self.get(url).await?;
        if reply.status != 200 {
            warn!(run_id, status = reply.status, body = %reply.body, "run lookup failed");
            return Err(PlatformError::from_status(reply.status, reply.body));
        }

        let details = RunDetails::from_json(&reply.json()?)
            .ok_or_else(|| PlatformError::Decode("run details are not a JSON object".into()))?;

        // A run without an application id is accepted as-is.
        if let Some(actual) = details.application_id() {
            if actual != expected {
                warn!(run_id, expected, actual, "run belongs to a different application");
                return Err(PlatformError::SuiteMismatch {
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                });
            }
        }

        info!(run_id, status = details.status(), "run details loaded");
        Ok(details)
    }

    async fn list_test_cases(&self, run_id: &str) -> Vec<TestCaseRecord> {
        let mut test_cases = Vec::new();
        let mut fetched = 0usize;
        let mut page = 0usize;

        loop {
            let url = format!(
                "{}/runs/{}/testcases?page={}&size={}",
                self.suite.api_base(),
                run_id,
                page,
                PAGE_SIZE
            );
            debug!(run_id, page, "fetching test case page");

            let reply = match self.get(url).await {
                Ok(reply) if reply.status == 200 => reply,
                Ok(reply) => {
                    warn!(run_id, page, status = reply.status, "test case page failed; stopping pagination");
                    break;
                }
                Err(e) => {
                    warn!(run_id, page, error = %e, "test case page failed; stopping pagination");
                    break;
                }
            };
            let body = match reply.json() {
                Ok(body) => body,
                Err(e) => {
                    warn!(run_id, page, error = %e, "unreadable test case page; stopping pagination");
                    break;
                }
            };

            let data = body.get("data").unwrap_or(&body);
            let items = match data.get("content").and_then(Value::as_array) {
                Some(items) if !items.is_empty() => items,
                _ => break,
            };
            fetched += items.len();
            test_cases.extend(items.iter().filter_map(TestCaseRecord::from_json));

            let total = data
                .get("totalElements")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            debug!(run_id, page, fetched, total, "test case page loaded");
            if fetched as u64 >= total {
                break;
            }
            page += 1;
        }

        info!(run_id, count = test_cases.len(), "test cases fetched");
        test_cases
    }

    async fn execution_details(
        &self,
        run_id: &str,
        test_case_uuid: &str,
        execution_uuid: &str,
    ) -> Option<Vec<StepRecord>> {
        let url = format!(
            "{}/runs/{}/testcases/{}/executions/{}",
            self.suite.api_base(),
            run_id,
            test_case_uuid,
            execution_uuid
        );

        let reply = match self.get(url).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(run_id, test_case_uuid, execution_uuid, error = %e, "execution fetch failed");
                return None;
            }
        };
        if reply.status != 200 {
            warn!(run_id, test_case_uuid, execution_uuid, status = reply.status, "execution fetch failed");
            return None;
        }

        match reply.json() {
            Ok(body) => Some(steps_from_json(&body)),
            Err(e) => {
                warn!(run_id, test_case_uuid, execution_uuid, error = %e, "unreadable execution details");
                None
            }
        }
    }

    async fn trigger_rerun(&self, request: &RerunRequest) -> Result<RerunReceipt, PlatformError> {
        let url = self.suite.rerun_endpoint();
        info!(%url, count = request.test_case_uuids.len(), custom_name = %request.custom_name, "triggering rerun");

        let body = serde_json::to_value(request).map_err(|e| PlatformError::Decode(e.to_string()))?;
        let reply = self.post_json(url, body).await?;

        match reply.status {
            200 | 201 => {
                let receipt: RerunReceipt = serde_json::from_str(&reply.body)
                    .map_err(|e| PlatformError::Decode(e.to_string()))?;
                info!(status = reply.status, task_id = ?receipt.task_id, "rerun queued");
                Ok(receipt)
            }
            status => {
                warn!(status, body = %reply.body, "rerun rejected");
                Err(PlatformError::Rejected {
                    status,
                    body: reply.body,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client_for(server: &MockServer) -> HttpPlatformClient {
        let mut suite = SuiteConfig::new("tok", server.url("/api/v1/apps/app_42"));
        suite.rerun_base_url = Some(server.url("/rerun/v1"));
        HttpPlatformClient::new(suite, Duration::from_secs(5))
    }

    fn page(content: Value, total: u64) -> Value {
        json!({"data": {"content": content, "totalElements": total}})
    }

    #[tokio::test]
    async fn run_details_ok_with_data_envelope() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/v1/apps/app_42/runs/r1")
                    .header("auth-token", "tok");
                then.status(200).json_body(json!({
                    "data": {"applicationId": "app_42", "status": "Failed", "customName": "nightly"}
                }));
            })
            .await;

        let details = client_for(&server).run_details("r1").await.unwrap();
        mock.assert_async().await;
        assert_eq!(details.custom_name(), "nightly");
        assert_eq!(details.status(), "Failed");
    }

    #[tokio::test]
    async fn run_details_suite_mismatch_skips_listing() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/apps/app_42/runs/r9");
                then.status(200).json_body(json!({"applicationId": "app_99"}));
            })
            .await;
        let listing = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/apps/app_42/runs/r9/testcases");
                then.status(200).json_body(page(json!([]), 0));
            })
            .await;

        let err = client_for(&server).run_details("r9").await.unwrap_err();
        assert_eq!(
            err,
            PlatformError::SuiteMismatch {
                expected: "app_42".into(),
                actual: "app_99".into()
            }
        );
        listing.assert_calls_async(0).await;
    }

    #[tokio::test]
    async fn run_details_status_mapping() {
        let server = MockServer::start_async().await;
        for (run, status) in [("missing", 404), ("denied", 403), ("broken", 503)] {
            server
                .mock_async(|when, then| {
                    when.method(GET).path(format!("/api/v1/apps/app_42/runs/{}", run));
                    then.status(status).body("nope");
                })
                .await;
        }
        let client = client_for(&server);

        assert_eq!(client.run_details("missing").await, Err(PlatformError::NotFound));
        assert_eq!(
            client.run_details("denied").await,
            Err(PlatformError::AuthFailed { status: 403 })
        );
        assert!(matches!(
            client.run_details("broken").await,
            Err(PlatformError::Transport {
                status: Some(503),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn run_details_unreachable_host_is_transport() {
        let suite = SuiteConfig::new("tok", "http://127.0.0.1:1/api/v1/apps/app_42");
        let client = HttpPlatformClient::new(suite, Duration::from_secs(2));
        assert!(matches!(
            client.run_details("r1").await,
            Err(PlatformError::Transport { status: None, .. })
        ));
    }

    #[tokio::test]
    async fn listing_pages_until_total() {
        let server = MockServer::start_async().await;
        let first: Vec<Value> = (0..100)
            .map(|i| json!({"testCaseUuid": format!("u{}", i), "name": format!("C{} test", i), "status": "Passed"}))
            .collect();
        let second: Vec<Value> = (100..150)
            .map(|i| json!({"testCaseUuid": format!("u{}", i), "name": format!("C{} test", i), "status": "Failed"}))
            .collect();
        let p0 = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/v1/apps/app_42/runs/r1/testcases")
                    .query_param("page", "0")
                    .query_param("size", "100");
                then.status(200).json_body(page(json!(first), 150));
            })
            .await;
        let p1 = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/v1/apps/app_42/runs/r1/testcases")
                    .query_param("page", "1");
                then.status(200).json_body(page(json!(second), 150));
            })
            .await;

        let cases = client_for(&server).list_test_cases("r1").await;
        p0.assert_async().await;
        p1.assert_async().await;
        assert_eq!(cases.len(), 150);
        assert_eq!(cases[0].uuid.as_deref(), Some("u0"));
        assert_eq!(cases[149].uuid.as_deref(), Some("u149"));
    }

    #[tokio::test]
    async fn listing_keeps_partial_results_on_page_error() {
        let server = MockServer::start_async().await;
        let first: Vec<Value> = (0..100)
            .map(|i| json!({"testCaseUuid": format!("u{}", i), "status": "Passed"}))
            .collect();
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/v1/apps/app_42/runs/r1/testcases")
                    .query_param("page", "0");
                then.status(200).json_body(page(json!(first), 300));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/v1/apps/app_42/runs/r1/testcases")
                    .query_param("page", "1");
                then.status(500).body("overloaded");
            })
            .await;

        let cases = client_for(&server).list_test_cases("r1").await;
        assert_eq!(cases.len(), 100);
    }

    #[tokio::test]
    async fn listing_stops_on_empty_page() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/apps/app_42/runs/r1/testcases");
                then.status(200).json_body(page(json!([]), 40));
            })
            .await;

        assert!(client_for(&server).list_test_cases("r1").await.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn execution_details_accepts_both_shapes() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/v1/apps/app_42/runs/r1/testcases/tc1/executions/ex1");
                then.status(200)
                    .json_body(json!([{"step": 1, "status": "Passed"}, {"step": 2, "status": "Failed"}]));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/v1/apps/app_42/runs/r1/testcases/tc2/executions/ex2");
                then.status(200)
                    .json_body(json!({"data": [{"step": 1, "status": "Error"}]}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/v1/apps/app_42/runs/r1/testcases/tc3/executions/ex3");
                then.status(500);
            })
            .await;
        let client = client_for(&server);

        let bare = client.execution_details("r1", "tc1", "ex1").await.unwrap();
        assert_eq!(bare.len(), 2);
        assert!(bare[1].is_failure());

        let wrapped = client.execution_details("r1", "tc2", "ex2").await.unwrap();
        assert_eq!(wrapped.len(), 1);

        assert!(client.execution_details("r1", "tc3", "ex3").await.is_none());
    }

    #[tokio::test]
    async fn rerun_posts_json_to_rerun_host() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/rerun/v1/apps/app_42/retest")
                    .header("auth-token", "tok")
                    .json_body(json!({
                        "testCaseUuids": ["u1", "u2"],
                        "customName": "Rerun of failed tests - r1",
                        "url": "https://shop.example.com"
                    }));
                then.status(201)
                    .json_body(json!({"taskId": "t-1", "queueId": 7, "result": "queued"}));
            })
            .await;

        let receipt = client_for(&server)
            .trigger_rerun(&RerunRequest {
                test_case_uuids: vec!["u1".into(), "u2".into()],
                custom_name: "Rerun of failed tests - r1".into(),
                url: "https://shop.example.com".into(),
            })
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(receipt.task_id, Some(json!("t-1")));
        assert_eq!(receipt.queue_id, Some(json!(7)));
    }

    #[tokio::test]
    async fn rerun_rejection_surfaces_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/rerun/v1/apps/app_42/retest");
                then.status(422).body("{\"error\":\"unknown test case\"}");
            })
            .await;

        let err = client_for(&server)
            .trigger_rerun(&RerunRequest {
                test_case_uuids: vec!["bogus".into()],
                custom_name: "x".into(),
                url: "https://shop.example.com".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(
            err,
            PlatformError::Rejected {
                status: 422,
                body: "{\"error\":\"unknown test case\"}".into()
            }
        );
    }
}
