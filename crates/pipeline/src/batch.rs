//! Batch processing of a run's failures.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use triage_client::{PlatformClient, ScreenshotProbe};
use triage_core::{EnrichmentError, FailureRecord, TestCaseRecord};

use crate::enrich::FailureEnricher;
use crate::pool::{TaskError, TaskPool};
use crate::resolver::{ScreenshotResolver, ScreenshotTemplate};
use crate::settings::PipelineSettings;

/// Error message of a minimal record whose listing carried no failure text.
pub const MINIMAL_FALLBACK_MESSAGE: &str = "Test failed";

/// Order of the records a batch returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultOrder {
    /// Same order as the failed test cases in the input.
    #[default]
    Input,
    /// Order in which enrichment tasks finished. Varies between runs.
    Completion,
}

/// Fans failed test cases out to a [`FailureEnricher`] over a bounded pool.
///
/// Every failed input yields exactly one record. A task that panics or
/// exceeds the pool's timeout is replaced by a placeholder carrying the
/// reason; the batch itself never fails.
pub struct BatchProcessor {
    enricher: Arc<FailureEnricher>,
    pool: TaskPool,
    order: ResultOrder,
}

impl BatchProcessor {
    pub fn new(enricher: Arc<FailureEnricher>, pool: TaskPool) -> Self {
        BatchProcessor {
            enricher,
            pool,
            order: ResultOrder::default(),
        }
    }

    pub fn with_order(mut self, order: ResultOrder) -> Self {
        self.order = order;
        self
    }

    /// Wire up both pools, the screenshot template and the result order
    /// from `settings`.
    pub fn from_settings(
        client: Arc<dyn PlatformClient>,
        probe: Arc<dyn ScreenshotProbe>,
        settings: &PipelineSettings,
    ) -> Self {
        let resolver = ScreenshotResolver::new(probe, TaskPool::new(settings.probe_width));
        let template = ScreenshotTemplate::new(settings.screenshot_base_url.clone());
        let enricher = FailureEnricher::new(client, resolver, template);
        let pool = TaskPool::new(settings.enrich_width).with_timeout(settings.task_timeout());
        BatchProcessor::new(Arc::new(enricher), pool).with_order(settings.result_order)
    }

    pub async fn process(&self, run_id: &str, test_cases: &[TestCaseRecord]) -> Vec<FailureRecord> {
        let failed: Vec<&TestCaseRecord> = test_cases.iter().filter(|tc| tc.is_failure()).collect();
        if failed.is_empty() {
            debug!(run_id, total = test_cases.len(), "no failures to process");
            return Vec::new();
        }

        info!(
            run_id,
            total = test_cases.len(),
            failed = failed.len(),
            width = self.pool.width(),
            "processing failures"
        );

        let tasks: Vec<_> = failed
            .iter()
            .map(|tc| {
                let enricher = Arc::clone(&self.enricher);
                let run_id = run_id.to_string();
                let tc = (*tc).clone();
                async move { enricher.enrich(&run_id, &tc).await }
            })
            .collect();

        let mut outcomes = self.pool.run(tasks).await;
        if self.order == ResultOrder::Input {
            outcomes.sort_by_key(|o| o.index);
        }

        let records: Vec<FailureRecord> = outcomes
            .into_iter()
            .map(|outcome| {
                let tc = failed[outcome.index];
                outcome.result.unwrap_or_else(|err| {
                    warn!(run_id, test = tc.display_name(), error = %err, "enrichment task failed");
                    FailureRecord::placeholder(tc, placeholder_reason(&err).to_string())
                })
            })
            .collect();

        info!(run_id, records = records.len(), "failures processed");
        records
    }
}

fn placeholder_reason(err: &TaskError) -> EnrichmentError {
    match err {
        TaskError::Panicked(message) => EnrichmentError::Internal(message.clone()),
        other => EnrichmentError::Task(other.to_string()),
    }
}

/// Failure records built from the listing alone: no execution fetches,
/// no screenshots, input order kept.
pub fn process_minimal(test_cases: &[TestCaseRecord]) -> Vec<FailureRecord> {
    test_cases
        .iter()
        .filter(|tc| tc.is_failure())
        .map(|tc| {
            let message = tc
                .inline_message
                .as_deref()
                .unwrap_or(MINIMAL_FALLBACK_MESSAGE);
            FailureRecord::placeholder(tc, message)
        })
        .collect()
}
