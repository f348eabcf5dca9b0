//! Pipeline tuning knobs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::batch::ResultOrder;

/// Where the platform stores step screenshots.
pub const DEFAULT_SCREENSHOT_BASE_URL: &str = "https://files-to-test.s3.amazonaws.com";

/// Widths, deadlines and the screenshot storage location.
///
/// The request deadline is kept below the task timeout so that a timed
/// out enrichment task cannot leave an HTTP call running much longer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Concurrent enrichment tasks. Narrow to respect platform rate limits.
    pub enrich_width: usize,
    pub task_timeout_secs: u64,
    /// Concurrent screenshot probes per batch.
    pub probe_width: usize,
    pub probe_timeout_millis: u64,
    /// Hard deadline for a single platform request.
    pub request_timeout_secs: u64,
    pub screenshot_base_url: String,
    pub result_order: ResultOrder,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        PipelineSettings {
            enrich_width: 3,
            task_timeout_secs: 30,
            probe_width: 10,
            probe_timeout_millis: 2_000,
            request_timeout_secs: 25,
            screenshot_base_url: DEFAULT_SCREENSHOT_BASE_URL.to_string(),
            result_order: ResultOrder::Input,
        }
    }
}

impl PipelineSettings {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_millis)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
