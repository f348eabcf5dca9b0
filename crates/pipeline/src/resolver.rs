//! Screenshot resolution.
//!
//! Candidate URLs are probed for existence. When a candidate is missing,
//! its `_highlighted` sibling (same name, suffix inserted before the
//! extension) is tried exactly once. A candidate whose check failed
//! outright gets no second attempt.

use std::sync::Arc;

use tracing::{debug, warn};
use triage_client::{Presence, ScreenshotProbe};

use crate::pool::TaskPool;
use crate::settings::DEFAULT_SCREENSHOT_BASE_URL;

/// Storage naming scheme for step screenshots:
/// `{base}/web-app_{executionUuid}_{stepNumber}.png`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenshotTemplate {
    base_url: String,
}

impl ScreenshotTemplate {
    pub fn new(base_url: impl Into<String>) -> Self {
        ScreenshotTemplate {
            base_url: base_url.into(),
        }
    }

    pub fn candidate(&self, execution_uuid: &str, step_number: u32) -> String {
        format!(
            "{}/web-app_{}_{}.png",
            self.base_url.trim_end_matches('/'),
            execution_uuid,
            step_number
        )
    }
}

impl Default for ScreenshotTemplate {
    fn default() -> Self {
        ScreenshotTemplate::new(DEFAULT_SCREENSHOT_BASE_URL)
    }
}

/// `.../name.png` -> `.../name_highlighted.png`.
///
/// `None` when the last path segment has no extension.
pub fn highlighted_variant(url: &str) -> Option<String> {
    let name_start = url.rfind('/').map(|i| i + 1).unwrap_or(0);
    let dot = name_start + url[name_start..].rfind('.')?;
    if dot == name_start {
        return None;
    }
    Some(format!("{}_highlighted{}", &url[..dot], &url[dot..]))
}

/// Probes candidate screenshot URLs through a bounded pool.
#[derive(Clone)]
pub struct ScreenshotResolver {
    probe: Arc<dyn ScreenshotProbe>,
    pool: TaskPool,
}

impl ScreenshotResolver {
    pub fn new(probe: Arc<dyn ScreenshotProbe>, pool: TaskPool) -> Self {
        ScreenshotResolver { probe, pool }
    }

    /// The retrievable URL for `url` (itself or its highlighted variant).
    pub async fn probe(&self, url: &str) -> Option<String> {
        probe_one(self.probe.as_ref(), url).await
    }

    /// Probe every URL concurrently. Output is positional: element `i`
    /// is the result for `urls[i]`, whatever order the probes finish in.
    pub async fn probe_batch(&self, urls: &[String]) -> Vec<Option<String>> {
        if urls.is_empty() {
            return Vec::new();
        }

        let tasks: Vec<_> = urls
            .iter()
            .map(|url| {
                let probe = Arc::clone(&self.probe);
                let url = url.clone();
                async move { probe_one(probe.as_ref(), &url).await }
            })
            .collect();

        let resolved: Vec<Option<String>> = self
            .pool
            .run_ordered(tasks)
            .await
            .into_iter()
            .zip(urls)
            .map(|(result, url)| {
                result.unwrap_or_else(|e| {
                    warn!(%url, error = %e, "screenshot probe task failed");
                    None
                })
            })
            .collect();

        let available = resolved.iter().filter(|r| r.is_some()).count();
        debug!(available, total = urls.len(), "screenshot probes complete");
        resolved
    }
}

async fn probe_one(probe: &dyn ScreenshotProbe, url: &str) -> Option<String> {
    if url.is_empty() {
        return None;
    }
    match probe.check(url).await {
        Presence::Found => return Some(url.to_string()),
        Presence::Unreachable => return None,
        Presence::Missing => {}
    }
    let highlighted = highlighted_variant(url)?;
    match probe.check(&highlighted).await {
        Presence::Found => Some(highlighted),
        Presence::Missing | Presence::Unreachable => None,
    }
}
