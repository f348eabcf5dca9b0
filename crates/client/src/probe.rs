//! Screenshot existence probe.

use std::time::Duration;

use async_trait::async_trait;
use tracing::trace;

/// What an existence check learned about a screenshot URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// The storage answered with a 2xx status.
    Found,
    /// The storage answered with any other status.
    Missing,
    /// No answer: connection error or timeout.
    Unreachable,
}

/// Answers whether a screenshot URL is retrievable.
#[async_trait]
pub trait ScreenshotProbe: Send + Sync {
    async fn check(&self, url: &str) -> Presence;
}

/// Probes with `HEAD` requests over one shared, connection-pooled agent.
#[derive(Clone)]
pub struct HttpScreenshotProbe {
    agent: ureq::Agent,
}

impl HttpScreenshotProbe {
    pub fn new(timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build()
            .into();
        HttpScreenshotProbe { agent }
    }
}

#[async_trait]
impl ScreenshotProbe for HttpScreenshotProbe {
    async fn check(&self, url: &str) -> Presence {
        let agent = self.agent.clone();
        let target = url.to_string();
        let presence = tokio::task::spawn_blocking(move || match agent.head(&target).call() {
            Ok(response) if response.status().is_success() => Presence::Found,
            Ok(_) => Presence::Missing,
            Err(_) => Presence::Unreachable,
        })
        .await
        .unwrap_or(Presence::Unreachable);
        trace!(url, ?presence, "screenshot probe");
        presence
    }
}
