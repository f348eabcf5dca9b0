//! Application state.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use triage_client::{HttpPlatformClient, HttpScreenshotProbe, ScreenshotProbe};

use crate::config::{AppConfig, ConfigError};

/// Shared across request handlers. Read-only after startup.
pub struct AppState {
    config: AppConfig,
    reports_dir: PathBuf,
    /// One connection-pooled probe for all screenshot checks.
    probe: Arc<dyn ScreenshotProbe>,
}

impl AppState {
    pub fn new(config: AppConfig, reports_dir: PathBuf) -> Self {
        let probe = Arc::new(HttpScreenshotProbe::new(config.pipeline.probe_timeout()));
        AppState {
            config,
            reports_dir,
            probe,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    pub(crate) fn probe(&self) -> Arc<dyn ScreenshotProbe> {
        Arc::clone(&self.probe)
    }

    /// A platform client for the named suite.
    pub(crate) fn client(&self, suite: &str) -> Result<HttpPlatformClient, ConfigError> {
        let suite = self.config.suite(suite)?;
        Ok(HttpPlatformClient::new(
            suite.clone(),
            self.config.pipeline.request_timeout(),
        ))
    }
}
