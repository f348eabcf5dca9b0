//! Per-suite connection settings.
//!
//! A suite bundles the static auth token and the read API base URL of one
//! platform application, e.g.
//!
//! ```json
//! { "auth_token": "tok_...", "base_url": "https://api2.testrigor.com/api/v1/apps/app_42" }
//! ```

use serde::{Deserialize, Serialize};

/// Host serving the rerun endpoint. Differs from the read API host.
pub const DEFAULT_RERUN_BASE_URL: &str = "https://api.testrigor.com/api/v1";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteConfig {
    #[serde(default)]
    pub auth_token: String,
    /// Read API base, ending in `/apps/<applicationId>`.
    #[serde(default)]
    pub base_url: String,
    /// Overrides [`DEFAULT_RERUN_BASE_URL`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerun_base_url: Option<String>,
}

impl SuiteConfig {
    pub fn new(auth_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        SuiteConfig {
            auth_token: auth_token.into(),
            base_url: base_url.into(),
            rerun_base_url: None,
        }
    }

    /// Both the token and the base URL are set.
    pub fn is_complete(&self) -> bool {
        !self.auth_token.is_empty() && !self.base_url.is_empty()
    }

    /// The application id: the path segment after the last `/apps/`.
    /// Falls back to the whole base URL when it has no `/apps/` segment.
    pub fn application_id(&self) -> &str {
        let base = self.base_url.trim_end_matches('/');
        base.rsplit_once("/apps/").map(|(_, id)| id).unwrap_or(base)
    }

    /// Read API base without a trailing slash.
    pub fn api_base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// `POST` target for triggering a rerun of this suite's application.
    pub fn rerun_endpoint(&self) -> String {
        let base = self
            .rerun_base_url
            .as_deref()
            .unwrap_or(DEFAULT_RERUN_BASE_URL)
            .trim_end_matches('/');
        format!("{}/apps/{}/retest", base, self.application_id())
    }
}
