//! Suites file for `triage`.
//!
//! Maps suite names to platform credentials, plus optional pipeline
//! tuning. JSON by default; a `.toml` extension selects TOML.
//!
//! # Example
//!
//! ```json
//! {
//!   "suites": {
//!     "payments": {
//!       "auth_token": "tok_...",
//!       "base_url": "https://api2.testrigor.com/api/v1/apps/app_42"
//!     }
//!   },
//!   "pipeline": { "enrich_width": 3 }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use triage_client::SuiteConfig;
use triage_pipeline::PipelineSettings;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse '{}': {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Invalid suite: {0}")]
    UnknownSuite(String),

    #[error("Suite configuration incomplete for: {0}")]
    Incomplete(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Json,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub suites: BTreeMap<String, SuiteConfig>,
    #[serde(default)]
    pub pipeline: PipelineSettings,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, ConfigFormat::from_path(path)).map_err(|message| {
            ConfigError::Parse {
                path: path.to_path_buf(),
                message,
            }
        })
    }

    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self, String> {
        match format {
            ConfigFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
            ConfigFormat::Toml => toml::from_str(content).map_err(|e| e.to_string()),
        }
    }

    /// The named suite, if it exists and has both a token and a base URL.
    pub fn suite(&self, name: &str) -> Result<&SuiteConfig, ConfigError> {
        let suite = self
            .suites
            .get(name)
            .ok_or_else(|| ConfigError::UnknownSuite(name.to_string()))?;
        if !suite.is_complete() {
            return Err(ConfigError::Incomplete(name.to_string()));
        }
        Ok(suite)
    }

    pub fn suite_names(&self) -> Vec<&str> {
        self.suites.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_pipeline::ResultOrder;

    const JSON: &str = r#"{
        "suites": {
            "payments": {"auth_token": "tok", "base_url": "https://api2.testrigor.com/api/v1/apps/app_42"},
            "broken": {"auth_token": "", "base_url": "https://api2.testrigor.com/api/v1/apps/app_7"}
        }
    }"#;

    #[test]
    fn json_suites_with_default_pipeline() {
        let config = AppConfig::parse(JSON, ConfigFormat::Json).unwrap();
        assert_eq!(config.suite_names(), vec!["broken", "payments"]);
        assert_eq!(config.suite("payments").unwrap().application_id(), "app_42");
        assert_eq!(config.pipeline, PipelineSettings::default());
    }

    #[test]
    fn unknown_and_incomplete_suites() {
        let config = AppConfig::parse(JSON, ConfigFormat::Json).unwrap();
        assert_eq!(
            config.suite("nope").unwrap_err().to_string(),
            "Invalid suite: nope"
        );
        assert_eq!(
            config.suite("broken").unwrap_err().to_string(),
            "Suite configuration incomplete for: broken"
        );
    }

    #[test]
    fn toml_with_pipeline_overrides() {
        let content = r#"
            [suites.checkout]
            auth_token = "tok"
            base_url = "https://api2.testrigor.com/api/v1/apps/app_9"
            rerun_base_url = "http://localhost:9000/api/v1"

            [pipeline]
            enrich_width = 1
            result_order = "completion"
        "#;
        let config = AppConfig::parse(content, ConfigFormat::Toml).unwrap();
        let suite = config.suite("checkout").unwrap();
        assert_eq!(
            suite.rerun_endpoint(),
            "http://localhost:9000/api/v1/apps/app_9/retest"
        );
        assert_eq!(config.pipeline.enrich_width, 1);
        assert_eq!(config.pipeline.probe_width, 10);
        assert_eq!(config.pipeline.result_order, ResultOrder::Completion);
    }

    #[test]
    fn load_reports_path_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("config.json");
        let err = AppConfig::load(&missing).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "suites = 3").unwrap();
        let err = AppConfig::load(&bad).unwrap_err();
        assert!(err.to_string().starts_with("could not parse"));
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(ConfigFormat::from_path(Path::new("a/config.TOML")), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path(Path::new("config.json")), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path(Path::new("config")), ConfigFormat::Json);
    }
}
