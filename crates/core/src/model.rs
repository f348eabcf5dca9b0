//! Records parsed from the test platform and produced by the pipeline.

use std::collections::BTreeMap;
use std::fmt;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::lookup::{
    self, COMMAND_FIELDS, ERROR_SCREENSHOT_FIELDS, INLINE_MESSAGE_FIELDS, STEP_SCREENSHOT_FIELDS,
};
use crate::trace;
use crate::NOT_AVAILABLE;

const UNKNOWN_TEST: &str = "Unknown Test";

// ──────────────────────────────────────────────
// Status
// ──────────────────────────────────────────────

/// Outcome reported by the platform for a test case or a step.
///
/// Matched case-insensitively; anything unrecognised is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Status {
    Passed,
    Failed,
    Error,
    Other(String),
}

impl Status {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "passed" => Status::Passed,
            "failed" => Status::Failed,
            "error" => Status::Error,
            _ => Status::Other(raw.to_string()),
        }
    }

    /// `Failed` and `Error` both count as failures.
    pub fn is_failure(&self) -> bool {
        matches!(self, Status::Failed | Status::Error)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Status::Passed => "Passed",
            Status::Failed => "Failed",
            Status::Error => "Error",
            Status::Other(raw) => raw,
        }
    }

    fn from_field(obj: &Map<String, Value>) -> Self {
        Status::parse(obj.get("status").and_then(Value::as_str).unwrap_or(""))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Status::parse(&raw))
    }
}

// ──────────────────────────────────────────────
// Run metadata
// ──────────────────────────────────────────────

/// Which suite a run is being looked up under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReference {
    pub run_id: String,
    pub suite: String,
}

impl RunReference {
    pub fn new(run_id: impl Into<String>, suite: impl Into<String>) -> Self {
        RunReference {
            run_id: run_id.into(),
            suite: suite.into(),
        }
    }
}

/// Run metadata as returned by the run lookup endpoint.
///
/// The platform's field set is open-ended, so the raw object is kept and
/// the handful of fields we care about are exposed through accessors.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RunDetails {
    fields: Map<String, Value>,
}

impl RunDetails {
    /// Parse a run lookup response, unwrapping an optional `data` envelope.
    /// Returns `None` when neither the body nor its `data` is an object.
    pub fn from_json(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let fields = match obj.get("data") {
            Some(Value::Object(inner)) => inner.clone(),
            _ => obj.clone(),
        };
        Some(RunDetails { fields })
    }

    pub fn application_id(&self) -> Option<&str> {
        lookup::first_string(&self.fields, &["applicationId"])
    }

    pub fn status(&self) -> &str {
        lookup::first_string(&self.fields, &["status"]).unwrap_or(NOT_AVAILABLE)
    }

    /// The run's custom name, as shown in the failure report header.
    pub fn custom_name(&self) -> &str {
        lookup::first_string(&self.fields, &["customName"]).unwrap_or(NOT_AVAILABLE)
    }

    pub fn run_name(&self) -> &str {
        lookup::first_string(&self.fields, &["customName", "name"]).unwrap_or(NOT_AVAILABLE)
    }

    pub fn run_date(&self) -> &str {
        lookup::first_string(&self.fields, &["startTime", "createdAt"]).unwrap_or(NOT_AVAILABLE)
    }

    /// URL of the application under test; needed to trigger a rerun.
    pub fn app_url(&self) -> Option<&str> {
        lookup::first_string(&self.fields, &["url", "applicationUrl"])
    }
}

// ──────────────────────────────────────────────
// Test cases and steps
// ──────────────────────────────────────────────

/// Reference to one execution of a test case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRef {
    pub uuid: Option<String>,
}

/// One test case entry from a run's test-case listing.
#[derive(Debug, Clone, PartialEq)]
pub struct TestCaseRecord {
    pub uuid: Option<String>,
    /// Name as listed; see [`TestCaseRecord::display_name`] for the fallback.
    pub name: Option<String>,
    pub status: Status,
    /// Most recent execution first, as ordered by the platform.
    pub execution_refs: Vec<ExecutionRef>,
    pub reference_name: Option<String>,
    /// Failure text the listing already carries, if any.
    pub inline_message: Option<String>,
}

impl TestCaseRecord {
    /// Parse one element of the listing's `content` array.
    pub fn from_json(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let execution_refs = obj
            .get("executions")
            .and_then(Value::as_array)
            .map(|executions| {
                executions
                    .iter()
                    .map(|e| ExecutionRef {
                        uuid: e
                            .get("uuid")
                            .and_then(Value::as_str)
                            .filter(|s| !s.is_empty())
                            .map(str::to_string),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(TestCaseRecord {
            uuid: lookup::first_string(obj, &["testCaseUuid"]).map(str::to_string),
            name: obj.get("name").and_then(Value::as_str).map(str::to_string),
            status: Status::from_field(obj),
            execution_refs,
            reference_name: lookup::first_string(obj, &["referenceName"]).map(str::to_string),
            inline_message: lookup::first_string(obj, INLINE_MESSAGE_FIELDS).map(str::to_string),
        })
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNKNOWN_TEST)
    }

    /// `C<digits>` token from the name, or `"N/A"`.
    pub fn test_case_id(&self) -> String {
        trace::extract_test_case_id(self.display_name())
    }

    pub fn is_failure(&self) -> bool {
        self.status.is_failure()
    }

    /// Only the first execution is ever inspected.
    pub fn latest_execution(&self) -> Option<&ExecutionRef> {
        self.execution_refs.first()
    }
}

/// One executed step of a test case execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub step_number: u32,
    pub status: Status,
    /// `stepDescription`; kept even when empty.
    pub description: Option<String>,
    pub command_fields: BTreeMap<String, String>,
    pub screenshot_fields: BTreeMap<String, String>,
    pub nested_errors: Vec<BTreeMap<String, String>>,
}

impl StepRecord {
    /// Parse a step. `position` is its zero-based index in the execution,
    /// used as the step number when the platform omits a valid one.
    pub fn from_json(value: &Value, position: usize) -> Option<Self> {
        let obj = value.as_object()?;
        let fallback = u32::try_from(position + 1).unwrap_or(u32::MAX);
        let step_number = obj
            .get("step")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .filter(|n| *n >= 1)
            .unwrap_or(fallback);

        let nested_errors = obj
            .get("errors")
            .and_then(Value::as_array)
            .map(|errors| {
                errors
                    .iter()
                    .filter_map(Value::as_object)
                    .map(|e| lookup::collect_fields(e, ERROR_SCREENSHOT_FIELDS))
                    .collect()
            })
            .unwrap_or_default();

        Some(StepRecord {
            step_number,
            status: Status::from_field(obj),
            description: obj
                .get("stepDescription")
                .and_then(Value::as_str)
                .map(str::to_string),
            command_fields: lookup::collect_fields(obj, COMMAND_FIELDS),
            screenshot_fields: lookup::collect_fields(obj, STEP_SCREENSHOT_FIELDS),
            nested_errors,
        })
    }

    pub fn is_failure(&self) -> bool {
        self.status.is_failure()
    }

    /// Command text for the trace: first command-like field, else the
    /// step description, else `"N/A"`.
    pub fn command(&self) -> &str {
        lookup::first_present(&self.command_fields, COMMAND_FIELDS)
            .or(self.description.as_deref())
            .unwrap_or(NOT_AVAILABLE)
    }

    pub fn direct_screenshot(&self) -> Option<&str> {
        lookup::first_present(&self.screenshot_fields, STEP_SCREENSHOT_FIELDS)
    }

    /// First screenshot found in the step's nested error objects.
    pub fn nested_screenshot(&self) -> Option<&str> {
        self.nested_errors
            .iter()
            .find_map(|fields| lookup::first_present(fields, ERROR_SCREENSHOT_FIELDS))
    }
}

/// Normalise an execution-detail response into its ordered steps.
///
/// Accepts a bare array, or an object wrapping the array under `data`
/// or `steps` (possibly `{"data": {"steps": [...]}}`).
pub fn steps_from_json(value: &Value) -> Vec<StepRecord> {
    let mut current = value;
    for _ in 0..2 {
        match current {
            Value::Array(_) => break,
            Value::Object(obj) => match obj.get("data").or_else(|| obj.get("steps")) {
                Some(inner) => current = inner,
                None => break,
            },
            _ => break,
        }
    }

    current
        .as_array()
        .map(|steps| {
            steps
                .iter()
                .enumerate()
                .filter_map(|(position, step)| StepRecord::from_json(step, position))
                .collect()
        })
        .unwrap_or_default()
}

// ──────────────────────────────────────────────
// FailureRecord
// ──────────────────────────────────────────────

/// Step number of the failing step, or `"N/A"` when none was located.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailingStep {
    Number(u32),
    #[default]
    NotAvailable,
}

impl fmt::Display for FailingStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailingStep::Number(n) => write!(f, "{}", n),
            FailingStep::NotAvailable => f.write_str(NOT_AVAILABLE),
        }
    }
}

impl Serialize for FailingStep {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FailingStep::Number(n) => serializer.serialize_u32(*n),
            FailingStep::NotAvailable => serializer.serialize_str(NOT_AVAILABLE),
        }
    }
}

/// One enriched failure. Built once per failed test case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub test_case_id: String,
    pub test_case_uuid: Option<String>,
    pub test_name: String,
    pub status: Status,
    pub failing_step: FailingStep,
    /// Newline-joined `Step <n>: <command>` lines; empty when unknown.
    pub command_trace: String,
    pub error_message: String,
    /// Retrievable screenshots in ascending step order.
    pub screenshot_urls: Vec<String>,
}

impl FailureRecord {
    /// A record carrying only identity fields and `error_message`.
    pub fn placeholder(test_case: &TestCaseRecord, error_message: impl Into<String>) -> Self {
        FailureRecord {
            test_case_id: test_case.test_case_id(),
            test_case_uuid: test_case.uuid.clone(),
            test_name: test_case.display_name().to_string(),
            status: test_case.status.clone(),
            failing_step: FailingStep::NotAvailable,
            command_trace: String::new(),
            error_message: error_message.into(),
            screenshot_urls: Vec::new(),
        }
    }

    /// Single-screenshot view kept for older consumers.
    pub fn screenshot_url(&self) -> Option<&str> {
        self.screenshot_urls.first().map(String::as_str)
    }
}

/// Serialises with the field names the UI and report consumers expect
/// (`screenshot_number`, `failed_command`, singular `screenshot_url`).
impl Serialize for FailureRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let failed_command = if self.command_trace.is_empty() {
            NOT_AVAILABLE
        } else {
            self.command_trace.as_str()
        };
        let mut state = serializer.serialize_struct("FailureRecord", 9)?;
        state.serialize_field("test_case_id", &self.test_case_id)?;
        state.serialize_field("test_case_uuid", &self.test_case_uuid)?;
        state.serialize_field("test_name", &self.test_name)?;
        state.serialize_field("status", &self.status)?;
        state.serialize_field("screenshot_number", &self.failing_step)?;
        state.serialize_field("failed_command", failed_command)?;
        state.serialize_field("error_message", &self.error_message)?;
        state.serialize_field("screenshot_url", &self.screenshot_url())?;
        state.serialize_field("screenshot_urls", &self.screenshot_urls)?;
        state.end()
    }
}
