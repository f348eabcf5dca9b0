//! triage-core: data model for test-run failure triage.
//!
//! Holds the records exchanged between the platform client, the
//! enrichment pipeline and the report layer. Nothing here performs I/O.
//!
//! # Public API
//!
//! - [`TestCaseRecord`], [`ExecutionRef`], [`StepRecord`] -- parsed platform data
//! - [`FailureRecord`] -- one enriched failure, the pipeline's output unit
//! - [`RunDetails`], [`RunReference`] -- run metadata
//! - [`PlatformError`], [`EnrichmentError`] -- error taxonomy
//! - [`trace`] -- test-case id extraction and command-trace construction

pub mod error;
pub mod lookup;
pub mod model;
pub mod trace;

pub use error::{EnrichmentError, PlatformError};
pub use model::{
    ExecutionRef, FailingStep, FailureRecord, RunDetails, RunReference, Status, StepRecord,
    TestCaseRecord,
};

/// Placeholder used wherever a value could not be determined.
pub const NOT_AVAILABLE: &str = "N/A";

/// Error message of a failure whose failing step could not be located.
pub const NO_ERROR_DETAILS: &str = "No error details available";
