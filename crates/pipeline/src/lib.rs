//! Failure-enrichment pipeline.
//!
//! Given a run's test cases, every failed one is enriched with its failing
//! step, a short command trace and screenshot evidence. Work fans out over
//! two bounded [`TaskPool`]s: a narrow one for per-failure enrichment and a
//! wider one for screenshot probes. A failure that cannot be enriched
//! degrades to a placeholder record; it is never dropped and never fails
//! the batch.

pub mod batch;
pub mod enrich;
pub mod pool;
pub mod resolver;
pub mod settings;

pub use batch::{process_minimal, BatchProcessor, ResultOrder, MINIMAL_FALLBACK_MESSAGE};
pub use enrich::FailureEnricher;
pub use pool::{TaskError, TaskOutcome, TaskPool};
pub use resolver::{highlighted_variant, ScreenshotResolver, ScreenshotTemplate};
pub use settings::PipelineSettings;
