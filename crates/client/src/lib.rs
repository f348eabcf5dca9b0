//! Remote test platform client.
//!
//! Typed wrappers for run lookup, paginated test-case listing,
//! execution-detail fetch and rerun triggering, plus the screenshot
//! existence probe. HTTP is done with `ureq` inside
//! `tokio::task::spawn_blocking`, behind async traits so the pipeline can
//! be driven by in-memory fakes.

pub mod platform;
pub mod probe;
pub mod suite;

pub use platform::{HttpPlatformClient, PlatformClient, RerunReceipt, RerunRequest, PAGE_SIZE};
pub use probe::{HttpScreenshotProbe, Presence, ScreenshotProbe};
pub use suite::SuiteConfig;
