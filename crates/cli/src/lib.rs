//! triage-cli: the `triage` server and command-line front end.
//!
//! - [`config`] -- suites file loading
//! - [`report`] -- failure and summary report files
//! - [`rerun`] -- rerun triggering
//! - [`serve`] -- HTTP API

pub mod config;
pub mod report;
pub mod rerun;
pub mod serve;
