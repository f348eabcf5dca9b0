//! Test-case id extraction and command-trace reconstruction.

use std::ops::RangeInclusive;
use std::sync::LazyLock;

use regex::Regex;

use crate::model::StepRecord;
use crate::NOT_AVAILABLE;

/// How many steps before the failing one are included in the trace window.
pub const TRACE_LOOKBACK: u32 = 3;

/// Shown in place of a command that could not be recovered.
pub const NO_COMMAND_FOUND: &str = "No command found";

static TEST_CASE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"C\d+").expect("valid test case id pattern"));

/// Extract the first `C<digits>` token from a test name, or `"N/A"`.
pub fn extract_test_case_id(name: &str) -> String {
    TEST_CASE_ID
        .find(name)
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

/// Step numbers covered by the trace for a failure at `failing_step`:
/// the failing step and up to three before it, never below step 1.
pub fn trace_window(failing_step: u32) -> RangeInclusive<u32> {
    failing_step.saturating_sub(TRACE_LOOKBACK).max(1)..=failing_step
}

/// Build the command trace for a failure at `failing_step`.
///
/// Steps are matched by step number, not position, since numbering can
/// have gaps. Lines come out in ascending step order.
pub fn build_command_trace(steps: &[StepRecord], failing_step: u32) -> String {
    let window = trace_window(failing_step);
    let mut in_window: Vec<&StepRecord> = steps
        .iter()
        .filter(|s| window.contains(&s.step_number))
        .collect();
    in_window.sort_by_key(|s| s.step_number);

    in_window
        .iter()
        .map(|s| format!("Step {}: {}", s.step_number, s.command()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Tidy a command trace for display.
///
/// `Step N:` lines with nothing after the colon get `No command found`,
/// blank lines are dropped, and an empty trace becomes `No command found`.
pub fn display_command_trace(trace: &str) -> String {
    let lines: Vec<String> = trace
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| match line.split_once(':') {
            Some((label, rest)) if label.trim().starts_with("Step") && rest.trim().is_empty() => {
                format!("{}: {}", label.trim(), NO_COMMAND_FOUND)
            }
            _ => line.to_string(),
        })
        .collect();

    if lines.is_empty() {
        NO_COMMAND_FOUND.to_string()
    } else {
        lines.join("\n")
    }
}
