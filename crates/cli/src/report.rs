//! Report workbooks.
//!
//! Both reports are `.xlsx` files built with `rust_xlsxwriter`. Layout is
//! computed first as plain rows ([`RowGroup`], [`OverallRow`]) and then
//! written out, so the shape of a report can be checked without reading the
//! workbook back.

use std::path::{Path, PathBuf};

use rust_xlsxwriter::{
    Color, Format, FormatAlign, FormatBorder, FormatUnderline, Url, Workbook, Worksheet, XlsxError,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};
use tracing::{debug, info};

use triage_core::trace::display_command_trace;
use triage_core::{FailureRecord, RunDetails, NOT_AVAILABLE};

pub const FAILURE_REPORT_PREFIX: &str = "TestRigor_FailureReport";
pub const SUMMARY_REPORT_PREFIX: &str = "Summary_Report";
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

pub const FAILURE_SHEET: &str = "Test Failure Report";
pub const OVERALL_SHEET: &str = "Overall Summary";
pub const DETAILED_SHEET: &str = "Detailed Summary";

pub const FAILURE_COLUMNS: [&str; 7] = [
    "Test Case ID",
    "Test Name",
    "Status",
    "Failed Screenshot#",
    "Failed Command",
    "Error Message",
    "Screenshot",
];
pub const OVERALL_COLUMNS: [&str; 8] = [
    "Run Name",
    "Run ID",
    "Run Date/Time",
    "Total Tests",
    "Passed Tests",
    "Failed Tests",
    "Valid Fail",
    "RTR",
];
pub const NO_SCREENSHOT: &str = "No screenshot available";
/// Most runs a summary compares.
pub const MAX_SUMMARY_RUNS: usize = 7;

/// Zero-based row of the failure table header.
const FAILURE_HEADER_ROW: u32 = 7;
const SCREENSHOT_COL: u16 = 6;
const FAILURE_WIDTHS: [f64; 7] = [15.0, 30.0, 12.0, 18.0, 40.0, 50.0, 30.0];
const OVERALL_HEADER_ROW: u32 = 4;
const OVERALL_WIDTHS: [f64; 8] = [25.0, 20.0, 25.0, 12.0, 12.0, 12.0, 12.0, 10.0];

const HEADER_FILL: u32 = 0x366092;
const PASSED_FILL: u32 = 0xC6EFCE;
const FAILED_FILL: u32 = 0xFFC7CE;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("could not build spreadsheet: {0}")]
    Xlsx(#[from] XlsxError),

    #[error("could not create reports directory '{}': {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not write report '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Cell formats shared by both workbooks.
struct Styles {
    title: Format,
    label: Format,
    alert: Format,
    header: Format,
    cell: Format,
    centered: Format,
    link: Format,
}

impl Styles {
    fn new() -> Self {
        let bordered = Format::new().set_border(FormatBorder::Thin);
        Styles {
            title: Format::new().set_bold().set_font_size(16),
            label: Format::new().set_bold(),
            alert: Format::new()
                .set_bold()
                .set_font_color(Color::Red)
                .set_align(FormatAlign::Left),
            header: bordered
                .clone()
                .set_bold()
                .set_font_size(12)
                .set_font_color(Color::White)
                .set_background_color(Color::RGB(HEADER_FILL))
                .set_align(FormatAlign::Center)
                .set_align(FormatAlign::VerticalCenter),
            cell: bordered
                .clone()
                .set_text_wrap()
                .set_align(FormatAlign::Top),
            centered: bordered.clone().set_align(FormatAlign::Center),
            link: bordered
                .set_font_color(Color::Blue)
                .set_underline(FormatUnderline::Single)
                .set_align(FormatAlign::Top),
        }
    }
}

// ── Failure report ───────────────────────────────────────────────────────────

/// Inputs of one run's failure report.
pub struct FailureReport<'a> {
    pub suite: &'a str,
    pub run_id: &'a str,
    pub run: &'a RunDetails,
    pub failures: &'a [FailureRecord],
    pub generated_at: OffsetDateTime,
}

/// Rows taken by one failure. The six shared columns span
/// `first_row..=last_row`; each screenshot gets its own row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowGroup {
    pub first_row: u32,
    pub last_row: u32,
    pub shared: [String; 6],
    pub screenshots: Vec<String>,
}

impl RowGroup {
    pub fn is_merged(&self) -> bool {
        self.last_row > self.first_row
    }
}

impl FailureReport<'_> {
    /// `TestRigor_FailureReport_<run_id>_<YYYYmmdd_HHMMSS>.xlsx`
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}_{}.xlsx",
            FAILURE_REPORT_PREFIX,
            file_safe(self.run_id),
            file_stamp(self.generated_at)
        )
    }

    /// Table layout, one group per failure, starting below the header row.
    pub fn row_groups(&self) -> Vec<RowGroup> {
        let mut row = FAILURE_HEADER_ROW + 1;
        self.failures
            .iter()
            .map(|failure| {
                let span = failure.screenshot_urls.len().max(1) as u32;
                let group = RowGroup {
                    first_row: row,
                    last_row: row + span - 1,
                    shared: [
                        failure.test_case_id.clone(),
                        failure.test_name.clone(),
                        failure.status.to_string(),
                        failure.failing_step.to_string(),
                        display_command_trace(&failure.command_trace),
                        failure.error_message.clone(),
                    ],
                    screenshots: failure.screenshot_urls.clone(),
                };
                row += span;
                group
            })
            .collect()
    }

    pub fn to_xlsx(&self) -> Result<Vec<u8>, ReportError> {
        let styles = Styles::new();
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name(FAILURE_SHEET)?;

        sheet.merge_range(0, 0, 0, 5, "Test Rigor Failure Report", &styles.title)?;
        let generated_on = display_time(self.generated_at);
        let details = [
            (2, 0, "Suite Name:", self.suite),
            (3, 0, "Run ID:", self.run_id),
            (4, 0, "Generated On:", generated_on.as_str()),
            (3, 3, "Run Name:", self.run.custom_name()),
            (4, 3, "Status:", self.run.status()),
        ];
        for (row, col, label, value) in details {
            sheet.write_string_with_format(row, col, label, &styles.label)?;
            sheet.write_string(row, col + 1, value)?;
        }
        sheet.write_string_with_format(5, 0, "Total Failed Tests:", &styles.label)?;
        sheet.write_number_with_format(5, 1, self.failures.len() as f64, &styles.alert)?;

        write_header(sheet, FAILURE_HEADER_ROW, &FAILURE_COLUMNS, &styles.header)?;
        for group in self.row_groups() {
            for (col, text) in group.shared.iter().enumerate() {
                let col = col as u16;
                if group.is_merged() {
                    sheet.merge_range(group.first_row, col, group.last_row, col, text, &styles.cell)?;
                } else {
                    sheet.write_string_with_format(group.first_row, col, text, &styles.cell)?;
                }
            }
            if group.screenshots.is_empty() {
                sheet.write_string_with_format(group.first_row, SCREENSHOT_COL, NO_SCREENSHOT, &styles.cell)?;
            }
            for (i, url) in group.screenshots.iter().enumerate() {
                let row = group.first_row + i as u32;
                let link = Url::new(url.as_str()).set_text(format!("Screenshot {}", i + 1));
                let linked = sheet
                    .write_url_with_format(row, SCREENSHOT_COL, link, &styles.link)
                    .map(|_| ());
                if let Err(err) = linked {
                    // Over-long or malformed links stay readable as text.
                    debug!(url = %url, error = %err, "screenshot written as text");
                    sheet.write_string_with_format(row, SCREENSHOT_COL, url, &styles.cell)?;
                }
            }
        }
        set_widths(sheet, &FAILURE_WIDTHS)?;

        Ok(workbook.save_to_buffer()?)
    }

    /// Write the report into `dir`, creating it if needed.
    pub async fn save(&self, dir: &Path) -> Result<PathBuf, ReportError> {
        let bytes = self.to_xlsx()?;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| ReportError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
        let path = dir.join(self.file_name());
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| ReportError::Write {
                path: path.clone(),
                source,
            })?;
        info!(run_id = self.run_id, failures = self.failures.len(), path = %path.display(), "failure report written");
        Ok(path)
    }
}

// ── Summary report ───────────────────────────────────────────────────────────

/// Body of a summary report request, as assembled by the comparison UI.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SummaryRequest {
    #[serde(default)]
    pub summary: RunsSummary,
    /// One object per test case: `test_case_id`, `test_name` and
    /// `run1_status` .. `run7_status`.
    #[serde(default)]
    pub detailed_tests: Vec<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunsSummary {
    pub suite: Option<String>,
    #[serde(default)]
    pub runs: Vec<RunSummary>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunSummary {
    pub run_name: Option<String>,
    pub run_id: Option<Value>,
    pub run_date: Option<String>,
    #[serde(default)]
    pub total_tests: u64,
    #[serde(default)]
    pub failed_tests: u64,
    pub valid_fail: Option<Value>,
    pub rtr: Option<Value>,
}

/// One line of the "Overall Summary" sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverallRow {
    pub run_name: String,
    pub run_id: String,
    pub run_date: String,
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    pub valid_fail: String,
    pub rtr: String,
}

impl SummaryRequest {
    /// `Summary_Report_<suite>_<YYYYmmdd_HHMMSS>.xlsx`
    pub fn file_name(&self, generated_at: OffsetDateTime) -> String {
        let suite = self.summary.suite.as_deref().unwrap_or("Unknown");
        format!(
            "{}_{}_{}.xlsx",
            SUMMARY_REPORT_PREFIX,
            file_safe(suite),
            file_stamp(generated_at)
        )
    }

    pub fn overall_rows(&self) -> Vec<OverallRow> {
        self.summary
            .runs
            .iter()
            .map(|run| OverallRow {
                run_name: run.run_name.clone().unwrap_or_else(|| NOT_AVAILABLE.to_string()),
                run_id: run.run_id.as_ref().map(value_text).unwrap_or_else(|| NOT_AVAILABLE.to_string()),
                run_date: format_run_date(run.run_date.as_deref().unwrap_or(NOT_AVAILABLE)),
                total: run.total_tests,
                passed: run.total_tests.saturating_sub(run.failed_tests),
                failed: run.failed_tests,
                valid_fail: run.valid_fail.as_ref().map(value_text).unwrap_or_else(|| "0".to_string()),
                rtr: run.rtr.as_ref().map(value_text).unwrap_or_else(|| "0%".to_string()),
            })
            .collect()
    }

    pub fn detail_header(&self) -> Vec<String> {
        let mut header = vec!["Test Case ID".to_string(), "Test Name".to_string()];
        header.extend(self.summary.runs.iter().take(MAX_SUMMARY_RUNS).enumerate().map(
            |(i, run)| match &run.run_name {
                Some(name) => format!("{} Status", name),
                None => format!("Run {} Status", i + 1),
            },
        ));
        header
    }

    /// Test case ID, name, then the statuses of the runs the test case has.
    pub fn detail_rows(&self) -> Vec<Vec<String>> {
        self.detailed_tests
            .iter()
            .map(|test| {
                let mut row = vec![field_text(test, "test_case_id"), field_text(test, "test_name")];
                row.extend(
                    (1..=MAX_SUMMARY_RUNS)
                        .filter_map(|i| test.get(&format!("run{}_status", i)))
                        .map(value_text),
                );
                row
            })
            .collect()
    }

    pub fn to_xlsx(&self, generated_at: OffsetDateTime) -> Result<Vec<u8>, ReportError> {
        let styles = Styles::new();
        let title = Format::new().set_bold().set_font_size(14);
        let mut workbook = Workbook::new();

        let overall = workbook.add_worksheet();
        overall.set_name(OVERALL_SHEET)?;
        let suite = self.summary.suite.as_deref().unwrap_or(NOT_AVAILABLE);
        overall.merge_range(0, 0, 0, 7, "Overall Summary Report", &title)?;
        overall.merge_range(1, 0, 1, 7, &format!("Suite: {}", suite), &Format::new())?;
        overall.merge_range(
            2,
            0,
            2,
            7,
            &format!("Generated: {}", display_time(generated_at)),
            &Format::new(),
        )?;
        write_header(overall, OVERALL_HEADER_ROW, &OVERALL_COLUMNS, &styles.header)?;
        for (i, run) in self.overall_rows().iter().enumerate() {
            let row = OVERALL_HEADER_ROW + 1 + i as u32;
            let centered = &styles.centered;
            overall.write_string_with_format(row, 0, &run.run_name, centered)?;
            overall.write_string_with_format(row, 1, &run.run_id, centered)?;
            overall.write_string_with_format(row, 2, &run.run_date, centered)?;
            overall.write_number_with_format(row, 3, run.total as f64, centered)?;
            overall.write_number_with_format(row, 4, run.passed as f64, centered)?;
            overall.write_number_with_format(row, 5, run.failed as f64, centered)?;
            overall.write_string_with_format(row, 6, &run.valid_fail, centered)?;
            overall.write_string_with_format(row, 7, &run.rtr, centered)?;
        }
        set_widths(overall, &OVERALL_WIDTHS)?;

        let detailed = workbook.add_worksheet();
        detailed.set_name(DETAILED_SHEET)?;
        let header = self.detail_header();
        write_header(detailed, 0, &header, &styles.header)?;
        for (i, cells) in self.detail_rows().iter().enumerate() {
            let row = 1 + i as u32;
            for (col, text) in cells.iter().enumerate() {
                let col = col as u16;
                if col < 2 {
                    detailed.write_string_with_format(row, col, text, &styles.cell)?;
                    continue;
                }
                let format = match status_fill(text) {
                    Some(fill) => styles.centered.clone().set_background_color(fill),
                    None => styles.centered.clone(),
                };
                detailed.write_string_with_format(row, col, text, &format)?;
            }
        }
        detailed.set_column_width(0, 15)?;
        detailed.set_column_width(1, 50)?;
        for col in 2..header.len() as u16 {
            detailed.set_column_width(col, 20)?;
        }

        Ok(workbook.save_to_buffer()?)
    }
}

/// Background of a status cell: green for passes, red for failures and errors.
pub fn status_fill(status: &str) -> Option<Color> {
    let status = status.to_ascii_lowercase();
    if status.contains("passed") {
        Some(Color::RGB(PASSED_FILL))
    } else if status.contains("failed") || status.contains("error") {
        Some(Color::RGB(FAILED_FILL))
    } else {
        None
    }
}

/// Render a platform timestamp as `Dec 16, 2025, 01:47 PM`.
///
/// Accepts RFC 3339 and `YYYY-mm-dd[T| ]HH:MM:SS`; anything else is
/// returned unchanged.
pub fn format_run_date(raw: &str) -> String {
    if raw.is_empty() || raw == NOT_AVAILABLE {
        return NOT_AVAILABLE.to_string();
    }
    let display = format_description!("[month repr:short] [day], [year], [hour repr:12]:[minute] [period]");

    if let Ok(at) = OffsetDateTime::parse(raw, &Rfc3339) {
        return at.format(display).unwrap_or_else(|_| raw.to_string());
    }
    let iso = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    let spaced = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    PrimitiveDateTime::parse(raw, iso)
        .or_else(|_| PrimitiveDateTime::parse(raw, spaced))
        .ok()
        .and_then(|at| at.format(display).ok())
        .unwrap_or_else(|| raw.to_string())
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// `2025-12-16 13:47:00`
pub fn display_time(at: OffsetDateTime) -> String {
    at.format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
        .unwrap_or_default()
}

fn file_stamp(at: OffsetDateTime) -> String {
    at.format(format_description!("[year][month][day]_[hour][minute][second]"))
        .unwrap_or_default()
}

/// Keep file names to a single path segment.
fn file_safe(part: &str) -> String {
    part.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => NOT_AVAILABLE.to_string(),
        other => other.to_string(),
    }
}

fn field_text(obj: &Map<String, Value>, key: &str) -> String {
    obj.get(key)
        .map(value_text)
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn write_header<S: AsRef<str>>(
    sheet: &mut Worksheet,
    row: u32,
    titles: &[S],
    format: &Format,
) -> Result<(), XlsxError> {
    for (col, title) in titles.iter().enumerate() {
        sheet.write_string_with_format(row, col as u16, title.as_ref(), format)?;
    }
    Ok(())
}

fn set_widths(sheet: &mut Worksheet, widths: &[f64]) -> Result<(), XlsxError> {
    for (col, width) in widths.iter().enumerate() {
        sheet.set_column_width(col as u16, *width)?;
    }
    Ok(())
}
