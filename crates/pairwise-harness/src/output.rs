//! Rendering generated suites as table, CSV, or JSON.

use std::borrow::Cow;

use clap::ValueEnum;
use pairwise_core::{SearchResult, SearchSummary};
use serde::Serialize;
use serde::ser::SerializeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Csv,
    Json,
}

/// Space-padded columns separated by two spaces.
#[must_use]
pub fn format_table(headers: &[String], rows: &[Vec<String>]) -> String {
    if headers.is_empty() {
        return String::new();
    }
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }
    let render = |cells: &[String]| {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, &w)| format!("{cell:<w$}"))
            .collect();
        padded.join("  ").trim_end().to_string()
    };
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(render(headers));
    lines.extend(rows.iter().map(|row| render(row)));
    lines.join("\n")
}

/// Quote a CSV field when it holds a delimiter, quote, or line break.
#[must_use]
pub fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

#[must_use]
pub fn format_csv(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    for record in std::iter::once(headers).chain(rows.iter().map(Vec::as_slice)) {
        let fields: Vec<Cow<'_, str>> = record.iter().map(|f| csv_field(f)).collect();
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

/// One case as an object keyed by display name, in canonical column order.
struct CaseObject<'a> {
    headers: &'a [String],
    row: &'a [String],
}

impl Serialize for CaseObject<'_> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.headers.len()))?;
        for (header, cell) in self.headers.iter().zip(self.row) {
            map.serialize_entry(header, cell)?;
        }
        map.end()
    }
}

#[derive(Serialize)]
struct JsonDocument<'a> {
    metadata: SearchSummary,
    test_cases: Vec<CaseObject<'a>>,
}

/// `{"metadata": {...}, "test_cases": [...]}`, pretty-printed.
pub fn format_json(
    headers: &[String],
    rows: &[Vec<String>],
    metadata: SearchSummary,
) -> Result<String, serde_json::Error> {
    let doc = JsonDocument {
        metadata,
        test_cases: rows
            .iter()
            .map(|row| CaseObject { headers, row })
            .collect(),
    };
    serde_json::to_string_pretty(&doc)
}

/// Render a search result in `format`.
pub fn render(format: OutputFormat, result: &SearchResult) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Table => Ok(format_table(&result.headers, &result.rows)),
        OutputFormat::Csv => Ok(format_csv(&result.headers, &result.rows)),
        OutputFormat::Json => format_json(&result.headers, &result.rows, result.summary()),
    }
}

/// True when `rows` table/CSV rows must not go to stdout.
///
/// JSON output and writes to `--out` are never suppressed.
#[must_use]
pub fn suppress_stdout(
    format: OutputFormat,
    rows: usize,
    max_output_cases: usize,
    print_all: bool,
    to_file: bool,
) -> bool {
    !to_file && !print_all && format != OutputFormat::Json && rows > max_output_cases
}
