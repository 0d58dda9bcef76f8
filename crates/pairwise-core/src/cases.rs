//! Candidate-suite import for standalone verification.
//!
//! Cases arrive as CSV (header row of display names) or JSON (an array of
//! objects, or an object carrying a `test_cases` array). Either way rows come
//! out in canonical column order, ready for the coverage verifier.

use std::path::Path;

use serde_json::Value;
use thiserror::Error;

use crate::model::Model;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CasesError {
    #[error("Cases file is empty")]
    Empty,
    #[error("Cases CSV is invalid: line {line}: {message}")]
    Csv { line: usize, message: String },
    #[error("Cases JSON is invalid: {0}")]
    Json(String),
    #[error("Cases JSON must be an array or contain a 'test_cases' array.")]
    NotAnArray,
    #[error("Each JSON case must be an object (case {index} is not).")]
    CaseNotObject { index: usize },
    #[error("Cases are missing required column(s): {}", .columns.join(", "))]
    MissingColumns { columns: Vec<String> },
    #[error("Case {index} is missing required column(s): {}", .columns.join(", "))]
    CaseMissingColumns { index: usize, columns: Vec<String> },
    #[error("Case {index} has a non-scalar value for column '{column}'")]
    NonScalarCell { index: usize, column: String },
}

/// Encoding of a candidate-suite file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseFormat {
    Csv,
    Json,
}

impl CaseFormat {
    /// `.json` files are JSON; everything else is read as CSV.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Csv,
        }
    }
}

/// Decode `text` in `format` into canonical rows for `model`.
pub fn load_cases(
    model: &Model,
    text: &str,
    format: CaseFormat,
) -> Result<Vec<Vec<String>>, CasesError> {
    match format {
        CaseFormat::Csv => cases_from_csv(model, text),
        CaseFormat::Json => cases_from_json(model, text),
    }
}

/// Read CSV cases. Extra columns are ignored; short records yield empty cells.
pub fn cases_from_csv(model: &Model, text: &str) -> Result<Vec<Vec<String>>, CasesError> {
    let mut records = parse_csv_records(text)?.into_iter();
    let header = records.next().ok_or(CasesError::Empty)?;

    let canonical = model.display_names();
    let mut mapping = Vec::with_capacity(canonical.len());
    let mut missing = Vec::new();
    for name in &canonical {
        match header.iter().position(|h| h.trim() == name.as_str()) {
            Some(col) => mapping.push(col),
            None => missing.push(name.clone()),
        }
    }
    if !missing.is_empty() {
        return Err(CasesError::MissingColumns { columns: missing });
    }

    Ok(records
        .map(|record| {
            mapping
                .iter()
                .map(|&col| record.get(col).cloned().unwrap_or_default())
                .collect()
        })
        .collect())
}

/// Read JSON cases. Scalars are stringified; `null` becomes an empty cell.
pub fn cases_from_json(model: &Model, text: &str) -> Result<Vec<Vec<String>>, CasesError> {
    if text.trim().is_empty() {
        return Err(CasesError::Empty);
    }
    let data: Value = serde_json::from_str(text).map_err(|e| CasesError::Json(e.to_string()))?;
    let cases = match &data {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("test_cases") {
            Some(Value::Array(items)) => items,
            _ => return Err(CasesError::NotAnArray),
        },
        _ => return Err(CasesError::NotAnArray),
    };

    let canonical = model.display_names();
    let mut rows = Vec::with_capacity(cases.len());
    for (index, case) in cases.iter().enumerate() {
        let Value::Object(fields) = case else {
            return Err(CasesError::CaseNotObject { index });
        };
        let missing: Vec<String> = canonical
            .iter()
            .filter(|name| !fields.contains_key(name.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(CasesError::CaseMissingColumns {
                index,
                columns: missing,
            });
        }
        let mut row = Vec::with_capacity(canonical.len());
        for name in &canonical {
            let cell = match &fields[name.as_str()] {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                Value::Bool(b) => b.to_string(),
                Value::Number(n) => n.to_string(),
                Value::Array(_) | Value::Object(_) => {
                    return Err(CasesError::NonScalarCell {
                        index,
                        column: name.clone(),
                    });
                }
            };
            row.push(cell);
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Split RFC-4180 text into records. Blank lines are skipped.
///
/// Quoted fields may contain commas, doubled quotes and line breaks.
pub fn parse_csv_records(text: &str) -> Result<Vec<Vec<String>>, CasesError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut after_quote = false;
    let mut field_started = false;
    let mut line = 1usize;
    let mut quote_line = 1usize;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => {
                    in_quotes = false;
                    after_quote = true;
                }
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }
        match c {
            ',' => {
                record.push(std::mem::take(&mut field));
                after_quote = false;
                field_started = true;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                if field_started || !field.is_empty() || after_quote || !record.is_empty() {
                    record.push(std::mem::take(&mut field));
                    records.push(std::mem::take(&mut record));
                }
                after_quote = false;
                field_started = false;
                line += 1;
            }
            _ if after_quote => {
                return Err(CasesError::Csv {
                    line,
                    message: format!("unexpected character '{c}' after closing quote"),
                });
            }
            '"' if field.is_empty() => {
                in_quotes = true;
                field_started = true;
                quote_line = line;
            }
            _ => {
                field.push(c);
                field_started = true;
            }
        }
    }

    if in_quotes {
        return Err(CasesError::Csv {
            line: quote_line,
            message: String::from("unterminated quoted field"),
        });
    }
    if field_started || !field.is_empty() || after_quote || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> Model {
        Model::parse("OS: Win, Mac\nRAM Size: 4, 8\n").expect("valid model")
    }

    #[test]
    fn csv_columns_are_reordered_and_extras_ignored() {
        let text = "Note,RAM Size,OS\nx,4,Win\ny,8,Mac\n";
        let rows = cases_from_csv(&model(), text).expect("valid csv");
        assert_eq!(rows, vec![vec!["Win", "4"], vec!["Mac", "8"]]);
    }

    #[test]
    fn csv_missing_columns_are_named() {
        let err = cases_from_csv(&model(), "OS\nWin\n").expect_err("RAM Size missing");
        assert_eq!(
            err,
            CasesError::MissingColumns {
                columns: vec![String::from("RAM Size")]
            }
        );
        assert_eq!(
            err.to_string(),
            "Cases are missing required column(s): RAM Size"
        );
    }

    #[test]
    fn empty_csv_is_rejected() {
        assert_eq!(cases_from_csv(&model(), ""), Err(CasesError::Empty));
        assert_eq!(cases_from_csv(&model(), "\n\r\n"), Err(CasesError::Empty));
    }

    #[test]
    fn short_csv_records_yield_empty_cells() {
        let rows = cases_from_csv(&model(), "OS,RAM Size\nWin\n").expect("valid csv");
        assert_eq!(rows, vec![vec!["Win", ""]]);
    }

    #[test]
    fn quoted_fields_follow_rfc4180() {
        let text = "a,\"b,c\",\"say \"\"hi\"\"\"\r\n\"multi\nline\",,\"\"\n";
        let records = parse_csv_records(text).expect("valid");
        assert_eq!(
            records,
            vec![
                vec!["a", "b,c", "say \"hi\""],
                vec!["multi\nline", "", ""],
            ]
        );
    }

    #[test]
    fn byte_order_mark_is_skipped() {
        let records = parse_csv_records("\u{feff}OS,RAM Size\nWin,4").expect("valid");
        assert_eq!(records[0][0], "OS");
        assert_eq!(records[1], ["Win", "4"]);
    }

    #[test]
    fn malformed_quotes_report_the_line() {
        let err = parse_csv_records("a,b\n\"open,c\n").expect_err("unterminated");
        assert_eq!(
            err,
            CasesError::Csv {
                line: 2,
                message: String::from("unterminated quoted field")
            }
        );
        let err = parse_csv_records("a\n\"x\"y\n").expect_err("junk after quote");
        assert!(matches!(err, CasesError::Csv { line: 2, .. }));
    }

    #[test]
    fn json_array_and_wrapped_forms_are_accepted() {
        let bare = r#"[{"OS": "Win", "RAM Size": 4}, {"RAM Size": "8", "OS": "Mac"}]"#;
        let wrapped = r#"{"metadata": {"n": 2}, "test_cases": [{"OS": "Win", "RAM Size": 4}, {"RAM Size": "8", "OS": "Mac"}]}"#;
        for text in [bare, wrapped] {
            let rows = cases_from_json(&model(), text).expect("valid json");
            assert_eq!(rows, vec![vec!["Win", "4"], vec!["Mac", "8"]]);
        }
    }

    #[test]
    fn json_structure_errors() {
        let m = model();
        assert!(matches!(cases_from_json(&m, "{not json"), Err(CasesError::Json(_))));
        assert_eq!(cases_from_json(&m, r#"{"cases": []}"#), Err(CasesError::NotAnArray));
        assert_eq!(cases_from_json(&m, "42"), Err(CasesError::NotAnArray));
        assert_eq!(
            cases_from_json(&m, r#"[{"OS": "Win", "RAM Size": "4"}, 3]"#),
            Err(CasesError::CaseNotObject { index: 1 })
        );
        assert_eq!(
            cases_from_json(&m, r#"[{"OS": "Win"}]"#),
            Err(CasesError::CaseMissingColumns {
                index: 0,
                columns: vec![String::from("RAM Size")]
            })
        );
        assert_eq!(
            cases_from_json(&m, r#"[{"OS": ["Win"], "RAM Size": "4"}]"#),
            Err(CasesError::NonScalarCell {
                index: 0,
                column: String::from("OS")
            })
        );
        assert_eq!(cases_from_json(&m, "  "), Err(CasesError::Empty));
    }

    #[test]
    fn empty_json_array_has_no_rows() {
        assert!(cases_from_json(&model(), "[]").expect("valid").is_empty());
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(CaseFormat::from_path(Path::new("cases.JSON")), CaseFormat::Json);
        assert_eq!(CaseFormat::from_path(Path::new("cases.csv")), CaseFormat::Csv);
        assert_eq!(CaseFormat::from_path(Path::new("cases")), CaseFormat::Csv);
    }
}
