//! Parameter model, validation, and the oracle text grammar.
//!
//! Grammar: one parameter per line, `name: v1, v2, v3`. Blank lines and lines
//! starting with `#` or `//` are comments. User files may use arbitrary display
//! names; the copy handed to the oracle uses generated safe names.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::safe_name::make_safe_name;

/// Minimum number of parameters for a generation run.
pub const MIN_PARAMETERS: usize = 2;
/// Minimum number of values per parameter.
pub const MIN_VALUES: usize = 2;

/// Characters that cannot appear inside a value.
const FORBIDDEN_VALUE_CHARS: [char; 3] = [',', '\t', '\n'];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("Parameter name cannot be empty.")]
    EmptyName,
    #[error("Duplicate parameter name detected: '{name}'")]
    DuplicateName { name: String },
    #[error("Parameter '{parameter}' contains an empty value.")]
    EmptyValue { parameter: String },
    #[error(
        "Parameter '{parameter}' value '{value}' contains invalid characters (comma, tab, newline)."
    )]
    InvalidValue { parameter: String, value: String },
    #[error("Parameter '{parameter}' contains duplicate value (case-insensitive): '{value}'")]
    DuplicateValue { parameter: String, value: String },
    #[error("Parameter '{parameter}' must have at least 2 distinct values.")]
    TooFewValues { parameter: String, count: usize },
    #[error("Model must contain at least 2 parameters.")]
    TooFewParameters { count: usize },
    #[error("Unknown parameter: '{name}'")]
    UnknownParameter { name: String },
    #[error("Missing colon in parameter definition: '{text}'")]
    MissingColon { text: String },
    #[error("Line {line}: {source}")]
    Line {
        line: usize,
        #[source]
        source: Box<ModelError>,
    },
}

impl ModelError {
    fn at_line(self, line: usize) -> Self {
        Self::Line {
            line,
            source: Box::new(self),
        }
    }
}

/// Advisory size ceilings for a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    pub max_params: usize,
    pub max_values_per_param: usize,
    pub max_total_values: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_params: 50,
            max_values_per_param: 50,
            max_total_values: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LimitExceeded {
    #[error("Model has {count} parameters, exceeding limit of {limit} by {}.", .count - .limit)]
    Params { count: usize, limit: usize },
    #[error(
        "Parameter '{parameter}' has {count} values, exceeding limit of {limit} by {}.",
        .count - .limit
    )]
    ValuesPerParam {
        parameter: String,
        count: usize,
        limit: usize,
    },
    #[error("Model has {count} total values, exceeding limit of {limit} by {}.", .count - .limit)]
    TotalValues { count: usize, limit: usize },
}

impl LimitExceeded {
    /// How far the observed size is past the limit.
    #[must_use]
    pub fn excess(&self) -> usize {
        match self {
            Self::Params { count, limit }
            | Self::ValuesPerParam { count, limit, .. }
            | Self::TotalValues { count, limit } => count - limit,
        }
    }
}

/// One parameter of the system under test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Parameter {
    display_name: String,
    values: Vec<String>,
    safe_name: String,
}

impl Parameter {
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    #[must_use]
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Identifier used only when talking to the generation oracle.
    #[must_use]
    pub fn safe_name(&self) -> &str {
        &self.safe_name
    }

    #[must_use]
    pub fn value_count(&self) -> usize {
        self.values.len()
    }
}

/// Ordered parameter catalog. Insertion order is the canonical column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Model {
    parameters: Vec<Parameter>,
    #[serde(skip)]
    issued_safe_names: BTreeSet<String>,
}

impl Model {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter after trimming and validating its name and values.
    ///
    /// On error the model is left untouched.
    pub fn add_parameter<S: AsRef<str>>(
        &mut self,
        name: &str,
        values: &[S],
    ) -> Result<&Parameter, ModelError> {
        let display_name = self.check_new_name(name, None)?;
        let values = clean_values(&display_name, values)?;
        let safe_name = make_safe_name(&display_name, &self.issued_safe_names);
        self.issued_safe_names.insert(safe_name.clone());
        self.parameters.push(Parameter {
            display_name,
            values,
            safe_name,
        });
        let idx = self.parameters.len() - 1;
        Ok(&self.parameters[idx])
    }

    /// Remove a parameter by case-insensitive display name.
    pub fn remove_parameter(&mut self, name: &str) -> Result<Parameter, ModelError> {
        let idx = self.position(name)?;
        let removed = self.parameters.remove(idx);
        self.issued_safe_names.remove(&removed.safe_name);
        Ok(removed)
    }

    /// Rename a parameter. Its safe name is regenerated from the new name.
    pub fn rename_parameter(&mut self, old: &str, new: &str) -> Result<&Parameter, ModelError> {
        let idx = self.position(old)?;
        let display_name = self.check_new_name(new, Some(idx))?;
        let old_safe = self.parameters[idx].safe_name.clone();
        self.issued_safe_names.remove(&old_safe);
        let safe_name = make_safe_name(&display_name, &self.issued_safe_names);
        self.issued_safe_names.insert(safe_name.clone());
        let param = &mut self.parameters[idx];
        param.display_name = display_name;
        param.safe_name = safe_name;
        Ok(&self.parameters[idx])
    }

    /// Replace the value list of an existing parameter.
    pub fn replace_values<S: AsRef<str>>(
        &mut self,
        name: &str,
        values: &[S],
    ) -> Result<&Parameter, ModelError> {
        let idx = self.position(name)?;
        let values = clean_values(&self.parameters[idx].display_name, values)?;
        self.parameters[idx].values = values;
        Ok(&self.parameters[idx])
    }

    #[must_use]
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Case-insensitive lookup by display name.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.position(name).ok().map(|idx| &self.parameters[idx])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Value count per parameter, in canonical order.
    #[must_use]
    pub fn counts(&self) -> Vec<usize> {
        self.parameters.iter().map(Parameter::value_count).collect()
    }

    #[must_use]
    pub fn display_names(&self) -> Vec<String> {
        self.parameters
            .iter()
            .map(|p| p.display_name.clone())
            .collect()
    }

    #[must_use]
    pub fn safe_to_display(&self) -> BTreeMap<String, String> {
        self.parameters
            .iter()
            .map(|p| (p.safe_name.clone(), p.display_name.clone()))
            .collect()
    }

    /// Parameters sorted by value count, largest first. Ties keep insertion order.
    #[must_use]
    pub fn reordered_by_cardinality_descending(&self) -> Vec<&Parameter> {
        let mut ordered: Vec<&Parameter> = self.parameters.iter().collect();
        ordered.sort_by(|a, b| b.value_count().cmp(&a.value_count()));
        ordered
    }

    /// Oracle-grammar text for all parameters in insertion order.
    #[must_use]
    pub fn serialize(&self) -> String {
        let ordered: Vec<&Parameter> = self.parameters.iter().collect();
        Self::serialize_ordered(&ordered)
    }

    /// Oracle-grammar text (`safe_name: v1, v2`) for `parameters` in the given order.
    #[must_use]
    pub fn serialize_ordered(parameters: &[&Parameter]) -> String {
        let mut out = String::new();
        for p in parameters {
            out.push_str(&p.safe_name);
            out.push_str(": ");
            out.push_str(&p.values.join(", "));
            out.push('\n');
        }
        out
    }

    /// User-dialect text keyed by display names.
    #[must_use]
    pub fn to_display_grammar(&self) -> String {
        let mut out = String::new();
        for p in &self.parameters {
            out.push_str(&format!("{}: {}\n", p.display_name, p.values.join(", ")));
        }
        out
    }

    /// Parse the model grammar. Errors carry the 1-based line number.
    pub fn parse(text: &str) -> Result<Self, ModelError> {
        let mut model = Self::new();
        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
                continue;
            }
            let Some((name_part, values_part)) = line.split_once(':') else {
                return Err(ModelError::MissingColon {
                    text: line.to_string(),
                }
                .at_line(line_no));
            };
            let name = name_part.trim();
            if name.is_empty() {
                return Err(ModelError::EmptyName.at_line(line_no));
            }
            let values: Vec<&str> = values_part.split(',').map(str::trim).collect();
            model
                .add_parameter(name, &values)
                .map_err(|e| e.at_line(line_no))?;
        }

        if model.len() < MIN_PARAMETERS {
            return Err(ModelError::TooFewParameters { count: model.len() });
        }
        Ok(model)
    }

    /// Check the model against advisory size ceilings.
    pub fn validate_limits(&self, limits: &Limits) -> Result<(), LimitExceeded> {
        if self.parameters.len() > limits.max_params {
            return Err(LimitExceeded::Params {
                count: self.parameters.len(),
                limit: limits.max_params,
            });
        }
        let mut total = 0usize;
        for p in &self.parameters {
            if p.value_count() > limits.max_values_per_param {
                return Err(LimitExceeded::ValuesPerParam {
                    parameter: p.display_name.clone(),
                    count: p.value_count(),
                    limit: limits.max_values_per_param,
                });
            }
            total += p.value_count();
        }
        if total > limits.max_total_values {
            return Err(LimitExceeded::TotalValues {
                count: total,
                limit: limits.max_total_values,
            });
        }
        Ok(())
    }

    fn position(&self, name: &str) -> Result<usize, ModelError> {
        let key = name.trim().to_lowercase();
        self.parameters
            .iter()
            .position(|p| p.display_name.to_lowercase() == key)
            .ok_or_else(|| ModelError::UnknownParameter {
                name: name.trim().to_string(),
            })
    }

    /// Trim `name` and make sure no other parameter already uses it.
    fn check_new_name(&self, name: &str, skip: Option<usize>) -> Result<String, ModelError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ModelError::EmptyName);
        }
        let key = name.to_lowercase();
        let clash = self
            .parameters
            .iter()
            .enumerate()
            .any(|(i, p)| Some(i) != skip && p.display_name.to_lowercase() == key);
        if clash {
            return Err(ModelError::DuplicateName {
                name: name.to_string(),
            });
        }
        Ok(name.to_string())
    }
}

fn clean_values<S: AsRef<str>>(parameter: &str, values: &[S]) -> Result<Vec<String>, ModelError> {
    let mut cleaned = Vec::with_capacity(values.len());
    let mut seen = BTreeSet::new();
    for raw in values {
        let value = raw.as_ref().trim();
        if value.is_empty() {
            return Err(ModelError::EmptyValue {
                parameter: parameter.to_string(),
            });
        }
        if value.contains(FORBIDDEN_VALUE_CHARS) {
            return Err(ModelError::InvalidValue {
                parameter: parameter.to_string(),
                value: value.to_string(),
            });
        }
        if !seen.insert(value.to_lowercase()) {
            return Err(ModelError::DuplicateValue {
                parameter: parameter.to_string(),
                value: value.to_string(),
            });
        }
        cleaned.push(value.to_string());
    }
    if cleaned.len() < MIN_VALUES {
        return Err(ModelError::TooFewValues {
            parameter: parameter.to_string(),
            count: cleaned.len(),
        });
    }
    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc_model() -> Model {
        let mut m = Model::new();
        m.add_parameter("A", &["A1", "A2", "A3"]).expect("A");
        m.add_parameter("B", &["B1", "B2", "B3", "B4"]).expect("B");
        m.add_parameter("C", &["C1", "C2", "C3"]).expect("C");
        m.add_parameter("D", &["D1", "D2", "D3", "D4"]).expect("D");
        m.add_parameter("E", &["E1", "E2", "E3"]).expect("E");
        m
    }

    #[test]
    fn add_parameter_trims_and_assigns_safe_name() {
        let mut m = Model::new();
        let p = m
            .add_parameter("  Operating System ", &[" Windows", "Linux  "])
            .expect("valid parameter");
        assert_eq!(p.display_name(), "Operating System");
        assert_eq!(p.values(), ["Windows", "Linux"]);
        assert_eq!(p.safe_name(), "Operating_System");
    }

    #[test]
    fn colliding_safe_names_are_suffixed() {
        let mut m = Model::new();
        m.add_parameter("OS!", &["a", "b"]).expect("first");
        let p = m.add_parameter("OS?", &["a", "b"]).expect("second");
        assert_eq!(p.safe_name(), "OS_2");
    }

    #[test]
    fn add_parameter_rejects_invalid_input_without_mutation() {
        let mut m = Model::new();
        m.add_parameter("Browser", &["Chrome", "Firefox"]).expect("seed");

        let cases: Vec<(&str, Vec<&str>)> = vec![
            ("   ", vec!["a", "b"]),
            ("browser", vec!["a", "b"]),
            ("X", vec!["a", " "]),
            ("X", vec!["a", "b\tc"]),
            ("X", vec!["Yes", "yes"]),
            ("X", vec!["only"]),
        ];
        for (name, values) in cases {
            assert!(m.add_parameter(name, &values).is_err(), "{name:?} {values:?}");
        }
        assert_eq!(m.len(), 1);
        assert_eq!(m.issued_safe_names.len(), 1);
    }

    #[test]
    fn add_parameter_error_kinds() {
        let mut m = Model::new();
        m.add_parameter("A", &["1", "2"]).expect("seed");
        assert!(matches!(
            m.add_parameter("a", &["1", "2"]),
            Err(ModelError::DuplicateName { .. })
        ));
        assert!(matches!(
            m.add_parameter("B", &["x", "X"]),
            Err(ModelError::DuplicateValue { .. })
        ));
        assert!(matches!(
            m.add_parameter("B", &["x"]),
            Err(ModelError::TooFewValues { count: 1, .. })
        ));
        assert!(matches!(
            m.add_parameter("", &["x", "y"]),
            Err(ModelError::EmptyName)
        ));
    }

    #[test]
    fn parse_skips_comments_and_blank_lines() {
        let text = "# header\n\n// another\nOS: Windows, Linux, Mac\n  Browser : Chrome , Firefox\n";
        let m = Model::parse(text).expect("valid model");
        assert_eq!(m.display_names(), ["OS", "Browser"]);
        assert_eq!(m.counts(), [3, 2]);
    }

    #[test]
    fn parse_reports_line_numbers() {
        let err = Model::parse("A: 1, 2\n\nB 1, 2\n").expect_err("missing colon");
        match err {
            ModelError::Line { line, source } => {
                assert_eq!(line, 3);
                assert!(matches!(*source, ModelError::MissingColon { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = Model::parse("A: 1, 2\nB: x, , y\n").expect_err("empty value");
        assert_eq!(
            err.to_string(),
            "Line 2: Parameter 'B' contains an empty value."
        );

        let err = Model::parse("A: 1, 2\n : x, y\n").expect_err("empty name");
        assert!(matches!(err, ModelError::Line { line: 2, .. }));
    }

    #[test]
    fn parse_requires_two_parameters() {
        let err = Model::parse("# only one\nA: 1, 2\n").expect_err("too few");
        assert_eq!(err, ModelError::TooFewParameters { count: 1 });
    }

    #[test]
    fn serialize_uses_safe_names_in_given_order() {
        let mut m = Model::new();
        m.add_parameter("Operating System", &["Win", "Mac"]).expect("os");
        m.add_parameter("RAM (GB)", &["4", "8", "16"]).expect("ram");
        assert_eq!(m.serialize(), "Operating_System: Win, Mac\nRAM_GB: 4, 8, 16\n");

        let reordered = m.reordered_by_cardinality_descending();
        assert_eq!(
            Model::serialize_ordered(&reordered),
            "RAM_GB: 4, 8, 16\nOperating_System: Win, Mac\n"
        );
    }

    #[test]
    fn display_grammar_round_trips() {
        let mut m = Model::new();
        m.add_parameter("Operating System", &["Windows 11", "macOS"]).expect("os");
        m.add_parameter("Browser", &["Chrome", "Firefox", "Safari"]).expect("browser");
        m.add_parameter("Locale", &["en-US", "de-DE"]).expect("locale");

        let parsed = Model::parse(&m.to_display_grammar()).expect("round trip");
        assert_eq!(parsed.display_names(), m.display_names());
        for (a, b) in parsed.parameters().iter().zip(m.parameters()) {
            assert_eq!(a.values(), b.values());
        }

        let oracle_copy = Model::parse(&m.serialize()).expect("oracle grammar parses");
        assert_eq!(oracle_copy.counts(), m.counts());
    }

    #[test]
    fn reorder_is_stable_descending_by_cardinality() {
        let m = abc_model();
        let names: Vec<&str> = m
            .reordered_by_cardinality_descending()
            .iter()
            .map(|p| p.display_name())
            .collect();
        assert_eq!(names, ["B", "D", "A", "C", "E"]);
        assert_eq!(m.display_names(), ["A", "B", "C", "D", "E"]);
    }

    #[test]
    fn validate_limits_reports_bound_and_excess() {
        let m = abc_model();
        assert!(m.validate_limits(&Limits::default()).is_ok());

        let err = m
            .validate_limits(&Limits {
                max_params: 3,
                ..Limits::default()
            })
            .expect_err("too many params");
        assert_eq!(err, LimitExceeded::Params { count: 5, limit: 3 });
        assert_eq!(err.excess(), 2);

        let err = m
            .validate_limits(&Limits {
                max_values_per_param: 3,
                ..Limits::default()
            })
            .expect_err("too many values");
        assert!(matches!(
            err,
            LimitExceeded::ValuesPerParam { ref parameter, count: 4, limit: 3 } if parameter == "B"
        ));

        let err = m
            .validate_limits(&Limits {
                max_total_values: 10,
                ..Limits::default()
            })
            .expect_err("too many total values");
        assert_eq!(err.excess(), 7);
        assert_eq!(
            err.to_string(),
            "Model has 17 total values, exceeding limit of 10 by 7."
        );
    }

    #[test]
    fn rename_regenerates_safe_name_and_checks_uniqueness() {
        let mut m = abc_model();
        let p = m.rename_parameter("a", "Alpha Mode").expect("rename");
        assert_eq!(p.display_name(), "Alpha Mode");
        assert_eq!(p.safe_name(), "Alpha_Mode");
        assert!(matches!(
            m.rename_parameter("Alpha Mode", "b"),
            Err(ModelError::DuplicateName { .. })
        ));
        // Case-only rename of the same parameter is allowed.
        m.rename_parameter("Alpha Mode", "ALPHA MODE").expect("case change");
        assert_eq!(m.parameters()[0].display_name(), "ALPHA MODE");
    }

    #[test]
    fn remove_and_replace_values() {
        let mut m = abc_model();
        let removed = m.remove_parameter("c").expect("remove");
        assert_eq!(removed.display_name(), "C");
        assert_eq!(m.display_names(), ["A", "B", "D", "E"]);
        assert!(matches!(
            m.remove_parameter("C"),
            Err(ModelError::UnknownParameter { .. })
        ));

        m.replace_values("A", &["x", "y"]).expect("replace");
        assert_eq!(m.parameter("a").expect("A").values(), ["x", "y"]);
        assert!(m.replace_values("A", &["x"]).is_err());
        assert_eq!(m.parameter("A").expect("A").values(), ["x", "y"]);

        let p = m.add_parameter("C", &["1", "2"]).expect("re-add");
        assert_eq!(p.safe_name(), "C");
    }
}
