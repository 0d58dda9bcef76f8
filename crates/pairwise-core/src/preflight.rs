//! Structural preflight over possibly malformed model input.
//!
//! Unlike [`Model::add_parameter`](crate::Model::add_parameter), preflight never
//! fails: it walks the whole input and accumulates every problem it finds, so an
//! interactively edited or untrusted model can be reported on in one pass.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::{Limits, MIN_PARAMETERS, MIN_VALUES, Model, Parameter};

/// Stable issue codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    ModelMissing,
    ModelMalformed,
    TooFewParams,
    LimitMaxParams,
    EmptyParamName,
    DuplicateParamName,
    ValuesMissing,
    TooFewValues,
    LimitMaxValuesPerParam,
    EmptyValue,
    DuplicateValue,
    LimitMaxTotalValues,
}

impl IssueCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ModelMissing => "model_missing",
            Self::ModelMalformed => "model_malformed",
            Self::TooFewParams => "too_few_params",
            Self::LimitMaxParams => "limit_max_params",
            Self::EmptyParamName => "empty_param_name",
            Self::DuplicateParamName => "duplicate_param_name",
            Self::ValuesMissing => "values_missing",
            Self::TooFewValues => "too_few_values",
            Self::LimitMaxValuesPerParam => "limit_max_values_per_param",
            Self::EmptyValue => "empty_value",
            Self::DuplicateValue => "duplicate_value",
            Self::LimitMaxTotalValues => "limit_max_total_values",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreflightIssue {
    pub code: IssueCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreflightReport {
    pub issues: Vec<PreflightIssue>,
}

impl PreflightReport {
    #[must_use]
    pub fn ok(&self) -> bool {
        self.issues.is_empty()
    }

    #[must_use]
    pub fn has(&self, code: IssueCode) -> bool {
        self.issues.iter().any(|i| i.code == code)
    }
}

/// How a model-like value exposes its parameter container.
pub enum ParametersView<'a> {
    /// No parameter container at all.
    Missing,
    /// A container exists but is not a sequence.
    Malformed,
    Present(Vec<&'a dyn ParameterView>),
}

/// Typed accessor for model-like input that may be malformed.
pub trait ModelView {
    fn parameters_view(&self) -> ParametersView<'_>;
}

/// Typed accessor for one parameter-like entry.
pub trait ParameterView {
    /// `None` when the name is absent or not text.
    fn name_view(&self) -> Option<&str>;
    /// `None` when the value list is absent or not a sequence. Non-text
    /// entries are `None` inside the list.
    fn values_view(&self) -> Option<Vec<Option<&str>>>;
}

impl ModelView for Model {
    fn parameters_view(&self) -> ParametersView<'_> {
        ParametersView::Present(
            self.parameters()
                .iter()
                .map(|p| p as &dyn ParameterView)
                .collect(),
        )
    }
}

impl ParameterView for Parameter {
    fn name_view(&self) -> Option<&str> {
        Some(self.display_name())
    }

    fn values_view(&self) -> Option<Vec<Option<&str>>> {
        Some(self.values().iter().map(|v| Some(v.as_str())).collect())
    }
}

/// Draft models arrive as JSON: `{"parameters": [{"display_name": .., "values": [..]}]}`.
impl ModelView for serde_json::Value {
    fn parameters_view(&self) -> ParametersView<'_> {
        let Some(obj) = self.as_object() else {
            return ParametersView::Malformed;
        };
        match obj.get("parameters") {
            None | Some(serde_json::Value::Null) => ParametersView::Missing,
            Some(serde_json::Value::Array(items)) => {
                ParametersView::Present(items.iter().map(|v| v as &dyn ParameterView).collect())
            }
            Some(_) => ParametersView::Malformed,
        }
    }
}

impl ParameterView for serde_json::Value {
    fn name_view(&self) -> Option<&str> {
        self.get("display_name")
            .or_else(|| self.get("name"))
            .and_then(serde_json::Value::as_str)
    }

    fn values_view(&self) -> Option<Vec<Option<&str>>> {
        let items = self.get("values")?.as_array()?;
        Some(items.iter().map(serde_json::Value::as_str).collect())
    }
}

struct IssueCollector {
    report: PreflightReport,
    seen: BTreeSet<(IssueCode, Option<String>)>,
}

impl IssueCollector {
    fn add(&mut self, code: IssueCode, message: String, field: Option<String>) {
        if !self.seen.insert((code, field.clone())) {
            return;
        }
        self.report.issues.push(PreflightIssue {
            code,
            message,
            field,
        });
    }
}

/// Validate generation preconditions without failing.
///
/// Issues are deduplicated on `(code, field)`.
#[must_use]
pub fn validate_generation_preflight(
    model: Option<&dyn ModelView>,
    limits: &Limits,
) -> PreflightReport {
    let mut out = IssueCollector {
        report: PreflightReport::default(),
        seen: BTreeSet::new(),
    };

    let Some(model) = model else {
        out.add(
            IssueCode::ModelMissing,
            String::from("Input Error: Model is missing."),
            Some(String::from("model")),
        );
        return out.report;
    };

    let params = match model.parameters_view() {
        ParametersView::Present(params) => params,
        ParametersView::Missing => {
            out.add(
                IssueCode::ModelMalformed,
                String::from("Input Error: Model is malformed (missing parameters)."),
                Some(String::from("model.parameters")),
            );
            return out.report;
        }
        ParametersView::Malformed => {
            out.add(
                IssueCode::ModelMalformed,
                String::from("Input Error: Model is malformed (invalid parameters container)."),
                Some(String::from("model.parameters")),
            );
            return out.report;
        }
    };

    let param_count = params.len();
    if param_count < MIN_PARAMETERS {
        out.add(
            IssueCode::TooFewParams,
            String::from("Input Error: At least 2 parameters are required."),
            Some(String::from("model.parameters")),
        );
    }
    if param_count > limits.max_params {
        out.add(
            IssueCode::LimitMaxParams,
            format!(
                "Model Safety Violation: Model has {param_count} parameters, exceeding limit of {}.",
                limits.max_params
            ),
            Some(String::from("model.parameters")),
        );
    }

    let mut seen_names = BTreeSet::new();
    let mut total_values = 0usize;

    for (p_idx, param) in params.iter().enumerate() {
        let ordinal = p_idx + 1;
        let p_field = format!("model.parameters[{p_idx}]");

        match param.name_view().map(str::trim) {
            Some(name) if !name.is_empty() => {
                if !seen_names.insert(name.to_lowercase()) {
                    out.add(
                        IssueCode::DuplicateParamName,
                        format!("Input Error: Duplicate parameter name detected: '{name}'."),
                        Some(format!("{p_field}.display_name")),
                    );
                }
            }
            _ => out.add(
                IssueCode::EmptyParamName,
                format!("Input Error: Parameter #{ordinal} has an empty name."),
                Some(format!("{p_field}.display_name")),
            ),
        }

        let values_field = format!("{p_field}.values");
        let Some(values) = param.values_view() else {
            out.add(
                IssueCode::ValuesMissing,
                format!("Input Error: Parameter #{ordinal} has an invalid values list."),
                Some(values_field),
            );
            continue;
        };

        let value_count = values.len();
        total_values += value_count;
        if value_count < MIN_VALUES {
            out.add(
                IssueCode::TooFewValues,
                format!("Input Error: Parameter #{ordinal} must have at least 2 values."),
                Some(values_field.clone()),
            );
        }
        if value_count > limits.max_values_per_param {
            out.add(
                IssueCode::LimitMaxValuesPerParam,
                format!(
                    "Model Safety Violation: Parameter #{ordinal} has {value_count} values, exceeding limit of {}.",
                    limits.max_values_per_param
                ),
                Some(values_field.clone()),
            );
        }

        let mut seen_values = BTreeSet::new();
        for (v_idx, value) in values.iter().enumerate() {
            match value.map(str::trim) {
                Some(v) if !v.is_empty() => {
                    if !seen_values.insert(v.to_lowercase()) {
                        out.add(
                            IssueCode::DuplicateValue,
                            format!(
                                "Input Error: Parameter #{ordinal} contains duplicate values (case-insensitive)."
                            ),
                            Some(values_field.clone()),
                        );
                    }
                }
                _ => out.add(
                    IssueCode::EmptyValue,
                    format!("Input Error: Parameter #{ordinal} contains an empty value."),
                    Some(format!("{values_field}[{v_idx}]")),
                ),
            }
        }
    }

    if total_values > limits.max_total_values {
        out.add(
            IssueCode::LimitMaxTotalValues,
            format!(
                "Model Safety Violation: Model has {total_values} total values, exceeding limit of {}.",
                limits.max_total_values
            ),
            Some(String::from("model.parameters")),
        );
    }

    out.report
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn codes(report: &PreflightReport) -> Vec<&'static str> {
        report.issues.iter().map(|i| i.code.as_str()).collect()
    }

    #[test]
    fn valid_model_has_no_issues() {
        let m = Model::parse("A: 1, 2\nB: x, y, z\n").expect("valid model");
        let report = validate_generation_preflight(Some(&m), &Limits::default());
        assert!(report.ok(), "{report:?}");
    }

    #[test]
    fn missing_model_is_reported() {
        let report = validate_generation_preflight(None, &Limits::default());
        assert_eq!(codes(&report), ["model_missing"]);
        assert_eq!(report.issues[0].field.as_deref(), Some("model"));
    }

    #[test]
    fn malformed_containers_stop_early() {
        let no_params = json!({"name": "draft"});
        let report = validate_generation_preflight(Some(&no_params), &Limits::default());
        assert_eq!(codes(&report), ["model_malformed"]);
        assert!(report.issues[0].message.contains("missing parameters"));

        let string_params = json!({"parameters": "A: 1, 2"});
        let report = validate_generation_preflight(Some(&string_params), &Limits::default());
        assert_eq!(codes(&report), ["model_malformed"]);
        assert!(report.issues[0].message.contains("invalid parameters container"));

        let not_object = json!([1, 2, 3]);
        let report = validate_generation_preflight(Some(&not_object), &Limits::default());
        assert!(report.has(IssueCode::ModelMalformed));
    }

    #[test]
    fn every_problem_is_reported_at_once() {
        let draft = json!({
            "parameters": [
                {"display_name": "OS", "values": ["Linux", "linux", " "]},
                {"display_name": " os ", "values": ["x"]},
                {"display_name": "", "values": "not a list"},
                {"values": [1, "ok"]},
            ]
        });
        let report = validate_generation_preflight(Some(&draft), &Limits::default());
        assert_eq!(
            codes(&report),
            [
                "duplicate_value",
                "empty_value",
                "duplicate_param_name",
                "too_few_values",
                "empty_param_name",
                "values_missing",
                "empty_param_name",
                "empty_value",
            ]
        );
        assert_eq!(
            report.issues[1].field.as_deref(),
            Some("model.parameters[0].values[2]")
        );
        assert_eq!(
            report.issues[5].field.as_deref(),
            Some("model.parameters[2].values")
        );
    }

    #[test]
    fn duplicates_are_deduplicated_by_code_and_field() {
        let draft = json!({
            "parameters": [
                {"display_name": "A", "values": ["x", "X", "x", "y"]},
                {"display_name": "B", "values": ["1", "2"]},
            ]
        });
        let report = validate_generation_preflight(Some(&draft), &Limits::default());
        assert_eq!(codes(&report), ["duplicate_value"]);
    }

    #[test]
    fn limits_and_too_few_params() {
        let draft = json!({
            "parameters": [
                {"display_name": "A", "values": ["1", "2", "3", "4"]},
            ]
        });
        let limits = Limits {
            max_params: 0,
            max_values_per_param: 3,
            max_total_values: 2,
        };
        let report = validate_generation_preflight(Some(&draft), &limits);
        assert_eq!(
            codes(&report),
            [
                "too_few_params",
                "limit_max_params",
                "limit_max_values_per_param",
                "limit_max_total_values",
            ]
        );
    }

    #[test]
    fn issues_serialize_with_stable_codes() {
        let report = validate_generation_preflight(None, &Limits::default());
        let body = serde_json::to_string(&report).expect("serialize");
        assert!(body.contains("\"code\":\"model_missing\""));
    }
}
