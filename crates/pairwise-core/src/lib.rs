//! Search-and-verification engine for combinatorial (pairwise / t-wise) test suites.
//!
//! This crate provides:
//! - Model: parameters, values, validation, and the oracle text grammar
//! - Lower bound: the provable minimum suite size for strength 2
//! - Coverage verification: proof that a candidate suite covers every t-tuple
//! - Preflight: non-throwing structural checks over untrusted model input
//! - Search: seed-by-seed orchestration of an external generation oracle
//! - Case import: candidate suites supplied as CSV or JSON
//! - Structured logging: JSONL lifecycle events for each search

#![forbid(unsafe_code)]

pub mod bounds;
pub mod cases;
pub mod model;
pub mod oracle;
pub mod preflight;
pub mod safe_name;
pub mod search;
pub mod structured_log;
pub mod verify;

pub use bounds::{lower_bound_for_strength, pairwise_lower_bound};
pub use cases::{CaseFormat, CasesError, cases_from_csv, cases_from_json, load_cases};
pub use model::{LimitExceeded, Limits, Model, ModelError, Parameter};
pub use oracle::{GenerationOracle, OracleError, OracleRequest};
pub use preflight::{PreflightIssue, PreflightReport, validate_generation_preflight};
pub use search::{
    OrderingMode, SearchError, SearchOptions, SearchPlan, SearchResult, SearchSummary, SuiteSearch,
    generate_suite,
};
pub use structured_log::{LogEmitter, LogEntry, LogLevel, Outcome};
pub use verify::{CoverageError, CoverageReport, verify_coverage, verify_pairwise_coverage};
