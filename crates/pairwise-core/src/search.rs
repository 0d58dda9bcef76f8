//! Seed-by-seed search for the smallest verified suite.
//!
//! Each attempt calls the generation oracle with `base_seed + index`, maps its
//! output back to canonical columns, verifies coverage, and keeps the best
//! candidate: fewest rows, then lowest seed. A verified strength-2 suite that
//! reaches the lower bound ends the search immediately.
//!
//! The total time budget is checked before every attempt, and each attempt's
//! timeout is clamped to whatever budget remains.

use std::ops::RangeInclusive;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::bounds::lower_bound_for_strength;
use crate::model::{MIN_PARAMETERS, Model, Parameter};
use crate::oracle::{GenerationOracle, OracleError, OracleRequest, parse_oracle_tsv};
use crate::structured_log::{LogEmitter, LogEntry, LogLevel, Outcome};
use crate::verify::{CoverageError, verify_coverage};

/// Order in which parameters are handed to the oracle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderingMode {
    /// Insertion order.
    Keep,
    /// Value count descending, ties in insertion order.
    #[default]
    Auto,
}

impl OrderingMode {
    /// Parse from string (case-insensitive).
    #[must_use]
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keep" | "insertion" | "original" => Some(Self::Keep),
            "auto" | "cardinality" => Some(Self::Auto),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Keep => "keep",
            Self::Auto => "auto",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOptions {
    pub ordering: OrderingMode,
    /// Maximum number of oracle attempts.
    pub tries: usize,
    pub base_seed: u64,
    pub strength: usize,
    /// Stop as soon as a verified suite reaches the lower bound.
    pub early_stop: bool,
    pub verify: bool,
    /// Discard attempts that fail verification.
    pub require_verified: bool,
    pub attempt_timeout: Duration,
    pub total_timeout: Duration,
    /// Accepted for compatibility only. Ties always go to the lowest seed.
    pub deterministic: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            ordering: OrderingMode::Auto,
            tries: 50,
            base_seed: 0,
            strength: 2,
            early_stop: true,
            verify: true,
            require_verified: true,
            attempt_timeout: Duration::from_secs(10),
            total_timeout: Duration::from_secs(30),
            deterministic: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    #[error("invalid search: {0}")]
    InvalidOptions(String),
    #[error(
        "total time budget of {:.3}s exhausted after {attempts} attempt(s)",
        .budget.as_secs_f64()
    )]
    TotalTimeout { budget: Duration, attempts: usize },
    #[error("all {attempts} generation attempt(s) timed out")]
    AllAttemptsTimedOut { attempts: usize },
    #[error(
        "no attempt passed coverage verification; best attempt (seed {seed}) is missing {missing_total} combination(s)"
    )]
    VerificationExhausted {
        seed: u64,
        missing: Vec<String>,
        missing_total: usize,
    },
    #[error("all {attempts} generation attempt(s) failed to execute; last error: {last_error}")]
    ExecutionExhausted { attempts: usize, last_error: String },
    #[error("generation failed: {0}")]
    Execution(String),
    #[error(transparent)]
    Integrity(#[from] CoverageError),
    #[error("structured log write failed: {0}")]
    Log(String),
}

impl SearchError {
    /// True for both the total-budget and the all-attempts timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::TotalTimeout { .. } | Self::AllAttemptsTimedOut { .. }
        )
    }
}

/// Everything resolved before the first oracle call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPlan {
    /// Display names in the order sent to the oracle.
    pub run_order: Vec<String>,
    /// Oracle-grammar text for `run_order`.
    pub oracle_model: String,
    pub lower_bound: Option<usize>,
    pub seeds: RangeInclusive<u64>,
}

/// Best suite found by a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Absent when strength is not 2.
    pub lower_bound: Option<usize>,
    pub suite_size: usize,
    pub seed: u64,
    /// Canonical column headers (display names).
    pub headers: Vec<String>,
    /// Winning rows in canonical column order.
    pub rows: Vec<Vec<String>>,
    pub verified: bool,
    pub missing: Vec<String>,
    pub run_order: Vec<String>,
    pub ordering_mode: OrderingMode,
    /// Attempts actually executed.
    pub attempts: usize,
    pub oracle_model: String,
}

impl SearchResult {
    #[must_use]
    pub fn summary(&self) -> SearchSummary {
        SearchSummary {
            ordering_mode: self.ordering_mode,
            attempts: self.attempts,
            best_seed: self.seed,
            lower_bound: self.lower_bound,
            suite_size: self.suite_size,
            verified: self.verified,
        }
    }

    /// True when the suite is verified and no smaller suite can exist.
    #[must_use]
    pub fn is_provably_minimal(&self) -> bool {
        self.verified && self.lower_bound == Some(self.suite_size)
    }
}

/// Minimal record a caller needs to report or persist a completed search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSummary {
    pub ordering_mode: OrderingMode,
    #[serde(rename = "tries_attempted")]
    pub attempts: usize,
    pub best_seed: u64,
    #[serde(rename = "lb")]
    pub lower_bound: Option<usize>,
    #[serde(rename = "n")]
    pub suite_size: usize,
    pub verified: bool,
}

/// Outcome of one oracle attempt that produced parseable output.
#[derive(Debug, Clone)]
struct AttemptResult {
    seed: u64,
    rows: Vec<Vec<String>>,
    verified: bool,
    missing: Vec<String>,
    missing_total: usize,
}

impl AttemptResult {
    /// Candidate order: verified first, then fewer rows, then lower seed.
    fn beats(&self, best: &Self) -> bool {
        let key = |a: &Self| (!a.verified, a.rows.len(), a.seed);
        key(self) < key(best)
    }

    /// Diagnostic order among failing attempts: fewer missing, then lower seed.
    fn closer_than(&self, other: &Self) -> bool {
        self.missing_total < other.missing_total
            || (self.missing_total == other.missing_total && self.seed < other.seed)
    }
}

#[derive(Debug, Default)]
struct AttemptTally {
    executed: usize,
    timeouts: usize,
    errors: usize,
    last_error: Option<String>,
}

/// Drives repeated oracle invocations for one model.
pub struct SuiteSearch<'a> {
    model: &'a Model,
    options: SearchOptions,
    log: Option<&'a mut LogEmitter>,
}

impl<'a> SuiteSearch<'a> {
    #[must_use]
    pub fn new(model: &'a Model, options: SearchOptions) -> Self {
        Self {
            model,
            options,
            log: None,
        }
    }

    /// Emit lifecycle events to `log`.
    #[must_use]
    pub fn with_log(mut self, log: &'a mut LogEmitter) -> Self {
        self.log = Some(log);
        self
    }

    #[must_use]
    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    /// Validate options and resolve ordering, oracle text and lower bound.
    pub fn plan(&self) -> Result<SearchPlan, SearchError> {
        let opts = &self.options;
        if self.model.len() < MIN_PARAMETERS {
            return Err(SearchError::InvalidOptions(format!(
                "at least {MIN_PARAMETERS} parameters are required, model has {}",
                self.model.len()
            )));
        }
        if opts.tries == 0 {
            return Err(SearchError::InvalidOptions(String::from(
                "tries must be at least 1",
            )));
        }
        if opts.strength < 2 {
            return Err(SearchError::InvalidOptions(String::from(
                "strength must be >= 2",
            )));
        }
        if opts.strength > self.model.len() {
            return Err(SearchError::InvalidOptions(format!(
                "strength {} exceeds the parameter count {}",
                opts.strength,
                self.model.len()
            )));
        }
        let last_seed = u64::try_from(opts.tries - 1)
            .ok()
            .and_then(|n| opts.base_seed.checked_add(n))
            .ok_or_else(|| {
                SearchError::InvalidOptions(String::from("seed range overflows u64"))
            })?;

        let ordered: Vec<&Parameter> = match opts.ordering {
            OrderingMode::Auto => self.model.reordered_by_cardinality_descending(),
            OrderingMode::Keep => self.model.parameters().iter().collect(),
        };
        Ok(SearchPlan {
            run_order: ordered
                .iter()
                .map(|p| p.display_name().to_string())
                .collect(),
            oracle_model: Model::serialize_ordered(&ordered),
            lower_bound: lower_bound_for_strength(&self.model.counts(), opts.strength),
            seeds: opts.base_seed..=last_seed,
        })
    }

    /// Run the search to completion.
    pub fn run<O: GenerationOracle + ?Sized>(
        &mut self,
        oracle: &mut O,
    ) -> Result<SearchResult, SearchError> {
        let plan = self.plan()?;
        let model = self.model;
        let opts = self.options.clone();
        let headers = model.display_names();
        let safe_to_display = model.safe_to_display();

        let started = Instant::now();
        let deadline = started.checked_add(opts.total_timeout);

        self.log(LogLevel::Info, "search_start", |e| {
            e.with_lower_bound(plan.lower_bound).with_details(json!({
                "ordering": opts.ordering.as_str(),
                "run_order": plan.run_order,
                "tries": opts.tries,
                "base_seed": opts.base_seed,
                "strength": opts.strength,
                "verify": opts.verify,
                "require_verified": opts.require_verified,
                "attempt_timeout_ms": duration_ms(opts.attempt_timeout),
                "total_timeout_ms": duration_ms(opts.total_timeout),
            }))
        })?;

        let mut tally = AttemptTally::default();
        let mut best: Option<AttemptResult> = None;
        let mut closest_failure: Option<AttemptResult> = None;
        let mut budget_exhausted = false;

        for (index, seed) in plan.seeds.clone().enumerate() {
            let attempt = index + 1;
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            if remaining.is_some_and(|r| r.is_zero()) {
                budget_exhausted = true;
                self.log(LogLevel::Warn, "total_timeout", |e| {
                    e.with_attempt(attempt, seed)
                        .with_outcome(Outcome::Timeout)
                        .with_duration_ms(duration_ms(started.elapsed()))
                })?;
                break;
            }
            let timeout = remaining.map_or(opts.attempt_timeout, |r| r.min(opts.attempt_timeout));

            tally.executed += 1;
            let request = OracleRequest {
                model_text: &plan.oracle_model,
                strength: opts.strength,
                seed,
                timeout,
            };
            let attempt_started = Instant::now();
            let output = match oracle.generate(&request) {
                Ok(output) => output,
                Err(OracleError::Timeout { after }) => {
                    tally.timeouts += 1;
                    self.log(LogLevel::Warn, "attempt_timeout", |e| {
                        e.with_attempt(attempt, seed)
                            .with_outcome(Outcome::Timeout)
                            .with_duration_ms(duration_ms(after))
                    })?;
                    continue;
                }
                Err(OracleError::Execution(message)) => {
                    tally.errors += 1;
                    self.log(LogLevel::Warn, "attempt_error", |e| {
                        e.with_attempt(attempt, seed)
                            .with_outcome(Outcome::Error)
                            .with_message(&message)
                    })?;
                    tally.last_error = Some(message);
                    continue;
                }
            };
            let elapsed_ms = duration_ms(attempt_started.elapsed());

            let rows = parse_oracle_tsv(&output, &safe_to_display, &headers);
            let (verified, missing, missing_total) = if opts.verify {
                match verify_coverage(model, &rows, opts.strength) {
                    Ok(report) => (report.all_covered, report.missing, report.missing_total),
                    Err(err) => {
                        self.log(LogLevel::Error, "search_failed", |e| {
                            e.with_attempt(attempt, seed)
                                .with_outcome(Outcome::Error)
                                .with_message(err.to_string())
                        })?;
                        return Err(err.into());
                    }
                }
            } else {
                (false, Vec::new(), 0)
            };
            let result = AttemptResult {
                seed,
                rows,
                verified,
                missing,
                missing_total,
            };

            if opts.verify && opts.require_verified && !result.verified {
                self.log(LogLevel::Info, "attempt_unverified", |e| {
                    e.with_attempt(attempt, seed)
                        .with_outcome(Outcome::Fail)
                        .with_rows(result.rows.len())
                        .with_missing(result.missing_total)
                        .with_duration_ms(elapsed_ms)
                })?;
                if closest_failure
                    .as_ref()
                    .is_none_or(|current| result.closer_than(current))
                {
                    closest_failure = Some(result);
                }
                continue;
            }

            let outcome = if result.verified {
                Outcome::Pass
            } else {
                Outcome::Skip
            };
            self.log(LogLevel::Info, "attempt_candidate", |e| {
                e.with_attempt(attempt, seed)
                    .with_outcome(outcome)
                    .with_rows(result.rows.len())
                    .with_missing(result.missing_total)
                    .with_duration_ms(elapsed_ms)
            })?;

            if !best.as_ref().is_none_or(|current| result.beats(current)) {
                continue;
            }
            let size = result.rows.len();
            let reached_bound = result.verified && plan.lower_bound == Some(size);
            best = Some(result);
            self.log(LogLevel::Info, "best_updated", |e| {
                e.with_attempt(attempt, seed)
                    .with_rows(size)
                    .with_lower_bound(plan.lower_bound)
                    .with_details(json!({ "provably_minimal": reached_bound }))
            })?;

            if opts.early_stop && opts.strength == 2 && reached_bound {
                self.log(LogLevel::Info, "early_stop", |e| {
                    e.with_attempt(attempt, seed)
                        .with_outcome(Outcome::Pass)
                        .with_rows(size)
                        .with_lower_bound(plan.lower_bound)
                        .with_duration_ms(duration_ms(started.elapsed()))
                })?;
                break;
            }
        }

        if let Some(best) = best {
            let result = SearchResult {
                lower_bound: plan.lower_bound,
                suite_size: best.rows.len(),
                seed: best.seed,
                headers,
                rows: best.rows,
                verified: best.verified,
                missing: best.missing,
                run_order: plan.run_order,
                ordering_mode: opts.ordering,
                attempts: tally.executed,
                oracle_model: plan.oracle_model,
            };
            self.log(LogLevel::Info, "search_complete", |e| {
                e.with_outcome(Outcome::Pass)
                    .with_attempt(result.attempts, result.seed)
                    .with_rows(result.suite_size)
                    .with_lower_bound(result.lower_bound)
                    .with_duration_ms(duration_ms(started.elapsed()))
                    .with_details(json!({ "verified": result.verified }))
            })?;
            return Ok(result);
        }

        let err = classify_exhaustion(&opts, tally, closest_failure, budget_exhausted);
        self.log(LogLevel::Error, "search_failed", |e| {
            let outcome = if err.is_timeout() {
                Outcome::Timeout
            } else {
                Outcome::Fail
            };
            e.with_outcome(outcome)
                .with_message(err.to_string())
                .with_duration_ms(duration_ms(started.elapsed()))
        })?;
        Err(err)
    }

    fn log(
        &mut self,
        level: LogLevel,
        event: &str,
        build: impl FnOnce(LogEntry) -> LogEntry,
    ) -> Result<(), SearchError> {
        let Some(log) = self.log.as_deref_mut() else {
            return Ok(());
        };
        let entry = build(log.entry(level, event));
        log.emit_entry(entry)
            .map_err(|e| SearchError::Log(e.to_string()))
    }
}

/// Search `model` with default logging disabled.
pub fn generate_suite<O: GenerationOracle + ?Sized>(
    model: &Model,
    oracle: &mut O,
    options: SearchOptions,
) -> Result<SearchResult, SearchError> {
    SuiteSearch::new(model, options).run(oracle)
}

fn classify_exhaustion(
    opts: &SearchOptions,
    tally: AttemptTally,
    closest_failure: Option<AttemptResult>,
    budget_exhausted: bool,
) -> SearchError {
    if budget_exhausted {
        return SearchError::TotalTimeout {
            budget: opts.total_timeout,
            attempts: tally.executed,
        };
    }
    if tally.executed > 0 && tally.timeouts == tally.executed {
        return SearchError::AllAttemptsTimedOut {
            attempts: tally.executed,
        };
    }
    if let Some(failure) = closest_failure {
        return SearchError::VerificationExhausted {
            seed: failure.seed,
            missing: failure.missing,
            missing_total: failure.missing_total,
        };
    }
    if let Some(last_error) = tally.last_error {
        return SearchError::ExecutionExhausted {
            attempts: tally.executed,
            last_error,
        };
    }
    SearchError::Execution(String::from(
        "no generation attempt produced a candidate suite",
    ))
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
