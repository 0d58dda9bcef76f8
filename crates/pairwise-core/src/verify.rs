//! Coverage verification.
//!
//! An oracle attempt is only trusted once this check confirms that every
//! t-tuple of values across distinct parameters appears in some row.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::Model;

/// Maximum number of missing-combination descriptors returned.
pub const MISSING_REPORT_CAP: usize = 20;

/// The candidate suite is inconsistent with the declared model.
///
/// This is never a coverage gap: it means the oracle or the parsing pipeline
/// produced values the model does not declare.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoverageError {
    #[error("critical: row {row} has value '{value}' not declared for parameter '{parameter}'")]
    UnknownValue {
        row: usize,
        parameter: String,
        value: String,
    },
    #[error("critical: row {row} has {found} cells, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("strength {strength} is not supported for a model with {params} parameters")]
    Strength { strength: usize, params: usize },
}

/// Verdict of a coverage check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageReport {
    /// True when no combination is missing.
    pub all_covered: bool,
    /// Up to [`MISSING_REPORT_CAP`] descriptors, e.g. `(A: A1, B: B2)`.
    pub missing: Vec<String>,
    /// Total number of missing combinations (uncapped).
    pub missing_total: usize,
}

/// Check pairwise coverage of `rows`, given in canonical column order.
pub fn verify_pairwise_coverage(
    model: &Model,
    rows: &[Vec<String>],
) -> Result<CoverageReport, CoverageError> {
    verify_coverage(model, rows, 2)
}

/// Check t-wise coverage of `rows`, given in canonical column order.
///
/// Missing combinations are enumerated across parameter subsets in ascending
/// index order, and within a subset in ascending value-index order.
pub fn verify_coverage(
    model: &Model,
    rows: &[Vec<String>],
    strength: usize,
) -> Result<CoverageReport, CoverageError> {
    let params = model.parameters();
    if strength == 0 {
        return Err(CoverageError::Strength {
            strength,
            params: params.len(),
        });
    }
    if params.len() < 2 || strength > params.len() {
        return Ok(CoverageReport {
            all_covered: true,
            missing: Vec::new(),
            missing_total: 0,
        });
    }

    let lookup: Vec<HashMap<&str, usize>> = params
        .iter()
        .map(|p| {
            p.values()
                .iter()
                .enumerate()
                .map(|(i, v)| (v.as_str(), i))
                .collect()
        })
        .collect();

    let mut indexed: Vec<Vec<usize>> = Vec::with_capacity(rows.len());
    for (r, row) in rows.iter().enumerate() {
        if row.len() != params.len() {
            return Err(CoverageError::RowWidth {
                row: r + 1,
                expected: params.len(),
                found: row.len(),
            });
        }
        let mut resolved = Vec::with_capacity(row.len());
        for (c, cell) in row.iter().enumerate() {
            let Some(&idx) = lookup[c].get(cell.as_str()) else {
                return Err(CoverageError::UnknownValue {
                    row: r + 1,
                    parameter: params[c].display_name().to_string(),
                    value: cell.clone(),
                });
            };
            resolved.push(idx);
        }
        indexed.push(resolved);
    }

    let counts = model.counts();
    let mut missing = Vec::new();
    let mut missing_total = 0usize;

    for subset in Combinations::new(params.len(), strength) {
        let covered: HashSet<Vec<usize>> = indexed
            .iter()
            .map(|row| subset.iter().map(|&p| row[p]).collect())
            .collect();
        // Saturates for subsets whose value space exceeds usize.
        let space = subset
            .iter()
            .try_fold(1usize, |acc, &p| acc.checked_mul(counts[p]))
            .unwrap_or(usize::MAX);
        let gap = space.saturating_sub(covered.len());
        if gap == 0 {
            continue;
        }
        missing_total = missing_total.saturating_add(gap);
        if missing.len() >= MISSING_REPORT_CAP {
            continue;
        }
        // Every step either hits a covered tuple or records a gap, so this
        // walks at most `covered.len() + MISSING_REPORT_CAP` tuples.
        let mut tuple = vec![0usize; subset.len()];
        loop {
            if !covered.contains(&tuple) {
                missing.push(describe(model, &subset, &tuple));
                if missing.len() >= MISSING_REPORT_CAP {
                    break;
                }
            }
            if !advance(&mut tuple, &subset, &counts) {
                break;
            }
        }
    }

    Ok(CoverageReport {
        all_covered: missing_total == 0,
        missing,
        missing_total,
    })
}

/// Step `tuple` to the next value-index combination; false once exhausted.
fn advance(tuple: &mut [usize], subset: &[usize], counts: &[usize]) -> bool {
    for (k, &p) in subset.iter().enumerate().rev() {
        tuple[k] += 1;
        if tuple[k] < counts[p] {
            return true;
        }
        tuple[k] = 0;
    }
    false
}

/// `(P1: v1, P2: v2, ...)` for one combination of value indices.
fn describe(model: &Model, subset: &[usize], tuple: &[usize]) -> String {
    let params = model.parameters();
    let parts: Vec<String> = subset
        .iter()
        .zip(tuple)
        .map(|(&p, &v)| format!("{}: {}", params[p].display_name(), params[p].values()[v]))
        .collect();
    format!("({})", parts.join(", "))
}

/// Lexicographic k-subsets of `0..n`.
struct Combinations {
    n: usize,
    current: Option<Vec<usize>>,
}

impl Combinations {
    fn new(n: usize, k: usize) -> Self {
        let current = (k <= n).then(|| (0..k).collect());
        Self { n, current }
    }
}

impl Iterator for Combinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        let out = self.current.clone()?;
        let k = out.len();
        let mut next = out.clone();
        let mut i = k;
        loop {
            if i == 0 {
                self.current = None;
                break;
            }
            i -= 1;
            if next[i] < self.n - k + i {
                next[i] += 1;
                for j in i + 1..k {
                    next[j] = next[j - 1] + 1;
                }
                self.current = Some(next);
                break;
            }
        }
        Some(out)
    }
}
