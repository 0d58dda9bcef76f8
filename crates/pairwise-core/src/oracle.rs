//! Contract with the external generation oracle.
//!
//! The oracle receives oracle-grammar text, a strength, a seed and a timeout,
//! and answers with tab-separated output: a header row of safe names followed by
//! one row per generated case. It is a black box whose output gets verified.

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("generation oracle timed out after {:.3}s", .after.as_secs_f64())]
    Timeout { after: Duration },
    #[error("generation oracle failed: {0}")]
    Execution(String),
}

/// One oracle invocation.
#[derive(Debug, Clone, Copy)]
pub struct OracleRequest<'a> {
    pub model_text: &'a str,
    pub strength: usize,
    pub seed: u64,
    pub timeout: Duration,
}

/// Produces a candidate suite for a model. Called once per search attempt.
///
/// Implementations that run a child process must terminate it when the
/// timeout elapses.
pub trait GenerationOracle {
    fn generate(&mut self, request: &OracleRequest<'_>) -> Result<String, OracleError>;
}

impl<F> GenerationOracle for F
where
    F: FnMut(&OracleRequest<'_>) -> Result<String, OracleError>,
{
    fn generate(&mut self, request: &OracleRequest<'_>) -> Result<String, OracleError> {
        self(request)
    }
}

/// Parse oracle TSV output into rows in canonical column order.
///
/// Header labels are mapped back to display names through `safe_to_display`.
/// Short rows are padded and long rows truncated to the header width; a
/// canonical column the oracle did not emit yields empty cells.
#[must_use]
pub fn parse_oracle_tsv(
    content: &str,
    safe_to_display: &BTreeMap<String, String>,
    canonical_headers: &[String],
) -> Vec<Vec<String>> {
    let mut lines = content
        .lines()
        .map(|l| l.trim_matches(|c| c == '\r' || c == '\n' || c == ' '))
        .filter(|l| !l.is_empty());
    let Some(header_line) = lines.next() else {
        return Vec::new();
    };

    let display_headers: Vec<&str> = header_line
        .split('\t')
        .map(|h| {
            let h = h.trim();
            safe_to_display.get(h).map_or(h, String::as_str)
        })
        .collect();
    let column_of: BTreeMap<&str, usize> = display_headers
        .iter()
        .enumerate()
        .map(|(i, h)| (*h, i))
        .collect();
    let mapping: Vec<Option<usize>> = canonical_headers
        .iter()
        .map(|h| column_of.get(h.as_str()).copied())
        .collect();

    lines
        .map(|line| {
            let cells: Vec<&str> = line.split('\t').take(display_headers.len()).collect();
            mapping
                .iter()
                .map(|&col| {
                    col.and_then(|c| cells.get(c))
                        .map_or_else(String::new, |cell| cell.trim().to_string())
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(s, d)| ((*s).to_string(), (*d).to_string()))
            .collect()
    }

    fn headers(h: &[&str]) -> Vec<String> {
        h.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn reorders_into_canonical_columns() {
        let map = names(&[("Operating_System", "Operating System"), ("RAM", "RAM")]);
        let out = "RAM\tOperating_System\n4\tWin\n8\tMac\n";
        let rows = parse_oracle_tsv(out, &map, &headers(&["Operating System", "RAM"]));
        assert_eq!(rows, vec![vec!["Win", "4"], vec!["Mac", "8"]]);
    }

    #[test]
    fn empty_output_has_no_rows() {
        let rows = parse_oracle_tsv("\n\n", &BTreeMap::new(), &headers(&["A", "B"]));
        assert!(rows.is_empty());
    }

    #[test]
    fn short_rows_are_padded_and_long_rows_truncated() {
        let map = names(&[("A", "A"), ("B", "B")]);
        let out = "A\tB\r\na1\r\na2\tb2\textra\r\n";
        let rows = parse_oracle_tsv(out, &map, &headers(&["A", "B"]));
        assert_eq!(rows, vec![vec!["a1", ""], vec!["a2", "b2"]]);
    }

    #[test]
    fn missing_canonical_column_yields_empty_cells() {
        let map = names(&[("A", "A")]);
        let rows = parse_oracle_tsv("A\na1\n", &map, &headers(&["A", "B"]));
        assert_eq!(rows, vec![vec!["a1", ""]]);
    }

    #[test]
    fn closures_act_as_oracles() {
        let mut calls = Vec::new();
        let mut oracle = |req: &OracleRequest<'_>| {
            calls.push(req.seed);
            Ok::<_, OracleError>(String::from("A\tB\n"))
        };
        let req = OracleRequest {
            model_text: "A: 1, 2\nB: 1, 2\n",
            strength: 2,
            seed: 7,
            timeout: Duration::from_secs(1),
        };
        assert_eq!(oracle.generate(&req).expect("ok"), "A\tB\n");
        assert_eq!(calls, [7]);
    }
}
