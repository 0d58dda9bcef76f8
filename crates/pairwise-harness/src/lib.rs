//! Host side of the pairwise suite search.
//!
//! - [`config`]: generation flags, environment overrides, validation
//! - [`pict`]: PICT provisioning and the process-backed oracle
//! - [`output`]: table / CSV / JSON rendering and the stdout guard

#![forbid(unsafe_code)]

pub mod config;
pub mod output;
pub mod pict;

pub use config::{ConfigError, GenerateFlags, HarnessConfig, OracleEnv};
pub use output::OutputFormat;
pub use pict::{OracleSetupError, PictOracle, ensure_oracle_binary};

use pairwise_core::SearchError;

/// Stable process exit codes.
pub mod exit {
    pub const SUCCESS: u8 = 0;
    pub const VALIDATION: u8 = 2;
    pub const ORACLE: u8 = 3;
    pub const VERIFICATION: u8 = 4;
    pub const TIMEOUT: u8 = 5;
}

/// Exit code for a failed search.
#[must_use]
pub fn search_exit_code(err: &SearchError) -> u8 {
    match err {
        SearchError::InvalidOptions(_) => exit::VALIDATION,
        SearchError::TotalTimeout { .. } | SearchError::AllAttemptsTimedOut { .. } => {
            exit::TIMEOUT
        }
        SearchError::VerificationExhausted { .. } => exit::VERIFICATION,
        SearchError::ExecutionExhausted { .. }
        | SearchError::Execution(_)
        | SearchError::Integrity(_)
        | SearchError::Log(_) => exit::ORACLE,
    }
}

/// Exit code for an oracle provisioning failure.
#[must_use]
pub fn setup_exit_code(err: &OracleSetupError) -> u8 {
    match err {
        OracleSetupError::UnsupportedPlatform { .. } => exit::VALIDATION,
        _ => exit::ORACLE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pairwise_core::CoverageError;
    use std::time::Duration;

    #[test]
    fn search_failures_map_to_stable_codes() {
        let cases = [
            (SearchError::InvalidOptions(String::from("x")), 2),
            (
                SearchError::TotalTimeout {
                    budget: Duration::from_secs(1),
                    attempts: 0,
                },
                5,
            ),
            (SearchError::AllAttemptsTimedOut { attempts: 3 }, 5),
            (
                SearchError::VerificationExhausted {
                    seed: 0,
                    missing: Vec::new(),
                    missing_total: 1,
                },
                4,
            ),
            (
                SearchError::ExecutionExhausted {
                    attempts: 1,
                    last_error: String::from("boom"),
                },
                3,
            ),
            (
                SearchError::Integrity(CoverageError::UnknownValue {
                    row: 1,
                    parameter: String::from("A"),
                    value: String::from("z"),
                }),
                3,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(search_exit_code(&err), code, "{err}");
        }
    }

    #[test]
    fn unsupported_platform_is_a_validation_failure() {
        let err = pict::vendor_target_for("plan9", "mips").expect_err("unsupported");
        assert_eq!(setup_exit_code(&err), exit::VALIDATION);
        let err = OracleSetupError::NoWritableCache { tried: Vec::new() };
        assert_eq!(setup_exit_code(&err), exit::ORACLE);
    }
}
