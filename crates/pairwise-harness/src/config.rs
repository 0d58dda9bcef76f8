//! Runtime configuration: generation flags plus environment overrides.
//!
//! Environment:
//! - `PAIRWISE_CACHE_DIR`: only cache location tried for the extracted oracle.
//! - `PAIRWISE_PICT_PATH`: run this executable, skip extraction entirely.
//! - `PAIRWISE_VENDOR_DIR`: root of the bundled oracle binaries.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use pairwise_core::{Limits, OrderingMode, SearchOptions};
use thiserror::Error;

pub const ENV_CACHE_DIR: &str = "PAIRWISE_CACHE_DIR";
pub const ENV_PICT_PATH: &str = "PAIRWISE_PICT_PATH";
pub const ENV_VENDOR_DIR: &str = "PAIRWISE_VENDOR_DIR";

pub const DEFAULT_MAX_TRIES: usize = 5000;
pub const DEFAULT_MAX_OUTPUT_CASES: usize = 100_000;

/// Directory name used under every cache root.
pub const APP_DIR_NAME: &str = "pairwise-cli";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("--tries must be between 1 and {max} (got {got})")]
    Tries { max: usize, got: usize },
    #[error("--strength must be >= 2")]
    Strength,
    #[error("--pict-timeout-sec must be > 0")]
    AttemptTimeout,
    #[error("--total-timeout-sec must be > 0")]
    TotalTimeout,
    #[error("--ordering must be 'keep' or 'auto' (got '{0}')")]
    Ordering(String),
}

/// Search and limit flags of `pairwise generate`.
#[derive(Debug, Clone, Parser)]
pub struct GenerateFlags {
    /// Parameter ordering handed to the oracle: keep or auto.
    #[arg(long, default_value = "auto")]
    pub ordering: String,
    /// Shorthand for `--ordering keep`.
    #[arg(long)]
    pub keep_order: bool,
    /// Number of seeds to try.
    #[arg(long, default_value_t = 50)]
    pub tries: usize,
    /// Upper bound accepted for `--tries`.
    #[arg(long, default_value_t = DEFAULT_MAX_TRIES)]
    pub max_tries: usize,
    /// First seed; attempt i uses seed + i.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
    /// Interaction strength.
    #[arg(long, default_value_t = 2)]
    pub strength: usize,
    /// Per-attempt oracle timeout in seconds.
    #[arg(long, default_value_t = 10.0)]
    pub pict_timeout_sec: f64,
    /// Budget for the whole search in seconds.
    #[arg(long, default_value_t = 30.0)]
    pub total_timeout_sec: f64,
    #[arg(long, default_value_t = 50)]
    pub max_params: usize,
    #[arg(long, default_value_t = 50)]
    pub max_values_per_param: usize,
    #[arg(long, default_value_t = 500)]
    pub max_total_values: usize,
    /// Refuse to print more table/csv rows than this to stdout.
    #[arg(long, default_value_t = DEFAULT_MAX_OUTPUT_CASES)]
    pub max_output_cases: usize,
    /// Recorded only; ties are always broken by the lowest seed.
    #[arg(long)]
    pub deterministic: bool,
    /// Keep searching after reaching the lower bound.
    #[arg(long)]
    pub no_early_stop: bool,
    /// Skip coverage verification.
    #[arg(long)]
    pub no_verify: bool,
    /// Accept attempts that fail verification.
    #[arg(long)]
    pub no_require_verified: bool,
}

impl Default for GenerateFlags {
    fn default() -> Self {
        Self::parse_from(["generate"])
    }
}

/// Oracle-related environment, captured once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OracleEnv {
    pub cache_dir: Option<PathBuf>,
    pub pict_path: Option<PathBuf>,
    pub vendor_dir: Option<PathBuf>,
    /// Platform cache root (XDG / Library/Caches / LOCALAPPDATA).
    pub os_cache_dir: Option<PathBuf>,
}

impl OracleEnv {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(std::env::consts::OS, |key| std::env::var(key).ok())
    }

    /// Resolve from an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup(os: &str, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let home = get("HOME").or_else(|| get("USERPROFILE")).map(PathBuf::from);
        let os_cache_dir = match os {
            "windows" => get("LOCALAPPDATA")
                .map(PathBuf::from)
                .or_else(|| home.map(|h| h.join("AppData").join("Local"))),
            "macos" => home.map(|h| h.join("Library").join("Caches")),
            _ => get("XDG_CACHE_HOME")
                .map(PathBuf::from)
                .or_else(|| home.map(|h| h.join(".cache"))),
        };
        Self {
            cache_dir: get(ENV_CACHE_DIR).map(PathBuf::from),
            pict_path: get(ENV_PICT_PATH).map(PathBuf::from),
            vendor_dir: get(ENV_VENDOR_DIR).map(PathBuf::from),
            os_cache_dir,
        }
    }
}

/// Fully validated settings for one `generate` run.
#[derive(Debug, Clone, PartialEq)]
pub struct HarnessConfig {
    pub search: SearchOptions,
    pub limits: Limits,
    pub max_output_cases: usize,
    pub oracle: OracleEnv,
    /// Non-fatal notes for the user.
    pub warnings: Vec<String>,
}

impl HarnessConfig {
    /// Validate `flags` before any search is attempted.
    pub fn resolve(flags: &GenerateFlags, oracle: OracleEnv) -> Result<Self, ConfigError> {
        if flags.tries == 0 || flags.tries > flags.max_tries {
            return Err(ConfigError::Tries {
                max: flags.max_tries,
                got: flags.tries,
            });
        }
        if flags.strength < 2 {
            return Err(ConfigError::Strength);
        }
        let attempt_timeout =
            positive_seconds(flags.pict_timeout_sec).ok_or(ConfigError::AttemptTimeout)?;
        let total_timeout =
            positive_seconds(flags.total_timeout_sec).ok_or(ConfigError::TotalTimeout)?;
        let ordering = if flags.keep_order {
            OrderingMode::Keep
        } else {
            OrderingMode::from_str_loose(&flags.ordering)
                .ok_or_else(|| ConfigError::Ordering(flags.ordering.clone()))?
        };

        let mut warnings = Vec::new();
        if total_timeout < attempt_timeout {
            warnings.push(String::from(
                "--total-timeout-sec is lower than --pict-timeout-sec; both limits will be enforced.",
            ));
        }

        Ok(Self {
            search: SearchOptions {
                ordering,
                tries: flags.tries,
                base_seed: flags.seed,
                strength: flags.strength,
                early_stop: !flags.no_early_stop,
                verify: !flags.no_verify,
                require_verified: !flags.no_require_verified,
                attempt_timeout,
                total_timeout,
                deterministic: flags.deterministic,
            },
            limits: Limits {
                max_params: flags.max_params,
                max_values_per_param: flags.max_values_per_param,
                max_total_values: flags.max_total_values,
            },
            max_output_cases: flags.max_output_cases,
            oracle,
            warnings,
        })
    }
}

fn positive_seconds(secs: f64) -> Option<Duration> {
    if secs.is_finite() && secs > 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}
