//! CLI entrypoint for the pairwise suite search.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand};
use pairwise_core::{
    CaseFormat, GenerationOracle, LogEmitter, Model, OracleError, OracleRequest, SearchError,
    SuiteSearch, load_cases, validate_generation_preflight, verify_coverage,
};
use pairwise_harness::config::{GenerateFlags, HarnessConfig, OracleEnv};
use pairwise_harness::output::{self, OutputFormat};
use pairwise_harness::pict::{self, PictOracle};
use pairwise_harness::{exit, search_exit_code, setup_exit_code};

/// Minimal pairwise / t-wise suites with proven coverage.
#[derive(Debug, Parser)]
#[command(name = "pairwise")]
#[command(about = "Search for small combinatorial test suites and prove their coverage")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate a suite from a model file.
    Generate {
        /// Model file (`Name: v1, v2, ...` per line).
        #[arg(long)]
        model: PathBuf,
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
        /// Write the suite here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Print even when the suite exceeds --max-output-cases.
        #[arg(long)]
        print_all: bool,
        /// Print the oracle model and seed range without running anything.
        #[arg(long)]
        dry_run: bool,
        /// Report each attempt on stderr.
        #[arg(long)]
        verbose: bool,
        /// Structured JSONL log of the search.
        #[arg(long)]
        log_jsonl: Option<PathBuf>,
        #[command(flatten)]
        flags: GenerateFlags,
    },
    /// Verify that an existing suite covers a model.
    Verify {
        #[arg(long)]
        model: PathBuf,
        /// Cases as CSV, or JSON when the file ends in `.json`.
        #[arg(long)]
        cases: PathBuf,
        #[arg(long, default_value_t = 2)]
        strength: usize,
    },
    /// Check that the oracle can be extracted and run on this host.
    Doctor,
    /// Print the version.
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let code = match cli.command {
        Command::Generate {
            model,
            format,
            out,
            print_all,
            dry_run,
            verbose,
            log_jsonl,
            flags,
        } => cmd_generate(&GenerateRun {
            model,
            format,
            out,
            print_all,
            dry_run,
            verbose,
            log_jsonl,
            flags,
        }),
        Command::Verify {
            model,
            cases,
            strength,
        } => cmd_verify(&model, &cases, strength),
        Command::Doctor => cmd_doctor(),
        Command::Version => {
            println!("pairwise {}", env!("CARGO_PKG_VERSION"));
            exit::SUCCESS
        }
    };
    ExitCode::from(code)
}

struct GenerateRun {
    model: PathBuf,
    format: OutputFormat,
    out: Option<PathBuf>,
    print_all: bool,
    dry_run: bool,
    verbose: bool,
    log_jsonl: Option<PathBuf>,
    flags: GenerateFlags,
}

fn read_text(path: &Path, what: &str) -> Result<String, u8> {
    if !path.exists() {
        eprintln!("Error: File not found: {}", path.display());
        return Err(exit::VALIDATION);
    }
    let bytes = std::fs::read(path).map_err(|e| {
        eprintln!("Validation error: Could not read {what} file: {e}");
        exit::VALIDATION
    })?;
    String::from_utf8(bytes).map_err(|_| {
        eprintln!(
            "Validation error: {what} file is not valid UTF-8 text: {}",
            path.display()
        );
        exit::VALIDATION
    })
}

fn load_model(path: &Path) -> Result<Model, u8> {
    let text = read_text(path, "Model")?;
    Model::parse(&text).map_err(|e| {
        eprintln!("Validation error: {e}");
        exit::VALIDATION
    })
}

fn print_missing(missing: &[String]) {
    eprintln!("Error: Coverage verification failed.");
    for combo in missing {
        eprintln!(" Missing pair: {combo}");
    }
}

fn cmd_generate(run: &GenerateRun) -> u8 {
    match generate(run) {
        Ok(()) => exit::SUCCESS,
        Err(code) => code,
    }
}

fn generate(run: &GenerateRun) -> Result<(), u8> {
    let config = HarnessConfig::resolve(&run.flags, OracleEnv::from_env()).map_err(|e| {
        eprintln!("Validation error: {e}");
        exit::VALIDATION
    })?;
    for warning in &config.warnings {
        eprintln!("Warning: {warning}");
    }

    let model = load_model(&run.model)?;
    let report = validate_generation_preflight(Some(&model), &config.limits);
    if !report.ok() {
        for issue in &report.issues {
            eprintln!("{}", issue.message);
        }
        return Err(exit::VALIDATION);
    }
    model.validate_limits(&config.limits).map_err(|e| {
        eprintln!("Model Safety Violation: {e}");
        exit::VALIDATION
    })?;

    let search = SuiteSearch::new(&model, config.search.clone());
    let plan = search.plan().map_err(|e| {
        eprintln!("Validation error: {e}");
        exit::VALIDATION
    })?;
    if run.dry_run {
        println!("# Run order: {}", plan.run_order.join(", "));
        println!(
            "# Seeds: {}..={} ({} tries)",
            plan.seeds.start(),
            plan.seeds.end(),
            config.search.tries
        );
        match plan.lower_bound {
            Some(lb) => println!("# Lower bound: {lb}"),
            None => println!("# Lower bound: n/a (strength {})", config.search.strength),
        }
        print!("{}", plan.oracle_model);
        return Ok(());
    }

    let executable = pict::ensure_oracle_binary(&config.oracle).map_err(|e| {
        let code = setup_exit_code(&e);
        if code == exit::VALIDATION {
            eprintln!("Validation error: {e}");
        } else {
            eprintln!("Generation error: {e}");
        }
        code
    })?;
    let mut pict = PictOracle::new(executable);

    let mut log = match &run.log_jsonl {
        Some(path) => Some(LogEmitter::to_file(path, "pairwise", &run_id()).map_err(|e| {
            eprintln!("Validation error: cannot open {}: {e}", path.display());
            exit::VALIDATION
        })?),
        None => None,
    };

    let verbose = run.verbose;
    let mut oracle = |request: &OracleRequest<'_>| {
        let started = Instant::now();
        let outcome = pict.generate(request);
        if verbose {
            report_attempt(request, &outcome, started.elapsed());
        }
        outcome
    };
    let mut search = search;
    if let Some(log) = log.as_mut() {
        search = search.with_log(log);
    }
    let outcome = search.run(&mut oracle);
    if let Some(log) = log.as_mut()
        && let Err(e) = log.flush()
    {
        eprintln!("Generation error: cannot write structured log: {e}");
        return Err(exit::ORACLE);
    }

    let result = outcome.map_err(|e| {
        match &e {
            SearchError::VerificationExhausted { missing, .. } => print_missing(missing),
            SearchError::TotalTimeout { .. } | SearchError::AllAttemptsTimedOut { .. } => {
                eprintln!("Generation timeout error: {e}");
            }
            SearchError::InvalidOptions(_) => eprintln!("Validation error: {e}"),
            _ => eprintln!("Generation error: {e}"),
        }
        search_exit_code(&e)
    })?;

    if verbose {
        eprintln!(
            "Best suite: {} rows (seed {}, lower bound {}, verified {}, {} attempts)",
            result.suite_size,
            result.seed,
            result
                .lower_bound
                .map_or_else(|| String::from("n/a"), |lb| lb.to_string()),
            result.verified,
            result.attempts
        );
    }

    let to_file = run.out.is_some();
    if output::suppress_stdout(
        run.format,
        result.suite_size,
        config.max_output_cases,
        run.print_all,
        to_file,
    ) {
        eprintln!(
            "Warning: Generated {} tests exceeding --max-output-cases limit of {}.",
            result.suite_size, config.max_output_cases
        );
        eprintln!(
            "To see this output to console, pass --print-all or write to a file using --out FILE"
        );
        return Ok(());
    }

    let mut rendered = output::render(run.format, &result).map_err(|e| {
        eprintln!("Generation error: cannot render output: {e}");
        exit::ORACLE
    })?;
    if !rendered.ends_with('\n') {
        rendered.push('\n');
    }
    match &run.out {
        Some(path) => std::fs::write(path, rendered).map_err(|e| {
            eprintln!("Error: cannot write {}: {e}", path.display());
            exit::VALIDATION
        })?,
        None => print!("{rendered}"),
    }
    Ok(())
}

fn report_attempt(
    request: &OracleRequest<'_>,
    outcome: &Result<String, OracleError>,
    took: Duration,
) {
    let secs = took.as_secs_f64();
    match outcome {
        Ok(out) => {
            let rows = out
                .lines()
                .filter(|l| !l.trim().is_empty())
                .count()
                .saturating_sub(1);
            eprintln!("[seed {}] {rows} rows in {secs:.3}s", request.seed);
        }
        Err(OracleError::Timeout { .. }) => {
            eprintln!("[seed {}] timed out after {secs:.3}s", request.seed);
        }
        Err(err) => eprintln!("[seed {}] {err}", request.seed),
    }
}

fn run_id() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs());
    format!("{secs}-{}", std::process::id())
}

fn cmd_verify(model_path: &Path, cases_path: &Path, strength: usize) -> u8 {
    let model = match load_model(model_path) {
        Ok(model) => model,
        Err(code) => return code,
    };
    let text = match read_text(cases_path, "Cases") {
        Ok(text) => text,
        Err(code) => return code,
    };
    let rows = match load_cases(&model, &text, CaseFormat::from_path(cases_path)) {
        Ok(rows) => rows,
        Err(e) => {
            eprintln!("Validation error: {e}");
            return exit::VALIDATION;
        }
    };
    if strength < 2 {
        eprintln!("Validation error: --strength must be >= 2");
        return exit::VALIDATION;
    }
    match verify_coverage(&model, &rows, strength) {
        Ok(report) if report.all_covered => {
            eprintln!("Coverage verified successfully.");
            exit::SUCCESS
        }
        Ok(report) => {
            print_missing(&report.missing);
            if report.missing_total > report.missing.len() {
                eprintln!(
                    " ... and {} more",
                    report.missing_total - report.missing.len()
                );
            }
            exit::VERIFICATION
        }
        Err(e) => {
            eprintln!("Validation error: {e}");
            exit::VALIDATION
        }
    }
}

fn cmd_doctor() -> u8 {
    println!("Pairwise Doctor");
    println!("{}", "-".repeat(20));
    println!(
        "Detected Platform   : {} {}",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    let env = OracleEnv::from_env();
    if env.pict_path.is_none() {
        match pict::vendor_target() {
            Ok(target) => println!("Vendor Target       : {target}"),
            Err(e) => {
                println!("Doctor Failed       : {e}");
                return exit::VALIDATION;
            }
        }
    }
    let path = match pict::ensure_oracle_binary(&env) {
        Ok(path) => path,
        Err(e) => {
            println!("Doctor Failed       : {e}");
            return setup_exit_code(&e);
        }
    };
    println!("PICT Extracted To   : {}", path.display());
    println!("PICT Extract        : OK");

    let mut oracle = PictOracle::new(path);
    match pict::smoke_test(&mut oracle, Duration::from_secs(5)) {
        Ok(true) => println!("PICT Execution      : OK"),
        Ok(false) => {
            println!("PICT Execution      : UNEXPECTED OUTPUT");
            return exit::ORACLE;
        }
        Err(e) => {
            println!("Doctor Failed       : {e}");
            return exit::ORACLE;
        }
    }
    println!("Doctor checks passed successfully.");
    exit::SUCCESS
}
