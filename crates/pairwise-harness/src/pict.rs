//! PICT as the generation oracle: locating, extracting, and running it.
//!
//! The bundled executable lives under `<vendor>/pict/<target>/` and is copied
//! into a writable cache before first use. Each attempt runs it once as a
//! child process with its own scratch files.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use pairwise_core::{GenerationOracle, OracleError, OracleRequest};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::{APP_DIR_NAME, OracleEnv};

/// Version segment of the extraction cache layout.
pub const ORACLE_CACHE_VERSION: &str = "1.0.0";

/// Sample model used by `doctor`.
pub const SMOKE_MODEL: &str = "a: A1, A2\nb: B1, B2\n";

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum OracleSetupError {
    #[error("Unsupported system architecture: {os} {arch}")]
    UnsupportedPlatform { os: String, arch: String },
    #[error("bundled PICT executable not found at {}", .path.display())]
    BundledMissing { path: PathBuf },
    #[error("{} points to {}, which does not exist", crate::config::ENV_PICT_PATH, .path.display())]
    OverrideMissing { path: PathBuf },
    #[error("no writable cache directory for PICT (tried {})", display_paths(.tried))]
    NoWritableCache { tried: Vec<PathBuf> },
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl OracleSetupError {
    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Vendor directory name for the running host.
pub fn vendor_target() -> Result<&'static str, OracleSetupError> {
    vendor_target_for(std::env::consts::OS, std::env::consts::ARCH)
}

/// Map an (os, arch) pair to a vendor directory name.
pub fn vendor_target_for(os: &str, arch: &str) -> Result<&'static str, OracleSetupError> {
    match (os, arch) {
        ("windows", "x86_64") => Ok("win-x64"),
        ("linux", "x86_64") => Ok("linux-x64"),
        ("macos", "aarch64") => Ok("macos-arm64"),
        ("macos", "x86_64") => Ok("macos-x64"),
        _ => Err(OracleSetupError::UnsupportedPlatform {
            os: os.to_string(),
            arch: arch.to_string(),
        }),
    }
}

#[must_use]
pub fn executable_name(target: &str) -> &'static str {
    if target.starts_with("win") {
        "pict.exe"
    } else {
        "pict"
    }
}

/// Root holding `pict/<target>/` bundles.
///
/// `PAIRWISE_VENDOR_DIR` wins; otherwise `vendor/` next to the running
/// executable, falling back to `./vendor`.
#[must_use]
pub fn vendor_root(env: &OracleEnv) -> PathBuf {
    if let Some(dir) = &env.vendor_dir {
        return dir.clone();
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.join("vendor")))
        .filter(|p| p.is_dir())
        .unwrap_or_else(|| PathBuf::from("vendor"))
}

#[must_use]
pub fn bundled_oracle_path(env: &OracleEnv, target: &str) -> PathBuf {
    vendor_root(env)
        .join("pict")
        .join(target)
        .join(executable_name(target))
}

/// Cache roots in preference order.
#[must_use]
pub fn cache_candidates(env: &OracleEnv) -> Vec<PathBuf> {
    if let Some(dir) = &env.cache_dir {
        return vec![dir.clone()];
    }
    let mut out = Vec::new();
    if let Some(os_cache) = &env.os_cache_dir {
        out.push(os_cache.join(APP_DIR_NAME));
    }
    if let Ok(cwd) = std::env::current_dir() {
        out.push(cwd.join(format!(".{APP_DIR_NAME}-cache")));
    }
    out.push(std::env::temp_dir().join(APP_DIR_NAME));
    out
}

/// Lowercase hex SHA-256 of a file.
pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    let bytes = fs::read(path)?;
    let digest = Sha256::digest(&bytes);
    Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
}

/// Path of a runnable oracle, extracting the bundled copy if needed.
pub fn ensure_oracle_binary(env: &OracleEnv) -> Result<PathBuf, OracleSetupError> {
    if let Some(path) = &env.pict_path {
        if path.is_file() {
            return Ok(path.clone());
        }
        return Err(OracleSetupError::OverrideMissing { path: path.clone() });
    }

    let target = vendor_target()?;
    let bundled = bundled_oracle_path(env, target);
    if !bundled.is_file() {
        return Err(OracleSetupError::BundledMissing { path: bundled });
    }
    let extract_dir = writable_extract_dir(env, target)?;
    let cached = extract_dir.join(executable_name(target));
    install_if_changed(&bundled, &cached)?;
    Ok(cached)
}

/// First candidate `<root>/pict/<version>/<target>` that accepts a test write.
fn writable_extract_dir(env: &OracleEnv, target: &str) -> Result<PathBuf, OracleSetupError> {
    let candidates = cache_candidates(env);
    for root in &candidates {
        let dir = root.join("pict").join(ORACLE_CACHE_VERSION).join(target);
        if fs::create_dir_all(&dir).is_err() {
            continue;
        }
        let probe = dir.join(".write_test");
        if fs::write(&probe, b"OK").is_ok() {
            let _ = fs::remove_file(&probe);
            return Ok(dir);
        }
    }
    Err(OracleSetupError::NoWritableCache { tried: candidates })
}

/// Copy `bundled` to `cached` unless the digests already match.
///
/// Returns whether a copy happened.
pub fn install_if_changed(bundled: &Path, cached: &Path) -> Result<bool, OracleSetupError> {
    let wanted = sha256_file(bundled).map_err(OracleSetupError::io(bundled))?;
    if cached.is_file() && sha256_file(cached).ok().as_deref() == Some(wanted.as_str()) {
        return Ok(false);
    }
    fs::copy(bundled, cached).map_err(OracleSetupError::io(cached))?;
    mark_executable(cached)?;
    Ok(true)
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<(), OracleSetupError> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)
        .map_err(OracleSetupError::io(path))?
        .permissions();
    perms.set_mode(perms.mode() | 0o755);
    fs::set_permissions(path, perms).map_err(OracleSetupError::io(path))
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> Result<(), OracleSetupError> {
    Ok(())
}

/// Runs the PICT executable once per request.
#[derive(Debug, Clone)]
pub struct PictOracle {
    executable: PathBuf,
    scratch_dir: PathBuf,
}

impl PictOracle {
    #[must_use]
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            scratch_dir: std::env::temp_dir(),
        }
    }

    #[must_use]
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Command-line arguments after the model file.
    #[must_use]
    pub fn oracle_args(strength: usize, seed: u64) -> Vec<String> {
        let mut args = Vec::with_capacity(2);
        if strength != 2 {
            args.push(format!("/o:{strength}"));
        }
        args.push(format!("/r:{seed}"));
        args
    }
}

impl GenerationOracle for PictOracle {
    fn generate(&mut self, request: &OracleRequest<'_>) -> Result<String, OracleError> {
        let scratch = ScratchFiles::new(&self.scratch_dir);
        fs::write(&scratch.model, request.model_text)
            .map_err(|e| scratch_error("write model file", &scratch.model, &e))?;
        let stdout = File::create(&scratch.stdout)
            .map_err(|e| scratch_error("create stdout file", &scratch.stdout, &e))?;
        let stderr = File::create(&scratch.stderr)
            .map_err(|e| scratch_error("create stderr file", &scratch.stderr, &e))?;

        let mut child = Command::new(&self.executable)
            .arg(&scratch.model)
            .args(Self::oracle_args(request.strength, request.seed))
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(|e| {
                OracleError::Execution(format!(
                    "failed to start {}: {e}",
                    self.executable.display()
                ))
            })?;

        let status = wait_for_child(&mut child, request.timeout)?;
        if !status.success() {
            let detail = read_lossy(&scratch.stderr);
            let detail = detail.trim();
            return Err(OracleError::Execution(if detail.is_empty() {
                format!("PICT exited with {status}")
            } else {
                format!("PICT exited with {status}: {detail}")
            }));
        }
        Ok(read_lossy(&scratch.stdout))
    }
}

/// Poll until the child exits; kill it once `timeout` elapses.
fn wait_for_child(
    child: &mut std::process::Child,
    timeout: Duration,
) -> Result<ExitStatus, OracleError> {
    let started_at = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                let elapsed = started_at.elapsed();
                if elapsed >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(OracleError::Timeout { after: elapsed });
                }
                thread::sleep(POLL_INTERVAL.min(timeout - elapsed));
            }
            Err(error) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(OracleError::Execution(format!(
                    "failed to wait for PICT: {error}"
                )));
            }
        }
    }
}

fn scratch_error(what: &str, path: &Path, err: &std::io::Error) -> OracleError {
    OracleError::Execution(format!("{what} {}: {err}", path.display()))
}

fn read_lossy(path: &Path) -> String {
    let mut bytes = Vec::new();
    match File::open(path).and_then(|mut f| f.read_to_end(&mut bytes)) {
        Ok(_) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => String::new(),
    }
}

/// Per-attempt model/stdout/stderr files, removed on drop.
struct ScratchFiles {
    model: PathBuf,
    stdout: PathBuf,
    stderr: PathBuf,
}

impl ScratchFiles {
    fn new(dir: &Path) -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.subsec_nanos());
        let stem = format!("pairwise-{}-{n}-{nanos}", std::process::id());
        Self {
            model: dir.join(format!("{stem}-model.txt")),
            stdout: dir.join(format!("{stem}.out")),
            stderr: dir.join(format!("{stem}.err")),
        }
    }
}

impl Drop for ScratchFiles {
    fn drop(&mut self) {
        for path in [&self.model, &self.stdout, &self.stderr] {
            let _ = fs::remove_file(path);
        }
    }
}

/// Run [`SMOKE_MODEL`] and check the output mentions its values.
pub fn smoke_test(oracle: &mut PictOracle, timeout: Duration) -> Result<bool, OracleError> {
    let out = oracle.generate(&OracleRequest {
        model_text: SMOKE_MODEL,
        strength: 2,
        seed: 0,
        timeout,
    })?;
    Ok(out.contains("A1") && out.contains("B1"))
}
