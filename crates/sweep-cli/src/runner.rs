//! Runs one simulation as a child process.
//!
//! Every attempt gets its own directory under the campaign's `data/` folder:
//! `<fingerprint>-<repetition>-<attempt>/` with the captured `stdout` and
//! `stderr` files. The simulator's working directory is that folder, so any
//! files it writes land next to its logs.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use clap::ValueEnum;
use serde_json::json;
use sweep_campaign::{
    CancelToken, ErrorInfo, JobFailure, ParameterCombination, RunFunction, RunKey, RunOutput,
    SweepError,
};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const STDERR_TAIL_BYTES: u64 = 512;

/// Build flavour of the simulator tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum BuildProfile {
    /// `build/optimized/`
    #[default]
    Optimized,
    /// `build/debug/`
    Debug,
}

impl BuildProfile {
    /// Directory name under `build/`.
    pub fn dir_name(self) -> &'static str {
        match self {
            BuildProfile::Optimized => "optimized",
            BuildProfile::Debug => "debug",
        }
    }
}

impl fmt::Display for BuildProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Locates the simulator executable.
///
/// An explicit `program` wins; otherwise the program is
/// `<sim_root>/build/<profile>/<script>`. The result is canonicalized so
/// children started in their own output directory still find it.
pub fn resolve_program(
    program: Option<&Path>,
    sim_root: Option<&Path>,
    script: Option<&str>,
    profile: BuildProfile,
) -> Result<PathBuf, SweepError> {
    let candidate = match (program, sim_root, script) {
        (Some(program), _, _) => program.to_path_buf(),
        (None, Some(root), Some(script)) => {
            root.join("build").join(profile.dir_name()).join(script)
        }
        _ => {
            return Err(SweepError::Configuration(
                ErrorInfo::new("program-unset", "no simulator program configured")
                    .with_hint("pass --program, or both --sim-root and --script"),
            ))
        }
    };
    match fs::canonicalize(&candidate) {
        Ok(path) if path.is_file() => Ok(path),
        Ok(path) => Err(SweepError::Configuration(
            ErrorInfo::new("program-missing", "simulator program is not a file")
                .with_path(&path),
        )),
        Err(err) => Err(SweepError::Configuration(
            ErrorInfo::new("program-missing", err.to_string())
                .with_path(&candidate),
        )),
    }
}

/// [`RunFunction`] that executes an external simulator.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    program: PathBuf,
    data_dir: PathBuf,
    timeout: Option<Duration>,
    cancel: CancelToken,
}

impl CommandRunner {
    /// Runner launching `program`, writing attempt folders under `data_dir`.
    pub fn new(
        program: impl Into<PathBuf>,
        data_dir: impl Into<PathBuf>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            program: program.into(),
            data_dir: data_dir.into(),
            timeout: None,
            cancel,
        }
    }

    /// Kills runs that exceed `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Simulator executable.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Command line for one run: `--<name>=<value>` per parameter, then
    /// `--RngRun=<repetition>`.
    pub fn arguments(combination: &ParameterCombination, repetition: u32) -> Vec<String> {
        combination
            .iter()
            .map(|(name, value)| format!("--{name}={value}"))
            .chain(std::iter::once(format!("--RngRun={repetition}")))
            .collect()
    }

    /// Creates the next unused `<fingerprint>-<rep>-<attempt>` directory.
    fn claim_output_dir(&self, key: &RunKey) -> Result<(PathBuf, u32), JobFailure> {
        fs::create_dir_all(&self.data_dir).map_err(|err| {
            JobFailure::failed(format!("create {}: {err}", self.data_dir.display()))
        })?;
        let mut attempt = 0u32;
        loop {
            let dir = self
                .data_dir
                .join(format!("{}-{}-{attempt}", key.fingerprint, key.repetition));
            match fs::create_dir(&dir) {
                Ok(()) => return Ok((dir, attempt)),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(err) => {
                    return Err(JobFailure::failed(format!(
                        "create {}: {err}",
                        dir.display()
                    )))
                }
            }
        }
    }

    fn spawn(&self, dir: &Path, args: &[String]) -> Result<Child, JobFailure> {
        let stdout = File::create(dir.join("stdout"))
            .map_err(|err| JobFailure::failed(format!("create stdout: {err}")))?;
        let stderr = File::create(dir.join("stderr"))
            .map_err(|err| JobFailure::failed(format!("create stderr: {err}")))?;
        Command::new(&self.program)
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|err| JobFailure::failed(format!("spawn {}: {err}", self.program.display())))
    }

    fn wait(&self, child: &mut Child, key: &RunKey) -> Result<ExitStatus, JobFailure> {
        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {}
                Err(err) => {
                    terminate(child, key);
                    return Err(JobFailure::failed(format!("wait: {err}")));
                }
            }
            if self.cancel.is_cancelled() {
                terminate(child, key);
                return Err(JobFailure::cancelled("campaign cancelled while running"));
            }
            if let Some(limit) = self.timeout {
                if started.elapsed() >= limit {
                    terminate(child, key);
                    return Err(JobFailure::timed_out(format!(
                        "exceeded {:.3}s",
                        limit.as_secs_f64()
                    )));
                }
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl RunFunction for CommandRunner {
    fn execute(
        &self,
        combination: &ParameterCombination,
        repetition: u32,
    ) -> Result<RunOutput, JobFailure> {
        let key = RunKey::new(combination, repetition)
            .map_err(|err| JobFailure::failed(err.to_string()))?;
        let (dir, attempt) = self.claim_output_dir(&key)?;
        let args = Self::arguments(combination, repetition);
        debug!(run = %key, dir = %dir.display(), ?args, "launching simulator");

        let mut child = self.spawn(&dir, &args)?;
        let status = self.wait(&mut child, &key)?;
        if !status.success() {
            let mut message = format!("{} exited with {status}", self.program.display());
            if let Some(tail) = stderr_tail(&dir.join("stderr")) {
                message.push_str(": ");
                message.push_str(&tail);
            }
            return Err(JobFailure::failed(message));
        }
        Ok(RunOutput {
            handle: Some(dir.display().to_string()),
            metadata: json!({
                "exit_code": status.code(),
                "attempt": attempt,
                "args": args,
            }),
        })
    }
}

fn terminate(child: &mut Child, key: &RunKey) {
    if let Err(err) = child.kill() {
        warn!(run = %key, error = %err, "failed to kill simulator");
    }
    // Reap so the process does not linger as a zombie.
    let _ = child.wait();
}

/// Last non-empty line of the captured stderr, if any.
fn stderr_tail(path: &Path) -> Option<String> {
    let mut file = File::open(path).ok()?;
    let len = file.metadata().ok()?.len();
    file.seek(SeekFrom::Start(len.saturating_sub(STDERR_TAIL_BYTES)))
        .ok()?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf).ok()?;
    String::from_utf8_lossy(&buf)
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}
