use std::any::Any;
use std::collections::HashSet;
use std::fmt::{self, Display};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sweep_core::errors::{ErrorInfo, SweepError};
use sweep_core::{ParameterCombination, RunKey};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::index::{RunIndex, RunRecord, RunStatus};
use crate::reconcile::Job;

/// Result payload of a successful run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunOutput {
    /// Opaque location of the run's results (directory, URI, ...).
    #[serde(default)]
    pub handle: Option<String>,
    /// Free-form metadata persisted with the record.
    #[serde(default)]
    pub metadata: Value,
}

impl RunOutput {
    /// Output pointing at `handle` with no metadata.
    pub fn at(handle: impl Into<String>) -> Self {
        Self {
            handle: Some(handle.into()),
            metadata: Value::Null,
        }
    }
}

/// Why a run did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// The run function reported failure.
    Failed,
    /// The run function panicked.
    Panicked,
    /// The run exceeded its caller-supplied time limit.
    TimedOut,
    /// The run was stopped by a cancellation request.
    Cancelled,
    /// The outcome could not be durably recorded.
    Storage,
}

impl Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::Failed => "failed",
            FailureKind::Panicked => "panicked",
            FailureKind::TimedOut => "timed-out",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Storage => "storage",
        };
        f.write_str(label)
    }
}

/// Failure value returned by a [`RunFunction`].
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct JobFailure {
    /// Failure category.
    pub kind: FailureKind,
    /// Human readable description.
    pub message: String,
}

impl JobFailure {
    /// Generic run failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Failed,
            message: message.into(),
        }
    }

    /// Run exceeded its time limit.
    pub fn timed_out(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::TimedOut,
            message: message.into(),
        }
    }

    /// Run was aborted because the campaign was cancelled.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Cancelled,
            message: message.into(),
        }
    }

    fn panicked(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Panicked,
            message: message.into(),
        }
    }
}

impl From<JobFailure> for SweepError {
    fn from(failure: JobFailure) -> Self {
        SweepError::Job(ErrorInfo::new(failure.kind.to_string(), failure.message))
    }
}

/// Caller-supplied capability that executes one run.
pub trait RunFunction: Send + Sync {
    /// Executes `combination` for repetition `repetition`.
    fn execute(
        &self,
        combination: &ParameterCombination,
        repetition: u32,
    ) -> Result<RunOutput, JobFailure>;
}

impl<F> RunFunction for F
where
    F: Fn(&ParameterCombination, u32) -> Result<RunOutput, JobFailure> + Send + Sync,
{
    fn execute(
        &self,
        combination: &ParameterCombination,
        repetition: u32,
    ) -> Result<RunOutput, JobFailure> {
        self(combination, repetition)
    }
}

/// Shared flag that stops dispatching new runs once set.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates an unset token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// True once [`CancelToken::cancel`] was called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Keys currently executing within this process.
#[derive(Debug, Default)]
pub struct InFlight(Mutex<HashSet<RunKey>>);

impl InFlight {
    /// Marks `key` as running; `None` when it already is.
    pub fn claim(&self, key: &RunKey) -> Option<InFlightClaim<'_>> {
        let mut keys = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if keys.insert(key.clone()) {
            Some(InFlightClaim {
                owner: self,
                key: key.clone(),
            })
        } else {
            None
        }
    }

    /// Number of keys currently running.
    pub fn len(&self) -> usize {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// True when nothing is running.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Releases its key from the [`InFlight`] set when dropped.
#[derive(Debug)]
pub struct InFlightClaim<'a> {
    owner: &'a InFlight,
    key: RunKey,
}

impl Drop for InFlightClaim<'_> {
    fn drop(&mut self) {
        self.owner
            .0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.key);
    }
}

/// Options governing one `run_missing` pass.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Maximum concurrent runs; `0` uses every available core.
    pub concurrency: usize,
    /// Cancellation flag observed before each dispatch.
    pub cancel: CancelToken,
}

/// Diagnostic entry for a run that did not complete cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureEntry {
    /// Run identity.
    pub key: RunKey,
    /// Parameter values of the run.
    pub params: ParameterCombination,
    /// Failure category.
    pub kind: FailureKind,
    /// Human readable description.
    pub message: String,
}

/// Outcome counts of one scheduling pass.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Runs that completed and were durably recorded.
    pub completed: usize,
    /// Runs that failed, including completed runs whose record could not be written.
    pub failed: usize,
    /// Runs found completed at dispatch time.
    pub skipped: usize,
    /// Runs not started because the same key was already executing.
    pub in_flight: usize,
    /// Runs never dispatched because cancellation was requested.
    pub cancelled: usize,
    /// One entry per failed run.
    #[serde(default)]
    pub failures: Vec<FailureEntry>,
    /// Runs whose outcome may not have reached durable storage.
    #[serde(default)]
    pub storage_errors: Vec<FailureEntry>,
}

impl RunSummary {
    fn processed(&self) -> usize {
        self.completed + self.failed + self.skipped + self.in_flight
    }
}

enum JobOutcome {
    Completed,
    Failed(FailureEntry),
    StorageFailed(FailureEntry),
    Skipped,
    AlreadyRunning,
}

/// Resolves a requested concurrency into a worker count (`0` = all cores).
pub fn resolve_workers(concurrency: usize) -> usize {
    if concurrency > 0 {
        return concurrency;
    }
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Executes `jobs` on at most `opts.concurrency` workers.
///
/// Jobs are dispatched in slice order as workers free up. Individual
/// failures are recorded and never stop the pass; the call returns once
/// every dispatched job has reached a terminal state.
pub fn schedule<R>(
    jobs: &[Job],
    runner: &R,
    index: &RunIndex,
    in_flight: &InFlight,
    opts: &RunOptions,
) -> Result<RunSummary, SweepError>
where
    R: RunFunction + ?Sized,
{
    if jobs.is_empty() {
        return Ok(RunSummary::default());
    }
    let workers = resolve_workers(opts.concurrency).min(jobs.len());
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|idx| format!("sweep-worker-{idx}"))
        .build()
        .map_err(|err| {
            SweepError::Configuration(
                ErrorInfo::new("thread-pool", err.to_string())
                    .with_context("workers", workers.to_string()),
            )
        })?;
    info!(jobs = jobs.len(), workers, "dispatching runs");

    let cursor = AtomicUsize::new(0);
    let tally = Mutex::new(RunSummary::default());
    pool.scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|_| loop {
                if opts.cancel.is_cancelled() {
                    break;
                }
                let next = cursor.fetch_add(1, Ordering::SeqCst);
                let Some(job) = jobs.get(next) else {
                    break;
                };
                let outcome = run_job(job, runner, index, in_flight);
                let mut guard = tally.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                absorb(&mut guard, outcome);
            });
        }
    });

    let mut summary = tally
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    summary.cancelled = jobs.len() - summary.processed();
    if summary.cancelled > 0 {
        warn!(
            cancelled = summary.cancelled,
            "cancellation requested; remaining runs left for a later pass"
        );
    }
    summary.failures.sort_by(|a, b| a.key.cmp(&b.key));
    summary.storage_errors.sort_by(|a, b| a.key.cmp(&b.key));
    info!(
        completed = summary.completed,
        failed = summary.failed,
        skipped = summary.skipped,
        in_flight = summary.in_flight,
        cancelled = summary.cancelled,
        "dispatch drained"
    );
    Ok(summary)
}

fn absorb(summary: &mut RunSummary, outcome: JobOutcome) {
    match outcome {
        JobOutcome::Completed => summary.completed += 1,
        JobOutcome::Failed(entry) => {
            summary.failed += 1;
            summary.failures.push(entry);
        }
        JobOutcome::StorageFailed(entry) => {
            summary.failed += 1;
            summary.failures.push(entry.clone());
            summary.storage_errors.push(entry);
        }
        JobOutcome::Skipped => summary.skipped += 1,
        JobOutcome::AlreadyRunning => summary.in_flight += 1,
    }
}

fn run_job<R>(job: &Job, runner: &R, index: &RunIndex, in_flight: &InFlight) -> JobOutcome
where
    R: RunFunction + ?Sized,
{
    let Some(_claim) = in_flight.claim(&job.key) else {
        debug!(key = %job.key, "run already in flight");
        return JobOutcome::AlreadyRunning;
    };
    if index.contains(&job.key) {
        debug!(key = %job.key, "run completed since reconciliation");
        return JobOutcome::Skipped;
    }

    let attempt = index.attempts_for(&job.key);
    debug!(key = %job.key, params = %job.combination, attempt, "run started");
    let started = Instant::now();
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        runner.execute(&job.combination, job.repetition)
    }))
    .unwrap_or_else(|payload| Err(JobFailure::panicked(panic_message(payload.as_ref()))));
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let mut record = RunRecord {
        key: job.key.clone(),
        status: RunStatus::Completed,
        params: job.combination.clone(),
        attempt,
        handle: None,
        error: None,
        metadata: Value::Null,
        elapsed_ms,
        finished_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    };
    let failure = match result {
        Ok(output) => {
            record.handle = output.handle;
            record.metadata = output.metadata;
            None
        }
        Err(failure) => {
            warn!(
                key = %job.key,
                params = %job.combination,
                kind = %failure.kind,
                "run failed: {}",
                failure.message
            );
            record.status = RunStatus::Failed;
            record.error = Some(failure.to_string());
            Some(failure)
        }
    };

    if let Err(err) = index.record(record) {
        error!(key = %job.key, "could not record run outcome: {err}");
        return JobOutcome::StorageFailed(FailureEntry {
            key: job.key.clone(),
            params: job.combination.clone(),
            kind: FailureKind::Storage,
            message: err.to_string(),
        });
    }
    match failure {
        None => {
            debug!(key = %job.key, elapsed_ms, "run completed");
            JobOutcome::Completed
        }
        Some(failure) => JobOutcome::Failed(FailureEntry {
            key: job.key.clone(),
            params: job.combination.clone(),
            kind: failure.kind,
            message: failure.message,
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "run function panicked".to_string()
    }
}
