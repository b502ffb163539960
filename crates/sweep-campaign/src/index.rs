use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sweep_core::errors::SweepError;
use sweep_core::{ParameterCombination, RunKey, StoreKind};
use tracing::debug;

use crate::store::RunStore;

/// Terminal outcome of one run attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// The run function returned a result.
    Completed,
    /// The run function reported failure, panicked, or the record was unreliable.
    Failed,
}

impl RunStatus {
    /// Lowercase label used in storage and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

/// Persisted outcome of one attempt at a [`RunKey`]. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Identity of the run (fingerprint and repetition index).
    pub key: RunKey,
    /// Outcome of the attempt.
    pub status: RunStatus,
    /// Parameter values the run was executed with.
    pub params: ParameterCombination,
    /// Zero-based attempt counter for this key.
    pub attempt: u32,
    /// Opaque result location for completed runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    /// Failure description for failed runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Free-form metadata reported by the run function.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
    /// Wall-clock duration of the attempt in milliseconds.
    pub elapsed_ms: u64,
    /// RFC 3339 timestamp at which the attempt finished.
    pub finished_at: String,
}

impl RunRecord {
    /// Repetition index of the run.
    pub fn repetition(&self) -> u32 {
        self.key.repetition
    }
}

#[derive(Debug)]
struct IndexState {
    store: RunStore,
    history: HashMap<RunKey, Vec<RunRecord>>,
    completed: HashSet<RunKey>,
    attempts: usize,
}

impl IndexState {
    fn apply(&mut self, record: RunRecord) {
        if record.status == RunStatus::Completed {
            self.completed.insert(record.key.clone());
        }
        self.attempts += 1;
        self.history.entry(record.key.clone()).or_default().push(record);
    }

    fn reload(&mut self) -> Result<(), SweepError> {
        let records = self.store.load()?;
        self.history.clear();
        self.completed.clear();
        self.attempts = 0;
        for record in records {
            self.apply(record);
        }
        Ok(())
    }
}

/// Thread-safe record of which runs of a campaign have completed.
///
/// All writes go through one mutex, so concurrent workers never interleave
/// their appends to the backing store.
#[derive(Debug)]
pub struct RunIndex {
    path: PathBuf,
    state: Mutex<IndexState>,
}

impl RunIndex {
    /// Opens the index stored in `dir`, loading every persisted record.
    pub fn open(dir: &Path, kind: StoreKind) -> Result<Self, SweepError> {
        let store = RunStore::open(dir, kind)?;
        let path = store.path().to_path_buf();
        let mut state = IndexState {
            store,
            history: HashMap::new(),
            completed: HashSet::new(),
            attempts: 0,
        };
        state.reload()?;
        debug!(
            path = %path.display(),
            attempts = state.attempts,
            completed = state.completed.len(),
            "run index loaded"
        );
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    fn lock(&self) -> MutexGuard<'_, IndexState> {
        // A poisoned lock only means a reader panicked; the state itself is
        // updated after the durable write and stays consistent.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Location of the backing store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True iff a completed record exists for `key`.
    pub fn contains(&self, key: &RunKey) -> bool {
        self.lock().completed.contains(key)
    }

    /// Durably appends `record`, then makes it visible to readers.
    ///
    /// Recording an already completed key again only extends its history;
    /// the completed set is unchanged.
    pub fn record(&self, record: RunRecord) -> Result<(), SweepError> {
        let mut state = self.lock();
        state.store.append(&record)?;
        state.apply(record);
        Ok(())
    }

    /// Keys currently recorded as completed.
    pub fn snapshot(&self) -> HashSet<RunKey> {
        self.lock().completed.clone()
    }

    /// Number of distinct completed keys.
    pub fn completed_count(&self) -> usize {
        self.lock().completed.len()
    }

    /// Total number of recorded attempts, completed or failed.
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }

    /// Number of attempts recorded for `key`; also the next attempt counter.
    pub fn attempts_for(&self, key: &RunKey) -> u32 {
        self.lock()
            .history
            .get(key)
            .map(|records| records.len() as u32)
            .unwrap_or(0)
    }

    /// Every attempt recorded for `key`, oldest first.
    pub fn history(&self, key: &RunKey) -> Vec<RunRecord> {
        self.lock().history.get(key).cloned().unwrap_or_default()
    }

    /// Keys with at least one failed attempt and no completed one, sorted.
    pub fn failed_keys(&self) -> Vec<RunKey> {
        let state = self.lock();
        let mut keys: Vec<RunKey> = state
            .history
            .keys()
            .filter(|key| !state.completed.contains(*key))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Re-reads the backing store, picking up records written by other processes.
    pub fn refresh(&self) -> Result<(), SweepError> {
        self.lock().reload()
    }
}
