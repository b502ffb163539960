use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sweep_core::errors::SweepError;
use sweep_core::{ParameterCombination, RunKey};

use crate::space::ParameterSpace;

/// One required (combination, repetition) execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Run identity.
    pub key: RunKey,
    /// Parameter values to run with.
    pub combination: ParameterCombination,
    /// Repetition index in `[0, repetitions)`.
    pub repetition: u32,
}

/// Difference between the required runs and the completed ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    /// Required runs without a completed record, in enumeration order with
    /// repetitions innermost.
    pub missing: Vec<Job>,
    /// Size of the required set, `|space| * repetitions`.
    pub total: usize,
    /// Required runs that are already completed.
    pub completed: usize,
}

impl Reconciliation {
    /// Number of runs left to execute.
    pub fn to_run(&self) -> usize {
        self.missing.len()
    }
}

/// Computes `Required \ Completed` for `space × {0, …, repetitions-1}`.
///
/// Completed keys outside the required set are ignored, so shrinking a sweep
/// never produces negative counts.
pub fn reconcile(
    space: &ParameterSpace,
    repetitions: u32,
    completed: &HashSet<RunKey>,
) -> Result<Reconciliation, SweepError> {
    let total = space.len().saturating_mul(repetitions as usize);
    let mut missing = Vec::new();
    let mut done = 0usize;
    for combination in space {
        let fingerprint = combination.fingerprint()?;
        for repetition in 0..repetitions {
            let key = RunKey {
                fingerprint: fingerprint.clone(),
                repetition,
            };
            if completed.contains(&key) {
                done += 1;
            } else {
                missing.push(Job {
                    key,
                    combination: combination.clone(),
                    repetition,
                });
            }
        }
    }
    Ok(Reconciliation {
        missing,
        total,
        completed: done,
    })
}
