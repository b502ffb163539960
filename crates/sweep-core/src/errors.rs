//! Error taxonomy of the campaign engine.
//!
//! Every failure carries an [`ErrorInfo`]: a stable kebab-case code, a
//! message and optional context such as the file or campaign involved.

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Code, message and context of a [`SweepError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable kebab-case code, e.g. `schema-mismatch`.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Campaign names, paths, line numbers and the like.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
    /// What the caller can do about it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Payload without context.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds one context entry.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Records the file the error concerns under the `path` key.
    pub fn with_path(self, path: &Path) -> Self {
        self.with_context("path", path.display().to_string())
    }

    /// Sets the remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        let mut entries = self.context.iter();
        if let Some((key, value)) = entries.next() {
            write!(f, " ({key}={value}")?;
            for (key, value) in entries {
                write!(f, ", {key}={value}")?;
            }
            f.write_str(")")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "; hint: {hint}")?;
        }
        Ok(())
    }
}

/// Error returned by campaign operations.
///
/// Only [`SweepError::Configuration`] and [`SweepError::Storage`] abort an
/// operation. Job failures and cancellation are folded into the per-run
/// accounting by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum SweepError {
    /// Malformed parameter space, schema mismatch or invalid repetition count.
    #[error("invalid configuration {0}")]
    Configuration(ErrorInfo),
    /// Run index or campaign metadata could not be read or durably written.
    #[error("storage failure {0}")]
    Storage(ErrorInfo),
    /// A single run reported failure.
    #[error("run failed {0}")]
    Job(ErrorInfo),
    /// The caller asked the campaign to stop.
    #[error("cancelled {0}")]
    Cancelled(ErrorInfo),
    /// JSON or YAML encoding failure.
    #[error("encoding error {0}")]
    Serde(ErrorInfo),
}

impl SweepError {
    /// Payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            SweepError::Configuration(info)
            | SweepError::Storage(info)
            | SweepError::Job(info)
            | SweepError::Cancelled(info)
            | SweepError::Serde(info) => info,
        }
    }

    /// Configuration error with no context.
    pub fn configuration(code: &str, message: impl Into<String>) -> Self {
        SweepError::Configuration(ErrorInfo::new(code, message))
    }

    /// True when the error must abort the whole campaign operation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SweepError::Configuration(_) | SweepError::Storage(_))
    }
}
