#![deny(missing_docs)]
#![doc = "Campaign engine: parameter sweep enumeration, durable run index, reconciliation and bounded parallel scheduling."]

/// Campaign description files.
pub mod config;
/// Durable record of run outcomes.
pub mod index;
/// Campaign lifecycle and public operations.
pub mod manager;
/// Missing-run computation.
pub mod reconcile;
/// Bounded worker pool execution.
pub mod scheduler;
/// Canonical JSON and YAML helpers.
pub mod serde;
/// Cartesian parameter spaces.
pub mod space;
/// Run store backends.
pub mod store;

pub use config::{load_config, CampaignConfig, ParameterValues};
pub use index::{RunIndex, RunRecord, RunStatus};
pub use manager::{Campaign, CampaignManager, CampaignStatus};
pub use reconcile::{reconcile, Job, Reconciliation};
pub use scheduler::{
    resolve_workers, schedule, CancelToken, FailureEntry, FailureKind, InFlight, InFlightClaim,
    JobFailure, RunFunction, RunOptions, RunOutput, RunSummary,
};
pub use space::{Combinations, ParameterSpace, SpaceParameter};
pub use store::RunStore;

pub use sweep_core::{
    CampaignMeta, ErrorInfo, ParameterCombination, ParameterValue, RunKey, StoreKind, SweepError,
};
