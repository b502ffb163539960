#![deny(missing_docs)]
#![doc = "Core value types and the shared error surface for sweep campaigns."]

pub mod errors;
pub mod meta;
mod types;

pub use errors::{ErrorInfo, SweepError};
pub use meta::{CampaignMeta, SchemaVersion, StoreKind};
pub use types::{ParameterCombination, ParameterValue, RunKey};
