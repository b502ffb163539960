//! Campaign metadata and schema descriptors persisted next to the run index.

use serde::{Deserialize, Serialize};

/// Semantic version describing the schema of serialized payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaVersion {
    /// Major version incremented for breaking changes.
    pub major: u32,
    /// Minor version incremented for additive changes.
    pub minor: u32,
    /// Patch version incremented for bug fixes and documentation updates.
    pub patch: u32,
}

impl SchemaVersion {
    /// Creates a new schema version descriptor.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::new(1, 0, 0)
    }
}

/// Durable backend holding a campaign's run records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Append-only JSON lines file (`runs.jsonl`).
    #[default]
    Jsonl,
    /// Embedded SQLite database (`runs.sqlite`).
    Sqlite,
}

impl StoreKind {
    /// File name of the store inside the campaign directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            StoreKind::Jsonl => "runs.jsonl",
            StoreKind::Sqlite => "runs.sqlite",
        }
    }
}

/// Contents of `campaign.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignMeta {
    /// Schema version of the metadata file.
    #[serde(default)]
    pub schema_version: SchemaVersion,
    /// Campaign name, also the directory name under the results root.
    pub name: String,
    /// Parameter names in declaration order. Fixed once the campaign exists.
    pub schema: Vec<String>,
    /// Repetitions requested by the most recent `open`.
    pub repetitions: u32,
    /// Backend holding the run records.
    #[serde(default)]
    pub storage: StoreKind,
    /// RFC 3339 timestamp of campaign creation.
    pub created_at: String,
}
