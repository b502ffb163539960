use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sweep_core::errors::{ErrorInfo, SweepError};
use sweep_core::{CampaignMeta, SchemaVersion, StoreKind};
use tracing::info;

use crate::config::CampaignConfig;
use crate::index::RunIndex;
use crate::reconcile::{reconcile, Reconciliation};
use crate::scheduler::{schedule, InFlight, RunFunction, RunOptions, RunSummary};
use crate::serde::{from_json_slice, to_pretty_json_string};
use crate::space::ParameterSpace;

const META_FILE: &str = "campaign.json";

/// One named experiment: its sweep, repetition count and run index.
#[derive(Debug)]
pub struct Campaign {
    meta: CampaignMeta,
    dir: PathBuf,
    space: ParameterSpace,
    index: RunIndex,
    in_flight: InFlight,
}

impl Campaign {
    /// Campaign name.
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// Directory holding `campaign.json`, the run store and run outputs.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Directory where run functions may place per-run outputs.
    pub fn data_dir(&self) -> PathBuf {
        self.dir.join("data")
    }

    /// Declared parameter space.
    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    /// Repetitions per combination.
    pub fn repetitions(&self) -> u32 {
        self.meta.repetitions
    }

    /// Persisted metadata.
    pub fn meta(&self) -> &CampaignMeta {
        &self.meta
    }

    /// Record of completed and failed runs.
    pub fn index(&self) -> &RunIndex {
        &self.index
    }
}

/// Read-only status of a campaign at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignStatus {
    /// Campaign name.
    pub name: String,
    /// Runs still to execute.
    pub to_run: usize,
    /// Size of the required set.
    pub total: usize,
    /// Required runs already completed.
    pub completed: usize,
    /// Keys whose attempts so far all failed.
    pub failed_keys: usize,
    /// Attempts recorded, completed or failed.
    pub attempts: usize,
    /// Runs executing in this process right now.
    pub running: usize,
}

/// Opens campaigns under a results root and drives their runs.
#[derive(Debug, Clone)]
pub struct CampaignManager {
    root: PathBuf,
}

impl CampaignManager {
    /// Manager storing campaigns as subdirectories of `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Results root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Loads the named campaign, creating it on first use.
    ///
    /// Fails with a configuration error for zero repetitions, an unusable
    /// name, or a parameter schema different from the stored one, and with
    /// a storage error when existing metadata or records cannot be read.
    pub fn open(
        &self,
        name: &str,
        space: ParameterSpace,
        repetitions: u32,
        storage: StoreKind,
    ) -> Result<Campaign, SweepError> {
        validate_name(name)?;
        if repetitions == 0 {
            return Err(SweepError::Configuration(
                ErrorInfo::new("zero-repetitions", "repetitions must be at least 1")
                    .with_context("campaign", name),
            ));
        }
        let dir = self.root.join(name);
        let meta_path = dir.join(META_FILE);
        let schema = space.schema();

        let meta = if meta_path.exists() {
            let mut meta = read_meta(&meta_path)?;
            check_compatible(&meta, &schema, storage)?;
            if meta.repetitions != repetitions {
                info!(
                    campaign = name,
                    from = meta.repetitions,
                    to = repetitions,
                    "repetition count changed"
                );
                meta.repetitions = repetitions;
                meta.schema = schema;
                write_meta(&meta_path, &meta)?;
            }
            meta
        } else {
            fs::create_dir_all(&dir).map_err(|err| {
                SweepError::Storage(
                    ErrorInfo::new("campaign-dir", err.to_string()).with_path(&dir),
                )
            })?;
            let meta = CampaignMeta {
                schema_version: SchemaVersion::default(),
                name: name.to_string(),
                schema,
                repetitions,
                storage,
                created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            };
            write_meta(&meta_path, &meta)?;
            meta
        };

        let index = RunIndex::open(&dir, meta.storage)?;
        info!(
            campaign = name,
            dir = %dir.display(),
            combinations = space.len(),
            repetitions,
            completed = index.completed_count(),
            "campaign opened"
        );
        Ok(Campaign {
            meta,
            dir,
            space,
            index,
            in_flight: InFlight::default(),
        })
    }

    /// Opens the campaign described by a loaded config file.
    pub fn open_from_config(&self, config: &CampaignConfig) -> Result<Campaign, SweepError> {
        self.open(
            &config.name,
            config.space()?,
            config.repetitions,
            config.storage,
        )
    }

    /// Reconciles the campaign's required runs against its index.
    pub fn missing(&self, campaign: &Campaign) -> Result<Reconciliation, SweepError> {
        reconcile(
            &campaign.space,
            campaign.meta.repetitions,
            &campaign.index.snapshot(),
        )
    }

    /// `(to_run, total)` at call time. Safe while a run is in progress.
    pub fn missing_count(&self, campaign: &Campaign) -> Result<(usize, usize), SweepError> {
        let plan = self.missing(campaign)?;
        Ok((plan.to_run(), plan.total))
    }

    /// Status counters for reporting.
    pub fn status(&self, campaign: &Campaign) -> Result<CampaignStatus, SweepError> {
        let plan = self.missing(campaign)?;
        Ok(CampaignStatus {
            name: campaign.meta.name.clone(),
            to_run: plan.to_run(),
            total: plan.total,
            completed: plan.completed,
            failed_keys: campaign.index.failed_keys().len(),
            attempts: campaign.index.attempts(),
            running: campaign.in_flight.len(),
        })
    }

    /// Runs every missing (combination, repetition) pair with `runner`.
    ///
    /// Individual failures never abort the pass; they are recorded and
    /// reported in the returned summary.
    pub fn run_missing<R>(
        &self,
        campaign: &Campaign,
        runner: &R,
        opts: &RunOptions,
    ) -> Result<RunSummary, SweepError>
    where
        R: RunFunction + ?Sized,
    {
        let plan = self.missing(campaign)?;
        info!(
            campaign = campaign.name(),
            to_run = plan.to_run(),
            total = plan.total,
            "running missing simulations"
        );
        schedule(
            &plan.missing,
            runner,
            &campaign.index,
            &campaign.in_flight,
            opts,
        )
    }
}

fn validate_name(name: &str) -> Result<(), SweepError> {
    let unusable = name.trim().is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.contains('\0');
    if unusable {
        return Err(SweepError::Configuration(
            ErrorInfo::new("campaign-name", "campaign name must be a plain directory name")
                .with_context("name", name),
        ));
    }
    Ok(())
}

fn check_compatible(
    meta: &CampaignMeta,
    schema: &[String],
    storage: StoreKind,
) -> Result<(), SweepError> {
    let stored: BTreeSet<&String> = meta.schema.iter().collect();
    let declared: BTreeSet<&String> = schema.iter().collect();
    if stored != declared {
        return Err(SweepError::Configuration(
            ErrorInfo::new(
                "schema-mismatch",
                "declared parameters differ from the existing campaign",
            )
            .with_context("campaign", meta.name.clone())
            .with_context("stored", meta.schema.join(","))
            .with_context("declared", schema.join(","))
            .with_hint("use a new campaign name for a different parameter set"),
        ));
    }
    if meta.storage != storage {
        return Err(SweepError::Configuration(
            ErrorInfo::new("storage-mismatch", "campaign uses a different run store")
                .with_context("campaign", meta.name.clone())
                .with_context("stored", meta.storage.file_name())
                .with_context("declared", storage.file_name()),
        ));
    }
    Ok(())
}

fn read_meta(path: &Path) -> Result<CampaignMeta, SweepError> {
    let bytes = fs::read(path).map_err(|err| {
        SweepError::Storage(
            ErrorInfo::new("meta-read", err.to_string()).with_path(path),
        )
    })?;
    from_json_slice(&bytes).map_err(|err| {
        SweepError::Storage(
            ErrorInfo::new("meta-corrupt", "campaign metadata is unreadable")
                .with_path(path)
                .with_hint(err.info().message.clone()),
        )
    })
}

fn write_meta(path: &Path, meta: &CampaignMeta) -> Result<(), SweepError> {
    let text = to_pretty_json_string(meta)?;
    let tmp = path.with_extension("json.tmp");
    let write = || -> std::io::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(text.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    };
    write().map_err(|err| {
        SweepError::Storage(
            ErrorInfo::new("meta-write", err.to_string()).with_path(path),
        )
    })
}
