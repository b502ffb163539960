use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sweep_core::errors::{ErrorInfo, SweepError};
use sweep_core::{ParameterValue, StoreKind};

use crate::serde::{from_yaml_slice, to_yaml_string};
use crate::space::ParameterSpace;

/// Values declared for one parameter: a list, or a scalar held fixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValues {
    /// Swept parameter (or fixed parameter written as a one-element list).
    List(Vec<ParameterValue>),
    /// Fixed parameter written as a bare scalar.
    Single(ParameterValue),
}

impl ParameterValues {
    /// Values as a list; scalars become single-element lists.
    pub fn to_list(&self) -> Vec<ParameterValue> {
        match self {
            ParameterValues::List(values) => values.clone(),
            ParameterValues::Single(value) => vec![value.clone()],
        }
    }
}

/// Campaign description loaded from YAML.
///
/// ```yaml
/// name: ecs_clustering_v1
/// repetitions: 30
/// parameters:
///   runTime: 600
///   totalNodes: [250, 500, 750, 1000]
///   travellerVelocity: [2.0, 5.0, 10.0, 15.0, 18.0]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Campaign name; also its directory under the results root.
    pub name: String,
    /// Independent repetitions per combination.
    #[serde(default = "CampaignConfig::default_repetitions")]
    pub repetitions: u32,
    /// Run index backend.
    #[serde(default)]
    pub storage: StoreKind,
    /// Parameters in enumeration order.
    pub parameters: IndexMap<String, ParameterValues>,
}

impl CampaignConfig {
    const fn default_repetitions() -> u32 {
        1
    }

    /// Builds the parameter space declared by the config.
    pub fn space(&self) -> Result<ParameterSpace, SweepError> {
        ParameterSpace::new(
            self.parameters
                .iter()
                .map(|(name, values)| (name.clone(), values.to_list())),
        )
    }

    /// YAML representation of the config.
    pub fn to_yaml_string(&self) -> Result<String, SweepError> {
        to_yaml_string(self)
    }
}

/// Reads a [`CampaignConfig`] from a YAML file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CampaignConfig, SweepError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|err| {
        SweepError::Configuration(ErrorInfo::new("config-read", err.to_string()).with_path(path))
    })?;
    from_yaml_slice(&bytes).map_err(|err| {
        let mut info = err.info().clone().with_path(path);
        info.code = "config-parse".to_string();
        SweepError::Configuration(info)
    })
}
