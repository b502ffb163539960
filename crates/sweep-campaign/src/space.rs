use std::collections::BTreeSet;
use std::iter::FusedIterator;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sweep_core::errors::{ErrorInfo, SweepError};
use sweep_core::{ParameterCombination, ParameterValue};

/// One named axis of the sweep with its candidate values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpaceParameter {
    /// Parameter name passed to the run function.
    pub name: String,
    /// Candidate values in enumeration order.
    pub values: Vec<ParameterValue>,
}

/// Cartesian product of named parameter value lists.
///
/// Enumeration is lexicographic over the declared parameter order: the
/// first parameter is the outermost loop, the last one varies fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpace {
    parameters: Vec<SpaceParameter>,
    size: usize,
}

impl ParameterSpace {
    /// Builds a space from `(name, values)` pairs in declaration order.
    pub fn new<I, S>(parameters: I) -> Result<Self, SweepError>
    where
        I: IntoIterator<Item = (S, Vec<ParameterValue>)>,
        S: Into<String>,
    {
        let parameters: Vec<SpaceParameter> = parameters
            .into_iter()
            .map(|(name, values)| SpaceParameter {
                name: name.into(),
                values,
            })
            .collect();
        if parameters.is_empty() {
            return Err(SweepError::configuration(
                "space-empty",
                "parameter space declares no parameters",
            ));
        }
        let mut seen = BTreeSet::new();
        let mut size = 1usize;
        for param in &parameters {
            if param.name.trim().is_empty() {
                return Err(SweepError::configuration(
                    "space-blank-name",
                    "parameter names must not be blank",
                ));
            }
            if !seen.insert(param.name.as_str()) {
                return Err(SweepError::Configuration(
                    ErrorInfo::new("space-duplicate-name", "parameter declared twice")
                        .with_context("parameter", param.name.clone()),
                ));
            }
            if param.values.is_empty() {
                return Err(SweepError::Configuration(
                    ErrorInfo::new("space-empty-values", "parameter has no candidate values")
                        .with_context("parameter", param.name.clone())
                        .with_hint("fixed parameters take a single-element list"),
                ));
            }
            if let Some(value) = param.values.iter().find(|value| !value.is_finite()) {
                return Err(SweepError::Configuration(
                    ErrorInfo::new("space-non-finite", "parameter value is not finite")
                        .with_context("parameter", param.name.clone())
                        .with_context("value", value.to_string()),
                ));
            }
            size = size.checked_mul(param.values.len()).ok_or_else(|| {
                SweepError::configuration("space-too-large", "combination count overflows usize")
            })?;
        }
        Ok(Self { parameters, size })
    }

    /// Builds a space from an insertion-ordered mapping.
    pub fn from_map(map: &IndexMap<String, Vec<ParameterValue>>) -> Result<Self, SweepError> {
        Self::new(map.iter().map(|(name, values)| (name.clone(), values.clone())))
    }

    /// Number of combinations, `∏ |values[k]|`.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Always false: construction rejects empty spaces.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Declared parameters in enumeration order.
    pub fn parameters(&self) -> &[SpaceParameter] {
        &self.parameters
    }

    /// Parameter names in declaration order.
    pub fn schema(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }

    /// Lazily enumerates every combination. Each call restarts from the first one.
    pub fn iter(&self) -> Combinations<'_> {
        Combinations {
            parameters: &self.parameters,
            cursor: vec![0; self.parameters.len()],
            remaining: self.size,
        }
    }

    /// Materialises the whole space.
    pub fn to_vec(&self) -> Vec<ParameterCombination> {
        self.iter().collect()
    }

    /// Checks that `combination` binds exactly the declared keys to declared values.
    pub fn validate(&self, combination: &ParameterCombination) -> Result<(), SweepError> {
        for name in combination.names() {
            if !self.parameters.iter().any(|p| &p.name == name) {
                return Err(SweepError::Configuration(
                    ErrorInfo::new("combination-unknown-key", "parameter not in schema")
                        .with_context("parameter", name.clone()),
                ));
            }
        }
        for param in &self.parameters {
            match combination.get(&param.name) {
                None => {
                    return Err(SweepError::Configuration(
                        ErrorInfo::new("combination-missing-key", "parameter left unbound")
                            .with_context("parameter", param.name.clone()),
                    ))
                }
                Some(value) if !param.values.contains(value) => {
                    return Err(SweepError::Configuration(
                        ErrorInfo::new("combination-foreign-value", "value not in candidate list")
                            .with_context("parameter", param.name.clone())
                            .with_context("value", value.to_string()),
                    ))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a ParameterSpace {
    type Item = ParameterCombination;
    type IntoIter = Combinations<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Odometer over the value indices of a [`ParameterSpace`].
#[derive(Debug, Clone)]
pub struct Combinations<'a> {
    parameters: &'a [SpaceParameter],
    cursor: Vec<usize>,
    remaining: usize,
}

impl Iterator for Combinations<'_> {
    type Item = ParameterCombination;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let combination = self
            .parameters
            .iter()
            .zip(&self.cursor)
            .map(|(param, &idx)| (param.name.clone(), param.values[idx].clone()))
            .collect();
        self.remaining -= 1;
        for (slot, param) in self.cursor.iter_mut().zip(self.parameters).rev() {
            *slot += 1;
            if *slot < param.values.len() {
                break;
            }
            *slot = 0;
        }
        Some(combination)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Combinations<'_> {}

impl FusedIterator for Combinations<'_> {}
