use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::{ErrorInfo, SweepError};

/// Scalar value assigned to a parameter.
///
/// Integers and floats are distinct: `2` and `2.0` produce different
/// fingerprints, matching how they are passed to the simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    /// Signed integer value.
    Int(i64),
    /// Finite floating point value.
    Float(f64),
    /// Free-form string value.
    Text(String),
}

impl ParameterValue {
    /// Returns false for NaN and infinite floats, which have no stable encoding.
    pub fn is_finite(&self) -> bool {
        match self {
            ParameterValue::Float(value) => value.is_finite(),
            _ => true,
        }
    }
}

impl Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Int(value) => write!(f, "{value}"),
            // Debug keeps the trailing `.0` so floats stay floats on the command line.
            ParameterValue::Float(value) => write!(f, "{value:?}"),
            ParameterValue::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for ParameterValue {
    fn from(value: i64) -> Self {
        ParameterValue::Int(value)
    }
}

impl From<i32> for ParameterValue {
    fn from(value: i32) -> Self {
        ParameterValue::Int(value as i64)
    }
}

impl From<f64> for ParameterValue {
    fn from(value: f64) -> Self {
        ParameterValue::Float(value)
    }
}

impl From<&str> for ParameterValue {
    fn from(value: &str) -> Self {
        ParameterValue::Text(value.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(value: String) -> Self {
        ParameterValue::Text(value)
    }
}

/// One concrete assignment of a value to every parameter of a space.
///
/// Keys are stored sorted, so insertion order never influences equality or
/// the fingerprint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterCombination(BTreeMap<String, ParameterValue>);

impl ParameterCombination {
    /// Creates an empty combination.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value bound to `name`.
    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.0.get(name)
    }

    /// Iterates over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParameterValue)> {
        self.0.iter()
    }

    /// Iterates over parameter names in name order.
    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Number of parameters bound by the combination.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true when no parameter is bound.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Deterministic, order independent SHA-256 fingerprint (lowercase hex).
    pub fn fingerprint(&self) -> Result<String, SweepError> {
        // BTreeMap serialises its entries sorted by key, which makes the
        // compact JSON encoding canonical.
        let bytes = serde_json::to_vec(&self.0).map_err(|err| {
            SweepError::Serde(
                ErrorInfo::new("fingerprint-encode", err.to_string())
                    .with_context("params", format!("{self}")),
            )
        })?;
        Ok(format!("{:x}", Sha256::digest(bytes)))
    }

    pub(crate) fn insert(&mut self, name: String, value: ParameterValue) {
        self.0.insert(name, value);
    }
}

impl FromIterator<(String, ParameterValue)> for ParameterCombination {
    fn from_iter<I: IntoIterator<Item = (String, ParameterValue)>>(iter: I) -> Self {
        let mut combination = ParameterCombination::new();
        for (name, value) in iter {
            combination.insert(name, value);
        }
        combination
    }
}

impl Display for ParameterCombination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (idx, (name, value)) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        write!(f, "}}")
    }
}

/// Identifies one execution of a combination within a campaign.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunKey {
    /// Fingerprint of the parameter combination.
    pub fingerprint: String,
    /// Repetition index in `[0, repetitions)`.
    pub repetition: u32,
}

impl RunKey {
    /// Builds the key for `combination` at `repetition`.
    pub fn new(combination: &ParameterCombination, repetition: u32) -> Result<Self, SweepError> {
        Ok(Self {
            fingerprint: combination.fingerprint()?,
            repetition,
        })
    }

    /// Short fingerprint prefix used in logs and directory names.
    pub fn short(&self) -> &str {
        let end = self.fingerprint.len().min(12);
        &self.fingerprint[..end]
    }
}

impl Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.short(), self.repetition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_ignores_insertion_order() {
        let a: ParameterCombination = vec![
            ("speed".to_string(), ParameterValue::Float(2.0)),
            ("nodes".to_string(), ParameterValue::Int(250)),
        ]
        .into_iter()
        .collect();
        let b: ParameterCombination = vec![
            ("nodes".to_string(), ParameterValue::Int(250)),
            ("speed".to_string(), ParameterValue::Float(2.0)),
        ]
        .into_iter()
        .collect();
        assert_eq!(a, b);
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }

    #[test]
    fn integer_and_float_are_distinct() {
        let int: ParameterCombination = vec![("x".to_string(), ParameterValue::Int(2))]
            .into_iter()
            .collect();
        let float: ParameterCombination = vec![("x".to_string(), ParameterValue::Float(2.0))]
            .into_iter()
            .collect();
        assert_ne!(int.fingerprint().unwrap(), float.fingerprint().unwrap());
    }

    #[test]
    fn float_display_keeps_fraction() {
        assert_eq!(ParameterValue::Float(2.0).to_string(), "2.0");
        assert_eq!(ParameterValue::Int(250).to_string(), "250");
    }
}
