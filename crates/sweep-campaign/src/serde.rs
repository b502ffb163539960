//! JSON and YAML encoding used for records, metadata and configs.
//!
//! Records are written as canonical JSON: object keys sorted at every depth,
//! no insignificant whitespace. Two equal values always encode to the same
//! bytes, which keeps store files diffable and fingerprints stable.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use sweep_core::errors::{ErrorInfo, SweepError};

fn encode_error(code: &str, err: impl ToString) -> SweepError {
    SweepError::Serde(ErrorInfo::new(code, err.to_string()))
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, sort_keys(value)))
                    .collect::<Map<_, _>>(),
            )
        }
        Value::Array(values) => Value::Array(values.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

fn canonical_value<T: Serialize>(value: &T) -> Result<Value, SweepError> {
    serde_json::to_value(value)
        .map(sort_keys)
        .map_err(|err| encode_error("json-encode", err))
}

/// Canonical single-line JSON bytes.
pub fn to_canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, SweepError> {
    serde_json::to_vec(&canonical_value(value)?).map_err(|err| encode_error("json-encode", err))
}

/// Canonical JSON terminated by a newline, ready to append to a JSON-lines file.
pub fn to_json_line<T: Serialize>(value: &T) -> Result<Vec<u8>, SweepError> {
    let mut line = to_canonical_json_bytes(value)?;
    line.push(b'\n');
    Ok(line)
}

/// Sorted, indented JSON for files people read.
pub fn to_pretty_json_string<T: Serialize>(value: &T) -> Result<String, SweepError> {
    serde_json::to_string_pretty(&canonical_value(value)?)
        .map_err(|err| encode_error("json-encode", err))
}

/// Decodes JSON; the error carries the line and column of the fault.
pub fn from_json_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T, SweepError> {
    serde_json::from_slice(data).map_err(|err| {
        SweepError::Serde(
            ErrorInfo::new("json-decode", err.to_string())
                .with_context("line", err.line().to_string())
                .with_context("column", err.column().to_string()),
        )
    })
}

/// YAML text of `value`.
pub fn to_yaml_string<T: Serialize>(value: &T) -> Result<String, SweepError> {
    serde_yaml::to_string(value).map_err(|err| encode_error("yaml-encode", err))
}

/// Decodes YAML; the error carries the fault location when known.
pub fn from_yaml_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T, SweepError> {
    serde_yaml::from_slice(data).map_err(|err| {
        let mut info = ErrorInfo::new("yaml-decode", err.to_string());
        if let Some(location) = err.location() {
            info = info
                .with_context("line", location.line().to_string())
                .with_context("column", location.column().to_string());
        }
        SweepError::Serde(info)
    })
}
