//! JSON, YAML and TOML helpers with canonical key ordering.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::errors::{ErrorInfo, XedaError};

fn serde_error(code: &str, err: impl ToString) -> XedaError {
    XedaError::Serde(ErrorInfo::new(code, err.to_string()))
}

fn sort_keys(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = std::mem::take(map).into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            for (key, mut child) in entries {
                sort_keys(&mut child);
                map.insert(key, child);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(sort_keys),
        _ => {}
    }
}

/// Serializes a value into canonical JSON bytes with sorted keys.
///
/// Settings keep insertion order in memory, so anything that is hashed must
/// go through this function rather than `serde_json::to_vec`.
pub fn to_canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, XedaError> {
    let mut value =
        serde_json::to_value(value).map_err(|err| serde_error("json_serialize", err))?;
    sort_keys(&mut value);
    serde_json::to_vec(&value).map_err(|err| serde_error("json_write", err))
}

/// Serializes a value into indented JSON for human consumption.
pub fn to_pretty_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, XedaError> {
    serde_json::to_vec_pretty(value).map_err(|err| serde_error("json_serialize", err))
}

/// Deserializes a value from JSON bytes.
pub fn from_json_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T, XedaError> {
    serde_json::from_slice(data).map_err(|err| serde_error("json_deserialize", err))
}

/// Deserializes a YAML payload into the requested type.
pub fn from_yaml_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T, XedaError> {
    serde_yaml::from_slice(data).map_err(|err| serde_error("yaml_deserialize", err))
}

/// Deserializes a TOML document into the requested type.
pub fn from_toml_str<T: DeserializeOwned>(data: &str) -> Result<T, XedaError> {
    toml::from_str(data).map_err(|err| serde_error("toml_deserialize", err))
}
