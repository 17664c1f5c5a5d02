//! Project file loading.

use std::fs;
use std::path::Path;

use serde_json::Value;
use xeda_core::serde::{from_json_slice, from_toml_str, from_yaml_slice};
use xeda_core::{ErrorInfo, XedaError};

/// Reads a project file into a settings tree, choosing the format by
/// extension (`.toml`, `.json`, `.yaml`, `.yml`).
pub fn load_project(path: &Path) -> Result<Value, XedaError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if !matches!(extension.as_str(), "toml" | "json" | "yaml" | "yml") {
        return Err(XedaError::Config(
            ErrorInfo::new("project.format", "unsupported project file format")
                .with_context("path", path.display().to_string())
                .with_hint("use a .toml, .json, .yaml or .yml project file"),
        ));
    }
    let data = fs::read(path).map_err(|err| {
        XedaError::Io(
            ErrorInfo::new("project.read", err.to_string())
                .with_context("path", path.display().to_string())
                .with_hint("pass --project or create xeda.toml in the working directory"),
        )
    })?;
    match extension.as_str() {
        "toml" => {
            let text = String::from_utf8(data).map_err(|err| {
                XedaError::Serde(ErrorInfo::new("project.encoding", err.to_string()))
            })?;
            from_toml_str(&text)
        }
        "json" => from_json_slice(&data),
        _ => from_yaml_slice(&data),
    }
}
