//! Hierarchical settings: deep merge, dotted-path overrides and the resolved
//! shapes handed to flows.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::errors::{config_error, ErrorInfo, XedaError};

/// Ordered string-keyed mapping used for every settings section.
pub type Mapping = Map<String, Value>;

/// Right-biased recursive merge. Only mappings recurse; every other value
/// (lists included) in `patch` replaces the one in `base`.
pub fn deep_merge(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            merge_mappings(base_map, patch_map);
        }
        (base, patch) => *base = patch,
    }
}

/// [`deep_merge`] specialised to two mappings.
pub fn merge_mappings(base: &mut Mapping, patch: Mapping) {
    for (key, value) in patch {
        match base.get_mut(&key) {
            Some(existing) if existing.is_object() && value.is_object() => {
                deep_merge(existing, value);
            }
            _ => {
                base.insert(key, value);
            }
        }
    }
}

/// Infers a typed value from an override string: bool, integer, float,
/// bracketed list, or string.
pub fn infer_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(int) = trimmed.parse::<i64>() {
        return Value::Number(int.into());
    }
    if let Ok(float) = trimmed.parse::<f64>() {
        if let Some(number) = Number::from_f64(float) {
            return Value::Number(number);
        }
    }
    if let Some(inner) = trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
    {
        let items = inner
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|item| !item.is_empty())
            .map(infer_value)
            .collect();
        return Value::Array(items);
    }
    Value::String(strip_quotes(trimmed).to_string())
}

fn strip_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

/// Splits a comma separated override list; commas inside `[...]` are kept.
pub fn split_overrides(raw: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for ch in raw.chars() {
        match ch {
            '[' => {
                depth += 1;
                current.push(ch);
            }
            ']' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    parts.push(current);
    parts
        .into_iter()
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

/// Parses a single `a.b.c=value` override into its path and typed value.
pub fn parse_override(raw: &str) -> Result<(Vec<String>, Value), XedaError> {
    let (key, value) = raw.split_once('=').ok_or_else(|| {
        XedaError::Config(
            ErrorInfo::new("settings.override_syntax", "override is missing '='")
                .with_context("override", raw)
                .with_hint("use key.subkey=value"),
        )
    })?;
    let path: Vec<String> = key.trim().split('.').map(|s| s.trim().to_string()).collect();
    if path.iter().any(|segment| segment.is_empty()) {
        return Err(XedaError::Config(
            ErrorInfo::new("settings.override_path", "override key has an empty path segment")
                .with_context("override", raw),
        ));
    }
    Ok((path, infer_value(value)))
}

/// Builds the nested patch mapping described by one override.
pub fn override_patch(raw: &str) -> Result<Mapping, XedaError> {
    let (path, value) = parse_override(raw)?;
    let mut patch = value;
    for segment in path.iter().rev() {
        let mut level = Mapping::new();
        level.insert(segment.clone(), patch);
        patch = Value::Object(level);
    }
    match patch {
        Value::Object(map) => Ok(map),
        _ => Err(config_error("settings.override_path", "override key is empty")),
    }
}

/// Applies every override (each possibly comma separated) onto `target`.
pub fn apply_overrides<S: AsRef<str>>(target: &mut Mapping, overrides: &[S]) -> Result<(), XedaError> {
    for entry in overrides {
        for raw in split_overrides(entry.as_ref()) {
            let patch = override_patch(&raw)?;
            merge_mappings(target, patch);
        }
    }
    Ok(())
}

/// Looks up a dotted path inside a mapping.
pub fn get_dotted<'a>(mapping: &'a Mapping, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = mapping.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Sets a dotted path, creating (or replacing non-mapping) intermediate levels.
pub fn set_dotted(mapping: &mut Mapping, path: &str, value: Value) -> Result<(), XedaError> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(XedaError::Config(
            ErrorInfo::new("settings.dotted_path", "dotted path has an empty segment")
                .with_context("path", path),
        ));
    }
    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| config_error("settings.dotted_path", "dotted path is empty"))?;
    let mut current = mapping;
    for segment in parents {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Mapping::new()));
        if !entry.is_object() {
            *entry = Value::Object(Mapping::new());
        }
        current = match entry {
            Value::Object(map) => map,
            _ => unreachable!("entry was just replaced by a mapping"),
        };
    }
    current.insert(last.to_string(), value);
    Ok(())
}

/// Picks the active design when a project declares several.
///
/// A single mapping is returned as-is, a one-element list yields its only
/// entry, and longer lists require `name` to match one entry's `name`.
pub fn select_design(designs: &Value, name: Option<&str>) -> Result<Value, XedaError> {
    let list = match designs {
        Value::Array(list) => list,
        Value::Object(_) => return Ok(designs.clone()),
        other => {
            return Err(XedaError::Config(
                ErrorInfo::new("settings.design_type", "design must be a mapping or a list")
                    .with_context("found", value_kind(other)),
            ))
        }
    };
    if list.len() == 1 {
        return Ok(list[0].clone());
    }
    let available: Vec<String> = list
        .iter()
        .filter_map(|design| design.get("name").and_then(Value::as_str))
        .map(str::to_string)
        .collect();
    let Some(wanted) = name else {
        return Err(XedaError::Config(
            ErrorInfo::new(
                "settings.design_ambiguous",
                format!("{} designs are available in the project", list.len()),
            )
            .with_context("available", available.join(", "))
            .with_hint("select one with --design"),
        ));
    };
    list.iter()
        .find(|design| design.get("name").and_then(Value::as_str) == Some(wanted))
        .cloned()
        .ok_or_else(|| {
            XedaError::Config(
                ErrorInfo::new("settings.design_missing", "design not found in the project")
                    .with_context("design", wanted)
                    .with_context("available", available.join(", ")),
            )
        })
}

/// Short name of a JSON value's type, used in diagnostics.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

/// Fully resolved project settings. A `design` section is always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedSettings {
    /// Active design section.
    pub design: Mapping,
    /// Per-flow sections keyed by flow name.
    #[serde(default)]
    pub flows: Mapping,
}

impl ResolvedSettings {
    /// Validates and splits a merged settings tree.
    pub fn from_value(value: Value) -> Result<Self, XedaError> {
        let Value::Object(mut root) = value else {
            return Err(config_error("settings.root", "settings root must be a mapping"));
        };
        let design = match root.remove("design") {
            Some(Value::Object(design)) => design,
            Some(other) => {
                return Err(XedaError::Config(
                    ErrorInfo::new("settings.design_type", "design section must be a mapping")
                        .with_context("found", value_kind(&other)),
                ))
            }
            None => {
                return Err(config_error(
                    "settings.design_missing",
                    "no design section in the resolved settings",
                ))
            }
        };
        let flows = match root.remove("flows") {
            Some(Value::Object(flows)) => flows,
            Some(Value::Null) | None => Mapping::new(),
            Some(other) => {
                return Err(XedaError::Config(
                    ErrorInfo::new("settings.flows_type", "flows section must be a mapping")
                        .with_context("found", value_kind(&other)),
                ))
            }
        };
        Ok(Self { design, flows })
    }

    /// Name of the active design, if declared.
    pub fn design_name(&self) -> Option<&str> {
        self.design.get("name").and_then(Value::as_str)
    }

    /// Section for `flow`, if the project declares one.
    pub fn flow_section(&self, flow: &str) -> Option<&Mapping> {
        self.flows.get(flow).and_then(Value::as_object)
    }

    /// Mutable section for `flow`, created empty when missing.
    pub fn flow_section_mut(&mut self, flow: &str) -> &mut Mapping {
        let entry = self
            .flows
            .entry(flow.to_string())
            .or_insert_with(|| Value::Object(Mapping::new()));
        if !entry.is_object() {
            *entry = Value::Object(Mapping::new());
        }
        match entry {
            Value::Object(map) => map,
            _ => unreachable!("entry was just replaced by a mapping"),
        }
    }
}

/// Settings snapshot bound to one flow instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FlowSettings {
    /// Design section shared by every flow of the run.
    pub design: Mapping,
    /// Flow specific section (defaults, then project overrides).
    pub flow: Mapping,
    /// Sub-settings for each declared dependency, keyed by flow name.
    #[serde(default)]
    pub flow_depends: BTreeMap<String, Mapping>,
}

impl FlowSettings {
    /// Numeric flow setting; numeric strings are accepted.
    pub fn flow_f64(&self, key: &str) -> Option<f64> {
        self.flow.get(key).and_then(as_f64_lenient)
    }

    /// Non-negative integer flow setting.
    pub fn flow_usize(&self, key: &str) -> Option<usize> {
        self.flow_f64(key)
            .filter(|value| *value >= 0.0 && value.fract() == 0.0)
            .map(|value| value as usize)
    }

    /// String flow setting.
    pub fn flow_str(&self, key: &str) -> Option<&str> {
        self.flow.get(key).and_then(Value::as_str)
    }

    /// Name of the design these settings belong to.
    pub fn design_name(&self) -> Option<&str> {
        self.design.get("name").and_then(Value::as_str)
    }
}

/// Reads a number from a JSON number or a numeric string.
pub fn as_f64_lenient(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
