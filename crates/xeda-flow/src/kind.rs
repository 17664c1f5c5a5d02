//! Closed registry of supported flow kinds.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use xeda_core::errors::{ErrorInfo, XedaError};
use xeda_core::serde::from_json_slice;
use xeda_core::settings::{value_kind, FlowSettings, Mapping};

use crate::flow::FlowResults;

const EMBEDDED_DEFAULTS: &str = include_str!("defaults.json");

/// Built-in settings tree merged underneath every project.
pub fn embedded_defaults() -> Result<Value, XedaError> {
    from_json_slice(EMBEDDED_DEFAULTS.as_bytes())
}

/// Supported flow kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    /// Synthesis and implementation; reports timing.
    Synth,
    /// RTL simulation.
    Sim,
    /// Simulation of the synthesized netlist.
    PostSynthSim,
}

impl FlowKind {
    /// Every supported kind, in listing order.
    pub const ALL: [FlowKind; 3] = [FlowKind::Synth, FlowKind::Sim, FlowKind::PostSynthSim];

    /// Registry name of the kind.
    pub fn name(self) -> &'static str {
        match self {
            FlowKind::Synth => "synth",
            FlowKind::Sim => "sim",
            FlowKind::PostSynthSim => "post_synth_sim",
        }
    }

    /// Resolves a registry name, failing with [`XedaError::UnknownFlow`].
    pub fn from_name(name: &str) -> Result<Self, XedaError> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| {
                let supported: Vec<&str> = Self::ALL.iter().map(|kind| kind.name()).collect();
                XedaError::UnknownFlow(
                    ErrorInfo::new("flow.unknown", "flow is not a supported kind")
                        .with_context("flow", name)
                        .with_context("supported", supported.join(", ")),
                )
            })
    }

    /// Descriptor with defaults, dependencies and required settings.
    pub fn descriptor(self) -> Result<FlowDescriptor, XedaError> {
        let defaults = embedded_defaults()?
            .get("flows")
            .and_then(|flows| flows.get(self.name()))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let (depends_on, required) = match self {
            FlowKind::Synth => (
                Vec::new(),
                vec![RequiredSetting::new("clock_period", SettingType::Number)],
            ),
            FlowKind::Sim => (Vec::new(), Vec::new()),
            FlowKind::PostSynthSim => (
                vec![Dependency::new(
                    FlowKind::Synth,
                    json!({"rtl.sources": ["results/netlist_timesim.v"]}),
                )],
                Vec::new(),
            ),
        };
        Ok(FlowDescriptor {
            kind: self,
            defaults,
            depends_on,
            required,
        })
    }

    /// Decides whether a finished run passed.
    pub fn evaluate_success(self, settings: &FlowSettings, results: &FlowResults) -> bool {
        if results.get("success").and_then(Value::as_bool) == Some(false) {
            return false;
        }
        match self {
            FlowKind::Synth => synth_timing_met(settings, results),
            FlowKind::Sim | FlowKind::PostSynthSim => true,
        }
    }
}

fn synth_timing_met(settings: &FlowSettings, results: &FlowResults) -> bool {
    match results.wns() {
        Some(wns) if wns >= 0.0 => {}
        _ => return false,
    }
    if results.get_f64("whs").is_some_and(|whs| whs < 0.0) {
        return false;
    }
    if results
        .get_f64("failing_endpoints")
        .is_some_and(|count| count != 0.0)
    {
        return false;
    }
    let forbidden = settings
        .flow
        .get("forbidden_resources")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    forbidden
        .iter()
        .filter_map(Value::as_str)
        .all(|resource| results.get_f64(resource).unwrap_or(0.0) == 0.0)
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FlowKind {
    type Err = XedaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

/// Static description of a flow kind.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowDescriptor {
    /// Kind described.
    pub kind: FlowKind,
    /// Default flow settings.
    pub defaults: Mapping,
    /// Declared one-hop dependencies.
    pub depends_on: Vec<Dependency>,
    /// Settings that must be present after resolution.
    pub required: Vec<RequiredSetting>,
}

impl FlowDescriptor {
    /// Checks the required settings against a resolved flow section.
    pub fn validate(&self, flow: &Mapping) -> Result<(), XedaError> {
        for required in &self.required {
            match flow.get(&required.key) {
                None => {
                    return Err(XedaError::Config(
                        ErrorInfo::new("flow.required_setting", "required flow setting is missing")
                            .with_context("flow", self.kind.name())
                            .with_context("setting", required.key.as_str())
                            .with_hint(format!(
                                "set it with --flow-override {}=<{}>",
                                required.key,
                                required.ty.name()
                            )),
                    ))
                }
                Some(value) if !required.ty.matches(value) => {
                    return Err(XedaError::Config(
                        ErrorInfo::new("flow.setting_type", "flow setting has the wrong type")
                            .with_context("flow", self.kind.name())
                            .with_context("setting", required.key.as_str())
                            .with_context("expected", required.ty.name())
                            .with_context("found", value_kind(value)),
                    ))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// A declared dependency on another flow kind.
///
/// Override entries whose value is a list of strings name artefacts the
/// dependency produces, relative to its run directory. The dotted key is the
/// design setting that is rewritten to point at them.
#[derive(Debug, Clone, PartialEq)]
pub struct Dependency {
    /// Kind that must run first.
    pub kind: FlowKind,
    /// Settings overrides applied to the dependency.
    pub overrides: Mapping,
}

impl Dependency {
    /// Creates a dependency from an override literal; non-mapping literals
    /// yield an empty override set.
    pub fn new(kind: FlowKind, overrides: Value) -> Self {
        let overrides = match overrides {
            Value::Object(map) => map,
            _ => Mapping::new(),
        };
        Self { kind, overrides }
    }

    /// `(design key, artefact paths)` pairs declared by the overrides.
    pub fn artifact_lists(&self) -> Vec<(String, Vec<String>)> {
        self.overrides
            .iter()
            .filter_map(|(key, value)| {
                let paths = value
                    .as_array()?
                    .iter()
                    .map(|item| item.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()?;
                Some((key.clone(), paths))
            })
            .collect()
    }

    /// Expected artefact paths under `run_dir`.
    pub fn expected_artifacts(&self, run_dir: &Path) -> Vec<PathBuf> {
        self.artifact_lists()
            .into_iter()
            .flat_map(|(_, paths)| paths)
            .map(|path| run_dir.join(path))
            .collect()
    }
}

/// Expected type of a required setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingType {
    /// Integer or float.
    Number,
    /// String.
    Text,
    /// Boolean.
    Bool,
    /// List.
    List,
}

impl SettingType {
    /// Name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            SettingType::Number => "number",
            SettingType::Text => "string",
            SettingType::Bool => "bool",
            SettingType::List => "list",
        }
    }

    /// Whether `value` has this type.
    pub fn matches(self, value: &Value) -> bool {
        match self {
            SettingType::Number => value.is_number(),
            SettingType::Text => value.is_string(),
            SettingType::Bool => value.is_boolean(),
            SettingType::List => value.is_array(),
        }
    }
}

/// A required setting with its expected type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredSetting {
    /// Key inside the flow section.
    pub key: String,
    /// Expected type.
    pub ty: SettingType,
}

impl RequiredSetting {
    /// Creates a requirement.
    pub fn new(key: impl Into<String>, ty: SettingType) -> Self {
        Self {
            key: key.into(),
            ty,
        }
    }
}
