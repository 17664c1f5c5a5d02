//! The uniform capability set every flow kind implements.

use std::future::Future;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use xeda_core::settings::{as_f64_lenient, FlowSettings, Mapping};
use xeda_core::XedaError;

use crate::kind::{Dependency, RequiredSetting};

/// Parsed results of one flow execution.
///
/// Populated by [`Flow::parse_reports`]; empty until then. The `success`
/// key is always present once reports have been parsed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowResults(Mapping);

impl FlowResults {
    /// Empty result set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing mapping.
    pub fn from_mapping(mapping: Mapping) -> Self {
        Self(mapping)
    }

    /// Raw value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Numeric value stored under `key`; numeric strings are accepted.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(as_f64_lenient)
    }

    /// Inserts or replaces one entry.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Merges every entry of `other`, replacing existing keys.
    pub fn extend(&mut self, other: Mapping) {
        for (key, value) in other {
            self.0.insert(key, value);
        }
    }

    /// Whether the flow reported a passing result.
    pub fn success(&self) -> bool {
        self.0
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Worst negative slack in nanoseconds, if reported.
    pub fn wns(&self) -> Option<f64> {
        self.get_f64("wns")
    }

    /// Borrowed view of the underlying mapping.
    pub fn as_mapping(&self) -> &Mapping {
        &self.0
    }

    /// True when nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One external tool invocation bound to its settings and run directory.
///
/// A flow instance is owned by exactly one executor for its whole lifetime;
/// the worker pool moves it into the task that runs it.
pub trait Flow: Send + 'static {
    /// Flow name used for logs, run directories and artefact names.
    fn name(&self) -> &str;

    /// Directory the flow executes in.
    fn run_dir(&self) -> &Path;

    /// Settings snapshot the flow was instantiated with.
    fn settings(&self) -> &FlowSettings;

    /// Flows that must have produced their artefacts before this one runs.
    fn depends_on(&self) -> Vec<Dependency> {
        Vec::new()
    }

    /// Settings that must be present, with their expected type.
    fn required_settings(&self) -> Vec<RequiredSetting> {
        Vec::new()
    }

    /// Executes the underlying tool.
    ///
    /// Fails with [`XedaError::ToolExecution`] when the tool exits with a
    /// non-zero status and [`XedaError::FlowFatal`] on internal errors.
    fn run(&mut self) -> impl Future<Output = Result<(), XedaError>> + Send;

    /// Populates [`Flow::results`] from the tool's reports.
    fn parse_reports(&mut self) -> Result<(), XedaError>;

    /// Results recorded by [`Flow::parse_reports`].
    fn results(&self) -> &FlowResults;
}
