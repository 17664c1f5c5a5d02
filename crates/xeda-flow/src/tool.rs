//! `ToolFlow`: runs the configured external tool for any flow kind.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, warn};
use xeda_core::errors::{io_error, ErrorInfo, XedaError};
use xeda_core::provenance::run_timestamp;
use xeda_core::serde::{from_json_slice, to_pretty_json_bytes};
use xeda_core::settings::FlowSettings;

use crate::flow::{Flow, FlowResults};
use crate::kind::{Dependency, FlowKind, RequiredSetting};

/// Results file read when the flow does not configure `results_file`.
pub const DEFAULT_RESULTS_FILE: &str = "results.json";

/// Flow backed by an external executable.
///
/// The tool receives its resolved settings in `settings.json` (path in
/// `XEDA_SETTINGS`) and is expected to leave a JSON results file in the run
/// directory.
#[derive(Debug, Clone)]
pub struct ToolFlow {
    kind: FlowKind,
    settings: FlowSettings,
    run_dir: PathBuf,
    run_hash: String,
    results: FlowResults,
}

impl ToolFlow {
    /// Binds a kind to its resolved settings and run directory.
    pub fn new(
        kind: FlowKind,
        settings: FlowSettings,
        run_dir: PathBuf,
        run_hash: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            settings,
            run_dir,
            run_hash: run_hash.into(),
            results: FlowResults::new(),
        }
    }

    /// Kind of this flow.
    pub fn kind(&self) -> FlowKind {
        self.kind
    }

    /// Mutable settings, used to point at dependency artefacts.
    pub fn settings_mut(&mut self) -> &mut FlowSettings {
        &mut self.settings
    }

    /// Stable hash of the settings the flow was instantiated with.
    pub fn run_hash(&self) -> &str {
        &self.run_hash
    }

    /// Thread budget granted to the tool.
    pub fn nthreads(&self) -> usize {
        self.settings.flow_usize("nthreads").unwrap_or(1)
    }

    /// Writes the results to `<run_dir>/<flow>_results.json`.
    pub fn dump_results(&self) -> Result<PathBuf, XedaError> {
        let path = self.run_dir.join(format!("{}_results.json", self.name()));
        let bytes = to_pretty_json_bytes(&self.results)?;
        std::fs::write(&path, bytes).map_err(|err| io_error("flow.results_write", err))?;
        Ok(path)
    }

    fn results_path(&self) -> PathBuf {
        let file = self
            .settings
            .flow_str("results_file")
            .unwrap_or(DEFAULT_RESULTS_FILE);
        self.run_dir.join(file)
    }

    fn expand_args(&self, run_dir: &Path, settings_path: &Path) -> Vec<String> {
        let mut substitutions: Vec<(String, String)> = self
            .settings
            .flow
            .iter()
            .filter_map(|(key, value)| scalar_text(value).map(|text| (key.clone(), text)))
            .collect();
        substitutions.push(("run_dir".into(), run_dir.display().to_string()));
        substitutions.push(("settings".into(), settings_path.display().to_string()));
        substitutions.push(("nthreads".into(), self.nthreads().to_string()));
        substitutions.push(("flow".into(), self.name().to_string()));
        if let Some(design) = self.settings.design_name() {
            substitutions.push(("design".into(), design.to_string()));
        }

        let args = self
            .settings
            .flow
            .get("args")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        args.iter()
            .filter_map(scalar_text)
            .map(|arg| {
                substitutions
                    .iter()
                    .fold(arg, |acc, (key, value)| acc.replace(&format!("{{{key}}}"), value))
            })
            .collect()
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn tool_error(flow: &str, message: impl Into<String>) -> ErrorInfo {
    ErrorInfo::new("flow.tool_execution", message).with_context("flow", flow)
}

impl Flow for ToolFlow {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    fn settings(&self) -> &FlowSettings {
        &self.settings
    }

    fn depends_on(&self) -> Vec<Dependency> {
        self.kind
            .descriptor()
            .map(|descriptor| descriptor.depends_on)
            .unwrap_or_default()
    }

    fn required_settings(&self) -> Vec<RequiredSetting> {
        self.kind
            .descriptor()
            .map(|descriptor| descriptor.required)
            .unwrap_or_default()
    }

    async fn run(&mut self) -> Result<(), XedaError> {
        let tool = self
            .settings
            .flow_str("tool")
            .ok_or_else(|| {
                XedaError::FlowFatal(
                    ErrorInfo::new("flow.tool_missing", "no tool configured for flow")
                        .with_context("flow", self.name())
                        .with_hint(format!("set flows.{}.tool in the project file", self.name())),
                )
            })?
            .to_string();

        tokio::fs::create_dir_all(&self.run_dir)
            .await
            .map_err(|err| io_error("flow.run_dir", err))?;
        let run_dir = tokio::fs::canonicalize(&self.run_dir)
            .await
            .map_err(|err| io_error("flow.run_dir", err))?;
        let settings_path = run_dir.join("settings.json");
        tokio::fs::write(&settings_path, to_pretty_json_bytes(&self.settings)?)
            .await
            .map_err(|err| io_error("flow.settings_write", err))?;

        let log_path = run_dir.join(format!("{}_stdout.log", self.name()));
        let stdout = File::create(&log_path).map_err(|err| io_error("flow.log_create", err))?;
        let stderr = stdout
            .try_clone()
            .map_err(|err| io_error("flow.log_create", err))?;

        let args = self.expand_args(&run_dir, &settings_path);
        debug!(flow = self.name(), tool = %tool, ?args, run_dir = %run_dir.display(), "spawning tool");

        let status = Command::new(&tool)
            .args(&args)
            .current_dir(&run_dir)
            .env("XEDA_SETTINGS", &settings_path)
            .env("XEDA_RUN_DIR", &run_dir)
            .env("XEDA_NTHREADS", self.nthreads().to_string())
            .env("XEDA_FLOW", self.name())
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|err| {
                XedaError::ToolExecution(
                    tool_error(self.name(), format!("failed to spawn tool: {err}"))
                        .with_context("tool", tool.as_str()),
                )
            })?;

        if !status.success() {
            let exit = status
                .code()
                .map(|code| code.to_string())
                .unwrap_or_else(|| "terminated by signal".to_string());
            return Err(XedaError::ToolExecution(
                tool_error(self.name(), "tool exited unsuccessfully")
                    .with_context("tool", tool.as_str())
                    .with_context("exit", exit)
                    .with_context("log", log_path.display().to_string()),
            ));
        }
        Ok(())
    }

    fn parse_reports(&mut self) -> Result<(), XedaError> {
        let path = self.results_path();
        match std::fs::read(&path) {
            Ok(bytes) => match from_json_slice::<Value>(&bytes)? {
                Value::Object(reported) => self.results.extend(reported),
                _ => {
                    return Err(XedaError::FlowFatal(
                        ErrorInfo::new("flow.results_shape", "results file is not a JSON object")
                            .with_context("flow", self.name())
                            .with_context("path", path.display().to_string()),
                    ))
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                if self.kind == FlowKind::Synth {
                    warn!(flow = self.name(), path = %path.display(), "no results file written");
                }
            }
            Err(err) => return Err(io_error("flow.results_read", err)),
        }

        if self.kind == FlowKind::Synth && self.results.get("clock_frequency").is_none() {
            if let Some(period) = self.settings.flow_f64("clock_period").filter(|p| *p > 0.0) {
                self.results.insert("clock_frequency", 1000.0 / period);
            }
        }
        let success = self.kind.evaluate_success(&self.settings, &self.results);
        self.results.insert("success", success);
        self.results.insert("timestamp", run_timestamp());
        if let Some(design) = self.settings.design_name() {
            self.results.insert("design.name", design.to_string());
        }
        self.results.insert("flow.name", self.name().to_string());
        self.results.insert("flow.run_hash", self.run_hash.clone());
        Ok(())
    }

    fn results(&self) -> &FlowResults {
        &self.results
    }
}
