//! Flow Runner: settings resolution, instantiation and dependency execution.

use std::path::PathBuf;

use serde_json::Value;
use tracing::{info, warn};
use xeda_core::errors::{ErrorInfo, XedaError};
use xeda_core::hash::stable_hash_string;
use xeda_core::settings::{
    apply_overrides, deep_merge, merge_mappings, select_design, set_dotted, FlowSettings, Mapping,
    ResolvedSettings,
};

use crate::flow::{Flow, FlowResults};
use crate::kind::{embedded_defaults, Dependency, FlowKind};
use crate::report::format_results;
use crate::tool::ToolFlow;

/// Inputs to [`FlowRunner::resolve_settings`] beyond the project file.
#[derive(Debug, Clone, Default)]
pub struct SettingsRequest {
    /// Design to select when the project declares several.
    pub design: Option<String>,
    /// Global dotted-path overrides.
    pub overrides: Vec<String>,
    /// Flow receiving `flow_overrides`.
    pub flow: Option<String>,
    /// Overrides applied under `flows.<flow>`.
    pub flow_overrides: Vec<String>,
}

/// Runner-wide knobs.
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Root under which every run directory is created.
    pub runs_root: PathBuf,
    /// Upper bound on any single flow's thread budget.
    pub max_threads: usize,
    /// Give every instance its own hash-suffixed run directory.
    pub parallel_runs: bool,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            runs_root: PathBuf::from("xeda_run"),
            max_threads: 4,
            parallel_runs: false,
        }
    }
}

/// Outcome of resolving one declared dependency.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyReport {
    /// Dependency kind.
    pub flow: FlowKind,
    /// True when every expected artefact already existed.
    pub cached: bool,
    /// Artefact paths the dependent flow now references.
    pub artifacts: Vec<PathBuf>,
}

/// Owns settings resolution and flow instantiation.
#[derive(Debug, Clone)]
pub struct FlowRunner {
    settings: ResolvedSettings,
    options: RunnerOptions,
}

impl FlowRunner {
    /// Merges built-in defaults, the project's design and flow sections and
    /// the request's overrides.
    pub fn resolve_settings(
        project: &Value,
        request: &SettingsRequest,
    ) -> Result<ResolvedSettings, XedaError> {
        let mut merged = embedded_defaults()?;
        let project = project.as_object().ok_or_else(|| {
            XedaError::Config(ErrorInfo::new(
                "settings.project_root",
                "project settings must be a mapping",
            ))
        })?;

        let mut patch = Mapping::new();
        if let Some(designs) = project.get("design").or_else(|| project.get("designs")) {
            let design = select_design(designs, request.design.as_deref())?;
            patch.insert("design".into(), design);
        }
        if let Some(flows) = project.get("flows") {
            patch.insert("flows".into(), flows.clone());
        }
        deep_merge(&mut merged, Value::Object(patch));

        if let Value::Object(root) = &mut merged {
            apply_overrides(root, &request.overrides)?;
        }
        let mut resolved = ResolvedSettings::from_value(merged)?;
        if let Some(flow) = &request.flow {
            apply_overrides(resolved.flow_section_mut(flow), &request.flow_overrides)?;
        } else if !request.flow_overrides.is_empty() {
            return Err(XedaError::Config(
                ErrorInfo::new("settings.flow_override_target", "flow overrides need a flow")
                    .with_hint("name the flow the overrides apply to"),
            ));
        }
        Ok(resolved)
    }

    /// Creates a runner over already resolved settings.
    pub fn new(settings: ResolvedSettings, options: RunnerOptions) -> Self {
        Self { settings, options }
    }

    /// Resolved settings.
    pub fn settings(&self) -> &ResolvedSettings {
        &self.settings
    }

    /// Runner options.
    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    /// Switches hash-suffixed run directories on or off.
    pub fn set_parallel_runs(&mut self, parallel: bool) {
        self.options.parallel_runs = parallel;
    }

    /// Instantiates the flow registered under `name`.
    pub fn instantiate(&self, name: &str) -> Result<ToolFlow, XedaError> {
        let kind = FlowKind::from_name(name)?;
        self.instantiate_with(kind, &self.settings)
    }

    /// Instantiates `kind` against an explicit settings snapshot.
    ///
    /// The snapshot is deep-copied; later changes to `settings` or to the
    /// returned flow do not affect one another.
    pub fn instantiate_with(
        &self,
        kind: FlowKind,
        settings: &ResolvedSettings,
    ) -> Result<ToolFlow, XedaError> {
        self.build(kind, settings, self.options.parallel_runs)
    }

    fn build(
        &self,
        kind: FlowKind,
        settings: &ResolvedSettings,
        parallel: bool,
    ) -> Result<ToolFlow, XedaError> {
        let descriptor = kind.descriptor()?;
        let mut flow = descriptor.defaults.clone();
        if let Some(section) = settings.flow_section(kind.name()) {
            merge_mappings(&mut flow, section.clone());
        }
        let requested = flow
            .get("nthreads")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(1);
        let nthreads = requested.min(self.options.max_threads).max(1);
        flow.insert("nthreads".into(), Value::from(nthreads));
        descriptor.validate(&flow)?;

        let mut flow_depends = std::collections::BTreeMap::new();
        for dependency in &descriptor.depends_on {
            flow_depends.insert(
                dependency.kind.name().to_string(),
                dependency_settings(dependency, settings)?,
            );
        }

        let flow_settings = FlowSettings {
            design: settings.design.clone(),
            flow,
            flow_depends,
        };
        let run_hash = stable_hash_string(&flow_settings)?;
        let run_dir = if parallel {
            self.options
                .runs_root
                .join(format!("{}_{}", kind.name(), &run_hash[..8]))
        } else {
            self.serial_run_dir(kind)
        };
        Ok(ToolFlow::new(kind, flow_settings, run_dir, run_hash))
    }

    /// Default single-flow path: dependencies, run, then post-run handling.
    pub async fn launch(&self, name: &str) -> Result<FlowResults, XedaError> {
        let mut flow = self.instantiate(name)?;
        self.run_dependencies(&mut flow).await?;
        info!(flow = flow.name(), run_dir = %flow.run_dir().display(), "running flow");
        flow.run().await?;
        self.post_run(&mut flow)?;
        Ok(flow.results().clone())
    }

    /// Ensures every declared dependency's artefacts exist, running the
    /// dependency when they do not, and points `flow` at them.
    pub async fn run_dependencies(
        &self,
        flow: &mut ToolFlow,
    ) -> Result<Vec<DependencyReport>, XedaError> {
        let mut reports = Vec::new();
        for dependency in flow.depends_on() {
            let dep_name = dependency.kind.name();
            let dep_dir = self.serial_run_dir(dependency.kind);
            let expected = dependency.expected_artifacts(&dep_dir);
            let cached = expected.iter().all(|path| path.exists());

            if cached {
                info!(flow = flow.name(), dependency = dep_name, "dependency artefacts present, skipping run");
            } else {
                let mut dep_settings = self.settings.clone();
                if let Some(section) = flow.settings().flow_depends.get(dep_name) {
                    dep_settings
                        .flows
                        .insert(dep_name.to_string(), Value::Object(section.clone()));
                }
                let mut dep_flow = self.build(dependency.kind, &dep_settings, false)?;
                info!(flow = flow.name(), dependency = dep_name, "running dependency");
                dep_flow
                    .run()
                    .await
                    .map_err(|err| dependency_failed(flow.name(), dep_name, err.to_string()))?;
                self.post_run(&mut dep_flow)
                    .map_err(|err| dependency_failed(flow.name(), dep_name, err.to_string()))?;
                if !dep_flow.results().success() {
                    return Err(dependency_failed(
                        flow.name(),
                        dep_name,
                        "dependency did not report success",
                    ));
                }
                if let Some(missing) = expected.iter().find(|path| !path.exists()) {
                    return Err(dependency_failed(
                        flow.name(),
                        dep_name,
                        format!("expected artefact {} was not produced", missing.display()),
                    ));
                }
            }

            for (key, paths) in dependency.artifact_lists() {
                let rewritten: Vec<Value> = paths
                    .iter()
                    .map(|path| Value::String(dep_dir.join(path).display().to_string()))
                    .collect();
                set_dotted(&mut flow.settings_mut().design, &key, Value::Array(rewritten))?;
            }
            reports.push(DependencyReport {
                flow: dependency.kind,
                cached,
                artifacts: expected,
            });
        }
        Ok(reports)
    }

    /// Parses reports, logs the results table and dumps the results file.
    pub fn post_run(&self, flow: &mut ToolFlow) -> Result<(), XedaError> {
        flow.parse_reports()?;
        let title = format!("{} results", flow.name());
        info!("\n{}", format_results(flow.results(), Some(&title), None));
        if !flow.results().success() {
            warn!(flow = flow.name(), "flow did not report success");
        }
        let path = flow.dump_results()?;
        info!(flow = flow.name(), path = %path.display(), "results written");
        Ok(())
    }

    /// Directory a serial run of `kind` uses. Dependency artefacts are
    /// looked up here.
    pub fn serial_run_dir(&self, kind: FlowKind) -> PathBuf {
        self.options.runs_root.join(kind.name())
    }
}

fn dependency_settings(
    dependency: &Dependency,
    settings: &ResolvedSettings,
) -> Result<Mapping, XedaError> {
    let mut section = dependency.kind.descriptor()?.defaults;
    if let Some(project) = settings.flow_section(dependency.kind.name()) {
        merge_mappings(&mut section, project.clone());
    }
    for (key, value) in &dependency.overrides {
        set_dotted(&mut section, key, value.clone())?;
    }
    Ok(section)
}

fn dependency_failed(flow: &str, dependency: &str, message: impl Into<String>) -> XedaError {
    XedaError::DependencyFailed(
        ErrorInfo::new("runner.dependency_failed", message)
            .with_context("flow", flow)
            .with_context("dependency", dependency),
    )
}
