#![deny(missing_docs)]
#![doc = "Flow contract, flow kinds and the dependency-aware Flow Runner."]

pub mod flow;
pub mod kind;
pub mod report;
pub mod runner;
pub mod tool;

pub use flow::{Flow, FlowResults};
pub use kind::{Dependency, FlowDescriptor, FlowKind, RequiredSetting, SettingType};
pub use report::format_results;
pub use runner::{DependencyReport, FlowRunner, RunnerOptions, SettingsRequest};
pub use tool::{ToolFlow, DEFAULT_RESULTS_FILE};
