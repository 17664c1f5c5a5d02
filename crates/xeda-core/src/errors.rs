//! Structured error types shared across xeda crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`XedaError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (flow names, paths, exit codes, etc.).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical error type for the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum XedaError {
    /// Bad or missing settings; aborts before any flow runs.
    #[error("config error: {0}")]
    Config(ErrorInfo),
    /// A flow name that does not resolve to a supported flow kind.
    #[error("unknown flow: {0}")]
    UnknownFlow(ErrorInfo),
    /// A declared dependency could not produce its artefacts.
    #[error("dependency failed: {0}")]
    DependencyFailed(ErrorInfo),
    /// The external tool exited unsuccessfully or could not be spawned.
    #[error("tool execution error: {0}")]
    ToolExecution(ErrorInfo),
    /// Unrecoverable error inside a flow.
    #[error("flow fatal error: {0}")]
    FlowFatal(ErrorInfo),
    /// Worker pool lifecycle errors.
    #[error("pool error: {0}")]
    Pool(ErrorInfo),
    /// Frequency search errors.
    #[error("search error: {0}")]
    Search(ErrorInfo),
    /// Serialization and schema errors.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
    /// Filesystem errors.
    #[error("io error: {0}")]
    Io(ErrorInfo),
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        let mut entries = self.context.iter();
        if let Some((key, value)) = entries.next() {
            write!(f, " ({key}={value}")?;
            for (key, value) in entries {
                write!(f, ", {key}={value}")?;
            }
            f.write_str(")")?;
        }
        match &self.hint {
            Some(hint) => write!(f, "; hint: {hint}"),
            None => Ok(()),
        }
    }
}

impl XedaError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            XedaError::Config(info)
            | XedaError::UnknownFlow(info)
            | XedaError::DependencyFailed(info)
            | XedaError::ToolExecution(info)
            | XedaError::FlowFatal(info)
            | XedaError::Pool(info)
            | XedaError::Search(info)
            | XedaError::Serde(info)
            | XedaError::Io(info) => info,
        }
    }

    /// True for failures that abort a whole run rather than a single trial.
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            XedaError::Config(_) | XedaError::UnknownFlow(_) | XedaError::DependencyFailed(_)
        )
    }
}

/// Wraps an I/O failure under the given code.
pub fn io_error(code: &str, err: impl ToString) -> XedaError {
    XedaError::Io(ErrorInfo::new(code, err.to_string()))
}

/// Shorthand for a configuration error.
pub fn config_error(code: &str, message: impl Into<String>) -> XedaError {
    XedaError::Config(ErrorInfo::new(code, message))
}
