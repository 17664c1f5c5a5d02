//! Provenance and schema descriptors attached to persisted artefacts.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

/// Semantic version describing the schema of serialized payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaVersion {
    /// Major version incremented for breaking changes.
    pub major: u32,
    /// Minor version incremented for additive changes.
    pub minor: u32,
    /// Patch version incremented for bug fixes and documentation updates.
    pub patch: u32,
}

impl SchemaVersion {
    /// Creates a new schema version descriptor.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::new(1, 0, 0)
    }
}

/// Provenance information attached to every persisted artefact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RunProvenance {
    /// Schema of the artefact the provenance is attached to.
    pub schema_version: SchemaVersion,
    /// Stable hash of the resolved settings the run started from.
    pub settings_hash: String,
    /// Seed of the RNG that drove search jitter.
    pub seed: u64,
    /// RFC 3339 timestamp recording when the artefact was generated.
    pub created_at: String,
    /// Version of the orchestrator that produced the artefact.
    pub tool_version: String,
}

impl RunProvenance {
    /// Provenance stamped with the current time.
    pub fn now(settings_hash: impl Into<String>, seed: u64) -> Self {
        Self {
            schema_version: SchemaVersion::default(),
            settings_hash: settings_hash.into(),
            seed,
            created_at: Utc::now().to_rfc3339(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Run timestamp used in directory and artefact names (`YYYY-MM-DD-HHMMSS`).
pub fn run_timestamp() -> String {
    format_run_timestamp(Local::now())
}

/// Formats a timestamp the way [`run_timestamp`] does.
pub fn format_run_timestamp(at: DateTime<Local>) -> String {
    at.format("%Y-%m-%d-%H%M%S").to_string()
}
