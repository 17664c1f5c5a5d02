#![deny(missing_docs)]
#![doc = "Settings model, error taxonomy and shared helpers for the xeda flow orchestrator."]

pub mod errors;
pub mod hash;
pub mod provenance;
pub mod rng;
pub mod serde;
pub mod settings;

pub use errors::{config_error, io_error, ErrorInfo, XedaError};
pub use hash::stable_hash_string;
pub use provenance::{format_run_timestamp, run_timestamp, RunProvenance, SchemaVersion};
pub use rng::RngHandle;
pub use settings::{
    apply_overrides, deep_merge, get_dotted, infer_value, merge_mappings, parse_override,
    select_design, set_dotted, split_overrides, FlowSettings, Mapping, ResolvedSettings,
};
