#![deny(missing_docs)]
#![doc = "Worker pool running flow batches with per-task timeouts and cancellation."]

pub mod outcome;
pub mod pool;

pub use outcome::{Completed, CrashInfo, TaskOutcome};
pub use pool::{max_workers_for, Batch, WorkerPool};
