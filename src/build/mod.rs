//! Build orchestration
//!
//! Patches a job's pipeline script, triggers it, and resolves the queue item
//! into a running build.

mod errors;
mod orchestrator;
mod patch;
mod types;

pub use errors::BuildError;
pub use orchestrator::{BuildOrchestrator, DEFAULT_JOB_TEMPLATE, JobPresence};
pub use patch::{JobConfig, PatchError, patch_pipeline_script};
pub use types::{BuildReference, BuildStage, PollPolicy, QueueItem};
