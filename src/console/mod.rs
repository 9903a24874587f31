//! Live console streaming
//!
//! Turns the progressive console endpoint into incremental chunks.

mod delta;
mod streamer;

pub use delta::{DeltaKind, LogDelta, compute_delta, strip_pipeline_markers};
pub use streamer::{
    ConsoleLogState, LogChunk, LogStreamer, ProgressiveSnapshot, fetch_progressive,
    progressive_text_url,
};
