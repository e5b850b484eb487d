//! Controller module
//!
//! The long-running probe loop.

mod probe_loop;

pub use probe_loop::{ProbeLoop, ProbeLoopConfig, WaveSummary, DEFAULT_WAVE_INTERVAL};
