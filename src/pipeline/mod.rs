//! Upstream producer
//!
//! This module provides:
//! - [`PipelineConfig`]: command templates for the demodulator and encoder
//! - [`PipelineLauncher`] / [`ChunkSource`]: the seam the tuner drives
//! - [`ProcessLauncher`] / [`ProcessPipeline`]: the real two-stage process chain

pub mod config;
pub mod launcher;
pub mod process;

pub use config::{expand_command, Frequency, PipelineConfig, TuneParams};
pub use launcher::{ChunkSource, PipelineLauncher};
pub use process::{ProcessLauncher, ProcessPipeline};
