//! testbeam-dqm: data quality monitoring pipeline for test beam runs.
//!
//! This library discovers runs written by the DAQ, links them into a run
//! storage tree, and drives the external processing, integrity check and
//! publishing tools over each run, recording progress as marker files.

// Core modules
pub mod cli;
pub mod config;
pub mod error;
pub mod markers;
pub mod pipeline;
pub mod registry;
pub mod runs;
pub mod tools;

// Re-export commonly used types
pub use config::{ConfigError, DatasetConfig};
pub use error::{MarkerError, PipelineError, RangeError, RegistryError, ToolError};
pub use markers::{MarkerName, Stage, StageState};
pub use runs::RunId;
