//! Error types for testbeam-dqm operations.
//!
//! Defines error types for the major subsystems:
//! - Run-range parsing
//! - Marker storage
//! - Run registry and upstream snapshot handling
//! - External tool invocation
//! - Pipeline execution

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while parsing a run or run-range expression.
#[derive(Debug, Error)]
pub enum RangeError {
    #[error("Empty run range expression")]
    Empty,

    #[error("Invalid run number '{0}': expected a decimal integer")]
    InvalidToken(String),

    #[error("Open-ended run range '{0}': an upper bound is required")]
    OpenEnded(String),

    #[error("Inverted run range {start}-{stop}: start must not exceed stop")]
    Inverted { start: String, stop: String },
}

/// Errors that can occur while reading or writing run markers.
#[derive(Debug, Error)]
pub enum MarkerError {
    #[error("Unknown marker '{0}'")]
    UnknownMarker(String),

    #[error("Run directory does not exist: {0}")]
    MissingRunDir(PathBuf),

    #[error("Marker IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur during run registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Run storage root does not exist: {0}")]
    MissingRoot(PathBuf),

    #[error("Registry snapshot not found: {0}")]
    SnapshotNotFound(PathBuf),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by external tool invocations.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' failed (exit code {code}): {excerpt}")]
    Failed {
        program: String,
        code: i32,
        excerpt: String,
    },

    #[error("Environment variable '{0}' not set by the sourced environment")]
    MissingEnvVar(String),

    #[error("Raw data file not found: {0}")]
    MissingRawData(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that abort a pipeline command.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Run range error: {0}")]
    Range(#[from] RangeError),

    #[error("Marker error: {0}")]
    Marker(#[from] MarkerError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Stage '{0}' does not run per run")]
    NotPerRunStage(crate::markers::Stage),
}
