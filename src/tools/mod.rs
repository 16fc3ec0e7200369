//! External tools driven by the pipeline.
//!
//! Each tool sits behind a small async trait so the stage runner can be
//! exercised without the real conversion, decoding and publishing software.
//! The subprocess implementations here run the configured programs and wait
//! for them to exit with their output fully drained. There is no timeout: a
//! hung tool blocks the pipeline until it is killed.

pub mod command;
pub mod conversion;
pub mod decoder;
pub mod environment;
pub mod publisher;

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

pub use command::run_command;
pub use conversion::CommandConversionTool;
pub use decoder::CommandDecoder;
pub use environment::BashEnvironment;
pub use publisher::CommandPublisher;

use crate::config::DatasetConfig;
use crate::error::ToolError;
use crate::runs::RunId;

/// Variables produced by sourcing an environment script.
pub type Environment = HashMap<String, String>;

/// Failure marker searched for in tool output.
pub const FAILURE_MARKER: &str = "error";

/// Captured result of an external command.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Program that was run.
    pub program: String,
    /// Exit code, or -1 if the process was killed by a signal.
    pub exit_code: i32,
    /// Standard output captured.
    pub stdout: String,
    /// Standard error captured.
    pub stderr: String,
    /// Wall-clock duration.
    pub duration: Duration,
}

impl ToolOutput {
    /// Creates a new tool output.
    pub fn new(
        program: impl Into<String>,
        exit_code: i32,
        stdout: String,
        stderr: String,
        duration: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            exit_code,
            stdout,
            stderr,
            duration,
        }
    }

    /// Checks if the tool exited with code 0.
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Checks if the captured stdout mentions an error. Some of the driven
    /// tools exit 0 even when they fail, so this is checked as well.
    pub fn reports_error(&self) -> bool {
        self.stdout.contains(FAILURE_MARKER)
    }

    /// Converts a failed run into [`ToolError::Failed`].
    pub fn into_result(self) -> Result<Self, ToolError> {
        if self.is_success() && !self.reports_error() {
            return Ok(self);
        }
        let source = if self.stdout.contains(FAILURE_MARKER) {
            &self.stdout
        } else {
            &self.stderr
        };
        Err(ToolError::Failed {
            excerpt: excerpt(source, 200),
            program: self.program,
            code: self.exit_code,
        })
    }
}

/// Last `max_chars` characters of `text`, trimmed.
fn excerpt(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    let count = trimmed.chars().count();
    if count <= max_chars {
        return trimmed.to_string();
    }
    let tail: String = trimmed.chars().skip(count - max_chars).collect();
    format!("...{}", tail)
}

/// Front-end board generation a run was taken with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardRevision {
    /// Older test board, decoded with ROC version 0.
    Legacy,
    /// Current test board, decoded with ROC version 1.
    Current,
}

impl BoardRevision {
    /// ROC version passed to the integrity decoder.
    pub fn roc_version(&self) -> u32 {
        match self {
            BoardRevision::Legacy => 0,
            BoardRevision::Current => 1,
        }
    }

    /// Environment script matching this board generation.
    pub fn env_script<'a>(&self, config: &'a DatasetConfig) -> &'a Path {
        match self {
            BoardRevision::Legacy => &config.legacy_env_script,
            BoardRevision::Current => &config.env_script,
        }
    }
}

/// Conversion, clustering and histogramming tool.
#[async_trait]
pub trait ConversionTool: Send + Sync {
    /// Runs one conversion `mode` for `run` inside `workdir`.
    async fn run(
        &self,
        mode: &str,
        run: RunId,
        workdir: &Path,
        env: &Environment,
    ) -> Result<ToolOutput, ToolError>;
}

/// Raw data integrity checker.
#[async_trait]
pub trait IntegrityDecoder: Send + Sync {
    /// Sets the detector geometry used by subsequent checks.
    fn configure(&mut self, num_rocs: u32, roc_version: u32);

    /// Checks `count` events of `raw_file` starting at event `start` and
    /// writes the report to `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::MissingRawData`] if `raw_file` does not exist.
    async fn check(
        &self,
        raw_file: &Path,
        start: u32,
        count: u32,
        sink: &mut (dyn Write + Send),
    ) -> Result<(), ToolError>;
}

/// Publishes the DQM output of a run.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        run: RunId,
        workdir: &Path,
        env: &Environment,
    ) -> Result<ToolOutput, ToolError>;
}

/// Produces the environment defined by a shell script.
#[async_trait]
pub trait EnvironmentSource: Send + Sync {
    async fn resolve(&self, script: &Path) -> Result<Environment, ToolError>;
}
