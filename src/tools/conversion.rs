//! Command-backed conversion tool.

use std::path::Path;

use async_trait::async_trait;

use super::{run_command, ConversionTool, Environment, ToolOutput};
use crate::config::DatasetConfig;
use crate::error::ToolError;
use crate::runs::RunId;

/// Runs `<program> <args..> <mode> <run>`, e.g.
/// `python config-cmspixel-dqm.py -a fullconvert 020001`.
#[derive(Debug, Clone)]
pub struct CommandConversionTool {
    program: String,
    args: Vec<String>,
}

impl CommandConversionTool {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &DatasetConfig) -> Self {
        Self::new(&config.conversion_program, config.conversion_args.clone())
    }

    fn arguments(&self, mode: &str, run: RunId) -> Vec<String> {
        let mut args = self.args.clone();
        args.push(mode.to_string());
        args.push(run.to_string());
        args
    }
}

#[async_trait]
impl ConversionTool for CommandConversionTool {
    async fn run(
        &self,
        mode: &str,
        run: RunId,
        workdir: &Path,
        env: &Environment,
    ) -> Result<ToolOutput, ToolError> {
        run_command(&self.program, &self.arguments(mode, run), Some(workdir), Some(env)).await
    }
}
