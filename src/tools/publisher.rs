//! Command-backed publisher.

use std::path::Path;

use async_trait::async_trait;

use super::{run_command, Environment, Publisher, ToolOutput};
use crate::error::ToolError;
use crate::runs::RunId;

/// Runs `<program> data/<run>` in the publishing directory.
#[derive(Debug, Clone)]
pub struct CommandPublisher {
    program: String,
}

impl CommandPublisher {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl Publisher for CommandPublisher {
    async fn publish(
        &self,
        run: RunId,
        workdir: &Path,
        env: &Environment,
    ) -> Result<ToolOutput, ToolError> {
        let args = vec![format!("data/{}", run)];
        run_command(&self.program, &args, Some(workdir), Some(env)).await
    }
}
