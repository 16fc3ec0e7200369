//! Command-backed integrity decoder.

use std::io::Write;
use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use super::{run_command, IntegrityDecoder};
use crate::config::DatasetConfig;
use crate::error::ToolError;

/// Runs `<program> <args..> --rocs N --roc-version V --start S --count C <raw>`
/// and copies its standard output into the report sink.
#[derive(Debug, Clone)]
pub struct CommandDecoder {
    program: String,
    args: Vec<String>,
    num_rocs: u32,
    roc_version: u32,
}

impl CommandDecoder {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            num_rocs: 8,
            roc_version: 1,
        }
    }

    pub fn from_config(config: &DatasetConfig) -> Self {
        let mut decoder = Self::new(&config.decoder_program, config.decoder_args.clone());
        decoder.num_rocs = config.num_rocs;
        decoder
    }

    fn arguments(&self, raw_file: &Path, start: u32, count: u32) -> Vec<String> {
        let mut args = self.args.clone();
        args.extend([
            "--rocs".to_string(),
            self.num_rocs.to_string(),
            "--roc-version".to_string(),
            self.roc_version.to_string(),
            "--start".to_string(),
            start.to_string(),
            "--count".to_string(),
            count.to_string(),
            raw_file.to_string_lossy().into_owned(),
        ]);
        args
    }
}

#[async_trait]
impl IntegrityDecoder for CommandDecoder {
    fn configure(&mut self, num_rocs: u32, roc_version: u32) {
        self.num_rocs = num_rocs;
        self.roc_version = roc_version;
    }

    async fn check(
        &self,
        raw_file: &Path,
        start: u32,
        count: u32,
        sink: &mut (dyn Write + Send),
    ) -> Result<(), ToolError> {
        if !raw_file.exists() {
            return Err(ToolError::MissingRawData(raw_file.to_path_buf()));
        }

        let output = run_command(&self.program, &self.arguments(raw_file, start, count), None, None)
            .await?;
        sink.write_all(output.stdout.as_bytes())?;
        sink.flush()?;
        debug!(raw_file = %raw_file.display(), bytes = output.stdout.len(), "Integrity report written");

        // The report itself lists data errors, so only the exit code counts.
        if !output.is_success() {
            return Err(ToolError::Failed {
                program: self.program.clone(),
                code: output.exit_code,
                excerpt: output.stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}
