//! Dataset configuration.
//!
//! A [`DatasetConfig`] carries every path, bound and external command the
//! pipeline needs. It is built once by the CLI (defaults, then an optional
//! YAML file, then `DQM_*` environment overrides) and handed to each
//! component at construction.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::runs::RunBounds;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// The configuration file could not be parsed.
    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration for one test-beam dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Dataset name, used in logs only.
    pub name: String,

    // Storage
    /// Incoming directory the DAQ writes raw files into.
    pub daq_dir: PathBuf,
    /// Run storage root: one directory per run.
    pub data_dir: PathBuf,
    /// Registry snapshot file.
    pub registry_path: PathBuf,

    // Run validity
    /// First valid run number (inclusive).
    pub begin_valid_run: u32,
    /// Last valid run number (inclusive).
    pub end_valid_run: u32,
    /// Minimum age of an incoming file before it is registered.
    pub stable_after_secs: u64,

    // Environment
    /// Environment script for current boards.
    pub env_script: PathBuf,
    /// Environment script for legacy boards.
    pub legacy_env_script: PathBuf,
    /// File name fragment identifying a legacy board run.
    pub legacy_board_pattern: String,
    /// Variable in the sourced environment that points at the tool checkout.
    pub tool_root_var: String,
    /// Run data directory, relative to the tool root.
    pub processing_data_subdir: PathBuf,
    /// Working directory for publishing, relative to the tool root.
    pub publish_subdir: PathBuf,

    // Conversion tool
    pub conversion_program: String,
    pub conversion_args: Vec<String>,
    pub conversion_modes: Vec<String>,

    // Integrity decoder
    pub decoder_program: String,
    pub decoder_args: Vec<String>,
    pub num_rocs: u32,
    pub decoder_start: u32,
    pub decoder_count: u32,
    /// Report file written into the run directory by the integrity check.
    pub integrity_report: String,

    // Publisher
    pub publish_program: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            name: "PSI2013".to_string(),

            daq_dir: PathBuf::from("/home/pixel_dev/PSI2013Data/incoming"),
            data_dir: PathBuf::from("/home/pixel_dev/PSI2013Data/data"),
            registry_path: PathBuf::from("/home/pixel_dev/PSI2013Data/run_list.db"),

            begin_valid_run: 20001,
            end_valid_run: 50001,
            stable_after_secs: 60,

            env_script: PathBuf::from("/home/pixel_dev/dqm/bash/dqm_env.sh"),
            legacy_env_script: PathBuf::from("/home/pixel_dev/dqm/bash/dqm_env_v0.sh"),
            legacy_board_pattern: "TestBoard2".to_string(),
            tool_root_var: "simplesub".to_string(),
            processing_data_subdir: PathBuf::from("CMSPixel/data"),
            publish_subdir: PathBuf::from("CMSPixel"),

            conversion_program: "python".to_string(),
            conversion_args: vec!["config-cmspixel-dqm.py".to_string(), "-a".to_string()],
            conversion_modes: vec![
                "fullconvert".to_string(),
                "clustering".to_string(),
                "hits".to_string(),
            ],

            decoder_program: "chk_dat".to_string(),
            decoder_args: Vec::new(),
            num_rocs: 8,
            decoder_start: 1,
            decoder_count: 5000,
            integrity_report: "chk_dat.txt".to_string(),

            publish_program: "dqm".to_string(),
        }
    }
}

impl DatasetConfig {
    /// Creates a configuration with the default dataset preset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a configuration from a YAML file. Keys that are absent keep
    /// their default value.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Applies overrides from the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `DQM_DAQ_DIR`: Incoming DAQ directory
    /// - `DQM_DATA_DIR`: Run storage root
    /// - `DQM_REGISTRY_PATH`: Registry snapshot file
    /// - `DQM_BEGIN_VALID_RUN`: First valid run number
    /// - `DQM_END_VALID_RUN`: Last valid run number
    /// - `DQM_STABLE_AFTER_SECS`: Minimum age of incoming files
    /// - `DQM_ENV_SCRIPT`: Environment script for current boards
    /// - `DQM_LEGACY_ENV_SCRIPT`: Environment script for legacy boards
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides using `lookup` in place of the process environment.
    pub fn apply_env_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(val) = lookup("DQM_DAQ_DIR") {
            self.daq_dir = PathBuf::from(val);
        }

        if let Some(val) = lookup("DQM_DATA_DIR") {
            self.data_dir = PathBuf::from(val);
        }

        if let Some(val) = lookup("DQM_REGISTRY_PATH") {
            self.registry_path = PathBuf::from(val);
        }

        if let Some(val) = lookup("DQM_BEGIN_VALID_RUN") {
            self.begin_valid_run = parse_env_value(&val, "DQM_BEGIN_VALID_RUN")?;
        }

        if let Some(val) = lookup("DQM_END_VALID_RUN") {
            self.end_valid_run = parse_env_value(&val, "DQM_END_VALID_RUN")?;
        }

        if let Some(val) = lookup("DQM_STABLE_AFTER_SECS") {
            self.stable_after_secs = parse_env_value(&val, "DQM_STABLE_AFTER_SECS")?;
        }

        if let Some(val) = lookup("DQM_ENV_SCRIPT") {
            self.env_script = PathBuf::from(val);
        }

        if let Some(val) = lookup("DQM_LEGACY_ENV_SCRIPT") {
            self.legacy_env_script = PathBuf::from(val);
        }

        Ok(self)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.begin_valid_run > self.end_valid_run {
            return Err(ConfigError::ValidationFailed(format!(
                "begin_valid_run ({}) must not exceed end_valid_run ({})",
                self.begin_valid_run, self.end_valid_run
            )));
        }

        for (field, path) in [
            ("daq_dir", &self.daq_dir),
            ("data_dir", &self.data_dir),
            ("registry_path", &self.registry_path),
        ] {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} cannot be empty",
                    field
                )));
            }
        }

        if self.registry_path.file_name().is_none() {
            return Err(ConfigError::ValidationFailed(
                "registry_path must name a file".to_string(),
            ));
        }

        if self.conversion_program.is_empty()
            || self.decoder_program.is_empty()
            || self.publish_program.is_empty()
        {
            return Err(ConfigError::ValidationFailed(
                "tool programs cannot be empty".to_string(),
            ));
        }

        if self.conversion_modes.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "conversion_modes cannot be empty".to_string(),
            ));
        }

        if self.num_rocs == 0 {
            return Err(ConfigError::ValidationFailed(
                "num_rocs must be greater than 0".to_string(),
            ));
        }

        if self.tool_root_var.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "tool_root_var cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Inclusive bounds of valid run numbers.
    pub fn run_bounds(&self) -> RunBounds {
        RunBounds::new(self.begin_valid_run, self.end_valid_run)
    }

    /// Minimum age of an incoming file before it is registered.
    pub fn stable_after(&self) -> Duration {
        Duration::from_secs(self.stable_after_secs)
    }

    /// Builder method to set the run storage root.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Builder method to set the incoming DAQ directory.
    pub fn with_daq_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.daq_dir = dir.into();
        self
    }

    /// Builder method to set the registry snapshot path.
    pub fn with_registry_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.registry_path = path.into();
        self
    }

    /// Builder method to set the valid run bounds.
    pub fn with_run_bounds(mut self, begin: u32, end: u32) -> Self {
        self.begin_valid_run = begin;
        self.end_valid_run = end;
        self
    }
}

/// Parse an environment variable value into the target type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}
