//! Filesystem-backed marker storage.
//!
//! Markers are empty files inside `<data_dir>/<run>/`. They are the only
//! state the pipeline trusts across invocations.

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use super::{MarkerName, Stage, StageState};
use crate::error::MarkerError;
use crate::runs::RunId;

/// Reads and writes per-run marker files under the run storage root.
#[derive(Debug, Clone)]
pub struct MarkerStore {
    data_dir: PathBuf,
}

impl MarkerStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Directory holding the files and markers of `run`.
    pub fn run_dir(&self, run: RunId) -> PathBuf {
        self.data_dir.join(run.to_string())
    }

    /// Returns true if a file called `name` exists anywhere under the run
    /// directory. A missing run directory has no markers.
    pub fn has_marker(&self, run: RunId, name: MarkerName) -> bool {
        let file_name = name.file_name();
        self.files_under(run)
            .any(|entry| entry.file_name().to_str() == Some(file_name.as_str()))
    }

    /// Returns true if any file name under the run directory contains
    /// `substring`.
    pub fn has_marker_matching(&self, run: RunId, substring: &str) -> bool {
        self.files_under(run).any(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.contains(substring))
        })
    }

    /// Creates the marker if it does not exist yet. Existing markers are
    /// left untouched.
    pub fn set_marker(&self, run: RunId, name: MarkerName) -> Result<(), MarkerError> {
        let run_dir = self.run_dir(run);
        if !run_dir.is_dir() {
            return Err(MarkerError::MissingRunDir(run_dir));
        }

        let path = run_dir.join(name.file_name());
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => {
                debug!(run = %run, marker = %name, "Marker set");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(source) => Err(MarkerError::Io { path, source }),
        }
    }

    /// Deletes the marker from the top of the run directory. Returns false
    /// if it was already absent.
    pub fn remove_marker(&self, run: RunId, name: MarkerName) -> Result<bool, MarkerError> {
        let path = self.run_dir(run).join(name.file_name());
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(run = %run, marker = %name, "Marker removed");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(MarkerError::Io { path, source }),
        }
    }

    /// State of `stage` for `run` derived from its begin and end markers.
    pub fn stage_state(&self, run: RunId, stage: Stage) -> StageState {
        StageState::from_markers(
            self.has_marker(run, stage.begin_marker()),
            self.has_marker(run, stage.end_marker()),
        )
    }

    /// All numerically named run directories that contain `name`, ascending.
    pub fn runs_with_marker(&self, name: MarkerName) -> Result<Vec<RunId>, MarkerError> {
        let entries = fs::read_dir(&self.data_dir).map_err(|source| MarkerError::Io {
            path: self.data_dir.clone(),
            source,
        })?;

        let mut runs: Vec<RunId> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| RunId::from_dir_name(entry.file_name().to_str()?))
            .filter(|run| self.has_marker(*run, name))
            .collect();
        runs.sort();
        Ok(runs)
    }

    fn files_under(&self, run: RunId) -> impl Iterator<Item = walkdir::DirEntry> {
        WalkDir::new(self.run_dir(run))
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| !entry.file_type().is_dir())
    }
}
