//! Run registry.
//!
//! Answers "which runs physically exist" by walking the run storage root,
//! and keeps the upstream snapshot of the DAQ incoming directory used to
//! discover and link new runs.
//!
//! A run directory is valid when its name is purely numeric, its number is
//! inside the dataset bounds, and it holds at least one file and no
//! subdirectories.

pub mod link;
pub mod snapshot;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

pub use snapshot::{snapshot_upstream, RunFiles, SnapshotFile, SnapshotUpdate};

use crate::config::DatasetConfig;
use crate::error::RegistryError;
use crate::runs::{RunBounds, RunId};

/// Enumerates runs in storage and upstream.
#[derive(Debug, Clone)]
pub struct RunRegistry {
    data_dir: PathBuf,
    daq_dir: PathBuf,
    bounds: RunBounds,
    stable_after: Duration,
    snapshot: SnapshotFile,
}

impl RunRegistry {
    pub fn new(config: &DatasetConfig) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            daq_dir: config.daq_dir.clone(),
            bounds: config.run_bounds(),
            stable_after: config.stable_after(),
            snapshot: SnapshotFile::new(&config.registry_path),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn bounds(&self) -> RunBounds {
        self.bounds
    }

    pub fn snapshot_file(&self) -> &SnapshotFile {
        &self.snapshot
    }

    /// Valid runs currently in storage, ascending. Always reads the disk.
    pub fn list_valid_runs(&self) -> Result<Vec<RunId>, RegistryError> {
        if !self.data_dir.is_dir() {
            return Err(RegistryError::MissingRoot(self.data_dir.clone()));
        }
        let entries = fs::read_dir(&self.data_dir).map_err(|source| RegistryError::Io {
            path: self.data_dir.clone(),
            source,
        })?;

        let mut runs = Vec::new();
        for entry in entries.filter_map(Result::ok) {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(run) = entry
                .file_name()
                .to_str()
                .and_then(RunId::from_dir_name)
            else {
                continue;
            };
            if !self.bounds.contains(run) {
                continue;
            }
            if !is_leaf_with_files(&path)? {
                debug!(run = %run, "Skipping run directory without files or with subdirectories");
                continue;
            }
            runs.push(run);
        }

        runs.sort();
        Ok(runs)
    }

    /// Scans the DAQ incoming directory and groups stable files into runs.
    pub fn scan_upstream(&self) -> Result<RunFiles, RegistryError> {
        let names = snapshot::list_incoming(&self.daq_dir)?;
        let runs = snapshot_upstream(names.iter().map(String::as_str), self.bounds, |name| {
            snapshot::is_stable_file(&self.daq_dir.join(name), self.stable_after)
        });
        info!(
            files = names.len(),
            runs = runs.len(),
            dir = %self.daq_dir.display(),
            "Scanned incoming directory"
        );
        Ok(runs)
    }

    /// Rescans upstream and persists the snapshot.
    pub fn update_snapshot(&self) -> Result<SnapshotUpdate, RegistryError> {
        let runs = self.scan_upstream()?;
        let update = self.snapshot.save(&runs)?;
        info!(path = %self.snapshot.path().display(), status = %update, "Registry snapshot written");
        Ok(update)
    }

    /// Creates and links every snapshot run that is not yet in storage.
    /// Returns the runs that were linked.
    pub fn link_new_runs(&self) -> Result<Vec<RunId>, RegistryError> {
        let upstream = self.snapshot.load()?;
        if !self.data_dir.exists() {
            link::create_run_dir(&self.data_dir)?;
        }
        let local = self.list_valid_runs()?;

        let mut linked = Vec::new();
        for (run, files) in &upstream {
            if local.binary_search(run).is_ok() {
                continue;
            }
            let run_dir = self.data_dir.join(run.to_string());
            link::create_run_dir(&run_dir)?;
            for file in files {
                link::link_file(&self.daq_dir.join(file), &run_dir.join(file))?;
            }
            info!(run = %run, files = files.len(), "Linked run");
            linked.push(*run);
        }
        Ok(linked)
    }
}

/// True if `dir` has at least one file and no subdirectories.
fn is_leaf_with_files(dir: &Path) -> Result<bool, RegistryError> {
    let entries = fs::read_dir(dir).map_err(|source| RegistryError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut has_file = false;
    for entry in entries.filter_map(Result::ok) {
        if entry.path().is_dir() {
            return Ok(false);
        }
        has_file = true;
    }
    Ok(has_file)
}
