//! Upstream registry snapshot.
//!
//! The DAQ writes raw files named `<board>_<tag>_<spill>_...` into an
//! incoming directory. A snapshot groups those files by run (the zero-padded
//! spill number) and is persisted as a JSON object so later stages can link
//! runs without rescanning.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::RegistryError;
use crate::runs::{RunBounds, RunId};

/// Source files per run, as found upstream.
pub type RunFiles = BTreeMap<RunId, Vec<String>>;

/// Outcome of writing a snapshot over the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotUpdate {
    Created,
    UpToDate,
    Updated,
}

impl std::fmt::Display for SnapshotUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SnapshotUpdate::Created => "created",
            SnapshotUpdate::UpToDate => "up-to-date",
            SnapshotUpdate::Updated => "updated",
        };
        f.write_str(label)
    }
}

/// Board name of an incoming file: the text before the first `_`.
fn board_of(file_name: &str) -> &str {
    file_name.split('_').next().unwrap_or(file_name)
}

/// Groups an incoming directory listing into runs.
///
/// Names with fewer than three `_`-separated fields, a non-numeric spill,
/// a spill outside `bounds`, or that fail `is_stable` are dropped. Within a
/// run only the first file seen for each board is kept.
pub fn snapshot_upstream<'a>(
    listing: impl IntoIterator<Item = &'a str>,
    bounds: RunBounds,
    is_stable: impl Fn(&str) -> bool,
) -> RunFiles {
    let mut runs = RunFiles::new();

    for name in listing {
        let fields: Vec<&str> = name.split('_').collect();
        if fields.len() < 3 {
            continue;
        }

        let Ok(run) = fields[2].parse::<RunId>() else {
            continue;
        };
        if !bounds.contains(run) {
            continue;
        }
        if !is_stable(name) {
            debug!(file = name, "Skipping file still being written");
            continue;
        }

        let board = fields[0];
        let files = runs.entry(run).or_default();
        if !files.iter().any(|existing| board_of(existing) == board) {
            files.push(name.to_string());
        }
    }

    runs
}

/// Names of the entries in `dir`, sorted.
pub fn list_incoming(dir: &Path) -> Result<Vec<String>, RegistryError> {
    let entries = fs::read_dir(dir).map_err(|source| RegistryError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    names.sort();
    Ok(names)
}

/// Returns true if the file was last modified more than `min_age` ago.
/// Files whose metadata cannot be read are treated as unstable.
pub fn is_stable_file(path: &Path, min_age: Duration) -> bool {
    let Ok(modified) = fs::metadata(path).and_then(|m| m.modified()) else {
        return false;
    };
    is_older_than(modified, Local::now(), min_age)
}

fn is_older_than(modified: SystemTime, now: DateTime<Local>, min_age: Duration) -> bool {
    let then: DateTime<Local> = modified.into();
    let Ok(min_age) = chrono::Duration::from_std(min_age) else {
        return false;
    };
    now.signed_duration_since(then) > min_age
}

/// The persisted snapshot file.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Backup written next to the snapshot before it is replaced.
    pub fn backup_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.path.with_file_name(format!(".tmp_{}", name))
    }

    /// Reads the snapshot.
    pub fn load(&self) -> Result<RunFiles, RegistryError> {
        if !self.path.exists() {
            return Err(RegistryError::SnapshotNotFound(self.path.clone()));
        }
        let content = fs::read_to_string(&self.path).map_err(|source| self.io_error(source))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Writes `runs`, keeping a backup of the previous snapshot, and
    /// reports whether the content changed.
    pub fn save(&self, runs: &RunFiles) -> Result<SnapshotUpdate, RegistryError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                info!(dir = %parent.display(), "Creating registry directory");
                fs::create_dir_all(parent).map_err(|source| RegistryError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let previous = if self.path.exists() {
            fs::copy(&self.path, self.backup_path()).map_err(|source| self.io_error(source))?;
            Some(fs::read(&self.path).map_err(|source| self.io_error(source))?)
        } else {
            None
        };

        let content = serde_json::to_vec(runs)?;
        fs::write(&self.path, &content).map_err(|source| self.io_error(source))?;

        let update = match previous {
            None => {
                fs::copy(&self.path, self.backup_path())
                    .map_err(|source| self.io_error(source))?;
                SnapshotUpdate::Created
            }
            Some(previous) if digest(&previous) == digest(&content) => SnapshotUpdate::UpToDate,
            Some(_) => SnapshotUpdate::Updated,
        };
        Ok(update)
    }

    fn io_error(&self, source: std::io::Error) -> RegistryError {
        RegistryError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

fn digest(data: &[u8]) -> Vec<u8> {
    Sha256::digest(data).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn bounds() -> RunBounds {
        RunBounds::new(20001, 50001)
    }

    #[test]
    fn test_snapshot_groups_by_spill() {
        let listing = [
            "mtb_a_20001_x.dat",
            "tlu_a_20001_x.dat",
            "mtb_a_20002_x.dat",
        ];
        let runs = snapshot_upstream(listing, bounds(), |_| true);

        assert_eq!(runs.len(), 2);
        assert_eq!(
            runs[&RunId::new(20001)],
            vec!["mtb_a_20001_x.dat", "tlu_a_20001_x.dat"]
        );
        assert_eq!(runs[&RunId::new(20002)], vec!["mtb_a_20002_x.dat"]);
    }

    #[test]
    fn test_snapshot_keeps_one_file_per_board() {
        let listing = [
            "mtb_a_20001_x.dat",
            "mtb_b_20001_y.dat",
            "tlu_a_20001_x.dat",
            "tlu_b_20001_y.dat",
        ];
        let runs = snapshot_upstream(listing, bounds(), |_| true);
        assert_eq!(
            runs[&RunId::new(20001)],
            vec!["mtb_a_20001_x.dat", "tlu_a_20001_x.dat"]
        );
    }

    #[test]
    fn test_snapshot_filters_shape_bounds_and_stability() {
        let listing = [
            "short_name.dat",
            "mtb_a_notanumber_x.dat",
            "mtb_a_10_x.dat",
            "mtb_a_60000_x.dat",
            "mtb_a_20003_busy.dat",
            "mtb_a_20004_x.dat",
        ];
        let runs = snapshot_upstream(listing, bounds(), |name| !name.contains("busy"));
        assert_eq!(runs.keys().copied().collect::<Vec<_>>(), vec![RunId::new(20004)]);
    }

    #[test]
    fn test_snapshot_keys_are_padded() {
        let runs = snapshot_upstream(["mtb_a_20001_x.dat"], RunBounds::new(1, 99999), |_| true);
        let json = serde_json::to_string(&runs).unwrap();
        assert_eq!(json, r#"{"020001":["mtb_a_20001_x.dat"]}"#);
    }

    #[test]
    fn test_is_older_than() {
        let now = Local::now();
        let two_minutes_ago = SystemTime::now() - Duration::from_secs(120);
        let just_now = SystemTime::now();
        assert!(is_older_than(two_minutes_ago, now, Duration::from_secs(60)));
        assert!(!is_older_than(just_now, now, Duration::from_secs(60)));
    }

    #[test]
    fn test_fresh_file_is_not_stable() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let path = temp_dir.path().join("mtb_a_20001_x.dat");
        fs::write(&path, b"raw").unwrap();
        assert!(!is_stable_file(&path, Duration::from_secs(60)));
        assert!(!is_stable_file(&temp_dir.path().join("missing"), Duration::ZERO));
    }

    #[test]
    fn test_save_reports_created_up_to_date_updated() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let file = SnapshotFile::new(temp_dir.path().join("db").join("run_list.db"));

        let mut runs = RunFiles::new();
        runs.insert(RunId::new(20001), vec!["mtb_a_20001_x.dat".to_string()]);

        assert_eq!(file.save(&runs).unwrap(), SnapshotUpdate::Created);
        assert!(file.backup_path().exists());
        assert_eq!(file.save(&runs).unwrap(), SnapshotUpdate::UpToDate);

        runs.insert(RunId::new(20002), vec!["mtb_a_20002_x.dat".to_string()]);
        assert_eq!(file.save(&runs).unwrap(), SnapshotUpdate::Updated);
        assert_eq!(file.load().unwrap(), runs);
    }

    #[test]
    fn test_load_missing_snapshot() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let file = SnapshotFile::new(temp_dir.path().join("run_list.db"));
        assert!(matches!(file.load(), Err(RegistryError::SnapshotNotFound(_))));
    }

    #[test]
    fn test_list_incoming_is_sorted() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        for name in ["b_x_20002_y.dat", "a_x_20001_y.dat"] {
            fs::write(temp_dir.path().join(name), "").unwrap();
        }
        let names = list_incoming(temp_dir.path()).unwrap();
        assert_eq!(names, vec!["a_x_20001_y.dat", "b_x_20002_y.dat"]);
    }
}
