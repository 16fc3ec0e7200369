//! Per-run completion report.

use std::fmt;

use serde::Serialize;

use crate::markers::{LegacyMarker, MarkerName, MarkerStore, Stage, StageState};
use crate::runs::RunId;

/// Marker state of one run across the per-run stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunStatus {
    pub run: RunId,
    pub process: StageState,
    pub validate: StageState,
    pub publish: StageState,
    /// Completion markers of the retired full-processing chain.
    pub full_processing: bool,
    pub full_integrity_check: bool,
}

impl RunStatus {
    /// Reads the markers of `run`.
    pub fn collect(markers: &MarkerStore, run: RunId) -> Self {
        Self {
            run,
            process: markers.stage_state(run, Stage::Process),
            validate: markers.stage_state(run, Stage::Validate),
            publish: markers.stage_state(run, Stage::Publish),
            full_processing: markers.has_marker(run, MarkerName::Legacy(LegacyMarker::EndEutFul)),
            full_integrity_check: markers.has_marker(
                run,
                MarkerName::Legacy(LegacyMarker::EndChkDataIntegrity),
            ),
        }
    }

    /// Returns true if every current stage is done.
    pub fn is_complete(&self) -> bool {
        [self.process, self.validate, self.publish]
            .iter()
            .all(|state| *state == StageState::Done)
    }
}

fn column(state: StageState, label: &str) -> String {
    match state {
        StageState::Done => label.to_string(),
        StageState::Running => format!("{}*", label),
        StageState::NotStarted => String::new(),
    }
}

fn flag(set: bool, label: &str) -> &str {
    if set {
        label
    } else {
        ""
    }
}

/// One table line: the run followed by the finished stages. Running stages
/// carry a trailing `*`.
impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:<8} {:<8} {:<8} {:<8} {}",
            self.run,
            column(self.process, Stage::Process.short_name()),
            column(self.validate, Stage::Validate.short_name()),
            column(self.publish, Stage::Publish.short_name()),
            flag(self.full_processing, "eut_ful"),
            flag(self.full_integrity_check, "chk_data_integrity"),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_collect_reads_stage_and_legacy_markers() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let markers = MarkerStore::new(temp_dir.path());
        let run = RunId::new(20001);
        let dir = markers.run_dir(run);
        fs::create_dir_all(&dir).unwrap();
        for name in [".end_eut_dqm", ".begin_chk_dat", ".end_eut_ful"] {
            fs::write(dir.join(name), "").unwrap();
        }

        let status = RunStatus::collect(&markers, run);
        assert_eq!(status.process, StageState::Done);
        assert_eq!(status.validate, StageState::Running);
        assert_eq!(status.publish, StageState::NotStarted);
        assert!(status.full_processing);
        assert!(!status.full_integrity_check);
        assert!(!status.is_complete());

        let line = status.to_string();
        assert!(line.starts_with("020001 eut_dqm  chk_dat* "));
        assert!(line.contains("eut_ful"));
    }

    #[test]
    fn test_missing_run_has_nothing_started() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let markers = MarkerStore::new(temp_dir.path());
        let status = RunStatus::collect(&markers, RunId::new(20001));
        assert_eq!(status.process, StageState::NotStarted);
        assert!(status.to_string().trim_end().ends_with("020001"));
    }

    #[test]
    fn test_status_serializes_states() {
        let status = RunStatus {
            run: RunId::new(20001),
            process: StageState::Done,
            validate: StageState::Done,
            publish: StageState::Running,
            full_processing: false,
            full_integrity_check: false,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["run"], "020001");
        assert_eq!(json["publish"], "running");
    }
}
