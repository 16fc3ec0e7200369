//! Candidate run selection per stage.

use tracing::debug;

use crate::error::{PipelineError, RangeError};
use crate::markers::{MarkerStore, Stage, StageState};
use crate::registry::RunRegistry;
use crate::runs::{parse_range, RunId};

/// Resolves operator-supplied run arguments.
///
/// - no arguments: `None`, the caller derives runs itself;
/// - one argument: a run-range expression;
/// - several arguments: individual run numbers, kept in the given order.
pub fn explicit_runs(args: &[String]) -> Result<Option<Vec<RunId>>, RangeError> {
    match args {
        [] => Ok(None),
        [expr] => parse_range(expr).map(Some),
        many => many
            .iter()
            .map(|arg| arg.parse::<RunId>())
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
    }
}

/// Computes which runs a stage should consider.
#[derive(Debug, Clone)]
pub struct StageSelector {
    registry: RunRegistry,
    markers: MarkerStore,
}

impl StageSelector {
    pub fn new(registry: RunRegistry, markers: MarkerStore) -> Self {
        Self { registry, markers }
    }

    /// Candidate runs for `stage`.
    ///
    /// Explicit runs are returned as given and bypass marker filtering.
    /// Otherwise a valid run is a candidate if the stage has neither begun
    /// nor finished for it and every upstream stage has finished.
    pub fn candidates(&self, stage: Stage, explicit: &[String]) -> Result<Vec<RunId>, PipelineError> {
        if let Some(runs) = explicit_runs(explicit)? {
            return Ok(runs);
        }

        let runs: Vec<RunId> = self
            .registry
            .list_valid_runs()?
            .into_iter()
            .filter(|run| self.is_eligible(*run, stage))
            .collect();

        debug!(stage = %stage, candidates = runs.len(), "Selected candidate runs");
        Ok(runs)
    }

    fn is_eligible(&self, run: RunId, stage: Stage) -> bool {
        if self.markers.stage_state(run, stage) != StageState::NotStarted {
            return false;
        }
        stage
            .upstream()
            .iter()
            .all(|upstream| self.markers.has_marker(run, upstream.end_marker()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatasetConfig;
    use std::fs;
    use tempfile::TempDir;

    fn selector(temp_dir: &TempDir) -> StageSelector {
        let config = DatasetConfig::default().with_data_dir(temp_dir.path());
        StageSelector::new(RunRegistry::new(&config), MarkerStore::new(temp_dir.path()))
    }

    fn make_run(temp_dir: &TempDir, run: u32, files: &[&str]) -> RunId {
        let run = RunId::new(run);
        let dir = temp_dir.path().join(run.to_string());
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("mtb_a_x.dat"), "").unwrap();
        for file in files {
            fs::write(dir.join(file), "").unwrap();
        }
        run
    }

    #[test]
    fn test_explicit_runs() {
        assert_eq!(explicit_runs(&[]).unwrap(), None);
        assert_eq!(
            explicit_runs(&["20001-20002".to_string()]).unwrap(),
            Some(vec![RunId::new(20001), RunId::new(20002)])
        );
        assert_eq!(
            explicit_runs(&["20005".to_string(), "20001".to_string()]).unwrap(),
            Some(vec![RunId::new(20005), RunId::new(20001)])
        );
        assert!(explicit_runs(&["20005".to_string(), "x".to_string()]).is_err());
    }

    #[test]
    fn test_candidates_skip_begun_and_finished_runs() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let fresh = make_run(&temp_dir, 20001, &[]);
        make_run(&temp_dir, 20002, &[".begin_eut_dqm"]);
        make_run(&temp_dir, 20003, &[".begin_eut_dqm", ".end_eut_dqm"]);
        let other_stage_done = make_run(&temp_dir, 20004, &[".end_chk_dat"]);

        let runs = selector(&temp_dir).candidates(Stage::Process, &[]).unwrap();
        assert_eq!(runs, vec![fresh, other_stage_done]);
    }

    #[test]
    fn test_publish_requires_process_and_validate() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        make_run(&temp_dir, 20001, &[]);
        make_run(&temp_dir, 20002, &[".end_eut_dqm"]);
        make_run(&temp_dir, 20003, &[".end_chk_dat"]);
        let ready = make_run(&temp_dir, 20004, &[".end_eut_dqm", ".end_chk_dat"]);
        make_run(
            &temp_dir,
            20005,
            &[".end_eut_dqm", ".end_chk_dat", ".begin_pub_dqm", ".end_pub_dqm"],
        );

        let runs = selector(&temp_dir).candidates(Stage::Publish, &[]).unwrap();
        assert_eq!(runs, vec![ready]);
    }

    #[test]
    fn test_explicit_runs_bypass_markers() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let done = make_run(&temp_dir, 20001, &[".end_eut_dqm"]);

        let runs = selector(&temp_dir)
            .candidates(Stage::Process, &["20001".to_string()])
            .unwrap();
        assert_eq!(runs, vec![done]);
    }

    #[test]
    fn test_malformed_range_is_an_error() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let result = selector(&temp_dir).candidates(Stage::Process, &["20001-".to_string()]);
        assert!(matches!(result, Err(PipelineError::Range(_))));
    }
}
