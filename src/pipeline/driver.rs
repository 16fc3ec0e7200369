//! Top-level command sequencing.

use tracing::info;

use super::runner::{StageReport, StageRunner, Toolset};
use super::selector::explicit_runs;
use super::status::RunStatus;
use crate::config::DatasetConfig;
use crate::error::{MarkerError, PipelineError};
use crate::markers::{MarkerName, MarkerStore, Stage};
use crate::registry::{RunRegistry, SnapshotUpdate};
use crate::runs::{parse_range, RunId};

/// Per-run stages in the order the default pipeline runs them.
pub const RUN_STAGES: [Stage; 3] = [Stage::Process, Stage::Validate, Stage::Publish];

/// Result of removing a marker from one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Removed,
    AlreadyAbsent,
}

/// Runs pipeline commands against one dataset.
pub struct PipelineDriver {
    registry: RunRegistry,
    runner: StageRunner,
}

impl PipelineDriver {
    pub fn new(config: DatasetConfig, tools: Toolset) -> Self {
        let registry = RunRegistry::new(&config);
        let runner = StageRunner::new(config, registry.clone(), tools);
        Self { registry, runner }
    }

    /// Driver with the subprocess-backed tools.
    pub fn from_config(config: DatasetConfig) -> Self {
        let tools = Toolset::from_config(&config);
        Self::new(config, tools)
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    pub fn markers(&self) -> &MarkerStore {
        self.runner.markers()
    }

    /// Refreshes the upstream snapshot.
    pub fn discover(&self) -> Result<SnapshotUpdate, PipelineError> {
        info!("[update_db] scanning incoming directory");
        Ok(self.registry.update_snapshot()?)
    }

    /// Links every snapshot run missing from storage.
    pub fn link(&self) -> Result<Vec<RunId>, PipelineError> {
        info!("[ln_runs] linking new runs");
        let linked = self.registry.link_new_runs()?;
        info!(linked = linked.len(), "[ln_runs] done");
        Ok(linked)
    }

    /// Runs one per-run stage over `runs` (see [`StageRunner::run_stage`]).
    pub async fn run_stage(
        &mut self,
        stage: Stage,
        runs: &[String],
    ) -> Result<StageReport, PipelineError> {
        self.runner.run_stage(stage, runs).await
    }

    /// Full pipeline: discover, link, then each per-run stage over its own
    /// candidates.
    pub async fn run_default(&mut self) -> Result<Vec<StageReport>, PipelineError> {
        self.discover()?;
        self.link()?;

        let mut reports = Vec::with_capacity(RUN_STAGES.len());
        for stage in RUN_STAGES {
            reports.push(self.runner.run_stage(stage, &[]).await?);
        }
        Ok(reports)
    }

    /// Takes every run of `expr` through all per-run stages, one run at a
    /// time. Each stage call names a single run and is therefore forced.
    pub async fn run_range(&mut self, expr: &str) -> Result<Vec<StageReport>, PipelineError> {
        let runs = parse_range(expr)?;
        info!(runs = runs.len(), range = expr, "Running range");

        let mut reports = Vec::with_capacity(runs.len() * RUN_STAGES.len());
        for run in runs {
            let single = [run.to_string()];
            for stage in RUN_STAGES {
                reports.push(self.runner.run_stage(stage, &single).await?);
            }
        }
        Ok(reports)
    }

    /// Marker state of `runs`, or of every valid run when none are given.
    pub fn status(&self, runs: &[String]) -> Result<Vec<RunStatus>, PipelineError> {
        let runs = self.runs_or_all(runs)?;
        Ok(runs
            .into_iter()
            .map(|run| RunStatus::collect(self.markers(), run))
            .collect())
    }

    /// Sets `marker` on `runs`, or on every valid run when none are given.
    pub fn touch(&self, marker: MarkerName, runs: &[String]) -> Result<Vec<RunId>, PipelineError> {
        let runs = self.runs_or_all(runs)?;
        for run in &runs {
            self.markers().set_marker(*run, marker)?;
            info!(run = %run, marker = %marker, "[touch file] OK");
        }
        Ok(runs)
    }

    /// Removes `marker` from `runs`. Unlike [`touch`](Self::touch) the runs
    /// must be given.
    pub fn remove(
        &self,
        marker: MarkerName,
        runs: &[String],
    ) -> Result<Vec<(RunId, Removal)>, PipelineError> {
        let runs = explicit_runs(runs)?.unwrap_or_default();
        let mut removed = Vec::with_capacity(runs.len());
        for run in runs {
            let outcome = if self.markers().remove_marker(run, marker)? {
                Removal::Removed
            } else {
                Removal::AlreadyAbsent
            };
            info!(run = %run, marker = %marker, outcome = ?outcome, "[rm file]");
            removed.push((run, outcome));
        }
        Ok(removed)
    }

    /// Runs under the storage root that contain `marker`.
    pub fn find(&self, marker: MarkerName) -> Result<Vec<RunId>, MarkerError> {
        self.markers().runs_with_marker(marker)
    }

    fn runs_or_all(&self, runs: &[String]) -> Result<Vec<RunId>, PipelineError> {
        match explicit_runs(runs)? {
            Some(runs) => Ok(runs),
            None => Ok(self.registry.list_valid_runs()?),
        }
    }
}
