//! Stage execution for individual runs.
//!
//! [`StageRunner::execute`] moves one (run, stage) pair through
//! `NotStarted -> Running -> Done`: it sets the begin marker, runs the
//! external action and sets the end marker. Without `force`, runs that are
//! already running or done are skipped, as are publish runs whose upstream
//! stages have not finished.
//!
//! A failing external action leaves the run in `Running`. The stage loop
//! carries on with the next run; nothing is retried automatically. A
//! missing run directory or any other filesystem error aborts the whole
//! invocation instead.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};
use walkdir::WalkDir;

use super::selector::StageSelector;
use crate::config::DatasetConfig;
use crate::error::{MarkerError, PipelineError, ToolError};
use crate::markers::{MarkerStore, Stage, StageState};
use crate::registry::RunRegistry;
use crate::runs::RunId;
use crate::tools::{
    BashEnvironment, BoardRevision, CommandConversionTool, CommandDecoder, CommandPublisher,
    ConversionTool, Environment, EnvironmentSource, IntegrityDecoder, Publisher, ToolOutput,
};

/// Canonical name of the raw data link inside a run directory.
pub const RAW_LINK_NAME: &str = "mtb.bin";

/// The external tools a runner drives.
pub struct Toolset {
    pub conversion: Box<dyn ConversionTool>,
    pub decoder: Box<dyn IntegrityDecoder>,
    pub publisher: Box<dyn Publisher>,
    pub environment: Box<dyn EnvironmentSource>,
}

impl Toolset {
    /// Subprocess-backed tools built from the dataset configuration.
    pub fn from_config(config: &DatasetConfig) -> Self {
        Self {
            conversion: Box::new(CommandConversionTool::from_config(config)),
            decoder: Box::new(CommandDecoder::from_config(config)),
            publisher: Box::new(CommandPublisher::new(&config.publish_program)),
            environment: Box::new(BashEnvironment::new()),
        }
    }
}

/// Why a run was not executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyRunning,
    AlreadyDone,
    UpstreamIncomplete(Stage),
}

/// Result of executing one stage for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Completed,
    Skipped(SkipReason),
    Failed(String),
}

/// Summary of one stage invocation over its candidate runs.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub forced: bool,
    pub completed: Vec<RunId>,
    pub skipped: Vec<RunId>,
    pub failed: Vec<(RunId, String)>,
}

impl StageReport {
    fn new(stage: Stage, forced: bool) -> Self {
        Self {
            stage,
            forced,
            completed: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
        }
    }

    fn record(&mut self, run: RunId, outcome: StageOutcome) {
        match outcome {
            StageOutcome::Completed => self.completed.push(run),
            StageOutcome::Skipped(_) => self.skipped.push(run),
            StageOutcome::Failed(reason) => self.failed.push((run, reason)),
        }
    }

    /// Number of runs the stage looked at.
    pub fn candidates(&self) -> usize {
        self.completed.len() + self.skipped.len() + self.failed.len()
    }
}

/// Errors inside a stage action. Tool failures end the run; filesystem and
/// marker errors abort the invocation.
enum ActionError {
    Tool(ToolError),
    Abort(PipelineError),
}

impl From<ToolError> for ActionError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::Io(_) => ActionError::Abort(err.into()),
            err => ActionError::Tool(err),
        }
    }
}

impl From<MarkerError> for ActionError {
    fn from(err: MarkerError) -> Self {
        ActionError::Abort(err.into())
    }
}

/// Executes per-run stages and records their markers.
pub struct StageRunner {
    config: DatasetConfig,
    markers: MarkerStore,
    selector: StageSelector,
    tools: Toolset,
}

impl StageRunner {
    pub fn new(config: DatasetConfig, registry: RunRegistry, tools: Toolset) -> Self {
        let markers = MarkerStore::new(&config.data_dir);
        let selector = StageSelector::new(registry, markers.clone());
        Self {
            config,
            markers,
            selector,
            tools,
        }
    }

    pub fn markers(&self) -> &MarkerStore {
        &self.markers
    }

    /// Runs `stage` over its candidate runs.
    ///
    /// When exactly one run is selected it is always executed, whatever
    /// its markers say.
    pub async fn run_stage(
        &mut self,
        stage: Stage,
        explicit: &[String],
    ) -> Result<StageReport, PipelineError> {
        if !stage.is_per_run() {
            return Err(PipelineError::NotPerRunStage(stage));
        }

        let runs = self.selector.candidates(stage, explicit)?;
        let force = runs.len() == 1;
        let mut report = StageReport::new(stage, force);

        for run in runs {
            let outcome = self.execute(run, stage, force).await?;
            report.record(run, outcome);
        }

        info!(
            stage = %stage,
            completed = report.completed.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Stage finished"
        );
        Ok(report)
    }

    /// Executes `stage` for `run`.
    pub async fn execute(
        &mut self,
        run: RunId,
        stage: Stage,
        force: bool,
    ) -> Result<StageOutcome, PipelineError> {
        let run_dir = self.markers.run_dir(run);
        if !run_dir.is_dir() {
            return Err(MarkerError::MissingRunDir(run_dir).into());
        }

        if !force {
            if let Some(reason) = self.skip_reason(run, stage) {
                info!(run = %run, stage = %stage, reason = ?reason, "Skipping run");
                return Ok(StageOutcome::Skipped(reason));
            }
        }

        let result = match stage {
            Stage::Process => self.process(run).await,
            Stage::Validate => self.validate(run).await,
            Stage::Publish => self.publish(run).await,
            Stage::Discover | Stage::Link => return Err(PipelineError::NotPerRunStage(stage)),
        };

        match result {
            Ok(()) => {
                info!(run = %run, stage = %stage, "OK");
                Ok(StageOutcome::Completed)
            }
            Err(ActionError::Tool(err)) => {
                warn!(run = %run, stage = %stage, error = %err, "Stage failed");
                Ok(StageOutcome::Failed(err.to_string()))
            }
            Err(ActionError::Abort(err)) => Err(err),
        }
    }

    fn skip_reason(&self, run: RunId, stage: Stage) -> Option<SkipReason> {
        match self.markers.stage_state(run, stage) {
            StageState::Running => return Some(SkipReason::AlreadyRunning),
            StageState::Done => return Some(SkipReason::AlreadyDone),
            StageState::NotStarted => {}
        }
        stage
            .upstream()
            .iter()
            .find(|upstream| !self.markers.has_marker(run, upstream.end_marker()))
            .map(|upstream| SkipReason::UpstreamIncomplete(*upstream))
    }

    fn board_revision(&self, run: RunId) -> BoardRevision {
        if self
            .markers
            .has_marker_matching(run, &self.config.legacy_board_pattern)
        {
            BoardRevision::Legacy
        } else {
            BoardRevision::Current
        }
    }

    /// Sources the environment for the run's board and returns it with the
    /// tool root it points at.
    async fn tool_environment(&self, run: RunId) -> Result<(Environment, PathBuf), ToolError> {
        let script = self.board_revision(run).env_script(&self.config);
        let env = self.tools.environment.resolve(script).await?;
        let root = env
            .get(&self.config.tool_root_var)
            .map(PathBuf::from)
            .ok_or_else(|| ToolError::MissingEnvVar(self.config.tool_root_var.clone()))?;
        Ok((env, root))
    }

    async fn process(&mut self, run: RunId) -> Result<(), ActionError> {
        let (env, tool_root) = self.tool_environment(run).await?;
        let run_dir = tool_root
            .join(&self.config.processing_data_subdir)
            .join(run.to_string());
        ensure_raw_link(&run_dir)?;

        self.markers.set_marker(run, Stage::Process.begin_marker())?;
        for mode in &self.config.conversion_modes {
            info!(run = %run, mode = %mode, "[eut_dqm] converting");
            self.tools
                .conversion
                .run(mode, run, &tool_root, &env)
                .await
                .and_then(ToolOutput::into_result)?;
        }
        self.markers.set_marker(run, Stage::Process.end_marker())?;
        Ok(())
    }

    async fn validate(&mut self, run: RunId) -> Result<(), ActionError> {
        let revision = self.board_revision(run);
        self.tools
            .decoder
            .configure(self.config.num_rocs, revision.roc_version());

        let run_dir = self.markers.run_dir(run);
        let raw_file = run_dir.join(RAW_LINK_NAME);
        let mut report = File::create(run_dir.join(&self.config.integrity_report))
            .map_err(ToolError::from)?;

        self.markers.set_marker(run, Stage::Validate.begin_marker())?;
        info!(run = %run, roc_version = revision.roc_version(), "[chk_dat] checking");
        let checked = self
            .tools
            .decoder
            .check(
                &raw_file,
                self.config.decoder_start,
                self.config.decoder_count,
                &mut report,
            )
            .await;
        match checked {
            Ok(()) => {}
            Err(ToolError::MissingRawData(path)) => {
                warn!(run = %run, path = %path.display(), "Raw data missing, integrity report left empty");
            }
            Err(err) => return Err(err.into()),
        }
        self.markers.set_marker(run, Stage::Validate.end_marker())?;
        Ok(())
    }

    async fn publish(&mut self, run: RunId) -> Result<(), ActionError> {
        let (env, tool_root) = self.tool_environment(run).await?;
        let workdir = tool_root.join(&self.config.publish_subdir);

        self.markers.set_marker(run, Stage::Publish.begin_marker())?;
        info!(run = %run, "[pub_dqm] publishing");
        self.tools
            .publisher
            .publish(run, &workdir, &env)
            .await
            .and_then(ToolOutput::into_result)?;
        self.markers.set_marker(run, Stage::Publish.end_marker())?;
        Ok(())
    }
}

/// What [`ensure_raw_link`] found or did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawLink {
    /// The link was already there.
    Existing,
    /// The link was created pointing at this path, relative to the run dir.
    Created(PathBuf),
    /// No `.dat` file was found to link.
    NoRawData,
}

/// Makes sure `run_dir/mtb.bin` exists, linking it to the first `*.dat`
/// file under `run_dir` if needed.
pub fn ensure_raw_link(run_dir: &Path) -> Result<RawLink, ToolError> {
    let link = run_dir.join(RAW_LINK_NAME);
    if fs::symlink_metadata(&link).is_ok() {
        return Ok(RawLink::Existing);
    }
    if !run_dir.is_dir() {
        return Err(ToolError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("processing directory not found: {}", run_dir.display()),
        )));
    }

    let raw = WalkDir::new(run_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| !entry.file_type().is_dir())
        .find(|entry| entry.file_name().to_string_lossy().ends_with(".dat"));

    let Some(raw) = raw else {
        warn!(dir = %run_dir.display(), "No .dat file to link");
        return Ok(RawLink::NoRawData);
    };

    let target = raw
        .path()
        .strip_prefix(run_dir)
        .unwrap_or(raw.path())
        .to_path_buf();
    crate::registry::link::symlink(&target, &link)?;
    info!(link = %link.display(), target = %target.display(), "Linked raw data");
    Ok(RawLink::Created(target))
}
