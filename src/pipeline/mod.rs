//! Run processing pipeline.
//!
//! A dataset moves through five stages:
//!
//! 1. **update_db** (`Stage::Discover`): snapshot the DAQ incoming directory
//! 2. **ln_runs** (`Stage::Link`): create run directories and link new files
//! 3. **eut_dqm** (`Stage::Process`): conversion, clustering and histograms
//! 4. **chk_dat** (`Stage::Validate`): raw data integrity check
//! 5. **pub_dqm** (`Stage::Publish`): publish DQM plots, once 3 and 4 are done
//!
//! The last three run per run and record their progress as marker files in
//! the run directory. A run whose begin marker exists without its end marker
//! is either still running or failed; it is not picked up again until an
//! operator forces it (a single-run invocation) or removes the marker.
//!
//! # Example
//!
//! ```rust,ignore
//! use testbeam_dqm::config::DatasetConfig;
//! use testbeam_dqm::pipeline::PipelineDriver;
//!
//! let config = DatasetConfig::default().apply_env()?;
//! let mut driver = PipelineDriver::from_config(config);
//!
//! // Everything that is new since the last invocation.
//! driver.run_default().await?;
//!
//! // Re-run all stages for a few runs, regardless of their markers.
//! driver.run_range("20001,20005-20006").await?;
//! ```

pub mod driver;
pub mod runner;
pub mod selector;
pub mod status;

pub use driver::{PipelineDriver, Removal, RUN_STAGES};
pub use runner::{
    ensure_raw_link, RawLink, SkipReason, StageOutcome, StageReport, StageRunner, Toolset,
    RAW_LINK_NAME,
};
pub use selector::{explicit_runs, StageSelector};
pub use status::RunStatus;
