//! Pipeline stages and the per-run marker files that record their progress.
//!
//! Each stage that touches a run brackets its work with two empty sentinel
//! files inside the run directory: `.begin_<stage>` before the external
//! action starts and `.end_<stage>` once it has finished. The pair encodes
//! the stage state for that run:
//!
//! | `.begin_*` | `.end_*` | state         |
//! |------------|----------|---------------|
//! | absent     | absent   | `NotStarted`  |
//! | present    | absent   | `Running`     |
//! | any        | present  | `Done`        |
//!
//! Marker file names are only ever produced by [`MarkerName::file_name`].

pub mod store;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use store::MarkerStore;

use crate::error::MarkerError;

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Snapshot the incoming DAQ directory into the registry file.
    Discover,
    /// Create run directories and link raw files into them.
    Link,
    /// Conversion, clustering and histogramming.
    Process,
    /// Raw data integrity check.
    Validate,
    /// Publish DQM results.
    Publish,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Discover,
        Stage::Link,
        Stage::Process,
        Stage::Validate,
        Stage::Publish,
    ];

    /// Short name used to namespace marker files and on the command line.
    pub fn short_name(&self) -> &'static str {
        match self {
            Stage::Discover => "update_db",
            Stage::Link => "ln_runs",
            Stage::Process => "eut_dqm",
            Stage::Validate => "chk_dat",
            Stage::Publish => "pub_dqm",
        }
    }

    /// Stages whose `end` marker must be set before this stage is proposed
    /// for a run.
    pub fn upstream(&self) -> &'static [Stage] {
        match self {
            Stage::Publish => &[Stage::Process, Stage::Validate],
            _ => &[],
        }
    }

    /// Returns true if the stage keeps per-run markers.
    pub fn is_per_run(&self) -> bool {
        matches!(self, Stage::Process | Stage::Validate | Stage::Publish)
    }

    pub fn begin_marker(&self) -> MarkerName {
        MarkerName::Stage {
            stage: *self,
            phase: Phase::Begin,
        }
    }

    pub fn end_marker(&self) -> MarkerName {
        MarkerName::Stage {
            stage: *self,
            phase: Phase::End,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for Stage {
    type Err = MarkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "discover" | "update_db" => Ok(Stage::Discover),
            "link" | "ln_runs" => Ok(Stage::Link),
            "process" | "eut_dqm" => Ok(Stage::Process),
            "validate" | "chk_dat" => Ok(Stage::Validate),
            "publish" | "pub_dqm" => Ok(Stage::Publish),
            _ => Err(MarkerError::UnknownMarker(s.to_string())),
        }
    }
}

/// Which side of a stage execution a marker records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Begin,
    End,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Begin => "begin",
            Phase::End => "end",
        }
    }
}

/// Markers left behind by the retired full-processing chain. They are still
/// reported by `status` and can be touched or removed by the operator, but
/// no stage sets them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegacyMarker {
    BeginEutFul,
    EndEutFul,
    EndPubFul,
    EndChkDataIntegrity,
}

impl LegacyMarker {
    pub const ALL: [LegacyMarker; 4] = [
        LegacyMarker::BeginEutFul,
        LegacyMarker::EndEutFul,
        LegacyMarker::EndPubFul,
        LegacyMarker::EndChkDataIntegrity,
    ];

    fn stem(&self) -> &'static str {
        match self {
            LegacyMarker::BeginEutFul => "begin_eut_ful",
            LegacyMarker::EndEutFul => "end_eut_ful",
            LegacyMarker::EndPubFul => "end_pub_ful",
            LegacyMarker::EndChkDataIntegrity => "end_chk_data_integrity",
        }
    }
}

/// A marker file name, either a stage phase or a legacy alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerName {
    Stage { stage: Stage, phase: Phase },
    Legacy(LegacyMarker),
}

impl MarkerName {
    /// The sentinel file name inside the run directory.
    pub fn file_name(&self) -> String {
        match self {
            MarkerName::Stage { stage, phase } => {
                format!(".{}_{}", phase.as_str(), stage.short_name())
            }
            MarkerName::Legacy(legacy) => format!(".{}", legacy.stem()),
        }
    }
}

impl fmt::Display for MarkerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

impl FromStr for MarkerName {
    type Err = MarkerError;

    /// Accepts the file name with or without the leading dot
    /// (`.end_eut_dqm`, `end_eut_dqm`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stem = s.trim().trim_start_matches('.');

        if let Some(legacy) = LegacyMarker::ALL.iter().find(|l| l.stem() == stem) {
            return Ok(MarkerName::Legacy(*legacy));
        }

        let (phase, stage) = if let Some(rest) = stem.strip_prefix("begin_") {
            (Phase::Begin, rest)
        } else if let Some(rest) = stem.strip_prefix("end_") {
            (Phase::End, rest)
        } else {
            return Err(MarkerError::UnknownMarker(s.to_string()));
        };

        let stage: Stage = stage
            .parse()
            .map_err(|_| MarkerError::UnknownMarker(s.to_string()))?;
        if !stage.is_per_run() {
            return Err(MarkerError::UnknownMarker(s.to_string()));
        }
        Ok(MarkerName::Stage { stage, phase })
    }
}

/// Progress of one stage for one run, as recorded by its markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    NotStarted,
    Running,
    Done,
}

impl StageState {
    pub fn from_markers(has_begin: bool, has_end: bool) -> Self {
        match (has_begin, has_end) {
            (_, true) => StageState::Done,
            (true, false) => StageState::Running,
            (false, false) => StageState::NotStarted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_marker_file_names() {
        assert_eq!(Stage::Process.begin_marker().file_name(), ".begin_eut_dqm");
        assert_eq!(Stage::Process.end_marker().file_name(), ".end_eut_dqm");
        assert_eq!(Stage::Validate.end_marker().file_name(), ".end_chk_dat");
        assert_eq!(Stage::Publish.begin_marker().file_name(), ".begin_pub_dqm");
    }

    #[test]
    fn test_marker_name_round_trips_through_file_name() {
        for stage in Stage::ALL.iter().filter(|s| s.is_per_run()) {
            for marker in [stage.begin_marker(), stage.end_marker()] {
                assert_eq!(marker.file_name().parse::<MarkerName>().unwrap(), marker);
            }
        }
        for legacy in LegacyMarker::ALL {
            let marker = MarkerName::Legacy(legacy);
            assert_eq!(marker.file_name().parse::<MarkerName>().unwrap(), marker);
        }
    }

    #[test]
    fn test_marker_name_without_dot() {
        let marker: MarkerName = "end_chk_dat".parse().unwrap();
        assert_eq!(marker, Stage::Validate.end_marker());
    }

    #[test]
    fn test_unknown_markers_are_rejected() {
        assert!(".end_nothing".parse::<MarkerName>().is_err());
        assert!("mtb.bin".parse::<MarkerName>().is_err());
        assert!(".end_update_db".parse::<MarkerName>().is_err());
    }

    #[test]
    fn test_publish_upstream() {
        assert_eq!(Stage::Publish.upstream(), &[Stage::Process, Stage::Validate]);
        assert!(Stage::Process.upstream().is_empty());
        assert!(Stage::Validate.upstream().is_empty());
    }

    #[test]
    fn test_stage_from_str_accepts_both_names() {
        assert_eq!("process".parse::<Stage>().unwrap(), Stage::Process);
        assert_eq!("eut-dqm".parse::<Stage>().unwrap(), Stage::Process);
        assert_eq!("pub_dqm".parse::<Stage>().unwrap(), Stage::Publish);
        assert!("convert".parse::<Stage>().is_err());
    }

    #[test]
    fn test_state_from_markers() {
        assert_eq!(StageState::from_markers(false, false), StageState::NotStarted);
        assert_eq!(StageState::from_markers(true, false), StageState::Running);
        assert_eq!(StageState::from_markers(true, true), StageState::Done);
        assert_eq!(StageState::from_markers(false, true), StageState::Done);
    }
}
