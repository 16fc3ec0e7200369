//! Run identifiers and run-range resolution.
//!
//! A run is one detector data-taking session. On disk and on the command
//! line it is written as a six-digit zero-padded decimal number
//! (`020001`), which keeps lexicographic and numeric order identical.

pub mod range;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use range::{looks_like_range, parse_range};

use crate::error::RangeError;

/// Width that run numbers are zero-padded to.
pub const RUN_ID_WIDTH: usize = 6;

/// Largest run number that fits in [`RUN_ID_WIDTH`] digits.
pub const MAX_RUN_NUMBER: u32 = 999_999;

/// A detector run number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId(u32);

impl RunId {
    /// Creates a run identifier from its numeric value.
    pub fn new(number: u32) -> Self {
        Self(number)
    }

    /// Returns the numeric value of the run.
    pub fn number(&self) -> u32 {
        self.0
    }

    /// Returns true if the run lies inside the inclusive bounds.
    pub fn is_within(&self, bounds: &RunBounds) -> bool {
        bounds.contains(*self)
    }

    /// Reads a run directory name. Only the canonical zero-padded form is
    /// accepted, so the run maps back to the same directory.
    pub fn from_dir_name(name: &str) -> Option<Self> {
        let run: RunId = name.parse().ok()?;
        (run.to_string() == name).then_some(run)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$}", self.0, width = RUN_ID_WIDTH)
    }
}

impl FromStr for RunId {
    type Err = RangeError;

    /// Parses a purely numeric run name. Leading zeros are accepted; the
    /// value must fit in six digits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(RangeError::InvalidToken(s.to_string()));
        }
        match trimmed.parse::<u32>() {
            Ok(number) if number <= MAX_RUN_NUMBER => Ok(RunId(number)),
            _ => Err(RangeError::InvalidToken(s.to_string())),
        }
    }
}

impl Serialize for RunId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RunId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Inclusive range of run numbers accepted for a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunBounds {
    pub begin: u32,
    pub end: u32,
}

impl RunBounds {
    pub fn new(begin: u32, end: u32) -> Self {
        Self { begin, end }
    }

    pub fn contains(&self, run: RunId) -> bool {
        run.number() >= self.begin && run.number() <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_zero_padded() {
        assert_eq!(RunId::new(20001).to_string(), "020001");
        assert_eq!(RunId::new(7).to_string(), "000007");
    }

    #[test]
    fn test_from_str_accepts_padded_and_bare() {
        assert_eq!("020001".parse::<RunId>().unwrap(), RunId::new(20001));
        assert_eq!("20001".parse::<RunId>().unwrap(), RunId::new(20001));
    }

    #[test]
    fn test_from_str_rejects_non_numeric() {
        assert!("run1".parse::<RunId>().is_err());
        assert!("".parse::<RunId>().is_err());
        assert!("-1".parse::<RunId>().is_err());
    }

    #[test]
    fn test_from_str_rejects_more_than_six_digits() {
        assert_eq!("999999".parse::<RunId>().unwrap(), RunId::new(999_999));
        assert!("1000000".parse::<RunId>().is_err());
        assert!("4000000000".parse::<RunId>().is_err());
        assert!("99999999999".parse::<RunId>().is_err());
    }

    #[test]
    fn test_from_dir_name_requires_canonical_form() {
        assert_eq!(RunId::from_dir_name("020001"), Some(RunId::new(20001)));
        assert_eq!(RunId::from_dir_name("20001"), None);
        assert_eq!(RunId::from_dir_name("0020001"), None);
        assert_eq!(RunId::from_dir_name(" 020001"), None);
        assert_eq!(RunId::from_dir_name("scratch"), None);
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let bounds = RunBounds::new(20001, 50001);
        assert!(bounds.contains(RunId::new(20001)));
        assert!(bounds.contains(RunId::new(50001)));
        assert!(!bounds.contains(RunId::new(20000)));
        assert!(!bounds.contains(RunId::new(50002)));
    }

    #[test]
    fn test_serde_uses_padded_string() {
        let json = serde_json::to_string(&RunId::new(20005)).unwrap();
        assert_eq!(json, "\"020005\"");
        let back: RunId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, RunId::new(20005));
    }
}
