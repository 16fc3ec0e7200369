//! Command-line interface for testbeam-dqm.
//!
//! Provides the default pipeline, per-stage commands, and the marker
//! utilities used by operators.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
