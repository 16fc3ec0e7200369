//! CLI command definitions for testbeam-dqm.
//!
//! Without arguments the full pipeline runs over everything new. A run or
//! run range as the only argument takes those runs through every per-run
//! stage. Subcommands run a single stage or one of the marker utilities.

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::DatasetConfig;
use crate::markers::{MarkerName, Stage};
use crate::pipeline::{PipelineDriver, Removal, StageReport};
use crate::runs::{looks_like_range, RunId};

/// Data quality monitoring pipeline for test beam runs.
#[derive(Parser)]
#[command(name = "testbeam-dqm")]
#[command(about = "Discover, process, validate and publish test beam runs")]
#[command(version)]
#[command(
    long_about = "testbeam-dqm discovers new runs written by the DAQ, links them into the run storage, and takes each run through processing, integrity checking and publishing.\n\nProgress is kept as marker files inside every run directory.\n\nExample usage:\n  testbeam-dqm                   # everything new\n  testbeam-dqm 20001-20005       # force all stages for a range\n  testbeam-dqm chk-dat 20003     # re-check one run"
)]
pub struct Cli {
    /// The subcommand to execute. Runs the full pipeline when omitted.
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Run or run range to take through every stage (e.g. 20001,20005-20006).
    #[arg(value_parser = parse_run_range)]
    pub range: Option<String>,

    /// Dataset configuration file (YAML). Defaults to the built-in dataset.
    #[arg(short, long, env = "DQM_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Snapshot the DAQ incoming directory into the run registry.
    #[command(name = "update-db", aliases = ["update_db", "discover"])]
    UpdateDb,

    /// Create run directories for new runs and link their raw files.
    #[command(name = "ln-runs", aliases = ["ln_runs", "link"])]
    LnRuns,

    /// Convert, cluster and histogram runs.
    #[command(name = "eut-dqm", aliases = ["eut_dqm", "process"])]
    EutDqm(RunArgs),

    /// Check the integrity of raw run data.
    #[command(name = "chk-dat", aliases = ["chk_dat", "validate"])]
    ChkDat(RunArgs),

    /// Publish DQM results of processed and checked runs.
    #[command(name = "pub-dqm", aliases = ["pub_dqm", "publish"])]
    PubDqm(RunArgs),

    /// Show which stages have finished for each run.
    Status(StatusArgs),

    /// Create a marker file in runs.
    #[command(aliases = ["batch_touch"])]
    Touch(TouchArgs),

    /// Delete a marker file from runs.
    #[command(aliases = ["batch_rm"])]
    Rm(RmArgs),

    /// List runs that contain a marker file.
    Find(FindArgs),
}

impl Commands {
    fn stage(&self) -> Option<Stage> {
        match self {
            Commands::EutDqm(_) => Some(Stage::Process),
            Commands::ChkDat(_) => Some(Stage::Validate),
            Commands::PubDqm(_) => Some(Stage::Publish),
            _ => None,
        }
    }
}

/// Runs for a single stage.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// One run range, or several run numbers. A single run is always
    /// executed, even if already done. Without runs, every eligible run.
    pub runs: Vec<String>,
}

/// Arguments for `testbeam-dqm status`.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Runs to report. Defaults to every valid run.
    pub runs: Vec<String>,

    /// Output JSON instead of a table.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `testbeam-dqm touch`.
#[derive(Parser, Debug)]
pub struct TouchArgs {
    /// Marker file name, e.g. `.end_eut_dqm`.
    pub marker: MarkerName,

    /// Runs to mark. Defaults to every valid run.
    pub runs: Vec<String>,
}

/// Arguments for `testbeam-dqm rm`.
#[derive(Parser, Debug)]
pub struct RmArgs {
    /// Marker file name, e.g. `.begin_chk_dat`.
    pub marker: MarkerName,

    /// Runs to clear. Required.
    #[arg(required = true)]
    pub runs: Vec<String>,
}

/// Arguments for `testbeam-dqm find`.
#[derive(Parser, Debug)]
pub struct FindArgs {
    /// Marker file name to look for.
    pub marker: MarkerName,

    /// Output JSON instead of one run per line.
    #[arg(short = 'j', long)]
    pub json: bool,
}

fn parse_run_range(value: &str) -> Result<String, String> {
    if looks_like_range(value) {
        Ok(value.to_string())
    } else {
        Err(format!(
            "'{}' is neither a command nor a run range (expected e.g. 20001 or 20001-20005)",
            value
        ))
    }
}

/// Parse CLI arguments and return the Cli struct.
/// This allows main.rs to access log_level before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    info!(dataset = %config.name, data_dir = %config.data_dir.display(), "Loaded configuration");
    let mut driver = PipelineDriver::from_config(config);

    match (cli.command, cli.range) {
        (Some(_), Some(range)) => {
            anyhow::bail!("a run range ('{}') cannot be combined with a subcommand", range)
        }
        (None, None) => {
            let reports = driver.run_default().await?;
            print_reports(&reports);
        }
        (None, Some(range)) => {
            let reports = driver.run_range(&range).await?;
            print_reports(&reports);
        }
        (Some(command), None) => run_command(&mut driver, command).await?,
    }
    Ok(())
}

async fn run_command(driver: &mut PipelineDriver, command: Commands) -> anyhow::Result<()> {
    if let Some(stage) = command.stage() {
        let runs = match command {
            Commands::EutDqm(args) | Commands::ChkDat(args) | Commands::PubDqm(args) => args.runs,
            _ => Vec::new(),
        };
        let report = driver.run_stage(stage, &runs).await?;
        print_reports(std::slice::from_ref(&report));
        return Ok(());
    }

    match command {
        Commands::UpdateDb => {
            let update = driver.discover()?;
            println!(
                "✓ {} {}",
                driver.registry().snapshot_file().path().display(),
                update
            );
        }
        Commands::LnRuns => {
            let linked = driver.link()?;
            println!("✓ Linked {} new run(s)", linked.len());
            for run in linked {
                println!("  {}", run);
            }
        }
        Commands::Status(args) => {
            let report = driver.status(&args.runs)?;
            if args.json {
                let json_output = serde_json::to_string_pretty(&report)
                    .map_err(|e| anyhow::anyhow!("Failed to serialize JSON output: {}", e))?;
                println!("{}", json_output);
            } else {
                let complete = report.iter().filter(|status| status.is_complete()).count();
                for status in &report {
                    println!("{}", status);
                }
                println!("{} of {} run(s) complete", complete, report.len());
            }
        }
        Commands::Touch(args) => {
            let runs = driver.touch(args.marker, &args.runs)?;
            println!("✓ Set {} on {} run(s)", args.marker, runs.len());
        }
        Commands::Rm(args) => {
            for (run, removal) in driver.remove(args.marker, &args.runs)? {
                let outcome = match removal {
                    Removal::Removed => "OK",
                    Removal::AlreadyAbsent => "already removed",
                };
                println!("[rm file] run {}, {} ... {}", run, args.marker, outcome);
            }
        }
        Commands::Find(args) => {
            let runs = driver.find(args.marker)?;
            if args.json {
                #[derive(Serialize)]
                struct FindOutput<'a> {
                    marker: String,
                    runs: &'a [RunId],
                }

                let output = FindOutput {
                    marker: args.marker.to_string(),
                    runs: &runs,
                };
                let json_output = serde_json::to_string_pretty(&output)
                    .map_err(|e| anyhow::anyhow!("Failed to serialize JSON output: {}", e))?;
                println!("{}", json_output);
            } else {
                for run in runs {
                    println!("{}", run);
                }
            }
        }
        Commands::EutDqm(_) | Commands::ChkDat(_) | Commands::PubDqm(_) => {}
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<DatasetConfig> {
    let config = match path {
        Some(path) => DatasetConfig::from_file(path)?,
        None => DatasetConfig::default(),
    };
    let config = config.apply_env()?;
    config.validate()?;
    Ok(config)
}

fn print_reports(reports: &[StageReport]) {
    for report in reports {
        if report.candidates() == 0 {
            println!("[{}] nothing to do", report.stage);
            continue;
        }
        println!(
            "[{}] {} completed, {} skipped, {} failed{}",
            report.stage,
            report.completed.len(),
            report.skipped.len(),
            report.failed.len(),
            if report.forced { " (forced)" } else { "" }
        );
        for (run, reason) in &report.failed {
            warn!(run = %run, stage = %report.stage, "{}", reason);
            println!("  ✗ {}: {}", run, reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_arguments_runs_default_pipeline() {
        let cli = Cli::try_parse_from(["testbeam-dqm"]).expect("should parse");
        assert!(cli.command.is_none());
        assert!(cli.range.is_none());
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_positional_range() {
        let cli = Cli::try_parse_from(["testbeam-dqm", "20001,20005-20006"]).expect("should parse");
        assert!(cli.command.is_none());
        assert_eq!(cli.range.as_deref(), Some("20001,20005-20006"));
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        assert!(Cli::try_parse_from(["testbeam-dqm", "eut_full"]).is_err());
    }

    #[test]
    fn test_stage_commands_and_aliases() {
        let cli = Cli::try_parse_from(["testbeam-dqm", "eut_dqm", "20001-20003"])
            .expect("should parse");
        match cli.command {
            Some(Commands::EutDqm(args)) => assert_eq!(args.runs, vec!["20001-20003"]),
            _ => panic!("Expected EutDqm command"),
        }

        let cli = Cli::try_parse_from(["testbeam-dqm", "chk-dat", "20001", "20004"])
            .expect("should parse");
        match cli.command {
            Some(Commands::ChkDat(args)) => assert_eq!(args.runs, vec!["20001", "20004"]),
            _ => panic!("Expected ChkDat command"),
        }

        let cli = Cli::try_parse_from(["testbeam-dqm", "update_db"]).expect("should parse");
        assert!(matches!(cli.command, Some(Commands::UpdateDb)));
    }

    #[test]
    fn test_marker_commands_parse_marker_names() {
        let cli = Cli::try_parse_from(["testbeam-dqm", "touch", ".end_eut_dqm"])
            .expect("should parse");
        match cli.command {
            Some(Commands::Touch(args)) => {
                assert_eq!(args.marker, Stage::Process.end_marker());
                assert!(args.runs.is_empty());
            }
            _ => panic!("Expected Touch command"),
        }

        assert!(Cli::try_parse_from(["testbeam-dqm", "touch", ".end_bogus"]).is_err());
    }

    #[test]
    fn test_rm_requires_runs() {
        assert!(Cli::try_parse_from(["testbeam-dqm", "rm", ".begin_chk_dat"]).is_err());
        let cli = Cli::try_parse_from(["testbeam-dqm", "rm", ".begin_chk_dat", "20001"])
            .expect("should parse");
        assert!(matches!(cli.command, Some(Commands::Rm(_))));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "testbeam-dqm",
            "status",
            "--json",
            "--config",
            "psi2013.yaml",
            "-l",
            "debug",
        ])
        .expect("should parse");
        assert_eq!(cli.config, Some(PathBuf::from("psi2013.yaml")));
        assert_eq!(cli.log_level, "debug");
        match cli.command {
            Some(Commands::Status(args)) => assert!(args.json),
            _ => panic!("Expected Status command"),
        }
    }
}
