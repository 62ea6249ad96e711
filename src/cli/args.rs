//! Command-line argument definitions for the IDWA cohort pipeline
//!
//! Defines the CLI interface using the clap derive API. Flags are layered on
//! top of the defaults and an optional JSON configuration file.

use crate::config::StudyConfig;
use crate::error::{CohortError, Result};
use crate::models::Cycle;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;

/// CLI arguments for the NHANES IDWA pipeline
///
/// Derives an analytic cohort of non-pregnant women aged 18-45 from pooled
/// NHANES cycles and classifies iron deficiency without anemia.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "nhanes-idwa",
    version,
    about = "Derive an iron deficiency without anemia (IDWA) cohort from pooled NHANES cycles",
    long_about = "Loads per-cycle NHANES extracts, merges them per subject, applies the \
                  inclusion cascade, derives iron status, supplement and demographic \
                  indicators, rescales survey weights and writes the analytic table, \
                  exclusion ledger, summary tables and a JSON run summary."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Run the full cohort derivation pipeline
    Run(RunArgs),
    /// Report which cycles are present for each dataset prefix
    Inventory(InventoryArgs),
}

/// Arguments for the run command
#[derive(Debug, Clone, Parser)]
pub struct RunArgs {
    /// Directory holding `{PREFIX}_{CYCLE}.csv` files
    #[arg(
        short = 'i',
        long = "data-dir",
        value_name = "PATH",
        help = "Directory holding the per-cycle NHANES CSV files"
    )]
    pub data_dir: Option<PathBuf>,

    /// Output directory; created if it does not exist
    #[arg(
        short = 'o',
        long = "output-dir",
        value_name = "PATH",
        help = "Directory receiving the analytic table, ledger, tables and run summary"
    )]
    pub output_dir: Option<PathBuf>,

    /// Survey cycles to pool (comma-separated letters)
    #[arg(
        long = "cycles",
        value_name = "LIST",
        help = "Comma-separated cycle letters, e.g. D,E,F",
        long_help = "Survey cycles to load as a comma-separated list of file suffix letters.\n\
                     Available cycles: D (2005-2006), E, F, G, H, I, J (2017-2018), L (2021-2022).\n\n\
                     If not specified, all eight cycles are loaded."
    )]
    pub cycles: Option<CycleList>,

    /// JSON configuration file
    ///
    /// Keys that are absent keep their defaults. Command-line flags override
    /// values from the file.
    #[arg(
        short = 'c',
        long = "config",
        value_name = "FILE",
        help = "Path to configuration file (JSON format)"
    )]
    pub config_file: Option<PathBuf>,

    /// Divide exam weights by this many cycles instead of the number in the cohort
    #[arg(long = "pooled-cycles", value_name = "COUNT")]
    pub pooled_cycles: Option<usize>,

    /// Skip the descriptive summary tables
    #[arg(long = "no-tables")]
    pub no_tables: bool,

    /// Logging verbosity level
    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        help = "Increase logging verbosity (-v: debug, -vv: trace)"
    )]
    pub verbose: u8,

    /// Only show warnings and errors; hides the spinner and run summary
    #[arg(short = 'q', long = "quiet", conflicts_with = "verbose")]
    pub quiet: bool,
}

impl RunArgs {
    pub fn get_log_level(&self) -> &'static str {
        log_level(self.verbose, self.quiet)
    }

    pub fn show_progress(&self) -> bool {
        !self.quiet
    }

    /// Defaults, then the JSON file, then flags
    pub fn to_config(&self) -> Result<StudyConfig> {
        let mut config = match &self.config_file {
            Some(path) => StudyConfig::from_json_file(path)?,
            None => StudyConfig::default(),
        };

        if let Some(data_dir) = &self.data_dir {
            config = config.with_data_dir(data_dir);
        }
        if let Some(output_dir) = &self.output_dir {
            config = config.with_output_dir(output_dir);
        }
        if let Some(cycles) = &self.cycles {
            config = config.with_cycles(cycles.cycles.clone());
        }
        if let Some(pooled) = self.pooled_cycles {
            config = config.with_pooled_cycles(pooled);
        }
        if self.no_tables {
            config = config.without_tables();
        }

        config.validate()?;
        Ok(config)
    }
}

/// Arguments for the inventory command
#[derive(Debug, Clone, Parser)]
pub struct InventoryArgs {
    /// Directory holding `{PREFIX}_{CYCLE}.csv` files
    #[arg(short = 'i', long = "data-dir", value_name = "PATH")]
    pub data_dir: Option<PathBuf>,

    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl InventoryArgs {
    pub fn get_log_level(&self) -> &'static str {
        log_level(self.verbose, false)
    }
}

fn log_level(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Comma-separated list of survey cycles
#[derive(Debug, Clone, PartialEq)]
pub struct CycleList {
    pub cycles: Vec<Cycle>,
}

impl FromStr for CycleList {
    type Err = CohortError;

    fn from_str(s: &str) -> Result<Self> {
        let cycles = Cycle::parse_list(s)?;
        if cycles.is_empty() {
            return Err(CohortError::configuration(
                "cycle list is empty; expected letters such as D,E,F",
            ));
        }
        Ok(Self { cycles })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn run_args(argv: &[&str]) -> RunArgs {
        let mut full = vec!["nhanes-idwa", "run"];
        full.extend_from_slice(argv);
        match Args::parse_from(full).command {
            Some(Commands::Run(args)) => args,
            other => panic!("Expected run command, got {:?}", other),
        }
    }

    #[test]
    fn test_cycle_list_parsing() {
        let result = CycleList::from_str("D,E").unwrap();
        assert_eq!(result.cycles, vec![Cycle::D, Cycle::E]);

        let result = CycleList::from_str(" j , l ").unwrap();
        assert_eq!(result.cycles, vec![Cycle::J, Cycle::L]);

        assert!(CycleList::from_str("K").is_err());
        assert!(CycleList::from_str("").is_err());
        assert!(CycleList::from_str(",,,").is_err());
    }

    #[test]
    fn test_no_subcommand() {
        let args = Args::parse_from(["nhanes-idwa"]);
        assert!(args.command.is_none());
    }

    #[test]
    fn test_flags_override_defaults() {
        let args = run_args(&[
            "--data-dir",
            "/tmp/nhanes",
            "--cycles",
            "D,J",
            "--pooled-cycles",
            "4",
            "--no-tables",
        ]);
        let config = args.to_config().unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/nhanes"));
        assert_eq!(config.cycles, vec![Cycle::D, Cycle::J]);
        assert_eq!(config.weights.pooled_cycles, Some(4));
        assert!(!config.write_tables);
        assert_eq!(config.output_dir, PathBuf::from("output"));
    }

    #[test]
    fn test_flags_override_config_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"cycles": ["E"], "output_dir": "from_file", "inclusion": {{"max_age": 40.0}}}}"#
        )
        .unwrap();
        let path = file.path().to_string_lossy().to_string();

        let args = run_args(&["--config", &path, "--cycles", "F"]);
        let config = args.to_config().unwrap();

        assert_eq!(config.cycles, vec![Cycle::F]);
        assert_eq!(config.output_dir, PathBuf::from("from_file"));
        assert_eq!(config.inclusion.max_age, 40.0);
    }

    #[test]
    fn test_zero_pooled_cycles_rejected() {
        let args = run_args(&["--pooled-cycles", "0"]);
        assert!(args.to_config().is_err());
    }

    #[test]
    fn test_log_levels() {
        assert_eq!(run_args(&[]).get_log_level(), "info");
        assert_eq!(run_args(&["-v"]).get_log_level(), "debug");
        assert_eq!(run_args(&["-vv"]).get_log_level(), "trace");
        assert_eq!(run_args(&["-q"]).get_log_level(), "warn");
        assert!(!run_args(&["-q"]).show_progress());
    }
}
