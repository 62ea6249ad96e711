//! Command implementations for the IDWA cohort CLI
//!
//! Each subcommand lives in its own module; this module only dispatches.

pub mod inventory;
pub mod run;
pub mod shared;

use crate::cli::args::{Args, Commands};
use anyhow::Result;

/// Dispatch to the subcommand handler
pub fn run(args: Args) -> Result<()> {
    match args.command {
        Some(Commands::Run(run_args)) => run::run_pipeline(run_args).map(|_| ()),
        Some(Commands::Inventory(inventory_args)) => inventory::run_inventory(inventory_args),
        None => Ok(()),
    }
}
