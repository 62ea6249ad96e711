//! The `inventory` command: audit data completeness before a run

use crate::cli::args::InventoryArgs;
use crate::cli::commands::shared::setup_logging;
use crate::constants::DEFAULT_DATA_DIR;
use crate::loader::scan_inventory;
use crate::models::{Cycle, DatasetKind};
use anyhow::{Context, Result};
use colored::*;
use std::path::PathBuf;

pub fn run_inventory(args: InventoryArgs) -> Result<()> {
    setup_logging(args.get_log_level(), false)?;

    let data_dir = args
        .data_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
    if !data_dir.is_dir() {
        anyhow::bail!("Data directory not found: {}", data_dir.display());
    }

    let inventory = scan_inventory(&data_dir)
        .with_context(|| format!("Failed to scan {}", data_dir.display()))?;

    println!(
        "{} {}",
        "Inventory of".bright_green().bold(),
        data_dir.display()
    );
    println!();

    let header: String = Cycle::ALL.iter().map(|c| format!(" {}", c.code())).collect();
    println!("  {:<8}{}", "Dataset".bright_white().bold(), header);

    for kind in DatasetKind::ALL {
        let present = inventory.get(kind.prefix());
        let cells: String = Cycle::ALL
            .iter()
            .map(|cycle| {
                if present.is_some_and(|cycles| cycles.contains(cycle)) {
                    format!(" {}", "+".bright_green())
                } else {
                    format!(" {}", "-".bright_black())
                }
            })
            .collect();

        let label = if kind.is_critical() && present.is_none_or(|c| c.is_empty()) {
            format!("{:<8}", kind.prefix()).bright_red().to_string()
        } else {
            format!("{:<8}", kind.prefix())
        };
        println!("  {}{}", label, cells);
    }

    let known: Vec<&str> = DatasetKind::ALL.iter().map(|k| k.prefix()).collect();
    let others: Vec<&String> = inventory
        .keys()
        .filter(|prefix| !known.contains(&prefix.as_str()))
        .collect();
    if !others.is_empty() {
        println!();
        println!(
            "  {} {}",
            "Unused prefixes:".bright_yellow(),
            others
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    Ok(())
}
