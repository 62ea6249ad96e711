//! The `run` command: full cohort derivation

use crate::cli::args::RunArgs;
use crate::cli::commands::shared::setup_logging;
use crate::models::ProcessingStats;
use crate::processor::CohortProcessor;
use anyhow::{Context, Result};
use tracing::info;

pub fn run_pipeline(args: RunArgs) -> Result<ProcessingStats> {
    setup_logging(args.get_log_level(), args.quiet)?;

    let config = args.to_config().context("Invalid configuration")?;
    info!(
        "Cycles: {}",
        config
            .cycles
            .iter()
            .map(|c| c.code())
            .collect::<Vec<_>>()
            .join(",")
    );

    let data_dir = config.data_dir.clone();
    let processor = CohortProcessor::new(config)
        .with_context(|| format!("Cannot start pipeline on {}", data_dir.display()))?
        .with_progress(args.show_progress());

    let stats = processor.process().context("Cohort derivation failed")?;
    info!(
        "Finished in {} ms: {} subjects in cohort",
        stats.processing_time_ms, stats.cohort_size
    );
    Ok(stats)
}
