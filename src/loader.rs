//! Per-cycle dataset loading.
//!
//! Reads `{PREFIX}_{CYCLE}.csv` files, tags every row with its cycle, and
//! stacks the cycles into one table per dataset. Absent or unreadable files
//! are skipped with a warning so a dataset that exists in only some cycles
//! still loads partially.

use crate::constants::{CYCLE_COLUMN, CYCLE_YEARS_COLUMN, DELIMITED_EXTENSION};
use crate::error::{CohortError, Result};
use crate::models::{Cycle, CycleCoverage};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A dataset stacked across cycles, with the cycles that contributed to it
#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub prefix: String,
    pub frame: DataFrame,
    pub coverage: CycleCoverage,
}

impl LoadedTable {
    fn empty(prefix: &str, missing: Vec<Cycle>) -> Self {
        Self {
            prefix: prefix.to_string(),
            frame: DataFrame::empty(),
            coverage: CycleCoverage {
                loaded: Vec::new(),
                missing,
                rows: 0,
            },
        }
    }

    /// No cycle contributed any rows
    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }
}

/// Loader for NHANES extracts stored as flat delimited files
#[derive(Debug, Clone)]
pub struct DatasetLoader {
    data_dir: PathBuf,
}

impl DatasetLoader {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of the file for one dataset and cycle
    pub fn cycle_path(&self, prefix: &str, cycle: Cycle) -> PathBuf {
        self.data_dir
            .join(format!("{}_{}.{}", prefix, cycle.code(), DELIMITED_EXTENSION))
    }

    /// Load a single cycle, tagged with its cycle columns.
    ///
    /// Returns `None` when the file is absent or cannot be read; both cases
    /// are logged and never abort the run.
    pub fn load_cycle(&self, prefix: &str, cycle: Cycle) -> Option<DataFrame> {
        let path = self.cycle_path(prefix, cycle);

        if !path.exists() {
            warn!("{} not found, skipping cycle {}", path.display(), cycle);
            return None;
        }

        let frame = match read_as_text(&path).and_then(|frame| tag_cycle(frame, cycle)) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Error loading {}: {}", path.display(), e);
                return None;
            }
        };

        debug!("Loaded {}: {} rows", path.display(), frame.height());
        Some(frame)
    }

    /// Load and stack a dataset across cycles.
    ///
    /// Cycles with differing column sets are stacked diagonally, filling
    /// absent columns with nulls. Zero available cycles gives an empty table,
    /// not an error.
    pub fn load_all(&self, prefix: &str, cycles: &[Cycle]) -> Result<LoadedTable> {
        let mut frames = Vec::new();
        let mut loaded = Vec::new();
        let mut missing = Vec::new();

        for &cycle in cycles {
            match self.load_cycle(prefix, cycle) {
                Some(frame) => {
                    frames.push(frame.lazy());
                    loaded.push(cycle);
                }
                None => missing.push(cycle),
            }
        }

        if frames.is_empty() {
            warn!("No cycles available for {}", prefix);
            return Ok(LoadedTable::empty(prefix, missing));
        }

        let frame = if frames.len() == 1 {
            frames.remove(0).collect()?
        } else {
            concat_lf_diagonal(frames, UnionArgs::default())?.collect()?
        };

        info!(
            "Combined {}: {} total rows from {} cycles",
            prefix,
            frame.height(),
            loaded.len()
        );

        Ok(LoadedTable {
            prefix: prefix.to_string(),
            coverage: CycleCoverage {
                loaded,
                missing,
                rows: frame.height(),
            },
            frame,
        })
    }

    /// Load a cycle-independent reference file such as `DSBI.csv`
    pub fn load_reference(&self, name: &str) -> Option<DataFrame> {
        let path = self
            .data_dir
            .join(format!("{}.{}", name, DELIMITED_EXTENSION));

        if !path.exists() {
            warn!("Reference file {} not found", path.display());
            return None;
        }

        match read_as_text(&path) {
            Ok(frame) => {
                debug!("Loaded reference {}: {} rows", path.display(), frame.height());
                Some(frame)
            }
            Err(e) => {
                warn!("Error loading {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// Read every column as text; numeric coercion is the harmonizer's job
fn read_as_text(path: &Path) -> PolarsResult<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()
}

fn tag_cycle(frame: DataFrame, cycle: Cycle) -> PolarsResult<DataFrame> {
    frame
        .lazy()
        .with_columns([
            lit(cycle.code()).alias(CYCLE_COLUMN),
            lit(cycle.years()).alias(CYCLE_YEARS_COLUMN),
        ])
        .collect()
}

/// Dataset prefixes found in a data directory, with the cycles present for each
pub fn scan_inventory(data_dir: &Path) -> Result<BTreeMap<String, Vec<Cycle>>> {
    let pattern = format!(
        "{}/*_*.{}",
        glob::Pattern::escape(&data_dir.to_string_lossy()),
        DELIMITED_EXTENSION
    );
    debug!("Scanning inventory with pattern: {}", pattern);

    let entries = glob::glob(&pattern)
        .map_err(|e| CohortError::configuration(format!("invalid data directory: {}", e)))?;

    let mut inventory: BTreeMap<String, Vec<Cycle>> = BTreeMap::new();
    for entry in entries {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };

        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Some((prefix, code)) = stem.rsplit_once('_') else {
            continue;
        };
        match code.parse::<Cycle>() {
            Ok(cycle) => {
                let cycles = inventory.entry(prefix.to_string()).or_default();
                cycles.push(cycle);
                cycles.sort();
            }
            Err(_) => debug!("Ignoring {} with unrecognised cycle suffix", path.display()),
        }
    }

    Ok(inventory)
}
