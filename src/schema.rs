//! Column harmonization across survey cycles.
//!
//! Each dataset kind declares an allow-list of analysis columns and the
//! subset that must be numeric. Harmonizing keeps only the allow-listed
//! columns actually present (cycles drift in which fields they publish) and
//! coerces the numeric subset, turning unparseable text into nulls.

use crate::constants::SUBJECT_ID;
use crate::error::{CohortError, Result};
use polars::prelude::*;
use tracing::debug;

/// Allow-list of columns for one dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub dataset: &'static str,
    pub keep: &'static [&'static str],
    pub numeric: &'static [&'static str],
}

impl ColumnSpec {
    pub const fn new(
        dataset: &'static str,
        keep: &'static [&'static str],
        numeric: &'static [&'static str],
    ) -> Self {
        Self {
            dataset,
            keep,
            numeric,
        }
    }

    /// Retain the allow-listed columns present in `frame` and coerce types.
    ///
    /// The subject identifier becomes `Int64` and the numeric subset becomes
    /// `Float64`; values that do not parse become null. Harmonizing an
    /// already-harmonized frame returns it unchanged.
    pub fn harmonize(&self, frame: DataFrame) -> Result<DataFrame> {
        if frame.width() == 0 {
            return Ok(frame);
        }

        let present: Vec<&str> = self
            .keep
            .iter()
            .copied()
            .filter(|name| has_column(&frame, name))
            .collect();

        let absent: Vec<&str> = self
            .keep
            .iter()
            .copied()
            .filter(|name| !present.contains(name))
            .collect();
        if !absent.is_empty() {
            debug!(
                "{}: allow-listed columns not present in any cycle: {:?}",
                self.dataset, absent
            );
        }

        let selected = frame.select(present.iter().copied())?;

        let mut casts = Vec::new();
        if present.contains(&SUBJECT_ID) {
            // Through Float64 so identifiers written as "31127.0" survive.
            casts.push(
                col(SUBJECT_ID)
                    .cast(DataType::Float64)
                    .cast(DataType::Int64),
            );
        }
        for name in self.numeric.iter().filter(|name| present.contains(name)) {
            casts.push(col(*name).cast(DataType::Float64));
        }

        if casts.is_empty() {
            return Ok(selected);
        }

        Ok(selected.lazy().with_columns(casts).collect()?)
    }
}

/// Whether a frame has a column of the given name
pub fn has_column(frame: &DataFrame, name: &str) -> bool {
    frame.get_column_index(name).is_some()
}

/// Values of a column as `f64`; an absent column reads as all-missing
pub fn f64_values(frame: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    if !has_column(frame, name) {
        return Ok(vec![None; frame.height()]);
    }
    let column = frame.column(name)?.cast(&DataType::Float64)?;
    Ok(column.f64()?.into_iter().collect())
}

/// Values of a coded column as `i64`; an absent column reads as all-missing
pub fn i64_values(frame: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    if !has_column(frame, name) {
        return Ok(vec![None; frame.height()]);
    }
    let column = frame.column(name)?.cast(&DataType::Int64)?;
    Ok(column.i64()?.into_iter().collect())
}

/// Values of a column as text; an absent column reads as all-missing
pub fn text_values(frame: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    if !has_column(frame, name) {
        return Ok(vec![None; frame.height()]);
    }
    let column = frame.column(name)?.cast(&DataType::String)?;
    Ok(column
        .str()?
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect())
}

/// Fail with an actionable error when a table lacks the subject identifier
pub fn require_subject_id(frame: &DataFrame, dataset: &str) -> Result<()> {
    if has_column(frame, SUBJECT_ID) {
        Ok(())
    } else {
        Err(CohortError::missing_column(dataset, SUBJECT_ID))
    }
}
