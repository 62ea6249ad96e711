//! Error handling for cohort derivation.
//!
//! File-level and value-level problems are absorbed where they occur and
//! logged; the variants here are the conditions that stop a run.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CohortError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error(
        "Critical dataset {prefix} is unavailable for every requested cycle; \
         place {prefix}_<CYCLE>.csv files in the data directory"
    )]
    CriticalDatasetMissing { prefix: String },

    #[error("Dataset {dataset} is missing required column {column}")]
    MissingColumn { dataset: String, column: String },

    #[error(
        "Dataset {dataset} has {duplicates} repeated subject identifiers; \
         aggregate to one row per subject before merging"
    )]
    DuplicateSubjects { dataset: String, duplicates: usize },

    #[error("Unknown survey cycle code: {code}")]
    UnknownCycle { code: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl CohortError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn missing_column(dataset: impl Into<String>, column: impl Into<String>) -> Self {
        Self::MissingColumn {
            dataset: dataset.into(),
            column: column.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CohortError>;
