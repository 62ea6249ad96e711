//! NHANES IDWA Cohort Library
//!
//! Derives an analytic cohort for studying iron deficiency without anemia
//! (IDWA) in non-pregnant women of reproductive age from pooled NHANES
//! survey cycles.
//!
//! This library provides tools for:
//! - Loading per-cycle extracts and harmonizing their columns
//! - Merging datasets per subject with explicit join disciplines
//! - Applying the inclusion cascade with an exclusion ledger
//! - Deriving biomarker, supplement, weight and demographic indicators
//! - Writing the analytic table, summary tables and a JSON run summary

pub mod cohort;
pub mod config;
pub mod constants;
pub mod derive;
pub mod error;
pub mod loader;
pub mod merge;
pub mod models;
pub mod processor;
pub mod records;
pub mod schema;
pub mod summary;

// CLI modules
pub mod cli {
    pub mod args;
    pub mod commands;
}

// Re-export commonly used types
pub use cohort::{ExclusionLedger, InclusionCascade, InclusionCriterion};
pub use config::StudyConfig;
pub use error::{CohortError, Result};
pub use models::{Cycle, DatasetKind, ProcessingStats, SubjectRecord};
pub use processor::CohortProcessor;
