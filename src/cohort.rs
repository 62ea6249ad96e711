//! Inclusion cascade producing the analytic cohort.
//!
//! Criteria run strictly in sequence: each sees only the survivors of the
//! one before, so a subject failing several criteria is attributed to the
//! first it fails. Every step lands in the exclusion ledger.

use crate::config::InclusionConfig;
use crate::models::SubjectRecord;
use serde::Serialize;
use tracing::info;

/// One eligibility predicate of the cascade
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InclusionCriterion {
    /// Age within `[min, max]` inclusive; missing age fails
    AgeRange { min: f64, max: f64 },
    Female,
    /// Excludes definite pregnancy only; a missing code is kept
    NotPregnant,
    HasFerritin,
    HasHemoglobin,
}

impl InclusionCriterion {
    /// Ledger label for subjects removed by this criterion
    ///
    /// The age label carries the configured bounds, e.g. `age_18_45`.
    pub fn reason(&self) -> String {
        match self {
            InclusionCriterion::AgeRange { min, max } => format!("age_{}_{}", min, max),
            InclusionCriterion::Female => "female".to_string(),
            InclusionCriterion::NotPregnant => "pregnant".to_string(),
            InclusionCriterion::HasFerritin => "missing_ferritin".to_string(),
            InclusionCriterion::HasHemoglobin => "missing_hemoglobin".to_string(),
        }
    }

    pub fn admits(&self, record: &SubjectRecord) -> bool {
        match self {
            InclusionCriterion::AgeRange { min, max } => record
                .age_years
                .is_some_and(|age| age >= *min && age <= *max),
            InclusionCriterion::Female => record.is_female(),
            InclusionCriterion::NotPregnant => !record.is_pregnant(),
            InclusionCriterion::HasFerritin => record.ferritin.is_some_and(|v| !v.is_nan()),
            InclusionCriterion::HasHemoglobin => record.hemoglobin.is_some_and(|v| !v.is_nan()),
        }
    }
}

/// Count excluded by one criterion and the sample left after it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExclusionStep {
    pub reason: String,
    pub excluded: usize,
    pub remaining: usize,
}

/// Ordered record of every cascade step
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExclusionLedger {
    pub initial: usize,
    pub steps: Vec<ExclusionStep>,
}

impl ExclusionLedger {
    pub fn total_excluded(&self) -> usize {
        self.steps.iter().map(|s| s.excluded).sum()
    }

    pub fn final_count(&self) -> usize {
        self.steps.last().map_or(self.initial, |s| s.remaining)
    }
}

/// Analytic cohort and the ledger of how it was reached
#[derive(Debug, Clone)]
pub struct CohortOutcome {
    pub cohort: Vec<SubjectRecord>,
    pub ledger: ExclusionLedger,
}

#[derive(Debug, Clone)]
pub struct InclusionCascade {
    criteria: Vec<InclusionCriterion>,
}

impl InclusionCascade {
    pub fn new(criteria: Vec<InclusionCriterion>) -> Self {
        Self { criteria }
    }

    /// Age, female, not pregnant, ferritin, hemoglobin, in that order
    pub fn study_default(inclusion: &InclusionConfig) -> Self {
        Self::new(vec![
            InclusionCriterion::AgeRange {
                min: inclusion.min_age,
                max: inclusion.max_age,
            },
            InclusionCriterion::Female,
            InclusionCriterion::NotPregnant,
            InclusionCriterion::HasFerritin,
            InclusionCriterion::HasHemoglobin,
        ])
    }

    pub fn criteria(&self) -> &[InclusionCriterion] {
        &self.criteria
    }

    pub fn apply(&self, records: Vec<SubjectRecord>) -> CohortOutcome {
        let initial = records.len();
        info!("Inclusion cascade starting with {} subjects", initial);

        let mut survivors = records;
        let mut steps = Vec::with_capacity(self.criteria.len());

        for criterion in &self.criteria {
            let before = survivors.len();
            survivors.retain(|record| criterion.admits(record));
            let remaining = survivors.len();
            let reason = criterion.reason();

            info!(
                "  {}: excluded {}, remaining {}",
                reason,
                before - remaining,
                remaining
            );
            steps.push(ExclusionStep {
                reason,
                excluded: before - remaining,
                remaining,
            });
        }

        CohortOutcome {
            cohort: survivors,
            ledger: ExclusionLedger { initial, steps },
        }
    }
}
