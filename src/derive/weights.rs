//! Survey weight rescaling for pooled cycles.
//!
//! The two-year examination weight is divided by the number of pooled cycles.
//! Outliers are flagged against the mean and sample standard deviation of the
//! adjusted weights over the filtered cohort, never removed.

use crate::config::WeightConfig;
use crate::constants::demo;
use crate::models::{Cycle, SubjectRecord};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Name of the adjusted weight column in outputs
pub const ADJUSTED_WEIGHT_COLUMN: &str = "WTMEC2YR_adj";

/// Derived weight fields of one subject
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightIndicators {
    pub adjusted_weight: Option<f64>,
    /// Adjusted weight more than the configured SDs from the cohort mean
    pub outlier: Option<bool>,
}

/// Totals reported after rescaling
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WeightSummary {
    pub pooled_cycles: usize,
    pub subjects_with_weight: usize,
    pub base_total: f64,
    /// Weighted population estimate
    pub adjusted_total: f64,
    pub adjusted_mean: Option<f64>,
    pub adjusted_sd: Option<f64>,
    pub outliers: usize,
}

/// Design variables for complex-sample variance estimation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurveyDesign {
    pub strata: String,
    pub psu: String,
    pub weight: String,
    /// PSUs are numbered within strata
    pub nested: bool,
    pub missing_stratum: usize,
    pub missing_psu: usize,
    pub missing_weight: usize,
}

#[derive(Debug, Clone)]
pub struct WeightAdjuster {
    config: WeightConfig,
}

impl WeightAdjuster {
    pub fn new(config: WeightConfig) -> Self {
        Self { config }
    }

    /// Configured count, or the distinct cycles represented in `records`
    pub fn pooled_cycles(&self, records: &[SubjectRecord]) -> usize {
        if let Some(n) = self.config.pooled_cycles {
            return n.max(1);
        }
        let cycles: BTreeSet<Cycle> = records.iter().filter_map(|r| r.cycle).collect();
        cycles.len().max(1)
    }

    /// Rescale every weight and flag outliers over the given cohort
    pub fn apply(&self, mut records: Vec<SubjectRecord>) -> (Vec<SubjectRecord>, WeightSummary) {
        let pooled = self.pooled_cycles(&records);
        let divisor = pooled as f64;

        for record in records.iter_mut() {
            record.weights.adjusted_weight = record
                .exam_weight
                .filter(|w| w.is_finite())
                .map(|w| w / divisor);
        }

        let adjusted: Vec<f64> = records
            .iter()
            .filter_map(|r| r.weights.adjusted_weight)
            .collect();
        let base_total: f64 = records
            .iter()
            .filter_map(|r| r.exam_weight.filter(|w| w.is_finite()))
            .sum();
        let adjusted_total: f64 = adjusted.iter().sum();
        let (mean, sd) = mean_and_sd(&adjusted);

        let limit = self.config.outlier_sd;
        for record in records.iter_mut() {
            record.weights.outlier = record.weights.adjusted_weight.map(|w| match (mean, sd) {
                (Some(mean), Some(sd)) if sd > 0.0 => (w - mean).abs() > limit * sd,
                _ => false,
            });
        }
        let outliers = records
            .iter()
            .filter(|r| r.weights.outlier == Some(true))
            .count();

        info!(
            "Weights divided by {} pooled cycles; weighted population estimate: {:.0}",
            pooled, adjusted_total
        );
        if outliers > 0 {
            warn!(
                "{} subjects have adjusted weights more than {} SD from the mean (flagged, kept)",
                outliers, limit
            );
        }

        let summary = WeightSummary {
            pooled_cycles: pooled,
            subjects_with_weight: adjusted.len(),
            base_total,
            adjusted_total,
            adjusted_mean: mean,
            adjusted_sd: sd,
            outliers,
        };
        (records, summary)
    }

    /// Describe the design variables and warn about subjects lacking them
    pub fn survey_design(&self, records: &[SubjectRecord]) -> SurveyDesign {
        let missing_stratum = records.iter().filter(|r| r.stratum.is_none()).count();
        let missing_psu = records.iter().filter(|r| r.psu.is_none()).count();
        let missing_weight = records
            .iter()
            .filter(|r| r.weights.adjusted_weight.is_none())
            .count();

        if missing_stratum + missing_psu + missing_weight > 0 {
            warn!(
                "Survey design incomplete: {} without stratum, {} without PSU, {} without weight",
                missing_stratum, missing_psu, missing_weight
            );
        }

        SurveyDesign {
            strata: demo::STRATUM.to_string(),
            psu: demo::PSU.to_string(),
            weight: ADJUSTED_WEIGHT_COLUMN.to_string(),
            nested: true,
            missing_stratum,
            missing_psu,
            missing_weight,
        }
    }
}

/// Mean and sample standard deviation (n - 1 denominator)
fn mean_and_sd(values: &[f64]) -> (Option<f64>, Option<f64>) {
    if values.is_empty() {
        return (None, None);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (Some(mean), None);
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (Some(mean), Some(variance.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weighted(seqn: i64, cycle: Cycle, weight: Option<f64>) -> SubjectRecord {
        SubjectRecord {
            cycle: Some(cycle),
            exam_weight: weight,
            stratum: Some(100),
            psu: Some(1),
            ..SubjectRecord::new(seqn)
        }
    }

    #[test]
    fn test_divides_by_distinct_cycles() {
        let records = vec![
            weighted(1, Cycle::D, Some(9000.0)),
            weighted(2, Cycle::E, Some(12000.0)),
            weighted(3, Cycle::E, Some(3000.0)),
        ];
        let (records, summary) = WeightAdjuster::new(WeightConfig::default()).apply(records);

        assert_eq!(summary.pooled_cycles, 2);
        assert_eq!(records[0].weights.adjusted_weight, Some(4500.0));
        assert_eq!(records[1].weights.adjusted_weight, Some(6000.0));
        assert!((summary.adjusted_total - summary.base_total / 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_configured_pool_overrides() {
        let config = WeightConfig {
            pooled_cycles: Some(8),
            ..Default::default()
        };
        let records = vec![weighted(1, Cycle::D, Some(8000.0))];
        let (records, summary) = WeightAdjuster::new(config).apply(records);
        assert_eq!(summary.pooled_cycles, 8);
        assert_eq!(records[0].weights.adjusted_weight, Some(1000.0));
    }

    #[test]
    fn test_missing_weight_stays_missing() {
        let records = vec![weighted(1, Cycle::D, None), weighted(2, Cycle::D, Some(10.0))];
        let (records, summary) = WeightAdjuster::new(WeightConfig::default()).apply(records);
        assert_eq!(records[0].weights.adjusted_weight, None);
        assert_eq!(records[0].weights.outlier, None);
        assert_eq!(summary.subjects_with_weight, 1);
    }

    #[test]
    fn test_outlier_flagged_not_removed() {
        let mut records: Vec<SubjectRecord> = (0..20)
            .map(|i| weighted(i, Cycle::J, Some(1000.0 + i as f64)))
            .collect();
        records.push(weighted(99, Cycle::J, Some(100_000.0)));

        let (records, summary) = WeightAdjuster::new(WeightConfig::default()).apply(records);
        assert_eq!(records.len(), 21);
        assert_eq!(summary.outliers, 1);
        assert_eq!(records[20].weights.outlier, Some(true));
        assert_eq!(records[0].weights.outlier, Some(false));
    }

    #[test]
    fn test_survey_design_counts_gaps() {
        let mut records = vec![weighted(1, Cycle::D, Some(10.0)), weighted(2, Cycle::D, None)];
        records[1].psu = None;
        let adjuster = WeightAdjuster::new(WeightConfig::default());
        let (records, _) = adjuster.apply(records);

        let design = adjuster.survey_design(&records);
        assert_eq!(design.strata, "SDMVSTRA");
        assert_eq!(design.weight, ADJUSTED_WEIGHT_COLUMN);
        assert!(design.nested);
        assert_eq!(design.missing_psu, 1);
        assert_eq!(design.missing_weight, 1);
        assert_eq!(design.missing_stratum, 0);
    }
}
