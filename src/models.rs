//! Core data structures and types for cohort derivation.
//!
//! Defines survey cycles, dataset kinds, the typed subject record that
//! carries raw and derived fields, and the statistics reported per run.

use crate::constants::{
    demo, exam, lab, prefixes, supplement, CYCLE_COLUMN, CYCLE_YEARS_COLUMN, SUBJECT_ID,
};
use crate::derive::biomarker::{BiomarkerIndicators, BodyIndicators};
use crate::derive::demographics::DemographicLabels;
use crate::derive::supplement::SupplementIndicators;
use crate::derive::weights::WeightIndicators;
use crate::error::{CohortError, Result};
use crate::schema::ColumnSpec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Two-year NHANES data collection wave, identified by its file suffix letter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Cycle {
    D,
    E,
    F,
    G,
    H,
    I,
    J,
    L,
}

impl Cycle {
    /// Every cycle of the 2005-2022 study window, in collection order
    pub const ALL: [Cycle; 8] = [
        Cycle::D,
        Cycle::E,
        Cycle::F,
        Cycle::G,
        Cycle::H,
        Cycle::I,
        Cycle::J,
        Cycle::L,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Cycle::D => "D",
            Cycle::E => "E",
            Cycle::F => "F",
            Cycle::G => "G",
            Cycle::H => "H",
            Cycle::I => "I",
            Cycle::J => "J",
            Cycle::L => "L",
        }
    }

    /// Human-readable year range of the wave
    pub fn years(&self) -> &'static str {
        match self {
            Cycle::D => "2005-2006",
            Cycle::E => "2007-2008",
            Cycle::F => "2009-2010",
            Cycle::G => "2011-2012",
            Cycle::H => "2013-2014",
            Cycle::I => "2015-2016",
            Cycle::J => "2017-2018",
            Cycle::L => "2021-2022",
        }
    }

    /// Parse a comma-separated cycle list such as `"D,E,F"`
    pub fn parse_list(input: &str) -> Result<Vec<Cycle>> {
        let mut cycles = Vec::new();
        for part in input.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let cycle = part.parse::<Cycle>()?;
            if !cycles.contains(&cycle) {
                cycles.push(cycle);
            }
        }
        Ok(cycles)
    }
}

impl FromStr for Cycle {
    type Err = CohortError;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase();
        Cycle::ALL
            .into_iter()
            .find(|cycle| cycle.code() == upper)
            .ok_or(CohortError::UnknownCycle {
                code: s.to_string(),
            })
    }
}

impl fmt::Display for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// How an auxiliary table is attached to the demographic base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JoinDiscipline {
    /// Inner join: subjects absent from the table leave the cohort
    Required,
    /// Left join: subjects absent from the table keep null values
    Optional,
}

impl fmt::Display for JoinDiscipline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinDiscipline::Required => write!(f, "inner"),
            JoinDiscipline::Optional => write!(f, "left"),
        }
    }
}

/// Per-cycle NHANES datasets consumed by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DatasetKind {
    Demographics,
    Ferritin,
    BloodCount,
    IronPanel,
    BodyMeasures,
    Fasting,
    SupplementTotals,
    SupplementProducts,
}

impl DatasetKind {
    /// Load order; demographics first since every other table joins onto it
    pub const ALL: [DatasetKind; 8] = [
        DatasetKind::Demographics,
        DatasetKind::Ferritin,
        DatasetKind::BloodCount,
        DatasetKind::IronPanel,
        DatasetKind::BodyMeasures,
        DatasetKind::Fasting,
        DatasetKind::SupplementTotals,
        DatasetKind::SupplementProducts,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            DatasetKind::Demographics => prefixes::DEMOGRAPHICS,
            DatasetKind::Ferritin => prefixes::FERRITIN,
            DatasetKind::BloodCount => prefixes::BLOOD_COUNT,
            DatasetKind::IronPanel => prefixes::IRON_PANEL,
            DatasetKind::BodyMeasures => prefixes::BODY_MEASURES,
            DatasetKind::Fasting => prefixes::FASTING,
            DatasetKind::SupplementTotals => prefixes::SUPPLEMENT_TOTALS,
            DatasetKind::SupplementProducts => prefixes::SUPPLEMENT_PRODUCTS,
        }
    }

    /// Join discipline against the demographic base.
    ///
    /// `None` for the base itself and for product reports, which are
    /// aggregated to one row per subject before they are joined.
    pub fn join_discipline(&self) -> Option<JoinDiscipline> {
        match self {
            DatasetKind::Demographics | DatasetKind::SupplementProducts => None,
            DatasetKind::Ferritin | DatasetKind::BloodCount => Some(JoinDiscipline::Required),
            DatasetKind::IronPanel
            | DatasetKind::BodyMeasures
            | DatasetKind::Fasting
            | DatasetKind::SupplementTotals => Some(JoinDiscipline::Optional),
        }
    }

    /// Minimally required datasets; their absence aborts the run
    pub fn is_critical(&self) -> bool {
        matches!(self, DatasetKind::Demographics | DatasetKind::Ferritin)
    }

    /// Analysis-relevant columns retained by the harmonizer
    pub fn column_spec(&self) -> ColumnSpec {
        match self {
            DatasetKind::Demographics => ColumnSpec::new(
                self.prefix(),
                &[
                    SUBJECT_ID,
                    CYCLE_COLUMN,
                    CYCLE_YEARS_COLUMN,
                    demo::SEX,
                    demo::AGE,
                    demo::RACE,
                    demo::EDUCATION,
                    demo::POVERTY_RATIO,
                    demo::EXAM_WEIGHT,
                    demo::STRATUM,
                    demo::PSU,
                    demo::PREGNANCY,
                ],
                &[
                    demo::SEX,
                    demo::AGE,
                    demo::RACE,
                    demo::EDUCATION,
                    demo::POVERTY_RATIO,
                    demo::EXAM_WEIGHT,
                    demo::STRATUM,
                    demo::PSU,
                    demo::PREGNANCY,
                ],
            ),
            DatasetKind::Ferritin => ColumnSpec::new(
                self.prefix(),
                &[SUBJECT_ID, lab::FERRITIN, lab::FERRITIN_COMMENT],
                &[lab::FERRITIN, lab::FERRITIN_COMMENT],
            ),
            DatasetKind::BloodCount => ColumnSpec::new(
                self.prefix(),
                &[SUBJECT_ID, lab::HEMOGLOBIN, lab::MCV],
                &[lab::HEMOGLOBIN, lab::MCV],
            ),
            DatasetKind::IronPanel => ColumnSpec::new(
                self.prefix(),
                &[
                    SUBJECT_ID,
                    lab::SERUM_IRON,
                    lab::TIBC,
                    lab::TRANSFERRIN_SATURATION,
                ],
                &[lab::SERUM_IRON, lab::TIBC, lab::TRANSFERRIN_SATURATION],
            ),
            DatasetKind::BodyMeasures => ColumnSpec::new(
                self.prefix(),
                &[SUBJECT_ID, exam::BMI, exam::WEIGHT_KG, exam::HEIGHT_CM],
                &[exam::BMI, exam::WEIGHT_KG, exam::HEIGHT_CM],
            ),
            DatasetKind::Fasting => ColumnSpec::new(
                self.prefix(),
                &[SUBJECT_ID, exam::FASTING_HOURS, exam::FASTING_MINUTES],
                &[exam::FASTING_HOURS, exam::FASTING_MINUTES],
            ),
            DatasetKind::SupplementTotals => ColumnSpec::new(
                self.prefix(),
                &[SUBJECT_ID, supplement::REPORTED_TOTAL_IRON],
                &[supplement::REPORTED_TOTAL_IRON],
            ),
            // The product code stays textual; codes are matched as strings.
            DatasetKind::SupplementProducts => ColumnSpec::new(
                self.prefix(),
                &[
                    SUBJECT_ID,
                    CYCLE_COLUMN,
                    supplement::PRODUCT_CODE,
                    supplement::QUANTITY_PER_DAY,
                    supplement::DAYS_PER_MONTH,
                ],
                &[supplement::QUANTITY_PER_DAY, supplement::DAYS_PER_MONTH],
            ),
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.prefix())
    }
}

/// One survey participant of the pooled cycles.
///
/// Raw fields mirror the NHANES columns and are never overwritten; every
/// derivation stage writes into its own group of derived fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubjectRecord {
    pub seqn: i64,
    pub cycle: Option<Cycle>,

    pub sex_code: Option<i64>,
    pub age_years: Option<f64>,
    pub race_code: Option<i64>,
    pub education_code: Option<i64>,
    pub poverty_ratio: Option<f64>,
    pub exam_weight: Option<f64>,
    pub stratum: Option<i64>,
    pub psu: Option<i64>,
    pub pregnancy_code: Option<i64>,

    pub ferritin: Option<f64>,
    pub ferritin_comment: Option<i64>,
    pub hemoglobin: Option<f64>,
    pub mcv: Option<f64>,
    pub serum_iron: Option<f64>,
    pub tibc: Option<f64>,
    pub transferrin_saturation: Option<f64>,

    pub bmi: Option<f64>,
    pub weight_kg: Option<f64>,
    pub height_cm: Option<f64>,
    pub fasting_hours: Option<f64>,
    pub fasting_minutes: Option<f64>,

    /// DSQTOT total iron from supplements, mg/day
    pub reported_supplement_iron: Option<f64>,
    /// Summed daily elemental iron over all reported products, mg/day
    pub supplement_daily_iron: Option<f64>,
    pub any_iron_product: Option<bool>,
    pub supplement_products: Option<i64>,
    pub supplement_max_days: Option<f64>,

    pub biomarkers: BiomarkerIndicators,
    pub body: BodyIndicators,
    pub supplements: SupplementIndicators,
    pub weights: WeightIndicators,
    pub demographics: DemographicLabels,
}

impl SubjectRecord {
    pub fn new(seqn: i64) -> Self {
        Self {
            seqn,
            ..Default::default()
        }
    }

    pub fn is_female(&self) -> bool {
        self.sex_code == Some(crate::constants::SEX_FEMALE)
    }

    /// Definite pregnancy; an unknown code is not pregnancy
    pub fn is_pregnant(&self) -> bool {
        self.pregnancy_code == Some(crate::constants::pregnancy_codes::PREGNANT)
    }
}

/// Cycles that did and did not contribute a file for one dataset
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleCoverage {
    pub loaded: Vec<Cycle>,
    pub missing: Vec<Cycle>,
    pub rows: usize,
}

/// Row count after one join of the merge stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinRecord {
    pub dataset: String,
    pub discipline: Option<JoinDiscipline>,
    pub rows_after: usize,
    pub skipped: bool,
    /// Rows removed before the join because SEQN was missing or unparseable
    pub dropped_without_id: usize,
}

/// Processing statistics for a whole run
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub subjects_merged: usize,
    pub cohort_size: usize,
    pub idwa_cases: usize,
    pub iron_supplement_users: usize,
    pub outlier_weights: usize,
    pub processing_time_ms: u128,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_parsing() {
        assert_eq!("d".parse::<Cycle>().unwrap(), Cycle::D);
        assert_eq!(" L ".parse::<Cycle>().unwrap(), Cycle::L);
        assert!("K".parse::<Cycle>().is_err());
    }

    #[test]
    fn test_cycle_list_deduplicates() {
        let cycles = Cycle::parse_list("D, E,,D,J").unwrap();
        assert_eq!(cycles, vec![Cycle::D, Cycle::E, Cycle::J]);
    }

    #[test]
    fn test_cycle_years() {
        assert_eq!(Cycle::D.years(), "2005-2006");
        assert_eq!(Cycle::L.years(), "2021-2022");
    }

    #[test]
    fn test_join_disciplines() {
        assert_eq!(
            DatasetKind::Ferritin.join_discipline(),
            Some(JoinDiscipline::Required)
        );
        assert_eq!(
            DatasetKind::BloodCount.join_discipline(),
            Some(JoinDiscipline::Required)
        );
        assert_eq!(
            DatasetKind::BodyMeasures.join_discipline(),
            Some(JoinDiscipline::Optional)
        );
        assert_eq!(DatasetKind::SupplementProducts.join_discipline(), None);
        assert!(DatasetKind::Demographics.is_critical());
        assert!(!DatasetKind::BloodCount.is_critical());
    }

    #[test]
    fn test_pregnancy_missing_is_not_pregnant() {
        let record = SubjectRecord::new(1);
        assert!(!record.is_pregnant());
    }
}
