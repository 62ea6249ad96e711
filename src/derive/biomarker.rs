//! Iron and anemia indicators derived from ferritin, hemoglobin and MCV.
//!
//! Below-detection ferritin is replaced by a fixed floor concentration
//! before any threshold comparison or log transform. Every indicator is
//! nullable and stays missing when one of its inputs is missing.

use super::{Categorical, below, finite};
use crate::config::BiomarkerThresholds;
use crate::constants::BELOW_DETECTION_CODE;
use crate::models::SubjectRecord;
use tracing::{debug, info};

const BMI_UNDERWEIGHT_BELOW: f64 = 18.5;
const BMI_OVERWEIGHT_FROM: f64 = 25.0;
const BMI_OBESE_FROM: f64 = 30.0;

/// Cross of iron deficiency and anemia
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IronStatus {
    Sufficient,
    Idwa,
    IronDeficiencyAnemia,
    NonIronDeficiencyAnemia,
    #[default]
    Unknown,
}

impl IronStatus {
    pub fn from_flags(iron_deficient: Option<bool>, anemic: Option<bool>) -> Self {
        match (iron_deficient, anemic) {
            (Some(false), Some(false)) => IronStatus::Sufficient,
            (Some(true), Some(false)) => IronStatus::Idwa,
            (Some(true), Some(true)) => IronStatus::IronDeficiencyAnemia,
            (Some(false), Some(true)) => IronStatus::NonIronDeficiencyAnemia,
            _ => IronStatus::Unknown,
        }
    }
}

impl Categorical for IronStatus {
    fn label(&self) -> &'static str {
        match self {
            IronStatus::Sufficient => "Iron sufficient",
            IronStatus::Idwa => "IDWA",
            IronStatus::IronDeficiencyAnemia => "IDA",
            IronStatus::NonIronDeficiencyAnemia => "Non-iron deficiency anemia",
            IronStatus::Unknown => "Unknown",
        }
    }

    fn is_unknown(&self) -> bool {
        matches!(self, IronStatus::Unknown)
    }
}

/// Case-control role of a subject in the IDWA contrast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IdwaStatus {
    /// Iron deficient without anemia
    Case,
    /// Iron sufficient without anemia
    Control,
    /// Anemic, outside the case-control contrast
    Anemic,
    #[default]
    Unknown,
}

impl IdwaStatus {
    pub fn from_flags(iron_deficient: Option<bool>, anemic: Option<bool>) -> Self {
        match (iron_deficient, anemic) {
            (_, Some(true)) => IdwaStatus::Anemic,
            (Some(true), Some(false)) => IdwaStatus::Case,
            (Some(false), Some(false)) => IdwaStatus::Control,
            _ => IdwaStatus::Unknown,
        }
    }
}

impl Categorical for IdwaStatus {
    fn label(&self) -> &'static str {
        match self {
            IdwaStatus::Case => "Case",
            IdwaStatus::Control => "Control",
            IdwaStatus::Anemic => "Anemic",
            IdwaStatus::Unknown => "Unknown",
        }
    }

    fn is_unknown(&self) -> bool {
        matches!(self, IdwaStatus::Unknown)
    }
}

/// Anemia severity under non-pregnant criteria
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AnemiaSeverity {
    NotAnemic,
    Mild,
    Moderate,
    Severe,
    #[default]
    Unknown,
}

impl Categorical for AnemiaSeverity {
    fn label(&self) -> &'static str {
        match self {
            AnemiaSeverity::NotAnemic => "Not anemic",
            AnemiaSeverity::Mild => "Mild",
            AnemiaSeverity::Moderate => "Moderate",
            AnemiaSeverity::Severe => "Severe",
            AnemiaSeverity::Unknown => "Unknown",
        }
    }

    fn is_unknown(&self) -> bool {
        matches!(self, AnemiaSeverity::Unknown)
    }
}

/// Red cell size class from mean cell volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum McvMorphology {
    Microcytic,
    Normocytic,
    Macrocytic,
    #[default]
    Unknown,
}

impl Categorical for McvMorphology {
    fn label(&self) -> &'static str {
        match self {
            McvMorphology::Microcytic => "Microcytic",
            McvMorphology::Normocytic => "Normocytic",
            McvMorphology::Macrocytic => "Macrocytic",
            McvMorphology::Unknown => "Unknown",
        }
    }

    fn is_unknown(&self) -> bool {
        matches!(self, McvMorphology::Unknown)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BmiCategory {
    Underweight,
    Normal,
    Overweight,
    Obese,
    #[default]
    Unknown,
}

impl BmiCategory {
    pub fn from_bmi(bmi: Option<f64>) -> Self {
        match finite(bmi) {
            Some(v) if v < BMI_UNDERWEIGHT_BELOW => BmiCategory::Underweight,
            Some(v) if v < BMI_OVERWEIGHT_FROM => BmiCategory::Normal,
            Some(v) if v < BMI_OBESE_FROM => BmiCategory::Overweight,
            Some(_) => BmiCategory::Obese,
            None => BmiCategory::Unknown,
        }
    }
}

impl Categorical for BmiCategory {
    fn label(&self) -> &'static str {
        match self {
            BmiCategory::Underweight => "Underweight",
            BmiCategory::Normal => "Normal",
            BmiCategory::Overweight => "Overweight",
            BmiCategory::Obese => "Obese",
            BmiCategory::Unknown => "Unknown",
        }
    }

    fn is_unknown(&self) -> bool {
        matches!(self, BmiCategory::Unknown)
    }
}

/// Derived laboratory indicators of one subject
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BiomarkerIndicators {
    /// Ferritin after detection-floor substitution, ng/mL
    pub ferritin_adjusted: Option<f64>,
    pub floor_substituted: bool,
    pub iron_deficient: Option<bool>,
    /// Fixed-threshold anemia used by the IDWA definition
    pub anemic: Option<bool>,
    pub idwa: Option<bool>,
    pub idwa_status: IdwaStatus,
    pub iron_status: IronStatus,
    /// Anemia with the lower threshold applied during pregnancy
    pub anemic_pregnancy_adjusted: Option<bool>,
    pub anemia_severity: AnemiaSeverity,
    pub mcv_morphology: McvMorphology,
    pub log_ferritin: Option<f64>,
    pub tsat_low: Option<bool>,
    /// Non-anemic cohort member eligible for the case-control analysis
    pub analytic_sample: bool,
}

/// Derived body measurements of one subject
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BodyIndicators {
    /// Measured BMI, or weight / height² when only those were measured
    pub bmi: Option<f64>,
    pub bmi_category: BmiCategory,
    pub fasting_hours: Option<f64>,
}

/// Whether a ferritin result needs the detection floor
pub fn below_detection(value: f64, comment: Option<i64>, floor: f64) -> bool {
    comment == Some(BELOW_DETECTION_CODE) || !(value > 0.0) || value < floor
}

/// Replace a below-detection ferritin value with the floor.
///
/// A missing value stays missing. Applying this to its own output gives the
/// same value again.
pub fn substitute_detection_floor(value: Option<f64>, comment: Option<i64>, floor: f64) -> Option<f64> {
    value.map(|v| if below_detection(v, comment, floor) { floor } else { v })
}

/// Biomarker deriver configured with explicit cut-points
#[derive(Debug, Clone)]
pub struct BiomarkerDeriver {
    thresholds: BiomarkerThresholds,
}

impl BiomarkerDeriver {
    pub fn new(thresholds: BiomarkerThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &BiomarkerThresholds {
        &self.thresholds
    }

    /// Derive every laboratory indicator for one subject
    pub fn derive(&self, record: &SubjectRecord) -> BiomarkerIndicators {
        let t = &self.thresholds;

        let raw_ferritin = record.ferritin.filter(|v| !v.is_nan());
        let ferritin = substitute_detection_floor(raw_ferritin, record.ferritin_comment, t.ferritin_floor);
        let floor_substituted = raw_ferritin
            .is_some_and(|v| below_detection(v, record.ferritin_comment, t.ferritin_floor));

        let iron_deficient = below(ferritin, t.ferritin_deficiency);
        let anemic = below(record.hemoglobin, t.hemoglobin_anemia);
        let idwa = match (iron_deficient, anemic) {
            (Some(deficient), Some(anemic)) => Some(deficient && !anemic),
            _ => None,
        };

        let pregnancy_threshold = if record.is_pregnant() {
            t.hemoglobin_anemia_pregnant
        } else {
            t.hemoglobin_anemia
        };

        BiomarkerIndicators {
            ferritin_adjusted: ferritin,
            floor_substituted,
            iron_deficient,
            anemic,
            idwa,
            idwa_status: IdwaStatus::from_flags(iron_deficient, anemic),
            iron_status: IronStatus::from_flags(iron_deficient, anemic),
            anemic_pregnancy_adjusted: below(record.hemoglobin, pregnancy_threshold),
            anemia_severity: self.anemia_severity(record.hemoglobin),
            mcv_morphology: self.mcv_morphology(record.mcv),
            log_ferritin: ferritin.filter(|v| *v > 0.0).map(f64::ln),
            tsat_low: below(record.transferrin_saturation, t.transferrin_saturation_low),
            analytic_sample: anemic == Some(false),
        }
    }

    pub fn anemia_severity(&self, hemoglobin: Option<f64>) -> AnemiaSeverity {
        let t = &self.thresholds;
        match finite(hemoglobin) {
            None => AnemiaSeverity::Unknown,
            Some(v) if v >= t.hemoglobin_anemia => AnemiaSeverity::NotAnemic,
            Some(v) if v >= t.hemoglobin_mild_floor => AnemiaSeverity::Mild,
            Some(v) if v >= t.hemoglobin_moderate_floor => AnemiaSeverity::Moderate,
            Some(_) => AnemiaSeverity::Severe,
        }
    }

    pub fn mcv_morphology(&self, mcv: Option<f64>) -> McvMorphology {
        let t = &self.thresholds;
        match finite(mcv) {
            None => McvMorphology::Unknown,
            Some(v) if v < t.mcv_microcytic_below => McvMorphology::Microcytic,
            Some(v) if v > t.mcv_macrocytic_above => McvMorphology::Macrocytic,
            Some(_) => McvMorphology::Normocytic,
        }
    }

    /// Body mass and fasting indicators for one subject
    pub fn derive_body(&self, record: &SubjectRecord) -> BodyIndicators {
        let bmi = finite(record.bmi).or_else(|| {
            match (finite(record.weight_kg), finite(record.height_cm)) {
                (Some(weight), Some(height)) if height > 0.0 => {
                    let metres = height / 100.0;
                    Some(weight / (metres * metres))
                }
                _ => None,
            }
        });

        let fasting_hours = finite(record.fasting_hours)
            .map(|hours| hours + finite(record.fasting_minutes).unwrap_or(0.0) / 60.0);

        BodyIndicators {
            bmi,
            bmi_category: BmiCategory::from_bmi(bmi),
            fasting_hours,
        }
    }

    /// Attach biomarker and body indicators to every record
    pub fn apply(&self, mut records: Vec<SubjectRecord>) -> Vec<SubjectRecord> {
        for record in records.iter_mut() {
            record.biomarkers = self.derive(record);
            record.body = self.derive_body(record);
        }

        let substituted = records.iter().filter(|r| r.biomarkers.floor_substituted).count();
        let idwa = records.iter().filter(|r| r.biomarkers.idwa == Some(true)).count();
        let anemic = records.iter().filter(|r| r.biomarkers.anemic == Some(true)).count();
        let analytic = records.iter().filter(|r| r.biomarkers.analytic_sample).count();

        debug!(
            "Ferritin floor ({} ng/mL) substituted for {} subjects",
            self.thresholds.ferritin_floor, substituted
        );
        info!(
            "Biomarkers derived: {} IDWA, {} anemic, {} in analytic sample",
            idwa, anemic, analytic
        );

        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::pregnancy_codes;

    fn deriver() -> BiomarkerDeriver {
        BiomarkerDeriver::new(BiomarkerThresholds::default())
    }

    fn subject(ferritin: Option<f64>, hemoglobin: Option<f64>) -> SubjectRecord {
        SubjectRecord {
            ferritin,
            hemoglobin,
            ..SubjectRecord::new(1)
        }
    }

    #[test]
    fn test_idwa_example_subject() {
        let mut record = subject(Some(10.0), Some(13.0));
        record.ferritin_comment = Some(0);
        record.age_years = Some(30.0);
        record.sex_code = Some(2);
        record.pregnancy_code = Some(pregnancy_codes::NOT_PREGNANT);

        let indicators = deriver().derive(&record);
        assert_eq!(indicators.iron_deficient, Some(true));
        assert_eq!(indicators.anemic, Some(false));
        assert_eq!(indicators.idwa, Some(true));
        assert_eq!(indicators.idwa_status, IdwaStatus::Case);
        assert_eq!(indicators.iron_status, IronStatus::Idwa);
        assert!(indicators.analytic_sample);
    }

    #[test]
    fn test_flagged_ferritin_uses_floor() {
        let mut record = subject(Some(0.4), Some(12.5));
        record.ferritin_comment = Some(BELOW_DETECTION_CODE);

        let indicators = deriver().derive(&record);
        assert_eq!(indicators.ferritin_adjusted, Some(2.0));
        assert!(indicators.floor_substituted);
        assert_eq!(indicators.log_ferritin, Some(2.0f64.ln()));
        assert_eq!(indicators.iron_deficient, Some(true));
    }

    #[test]
    fn test_non_positive_and_low_values_use_floor() {
        assert_eq!(substitute_detection_floor(Some(0.0), None, 2.0), Some(2.0));
        assert_eq!(substitute_detection_floor(Some(-3.0), None, 2.0), Some(2.0));
        assert_eq!(substitute_detection_floor(Some(1.5), None, 2.0), Some(2.0));
        assert_eq!(substitute_detection_floor(Some(2.0), None, 2.0), Some(2.0));
        assert_eq!(substitute_detection_floor(Some(40.0), Some(0), 2.0), Some(40.0));
        assert_eq!(substitute_detection_floor(None, Some(1), 2.0), None);
    }

    #[test]
    fn test_floor_substitution_is_idempotent() {
        for (value, comment) in [
            (Some(0.3), Some(1)),
            (Some(-1.0), None),
            (Some(1.0), None),
            (Some(55.0), Some(0)),
            (Some(55.0), Some(1)),
            (None, Some(1)),
        ] {
            let once = substitute_detection_floor(value, comment, 2.0);
            let twice = substitute_detection_floor(once, comment, 2.0);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_missing_input_propagates() {
        let indicators = deriver().derive(&subject(None, Some(13.0)));
        assert_eq!(indicators.iron_deficient, None);
        assert_eq!(indicators.anemic, Some(false));
        assert_eq!(indicators.idwa, None);
        assert_eq!(indicators.iron_status, IronStatus::Unknown);
        assert_eq!(indicators.log_ferritin, None);

        let indicators = deriver().derive(&subject(Some(10.0), None));
        assert_eq!(indicators.idwa, None);
        assert_eq!(indicators.idwa_status, IdwaStatus::Unknown);
        assert!(!indicators.analytic_sample);
    }

    #[test]
    fn test_idwa_iff_deficient_and_not_anemic() {
        let deriver = deriver();
        for ferritin in [None, Some(5.0), Some(14.9), Some(15.0), Some(80.0)] {
            for hemoglobin in [None, Some(7.5), Some(11.9), Some(12.0), Some(14.0)] {
                let b = deriver.derive(&subject(ferritin, hemoglobin));
                let expected = match (b.iron_deficient, b.anemic) {
                    (Some(d), Some(a)) => Some(d && !a),
                    _ => None,
                };
                assert_eq!(b.idwa, expected);
            }
        }
    }

    #[test]
    fn test_iron_status_cross() {
        let deriver = deriver();
        let status = |f, h| deriver.derive(&subject(Some(f), Some(h))).iron_status;
        assert_eq!(status(30.0, 13.0), IronStatus::Sufficient);
        assert_eq!(status(10.0, 13.0), IronStatus::Idwa);
        assert_eq!(status(10.0, 10.0), IronStatus::IronDeficiencyAnemia);
        assert_eq!(status(30.0, 10.0), IronStatus::NonIronDeficiencyAnemia);
    }

    #[test]
    fn test_pregnancy_threshold_only_in_adjusted_anemia() {
        let mut record = subject(Some(30.0), Some(11.5));
        record.pregnancy_code = Some(pregnancy_codes::PREGNANT);

        let indicators = deriver().derive(&record);
        assert_eq!(indicators.anemic, Some(true));
        assert_eq!(indicators.anemic_pregnancy_adjusted, Some(false));
    }

    #[test]
    fn test_anemia_severity_bands() {
        let d = deriver();
        assert_eq!(d.anemia_severity(Some(12.0)), AnemiaSeverity::NotAnemic);
        assert_eq!(d.anemia_severity(Some(11.0)), AnemiaSeverity::Mild);
        assert_eq!(d.anemia_severity(Some(10.99)), AnemiaSeverity::Moderate);
        assert_eq!(d.anemia_severity(Some(8.0)), AnemiaSeverity::Moderate);
        assert_eq!(d.anemia_severity(Some(7.9)), AnemiaSeverity::Severe);
        assert_eq!(d.anemia_severity(None), AnemiaSeverity::Unknown);
    }

    #[test]
    fn test_mcv_morphology_bounds() {
        let d = deriver();
        assert_eq!(d.mcv_morphology(Some(79.9)), McvMorphology::Microcytic);
        assert_eq!(d.mcv_morphology(Some(80.0)), McvMorphology::Normocytic);
        assert_eq!(d.mcv_morphology(Some(100.0)), McvMorphology::Normocytic);
        assert_eq!(d.mcv_morphology(Some(100.1)), McvMorphology::Macrocytic);
        assert_eq!(d.mcv_morphology(None), McvMorphology::Unknown);
    }

    #[test]
    fn test_tsat_low() {
        let mut record = subject(Some(30.0), Some(13.0));
        record.transferrin_saturation = Some(12.0);
        assert_eq!(deriver().derive(&record).tsat_low, Some(true));
        record.transferrin_saturation = None;
        assert_eq!(deriver().derive(&record).tsat_low, None);
    }

    #[test]
    fn test_bmi_computed_from_weight_and_height() {
        let mut record = SubjectRecord::new(1);
        record.weight_kg = Some(80.0);
        record.height_cm = Some(160.0);
        record.fasting_hours = Some(9.0);
        record.fasting_minutes = Some(30.0);

        let body = deriver().derive_body(&record);
        let bmi = body.bmi.unwrap();
        assert!((bmi - 31.25).abs() < 1e-9);
        assert_eq!(body.bmi_category, BmiCategory::Obese);
        assert_eq!(body.fasting_hours, Some(9.5));
    }

    #[test]
    fn test_bmi_category_bounds() {
        assert_eq!(BmiCategory::from_bmi(Some(18.4)), BmiCategory::Underweight);
        assert_eq!(BmiCategory::from_bmi(Some(18.5)), BmiCategory::Normal);
        assert_eq!(BmiCategory::from_bmi(Some(25.0)), BmiCategory::Overweight);
        assert_eq!(BmiCategory::from_bmi(Some(30.0)), BmiCategory::Obese);
        assert_eq!(BmiCategory::from_bmi(None), BmiCategory::Unknown);
        assert_eq!(BmiCategory::Unknown.known_label(), None);
    }
}
