//! Configuration management and validation.
//!
//! Every threshold, code list and categorization boundary used by the
//! derivation stages lives in [`StudyConfig`], which is passed explicitly to
//! each stage. Values come from defaults, an optional JSON file, and CLI flags,
//! in that order.

use crate::constants::{
    DEFAULT_DATA_DIR, DEFAULT_OUTPUT_DIR, IRON_INGREDIENT_PATTERN, IRON_PRODUCT_CODES,
};
use crate::error::{CohortError, Result};
use crate::models::Cycle;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Eligibility bounds for the inclusion cascade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InclusionConfig {
    /// Minimum age in years (inclusive)
    pub min_age: f64,
    /// Maximum age in years (inclusive)
    pub max_age: f64,
}

impl Default for InclusionConfig {
    fn default() -> Self {
        Self {
            min_age: 18.0,
            max_age: 45.0,
        }
    }
}

/// Biomarker cut-points used by the biomarker deriver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiomarkerThresholds {
    /// Concentration substituted for below-detection ferritin, ng/mL
    pub ferritin_floor: f64,

    /// Ferritin below this is iron deficiency, ng/mL
    pub ferritin_deficiency: f64,

    /// Hemoglobin below this is anemia, g/dL
    pub hemoglobin_anemia: f64,

    /// Hemoglobin anemia threshold during pregnancy, g/dL
    pub hemoglobin_anemia_pregnant: f64,

    /// Lower bound of mild anemia, g/dL
    pub hemoglobin_mild_floor: f64,

    /// Lower bound of moderate anemia, g/dL (below is severe)
    pub hemoglobin_moderate_floor: f64,

    /// MCV below this is microcytic, fL
    pub mcv_microcytic_below: f64,

    /// MCV above this is macrocytic, fL
    pub mcv_macrocytic_above: f64,

    /// Transferrin saturation below this is low, %
    pub transferrin_saturation_low: f64,
}

impl Default for BiomarkerThresholds {
    fn default() -> Self {
        Self {
            ferritin_floor: 2.0,
            ferritin_deficiency: 15.0,
            hemoglobin_anemia: 12.0,
            hemoglobin_anemia_pregnant: 11.0,
            hemoglobin_mild_floor: 11.0,
            hemoglobin_moderate_floor: 8.0,
            mcv_microcytic_below: 80.0,
            mcv_macrocytic_above: 100.0,
            transferrin_saturation_low: 20.0,
        }
    }
}

/// Daily iron dose cut-points in mg/day
///
/// Doses below `lower` are low, doses in `[lower, upper]` moderate, above
/// `upper` high.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DoseBounds {
    pub lower: f64,
    pub upper: f64,
}

impl DoseBounds {
    pub const fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }
}

/// Supplement classification settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupplementConfig {
    /// Product codes always treated as iron-containing
    pub iron_product_codes: Vec<String>,

    /// Regex matched against reference ingredient names
    pub ingredient_pattern: String,

    /// Divisor converting days-per-month to a daily fraction
    pub days_in_month: f64,

    /// Cut-points for the dose computed from product reports
    pub clinical_dose_bounds: DoseBounds,

    /// Cut-points for the reported total, the adult and pregnancy RDAs
    pub rda_dose_bounds: DoseBounds,
}

impl Default for SupplementConfig {
    fn default() -> Self {
        Self {
            iron_product_codes: IRON_PRODUCT_CODES.iter().map(|c| c.to_string()).collect(),
            ingredient_pattern: IRON_INGREDIENT_PATTERN.to_string(),
            days_in_month: 30.0,
            clinical_dose_bounds: DoseBounds::new(18.0, 65.0),
            rda_dose_bounds: DoseBounds::new(18.0, 27.0),
        }
    }
}

/// Survey weight adjustment settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightConfig {
    /// Number of pooled cycles; `None` counts the cycles present in the cohort
    pub pooled_cycles: Option<usize>,

    /// Standard deviations from the mean beyond which a weight is flagged
    pub outlier_sd: f64,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            pooled_cycles: None,
            outlier_sd: 3.0,
        }
    }
}

/// Global configuration for a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyConfig {
    /// Directory holding `{PREFIX}_{CYCLE}.csv` files
    pub data_dir: PathBuf,

    /// Directory receiving every output file
    pub output_dir: PathBuf,

    /// Cycles to load, in order
    pub cycles: Vec<Cycle>,

    pub inclusion: InclusionConfig,
    pub biomarkers: BiomarkerThresholds,
    pub supplements: SupplementConfig,
    pub weights: WeightConfig,

    /// Write descriptive summary tables
    pub write_tables: bool,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            cycles: Cycle::ALL.to_vec(),
            inclusion: InclusionConfig::default(),
            biomarkers: BiomarkerThresholds::default(),
            supplements: SupplementConfig::default(),
            weights: WeightConfig::default(),
            write_tables: true,
        }
    }
}

impl StudyConfig {
    /// Load configuration from a JSON file; absent keys keep their defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        debug!("Reading configuration from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        let config: StudyConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn with_cycles(mut self, cycles: Vec<Cycle>) -> Self {
        self.cycles = cycles;
        self
    }

    pub fn with_pooled_cycles(mut self, pooled_cycles: usize) -> Self {
        self.weights.pooled_cycles = Some(pooled_cycles);
        self
    }

    pub fn without_tables(mut self) -> Self {
        self.write_tables = false;
        self
    }

    /// Reject configurations that would make derivations meaningless
    pub fn validate(&self) -> Result<()> {
        if self.cycles.is_empty() {
            return Err(CohortError::configuration(
                "at least one survey cycle must be selected",
            ));
        }

        if self.inclusion.min_age > self.inclusion.max_age {
            return Err(CohortError::configuration(format!(
                "minimum age {} exceeds maximum age {}",
                self.inclusion.min_age, self.inclusion.max_age
            )));
        }

        let b = &self.biomarkers;
        let positive = [
            ("ferritin_floor", b.ferritin_floor),
            ("ferritin_deficiency", b.ferritin_deficiency),
            ("hemoglobin_anemia", b.hemoglobin_anemia),
            ("hemoglobin_anemia_pregnant", b.hemoglobin_anemia_pregnant),
            ("hemoglobin_mild_floor", b.hemoglobin_mild_floor),
            ("hemoglobin_moderate_floor", b.hemoglobin_moderate_floor),
            ("mcv_microcytic_below", b.mcv_microcytic_below),
            ("mcv_macrocytic_above", b.mcv_macrocytic_above),
            ("transferrin_saturation_low", b.transferrin_saturation_low),
            ("days_in_month", self.supplements.days_in_month),
            ("outlier_sd", self.weights.outlier_sd),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(CohortError::configuration(format!(
                    "{} must be a positive number, got {}",
                    name, value
                )));
            }
        }

        if b.hemoglobin_moderate_floor >= b.hemoglobin_mild_floor
            || b.hemoglobin_mild_floor > b.hemoglobin_anemia
        {
            return Err(CohortError::configuration(
                "anemia severity cut-points must satisfy moderate < mild <= anemia threshold",
            ));
        }

        if b.mcv_microcytic_below > b.mcv_macrocytic_above {
            return Err(CohortError::configuration(
                "MCV microcytic bound exceeds macrocytic bound",
            ));
        }

        for (name, bounds) in [
            ("clinical_dose_bounds", self.supplements.clinical_dose_bounds),
            ("rda_dose_bounds", self.supplements.rda_dose_bounds),
        ] {
            if !(bounds.lower.is_finite() && bounds.lower > 0.0 && bounds.upper >= bounds.lower) {
                return Err(CohortError::configuration(format!(
                    "{} must satisfy 0 < lower <= upper, got ({}, {})",
                    name, bounds.lower, bounds.upper
                )));
            }
        }

        if self.weights.pooled_cycles == Some(0) {
            return Err(CohortError::configuration(
                "pooled cycle count must be at least 1",
            ));
        }

        regex::Regex::new(&self.supplements.ingredient_pattern)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        let config = StudyConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cycles.len(), 8);
        assert_eq!(config.biomarkers.ferritin_floor, 2.0);
        assert_eq!(config.biomarkers.ferritin_deficiency, 15.0);
        assert_eq!(config.biomarkers.hemoglobin_anemia, 12.0);
    }

    #[test]
    fn test_inverted_age_bounds_rejected() {
        let mut config = StudyConfig::default();
        config.inclusion.min_age = 50.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("minimum age"));
    }

    #[test]
    fn test_empty_cycles_rejected() {
        let config = StudyConfig::default().with_cycles(Vec::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_pooled_cycles_rejected() {
        let config = StudyConfig::default().with_pooled_cycles(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_pattern_rejected() {
        let mut config = StudyConfig::default();
        config.supplements.ingredient_pattern = "(iron".to_string();
        assert!(matches!(
            config.validate(),
            Err(CohortError::Pattern(_))
        ));
    }

    #[test]
    fn test_inverted_dose_bounds_rejected() {
        let mut config = StudyConfig::default();
        config.supplements.rda_dose_bounds = DoseBounds::new(30.0, 27.0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("rda_dose_bounds"));
    }

    #[test]
    fn test_dose_bounds_from_json() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"supplements": {{"clinical_dose_bounds": {{"lower": 20.0, "upper": 60.0}}}}}}"#
        )
        .unwrap();

        let config = StudyConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.supplements.clinical_dose_bounds, DoseBounds::new(20.0, 60.0));
        assert_eq!(config.supplements.rda_dose_bounds, DoseBounds::new(18.0, 27.0));
        assert_eq!(config.supplements.days_in_month, 30.0);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"cycles": ["D", "J"], "biomarkers": {{"ferritin_deficiency": 12.0}}}}"#
        )
        .unwrap();

        let config = StudyConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.cycles, vec![Cycle::D, Cycle::J]);
        assert_eq!(config.biomarkers.ferritin_deficiency, 12.0);
        assert_eq!(config.biomarkers.hemoglobin_anemia, 12.0);
        assert_eq!(config.inclusion.max_age, 45.0);
        assert!(config.write_tables);
    }
}
