//! Application constants for the NHANES IDWA pipeline
//!
//! This module contains the external NHANES field names, dataset prefixes,
//! output file names and the fixed code lists used throughout the pipeline.

// =============================================================================
// Dataset Prefixes and File Naming
// =============================================================================

/// Dataset file prefixes following the `{PREFIX}_{CYCLE}.csv` convention
pub mod prefixes {
    pub const DEMOGRAPHICS: &str = "DEMO";
    pub const FERRITIN: &str = "FERTIN";
    pub const BLOOD_COUNT: &str = "CBC";
    pub const IRON_PANEL: &str = "FETIB";
    pub const BODY_MEASURES: &str = "BMX";
    pub const FASTING: &str = "FASTQX";
    pub const SUPPLEMENT_TOTALS: &str = "DSQTOT";
    pub const SUPPLEMENT_PRODUCTS: &str = "DSQIDS";

    /// Cycle-independent supplement product reference (`DSBI.csv`)
    pub const PRODUCT_REFERENCE: &str = "DSBI";
}

/// Extension of every input and tabular output file
pub const DELIMITED_EXTENSION: &str = "csv";

/// Column added by the loader holding the cycle letter
pub const CYCLE_COLUMN: &str = "cycle";

/// Column added by the loader holding the cycle year range
pub const CYCLE_YEARS_COLUMN: &str = "cycle_years";

// =============================================================================
// NHANES Field Names
// =============================================================================

/// Respondent sequence number, the subject identifier across all files
pub const SUBJECT_ID: &str = "SEQN";

/// Demographics (DEMO) fields
pub mod demo {
    pub const SEX: &str = "RIAGENDR";
    pub const AGE: &str = "RIDAGEYR";
    pub const RACE: &str = "RIDRETH1";
    pub const EDUCATION: &str = "DMDEDUC2";
    pub const POVERTY_RATIO: &str = "INDFMPIR";
    pub const EXAM_WEIGHT: &str = "WTMEC2YR";
    pub const STRATUM: &str = "SDMVSTRA";
    pub const PSU: &str = "SDMVPSU";
    pub const PREGNANCY: &str = "RIDEXPRG";
}

/// Laboratory fields (FERTIN, CBC, FETIB)
pub mod lab {
    /// Serum ferritin, ng/mL
    pub const FERRITIN: &str = "LBXFER";
    /// Ferritin comment code, 1 = below lower limit of detection
    pub const FERRITIN_COMMENT: &str = "LBDFERLC";
    /// Hemoglobin, g/dL
    pub const HEMOGLOBIN: &str = "LBXHGB";
    /// Mean cell volume, fL
    pub const MCV: &str = "LBXMCVSI";
    /// Serum iron, ug/dL
    pub const SERUM_IRON: &str = "LBXIRN";
    /// Total iron binding capacity, ug/dL
    pub const TIBC: &str = "LBXTIB";
    /// Transferrin saturation, %
    pub const TRANSFERRIN_SATURATION: &str = "LBDPCT";
}

/// Examination and questionnaire fields (BMX, FASTQX)
pub mod exam {
    pub const BMI: &str = "BMXBMI";
    pub const WEIGHT_KG: &str = "BMXWT";
    pub const HEIGHT_CM: &str = "BMXHT";
    pub const FASTING_HOURS: &str = "PHAFSTHR";
    pub const FASTING_MINUTES: &str = "PHAFSTMN";
}

/// Dietary supplement fields (DSQTOT, DSQIDS, DSBI)
pub mod supplement {
    /// Total iron from supplements, mg/day (DSQTOT)
    pub const REPORTED_TOTAL_IRON: &str = "DSQTIRON";
    /// Product code of a reported supplement (DSQIDS)
    pub const PRODUCT_CODE: &str = "DSDSUPP";
    /// Quantity taken per day (DSQIDS)
    pub const QUANTITY_PER_DAY: &str = "DSDQTY";
    /// Days taken in the past 30 days (DSQIDS)
    pub const DAYS_PER_MONTH: &str = "DSDSRVY";

    /// Product reference (DSBI) fields
    pub const REFERENCE_CODE: &str = "supplement_code";
    pub const REFERENCE_INGREDIENT: &str = "ingredient_name";
    pub const REFERENCE_AMOUNT: &str = "amount_per_serving";
}

// =============================================================================
// Coded Values
// =============================================================================

/// RIAGENDR code for female participants
pub const SEX_FEMALE: i64 = 2;

/// RIAGENDR code for male participants
pub const SEX_MALE: i64 = 1;

/// RIDEXPRG codes
pub mod pregnancy_codes {
    pub const PREGNANT: i64 = 1;
    pub const NOT_PREGNANT: i64 = 2;
    pub const UNDETERMINED: i64 = 3;
}

/// LBDFERLC value marking a result below the lower limit of detection
pub const BELOW_DETECTION_CODE: i64 = 1;

/// Product codes that are always treated as iron-containing
///
/// Prenatal vitamins with iron (6180xx), single-ingredient iron (6240xx) and
/// multivitamins with iron (6110xx).
pub const IRON_PRODUCT_CODES: &[&str] = &[
    "618020", "618030", "618040", "618050", "624010", "624020", "624030", "624040", "611010",
    "611020", "611030",
];

/// Case-insensitive ingredient pattern that marks a reference entry as iron;
/// matches anywhere in the name, e.g. "Carbonyliron"
pub const IRON_INGREDIENT_PATTERN: &str = r"(?i)(iron|ferrous|ferric)";

// =============================================================================
// Output File Names
// =============================================================================

pub const ANALYTIC_TABLE_FILENAME: &str = "processed_data.csv";
pub const EXCLUSION_LEDGER_FILENAME: &str = "exclusions.csv";
pub const RUN_SUMMARY_FILENAME: &str = "run_summary.json";
pub const TABLES_DIR_NAME: &str = "tables";
pub const TABLE1_STEM: &str = "table1_characteristics";
pub const TABLE2_STEM: &str = "table2_idwa_by_demographics";

/// Default input directory
pub const DEFAULT_DATA_DIR: &str = "data";

/// Default output directory
pub const DEFAULT_OUTPUT_DIR: &str = "output";
