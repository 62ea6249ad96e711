//! Conversion between the merged polars table and typed subject records.
//!
//! Columns absent from the merged table read as missing fields, so the
//! derivation stages never branch on column presence.

use crate::constants::{
    demo, exam, lab, supplement, CYCLE_COLUMN, CYCLE_YEARS_COLUMN, SUBJECT_ID,
};
use crate::derive::Categorical;
use crate::derive::supplement::{
    ANY_IRON_COLUMN, DAILY_IRON_COLUMN, MAX_DAYS_COLUMN, PRODUCT_COUNT_COLUMN,
};
use crate::derive::weights::ADJUSTED_WEIGHT_COLUMN;
use crate::error::Result;
use crate::models::{Cycle, SubjectRecord};
use crate::schema::{f64_values, i64_values, require_subject_id, text_values};
use polars::prelude::*;
use tracing::warn;

/// Build one record per row of the merged table
pub fn records_from_frame(frame: &DataFrame) -> Result<Vec<SubjectRecord>> {
    require_subject_id(frame, "merged")?;

    let ids = i64_values(frame, SUBJECT_ID)?;
    let cycles = text_values(frame, CYCLE_COLUMN)?;

    let sex = i64_values(frame, demo::SEX)?;
    let age = f64_values(frame, demo::AGE)?;
    let race = i64_values(frame, demo::RACE)?;
    let education = i64_values(frame, demo::EDUCATION)?;
    let poverty = f64_values(frame, demo::POVERTY_RATIO)?;
    let weight = f64_values(frame, demo::EXAM_WEIGHT)?;
    let stratum = i64_values(frame, demo::STRATUM)?;
    let psu = i64_values(frame, demo::PSU)?;
    let pregnancy = i64_values(frame, demo::PREGNANCY)?;

    let ferritin = f64_values(frame, lab::FERRITIN)?;
    let ferritin_comment = i64_values(frame, lab::FERRITIN_COMMENT)?;
    let hemoglobin = f64_values(frame, lab::HEMOGLOBIN)?;
    let mcv = f64_values(frame, lab::MCV)?;
    let serum_iron = f64_values(frame, lab::SERUM_IRON)?;
    let tibc = f64_values(frame, lab::TIBC)?;
    let tsat = f64_values(frame, lab::TRANSFERRIN_SATURATION)?;

    let bmi = f64_values(frame, exam::BMI)?;
    let weight_kg = f64_values(frame, exam::WEIGHT_KG)?;
    let height_cm = f64_values(frame, exam::HEIGHT_CM)?;
    let fasting_hours = f64_values(frame, exam::FASTING_HOURS)?;
    let fasting_minutes = f64_values(frame, exam::FASTING_MINUTES)?;

    let reported_iron = f64_values(frame, supplement::REPORTED_TOTAL_IRON)?;
    let daily_iron = f64_values(frame, DAILY_IRON_COLUMN)?;
    let any_iron = i64_values(frame, ANY_IRON_COLUMN)?;
    let products = i64_values(frame, PRODUCT_COUNT_COLUMN)?;
    let max_days = f64_values(frame, MAX_DAYS_COLUMN)?;

    let mut records = Vec::with_capacity(frame.height());
    let mut without_id = 0usize;

    for i in 0..frame.height() {
        let Some(seqn) = ids[i] else {
            without_id += 1;
            continue;
        };

        records.push(SubjectRecord {
            seqn,
            cycle: cycles[i].as_deref().and_then(|c| c.parse::<Cycle>().ok()),
            sex_code: sex[i],
            age_years: age[i],
            race_code: race[i],
            education_code: education[i],
            poverty_ratio: poverty[i],
            exam_weight: weight[i],
            stratum: stratum[i],
            psu: psu[i],
            pregnancy_code: pregnancy[i],
            ferritin: ferritin[i],
            ferritin_comment: ferritin_comment[i],
            hemoglobin: hemoglobin[i],
            mcv: mcv[i],
            serum_iron: serum_iron[i],
            tibc: tibc[i],
            transferrin_saturation: tsat[i],
            bmi: bmi[i],
            weight_kg: weight_kg[i],
            height_cm: height_cm[i],
            fasting_hours: fasting_hours[i],
            fasting_minutes: fasting_minutes[i],
            reported_supplement_iron: reported_iron[i],
            supplement_daily_iron: daily_iron[i],
            any_iron_product: any_iron[i].map(|v| v != 0),
            supplement_products: products[i],
            supplement_max_days: max_days[i],
            ..Default::default()
        });
    }

    if without_id > 0 {
        warn!("Dropped {} merged rows without a subject identifier", without_id);
    }

    Ok(records)
}

fn f64_column(name: &str, values: Vec<Option<f64>>) -> Column {
    Column::new(name.into(), values)
}

fn i64_column(name: &str, values: Vec<Option<i64>>) -> Column {
    Column::new(name.into(), values)
}

fn bool_column(name: &str, values: Vec<Option<bool>>) -> Column {
    Column::new(name.into(), values)
}

fn label_column<C: Categorical>(name: &str, values: impl Iterator<Item = C>) -> Column {
    let labels: Vec<Option<&str>> = values.map(|c| c.known_label()).collect();
    Column::new(name.into(), labels)
}

/// Analytic table with every raw and derived field, one row per record
pub fn records_to_frame(records: &[SubjectRecord]) -> Result<DataFrame> {
    let f = |get: fn(&SubjectRecord) -> Option<f64>| records.iter().map(get).collect::<Vec<_>>();
    let i = |get: fn(&SubjectRecord) -> Option<i64>| records.iter().map(get).collect::<Vec<_>>();
    let b = |get: fn(&SubjectRecord) -> Option<bool>| records.iter().map(get).collect::<Vec<_>>();

    let columns = vec![
        Column::new(
            SUBJECT_ID.into(),
            records.iter().map(|r| r.seqn).collect::<Vec<_>>(),
        ),
        Column::new(
            CYCLE_COLUMN.into(),
            records
                .iter()
                .map(|r| r.cycle.map(|c| c.code()))
                .collect::<Vec<_>>(),
        ),
        Column::new(
            CYCLE_YEARS_COLUMN.into(),
            records
                .iter()
                .map(|r| r.demographics.cycle_years)
                .collect::<Vec<_>>(),
        ),
        // Raw fields under their NHANES names
        i64_column(demo::SEX, i(|r| r.sex_code)),
        f64_column(demo::AGE, f(|r| r.age_years)),
        i64_column(demo::RACE, i(|r| r.race_code)),
        i64_column(demo::EDUCATION, i(|r| r.education_code)),
        f64_column(demo::POVERTY_RATIO, f(|r| r.poverty_ratio)),
        f64_column(demo::EXAM_WEIGHT, f(|r| r.exam_weight)),
        i64_column(demo::STRATUM, i(|r| r.stratum)),
        i64_column(demo::PSU, i(|r| r.psu)),
        i64_column(demo::PREGNANCY, i(|r| r.pregnancy_code)),
        f64_column(lab::FERRITIN, f(|r| r.ferritin)),
        i64_column(lab::FERRITIN_COMMENT, i(|r| r.ferritin_comment)),
        f64_column(lab::HEMOGLOBIN, f(|r| r.hemoglobin)),
        f64_column(lab::MCV, f(|r| r.mcv)),
        f64_column(lab::SERUM_IRON, f(|r| r.serum_iron)),
        f64_column(lab::TIBC, f(|r| r.tibc)),
        f64_column(lab::TRANSFERRIN_SATURATION, f(|r| r.transferrin_saturation)),
        f64_column(exam::BMI, f(|r| r.bmi)),
        f64_column(exam::WEIGHT_KG, f(|r| r.weight_kg)),
        f64_column(exam::HEIGHT_CM, f(|r| r.height_cm)),
        f64_column(exam::FASTING_HOURS, f(|r| r.fasting_hours)),
        f64_column(exam::FASTING_MINUTES, f(|r| r.fasting_minutes)),
        f64_column(supplement::REPORTED_TOTAL_IRON, f(|r| r.reported_supplement_iron)),
        // Biomarkers
        f64_column("ferritin_adjusted", f(|r| r.biomarkers.ferritin_adjusted)),
        Column::new(
            "ferritin_floor_substituted".into(),
            records
                .iter()
                .map(|r| r.biomarkers.floor_substituted)
                .collect::<Vec<_>>(),
        ),
        f64_column("log_ferritin", f(|r| r.biomarkers.log_ferritin)),
        bool_column("iron_deficient", b(|r| r.biomarkers.iron_deficient)),
        bool_column("anemic", b(|r| r.biomarkers.anemic)),
        bool_column("IDWA", b(|r| r.biomarkers.idwa)),
        label_column("idwa_status", records.iter().map(|r| r.biomarkers.idwa_status)),
        label_column("iron_status", records.iter().map(|r| r.biomarkers.iron_status)),
        bool_column(
            "anemic_pregnancy_adjusted",
            b(|r| r.biomarkers.anemic_pregnancy_adjusted),
        ),
        label_column(
            "anemia_severity",
            records.iter().map(|r| r.biomarkers.anemia_severity),
        ),
        label_column("mcv_category", records.iter().map(|r| r.biomarkers.mcv_morphology)),
        bool_column("tsat_low", b(|r| r.biomarkers.tsat_low)),
        Column::new(
            "analytic_sample".into(),
            records
                .iter()
                .map(|r| r.biomarkers.analytic_sample)
                .collect::<Vec<_>>(),
        ),
        // Body
        f64_column("bmi", f(|r| r.body.bmi)),
        label_column("bmi_category", records.iter().map(|r| r.body.bmi_category)),
        f64_column("fasting_time_hours", f(|r| r.body.fasting_hours)),
        // Supplements
        f64_column("iron_daily_mg", f(|r| r.supplements.daily_iron)),
        bool_column("iron_supplement", b(|r| r.supplements.iron_supplement_user)),
        label_column(
            "iron_dose",
            records.iter().map(|r| r.supplements.iron_dose_category),
        ),
        label_column(
            "reported_iron_dose",
            records
                .iter()
                .map(|r| r.supplements.reported_iron_dose_category),
        ),
        bool_column("any_iron_product", b(|r| r.supplements.any_iron_product)),
        i64_column("products_reported", i(|r| r.supplements.products_reported)),
        f64_column("max_days_per_month", f(|r| r.supplements.max_days_per_month)),
        // Weights
        f64_column(ADJUSTED_WEIGHT_COLUMN, f(|r| r.weights.adjusted_weight)),
        bool_column("extreme_weight", b(|r| r.weights.outlier)),
        // Demographics
        label_column("sex", records.iter().map(|r| r.demographics.sex)),
        label_column(
            "race_category",
            records.iter().map(|r| r.demographics.race_ethnicity),
        ),
        label_column("race_simple", records.iter().map(|r| r.demographics.race_group)),
        label_column("education", records.iter().map(|r| r.demographics.education)),
        label_column("pir_category", records.iter().map(|r| r.demographics.poverty_band)),
        label_column(
            "poverty_category",
            records.iter().map(|r| r.demographics.income_tier),
        ),
        bool_column("below_poverty", b(|r| r.demographics.below_poverty)),
        label_column("age_group", records.iter().map(|r| r.demographics.age_band)),
        label_column("age_category", records.iter().map(|r| r.demographics.age_group)),
        label_column(
            "pregnancy_status",
            records.iter().map(|r| r.demographics.pregnancy_status),
        ),
    ];

    Ok(DataFrame::new(columns)?)
}
