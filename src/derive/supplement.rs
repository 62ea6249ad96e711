//! Iron supplement use and daily elemental iron dose.
//!
//! Product reports arrive as many rows per subject. Each report is
//! classified against the iron product catalog, converted to a daily dose,
//! and the reports are aggregated to one row per subject before the merge.
//! After the cascade, the aggregate is categorized under two dose schemes.

use super::{Categorical, finite};
use crate::config::{DoseBounds, SupplementConfig};
use crate::constants::{SUBJECT_ID, supplement};
use crate::error::Result;
use crate::models::{Cycle, SubjectRecord};
use crate::schema::{f64_values, has_column, i64_values, require_subject_id, text_values};
use polars::prelude::*;
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, warn};

/// Aggregate columns produced for the merge
pub const DAILY_IRON_COLUMN: &str = "supplement_daily_iron";
pub const ANY_IRON_COLUMN: &str = "any_iron_product";
pub const PRODUCT_COUNT_COLUMN: &str = "supplement_products";
pub const MAX_DAYS_COLUMN: &str = "supplement_max_days";

/// Boundary scheme for daily iron dose categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoseScheme {
    /// Applied to the dose computed from product reports, {18, 65} by default
    Clinical,
    /// Applied to the reported total, {18, 27} by default
    Rda,
}

impl DoseScheme {
    pub fn bounds(&self, config: &SupplementConfig) -> DoseBounds {
        match self {
            DoseScheme::Clinical => config.clinical_dose_bounds,
            DoseScheme::Rda => config.rda_dose_bounds,
        }
    }

    /// 0 is a non-user, (0, lower) low, [lower, upper] moderate, above upper high
    pub fn categorize(&self, config: &SupplementConfig, dose: Option<f64>) -> DoseCategory {
        let DoseBounds { lower, upper } = self.bounds(config);
        match finite(dose) {
            None => DoseCategory::Unknown,
            Some(d) if d < 0.0 => DoseCategory::Unknown,
            Some(d) if d == 0.0 => DoseCategory::NonUser,
            Some(d) if d < lower => DoseCategory::Low,
            Some(d) if d <= upper => DoseCategory::Moderate,
            Some(_) => DoseCategory::High,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DoseCategory {
    NonUser,
    Low,
    Moderate,
    High,
    #[default]
    Unknown,
}

impl Categorical for DoseCategory {
    fn label(&self) -> &'static str {
        match self {
            DoseCategory::NonUser => "None",
            DoseCategory::Low => "Low",
            DoseCategory::Moderate => "Moderate",
            DoseCategory::High => "High",
            DoseCategory::Unknown => "Unknown",
        }
    }

    fn is_unknown(&self) -> bool {
        matches!(self, DoseCategory::Unknown)
    }
}

/// Derived supplement fields of one subject
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SupplementIndicators {
    /// Summed daily elemental iron over reported products, mg/day
    pub daily_iron: Option<f64>,
    pub iron_supplement_user: Option<bool>,
    /// `daily_iron` under the {18, 65} scheme
    pub iron_dose_category: DoseCategory,
    /// Reported DSQTOT total iron under the {18, 27} scheme
    pub reported_iron_dose_category: DoseCategory,
    pub any_iron_product: Option<bool>,
    pub products_reported: Option<i64>,
    pub max_days_per_month: Option<f64>,
}

/// One reported supplement product of one subject
#[derive(Debug, Clone, PartialEq)]
pub struct ProductReport {
    pub seqn: i64,
    pub product_code: Option<String>,
    pub quantity_per_day: Option<f64>,
    pub days_per_month: Option<f64>,
}

/// Classification and dose of one product report
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProductDose {
    pub is_iron: bool,
    /// Iron product whose content per serving could not be resolved
    pub unresolved: bool,
    pub daily_iron: f64,
}

/// One row per subject after aggregation
#[derive(Debug, Clone, PartialEq)]
pub struct SupplementAggregate {
    pub seqn: i64,
    pub daily_iron: f64,
    pub any_iron_product: bool,
    pub products: i64,
    pub max_days: Option<f64>,
}

/// Normalize a product code so that `"618020"`, `" 618020 "` and `"618020.0"` agree
pub fn normalize_code(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 => {
            Some(format!("{}", v as i64))
        }
        _ => Some(trimmed.to_string()),
    }
}

/// Product codes known to contain iron, with iron content per serving
#[derive(Debug, Clone)]
pub struct IronProductCatalog {
    fixed_codes: HashSet<String>,
    reference_codes: HashSet<String>,
    content: HashMap<String, f64>,
}

impl IronProductCatalog {
    /// Build the catalog from the fixed code list and an optional reference table.
    ///
    /// A reference row is iron when its ingredient name matches the configured
    /// pattern; a product's content is the largest matching amount per serving.
    pub fn new(config: &SupplementConfig, reference: Option<&DataFrame>) -> Result<Self> {
        let pattern = Regex::new(&config.ingredient_pattern)?;
        let fixed_codes: HashSet<String> = config
            .iron_product_codes
            .iter()
            .filter_map(|code| normalize_code(code))
            .collect();

        let mut reference_codes = HashSet::new();
        let mut content: HashMap<String, f64> = HashMap::new();

        match reference {
            None => warn!("No product reference; iron content cannot be resolved"),
            Some(frame)
                if !has_column(frame, supplement::REFERENCE_CODE)
                    || !has_column(frame, supplement::REFERENCE_INGREDIENT) =>
            {
                warn!(
                    "Product reference lacks {} or {}; ignoring it",
                    supplement::REFERENCE_CODE,
                    supplement::REFERENCE_INGREDIENT
                );
            }
            Some(frame) => {
                let codes = text_values(frame, supplement::REFERENCE_CODE)?;
                let ingredients = text_values(frame, supplement::REFERENCE_INGREDIENT)?;
                let amounts = f64_values(frame, supplement::REFERENCE_AMOUNT)?;

                for ((code, ingredient), amount) in codes.into_iter().zip(ingredients).zip(amounts) {
                    let (Some(code), Some(ingredient)) =
                        (code.as_deref().and_then(normalize_code), ingredient)
                    else {
                        continue;
                    };
                    if !pattern.is_match(&ingredient) {
                        continue;
                    }
                    if let Some(amount) = finite(amount).filter(|a| *a > 0.0) {
                        content
                            .entry(code.clone())
                            .and_modify(|current| *current = current.max(amount))
                            .or_insert(amount);
                    }
                    reference_codes.insert(code);
                }
            }
        }

        debug!(
            "Iron product catalog: {} fixed codes, {} reference codes, {} with content",
            fixed_codes.len(),
            reference_codes.len(),
            content.len()
        );

        Ok(Self {
            fixed_codes,
            reference_codes,
            content,
        })
    }

    pub fn is_iron(&self, code: &str) -> bool {
        self.fixed_codes.contains(code) || self.reference_codes.contains(code)
    }

    /// Elemental iron per serving, mg
    pub fn iron_content(&self, code: &str) -> Option<f64> {
        self.content.get(code).copied()
    }
}

/// Supplement deriver with its product catalog
#[derive(Debug, Clone)]
pub struct SupplementDeriver {
    config: SupplementConfig,
    catalog: IronProductCatalog,
}

impl SupplementDeriver {
    pub fn new(config: SupplementConfig, reference: Option<&DataFrame>) -> Result<Self> {
        let catalog = IronProductCatalog::new(&config, reference)?;
        Ok(Self { config, catalog })
    }

    pub fn catalog(&self) -> &IronProductCatalog {
        &self.catalog
    }

    /// Daily dose = quantity × content × days / days-in-month.
    ///
    /// Zero for non-iron products and for iron products whose content does
    /// not resolve. Missing or negative quantity and days count as zero.
    pub fn product_dose(&self, report: &ProductReport) -> ProductDose {
        let code = report.product_code.as_deref().and_then(normalize_code);
        let is_iron = code.as_deref().is_some_and(|c| self.catalog.is_iron(c));
        let content = code.as_deref().and_then(|c| self.catalog.iron_content(c));

        let daily_iron = match (is_iron, content) {
            (true, Some(content)) => {
                let quantity = finite(report.quantity_per_day).unwrap_or(0.0).max(0.0);
                let days = finite(report.days_per_month).unwrap_or(0.0).max(0.0);
                quantity * content * days / self.config.days_in_month
            }
            _ => 0.0,
        };

        ProductDose {
            is_iron,
            unresolved: is_iron && content.is_none(),
            daily_iron,
        }
    }

    /// Sum doses and take the maximum iron flag per subject
    pub fn aggregate(&self, reports: &[ProductReport]) -> Vec<SupplementAggregate> {
        let mut by_subject: BTreeMap<i64, SupplementAggregate> = BTreeMap::new();
        let mut unresolved = 0usize;

        for report in reports {
            let dose = self.product_dose(report);
            if dose.unresolved {
                unresolved += 1;
            }

            let entry = by_subject
                .entry(report.seqn)
                .or_insert_with(|| SupplementAggregate {
                    seqn: report.seqn,
                    daily_iron: 0.0,
                    any_iron_product: false,
                    products: 0,
                    max_days: None,
                });
            entry.daily_iron += dose.daily_iron;
            entry.any_iron_product |= dose.is_iron;
            entry.products += 1;
            if let Some(days) = finite(report.days_per_month) {
                entry.max_days = Some(entry.max_days.map_or(days, |m| m.max(days)));
            }
        }

        if unresolved > 0 {
            warn!(
                "{} iron product reports have no resolvable iron content; counted as 0 mg",
                unresolved
            );
        }

        by_subject.into_values().collect()
    }

    /// Read product reports from a harmonized DSQIDS table
    pub fn reports_from_frame(&self, frame: &DataFrame) -> Result<Vec<ProductReport>> {
        require_subject_id(frame, crate::constants::prefixes::SUPPLEMENT_PRODUCTS)?;

        let ids = i64_values(frame, SUBJECT_ID)?;
        let codes = text_values(frame, supplement::PRODUCT_CODE)?;
        let quantities = f64_values(frame, supplement::QUANTITY_PER_DAY)?;
        let days = f64_values(frame, supplement::DAYS_PER_MONTH)?;

        Ok(ids
            .into_iter()
            .zip(codes)
            .zip(quantities)
            .zip(days)
            .filter_map(|(((seqn, product_code), quantity_per_day), days_per_month)| {
                seqn.map(|seqn| ProductReport {
                    seqn,
                    product_code,
                    quantity_per_day,
                    days_per_month,
                })
            })
            .collect())
    }

    /// Aggregate a product report table to one row per subject for the merge.
    ///
    /// An empty input gives an empty frame, which the merge skips.
    pub fn aggregate_frame(&self, products: &DataFrame) -> Result<DataFrame> {
        if products.height() == 0 {
            return Ok(DataFrame::empty());
        }

        let reports = self.reports_from_frame(products)?;
        let aggregates = self.aggregate(&reports);
        info!(
            "Aggregated {} product reports to {} subjects",
            reports.len(),
            aggregates.len()
        );

        let frame = DataFrame::new(vec![
            Column::new(
                SUBJECT_ID.into(),
                aggregates.iter().map(|a| a.seqn).collect::<Vec<_>>(),
            ),
            Column::new(
                DAILY_IRON_COLUMN.into(),
                aggregates.iter().map(|a| a.daily_iron).collect::<Vec<_>>(),
            ),
            Column::new(
                ANY_IRON_COLUMN.into(),
                aggregates.iter().map(|a| a.any_iron_product).collect::<Vec<_>>(),
            ),
            Column::new(
                PRODUCT_COUNT_COLUMN.into(),
                aggregates.iter().map(|a| a.products).collect::<Vec<_>>(),
            ),
            Column::new(
                MAX_DAYS_COLUMN.into(),
                aggregates.iter().map(|a| a.max_days).collect::<Vec<_>>(),
            ),
        ])?;
        Ok(frame)
    }

    /// Supplement indicators for one subject.
    ///
    /// A subject from a cycle with product data who reported nothing is a
    /// non-user; a subject from a cycle without product data stays unknown.
    pub fn derive(&self, record: &SubjectRecord, covered: &HashSet<Cycle>) -> SupplementIndicators {
        let in_covered_cycle = record.cycle.is_some_and(|c| covered.contains(&c));
        let reported = finite(record.supplement_daily_iron).is_some();

        let (daily_iron, any_iron_product, products_reported) = if reported {
            (
                finite(record.supplement_daily_iron),
                record.any_iron_product.or(Some(false)),
                record.supplement_products.or(Some(0)),
            )
        } else if in_covered_cycle {
            (Some(0.0), Some(false), Some(0))
        } else {
            (None, None, None)
        };

        SupplementIndicators {
            daily_iron,
            iron_supplement_user: daily_iron.map(|d| d > 0.0),
            iron_dose_category: DoseScheme::Clinical.categorize(&self.config, daily_iron),
            reported_iron_dose_category: DoseScheme::Rda
                .categorize(&self.config, record.reported_supplement_iron),
            any_iron_product,
            products_reported,
            max_days_per_month: finite(record.supplement_max_days),
        }
    }

    /// Attach supplement indicators to every record
    pub fn apply(&self, mut records: Vec<SubjectRecord>, covered_cycles: &[Cycle]) -> Vec<SubjectRecord> {
        let covered: HashSet<Cycle> = covered_cycles.iter().copied().collect();
        for record in records.iter_mut() {
            record.supplements = self.derive(record, &covered);
        }

        let users = records
            .iter()
            .filter(|r| r.supplements.iron_supplement_user == Some(true))
            .count();
        let unknown = records
            .iter()
            .filter(|r| r.supplements.iron_supplement_user.is_none())
            .count();
        info!(
            "Supplements derived: {} iron supplement users, {} without product data",
            users, unknown
        );

        records
    }
}
