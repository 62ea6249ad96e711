//! Pipeline orchestration.
//!
//! Runs the stages in their fixed order: load, harmonize, aggregate
//! supplement reports, merge, filter, derive, summarize and write. Each stage
//! takes ownership of the records and hands back a new set, so no stage sees
//! another's partial output.

pub mod writer;

#[cfg(test)]
pub mod tests;

use self::writer::OutputWriter;

use crate::cohort::{ExclusionLedger, InclusionCascade};
use crate::config::StudyConfig;
use crate::constants::prefixes;
use crate::derive::biomarker::BiomarkerDeriver;
use crate::derive::demographics;
use crate::derive::supplement::SupplementDeriver;
use crate::derive::weights::{SurveyDesign, WeightAdjuster, WeightSummary};
use crate::error::{CohortError, Result};
use crate::loader::{DatasetLoader, LoadedTable};
use crate::merge::{AuxiliaryTable, merge_tables};
use crate::models::{
    Cycle, CycleCoverage, DatasetKind, JoinDiscipline, JoinRecord, ProcessingStats, SubjectRecord,
};
use crate::records::records_from_frame;
use crate::summary::{characteristics_table, prevalence_table};

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use polars::prelude::DataFrame;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Counts of the main derived indicators in the cohort
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndicatorCounts {
    pub cohort: usize,
    pub analytic_sample: usize,
    pub idwa: usize,
    pub iron_deficient: usize,
    pub anemic: usize,
    pub floor_substituted: usize,
    pub iron_supplement_users: usize,
    pub outlier_weights: usize,
}

impl IndicatorCounts {
    pub fn from_cohort(cohort: &[SubjectRecord]) -> Self {
        let count = |pred: fn(&SubjectRecord) -> bool| cohort.iter().filter(|r| pred(r)).count();
        Self {
            cohort: cohort.len(),
            analytic_sample: count(|r| r.biomarkers.analytic_sample),
            idwa: count(|r| r.biomarkers.idwa == Some(true)),
            iron_deficient: count(|r| r.biomarkers.iron_deficient == Some(true)),
            anemic: count(|r| r.biomarkers.anemic == Some(true)),
            floor_substituted: count(|r| r.biomarkers.floor_substituted),
            iron_supplement_users: count(|r| r.supplements.iron_supplement_user == Some(true)),
            outlier_weights: count(|r| r.weights.outlier == Some(true)),
        }
    }
}

/// Machine-readable audit of one run, written as `run_summary.json`
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub generated_at: String,
    pub cycles: Vec<Cycle>,
    pub datasets: BTreeMap<String, CycleCoverage>,
    pub joins: Vec<JoinRecord>,
    pub exclusions: ExclusionLedger,
    pub weights: WeightSummary,
    pub survey_design: SurveyDesign,
    pub indicators: IndicatorCounts,
}

/// Everything the derivation stages produce, before any file is written
#[derive(Debug, Clone)]
pub struct CohortBuild {
    pub cohort: Vec<SubjectRecord>,
    pub ledger: ExclusionLedger,
    pub coverage: BTreeMap<String, CycleCoverage>,
    pub joins: Vec<JoinRecord>,
    pub weights: WeightSummary,
    pub survey_design: SurveyDesign,
    pub subjects_merged: usize,
}

/// Main processor for the IDWA cohort
#[derive(Debug)]
pub struct CohortProcessor {
    config: StudyConfig,
    loader: DatasetLoader,
    show_progress: bool,
}

impl CohortProcessor {
    /// Create a processor; the configuration is validated here
    pub fn new(config: StudyConfig) -> Result<Self> {
        config.validate()?;
        if !config.data_dir.is_dir() {
            return Err(CohortError::configuration(format!(
                "data directory {} does not exist",
                config.data_dir.display()
            )));
        }

        Ok(Self {
            loader: DatasetLoader::new(config.data_dir.clone()),
            config,
            show_progress: true,
        })
    }

    /// Toggle the spinner and the colored run summary
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn config(&self) -> &StudyConfig {
        &self.config
    }

    /// Run the whole pipeline and write every output
    pub fn process(&self) -> Result<ProcessingStats> {
        let start_time = Instant::now();
        if self.show_progress {
            println!("{}", "Starting IDWA cohort derivation".bright_green().bold());
            println!(
                "  {} {}",
                "Data:".bright_cyan(),
                self.config.data_dir.display()
            );
            println!(
                "  {} {}",
                "Output:".bright_cyan(),
                self.config.output_dir.display()
            );
        }

        let build = self.build_cohort()?;

        let writer = OutputWriter::new(self.config.output_dir.clone());
        writer.prepare()?;
        let generated_at = chrono::Utc::now().to_rfc3339();

        writer.write_analytic_table(&build.cohort)?;
        writer.write_ledger(&build.ledger)?;

        if self.config.write_tables {
            let table1 = characteristics_table(&build.cohort);
            let table2 = prevalence_table(&build.cohort);
            writer.write_tables(&table1, &table2, &generated_at)?;
        } else {
            debug!("Summary tables disabled");
        }

        let indicators = IndicatorCounts::from_cohort(&build.cohort);
        let summary = RunSummary {
            generated_at,
            cycles: self.config.cycles.clone(),
            datasets: build.coverage.clone(),
            joins: build.joins.clone(),
            exclusions: build.ledger.clone(),
            weights: build.weights.clone(),
            survey_design: build.survey_design.clone(),
            indicators: indicators.clone(),
        };
        writer.write_run_summary(&summary)?;

        let stats = ProcessingStats {
            subjects_merged: build.subjects_merged,
            cohort_size: indicators.cohort,
            idwa_cases: indicators.idwa,
            iron_supplement_users: indicators.iron_supplement_users,
            outlier_weights: indicators.outlier_weights,
            processing_time_ms: start_time.elapsed().as_millis(),
        };

        if self.show_progress {
            self.print_summary(&build, &stats);
        }

        Ok(stats)
    }

    /// Load, merge, filter and derive, without writing anything
    pub fn build_cohort(&self) -> Result<CohortBuild> {
        let cycles = &self.config.cycles;

        let progress = if self.show_progress {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
            {
                bar.set_style(style.tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ "));
            }
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        } else {
            ProgressBar::hidden()
        };

        // Load every dataset kind across the requested cycles
        let mut tables: HashMap<DatasetKind, LoadedTable> = HashMap::new();
        for kind in DatasetKind::ALL {
            progress.set_message(format!("Loading {}...", kind));
            let table = self.loader.load_all(kind.prefix(), cycles)?;

            if kind.is_critical() && table.is_empty() {
                progress.finish_and_clear();
                return Err(CohortError::CriticalDatasetMissing {
                    prefix: kind.prefix().to_string(),
                });
            }
            tables.insert(kind, table);
        }

        let coverage: BTreeMap<String, CycleCoverage> = tables
            .values()
            .map(|t| (t.prefix.clone(), t.coverage.clone()))
            .collect();

        // Harmonize
        progress.set_message("Harmonizing columns...");
        let mut harmonized = HashMap::new();
        for (kind, table) in tables {
            harmonized.insert(kind, kind.column_spec().harmonize(table.frame)?);
        }

        // Aggregate product reports before they may be joined
        progress.set_message("Aggregating supplement reports...");
        let reference = self.loader.load_reference(prefixes::PRODUCT_REFERENCE);
        let supplements = SupplementDeriver::new(self.config.supplements.clone(), reference.as_ref())?;
        let product_cycles = coverage
            .get(prefixes::SUPPLEMENT_PRODUCTS)
            .map(|c| c.loaded.clone())
            .unwrap_or_default();
        let product_aggregate = match harmonized.remove(&DatasetKind::SupplementProducts) {
            Some(products) => supplements.aggregate_frame(&products)?,
            None => DataFrame::empty(),
        };

        // Merge
        progress.set_message("Merging datasets...");
        let base = harmonized
            .remove(&DatasetKind::Demographics)
            .ok_or_else(|| CohortError::CriticalDatasetMissing {
                prefix: prefixes::DEMOGRAPHICS.to_string(),
            })?;

        let mut auxiliaries = Vec::new();
        for kind in DatasetKind::ALL {
            let (Some(discipline), Some(frame)) = (kind.join_discipline(), harmonized.remove(&kind))
            else {
                continue;
            };
            auxiliaries.push(AuxiliaryTable::new(kind.prefix(), frame, discipline));
        }
        auxiliaries.push(AuxiliaryTable::new(
            prefixes::SUPPLEMENT_PRODUCTS,
            product_aggregate,
            JoinDiscipline::Optional,
        ));

        let merged = merge_tables(prefixes::DEMOGRAPHICS, base, auxiliaries)?;
        // Joins do not preserve row order
        let mut records = records_from_frame(&merged.frame)?;
        records.sort_by_key(|r| r.seqn);
        let subjects_merged = records.len();

        // Filter, then derive on the survivors
        progress.set_message("Applying inclusion criteria...");
        let outcome = InclusionCascade::study_default(&self.config.inclusion).apply(records);

        progress.set_message("Deriving indicators...");
        let cohort = BiomarkerDeriver::new(self.config.biomarkers.clone()).apply(outcome.cohort);
        let cohort = supplements.apply(cohort, &product_cycles);

        let adjuster = WeightAdjuster::new(self.config.weights.clone());
        let (cohort, weights) = adjuster.apply(cohort);
        let cohort = demographics::apply(cohort);
        let survey_design = adjuster.survey_design(&cohort);

        progress.finish_and_clear();
        info!(
            "Cohort built: {} merged subjects, {} in cohort",
            subjects_merged,
            cohort.len()
        );

        Ok(CohortBuild {
            cohort,
            ledger: outcome.ledger,
            coverage,
            joins: merged.joins,
            weights,
            survey_design,
            subjects_merged,
        })
    }

    fn print_summary(&self, build: &CohortBuild, stats: &ProcessingStats) {
        println!("\n{}", "Datasets".bright_yellow());
        for (prefix, coverage) in &build.coverage {
            let loaded: Vec<&str> = coverage.loaded.iter().map(|c| c.code()).collect();
            let line = format!(
                "  {:<8} {:>7} rows  cycles [{}]",
                prefix,
                coverage.rows,
                loaded.join(",")
            );
            if coverage.loaded.is_empty() {
                println!("{}", line.bright_red());
            } else if coverage.missing.is_empty() {
                println!("{}", line);
            } else {
                println!("{}", line.yellow());
            }
        }

        for join in build.joins.iter().filter(|j| j.dropped_without_id > 0) {
            println!(
                "{}",
                format!(
                    "  {:<8} {:>7} rows dropped without SEQN",
                    join.dataset, join.dropped_without_id
                )
                .yellow()
            );
        }

        println!("\n{}", "Exclusions".bright_yellow());
        println!(
            "  {:<20} {}",
            "merged",
            build.ledger.initial.to_string().bright_white().bold()
        );
        for step in &build.ledger.steps {
            println!(
                "  {:<20} -{:<7} {}",
                step.reason,
                step.excluded,
                step.remaining.to_string().bright_white()
            );
        }

        println!("\n{}", "Processing complete".bright_green().bold());
        println!(
            "  {} {}",
            "Cohort:".bright_cyan(),
            stats.cohort_size.to_string().bright_white().bold()
        );
        println!(
            "  {} {}",
            "IDWA cases:".bright_cyan(),
            stats.idwa_cases.to_string().bright_white().bold()
        );
        println!(
            "  {} {}",
            "Iron supplement users:".bright_cyan(),
            stats.iron_supplement_users
        );
        if stats.outlier_weights > 0 {
            println!(
                "  {} {}",
                "Outlier weights (flagged):".bright_yellow(),
                stats.outlier_weights
            );
        }
        println!(
            "  {} {:.2}s",
            "Time:".bright_cyan(),
            stats.processing_time_ms as f64 / 1000.0
        );
    }
}
