//! Output writing for a pipeline run
//!
//! Writes the analytic table, the exclusion ledger, the descriptive tables
//! (CSV and LaTeX) and the JSON run summary into one output directory.

use super::RunSummary;
use crate::cohort::ExclusionLedger;
use crate::constants::{
    ANALYTIC_TABLE_FILENAME, DELIMITED_EXTENSION, EXCLUSION_LEDGER_FILENAME,
    RUN_SUMMARY_FILENAME, TABLE1_STEM, TABLE2_STEM, TABLES_DIR_NAME,
};
use crate::error::Result;
use crate::models::SubjectRecord;
use crate::records::records_to_frame;
use crate::summary::{
    CharacteristicRow, PrevalenceRow, characteristics_frame, characteristics_latex,
    prevalence_frame, prevalence_latex,
};

use polars::prelude::{Column, CsvWriter, DataFrame, SerWriter};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Writer rooted at the run's output directory
#[derive(Debug, Clone)]
pub struct OutputWriter {
    output_dir: PathBuf,
}

impl OutputWriter {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn tables_dir(&self) -> PathBuf {
        self.output_dir.join(TABLES_DIR_NAME)
    }

    pub fn analytic_table_path(&self) -> PathBuf {
        self.output_dir.join(ANALYTIC_TABLE_FILENAME)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.output_dir.join(EXCLUSION_LEDGER_FILENAME)
    }

    pub fn run_summary_path(&self) -> PathBuf {
        self.output_dir.join(RUN_SUMMARY_FILENAME)
    }

    /// Table 1 and Table 2 files, CSV then TeX for each
    pub fn table_paths(&self) -> [PathBuf; 4] {
        let dir = self.tables_dir();
        [
            dir.join(format!("{}.{}", TABLE1_STEM, DELIMITED_EXTENSION)),
            dir.join(format!("{}.tex", TABLE1_STEM)),
            dir.join(format!("{}.{}", TABLE2_STEM, DELIMITED_EXTENSION)),
            dir.join(format!("{}.tex", TABLE2_STEM)),
        ]
    }

    /// Create the output and tables directories and remove tables left by an
    /// earlier run
    pub fn prepare(&self) -> Result<()> {
        fs::create_dir_all(self.tables_dir())?;
        for path in self.table_paths() {
            if path.is_file() {
                fs::remove_file(&path)?;
                debug!("Removed stale table {}", path.display());
            }
        }
        debug!("Output directory ready: {}", self.output_dir.display());
        Ok(())
    }

    /// One row per cohort member with raw and derived columns
    pub fn write_analytic_table(&self, cohort: &[SubjectRecord]) -> Result<PathBuf> {
        let mut frame = records_to_frame(cohort)?;
        let path = self.analytic_table_path();
        write_csv(&mut frame, &path)?;
        info!(
            "Analytic table: {} rows, {} columns -> {}",
            frame.height(),
            frame.width(),
            path.display()
        );
        Ok(path)
    }

    /// Ledger columns: exclusion_reason, count, remaining
    pub fn write_ledger(&self, ledger: &ExclusionLedger) -> Result<PathBuf> {
        let mut frame = ledger_frame(ledger)?;
        let path = self.ledger_path();
        write_csv(&mut frame, &path)?;
        info!("Exclusion ledger -> {}", path.display());
        Ok(path)
    }

    /// Write both summary tables as CSV and LaTeX
    pub fn write_tables(
        &self,
        characteristics: &[CharacteristicRow],
        prevalence: &[PrevalenceRow],
        generated: &str,
    ) -> Result<Vec<PathBuf>> {
        let [table1_csv, table1_tex, table2_csv, table2_tex] = self.table_paths();

        write_csv(&mut characteristics_frame(characteristics)?, &table1_csv)?;
        fs::write(&table1_tex, characteristics_latex(characteristics, generated))?;
        write_csv(&mut prevalence_frame(prevalence)?, &table2_csv)?;
        fs::write(&table2_tex, prevalence_latex(prevalence, generated))?;

        info!("Summary tables written to {}", self.tables_dir().display());
        Ok(vec![table1_csv, table1_tex, table2_csv, table2_tex])
    }

    pub fn write_run_summary(&self, summary: &RunSummary) -> Result<PathBuf> {
        let path = self.run_summary_path();
        fs::write(&path, serde_json::to_string_pretty(summary)?)?;
        info!("Run summary -> {}", path.display());
        Ok(path)
    }
}

/// Ledger as a frame, one row per cascade step
pub fn ledger_frame(ledger: &ExclusionLedger) -> Result<DataFrame> {
    let steps = &ledger.steps;
    Ok(DataFrame::new(vec![
        Column::new(
            "exclusion_reason".into(),
            steps.iter().map(|s| s.reason.clone()).collect::<Vec<_>>(),
        ),
        Column::new(
            "count".into(),
            steps.iter().map(|s| s.excluded as u64).collect::<Vec<_>>(),
        ),
        Column::new(
            "remaining".into(),
            steps.iter().map(|s| s.remaining as u64).collect::<Vec<_>>(),
        ),
    ])?)
}

fn write_csv(frame: &mut DataFrame, path: &Path) -> Result<()> {
    let mut file = fs::File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(frame)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cohort::ExclusionStep;
    use tempfile::TempDir;

    fn ledger() -> ExclusionLedger {
        ExclusionLedger {
            initial: 100,
            steps: vec![
                ExclusionStep {
                    reason: "age_18_45".to_string(),
                    excluded: 60,
                    remaining: 40,
                },
                ExclusionStep {
                    reason: "female".to_string(),
                    excluded: 20,
                    remaining: 20,
                },
            ],
        }
    }

    #[test]
    fn test_ledger_csv_layout() {
        let temp_dir = TempDir::new().unwrap();
        let writer = OutputWriter::new(temp_dir.path().to_path_buf());
        writer.prepare().unwrap();

        let path = writer.write_ledger(&ledger()).unwrap();
        let content = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "exclusion_reason,count,remaining");
        assert_eq!(lines[1], "age_18_45,60,40");
        assert_eq!(lines[2], "female,20,20");
    }

    #[test]
    fn test_prepare_creates_tables_dir() {
        let temp_dir = TempDir::new().unwrap();
        let writer = OutputWriter::new(temp_dir.path().join("nested").join("out"));
        writer.prepare().unwrap();
        assert!(writer.tables_dir().is_dir());
    }

    #[test]
    fn test_tables_written_in_both_formats() {
        let temp_dir = TempDir::new().unwrap();
        let writer = OutputWriter::new(temp_dir.path().to_path_buf());
        writer.prepare().unwrap();

        let rows = vec![CharacteristicRow {
            characteristic: "N".to_string(),
            n: 3,
            value: "3".to_string(),
        }];
        let written = writer
            .write_tables(&rows, &[], "2024-01-01T00:00:00Z")
            .unwrap();

        assert_eq!(written.len(), 4);
        assert!(written.iter().all(|p| p.exists()));
        let tex = fs::read_to_string(writer.tables_dir().join("table1_characteristics.tex")).unwrap();
        assert!(tex.contains("2024-01-01T00:00:00Z"));
    }

    #[test]
    fn test_prepare_removes_tables_from_earlier_run() {
        let temp_dir = TempDir::new().unwrap();
        let writer = OutputWriter::new(temp_dir.path().to_path_buf());
        writer.prepare().unwrap();
        writer.write_tables(&[], &[], "2024-01-01T00:00:00Z").unwrap();
        assert!(writer.table_paths().iter().all(|p| p.exists()));

        let unrelated = writer.tables_dir().join("notes.txt");
        fs::write(&unrelated, "kept").unwrap();

        writer.prepare().unwrap();
        assert!(writer.table_paths().iter().all(|p| !p.exists()));
        assert!(unrelated.exists());
    }
}
