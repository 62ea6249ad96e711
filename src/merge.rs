//! Person-level merge of harmonized datasets.
//!
//! Auxiliary tables join onto the demographic base by subject identifier
//! only. Required tables join inner (subjects missing them leave the cohort
//! here), optional tables join left. Every table must already hold at most
//! one row per subject. Rows whose identifier is missing or failed to parse
//! are dropped before joining and counted in the join log.

use crate::constants::SUBJECT_ID;
use crate::error::{CohortError, Result};
use crate::models::{JoinDiscipline, JoinRecord};
use crate::schema::{has_column, require_subject_id};
use polars::prelude::*;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// A harmonized table waiting to be joined onto the base
#[derive(Debug, Clone)]
pub struct AuxiliaryTable {
    pub name: String,
    pub frame: DataFrame,
    pub discipline: JoinDiscipline,
}

impl AuxiliaryTable {
    pub fn new(name: impl Into<String>, frame: DataFrame, discipline: JoinDiscipline) -> Self {
        Self {
            name: name.into(),
            frame,
            discipline,
        }
    }
}

/// Merged table and the audit trail of row counts
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub frame: DataFrame,
    pub joins: Vec<JoinRecord>,
}

/// Join auxiliary tables onto the base in the order given
pub fn merge_tables(
    base_name: &str,
    base: DataFrame,
    auxiliaries: Vec<AuxiliaryTable>,
) -> Result<MergeOutcome> {
    require_subject_id(&base, base_name)?;
    let (base, base_dropped) = drop_rows_without_subject_id(base, base_name)?;
    ensure_one_row_per_subject(&base, base_name)?;

    info!("{} base: {} rows", base_name, base.height());
    let mut joins = vec![JoinRecord {
        dataset: base_name.to_string(),
        discipline: None,
        rows_after: base.height(),
        skipped: false,
        dropped_without_id: base_dropped,
    }];

    let mut merged = base;
    for aux in auxiliaries {
        if aux.frame.height() == 0 {
            warn!(
                "{} has no rows; skipping {} join, {} rows unchanged",
                aux.name,
                aux.discipline,
                merged.height()
            );
            joins.push(JoinRecord {
                dataset: aux.name,
                discipline: Some(aux.discipline),
                rows_after: merged.height(),
                skipped: true,
                dropped_without_id: 0,
            });
            continue;
        }

        require_subject_id(&aux.frame, &aux.name)?;
        let (frame, dropped) = drop_rows_without_subject_id(aux.frame, &aux.name)?;
        ensure_one_row_per_subject(&frame, &aux.name)?;

        let right = drop_overlapping_columns(&merged, frame, &aux.name)?;
        let how = match aux.discipline {
            JoinDiscipline::Required => JoinType::Inner,
            JoinDiscipline::Optional => JoinType::Left,
        };

        merged = merged
            .lazy()
            .join(
                right.lazy(),
                [col(SUBJECT_ID)],
                [col(SUBJECT_ID)],
                JoinArgs::new(how),
            )
            .collect()?;

        info!(
            "After {} merge ({}): {} rows",
            aux.name,
            aux.discipline,
            merged.height()
        );
        joins.push(JoinRecord {
            dataset: aux.name,
            discipline: Some(aux.discipline),
            rows_after: merged.height(),
            skipped: false,
            dropped_without_id: dropped,
        });
    }

    Ok(MergeOutcome {
        frame: merged,
        joins,
    })
}

/// Remove rows whose subject identifier is null, returning how many went
pub fn drop_rows_without_subject_id(frame: DataFrame, dataset: &str) -> Result<(DataFrame, usize)> {
    let missing = frame.column(SUBJECT_ID)?.null_count();
    if missing == 0 {
        return Ok((frame, 0));
    }

    warn!(
        "{}: dropping {} rows with a missing or unparseable {}",
        dataset, missing, SUBJECT_ID
    );
    let kept = frame
        .lazy()
        .filter(col(SUBJECT_ID).is_not_null())
        .collect()?;
    Ok((kept, missing))
}

/// Reject tables where a subject identifier repeats; null identifiers are
/// not compared
pub fn ensure_one_row_per_subject(frame: &DataFrame, dataset: &str) -> Result<()> {
    let ids = frame.column(SUBJECT_ID)?.cast(&DataType::Int64)?;
    let mut seen = HashSet::with_capacity(frame.height());
    let duplicates = ids
        .i64()?
        .into_iter()
        .flatten()
        .filter(|id| !seen.insert(*id))
        .count();

    if duplicates > 0 {
        return Err(CohortError::DuplicateSubjects {
            dataset: dataset.to_string(),
            duplicates,
        });
    }
    Ok(())
}

/// The left table wins on column name collisions other than the key
fn drop_overlapping_columns(left: &DataFrame, right: DataFrame, name: &str) -> Result<DataFrame> {
    let overlapping: Vec<String> = right
        .get_column_names()
        .iter()
        .map(|n| n.to_string())
        .filter(|n| n != SUBJECT_ID && has_column(left, n))
        .collect();

    if overlapping.is_empty() {
        return Ok(right);
    }

    debug!("{}: dropping columns already merged: {:?}", name, overlapping);
    Ok(right.drop_many(overlapping))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> DataFrame {
        df!(
            "SEQN" => [1i64, 2, 3, 4],
            "RIDAGEYR" => [25.0, 30.0, 35.0, 40.0],
        )
        .unwrap()
    }

    fn ids(frame: &DataFrame) -> Vec<i64> {
        frame
            .column("SEQN")
            .unwrap()
            .i64()
            .unwrap()
            .into_iter()
            .flatten()
            .collect()
    }

    #[test]
    fn test_required_join_drops_unmatched_subjects() {
        let ferritin = df!("SEQN" => [1i64, 3], "LBXFER" => [10.0, 50.0]).unwrap();
        let outcome = merge_tables(
            "DEMO",
            base(),
            vec![AuxiliaryTable::new(
                "FERTIN",
                ferritin,
                JoinDiscipline::Required,
            )],
        )
        .unwrap();

        let mut merged = ids(&outcome.frame);
        merged.sort();
        assert_eq!(merged, vec![1, 3]);
        assert_eq!(outcome.joins.len(), 2);
        assert_eq!(outcome.joins[0].rows_after, 4);
        assert_eq!(outcome.joins[1].rows_after, 2);
    }

    #[test]
    fn test_optional_join_keeps_subjects_with_nulls() {
        let bmx = df!("SEQN" => [2i64], "BMXBMI" => [22.5]).unwrap();
        let outcome = merge_tables(
            "DEMO",
            base(),
            vec![AuxiliaryTable::new("BMX", bmx, JoinDiscipline::Optional)],
        )
        .unwrap();

        assert_eq!(outcome.frame.height(), 4);
        assert_eq!(outcome.frame.column("BMXBMI").unwrap().null_count(), 3);
    }

    #[test]
    fn test_duplicate_subjects_rejected() {
        let products = df!("SEQN" => [1i64, 1], "DSDQTY" => [1.0, 2.0]).unwrap();
        let err = merge_tables(
            "DEMO",
            base(),
            vec![AuxiliaryTable::new(
                "DSQIDS",
                products,
                JoinDiscipline::Optional,
            )],
        )
        .unwrap_err();

        assert!(matches!(
            err,
            CohortError::DuplicateSubjects { duplicates: 1, .. }
        ));
    }

    #[test]
    fn test_rows_without_subject_id_are_dropped_and_counted() {
        let demo = df!(
            "SEQN" => [Some(1i64), Some(2), None, None],
            "RIDAGEYR" => [25.0, 30.0, 35.0, 40.0],
        )
        .unwrap();
        let ferritin = df!("SEQN" => [Some(1i64), None], "LBXFER" => [10.0, 50.0]).unwrap();

        let outcome = merge_tables(
            "DEMO",
            demo,
            vec![AuxiliaryTable::new(
                "FERTIN",
                ferritin,
                JoinDiscipline::Required,
            )],
        )
        .unwrap();

        assert_eq!(ids(&outcome.frame), vec![1]);
        assert_eq!(outcome.joins[0].rows_after, 2);
        assert_eq!(outcome.joins[0].dropped_without_id, 2);
        assert_eq!(outcome.joins[1].dropped_without_id, 1);
    }

    #[test]
    fn test_null_ids_are_not_duplicates() {
        let frame = df!("SEQN" => [Some(1i64), None, None]).unwrap();
        assert!(ensure_one_row_per_subject(&frame, "DEMO").is_ok());
    }

    #[test]
    fn test_empty_table_is_skipped() {
        let outcome = merge_tables(
            "DEMO",
            base(),
            vec![AuxiliaryTable::new(
                "CBC",
                DataFrame::empty(),
                JoinDiscipline::Required,
            )],
        )
        .unwrap();

        assert_eq!(outcome.frame.height(), 4);
        assert!(outcome.joins[1].skipped);
    }

    #[test]
    fn test_missing_subject_id_is_an_error() {
        let frame = df!("LBXHGB" => [13.0]).unwrap();
        let result = merge_tables(
            "DEMO",
            base(),
            vec![AuxiliaryTable::new("CBC", frame, JoinDiscipline::Required)],
        );
        assert!(matches!(result, Err(CohortError::MissingColumn { .. })));
    }

    #[test]
    fn test_colliding_columns_keep_base_values() {
        let other = df!("SEQN" => [1i64], "RIDAGEYR" => [99.0], "LBXHGB" => [13.0]).unwrap();
        let outcome = merge_tables(
            "DEMO",
            base(),
            vec![AuxiliaryTable::new("CBC", other, JoinDiscipline::Required)],
        )
        .unwrap();

        let age = outcome.frame.column("RIDAGEYR").unwrap().f64().unwrap().get(0);
        assert_eq!(age, Some(25.0));
        assert!(!has_column(&outcome.frame, "RIDAGEYR_right"));
    }
}
