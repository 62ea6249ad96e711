//! Error handling integration tests

use super::{CBC_D, DEMO_D, FERTIN_D, write_file};
use crate::config::StudyConfig;
use crate::error::CohortError;
use crate::models::Cycle;
use crate::processor::CohortProcessor;
use std::fs;
use tempfile::TempDir;

fn data_dir(temp_dir: &TempDir) -> std::path::PathBuf {
    let dir = temp_dir.path().join("data");
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn processor(temp_dir: &TempDir) -> CohortProcessor {
    let config = StudyConfig::default()
        .with_data_dir(temp_dir.path().join("data"))
        .with_output_dir(temp_dir.path().join("output"))
        .with_cycles(vec![Cycle::D]);
    CohortProcessor::new(config).unwrap().with_progress(false)
}

#[test]
fn test_nonexistent_data_dir() {
    let temp_dir = TempDir::new().unwrap();
    let config = StudyConfig::default().with_data_dir(temp_dir.path().join("nonexistent"));

    let result = CohortProcessor::new(config);
    assert!(matches!(result, Err(CohortError::Configuration { .. })));
}

#[test]
fn test_invalid_config_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config = StudyConfig::default()
        .with_data_dir(data_dir(&temp_dir))
        .with_cycles(Vec::new());

    assert!(CohortProcessor::new(config).is_err());
}

#[test]
fn test_missing_demographics_is_fatal() {
    let temp_dir = TempDir::new().unwrap();
    let dir = data_dir(&temp_dir);
    write_file(&dir, "FERTIN_D.csv", FERTIN_D);
    write_file(&dir, "CBC_D.csv", CBC_D);

    match processor(&temp_dir).process() {
        Err(CohortError::CriticalDatasetMissing { prefix }) => assert_eq!(prefix, "DEMO"),
        other => panic!("Expected CriticalDatasetMissing, got {:?}", other.map(|_| ())),
    }
    assert!(!temp_dir.path().join("output").join("processed_data.csv").exists());
}

#[test]
fn test_missing_ferritin_is_fatal() {
    let temp_dir = TempDir::new().unwrap();
    let dir = data_dir(&temp_dir);
    write_file(&dir, "DEMO_D.csv", DEMO_D);
    write_file(&dir, "CBC_D.csv", CBC_D);

    match processor(&temp_dir).build_cohort() {
        Err(CohortError::CriticalDatasetMissing { prefix }) => assert_eq!(prefix, "FERTIN"),
        other => panic!("Expected CriticalDatasetMissing, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_missing_blood_count_skips_join() {
    let temp_dir = TempDir::new().unwrap();
    let dir = data_dir(&temp_dir);
    write_file(&dir, "DEMO_D.csv", DEMO_D);
    write_file(&dir, "FERTIN_D.csv", FERTIN_D);

    let build = processor(&temp_dir).build_cohort().unwrap();
    let cbc = build.joins.iter().find(|j| j.dataset == "CBC").unwrap();
    assert!(cbc.skipped);

    // Without hemoglobin every subject fails the last criterion.
    assert!(build.cohort.is_empty());
    assert_eq!(build.ledger.steps.last().unwrap().reason, "missing_hemoglobin");
}

#[test]
fn test_duplicate_subjects_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let dir = data_dir(&temp_dir);
    write_file(&dir, "DEMO_D.csv", DEMO_D);
    write_file(&dir, "FERTIN_D.csv", "SEQN,LBXFER,LBDFERLC\n1,8.5,0\n1,9.0,0\n");
    write_file(&dir, "CBC_D.csv", CBC_D);

    match processor(&temp_dir).build_cohort() {
        Err(CohortError::DuplicateSubjects { dataset, duplicates }) => {
            assert_eq!(dataset, "FERTIN");
            assert_eq!(duplicates, 1);
        }
        other => panic!("Expected DuplicateSubjects, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_unparseable_subject_ids_are_dropped() {
    let temp_dir = TempDir::new().unwrap();
    let dir = data_dir(&temp_dir);
    write_file(
        &dir,
        "DEMO_D.csv",
        "\
SEQN,RIAGENDR,RIDAGEYR,RIDEXPRG,WTMEC2YR
1,2,25,2,10000
2,2,30,2,12000
x,2,31,2,9000
.,2,32,2,9500
",
    );
    write_file(&dir, "FERTIN_D.csv", "SEQN,LBXFER\n1,8.5\n2,40\n");
    write_file(&dir, "CBC_D.csv", "SEQN,LBXHGB\n1,12.6\n2,13.5\n");

    let build = processor(&temp_dir).build_cohort().unwrap();
    let ids: Vec<i64> = build.cohort.iter().map(|r| r.seqn).collect();
    assert_eq!(ids, vec![1, 2]);

    let demo = build.joins.iter().find(|j| j.dataset == "DEMO").unwrap();
    assert_eq!(demo.dropped_without_id, 2);
    assert_eq!(demo.rows_after, 2);
}

#[test]
fn test_unreadable_cycle_is_skipped() {
    let temp_dir = TempDir::new().unwrap();
    let dir = data_dir(&temp_dir);
    write_file(&dir, "DEMO_D.csv", DEMO_D);
    write_file(&dir, "FERTIN_D.csv", FERTIN_D);
    write_file(&dir, "CBC_D.csv", CBC_D);
    // Directory in place of a file cannot be read as CSV.
    fs::create_dir_all(dir.join("BMX_D.csv")).unwrap();

    let build = processor(&temp_dir).build_cohort().unwrap();
    assert_eq!(build.cohort.len(), 3);
    assert!(build.coverage["BMX"].loaded.is_empty());
}
