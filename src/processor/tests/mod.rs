//! Integration tests for the processor module
//!
//! Runs the complete pipeline over small synthetic NHANES extracts written
//! to a temporary directory.

pub mod error_handling;

use std::fs;
use std::path::Path;

/// Demographics rows: SEQN, sex, age, race, education, PIR, weight, stratum, PSU, pregnancy
pub const DEMO_D: &str = "\
SEQN,RIAGENDR,RIDAGEYR,RIDRETH1,DMDEDUC2,INDFMPIR,WTMEC2YR,SDMVSTRA,SDMVPSU,RIDEXPRG,DMDHHSIZ
1,2,25,3,4,0.8,10000,100,1,2,3
2,2,30,4,5,2.0,12000,100,2,2,4
3,1,30,3,4,1.5,9000,101,1,,2
4,2,50,1,3,3.0,8000,101,2,,1
5,2,28,2,2,4.2,11000,102,1,1,2
6,2,40,5,4,1.1,9500,102,2,2,5
7,2,35,3,5,,10500,100,1,2,2
";

pub const FERTIN_D: &str = "\
SEQN,LBXFER,LBDFERLC
1,8.5,0
2,40,0
3,60,0
4,30,0
5,12,0
6,1.5,1
";

pub const CBC_D: &str = "\
SEQN,LBXHGB,LBXMCVSI,LBXWBCSI
1,12.6,79.0,6.1
2,13.5,90.0,5.5
3,15.0,91.0,7.0
4,12.5,88.0,6.0
5,10.5,82.0,5.0
6,11.0,74.0,6.4
7,12.8,89.0,5.9
";

pub const DSQIDS_D: &str = "\
SEQN,DSDSUPP,DSDQTY,DSDSRVY
1,618020,1,30
1,300100,2,15
6,624010,1,15
";

pub const DSBI: &str = "\
supplement_code,ingredient_name,amount_per_serving
618020,Iron,27
618020,Folic acid,0.8
624010,Ferrous sulfate,65
300100,Vitamin C,500
";

/// Write a file into the data directory
pub fn write_file(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

/// Minimal dataset: one cycle of demographics, ferritin and blood counts
pub fn write_minimal_dataset(dir: &Path) {
    write_file(dir, "DEMO_D.csv", DEMO_D);
    write_file(dir, "FERTIN_D.csv", FERTIN_D);
    write_file(dir, "CBC_D.csv", CBC_D);
}

/// Minimal dataset plus supplement product reports and the product reference
pub fn write_dataset_with_supplements(dir: &Path) {
    write_minimal_dataset(dir);
    write_file(dir, "DSQIDS_D.csv", DSQIDS_D);
    write_file(dir, "DSBI.csv", DSBI);
}
