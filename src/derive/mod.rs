//! Derivation stages run over the filtered cohort.
//!
//! Each deriver reads raw fields from a [`SubjectRecord`](crate::models::SubjectRecord)
//! and writes only its own group of derived fields, so the biomarker and
//! supplement stages never observe each other's output.

pub mod biomarker;
pub mod demographics;
pub mod supplement;
pub mod weights;

/// Closed categorical recoding with an explicit unknown member
pub trait Categorical: Copy {
    /// Label written to output tables
    fn label(&self) -> &'static str;

    /// Whether this value is the unknown member
    fn is_unknown(&self) -> bool;

    /// Label, or `None` for the unknown member
    fn known_label(&self) -> Option<&'static str> {
        if self.is_unknown() {
            None
        } else {
            Some(self.label())
        }
    }
}

/// Treat NaN and infinities as missing
pub(crate) fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Strict `value < threshold`, missing when the value is missing
pub(crate) fn below(value: Option<f64>, threshold: f64) -> Option<bool> {
    finite(value).map(|v| v < threshold)
}
