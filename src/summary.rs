//! Survey-weighted descriptive tables over the analytic cohort.
//!
//! Weighted estimates use the adjusted weight; subjects without a positive
//! weight count toward N but not toward weighted estimates. Tables render to
//! a polars frame for CSV output and to a booktabs LaTeX tabular.

use crate::derive::Categorical;
use crate::derive::demographics::{AgeBand, IncomeTier, RaceEthnicity};
use crate::error::Result;
use crate::models::SubjectRecord;
use polars::prelude::*;
use serde::Serialize;

/// Weighted proportion with its approximate standard error
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Proportion {
    pub estimate: f64,
    /// sqrt(p(1-p)/n); undefined for a single observation
    pub se: Option<f64>,
    pub n: usize,
}

fn usable<T: Copy>(pairs: &[(T, f64)]) -> impl Iterator<Item = (T, f64)> + '_ {
    pairs
        .iter()
        .copied()
        .filter(|(_, w)| w.is_finite() && *w > 0.0)
}

/// Weighted mean of `(value, weight)` pairs
pub fn weighted_mean(pairs: &[(f64, f64)]) -> Option<f64> {
    let (sum, total) = usable(pairs)
        .filter(|(x, _)| x.is_finite())
        .fold((0.0, 0.0), |(s, t), (x, w)| (s + x * w, t + w));
    (total > 0.0).then(|| sum / total)
}

/// Weighted standard deviation with an n/(n-1) correction
pub fn weighted_sd(pairs: &[(f64, f64)]) -> Option<f64> {
    let clean: Vec<(f64, f64)> = usable(pairs).filter(|(x, _)| x.is_finite()).collect();
    if clean.len() < 2 {
        return None;
    }
    let mean = weighted_mean(&clean)?;
    let total: f64 = clean.iter().map(|(_, w)| w).sum();
    let variance = clean.iter().map(|(x, w)| w * (x - mean).powi(2)).sum::<f64>() / total;
    let n = clean.len() as f64;
    Some((variance * n / (n - 1.0)).sqrt())
}

/// Weighted share of `true` among `(flag, weight)` pairs
pub fn weighted_proportion(pairs: &[(bool, f64)]) -> Option<Proportion> {
    let clean: Vec<(bool, f64)> = usable(pairs).collect();
    let total: f64 = clean.iter().map(|(_, w)| w).sum();
    if clean.is_empty() || total <= 0.0 {
        return None;
    }
    let estimate = clean.iter().filter(|(x, _)| *x).map(|(_, w)| w).sum::<f64>() / total;
    let n = clean.len();
    let se = (n > 1).then(|| (estimate * (1.0 - estimate) / n as f64).sqrt());
    Some(Proportion { estimate, se, n })
}

/// Quantile with linear interpolation between order statistics
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Unweighted median and interquartile bounds
pub fn median_iqr(values: &[f64]) -> Option<(f64, f64, f64)> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    Some((
        quantile(&sorted, 0.5)?,
        quantile(&sorted, 0.25)?,
        quantile(&sorted, 0.75)?,
    ))
}

fn format_mean_sd(mean: Option<f64>, sd: Option<f64>) -> String {
    match (mean, sd) {
        (Some(mean), Some(sd)) => format!("{:.1} ({:.1})", mean, sd),
        (Some(mean), None) => format!("{:.1}", mean),
        _ => "N/A".to_string(),
    }
}

fn format_percent(proportion: Option<Proportion>) -> String {
    match proportion {
        Some(Proportion {
            estimate,
            se: Some(se),
            ..
        }) => format!("{:.1} ({:.1})", estimate * 100.0, se * 100.0),
        Some(p) => format!("{:.1}", p.estimate * 100.0),
        None => "N/A".to_string(),
    }
}

fn weight(record: &SubjectRecord) -> f64 {
    record.weights.adjusted_weight.unwrap_or(f64::NAN)
}

fn value_pairs(cohort: &[SubjectRecord], get: impl Fn(&SubjectRecord) -> Option<f64>) -> Vec<(f64, f64)> {
    cohort
        .iter()
        .filter_map(|r| get(r).map(|v| (v, weight(r))))
        .collect()
}

fn flag_pairs(cohort: &[SubjectRecord], get: impl Fn(&SubjectRecord) -> Option<bool>) -> Vec<(bool, f64)> {
    cohort
        .iter()
        .filter_map(|r| get(r).map(|v| (v, weight(r))))
        .collect()
}

/// One characteristic of Table 1
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CharacteristicRow {
    pub characteristic: String,
    /// Subjects with a non-missing value
    pub n: usize,
    pub value: String,
}

impl CharacteristicRow {
    fn new(characteristic: &str, n: usize, value: String) -> Self {
        Self {
            characteristic: characteristic.to_string(),
            n,
            value,
        }
    }
}

/// IDWA prevalence within one subgroup of Table 2
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrevalenceRow {
    pub group: String,
    pub subgroup: String,
    pub n_total: usize,
    pub n_idwa: usize,
    pub prevalence: Option<f64>,
    pub se: Option<f64>,
}

impl PrevalenceRow {
    pub fn formatted(&self) -> String {
        format_percent(self.prevalence.map(|estimate| Proportion {
            estimate,
            se: self.se,
            n: self.n_total,
        }))
    }
}

/// Table 1: cohort characteristics
pub fn characteristics_table(cohort: &[SubjectRecord]) -> Vec<CharacteristicRow> {
    let mut rows = Vec::new();

    let weighted_n: f64 = cohort
        .iter()
        .filter_map(|r| r.weights.adjusted_weight)
        .filter(|w| w.is_finite() && *w > 0.0)
        .sum();
    rows.push(CharacteristicRow::new("N", cohort.len(), cohort.len().to_string()));
    rows.push(CharacteristicRow::new(
        "Weighted N",
        cohort.len(),
        format!("{:.0}", weighted_n),
    ));

    let mean_rows: [(&str, fn(&SubjectRecord) -> Option<f64>); 4] = [
        ("Age, years, mean (SD)", |r| r.age_years),
        ("Poverty income ratio, mean (SD)", |r| r.poverty_ratio),
        ("BMI, kg/m2, mean (SD)", |r| r.body.bmi),
        ("Hemoglobin, g/dL, mean (SD)", |r| r.hemoglobin),
    ];
    for (label, get) in mean_rows {
        let pairs = value_pairs(cohort, get);
        rows.push(CharacteristicRow::new(
            label,
            pairs.len(),
            format_mean_sd(weighted_mean(&pairs), weighted_sd(&pairs)),
        ));
    }

    let ferritin: Vec<f64> = cohort
        .iter()
        .filter_map(|r| r.biomarkers.ferritin_adjusted)
        .collect();
    let ferritin_value = match median_iqr(&ferritin) {
        Some((median, q1, q3)) => format!("{:.1} [{:.1}, {:.1}]", median, q1, q3),
        None => "N/A".to_string(),
    };
    rows.push(CharacteristicRow::new(
        "Ferritin, ng/mL, median [IQR]",
        ferritin.len(),
        ferritin_value,
    ));

    let prevalence_rows: [(&str, fn(&SubjectRecord) -> Option<bool>); 4] = [
        ("IDWA, % (SE)", |r| r.biomarkers.idwa),
        ("Iron deficiency, % (SE)", |r| r.biomarkers.iron_deficient),
        ("Anemia, % (SE)", |r| r.biomarkers.anemic),
        ("Iron supplement use, % (SE)", |r| r.supplements.iron_supplement_user),
    ];
    for (label, get) in prevalence_rows {
        let pairs = flag_pairs(cohort, get);
        rows.push(CharacteristicRow::new(
            label,
            pairs.len(),
            format_percent(weighted_proportion(&pairs)),
        ));
    }

    rows
}

fn prevalence_row(group: &str, subgroup: &str, members: &[&SubjectRecord]) -> Option<PrevalenceRow> {
    if members.is_empty() {
        return None;
    }
    let pairs: Vec<(bool, f64)> = members
        .iter()
        .filter_map(|r| r.biomarkers.idwa.map(|v| (v, weight(r))))
        .collect();
    let proportion = weighted_proportion(&pairs);

    Some(PrevalenceRow {
        group: group.to_string(),
        subgroup: subgroup.to_string(),
        n_total: members.len(),
        n_idwa: members
            .iter()
            .filter(|r| r.biomarkers.idwa == Some(true))
            .count(),
        prevalence: proportion.map(|p| p.estimate),
        se: proportion.and_then(|p| p.se),
    })
}

fn subgroup_rows<K: Categorical + PartialEq>(
    cohort: &[SubjectRecord],
    group: &str,
    levels: &[K],
    key: impl Fn(&SubjectRecord) -> K,
) -> Vec<PrevalenceRow> {
    levels
        .iter()
        .filter_map(|level| {
            let members: Vec<&SubjectRecord> = cohort.iter().filter(|r| key(r) == *level).collect();
            prevalence_row(group, level.label(), &members)
        })
        .collect()
}

/// Table 2: IDWA prevalence overall and by subgroup; empty subgroups omitted
pub fn prevalence_table(cohort: &[SubjectRecord]) -> Vec<PrevalenceRow> {
    let mut rows = Vec::new();

    let everyone: Vec<&SubjectRecord> = cohort.iter().collect();
    rows.extend(prevalence_row("Overall", "All", &everyone));

    rows.extend(subgroup_rows(cohort, "Age Group", &AgeBand::ALL, |r| {
        r.demographics.age_band
    }));
    rows.extend(subgroup_rows(
        cohort,
        "Race/Ethnicity",
        &RaceEthnicity::ALL,
        |r| r.demographics.race_ethnicity,
    ));
    rows.extend(subgroup_rows(cohort, "Poverty Status", &IncomeTier::ALL, |r| {
        r.demographics.income_tier
    }));

    for (user, label) in [(false, "No"), (true, "Yes")] {
        let members: Vec<&SubjectRecord> = cohort
            .iter()
            .filter(|r| r.supplements.iron_supplement_user == Some(user))
            .collect();
        rows.extend(prevalence_row("Iron Supplement", label, &members));
    }

    rows
}

pub fn characteristics_frame(rows: &[CharacteristicRow]) -> Result<DataFrame> {
    Ok(DataFrame::new(vec![
        Column::new(
            "characteristic".into(),
            rows.iter().map(|r| r.characteristic.as_str()).collect::<Vec<_>>(),
        ),
        Column::new(
            "n".into(),
            rows.iter().map(|r| r.n as u64).collect::<Vec<_>>(),
        ),
        Column::new(
            "value".into(),
            rows.iter().map(|r| r.value.as_str()).collect::<Vec<_>>(),
        ),
    ])?)
}

pub fn prevalence_frame(rows: &[PrevalenceRow]) -> Result<DataFrame> {
    Ok(DataFrame::new(vec![
        Column::new(
            "group".into(),
            rows.iter().map(|r| r.group.as_str()).collect::<Vec<_>>(),
        ),
        Column::new(
            "subgroup".into(),
            rows.iter().map(|r| r.subgroup.as_str()).collect::<Vec<_>>(),
        ),
        Column::new(
            "n_total".into(),
            rows.iter().map(|r| r.n_total as u64).collect::<Vec<_>>(),
        ),
        Column::new(
            "n_idwa".into(),
            rows.iter().map(|r| r.n_idwa as u64).collect::<Vec<_>>(),
        ),
        Column::new(
            "idwa_prevalence".into(),
            rows.iter().map(|r| r.prevalence).collect::<Vec<_>>(),
        ),
        Column::new(
            "idwa_se".into(),
            rows.iter().map(|r| r.se).collect::<Vec<_>>(),
        ),
        Column::new(
            "idwa_pct".into(),
            rows.iter().map(|r| r.formatted()).collect::<Vec<_>>(),
        ),
    ])?)
}

/// Escape text for a LaTeX table cell
pub fn escape_latex(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '>' if chars.peek() == Some(&'=') => {
                chars.next();
                out.push_str("$\\geq$");
            }
            '<' => out.push_str("$<$"),
            '>' => out.push_str("$>$"),
            '%' | '&' | '_' | '#' | '$' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

fn latex_tabular(caption: &str, header: &[&str], align: &str, body: Vec<String>, generated: &str) -> String {
    let mut lines = vec![
        format!("% Generated {}", generated),
        "\\begin{table}[htbp]".to_string(),
        "\\centering".to_string(),
        format!("\\caption{{{}}}", escape_latex(caption)),
        format!("\\begin{{tabular}}{{{}}}", align),
        "\\toprule".to_string(),
        format!("{} \\\\", header.join(" & ")),
        "\\midrule".to_string(),
    ];
    lines.extend(body);
    lines.push("\\bottomrule".to_string());
    lines.push("\\end{tabular}".to_string());
    lines.push("\\end{table}".to_string());
    lines.join("\n") + "\n"
}

pub fn characteristics_latex(rows: &[CharacteristicRow], generated: &str) -> String {
    let body = rows
        .iter()
        .map(|r| format!("{} & {} \\\\", escape_latex(&r.characteristic), escape_latex(&r.value)))
        .collect();
    latex_tabular(
        "Characteristics of the study population",
        &["Characteristic", "Value"],
        "lr",
        body,
        generated,
    )
}

pub fn prevalence_latex(rows: &[PrevalenceRow], generated: &str) -> String {
    let mut body = Vec::new();
    let mut current_group: Option<&str> = None;
    for row in rows {
        if current_group != Some(row.group.as_str()) {
            if current_group.is_some() {
                body.push("\\addlinespace".to_string());
            }
            body.push(format!("\\textbf{{{}}} & & & \\\\", escape_latex(&row.group)));
            current_group = Some(row.group.as_str());
        }
        body.push(format!(
            "\\quad {} & {} & {} & {} \\\\",
            escape_latex(&row.subgroup),
            row.n_total,
            row.n_idwa,
            escape_latex(&row.formatted())
        ));
    }
    latex_tabular(
        "Weighted prevalence of IDWA by subgroup",
        &["Subgroup", "N", "IDWA cases", "Prevalence, % (SE)"],
        "lrrr",
        body,
        generated,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derive::demographics;

    fn member(seqn: i64, idwa: bool, weight: f64, age: f64, race: i64) -> SubjectRecord {
        let mut record = SubjectRecord {
            age_years: Some(age),
            race_code: Some(race),
            hemoglobin: Some(13.0),
            ..SubjectRecord::new(seqn)
        };
        record.biomarkers.idwa = Some(idwa);
        record.biomarkers.ferritin_adjusted = Some(if idwa { 10.0 } else { 40.0 });
        record.weights.adjusted_weight = Some(weight);
        record.supplements.iron_supplement_user = Some(false);
        record.demographics = demographics::recode(&record);
        record
    }

    #[test]
    fn test_weighted_mean_ignores_bad_weights() {
        let pairs = [(10.0, 1.0), (20.0, 3.0), (99.0, 0.0), (99.0, f64::NAN), (99.0, -2.0)];
        assert_eq!(weighted_mean(&pairs), Some(17.5));
        assert_eq!(weighted_mean(&[]), None);
    }

    #[test]
    fn test_weighted_sd_small_sample_correction() {
        // Equal weights reduce to the sample SD
        let pairs = [(2.0, 5.0), (4.0, 5.0), (6.0, 5.0)];
        let sd = weighted_sd(&pairs).unwrap();
        assert!((sd - 2.0).abs() < 1e-9);
        assert_eq!(weighted_sd(&[(1.0, 1.0)]), None);
    }

    #[test]
    fn test_weighted_proportion_and_se() {
        let pairs = [(true, 1.0), (false, 3.0), (true, 0.0)];
        let p = weighted_proportion(&pairs).unwrap();
        assert!((p.estimate - 0.25).abs() < 1e-12);
        assert_eq!(p.n, 2);
        let expected_se = (0.25f64 * 0.75 / 2.0).sqrt();
        assert!((p.se.unwrap() - expected_se).abs() < 1e-12);

        let single = weighted_proportion(&[(true, 2.0)]).unwrap();
        assert_eq!(single.se, None);
    }

    #[test]
    fn test_median_iqr_interpolates() {
        let (median, q1, q3) = median_iqr(&[4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_eq!(median, 2.5);
        assert_eq!(q1, 1.75);
        assert_eq!(q3, 3.25);
        assert_eq!(median_iqr(&[]), None);
    }

    #[test]
    fn test_characteristics_table() {
        let cohort = vec![
            member(1, true, 1000.0, 20.0, 1),
            member(2, false, 3000.0, 30.0, 3),
        ];
        let rows = characteristics_table(&cohort);

        assert_eq!(rows[0].value, "2");
        assert_eq!(rows[1].value, "4000");
        let idwa = rows.iter().find(|r| r.characteristic.starts_with("IDWA")).unwrap();
        assert!(idwa.value.starts_with("25.0"));
        let ferritin = rows
            .iter()
            .find(|r| r.characteristic.starts_with("Ferritin"))
            .unwrap();
        assert_eq!(ferritin.value, "25.0 [17.5, 32.5]");
    }

    #[test]
    fn test_prevalence_table_omits_empty_subgroups() {
        let cohort = vec![
            member(1, true, 1.0, 20.0, 1),
            member(2, false, 1.0, 22.0, 1),
            member(3, true, 1.0, 44.0, 4),
        ];
        let rows = prevalence_table(&cohort);

        let overall = &rows[0];
        assert_eq!(overall.group, "Overall");
        assert_eq!(overall.n_total, 3);
        assert_eq!(overall.n_idwa, 2);

        let ages: Vec<&str> = rows
            .iter()
            .filter(|r| r.group == "Age Group")
            .map(|r| r.subgroup.as_str())
            .collect();
        assert_eq!(ages, vec!["18-25", "41-45"]);

        let races: Vec<&str> = rows
            .iter()
            .filter(|r| r.group == "Race/Ethnicity")
            .map(|r| r.subgroup.as_str())
            .collect();
        assert_eq!(races, vec!["Mexican American", "Non-Hispanic Black"]);

        assert!(rows.iter().any(|r| r.group == "Iron Supplement" && r.subgroup == "No"));
        assert!(!rows.iter().any(|r| r.group == "Iron Supplement" && r.subgroup == "Yes"));
    }

    #[test]
    fn test_latex_escaping() {
        assert_eq!(escape_latex("High (>=3.5)"), "High ($\\geq$3.5)");
        assert_eq!(escape_latex("IDWA, % (SE)"), "IDWA, \\% (SE)");
        assert_eq!(escape_latex("<18"), "$<$18");
    }

    #[test]
    fn test_latex_table_structure() {
        let cohort = vec![member(1, true, 1.0, 20.0, 1)];
        let tex = prevalence_latex(&prevalence_table(&cohort), "2026-01-01T00:00:00Z");
        assert!(tex.contains("\\toprule"));
        assert!(tex.contains("\\textbf{Overall}"));
        assert!(tex.trim_end().ends_with("\\end{table}"));
    }

    #[test]
    fn test_frames_have_one_row_per_table_row() {
        let cohort = vec![member(1, true, 1.0, 20.0, 1), member(2, false, 2.0, 30.0, 2)];
        let table1 = characteristics_table(&cohort);
        let table2 = prevalence_table(&cohort);
        assert_eq!(characteristics_frame(&table1).unwrap().height(), table1.len());
        assert_eq!(prevalence_frame(&table2).unwrap().height(), table2.len());
    }
}
