//! Coded demographic fields mapped to interpretable categories.
//!
//! Every mapping is total over its NHANES code domain and yields the
//! `Unknown` member for missing or out-of-domain input. Where two recoding
//! schemes coexist (race, poverty) both are kept as separate types.

use super::{Categorical, finite};
use crate::constants::{SEX_FEMALE, SEX_MALE, pregnancy_codes};
use crate::models::{Cycle, SubjectRecord};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Sex {
    Male,
    Female,
    #[default]
    Unknown,
}

impl Sex {
    pub fn from_code(code: Option<i64>) -> Self {
        match code {
            Some(SEX_MALE) => Sex::Male,
            Some(SEX_FEMALE) => Sex::Female,
            _ => Sex::Unknown,
        }
    }
}

impl Categorical for Sex {
    fn label(&self) -> &'static str {
        match self {
            Sex::Male => "Male",
            Sex::Female => "Female",
            Sex::Unknown => "Unknown",
        }
    }

    fn is_unknown(&self) -> bool {
        matches!(self, Sex::Unknown)
    }
}

/// Five-category race and Hispanic origin (RIDRETH1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RaceEthnicity {
    MexicanAmerican,
    OtherHispanic,
    NonHispanicWhite,
    NonHispanicBlack,
    OtherRace,
    #[default]
    Unknown,
}

impl RaceEthnicity {
    /// Reporting order used by the summary tables
    pub const ALL: [RaceEthnicity; 5] = [
        RaceEthnicity::MexicanAmerican,
        RaceEthnicity::OtherHispanic,
        RaceEthnicity::NonHispanicWhite,
        RaceEthnicity::NonHispanicBlack,
        RaceEthnicity::OtherRace,
    ];

    pub fn from_code(code: Option<i64>) -> Self {
        match code {
            Some(1) => RaceEthnicity::MexicanAmerican,
            Some(2) => RaceEthnicity::OtherHispanic,
            Some(3) => RaceEthnicity::NonHispanicWhite,
            Some(4) => RaceEthnicity::NonHispanicBlack,
            Some(5) => RaceEthnicity::OtherRace,
            _ => RaceEthnicity::Unknown,
        }
    }
}

impl Categorical for RaceEthnicity {
    fn label(&self) -> &'static str {
        match self {
            RaceEthnicity::MexicanAmerican => "Mexican American",
            RaceEthnicity::OtherHispanic => "Other Hispanic",
            RaceEthnicity::NonHispanicWhite => "Non-Hispanic White",
            RaceEthnicity::NonHispanicBlack => "Non-Hispanic Black",
            RaceEthnicity::OtherRace => "Other Race",
            RaceEthnicity::Unknown => "Unknown",
        }
    }

    fn is_unknown(&self) -> bool {
        matches!(self, RaceEthnicity::Unknown)
    }
}

/// Collapsed race grouping with both Hispanic codes merged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RaceGroup {
    Hispanic,
    NonHispanicWhite,
    NonHispanicBlack,
    Other,
    #[default]
    Unknown,
}

impl RaceGroup {
    pub fn from_code(code: Option<i64>) -> Self {
        match code {
            Some(1) | Some(2) => RaceGroup::Hispanic,
            Some(3) => RaceGroup::NonHispanicWhite,
            Some(4) => RaceGroup::NonHispanicBlack,
            Some(5) => RaceGroup::Other,
            _ => RaceGroup::Unknown,
        }
    }
}

impl Categorical for RaceGroup {
    fn label(&self) -> &'static str {
        match self {
            RaceGroup::Hispanic => "Hispanic",
            RaceGroup::NonHispanicWhite => "Non-Hispanic White",
            RaceGroup::NonHispanicBlack => "Non-Hispanic Black",
            RaceGroup::Other => "Other",
            RaceGroup::Unknown => "Unknown",
        }
    }

    fn is_unknown(&self) -> bool {
        matches!(self, RaceGroup::Unknown)
    }
}

/// Adult education level (DMDEDUC2); refused and don't-know are unknown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Education {
    LessThanNinthGrade,
    NinthToEleventhGrade,
    HighSchoolGraduate,
    SomeCollege,
    CollegeGraduate,
    #[default]
    Unknown,
}

impl Education {
    pub fn from_code(code: Option<i64>) -> Self {
        match code {
            Some(1) => Education::LessThanNinthGrade,
            Some(2) => Education::NinthToEleventhGrade,
            Some(3) => Education::HighSchoolGraduate,
            Some(4) => Education::SomeCollege,
            Some(5) => Education::CollegeGraduate,
            _ => Education::Unknown,
        }
    }
}

impl Categorical for Education {
    fn label(&self) -> &'static str {
        match self {
            Education::LessThanNinthGrade => "Less than 9th grade",
            Education::NinthToEleventhGrade => "9-11th grade",
            Education::HighSchoolGraduate => "High school graduate",
            Education::SomeCollege => "Some college",
            Education::CollegeGraduate => "College graduate or above",
            Education::Unknown => "Unknown",
        }
    }

    fn is_unknown(&self) -> bool {
        matches!(self, Education::Unknown)
    }
}

/// Income-to-poverty ratio in federal poverty level bands {<1, 1-2, 2-4, >=4}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PovertyBand {
    BelowPoverty,
    OneToTwo,
    TwoToFour,
    FourOrMore,
    #[default]
    Unknown,
}

impl PovertyBand {
    pub fn from_ratio(ratio: Option<f64>) -> Self {
        match finite(ratio) {
            Some(r) if r < 0.0 => PovertyBand::Unknown,
            Some(r) if r < 1.0 => PovertyBand::BelowPoverty,
            Some(r) if r < 2.0 => PovertyBand::OneToTwo,
            Some(r) if r < 4.0 => PovertyBand::TwoToFour,
            Some(_) => PovertyBand::FourOrMore,
            None => PovertyBand::Unknown,
        }
    }
}

impl Categorical for PovertyBand {
    fn label(&self) -> &'static str {
        match self {
            PovertyBand::BelowPoverty => "<100% FPL",
            PovertyBand::OneToTwo => "100-199% FPL",
            PovertyBand::TwoToFour => "200-399% FPL",
            PovertyBand::FourOrMore => ">=400% FPL",
            PovertyBand::Unknown => "Unknown",
        }
    }

    fn is_unknown(&self) -> bool {
        matches!(self, PovertyBand::Unknown)
    }
}

/// Income-to-poverty ratio tiers {<1.3, 1.3-3.5, >=3.5}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IncomeTier {
    Low,
    Medium,
    High,
    #[default]
    Unknown,
}

impl IncomeTier {
    pub const ALL: [IncomeTier; 3] = [IncomeTier::Low, IncomeTier::Medium, IncomeTier::High];

    pub fn from_ratio(ratio: Option<f64>) -> Self {
        match finite(ratio) {
            Some(r) if r < 0.0 => IncomeTier::Unknown,
            Some(r) if r < 1.3 => IncomeTier::Low,
            Some(r) if r < 3.5 => IncomeTier::Medium,
            Some(_) => IncomeTier::High,
            None => IncomeTier::Unknown,
        }
    }
}

impl Categorical for IncomeTier {
    fn label(&self) -> &'static str {
        match self {
            IncomeTier::Low => "Low (<1.3)",
            IncomeTier::Medium => "Medium (1.3-3.5)",
            IncomeTier::High => "High (>=3.5)",
            IncomeTier::Unknown => "Unknown",
        }
    }

    fn is_unknown(&self) -> bool {
        matches!(self, IncomeTier::Unknown)
    }
}

/// Study age bands over the 18-45 eligibility window, on completed years
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AgeBand {
    From18To25,
    From26To30,
    From31To35,
    From36To40,
    From41To45,
    #[default]
    Unknown,
}

impl AgeBand {
    pub const ALL: [AgeBand; 5] = [
        AgeBand::From18To25,
        AgeBand::From26To30,
        AgeBand::From31To35,
        AgeBand::From36To40,
        AgeBand::From41To45,
    ];

    pub fn from_age(age: Option<f64>) -> Self {
        let Some(years) = finite(age).map(|a| a.floor() as i64) else {
            return AgeBand::Unknown;
        };
        match years {
            18..=25 => AgeBand::From18To25,
            26..=30 => AgeBand::From26To30,
            31..=35 => AgeBand::From31To35,
            36..=40 => AgeBand::From36To40,
            41..=45 => AgeBand::From41To45,
            _ => AgeBand::Unknown,
        }
    }
}

impl Categorical for AgeBand {
    fn label(&self) -> &'static str {
        match self {
            AgeBand::From18To25 => "18-25",
            AgeBand::From26To30 => "26-30",
            AgeBand::From31To35 => "31-35",
            AgeBand::From36To40 => "36-40",
            AgeBand::From41To45 => "41-45",
            AgeBand::Unknown => "Unknown",
        }
    }

    fn is_unknown(&self) -> bool {
        matches!(self, AgeBand::Unknown)
    }
}

/// Broad age groups over the whole survey population
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AgeGroup {
    Under18,
    From18To25,
    From26To35,
    From36To45,
    Over45,
    #[default]
    Unknown,
}

impl AgeGroup {
    pub fn from_age(age: Option<f64>) -> Self {
        let Some(years) = finite(age).map(|a| a.floor() as i64) else {
            return AgeGroup::Unknown;
        };
        match years {
            i64::MIN..=-1 => AgeGroup::Unknown,
            0..=17 => AgeGroup::Under18,
            18..=25 => AgeGroup::From18To25,
            26..=35 => AgeGroup::From26To35,
            36..=45 => AgeGroup::From36To45,
            _ => AgeGroup::Over45,
        }
    }
}

impl Categorical for AgeGroup {
    fn label(&self) -> &'static str {
        match self {
            AgeGroup::Under18 => "<18",
            AgeGroup::From18To25 => "18-25",
            AgeGroup::From26To35 => "26-35",
            AgeGroup::From36To45 => "36-45",
            AgeGroup::Over45 => ">45",
            AgeGroup::Unknown => "Unknown",
        }
    }

    fn is_unknown(&self) -> bool {
        matches!(self, AgeGroup::Unknown)
    }
}

/// Pregnancy status at exam (RIDEXPRG)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PregnancyStatus {
    Pregnant,
    NotPregnant,
    /// Coded as "cannot ascertain"
    Undetermined,
    #[default]
    Unknown,
}

impl PregnancyStatus {
    pub fn from_code(code: Option<i64>) -> Self {
        match code {
            Some(pregnancy_codes::PREGNANT) => PregnancyStatus::Pregnant,
            Some(pregnancy_codes::NOT_PREGNANT) => PregnancyStatus::NotPregnant,
            Some(pregnancy_codes::UNDETERMINED) => PregnancyStatus::Undetermined,
            _ => PregnancyStatus::Unknown,
        }
    }
}

impl Categorical for PregnancyStatus {
    fn label(&self) -> &'static str {
        match self {
            PregnancyStatus::Pregnant => "Pregnant",
            PregnancyStatus::NotPregnant => "Not pregnant",
            PregnancyStatus::Undetermined => "Undetermined",
            PregnancyStatus::Unknown => "Unknown",
        }
    }

    fn is_unknown(&self) -> bool {
        matches!(self, PregnancyStatus::Unknown)
    }
}

/// Recoded demographic labels of one subject
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DemographicLabels {
    pub sex: Sex,
    pub race_ethnicity: RaceEthnicity,
    pub race_group: RaceGroup,
    pub education: Education,
    pub poverty_band: PovertyBand,
    pub income_tier: IncomeTier,
    pub below_poverty: Option<bool>,
    pub age_band: AgeBand,
    pub age_group: AgeGroup,
    pub pregnancy_status: PregnancyStatus,
    pub cycle_years: Option<&'static str>,
}

/// Recode every categorical field of one subject
pub fn recode(record: &SubjectRecord) -> DemographicLabels {
    let ratio = finite(record.poverty_ratio).filter(|r| *r >= 0.0);

    DemographicLabels {
        sex: Sex::from_code(record.sex_code),
        race_ethnicity: RaceEthnicity::from_code(record.race_code),
        race_group: RaceGroup::from_code(record.race_code),
        education: Education::from_code(record.education_code),
        poverty_band: PovertyBand::from_ratio(ratio),
        income_tier: IncomeTier::from_ratio(ratio),
        below_poverty: ratio.map(|r| r < 1.0),
        age_band: AgeBand::from_age(record.age_years),
        age_group: AgeGroup::from_age(record.age_years),
        pregnancy_status: PregnancyStatus::from_code(record.pregnancy_code),
        cycle_years: record.cycle.map(|c: Cycle| c.years()),
    }
}

/// Attach demographic labels to every record
pub fn apply(mut records: Vec<SubjectRecord>) -> Vec<SubjectRecord> {
    for record in records.iter_mut() {
        record.demographics = recode(record);
    }

    let unknown_race = records
        .iter()
        .filter(|r| r.demographics.race_ethnicity.is_unknown())
        .count();
    let unknown_income = records
        .iter()
        .filter(|r| r.demographics.income_tier.is_unknown())
        .count();
    debug!(
        "Demographics recoded: {} subjects without race code, {} without poverty ratio",
        unknown_race, unknown_income
    );

    records
}
