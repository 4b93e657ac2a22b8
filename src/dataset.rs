use serde::Serialize;

pub mod col {
    pub const ORGANISM: &str = "ORGANISM";
    pub const VALID_AST: &str = "VALID_AST";
    pub const MDR_TF: &str = "MDR_TF";
    pub const SEX: &str = "SEX";
    pub const AGE_CAT: &str = "AGE_CAT";
    pub const INSTITUTION: &str = "INSTITUTION";
    pub const REGION: &str = "REGION";
    pub const SPEC_YEAR: &str = "SPEC_YEAR";
    pub const SPEC_TYPE: &str = "SPEC_TYPE";

    pub const SPECIES: &str = "SPECIES";
    pub const SAMPLE_TYPE: &str = "SAMPLE_TYPE";

    pub const ANTIBIOTIC_YN: &str = "ANTIBIOTIC_YN";
    pub const AWARE: &str = "AWARE";
    pub const ATC2: &str = "ATC2";
    pub const ATC3: &str = "ATC3";
    pub const ATC4: &str = "ATC4";
    pub const ATC5: &str = "ATC5";
    pub const WARD_TYPE: &str = "WARD_TYPE";
    pub const SURVEY_YEAR: &str = "SURVEY_YEAR";
    pub const REASON_IN_NOTES: &str = "REASON_IN_NOTES";
    pub const GUIDELINE_COMPLIANT: &str = "GUIDELINE_COMPLIANT";
    pub const CULTURE_TAKEN: &str = "CULTURE_TAKEN";
    pub const TARGETED_THERAPY: &str = "TARGETED_THERAPY";
    pub const BIOMARKER_USED: &str = "BIOMARKER_USED";
    pub const STOP_REVIEW_DATE: &str = "STOP_REVIEW_DATE";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dataset {
    Human,
    Animal,
    Usage,
}

const HUMAN_FILTERS: &[&str] = &[
    col::ORGANISM,
    col::SEX,
    col::AGE_CAT,
    col::INSTITUTION,
    col::REGION,
    col::SPEC_YEAR,
    col::SPEC_TYPE,
    col::VALID_AST,
    col::MDR_TF,
];

const ANIMAL_FILTERS: &[&str] = &[
    col::ORGANISM,
    col::SPECIES,
    col::SAMPLE_TYPE,
    col::REGION,
    col::SPEC_YEAR,
    col::VALID_AST,
    col::MDR_TF,
];

const USAGE_FILTERS: &[&str] = &[
    col::SEX,
    col::AGE_CAT,
    col::INSTITUTION,
    col::REGION,
    col::WARD_TYPE,
    col::SURVEY_YEAR,
    col::ANTIBIOTIC_YN,
    col::AWARE,
    col::ATC2,
    col::ATC3,
    col::ATC4,
    col::ATC5,
];

impl Dataset {
    pub const ALL: [Dataset; 3] = [Dataset::Human, Dataset::Animal, Dataset::Usage];

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|d| d.key().eq_ignore_ascii_case(s) || d.table().eq_ignore_ascii_case(s))
    }

    pub fn key(self) -> &'static str {
        match self {
            Dataset::Human => "human",
            Dataset::Animal => "animal",
            Dataset::Usage => "usage",
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            Dataset::Human => "AMR_HH",
            Dataset::Animal => "AMR_Animal",
            Dataset::Usage => "AMU_HH",
        }
    }

    pub fn filter_columns(self) -> &'static [&'static str] {
        match self {
            Dataset::Human => HUMAN_FILTERS,
            Dataset::Animal => ANIMAL_FILTERS,
            Dataset::Usage => USAGE_FILTERS,
        }
    }

    pub fn year_column(self) -> &'static str {
        match self {
            Dataset::Human | Dataset::Animal => col::SPEC_YEAR,
            Dataset::Usage => col::SURVEY_YEAR,
        }
    }

    /// Flag that marks a row's susceptibility results as usable.
    pub fn valid_flag(self) -> Option<&'static str> {
        match self {
            Dataset::Human | Dataset::Animal => Some(col::VALID_AST),
            Dataset::Usage => None,
        }
    }

    pub fn is_isolate(self) -> bool {
        matches!(self, Dataset::Human | Dataset::Animal)
    }

    pub fn column(self, name: &str) -> Option<&'static str> {
        self.filter_columns()
            .iter()
            .copied()
            .find(|c| c.eq_ignore_ascii_case(name.trim()))
    }

    pub fn accepted_keys() -> Vec<&'static str> {
        Self::ALL.iter().map(|d| d.key()).collect()
    }
}
