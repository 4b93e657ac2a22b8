use serde::Serialize;

use crate::aggregate::MinSample;
use crate::classify::ResistanceRule;
use crate::dataset::{Dataset, col};
use crate::query::Predicate;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResistanceMetric {
    pub id: String,
    pub title: String,
    pub dataset: Dataset,
    pub organisms: Vec<String>,
    pub rule: ResistanceRule,
    pub min_sample: MinSample,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrevalenceMetric {
    pub id: String,
    pub title: String,
    pub dataset: Dataset,
    pub indicator: String,
    #[serde(skip)]
    pub scope: Vec<Predicate>,
    pub min_sample: MinSample,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Registry {
    pub resistance: Vec<ResistanceMetric>,
    pub prevalence: Vec<PrevalenceMetric>,
}

fn resistance_metric(
    id: &str,
    title: &str,
    dataset: Dataset,
    organism: &str,
    rule: ResistanceRule,
    min_sample: MinSample,
) -> ResistanceMetric {
    ResistanceMetric {
        id: id.to_string(),
        title: title.to_string(),
        dataset,
        organisms: vec![organism.to_string()],
        rule,
        min_sample,
    }
}

fn prevalence_metric(
    id: &str,
    title: &str,
    dataset: Dataset,
    indicator: &str,
    scope: Vec<Predicate>,
    min_sample: MinSample,
) -> PrevalenceMetric {
    PrevalenceMetric {
        id: id.to_string(),
        title: title.to_string(),
        dataset,
        indicator: indicator.to_string(),
        scope,
        min_sample,
    }
}

const CARBAPENEMS: &[&str] = &["IPM_ND10", "MEM_ND10", "ETP_ND10"];
const THIRD_GEN_CEPHALOSPORINS: &[&str] = &["CTX_ND30", "CRO_ND30", "CAZ_ND30"];

const USAGE_INDICATORS: &[(&str, &str, &str)] = &[
    (
        "reason-in-notes",
        "Reason for antibiotic recorded in notes",
        col::REASON_IN_NOTES,
    ),
    (
        "guideline-compliant",
        "Prescribing compliant with guidelines",
        col::GUIDELINE_COMPLIANT,
    ),
    ("culture-taken", "Culture taken before treatment", col::CULTURE_TAKEN),
    ("targeted-therapy", "Targeted therapy", col::TARGETED_THERAPY),
    ("biomarker-used", "Biomarker used to guide treatment", col::BIOMARKER_USED),
    ("stop-review-date", "Stop or review date documented", col::STOP_REVIEW_DATE),
];

impl Registry {
    /// Standard surveillance indicators, thresholded at `min` unless a metric
    /// is defined without one.
    pub fn builtin(min: MinSample) -> Self {
        use Dataset::{Animal, Human, Usage};

        let resistance = vec![
            resistance_metric(
                "mrsa",
                "Methicillin-resistant S. aureus",
                Human,
                "sau",
                ResistanceRule::single("FOX_ND30"),
                min,
            ),
            resistance_metric(
                "mrsa-animal",
                "Methicillin-resistant S. aureus (animal)",
                Animal,
                "sau",
                ResistanceRule::single("FOX_ND30"),
                min,
            ),
            resistance_metric(
                "cr-eco",
                "Carbapenem-resistant E. coli",
                Human,
                "eco",
                ResistanceRule::any(CARBAPENEMS),
                min,
            ),
            resistance_metric(
                "cr-kpn",
                "Carbapenem-resistant K. pneumoniae",
                Human,
                "kpn",
                ResistanceRule::any(CARBAPENEMS),
                min,
            ),
            resistance_metric(
                "cr-aba",
                "Carbapenem-resistant A. baumannii",
                Human,
                "aba",
                ResistanceRule::any(&["IPM_ND10", "MEM_ND10"]),
                min,
            ),
            resistance_metric(
                "3gc-eco",
                "Third-generation cephalosporin-resistant E. coli",
                Human,
                "eco",
                ResistanceRule::any(THIRD_GEN_CEPHALOSPORINS),
                min,
            ),
            resistance_metric(
                "3gc-kpn",
                "Third-generation cephalosporin-resistant K. pneumoniae",
                Human,
                "kpn",
                ResistanceRule::any(THIRD_GEN_CEPHALOSPORINS),
                min,
            ),
            resistance_metric(
                "fq-eco",
                "Fluoroquinolone-resistant E. coli",
                Human,
                "eco",
                ResistanceRule::single("CIP_ND5"),
                min,
            ),
            resistance_metric(
                "vre-efm",
                "Vancomycin-resistant E. faecium",
                Human,
                "efm",
                ResistanceRule::single("VAN_ND30"),
                min,
            ),
            resistance_metric(
                "prsp",
                "Penicillin-resistant S. pneumoniae",
                Human,
                "spn",
                ResistanceRule::all(&["OXA_ND1", "PNV_NM"]),
                min,
            ),
        ];

        let given = || vec![Predicate::eq(col::ANTIBIOTIC_YN, true)];
        let valid = || vec![Predicate::eq(col::VALID_AST, true)];

        let mut prevalence = vec![
            prevalence_metric(
                "mdr",
                "Multidrug-resistant isolates",
                Human,
                col::MDR_TF,
                valid(),
                min,
            ),
            prevalence_metric(
                "mdr-animal",
                "Multidrug-resistant isolates (animal)",
                Animal,
                col::MDR_TF,
                valid(),
                min,
            ),
            prevalence_metric(
                "antibiotic-use",
                "Patients receiving antibiotics",
                Usage,
                col::ANTIBIOTIC_YN,
                Vec::new(),
                MinSample::Disabled,
            ),
        ];
        prevalence.extend(USAGE_INDICATORS.iter().map(|(id, title, column)| {
            prevalence_metric(id, title, Usage, column, given(), min)
        }));

        Self { resistance, prevalence }
    }

    pub fn resistance(&self, id: &str) -> Option<&ResistanceMetric> {
        self.resistance.iter().find(|m| m.id.eq_ignore_ascii_case(id.trim()))
    }

    pub fn prevalence(&self, id: &str) -> Option<&PrevalenceMetric> {
        self.prevalence.iter().find(|m| m.id.eq_ignore_ascii_case(id.trim()))
    }

    pub fn resistance_ids(&self) -> Vec<String> {
        self.resistance.iter().map(|m| m.id.clone()).collect()
    }

    pub fn prevalence_ids(&self) -> Vec<String> {
        self.prevalence.iter().map(|m| m.id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Combine;

    #[test]
    fn ids_are_unique() {
        let r = Registry::builtin(MinSample::Enforced(30));
        let mut ids = r.resistance_ids();
        ids.extend(r.prevalence_ids());
        let n = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), n);
    }

    #[test]
    fn only_penicillin_rule_is_conjunctive() {
        let r = Registry::builtin(MinSample::Enforced(30));
        let all: Vec<&str> = r
            .resistance
            .iter()
            .filter(|m| m.rule.combine == Combine::All)
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(all, vec!["prsp"]);
        assert_eq!(r.resistance("CR-ABA").unwrap().rule.columns.len(), 2);
    }

    #[test]
    fn usage_indicators_are_scoped_to_antibiotics_given() {
        let r = Registry::builtin(MinSample::Enforced(20));
        let m = r.prevalence("guideline-compliant").unwrap();
        assert_eq!(m.dataset, Dataset::Usage);
        assert_eq!(m.scope, vec![Predicate::eq(col::ANTIBIOTIC_YN, true)]);
        assert_eq!(m.min_sample, MinSample::Enforced(20));
        assert_eq!(
            r.prevalence("antibiotic-use").unwrap().min_sample,
            MinSample::Disabled
        );
    }
}
