use std::collections::BTreeMap;

use serde::Serialize;

use crate::age::AgeOrder;
use crate::config::Settings;
use crate::error::FetchError;
use crate::query::Select;
use crate::source::{Row, RowSource};

const ORGANISM_CODE: &str = "ORGANISM_CODE";
const ORGANISM_NAME: &str = "ORGANISM_NAME";
const COLUMN_NAME: &str = "COLUMN_NAME";
const ANTIBIOTIC_NAME: &str = "ANTIBIOTIC_NAME";

const BUILTIN_ORGANISMS: &[(&str, &str)] = &[
    ("aba", "Acinetobacter baumannii"),
    ("eco", "Escherichia coli"),
    ("efa", "Enterococcus faecalis"),
    ("efm", "Enterococcus faecium"),
    ("kpn", "Klebsiella pneumoniae"),
    ("pae", "Pseudomonas aeruginosa"),
    ("sal", "Salmonella spp."),
    ("sau", "Staphylococcus aureus"),
    ("spn", "Streptococcus pneumoniae"),
];

const BUILTIN_ANTIBIOTICS: &[(&str, &str)] = &[
    ("AMC_ND20", "Amoxicillin/clavulanic acid"),
    ("AMK_ND30", "Amikacin"),
    ("AMP_ND10", "Ampicillin"),
    ("CAZ_ND30", "Ceftazidime"),
    ("CIP_ND5", "Ciprofloxacin"),
    ("CRO_ND30", "Ceftriaxone"),
    ("CTX_ND30", "Cefotaxime"),
    ("ETP_ND10", "Ertapenem"),
    ("FOX_ND30", "Cefoxitin"),
    ("GEN_ND10", "Gentamicin"),
    ("IPM_ND10", "Imipenem"),
    ("MEM_ND10", "Meropenem"),
    ("OXA_ND1", "Oxacillin"),
    ("PNV_NM", "Penicillin V"),
    ("SXT_ND1_2", "Trimethoprim/sulfamethoxazole"),
    ("TZP_ND100", "Piperacillin/tazobactam"),
    ("VAN_ND30", "Vancomycin"),
];

#[derive(Debug, Clone, Serialize)]
pub struct LookupEntry {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Lookups {
    pub ages: AgeOrder,
    organisms: BTreeMap<String, String>,
    antibiotics: BTreeMap<String, String>,
}

impl Default for Lookups {
    fn default() -> Self {
        Self {
            ages: AgeOrder::default(),
            organisms: BUILTIN_ORGANISMS
                .iter()
                .map(|(c, n)| (c.to_string(), n.to_string()))
                .collect(),
            antibiotics: BUILTIN_ANTIBIOTICS
                .iter()
                .map(|(c, n)| (c.to_string(), n.to_string()))
                .collect(),
        }
    }
}

impl Lookups {
    /// Built-in tables, each replaced by the matching view when it can be read
    /// and is non-empty.
    pub async fn load(
        source: &RowSource,
        settings: &Settings,
        organism_view: &str,
        antibiotic_view: &str,
    ) -> Self {
        let mut out = Self::default();

        match read_pairs(source, settings, organism_view, ORGANISM_CODE, ORGANISM_NAME).await {
            Ok(m) if !m.is_empty() => {
                tracing::info!("Loaded {} organism names from {}", m.len(), organism_view);
                out.organisms = m
                    .into_iter()
                    .map(|(c, n)| (c.to_ascii_lowercase(), n))
                    .collect();
            }
            Ok(_) => tracing::warn!("{organism_view} is empty; using built-in organism names"),
            Err(e) => tracing::warn!(
                "Could not read {organism_view} ({e}); using built-in organism names"
            ),
        }

        match read_pairs(source, settings, antibiotic_view, COLUMN_NAME, ANTIBIOTIC_NAME).await {
            Ok(m) if !m.is_empty() => {
                tracing::info!("Loaded {} antibiotic names from {}", m.len(), antibiotic_view);
                out.antibiotics = m;
            }
            Ok(_) => tracing::warn!("{antibiotic_view} is empty; using built-in antibiotic names"),
            Err(e) => tracing::warn!(
                "Could not read {antibiotic_view} ({e}); using built-in antibiotic names"
            ),
        }

        out
    }

    pub fn organism_name(&self, code: &str) -> String {
        self.organisms
            .get(&code.trim().to_ascii_lowercase())
            .cloned()
            .unwrap_or_else(|| code.to_string())
    }

    pub fn antibiotic_name(&self, column: &str) -> String {
        self.antibiotics
            .get(column)
            .cloned()
            .unwrap_or_else(|| column.to_string())
    }

    pub fn antibiotic_column(&self, name: &str) -> Option<&str> {
        let name = name.trim();
        self.antibiotics
            .keys()
            .find(|c| c.eq_ignore_ascii_case(name))
            .map(String::as_str)
    }

    pub fn antibiotic_columns(&self) -> Vec<&str> {
        self.antibiotics.keys().map(String::as_str).collect()
    }

    pub fn organism_entries(&self) -> Vec<LookupEntry> {
        entries(&self.organisms)
    }

    pub fn antibiotic_entries(&self) -> Vec<LookupEntry> {
        entries(&self.antibiotics)
    }
}

fn entries(m: &BTreeMap<String, String>) -> Vec<LookupEntry> {
    m.iter()
        .map(|(code, name)| LookupEntry {
            code: code.clone(),
            name: name.clone(),
        })
        .collect()
}

async fn read_pairs(
    source: &RowSource,
    settings: &Settings,
    view: &str,
    key_col: &str,
    name_col: &str,
) -> Result<BTreeMap<String, String>, FetchError> {
    let q = Select::table(view)
        .columns([key_col, name_col])
        .order_by(key_col);
    let rows = source.fetch(&q, settings.fetch_timeout).await?;
    Ok(rows.iter().filter_map(|r| pair(r, key_col, name_col)).collect())
}

fn pair(row: &Row, key_col: &str, name_col: &str) -> Option<(String, String)> {
    let key = row.get(key_col)?.as_str()?.trim();
    let name = row.get(name_col)?.as_str()?.trim();
    if key.is_empty() || name.is_empty() {
        return None;
    }
    Some((key.to_string(), name.to_string()))
}
