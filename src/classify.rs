use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::source::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Susceptibility {
    Susceptible,
    Intermediate,
    Resistant,
    Unknown,
}

/// Outcome of a yes/no question asked of a row. `Unknown` rows are excluded
/// from both numerator and denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Indicator {
    Positive,
    Negative,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum AwareCategory {
    Access,
    Watch,
    Reserve,
    Other,
}

impl AwareCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            AwareCategory::Access => "Access",
            AwareCategory::Watch => "Watch",
            AwareCategory::Reserve => "Reserve",
            AwareCategory::Other => "Other",
        }
    }
}

pub fn susceptibility(value: &Value) -> Susceptibility {
    let Some(s) = value.as_str() else {
        return Susceptibility::Unknown;
    };
    match s.trim().to_ascii_uppercase().as_str() {
        "S" => Susceptibility::Susceptible,
        "I" => Susceptibility::Intermediate,
        "R" => Susceptibility::Resistant,
        _ => Susceptibility::Unknown,
    }
}

/// Boolean-ish cell. Upstream data encodes flags as booleans, 0/1 numbers and a
/// handful of strings; anything outside that set is `Unknown`.
pub fn indicator(value: &Value) -> Indicator {
    match value {
        Value::Bool(true) => Indicator::Positive,
        Value::Bool(false) => Indicator::Negative,
        Value::Number(n) => match n.as_f64() {
            Some(x) if x == 1.0 => Indicator::Positive,
            Some(x) if x == 0.0 => Indicator::Negative,
            _ => Indicator::Unknown,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Indicator::Positive,
            "false" | "0" | "no" => Indicator::Negative,
            _ => Indicator::Unknown,
        },
        _ => Indicator::Unknown,
    }
}

/// `None` means the cell is empty and the row does not count at all.
pub fn aware(value: &Value) -> Option<AwareCategory> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            Some(match s.to_ascii_lowercase().as_str() {
                "access" => AwareCategory::Access,
                "watch" => AwareCategory::Watch,
                "reserve" => AwareCategory::Reserve,
                _ => AwareCategory::Other,
            })
        }
        _ => Some(AwareCategory::Other),
    }
}

pub fn row_indicator(row: &Row, column: &str) -> Indicator {
    row.get(column).map(indicator).unwrap_or(Indicator::Unknown)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Combine {
    Single,
    Any,
    All,
}

impl Combine {
    pub const ACCEPTED: [&'static str; 3] = ["single", "any", "all"];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Some(Combine::Single),
            "any" => Some(Combine::Any),
            "all" => Some(Combine::All),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("rule 'single' takes exactly one antibiotic column, got {0}")]
    SingleArity(usize),
    #[error("rule needs at least one antibiotic column")]
    NoColumns,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResistanceRule {
    pub combine: Combine,
    pub columns: Vec<String>,
}

impl ResistanceRule {
    pub fn new(combine: Combine, columns: Vec<String>) -> Result<Self, RuleError> {
        match (combine, columns.len()) {
            (_, 0) => Err(RuleError::NoColumns),
            (Combine::Single, 1) => Ok(Self { combine, columns }),
            (Combine::Single, n) => Err(RuleError::SingleArity(n)),
            _ => Ok(Self { combine, columns }),
        }
    }

    pub fn single(column: &str) -> Self {
        Self {
            combine: Combine::Single,
            columns: vec![column.to_string()],
        }
    }

    pub fn any(columns: &[&str]) -> Self {
        Self {
            combine: Combine::Any,
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn all(columns: &[&str]) -> Self {
        Self {
            combine: Combine::All,
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn evaluate(&self, row: &Row) -> Indicator {
        let results: Vec<Susceptibility> = self
            .columns
            .iter()
            .map(|c| row.get(c).map(susceptibility).unwrap_or(Susceptibility::Unknown))
            .collect();

        let resistant = |s: &Susceptibility| *s == Susceptibility::Resistant;
        let tested_not_resistant = |s: &Susceptibility| {
            matches!(s, Susceptibility::Susceptible | Susceptibility::Intermediate)
        };

        let positive = match self.combine {
            Combine::Single | Combine::Any => results.iter().any(resistant),
            Combine::All => results.iter().all(resistant),
        };
        if positive {
            Indicator::Positive
        } else if results.iter().any(tested_not_resistant) {
            Indicator::Negative
        } else {
            Indicator::Unknown
        }
    }
}
