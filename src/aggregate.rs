use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::classify::Indicator;
use crate::source::Row;

pub const RATE_UNAVAILABLE: f64 = -1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinSample {
    Enforced(u64),
    Disabled,
}

impl MinSample {
    pub fn threshold(self) -> Option<u64> {
        match self {
            MinSample::Enforced(n) => Some(n),
            MinSample::Disabled => None,
        }
    }

    pub fn allows(self, denominator: u64) -> bool {
        match self {
            MinSample::Enforced(n) => denominator >= n,
            MinSample::Disabled => true,
        }
    }
}

impl Serialize for MinSample {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.threshold().serialize(serializer)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub numerator: u64,
    pub denominator: u64,
}

impl Tally {
    pub fn record(&mut self, outcome: Indicator) {
        match outcome {
            Indicator::Positive => {
                self.numerator += 1;
                self.denominator += 1;
            }
            Indicator::Negative => self.denominator += 1,
            Indicator::Unknown => {}
        }
    }

    pub fn rate(&self, min: MinSample) -> f64 {
        if self.denominator == 0 || !min.allows(self.denominator) {
            return RATE_UNAVAILABLE;
        }
        percentage(self.numerator, self.denominator)
    }
}

/// One-decimal percentage: multiply by 1000, round, divide by 10.
pub fn percentage(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    (numerator as f64 / denominator as f64 * 1000.0).round() / 10.0
}

/// Buckets rows by `group_key` and tallies `classify`. Rows without a group
/// value are skipped; a category only appears once it has a non-zero
/// denominator.
pub fn aggregate<K, C>(rows: &[Row], group_key: K, classify: C) -> BTreeMap<String, Tally>
where
    K: Fn(&Row) -> Option<String>,
    C: Fn(&Row) -> Indicator,
{
    let mut out: BTreeMap<String, Tally> = BTreeMap::new();
    for row in rows {
        let outcome = classify(row);
        if outcome == Indicator::Unknown {
            continue;
        }
        let Some(key) = group_key(row) else {
            continue;
        };
        out.entry(key).or_default().record(outcome);
    }
    out
}

pub fn overall<C>(rows: &[Row], classify: C) -> Tally
where
    C: Fn(&Row) -> Indicator,
{
    let mut t = Tally::default();
    for row in rows {
        t.record(classify(row));
    }
    t
}

pub fn count_by<K>(rows: &[Row], key: K) -> BTreeMap<String, u64>
where
    K: Fn(&Row) -> Option<String>,
{
    let mut out: BTreeMap<String, u64> = BTreeMap::new();
    for row in rows {
        if let Some(k) = key(row) {
            *out.entry(k).or_default() += 1;
        }
    }
    out
}

pub fn group_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

pub fn column_key(column: &str) -> impl Fn(&Row) -> Option<String> + '_ {
    move |row: &Row| row.get(column).and_then(group_value)
}
