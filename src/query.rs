use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

use crate::error::ApiError;

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Eq(Value),
    In(Vec<Value>),
    IsNull,
    NotNull,
    Gte(Value),
    Lte(Value),
    StartsWith(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub op: Op,
}

impl Predicate {
    pub fn new(column: impl Into<String>, op: Op) -> Self {
        Self {
            column: column.into(),
            op,
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, Op::Eq(value.into()))
    }

    pub fn is_in<V: Into<Value>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::new(column, Op::In(values.into_iter().map(Into::into).collect()))
    }
}

/// Read request against one table. An empty column list means every column;
/// `order` columns sort ascending with nulls last.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub table: String,
    pub columns: Vec<String>,
    pub predicates: Vec<Predicate>,
    pub order: Vec<String>,
    pub timeout: Option<Duration>,
}

impl Select {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            predicates: Vec::new(),
            order: Vec::new(),
            timeout: None,
        }
    }

    pub fn columns<I, S>(mut self, cols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for c in cols {
            let c = c.into();
            if !self.columns.contains(&c) {
                self.columns.push(c);
            }
        }
        self
    }

    pub fn filter(mut self, p: Predicate) -> Self {
        self.predicates.push(p);
        self
    }

    pub fn filters(mut self, ps: impl IntoIterator<Item = Predicate>) -> Self {
        self.predicates.extend(ps);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.order.push(column.into());
        self
    }

    pub fn timeout(mut self, d: Duration) -> Self {
        self.timeout = Some(d);
        self
    }
}

pub const YEAR_FROM: &str = "year_from";
pub const YEAR_TO: &str = "year_to";

pub const CONTROL_PARAMS: [&str; 8] = [
    "group_by",
    "sort",
    "min_n",
    "no_limit",
    "limit",
    "level",
    "count",
    "antibiotics",
];

/// Turns raw query-string pairs into predicates. Keys match `allowed` columns
/// case-insensitively; any other key that is not a control parameter is a 400.
/// `year_from`/`year_to` become a range on `year_column`.
pub fn apply_filters(
    raw: &HashMap<String, String>,
    allowed: &[&str],
    year_column: Option<&str>,
) -> Result<Vec<Predicate>, ApiError> {
    let mut out = Vec::new();
    for (key, value) in raw {
        if CONTROL_PARAMS.iter().any(|c| c.eq_ignore_ascii_case(key)) {
            continue;
        }
        let value = value.trim();

        if let Some(year_col) = year_column {
            let bound = if key.eq_ignore_ascii_case(YEAR_FROM) {
                Some(true)
            } else if key.eq_ignore_ascii_case(YEAR_TO) {
                Some(false)
            } else {
                None
            };
            if let Some(lower) = bound {
                if is_unconstrained(value) {
                    continue;
                }
                let year: i64 = value.parse().map_err(|_| {
                    ApiError::bad_request(format!("{key} must be an integer year, got '{value}'"))
                })?;
                let op = if lower {
                    Op::Gte(year.into())
                } else {
                    Op::Lte(year.into())
                };
                out.push(Predicate::new(year_col, op));
                continue;
            }
        }

        let Some(column) = allowed.iter().find(|c| c.eq_ignore_ascii_case(key)) else {
            return Err(ApiError::invalid(
                format!("'{key}' is not a filterable column"),
                allowed.iter().copied(),
            ));
        };
        if is_unconstrained(value) {
            continue;
        }
        out.push(Predicate::new(*column, parse_op(value)));
    }
    out.sort_by(|a, b| a.column.cmp(&b.column));
    Ok(out)
}

fn is_unconstrained(value: &str) -> bool {
    value.is_empty()
        || value.eq_ignore_ascii_case("no_filters")
        || value.eq_ignore_ascii_case("all")
}

fn parse_op(value: &str) -> Op {
    if value.eq_ignore_ascii_case("null") {
        return Op::IsNull;
    }
    if value.eq_ignore_ascii_case("not_null") {
        return Op::NotNull;
    }
    if value.contains(',') {
        let items = value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(scalar)
            .collect();
        return Op::In(items);
    }
    if let Some(prefix) = value.strip_suffix('*') {
        return Op::StartsWith(prefix.to_string());
    }
    Op::Eq(scalar(value))
}

fn scalar(value: &str) -> Value {
    if value.eq_ignore_ascii_case("true") {
        Value::Bool(true)
    } else if value.eq_ignore_ascii_case("false") {
        Value::Bool(false)
    } else {
        Value::String(value.to_string())
    }
}

pub fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const ALLOWED: [&str; 4] = ["SEX", "AGE_CAT", "REGION", "VALID_AST"];

    fn raw(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn skips_control_keys_and_unconstrained_values() {
        let preds = apply_filters(
            &raw(&[
                ("sex", "Female"),
                ("REGION", "all"),
                ("AGE_CAT", "no_filters"),
                ("group_by", "SEX"),
                ("No_Limit", "true"),
            ]),
            &ALLOWED,
            Some("SPEC_YEAR"),
        )
        .unwrap();
        assert_eq!(preds, vec![Predicate::eq("SEX", "Female")]);
    }

    #[test]
    fn unknown_filter_column_is_rejected() {
        for value in ["x", "all"] {
            let err = apply_filters(&raw(&[("password", value)]), &ALLOWED, Some("SPEC_YEAR"))
                .unwrap_err();
            match err {
                ApiError::InvalidInput { accepted, .. } => assert_eq!(accepted, ALLOWED),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn coerces_booleans_nulls_lists_and_prefixes() {
        let preds = apply_filters(
            &raw(&[
                ("valid_ast", "TRUE"),
                ("region", "North, South,"),
                ("age_cat", "null"),
                ("sex", "F*"),
            ]),
            &ALLOWED,
            None,
        )
        .unwrap();
        assert_eq!(
            preds,
            vec![
                Predicate::new("AGE_CAT", Op::IsNull),
                Predicate::is_in("REGION", ["North", "South"]),
                Predicate::new("SEX", Op::StartsWith("F".into())),
                Predicate::eq("VALID_AST", true),
            ]
        );
    }

    #[test]
    fn year_range_maps_to_year_column() {
        let preds = apply_filters(
            &raw(&[("year_from", "2019"), ("year_to", "2022")]),
            &ALLOWED,
            Some("SPEC_YEAR"),
        )
        .unwrap();
        assert!(preds.contains(&Predicate::new("SPEC_YEAR", Op::Gte(json!(2019)))));
        assert!(preds.contains(&Predicate::new("SPEC_YEAR", Op::Lte(json!(2022)))));
    }

    #[test]
    fn non_numeric_year_is_rejected() {
        let err = apply_filters(&raw(&[("year_from", "last")]), &ALLOWED, Some("SPEC_YEAR"))
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput { .. }));
    }

    #[test]
    fn select_columns_are_deduplicated() {
        let q = Select::table("AMR_HH")
            .columns(["ORGANISM", "FOX_ND30"])
            .columns(["ORGANISM", "SEX"]);
        assert_eq!(q.columns, vec!["ORGANISM", "FOX_ND30", "SEX"]);
    }
}
