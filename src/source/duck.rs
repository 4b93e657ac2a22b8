use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, anyhow};
use duckdb::types::Value as DuckValue;
use duckdb::{Connection, params, params_from_iter};
use serde_json::{Number, Value};

use crate::error::FetchError;
use crate::query::{Op, Predicate, Select, value_text};
use crate::snapshot::{SnapshotPaths, source_expr};

use super::Row;

/// DuckDB-backed source: either a database file or a directory of exports
/// mounted as views. Each query runs on its own cloned connection in a
/// blocking task.
pub struct DuckDbSource {
    conn: Mutex<Connection>,
    label: String,
}

impl DuckDbSource {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(anyhow!("DuckDB not found at {}", path.display()));
        }
        let conn = Connection::open(path)?;
        tracing::info!("Using DuckDB data source at {}", path.display());
        Ok(Self::from_connection(conn, "duckdb"))
    }

    /// In-memory database with one view per `<name>.parquet|csv` in `dir`.
    pub fn open_snapshot(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        let paths = SnapshotPaths::new(dir);
        let conn = Connection::open_in_memory().context("open in-memory duckdb")?;

        let mut names = BTreeSet::new();
        for entry in std::fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
            let path = entry?.path();
            let ext = path
                .extension()
                .and_then(|x| x.to_str())
                .map(str::to_ascii_lowercase);
            if !matches!(ext.as_deref(), Some("parquet") | Some("csv")) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.insert(stem.to_string());
            }
        }

        let mut mounted = 0usize;
        for name in &names {
            let Some(file) = paths.table_file(name) else {
                tracing::warn!("Skipping empty snapshot file for {name}");
                continue;
            };
            let expr = source_expr(&file)?;
            conn.execute(
                &format!("CREATE OR REPLACE VIEW {} AS SELECT * FROM {expr}", quote_ident(name)),
                [],
            )
            .with_context(|| format!("create view {name}"))?;
            tracing::info!("Mounted {} as {}", file.display(), name);
            mounted += 1;
        }
        if mounted == 0 {
            return Err(anyhow!(
                "No .parquet or .csv tables found in {}",
                dir.display()
            ));
        }
        Ok(Self::from_connection(conn, "snapshot"))
    }

    pub fn from_connection(conn: Connection, label: &str) -> Self {
        Self {
            conn: Mutex::new(conn),
            label: label.to_string(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    fn clone_connection(&self) -> Result<Connection, FetchError> {
        let guard = self
            .conn
            .lock()
            .map_err(|_| FetchError::Unavailable("duckdb connection lock poisoned".into()))?;
        Ok(guard.try_clone()?)
    }

    pub async fn fetch(&self, q: &Select) -> Result<Vec<Row>, FetchError> {
        let conn = self.clone_connection()?;
        let q = q.clone();
        tokio::task::spawn_blocking(move || fetch_blocking(&conn, &q))
            .await
            .map_err(|e| FetchError::Query(format!("query task failed: {e}")))?
    }

    pub async fn count(&self, q: &Select) -> Result<u64, FetchError> {
        let conn = self.clone_connection()?;
        let q = q.clone();
        tokio::task::spawn_blocking(move || count_blocking(&conn, &q))
            .await
            .map_err(|e| FetchError::Query(format!("query task failed: {e}")))?
    }
}

fn fetch_blocking(conn: &Connection, q: &Select) -> Result<Vec<Row>, FetchError> {
    let columns = if q.columns.is_empty() {
        load_column_names(conn, &q.table)?
    } else {
        q.columns.clone()
    };
    let (where_sql, params) = where_clause(&q.predicates);

    let mut sql = format!(
        "SELECT {} FROM {}{}",
        columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", "),
        quote_ident(&q.table),
        where_sql
    );
    if !q.order.is_empty() {
        let order = q
            .order
            .iter()
            .map(|c| format!("{} ASC NULLS LAST", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(&format!(" ORDER BY {order}"));
    }

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(params))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut r = Row::new();
        for (i, c) in columns.iter().enumerate() {
            let v: DuckValue = row.get(i)?;
            r.insert(c.clone(), to_json(v));
        }
        out.push(r);
    }
    Ok(out)
}

fn count_blocking(conn: &Connection, q: &Select) -> Result<u64, FetchError> {
    let (where_sql, params) = where_clause(&q.predicates);
    let sql = format!("SELECT COUNT(*)::BIGINT FROM {}{}", quote_ident(&q.table), where_sql);
    let mut stmt = conn.prepare(&sql)?;
    let n: i64 = stmt.query_row(params_from_iter(params), |row| row.get(0))?;
    Ok(n.max(0) as u64)
}

fn load_column_names(conn: &Connection, table: &str) -> Result<Vec<String>, FetchError> {
    let mut stmt = conn.prepare(
        r#"
        SELECT column_name
        FROM information_schema.columns
        WHERE lower(table_name) = lower(?)
        ORDER BY ordinal_position
    "#,
    )?;
    let mut rows = stmt.query(params![table])?;
    let mut names = Vec::new();
    while let Some(row) = rows.next()? {
        names.push(row.get::<usize, String>(0)?);
    }
    if names.is_empty() {
        return Err(FetchError::Query(format!("table {table} not found")));
    }
    Ok(names)
}

fn where_clause(preds: &[Predicate]) -> (String, Vec<DuckValue>) {
    let mut parts = Vec::with_capacity(preds.len());
    let mut params = Vec::new();
    for p in preds {
        let col = quote_ident(&p.column);
        let text = format!("CAST({col} AS VARCHAR)");
        match &p.op {
            Op::Eq(v) => {
                parts.push(format!("{text} = ?"));
                params.push(DuckValue::Text(value_text(v)));
            }
            Op::In(vs) if vs.is_empty() => parts.push("FALSE".to_string()),
            Op::In(vs) => {
                parts.push(format!("{text} IN ({})", vec!["?"; vs.len()].join(", ")));
                params.extend(vs.iter().map(|v| DuckValue::Text(value_text(v))));
            }
            Op::IsNull => parts.push(format!("{col} IS NULL")),
            Op::NotNull => parts.push(format!("{col} IS NOT NULL")),
            Op::Gte(v) | Op::Lte(v) => {
                let cmp = if matches!(p.op, Op::Gte(_)) { ">=" } else { "<=" };
                match as_number(v) {
                    Some(x) => {
                        parts.push(format!("TRY_CAST({col} AS DOUBLE) {cmp} ?"));
                        params.push(DuckValue::Double(x));
                    }
                    None => {
                        parts.push(format!("{text} {cmp} ?"));
                        params.push(DuckValue::Text(value_text(v)));
                    }
                }
            }
            Op::StartsWith(prefix) => {
                parts.push(format!("starts_with(lower({text}), lower(?))"));
                params.push(DuckValue::Text(prefix.clone()));
            }
        }
    }
    if parts.is_empty() {
        (String::new(), params)
    } else {
        (format!(" WHERE {}", parts.join(" AND ")), params)
    }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn to_json(v: DuckValue) -> Value {
    match v {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(b) => Value::Bool(b),
        DuckValue::TinyInt(x) => x.into(),
        DuckValue::SmallInt(x) => x.into(),
        DuckValue::Int(x) => x.into(),
        DuckValue::BigInt(x) => x.into(),
        DuckValue::HugeInt(x) => i64::try_from(x)
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(x.to_string())),
        DuckValue::UTinyInt(x) => x.into(),
        DuckValue::USmallInt(x) => x.into(),
        DuckValue::UInt(x) => x.into(),
        DuckValue::UBigInt(x) => x.into(),
        DuckValue::Float(x) => float(f64::from(x)),
        DuckValue::Double(x) => float(x),
        DuckValue::Text(s) => Value::String(s),
        other => Value::String(format!("{other:?}")),
    }
}

fn float(x: f64) -> Value {
    Number::from_f64(x).map(Value::Number).unwrap_or(Value::Null)
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
