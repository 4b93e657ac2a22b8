pub mod duck;
pub mod postgrest;

use std::time::{Duration, Instant};

use anyhow::Context;
use serde_json::{Map, Value};

use crate::cli::SourceArgs;
use crate::config::{DatabaseConfig, Settings};
use crate::error::FetchError;
use crate::query::Select;

use duck::DuckDbSource;
use postgrest::PostgrestSource;

pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountMode {
    Exact,
    Estimated,
}

impl CountMode {
    pub const ACCEPTED: [&'static str; 2] = ["exact", "estimated"];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Some(CountMode::Exact),
            "estimated" | "approximate" => Some(CountMode::Estimated),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CountMode::Exact => "exact",
            CountMode::Estimated => "estimated",
        }
    }
}

pub enum RowSource {
    Postgrest(PostgrestSource),
    DuckDb(DuckDbSource),
}

impl RowSource {
    pub fn connect(args: &SourceArgs, settings: &Settings) -> anyhow::Result<Self> {
        if let Some(path) = &args.duckdb {
            let src = DuckDbSource::open(path).with_context(|| format!("open duckdb {path}"))?;
            return Ok(RowSource::DuckDb(src));
        }
        if let Some(dir) = &args.snapshot_dir {
            let src = DuckDbSource::open_snapshot(dir)
                .with_context(|| format!("open snapshot dir {dir}"))?;
            return Ok(RowSource::DuckDb(src));
        }
        let cfg = DatabaseConfig::from_env().context("database configuration")?;
        tracing::info!("Using REST data source at {}", cfg.url);
        let src = PostgrestSource::new(&cfg, settings).context("build http client")?;
        Ok(RowSource::Postgrest(src))
    }

    pub fn label(&self) -> &str {
        match self {
            RowSource::Postgrest(_) => "postgrest",
            RowSource::DuckDb(s) => s.label(),
        }
    }

    /// Rows matching `q`, bounded by the query's timeout (or `default_timeout`).
    /// A timed-out query is not cancelled upstream.
    pub async fn fetch(
        &self,
        q: &Select,
        default_timeout: Duration,
    ) -> Result<Vec<Row>, FetchError> {
        let limit = q.timeout.unwrap_or(default_timeout);
        let t0 = Instant::now();
        let res = match self {
            RowSource::Postgrest(s) => tokio::time::timeout(limit, s.fetch(q)).await,
            RowSource::DuckDb(s) => tokio::time::timeout(limit, s.fetch(q)).await,
        };
        let rows = res.map_err(|_| FetchError::Timeout(limit))??;
        tracing::debug!(
            "fetched {} rows from {} in {:.2}s",
            rows.len(),
            q.table,
            t0.elapsed().as_secs_f64()
        );
        Ok(rows)
    }

    pub async fn count(
        &self,
        q: &Select,
        mode: CountMode,
        default_timeout: Duration,
    ) -> Result<u64, FetchError> {
        let limit = q.timeout.unwrap_or(default_timeout);
        let res = match self {
            RowSource::Postgrest(s) => tokio::time::timeout(limit, s.count(q, mode)).await,
            RowSource::DuckDb(s) => tokio::time::timeout(limit, s.count(q)).await,
        };
        res.map_err(|_| FetchError::Timeout(limit))?
    }
}
