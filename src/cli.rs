use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "amr-backend")]
#[command(about = "AMR/AMU surveillance dashboard backend", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the HTTP API.
    Serve(ServeArgs),
    /// Compute one resistance or prevalence metric and print it as JSON.
    Report(ReportArgs),
}

/// Where rows come from. Without --duckdb or --snapshot-dir the managed database
/// is used and SUPABASE_URL / SUPABASE_SERVICE_ROLE_KEY must be set.
#[derive(clap::Args, Debug, Clone)]
pub struct SourceArgs {
    /// Existing DuckDB database holding the surveillance tables.
    #[arg(long, conflicts_with = "snapshot_dir")]
    pub duckdb: Option<String>,

    /// Directory of <TABLE>.parquet / <TABLE>.csv exports, queried through DuckDB views.
    #[arg(long)]
    pub snapshot_dir: Option<String>,

    /// Rows requested per page from the REST endpoint.
    #[arg(long, default_value_t = 1000)]
    pub page_size: usize,

    /// Upper bound on rows pulled for a single aggregation.
    #[arg(long, default_value_t = 500_000)]
    pub max_rows: usize,

    #[arg(long, default_value_t = 30)]
    pub fetch_timeout_secs: u64,

    #[arg(long, default_value_t = 10)]
    pub count_timeout_secs: u64,

    /// Timeout for wide fetches (antibiogram panels).
    #[arg(long, default_value_t = 45)]
    pub wide_fetch_timeout_secs: u64,

    /// Minimum tested isolates before a rate is reported; 0 disables the threshold.
    #[arg(long, default_value_t = 30)]
    pub min_sample: u64,

    /// View mapping organism codes to names.
    #[arg(long, default_value = "ORGANISM_NAMES")]
    pub organism_view: String,

    /// View mapping antibiotic test columns to names.
    #[arg(long, default_value = "ANTIBIOTIC_NAMES")]
    pub antibiotic_view: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, default_value_t = 8787)]
    pub port: u16,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ReportArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Metric id (see GET /api/metrics).
    pub metric: String,

    /// Column to break the rate down by (e.g. AGE_CAT).
    #[arg(long)]
    pub group_by: Option<String>,

    /// Ordering of groups: rate, count or age.
    #[arg(long)]
    pub sort: Option<String>,

    /// Column filter as KEY=VALUE; repeatable.
    #[arg(long = "filter", value_parser = parse_key_val)]
    pub filters: Vec<(String, String)>,

    /// Report rates regardless of sample size.
    #[arg(long)]
    pub no_limit: bool,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (k, v) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    Ok((k.trim().to_string(), v.trim().to_string()))
}
