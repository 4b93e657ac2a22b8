use std::path::{Path, PathBuf};

use anyhow::bail;

/// Layout of a directory of table exports: `<dir>/<TABLE>.parquet` or
/// `<dir>/<TABLE>.csv`.
#[derive(Debug, Clone)]
pub struct SnapshotPaths {
    pub dir: PathBuf,
}

impl SnapshotPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Parquet wins over CSV when both are present.
    pub fn table_file(&self, table: &str) -> Option<PathBuf> {
        ["parquet", "csv"]
            .iter()
            .map(|ext| self.dir.join(format!("{table}.{ext}")))
            .find(|p| file_present_nonempty(p))
    }
}

pub fn file_present_nonempty(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(m) => m.is_file() && m.len() > 0,
        Err(_) => false,
    }
}

pub fn sql_quote_path(path: &Path) -> String {
    path.display().to_string().replace('\'', "''")
}

pub fn source_expr(path: &Path) -> anyhow::Result<String> {
    let escaped = sql_quote_path(path);
    let extension = path
        .extension()
        .and_then(|x| x.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match extension.as_str() {
        "parquet" => Ok(format!("read_parquet('{escaped}')")),
        "csv" => Ok(format!("read_csv_auto('{escaped}', header=true)")),
        _ => bail!(
            "Unsupported snapshot extension for {}. Use .csv or .parquet",
            path.display()
        ),
    }
}
