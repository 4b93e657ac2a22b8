use std::time::Duration;

use thiserror::Error;

use crate::aggregate::MinSample;
use crate::cli::SourceArgs;

pub const DATABASE_URL_VAR: &str = "SUPABASE_URL";
pub const SERVICE_KEY_VAR: &str = "SUPABASE_SERVICE_ROLE_KEY";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub service_key: String,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &self.url)
            .field("service_key", &"<redacted>")
            .finish()
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let url = get(DATABASE_URL_VAR)
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing(DATABASE_URL_VAR))?;
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(ConfigError::Invalid {
                var: DATABASE_URL_VAR,
                reason: format!("expected an http(s) URL, got '{url}'"),
            });
        }
        let service_key = get(SERVICE_KEY_VAR)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing(SERVICE_KEY_VAR))?;
        Ok(Self { url, service_key })
    }

    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.url)
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub fetch_timeout: Duration,
    pub count_timeout: Duration,
    pub wide_fetch_timeout: Duration,
    pub page_size: usize,
    pub max_rows: usize,
    pub min_sample: MinSample,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(30),
            count_timeout: Duration::from_secs(10),
            wide_fetch_timeout: Duration::from_secs(45),
            page_size: 1000,
            max_rows: 500_000,
            min_sample: MinSample::Enforced(30),
        }
    }
}

impl Settings {
    pub fn from_args(args: &SourceArgs) -> Self {
        Self {
            fetch_timeout: Duration::from_secs(args.fetch_timeout_secs),
            count_timeout: Duration::from_secs(args.count_timeout_secs),
            wide_fetch_timeout: Duration::from_secs(args.wide_fetch_timeout_secs),
            page_size: args.page_size.clamp(1, 10_000),
            max_rows: args.max_rows.max(1),
            min_sample: match args.min_sample {
                0 => MinSample::Disabled,
                n => MinSample::Enforced(n),
            },
        }
    }
}
