use std::time::Duration;

use reqwest::header::{CONTENT_RANGE, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use crate::config::{DatabaseConfig, Settings};
use crate::error::FetchError;
use crate::query::{Op, Select, value_text};

use super::{CountMode, Row};

// Postgres `query_canceled`, raised on statement timeout.
const PG_QUERY_CANCELED: &str = "57014";

pub struct PostgrestSource {
    client: Client,
    base_url: String,
    key: String,
    page_size: usize,
    max_rows: usize,
}

#[derive(Debug, Deserialize)]
struct PgError {
    code: Option<String>,
    message: Option<String>,
}

impl PostgrestSource {
    pub fn new(cfg: &DatabaseConfig, settings: &Settings) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.rest_url(),
            key: cfg.service_key.clone(),
            page_size: settings.page_size,
            max_rows: settings.max_rows,
        })
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{}", self.base_url, table))
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
    }

    /// Pages through the result with limit/offset until an empty page or the
    /// row cap. The server may return fewer rows than asked for.
    pub async fn fetch(&self, q: &Select) -> Result<Vec<Row>, FetchError> {
        let cap = self.max_rows;
        let mut out: Vec<Row> = Vec::new();
        let mut offset = 0usize;
        loop {
            let want = self.page_size.min(cap - out.len());
            let params = encode_params(q, Some((offset, want)));
            let resp = self
                .request(Method::GET, &q.table)
                .query(&params)
                .send()
                .await
                .map_err(transport_error)?;
            let resp = check_status(resp).await?;
            let page: Vec<Row> = resp
                .json()
                .await
                .map_err(|e| FetchError::Decode(e.to_string()))?;
            let n = page.len();
            out.extend(page);
            if n == 0 || out.len() >= cap {
                break;
            }
            offset += n;
        }
        if out.len() >= cap {
            tracing::warn!(
                "{}: row cap of {} reached; aggregation uses a truncated result",
                q.table,
                cap
            );
        }
        Ok(out)
    }

    pub async fn count(&self, q: &Select, mode: CountMode) -> Result<u64, FetchError> {
        let prefer = match mode {
            CountMode::Exact => "count=exact",
            CountMode::Estimated => "count=estimated",
        };
        let params = encode_params(q, None);
        let resp = self
            .request(Method::HEAD, &q.table)
            .query(&params)
            .header("Prefer", prefer)
            .send()
            .await
            .map_err(transport_error)?;
        let resp = check_status(resp).await?;
        parse_content_range(resp.headers().get(CONTENT_RANGE))
    }
}

fn transport_error(e: reqwest::Error) -> FetchError {
    if e.is_decode() {
        FetchError::Decode(e.to_string())
    } else {
        FetchError::Unavailable(e.to_string())
    }
}

async fn check_status(resp: Response) -> Result<Response, FetchError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}

fn status_error(status: StatusCode, body: &str) -> FetchError {
    let pg: Option<PgError> = serde_json::from_str(body).ok();
    let message = pg
        .as_ref()
        .and_then(|e| e.message.clone())
        .unwrap_or_else(|| truncate_for_log(body));

    if pg.as_ref().and_then(|e| e.code.as_deref()) == Some(PG_QUERY_CANCELED) {
        return FetchError::Unavailable(format!("statement timeout: {message}"));
    }
    if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        return FetchError::Unavailable(format!("HTTP {status}: {message}"));
    }
    FetchError::Rejected {
        status: status.as_u16(),
        message,
    }
}

fn parse_content_range(value: Option<&HeaderValue>) -> Result<u64, FetchError> {
    let raw = value
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| FetchError::Decode("missing Content-Range header".into()))?;
    raw.rsplit('/')
        .next()
        .and_then(|total| total.trim().parse::<u64>().ok())
        .ok_or_else(|| FetchError::Decode(format!("unusable Content-Range '{raw}'")))
}

pub fn encode_params(q: &Select, page: Option<(usize, usize)>) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let select = if q.columns.is_empty() {
        "*".to_string()
    } else {
        q.columns.join(",")
    };
    out.push(("select".to_string(), select));

    for p in &q.predicates {
        out.push((p.column.clone(), encode_op(&p.op)));
    }

    let order = match page {
        Some(_) => paging_order(q),
        None => q.order.iter().map(String::as_str).collect(),
    };
    if !order.is_empty() {
        let order = order
            .iter()
            .map(|c| format!("{c}.asc.nullslast"))
            .collect::<Vec<_>>()
            .join(",");
        out.push(("order".to_string(), order));
    }

    if let Some((offset, limit)) = page {
        out.push(("limit".to_string(), limit.to_string()));
        if offset > 0 {
            out.push(("offset".to_string(), offset.to_string()));
        }
    }
    out
}

// Requested order, then every selected column, so each offset page sees the
// same row order. `select=*` has nothing beyond `order` to sort on.
fn paging_order(q: &Select) -> Vec<&str> {
    let mut order: Vec<&str> = q.order.iter().map(String::as_str).collect();
    for c in &q.columns {
        if !order.contains(&c.as_str()) {
            order.push(c.as_str());
        }
    }
    order
}

fn encode_op(op: &Op) -> String {
    match op {
        Op::Eq(v) => format!("eq.{}", value_text(v)),
        Op::In(vs) => format!(
            "in.({})",
            vs.iter()
                .map(|v| quote_list_item(&value_text(v)))
                .collect::<Vec<_>>()
                .join(",")
        ),
        Op::IsNull => "is.null".to_string(),
        Op::NotNull => "not.is.null".to_string(),
        Op::Gte(v) => format!("gte.{}", value_text(v)),
        Op::Lte(v) => format!("lte.{}", value_text(v)),
        Op::StartsWith(prefix) => format!("ilike.{}*", escape_like(prefix)),
    }
}

fn quote_list_item(s: &str) -> String {
    let reserved = s
        .chars()
        .any(|c| matches!(c, ',' | '(' | ')' | '"' | '\\' | ':'))
        || s.trim() != s;
    if reserved {
        format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        s.to_string()
    }
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
        .replace('*', "\\*")
}

fn truncate_for_log(text: &str) -> String {
    let trimmed = text.trim();
    let max_len = 300usize;
    if trimmed.len() <= max_len {
        trimmed.to_string()
    } else {
        let mut end = max_len;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &trimmed[..end])
    }
}
