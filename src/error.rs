use std::time::Duration;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("database request timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("database unavailable: {0}")]
    Unavailable(String),
    #[error("database rejected query ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("could not decode database response: {0}")]
    Decode(String),
    #[error("query failed: {0}")]
    Query(String),
}

impl FetchError {
    pub fn is_upstream_unavailable(&self) -> bool {
        matches!(self, FetchError::Timeout(_) | FetchError::Unavailable(_))
    }
}

impl From<duckdb::Error> for FetchError {
    fn from(e: duckdb::Error) -> Self {
        FetchError::Query(e.to_string())
    }
}

/// Request-level error, mapped onto the JSON error envelope.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    InvalidInput {
        message: String,
        accepted: Vec<String>,
    },
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn invalid<I, S>(message: impl Into<String>, accepted: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ApiError::InvalidInput {
            message: message.into(),
            accepted: accepted.into_iter().map(Into::into).collect(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::InvalidInput {
            message: message.into(),
            accepted: Vec::new(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Fetch(e) if e.is_upstream_unavailable() => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Fetch(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub accepted: Vec<String>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            accepted: Vec::new(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match status {
            StatusCode::SERVICE_UNAVAILABLE => tracing::warn!("upstream unavailable: {}", self),
            StatusCode::INTERNAL_SERVER_ERROR => tracing::error!("request failed: {:?}", self),
            _ => tracing::debug!("rejected request: {}", self),
        }

        let body = match self {
            ApiError::InvalidInput { message, accepted } => ErrorBody {
                success: false,
                error: message,
                accepted,
            },
            other => ErrorBody::new(other.to_string()),
        };
        (status, Json(body)).into_response()
    }
}
