//! Application-wide error types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use exchange_core::{ExchangeError, Recovery};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    pub retryable: bool,
    /// What the portal should do next.
    pub recovery: Recovery,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_bad_seq: Option<u64>,
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Exchange(err) => match err {
                ExchangeError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
                ExchangeError::Validation(_) => StatusCode::BAD_REQUEST,
                ExchangeError::PreconditionFailed(_) | ExchangeError::LedgerIntegrity { .. } => {
                    StatusCode::CONFLICT
                }
                ExchangeError::Upstream { .. } | ExchangeError::RoundDivergence { .. } => {
                    StatusCode::BAD_GATEWAY
                }
            },
            GatewayError::Http(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> ErrorResponse {
        let (code, retryable, recovery, first_bad_seq) = match self {
            GatewayError::Exchange(err) => {
                let seq = match err {
                    ExchangeError::LedgerIntegrity { first_bad_seq } => Some(*first_bad_seq),
                    _ => None,
                };
                (err.code(), err.is_retryable(), err.recovery(), seq)
            }
            GatewayError::Http(_) => ("UPSTREAM_ERROR", true, Recovery::Retry, None),
            GatewayError::Config(_) => ("CONFIG_ERROR", false, Recovery::Halt, None),
        };
        ErrorResponse {
            error: self.to_string(),
            code,
            retryable,
            recovery,
            first_bad_seq,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}
