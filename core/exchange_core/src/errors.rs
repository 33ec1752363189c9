//! Error taxonomy shared by every exchange operation.
//!
//! Each variant carries a stable `code()` for programmatic handling and a
//! [`Recovery`] hint telling the caller what to do next.

use serde::Serialize;
use thiserror::Error;

use crate::types::RoundState;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExchangeError {
    /// Operation attempted outside its legal source state.
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// Malformed payload; never sent to the network.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The ledger hash chain does not verify.
    #[error("Ledger integrity failure at seq {first_bad_seq}")]
    LedgerIntegrity { first_bad_seq: u64 },

    /// Network, timeout or 5xx failure from the exchange API.
    #[error("Upstream error: {message}")]
    Upstream { message: String, retryable: bool },

    /// Missing or expired bearer token.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// `isOpen` / `isLocked` disagree with `state`.
    #[error("Round {t} flags diverge from state {state}")]
    RoundDivergence { t: u32, state: RoundState },
}

/// What the caller should do after an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recovery {
    /// Re-fetch authoritative state and re-render.
    Refetch,
    /// Show the problem to the user so they can correct the input.
    Correct,
    /// Stop offering settlement actions for the project.
    Halt,
    /// Transient; may be retried.
    Retry,
    /// Send the user back through authentication.
    Reauthenticate,
}

impl ExchangeError {
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::PreconditionFailed(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream {
            message: msg.into(),
            retryable: true,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::PreconditionFailed(_) => "PRECONDITION_FAILED",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::LedgerIntegrity { .. } => "LEDGER_INTEGRITY",
            Self::Upstream { .. } => "UPSTREAM_ERROR",
            Self::Unauthenticated(_) => "UNAUTHENTICATED",
            Self::RoundDivergence { .. } => "ROUND_DIVERGENCE",
        }
    }

    pub fn recovery(&self) -> Recovery {
        match self {
            Self::PreconditionFailed(_) | Self::RoundDivergence { .. } => Recovery::Refetch,
            Self::Validation(_) => Recovery::Correct,
            Self::LedgerIntegrity { .. } => Recovery::Halt,
            Self::Upstream { .. } => Recovery::Retry,
            Self::Unauthenticated(_) => Recovery::Reauthenticate,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream { retryable: true, .. })
    }
}

pub type Result<T> = std::result::Result<T, ExchangeError>;
