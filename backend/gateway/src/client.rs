//! Exchange API client: every HTTP operation the gateway depends on.
//!
//! ## Resilience
//!
//! * Idempotent reads retry transient failures (timeouts, 5xx, 429) with
//!   exponential back-off, up to `READ_RETRIES` extra attempts.
//! * Mutations are sent exactly once. A rejection is surfaced, never retried.
//! * Every non-success status maps to a typed [`ExchangeError`] kind.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use exchange_core::bids::{Bid, BidPayload};
use exchange_core::round::RoundAction;
use exchange_core::{BidKind, ExchangeError, LedgerEntry, Result, Role, Round, Workflow};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::Bearer;
use crate::config::Config;

const MAX_BACKOFF: Duration = Duration::from_secs(5);

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

/// A project within a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub workflow: Workflow,
    pub project_id: String,
}

impl Scope {
    fn query(&self) -> Vec<(&'static str, String)> {
        vec![
            ("workflow", self.workflow.as_str().to_string()),
            ("projectId", self.project_id.clone()),
        ]
    }
}

#[derive(Debug, Deserialize)]
struct CurrentRoundResponse {
    current: Option<Round>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundCommand {
    pub workflow: Workflow,
    pub project_id: String,
    pub t: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bidding_window_start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bidding_window_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BidSubmission {
    pub workflow: Workflow,
    pub project_id: String,
    pub t: u32,
    #[serde(flatten)]
    pub payload: BidPayload,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MyCurrentBid {
    pub round: Option<Round>,
    pub bid: Option<Bid>,
}

/// Project-level status that is not part of the round.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectState {
    #[serde(default)]
    pub is_published: bool,
    /// Raw phase name; unknown names are treated as "not started".
    #[serde(default)]
    pub workflow_phase: Option<String>,
    #[serde(default)]
    pub finalized: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseChange {
    pub workflow: Workflow,
    pub project_id: String,
    pub from: Option<String>,
    pub to: String,
}

// ─────────────────────────────────────────────────────────
// Public API
// ─────────────────────────────────────────────────────────

/// The exchange operations orchestration depends on.
pub trait ExchangeApi: Send + Sync {
    fn current_round(&self, auth: &Bearer, scope: &Scope)
        -> impl Future<Output = Result<Option<Round>>> + Send;

    fn round_history(&self, auth: &Bearer, scope: &Scope)
        -> impl Future<Output = Result<Vec<Round>>> + Send;

    fn transition_round(
        &self,
        auth: &Bearer,
        action: RoundAction,
        command: &RoundCommand,
    ) -> impl Future<Output = Result<Round>> + Send;

    fn submit_bid(
        &self,
        auth: &Bearer,
        kind: BidKind,
        submission: &BidSubmission,
    ) -> impl Future<Output = Result<Bid>> + Send;

    fn my_current_bid(
        &self,
        auth: &Bearer,
        scope: &Scope,
        portal: Role,
    ) -> impl Future<Output = Result<MyCurrentBid>> + Send;

    fn ledger(&self, auth: &Bearer, scope: &Scope)
        -> impl Future<Output = Result<Vec<LedgerEntry>>> + Send;

    fn matching_result(&self, auth: &Bearer, scope: &Scope, t: u32)
        -> impl Future<Output = Result<Option<Value>>> + Send;

    fn settlement_result(&self, auth: &Bearer, scope: &Scope, t: u32)
        -> impl Future<Output = Result<Option<Value>>> + Send;

    fn project_state(&self, auth: &Bearer, scope: &Scope)
        -> impl Future<Output = Result<ProjectState>> + Send;

    fn change_phase(&self, auth: &Bearer, change: &PhaseChange)
        -> impl Future<Output = Result<ProjectState>> + Send;
}

#[derive(Debug, Clone)]
pub struct ExchangeClient {
    http: Client,
    base_url: String,
    read_retries: u32,
    backoff: Duration,
}

impl ExchangeClient {
    pub fn new(config: &Config) -> crate::errors::Result<Self> {
        let http = Client::builder().timeout(config.request_timeout()).build()?;
        Ok(ExchangeClient {
            http,
            base_url: config.api_url.clone(),
            read_retries: config.read_retries,
            backoff: config.retry_backoff(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get<T: DeserializeOwned>(
        &self,
        auth: &Bearer,
        path: &str,
        query: &[(&'static str, String)],
    ) -> Result<T> {
        self.get_optional(auth, path, query)
            .await?
            .ok_or_else(|| ExchangeError::Upstream {
                message: format!("{path} not found"),
                retryable: false,
            })
    }

    /// GET with bounded retries; `404` is `Ok(None)`.
    async fn get_optional<T: DeserializeOwned>(
        &self,
        auth: &Bearer,
        path: &str,
        query: &[(&'static str, String)],
    ) -> Result<Option<T>> {
        let mut backoff = self.backoff.min(MAX_BACKOFF);
        let mut attempt = 0;

        loop {
            let response = self
                .http
                .get(self.url(path))
                .bearer_auth(auth.token())
                .query(query)
                .send()
                .await;

            let err = match response {
                Ok(resp) if resp.status() == StatusCode::NOT_FOUND => return Ok(None),
                Ok(resp) if resp.status().is_success() => {
                    return decode(resp, path).await.map(Some);
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    classify_status(status, &body)
                }
                Err(e) => transport_error(&e),
            };

            if !err.is_retryable() || attempt >= self.read_retries {
                return Err(err);
            }
            attempt += 1;
            warn!("GET {path} failed (attempt {attempt}, retrying in {backoff:?}): {err}");
            tokio::time::sleep(backoff).await;
            backoff = next_backoff(backoff);
        }
    }

    /// POST exactly once.
    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        auth: &Bearer,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let resp = self
            .http
            .post(self.url(path))
            .bearer_auth(auth.token())
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }
        decode(resp, path).await
    }
}

impl ExchangeApi for ExchangeClient {
    async fn current_round(&self, auth: &Bearer, scope: &Scope) -> Result<Option<Round>> {
        let resp: CurrentRoundResponse = self.get(auth, "rounds/current", &scope.query()).await?;
        Ok(resp.current)
    }

    async fn round_history(&self, auth: &Bearer, scope: &Scope) -> Result<Vec<Round>> {
        self.get(auth, "rounds", &scope.query()).await
    }

    async fn transition_round(
        &self,
        auth: &Bearer,
        action: RoundAction,
        command: &RoundCommand,
    ) -> Result<Round> {
        let path = format!("rounds/{}", action.as_str());
        debug!("POST {path} t={}", command.t);
        self.post(auth, &path, command).await
    }

    async fn submit_bid(
        &self,
        auth: &Bearer,
        kind: BidKind,
        submission: &BidSubmission,
    ) -> Result<Bid> {
        self.post(auth, bid_path(kind), submission).await
    }

    async fn my_current_bid(
        &self,
        auth: &Bearer,
        scope: &Scope,
        portal: Role,
    ) -> Result<MyCurrentBid> {
        let mut query = scope.query();
        query.push(("portalType", role_param(portal).to_string()));
        Ok(self
            .get_optional(auth, "bids/my-current", &query)
            .await?
            .unwrap_or_default())
    }

    async fn ledger(&self, auth: &Bearer, scope: &Scope) -> Result<Vec<LedgerEntry>> {
        let entries: Option<Vec<LedgerEntry>> =
            self.get_optional(auth, "ledger", &scope.query()).await?;
        Ok(entries.unwrap_or_default())
    }

    async fn matching_result(&self, auth: &Bearer, scope: &Scope, t: u32) -> Result<Option<Value>> {
        let mut query = scope.query();
        query.push(("t", t.to_string()));
        let result: Option<Value> = self.get_optional(auth, "matching/result", &query).await?;
        Ok(result.filter(|v| !v.is_null()))
    }

    async fn settlement_result(
        &self,
        auth: &Bearer,
        scope: &Scope,
        t: u32,
    ) -> Result<Option<Value>> {
        let mut query = scope.query();
        query.push(("t", t.to_string()));
        let result: Option<Value> = self.get_optional(auth, "settlement/result", &query).await?;
        Ok(result.filter(|v| !v.is_null()))
    }

    async fn project_state(&self, auth: &Bearer, scope: &Scope) -> Result<ProjectState> {
        self.get(auth, "projects/state", &scope.query()).await
    }

    async fn change_phase(&self, auth: &Bearer, change: &PhaseChange) -> Result<ProjectState> {
        self.post(auth, "projects/phase", change).await
    }
}

// ─────────────────────────────────────────────────────────
// Status mapping
// ─────────────────────────────────────────────────────────

pub fn bid_path(kind: BidKind) -> &'static str {
    match kind {
        BidKind::Ask => "bids/ask",
        BidKind::Quote => "bids/quote",
        BidKind::Preference => "bids/preferences",
    }
}

fn role_param(role: Role) -> &'static str {
    match role {
        Role::Authority => "authority",
        Role::Developer => "developer",
        Role::Buyer => "buyer",
    }
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response, path: &str) -> Result<T> {
    resp.json::<T>().await.map_err(|e| ExchangeError::Upstream {
        message: format!("malformed response from {path}: {e}"),
        retryable: false,
    })
}

/// Double the delay, saturating at [`MAX_BACKOFF`].
fn next_backoff(current: Duration) -> Duration {
    current
        .checked_mul(2)
        .map_or(MAX_BACKOFF, |doubled| doubled.min(MAX_BACKOFF))
}

fn transport_error(err: &reqwest::Error) -> ExchangeError {
    if err.is_timeout() {
        ExchangeError::upstream("request to exchange timed out")
    } else {
        ExchangeError::upstream(format!("exchange unreachable: {err}"))
    }
}

/// Map a non-success status to a typed error kind.
pub fn classify_status(status: StatusCode, body: &str) -> ExchangeError {
    let message = error_message(body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("unexpected status")
            .to_string()
    });

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ExchangeError::Unauthenticated(message),
        StatusCode::BAD_REQUEST => ExchangeError::Validation(message),
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
            ExchangeError::PreconditionFailed(message)
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => ExchangeError::Upstream {
            message: format!("{status}: {message}"),
            retryable: true,
        },
        s if s.is_server_error() => ExchangeError::Upstream {
            message: format!("{status}: {message}"),
            retryable: true,
        },
        _ => ExchangeError::Upstream {
            message: format!("{status}: {message}"),
            retryable: false,
        },
    }
}

/// Pull `error` or `message` out of a JSON error body.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["error", "message", "detail"]
        .iter()
        .find_map(|key| value.get(key).and_then(Value::as_str))
        .map(String::from)
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
