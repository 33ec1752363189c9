//! Axum REST API handlers.
//!
//! Every handler parses the caller's bearer token before any upstream call,
//! then delegates to [`crate::orchestrator`].

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use exchange_core::bids::{Ask, BidPayload, Preference, Quote};
use exchange_core::ledger::LedgerVerification;
use exchange_core::round::RoundAction;
use exchange_core::{LedgerEntry, Role, Round, Workflow, WorkflowPhase};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::Bearer;
use crate::client::{ExchangeApi, ExchangeClient, MyCurrentBid, Scope};
use crate::errors::Result;
use crate::orchestrator::{self, BidOutcome, RoundOutcome, RoundRequest, Watermarks};

pub struct ApiState {
    pub client: ExchangeClient,
    pub watermarks: Watermarks,
}

type Shared = State<Arc<ApiState>>;

// ─────────────────────────────────────────────────────────
// Request shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeQuery {
    pub workflow: Workflow,
    pub project_id: String,
}

impl From<ScopeQuery> for Scope {
    fn from(q: ScopeQuery) -> Self {
        Scope {
            workflow: q.workflow,
            project_id: q.project_id,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleQuery {
    pub workflow: Workflow,
    pub project_id: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultQuery {
    pub workflow: Workflow,
    pub project_id: String,
    pub t: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundBody {
    pub workflow: Workflow,
    pub project_id: String,
    #[serde(flatten)]
    pub request: RoundRequest,
}

/// `{workflow, projectId, t?, role, ...payload}`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidBody<P> {
    pub workflow: Workflow,
    pub project_id: String,
    pub t: Option<u32>,
    pub role: Role,
    #[serde(flatten)]
    pub bid: P,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseBody {
    pub workflow: Workflow,
    pub project_id: String,
    /// Phase the caller last saw; the change is refused if it moved since.
    pub expected: Option<WorkflowPhase>,
    pub to: WorkflowPhase,
}

// ─────────────────────────────────────────────────────────
// Response shapes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct CurrentRoundResponse {
    pub current: Option<Round>,
}

#[derive(Serialize)]
pub struct LedgerResponse {
    pub count: usize,
    pub entries: Vec<LedgerEntry>,
    pub verification: LedgerVerification,
}

#[derive(Serialize)]
pub struct ResultResponse {
    pub t: u32,
    pub computed: bool,
    pub result: Option<Value>,
}

fn bearer(headers: &HeaderMap) -> Result<Bearer> {
    let header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    Ok(Bearer::parse(header, Utc::now())?)
}

fn round_status(outcome: &RoundOutcome) -> StatusCode {
    match outcome {
        RoundOutcome::Applied { .. } => StatusCode::OK,
        RoundOutcome::Rejected { .. } => StatusCode::CONFLICT,
    }
}

fn bid_status(outcome: &BidOutcome) -> StatusCode {
    match outcome {
        BidOutcome::Submitted { .. } => StatusCode::CREATED,
        BidOutcome::NotAllowed { .. } | BidOutcome::Rejected { .. } => StatusCode::CONFLICT,
    }
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /rounds/current`
pub async fn current_round(
    State(state): Shared,
    headers: HeaderMap,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<CurrentRoundResponse>> {
    let auth = bearer(&headers)?;
    let current = orchestrator::current_round(&state.client, &auth, &query.into()).await?;
    Ok(Json(CurrentRoundResponse { current }))
}

/// `GET /rounds`
pub async fn round_history(
    State(state): Shared,
    headers: HeaderMap,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<Vec<Round>>> {
    let auth = bearer(&headers)?;
    let rounds = orchestrator::round_history(&state.client, &auth, &query.into()).await?;
    Ok(Json(rounds))
}

async fn round_action(
    state: &ApiState,
    headers: &HeaderMap,
    action: RoundAction,
    body: RoundBody,
) -> Result<(StatusCode, Json<RoundOutcome>)> {
    let auth = bearer(headers)?;
    let scope = Scope {
        workflow: body.workflow,
        project_id: body.project_id,
    };
    let outcome =
        orchestrator::run_round_action(&state.client, &auth, &scope, action, &body.request).await?;
    Ok((round_status(&outcome), Json(outcome)))
}

/// `POST /rounds/open`
pub async fn open_round(
    State(state): Shared,
    headers: HeaderMap,
    Json(body): Json<RoundBody>,
) -> Result<(StatusCode, Json<RoundOutcome>)> {
    round_action(&state, &headers, RoundAction::Open, body).await
}

/// `POST /rounds/close`
pub async fn close_round(
    State(state): Shared,
    headers: HeaderMap,
    Json(body): Json<RoundBody>,
) -> Result<(StatusCode, Json<RoundOutcome>)> {
    round_action(&state, &headers, RoundAction::Close, body).await
}

/// `POST /rounds/lock`
pub async fn lock_round(
    State(state): Shared,
    headers: HeaderMap,
    Json(body): Json<RoundBody>,
) -> Result<(StatusCode, Json<RoundOutcome>)> {
    round_action(&state, &headers, RoundAction::Lock, body).await
}

async fn bid<P>(
    state: &ApiState,
    headers: &HeaderMap,
    body: BidBody<P>,
    into_payload: fn(P) -> BidPayload,
) -> Result<(StatusCode, Json<BidOutcome>)> {
    let auth = bearer(headers)?;
    let scope = Scope {
        workflow: body.workflow,
        project_id: body.project_id,
    };
    let outcome = orchestrator::submit_bid(
        &state.client,
        &auth,
        &scope,
        body.role,
        body.t,
        into_payload(body.bid),
    )
    .await?;
    Ok((bid_status(&outcome), Json(outcome)))
}

/// `POST /bids/ask`
pub async fn submit_ask(
    State(state): Shared,
    headers: HeaderMap,
    Json(body): Json<BidBody<Ask>>,
) -> Result<(StatusCode, Json<BidOutcome>)> {
    bid(&state, &headers, body, BidPayload::Ask).await
}

/// `POST /bids/quote`
pub async fn submit_quote(
    State(state): Shared,
    headers: HeaderMap,
    Json(body): Json<BidBody<Quote>>,
) -> Result<(StatusCode, Json<BidOutcome>)> {
    bid(&state, &headers, body, BidPayload::Quote).await
}

/// `POST /bids/preferences`
pub async fn submit_preferences(
    State(state): Shared,
    headers: HeaderMap,
    Json(body): Json<BidBody<Preference>>,
) -> Result<(StatusCode, Json<BidOutcome>)> {
    bid(&state, &headers, body, BidPayload::Preference).await
}

/// `GET /bids/my-current`
pub async fn my_current_bid(
    State(state): Shared,
    headers: HeaderMap,
    Query(query): Query<RoleQuery>,
) -> Result<Json<MyCurrentBid>> {
    let auth = bearer(&headers)?;
    let scope = Scope {
        workflow: query.workflow,
        project_id: query.project_id,
    };
    let mine = state.client.my_current_bid(&auth, &scope, query.role).await?;
    Ok(Json(mine))
}

/// `GET /ledger`
pub async fn ledger(
    State(state): Shared,
    headers: HeaderMap,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<LedgerResponse>> {
    let auth = bearer(&headers)?;
    let (entries, verification) =
        orchestrator::verified_ledger(&state.client, &auth, &query.into()).await?;
    Ok(Json(LedgerResponse {
        count: entries.len(),
        entries,
        verification,
    }))
}

/// `GET /ledger/verify`
pub async fn verify_ledger(
    State(state): Shared,
    headers: HeaderMap,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<LedgerVerification>> {
    let auth = bearer(&headers)?;
    let (_, verification) =
        orchestrator::verified_ledger(&state.client, &auth, &query.into()).await?;
    Ok(Json(verification))
}

/// `GET /matching/result`
pub async fn matching_result(
    State(state): Shared,
    headers: HeaderMap,
    Query(query): Query<ResultQuery>,
) -> Result<Json<ResultResponse>> {
    let auth = bearer(&headers)?;
    let scope = Scope {
        workflow: query.workflow,
        project_id: query.project_id,
    };
    let result = state.client.matching_result(&auth, &scope, query.t).await?;
    Ok(Json(ResultResponse {
        t: query.t,
        computed: result.is_some(),
        result,
    }))
}

/// `GET /settlement/result`
///
/// Refused with `LEDGER_INTEGRITY` while the project's ledger fails verification.
pub async fn settlement_result(
    State(state): Shared,
    headers: HeaderMap,
    Query(query): Query<ResultQuery>,
) -> Result<Json<ResultResponse>> {
    let auth = bearer(&headers)?;
    let scope = Scope {
        workflow: query.workflow,
        project_id: query.project_id,
    };
    let result = orchestrator::guarded_settlement(&state.client, &auth, &scope, query.t).await?;
    Ok(Json(ResultResponse {
        t: query.t,
        computed: result.is_some(),
        result,
    }))
}

/// `GET /projects/status`
pub async fn project_status(
    State(state): Shared,
    headers: HeaderMap,
    Query(query): Query<RoleQuery>,
) -> Result<Json<orchestrator::ProjectStatus>> {
    let auth = bearer(&headers)?;
    let scope = Scope {
        workflow: query.workflow,
        project_id: query.project_id,
    };
    let status =
        orchestrator::project_status(&state.client, &auth, &scope, query.role, &state.watermarks)
            .await?;
    Ok(Json(status))
}

/// `POST /projects/phase`
pub async fn change_phase(
    State(state): Shared,
    headers: HeaderMap,
    Json(body): Json<PhaseBody>,
) -> Result<Json<exchange_core::workflow::TransitionProposal>> {
    let auth = bearer(&headers)?;
    let scope = Scope {
        workflow: body.workflow,
        project_id: body.project_id,
    };
    let proposal =
        orchestrator::change_workflow_phase(&state.client, &auth, &scope, body.expected, body.to)
            .await?;
    Ok(Json(proposal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn missing_authorization_is_rejected_before_io() {
        let err = bearer(&HeaderMap::new()).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn bearer_header_is_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer opaque-token"));
        assert_eq!(bearer(&headers).unwrap().token(), "opaque-token");
    }

    #[test]
    fn ask_body_flattens_payload_fields() {
        let body: BidBody<Ask> = serde_json::from_value(serde_json::json!({
            "workflow": "clearland",
            "projectId": "clr-1",
            "t": 2,
            "role": "DEVELOPER",
            "dcuUnits": 10.0,
            "askPricePerUnitInr": 250.0,
            "totalAskInr": 2500.0
        }))
        .unwrap();
        assert_eq!(body.role, Role::Developer);
        assert_eq!(body.t, Some(2));
        assert!(BidPayload::Ask(body.bid).validate().is_ok());
    }

    #[test]
    fn round_body_reads_window() {
        let body: RoundBody = serde_json::from_value(serde_json::json!({
            "workflow": "slum",
            "projectId": "slum-4",
            "biddingWindowStart": "2026-10-02T09:00:00Z",
            "biddingWindowEnd": "2026-10-05T09:00:00Z"
        }))
        .unwrap();
        assert_eq!(body.workflow, Workflow::Slum);
        assert!(body.request.t.is_none());
        assert!(body.request.bidding_window_start.is_some());
    }

    #[test]
    fn outcomes_map_to_statuses() {
        let rejected = RoundOutcome::Rejected {
            message: "stale".into(),
            current: None,
        };
        assert_eq!(round_status(&rejected), StatusCode::CONFLICT);
        let not_allowed = BidOutcome::NotAllowed {
            reason: exchange_core::gate::DenyReason::NoRound,
        };
        assert_eq!(bid_status(&not_allowed), StatusCode::CONFLICT);
    }
}
