//! Orchestration of every gated action.
//!
//! Each operation follows the same event-driven contract: validate locally,
//! re-fetch authoritative state, issue at most one mutation, re-validate what
//! the exchange returned, and re-fetch instead of assuming success whenever
//! the exchange rejects a request.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use exchange_core::bids::{check_resubmission, Bid, BidPayload};
use exchange_core::freshness::{Observation, Watermark};
use exchange_core::gate::{ensure_ledger_trusted, evaluate, evaluate_edit, DenyReason};
use exchange_core::ledger::LedgerVerification;
use exchange_core::round::{
    check_history, confirm, plan_close, plan_lock, plan_open, BiddingWindow, RoundAction,
    TransitionPlan,
};
use exchange_core::workflow::{propose_transition, table, TransitionProposal};
use exchange_core::{
    derive_phase, legal_targets, verify, BidKind, ExchangeError, GateDecision, LedgerEntry,
    ProjectPhase, Result, Role, Round, RoundState, Workflow, WorkflowPhase,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::auth::Bearer;
use crate::client::{BidSubmission, ExchangeApi, PhaseChange, ProjectState, RoundCommand, Scope};

// ─────────────────────────────────────────────────────────
// Outcomes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundOutcome {
    Applied { round: Round },
    /// Refused locally or by the exchange; `current` is freshly re-fetched.
    Rejected {
        message: String,
        current: Option<Round>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BidOutcome {
    Submitted { bid: Bid },
    NotAllowed { reason: DenyReason },
    Rejected { message: String },
}

/// Lifecycle request body. `t` pins the round the caller was looking at.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundRequest {
    pub t: Option<u32>,
    pub bidding_window_start: Option<DateTime<Utc>>,
    pub bidding_window_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KindGate {
    pub kind: BidKind,
    #[serde(flatten)]
    pub decision: GateDecision,
}

/// Everything a portal needs to render gated controls for one project.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStatus {
    pub workflow: Workflow,
    pub project_id: String,
    pub phase: ProjectPhase,
    pub round: Option<Round>,
    pub workflow_phase: Option<WorkflowPhase>,
    pub legal_targets: Vec<WorkflowPhase>,
    pub gates: Vec<KindGate>,
    /// Edit gate for the caller's bid in the current round, if one exists.
    pub my_bid: Option<KindGate>,
    pub ledger: LedgerVerification,
    pub settlement_actions_available: bool,
}

// ─────────────────────────────────────────────────────────
// Freshness
// ─────────────────────────────────────────────────────────

/// One watermark per project, shared by every request.
#[derive(Debug, Default)]
pub struct Watermarks(Mutex<HashMap<(Workflow, String), Watermark>>);

impl Watermarks {
    pub fn observe(&self, scope: &Scope, round: &Round, phase: ProjectPhase) -> Observation {
        let mut marks = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        marks
            .entry((scope.workflow, scope.project_id.clone()))
            .or_default()
            .observe(round.t, round.state, phase)
    }
}

const STATUS_ATTEMPTS: u32 = 2;

// ─────────────────────────────────────────────────────────
// Rounds
// ─────────────────────────────────────────────────────────

pub async fn current_round<A: ExchangeApi>(
    api: &A,
    auth: &Bearer,
    scope: &Scope,
) -> Result<Option<Round>> {
    let current = api.current_round(auth, scope).await?;
    if let Some(round) = current.as_ref() {
        round.check_consistency()?;
    }
    Ok(current)
}

/// Round history, rejected as upstream corruption if it is out of order.
pub async fn round_history<A: ExchangeApi>(
    api: &A,
    auth: &Bearer,
    scope: &Scope,
) -> Result<Vec<Round>> {
    let rounds = api.round_history(auth, scope).await?;
    match check_history(&rounds) {
        Ok(()) => Ok(rounds),
        Err(ExchangeError::PreconditionFailed(message)) => {
            error!(
                "{}/{}: inconsistent round history: {message}",
                scope.workflow, scope.project_id
            );
            Err(ExchangeError::Upstream {
                message: format!("inconsistent round history: {message}"),
                retryable: false,
            })
        }
        Err(e) => Err(e),
    }
}

/// Open, close or lock the project's current round.
pub async fn run_round_action<A: ExchangeApi>(
    api: &A,
    auth: &Bearer,
    scope: &Scope,
    action: RoundAction,
    request: &RoundRequest,
) -> Result<RoundOutcome> {
    let window = match action {
        RoundAction::Open => Some(BiddingWindow::from_bounds(
            request.bidding_window_start,
            request.bidding_window_end,
        )?),
        RoundAction::Close | RoundAction::Lock => None,
    };

    let current = current_round(api, auth, scope).await?;
    let plan = match plan_for(action, current.as_ref(), window) {
        Ok(plan) => plan,
        Err(ExchangeError::PreconditionFailed(message)) => {
            return Ok(RoundOutcome::Rejected { message, current })
        }
        Err(e) => return Err(e),
    };
    if let Some(t) = request.t {
        if t != plan.target_t && Some(t) != plan.source_t {
            return Ok(RoundOutcome::Rejected {
                message: format!("round {t} is no longer current"),
                current,
            });
        }
    }

    let command = RoundCommand {
        workflow: scope.workflow,
        project_id: scope.project_id.clone(),
        t: plan.target_t,
        bidding_window_start: plan.window.map(|w| w.start),
        bidding_window_end: plan.window.map(|w| w.end),
    };

    let rejection = match api.transition_round(auth, action, &command).await {
        Ok(returned) => match confirm(&plan, &returned) {
            Ok(()) => {
                info!(
                    "{}/{}: round {} {} -> {}",
                    scope.workflow, scope.project_id, returned.t, plan.from, returned.state
                );
                return Ok(RoundOutcome::Applied { round: returned });
            }
            Err(ExchangeError::PreconditionFailed(message)) => message,
            Err(e) => return Err(e),
        },
        Err(ExchangeError::PreconditionFailed(message)) => message,
        Err(e) => return Err(e),
    };

    warn!(
        "{}/{}: {} round {} rejected, re-fetching: {rejection}",
        scope.workflow,
        scope.project_id,
        action.as_str(),
        plan.target_t
    );
    let current = current_round(api, auth, scope).await?;
    Ok(RoundOutcome::Rejected {
        message: rejection,
        current,
    })
}

fn plan_for(
    action: RoundAction,
    current: Option<&Round>,
    window: Option<BiddingWindow>,
) -> Result<TransitionPlan> {
    match (action, current) {
        (RoundAction::Open, current) => {
            let window = window
                .ok_or_else(|| ExchangeError::validation("bidding window is required"))?;
            plan_open(current, window)
        }
        (RoundAction::Close, Some(round)) => plan_close(round),
        (RoundAction::Lock, Some(round)) => plan_lock(round),
        (_, None) => Err(ExchangeError::precondition(format!(
            "no round to {}",
            action.as_str()
        ))),
    }
}

// ─────────────────────────────────────────────────────────
// Bids
// ─────────────────────────────────────────────────────────

/// Submit (or overwrite a draft of) the caller's bid in the current round.
pub async fn submit_bid<A: ExchangeApi>(
    api: &A,
    auth: &Bearer,
    scope: &Scope,
    role: Role,
    t: Option<u32>,
    payload: BidPayload,
) -> Result<BidOutcome> {
    payload.validate()?;
    let kind = payload.kind();

    let (state, round, mine) = tokio::try_join!(
        api.project_state(auth, scope),
        current_round(api, auth, scope),
        api.my_current_bid(auth, scope, role),
    )?;
    let workflow_phase = parse_workflow_phase(&state, scope);

    let decision = evaluate(kind, role, round.as_ref(), scope.workflow, workflow_phase);
    let round = match (decision, round) {
        (GateDecision::Allowed, Some(round)) => round,
        (GateDecision::NotAllowed(reason), _) => return Ok(BidOutcome::NotAllowed { reason }),
        (GateDecision::Allowed, None) => {
            return Ok(BidOutcome::NotAllowed {
                reason: DenyReason::NoRound,
            })
        }
    };
    if let Some(t) = t.filter(|t| *t != round.t) {
        return Ok(BidOutcome::Rejected {
            message: format!("round {t} is no longer current, round {} is open", round.t),
        });
    }
    if let Err(ExchangeError::PreconditionFailed(message)) =
        check_resubmission(mine.bid.as_ref(), round.t)
    {
        return Ok(BidOutcome::Rejected { message });
    }

    let submission = BidSubmission {
        workflow: scope.workflow,
        project_id: scope.project_id.clone(),
        t: round.t,
        payload,
    };
    match api.submit_bid(auth, kind, &submission).await {
        Ok(bid) => {
            info!(
                "{}/{}: {kind:?} bid submitted for round {}",
                scope.workflow, scope.project_id, round.t
            );
            Ok(BidOutcome::Submitted { bid })
        }
        Err(ExchangeError::PreconditionFailed(message)) => {
            warn!(
                "{}/{}: {kind:?} bid rejected by exchange: {message}",
                scope.workflow, scope.project_id
            );
            Ok(BidOutcome::Rejected { message })
        }
        Err(e) => Err(e),
    }
}

fn parse_workflow_phase(state: &ProjectState, scope: &Scope) -> Option<WorkflowPhase> {
    let raw = state.workflow_phase.as_deref()?;
    match raw.parse() {
        Ok(phase) => Some(phase),
        Err(_) => {
            warn!(
                "{}/{}: unknown workflow phase {raw:?}, treating as not started",
                scope.workflow, scope.project_id
            );
            None
        }
    }
}

// ─────────────────────────────────────────────────────────
// Project status
// ─────────────────────────────────────────────────────────

struct Snapshot {
    state: ProjectState,
    round: Option<Round>,
    mine: Option<Bid>,
    ledger: Vec<LedgerEntry>,
    phase: ProjectPhase,
}

async fn snapshot<A: ExchangeApi>(
    api: &A,
    auth: &Bearer,
    scope: &Scope,
    role: Role,
) -> Result<Snapshot> {
    let (state, round, mine, ledger) = tokio::try_join!(
        api.project_state(auth, scope),
        current_round(api, auth, scope),
        api.my_current_bid(auth, scope, role),
        api.ledger(auth, scope),
    )?;

    let (matching, settlement) = match round.as_ref() {
        Some(r) if r.state == RoundState::Locked => {
            let (m, s) = tokio::try_join!(
                api.matching_result(auth, scope, r.t),
                api.settlement_result(auth, scope, r.t),
            )?;
            (m.is_some(), s.is_some())
        }
        _ => (false, false),
    };
    let phase = derive_phase(
        state.is_published,
        round.as_ref(),
        matching,
        settlement,
        state.finalized,
    );

    Ok(Snapshot {
        state,
        round,
        mine: mine.bid,
        ledger,
        phase,
    })
}

/// Derived status for the caller's role. A read older than one already served
/// for this project is re-fetched once, then reported as a transient failure.
pub async fn project_status<A: ExchangeApi>(
    api: &A,
    auth: &Bearer,
    scope: &Scope,
    role: Role,
    watermarks: &Watermarks,
) -> Result<ProjectStatus> {
    for attempt in 1..=STATUS_ATTEMPTS {
        let snap = snapshot(api, auth, scope, role).await?;
        let observation = match snap.round.as_ref() {
            Some(round) => watermarks.observe(scope, round, snap.phase),
            None => Observation::Fresh,
        };
        if observation == Observation::Fresh {
            return Ok(build_status(scope, role, snap));
        }
        warn!(
            "{}/{}: stale read ({:?}) on attempt {attempt}",
            scope.workflow, scope.project_id, snap.phase
        );
    }
    Err(ExchangeError::upstream(
        "exchange keeps returning state older than already observed",
    ))
}

fn build_status(scope: &Scope, role: Role, snap: Snapshot) -> ProjectStatus {
    let workflow_phase = parse_workflow_phase(&snap.state, scope);
    let round = snap.round.as_ref();

    let gates = BidKind::ALL
        .into_iter()
        .map(|kind| KindGate {
            kind,
            decision: evaluate(kind, role, round, scope.workflow, workflow_phase),
        })
        .collect();
    let my_bid = snap
        .mine
        .as_ref()
        .filter(|bid| round.is_some_and(|r| r.t == bid.round_t))
        .map(|bid| KindGate {
            kind: bid.payload.kind(),
            decision: evaluate_edit(
                bid.payload.kind(),
                role,
                round,
                scope.workflow,
                workflow_phase,
                bid.state,
            ),
        });

    let ledger = verify(&snap.ledger);
    if let Some(seq) = ledger.first_bad_seq {
        error!(
            "{}/{}: ledger failed verification at seq {seq}",
            scope.workflow, scope.project_id
        );
    }
    let settlement_actions_available =
        ledger.valid && round.is_some_and(|r| r.state == RoundState::Locked);

    ProjectStatus {
        workflow: scope.workflow,
        project_id: scope.project_id.clone(),
        phase: snap.phase,
        round: snap.round.clone(),
        workflow_phase,
        legal_targets: legal_targets(table(scope.workflow).order, workflow_phase),
        gates,
        my_bid,
        ledger,
        settlement_actions_available,
    }
}

/// Move the workflow phase forward. `expected` pins the phase the caller saw.
pub async fn change_workflow_phase<A: ExchangeApi>(
    api: &A,
    auth: &Bearer,
    scope: &Scope,
    expected: Option<WorkflowPhase>,
    target: WorkflowPhase,
) -> Result<TransitionProposal> {
    let state = api.project_state(auth, scope).await?;
    let current = parse_workflow_phase(&state, scope);
    if expected.is_some() && expected != current {
        return Err(ExchangeError::precondition(format!(
            "workflow phase changed: expected {}, now {}",
            phase_name(expected),
            phase_name(current)
        )));
    }
    let proposal = propose_transition(scope.workflow, current, target)?;

    let change = PhaseChange {
        workflow: scope.workflow,
        project_id: scope.project_id.clone(),
        from: current.map(|p| p.as_str().to_string()),
        to: target.as_str().to_string(),
    };
    let returned = api.change_phase(auth, &change).await?;
    let now = parse_workflow_phase(&returned, scope);
    if now.is_some() && now != Some(target) {
        return Err(ExchangeError::precondition(format!(
            "exchange reports workflow phase {} after moving to {target}",
            phase_name(now)
        )));
    }

    info!(
        "{}/{}: workflow phase {} -> {target}",
        scope.workflow,
        scope.project_id,
        phase_name(current)
    );
    Ok(proposal)
}

fn phase_name(phase: Option<WorkflowPhase>) -> &'static str {
    phase.map_or("not started", |p| p.as_str())
}

// ─────────────────────────────────────────────────────────
// Ledger & results
// ─────────────────────────────────────────────────────────

pub async fn verified_ledger<A: ExchangeApi>(
    api: &A,
    auth: &Bearer,
    scope: &Scope,
) -> Result<(Vec<LedgerEntry>, LedgerVerification)> {
    let entries = api.ledger(auth, scope).await?;
    let verification = verify(&entries);
    if let Some(seq) = verification.first_bad_seq {
        error!(
            "{}/{}: ledger failed verification at seq {seq} ({:?})",
            scope.workflow, scope.project_id, verification.fault
        );
    }
    Ok((entries, verification))
}

/// Settlement result, refused while the ledger fails verification.
pub async fn guarded_settlement<A: ExchangeApi>(
    api: &A,
    auth: &Bearer,
    scope: &Scope,
    t: u32,
) -> Result<Option<Value>> {
    let (_, verification) = verified_ledger(api, auth, scope).await?;
    ensure_ledger_trusted(&verification)?;
    api.settlement_result(auth, scope, t).await
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
