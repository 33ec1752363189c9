//! Bid gating.
//!
//! A bid of kind K is submittable iff the round is `open`, the caller holds
//! the role the workflow designates for K, and the workflow phase equals the
//! single phase designated for K. Every refusal carries a reason so the
//! caller can render "not allowed now" explicitly.

use serde::Serialize;

use crate::errors::{ExchangeError, Result};
use crate::ledger::LedgerVerification;
use crate::types::{BidKind, BidState, Role, Round, RoundState, Workflow, WorkflowPhase};
use crate::workflow::table;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenyReason {
    NoRound,
    RoundNotOpen { state: RoundState },
    KindNotOffered { kind: BidKind },
    WrongRole { required: Role },
    #[serde(rename_all = "camelCase")]
    WrongPhase {
        required: WorkflowPhase,
        current: Option<WorkflowPhase>,
    },
    BidLocked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateDecision {
    Allowed,
    NotAllowed(DenyReason),
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allowed)
    }

    /// Turn a refusal into a `PreconditionFailed`.
    pub fn into_result(self, kind: BidKind) -> Result<()> {
        match self {
            GateDecision::Allowed => Ok(()),
            GateDecision::NotAllowed(reason) => Err(ExchangeError::precondition(format!(
                "{kind:?} not allowed now: {reason:?}"
            ))),
        }
    }
}

pub fn evaluate(
    kind: BidKind,
    role: Role,
    round: Option<&Round>,
    workflow: Workflow,
    phase: Option<WorkflowPhase>,
) -> GateDecision {
    let Some(round) = round else {
        return GateDecision::NotAllowed(DenyReason::NoRound);
    };
    if round.state != RoundState::Open || !round.is_open {
        return GateDecision::NotAllowed(DenyReason::RoundNotOpen { state: round.state });
    }
    let Some(rule) = table(workflow).rule_for(kind) else {
        return GateDecision::NotAllowed(DenyReason::KindNotOffered { kind });
    };
    if rule.role != role {
        return GateDecision::NotAllowed(DenyReason::WrongRole {
            required: rule.role,
        });
    }
    if phase != Some(rule.phase) {
        return GateDecision::NotAllowed(DenyReason::WrongPhase {
            required: rule.phase,
            current: phase,
        });
    }
    GateDecision::Allowed
}

pub fn can_submit(
    kind: BidKind,
    role: Role,
    round: Option<&Round>,
    workflow: Workflow,
    phase: Option<WorkflowPhase>,
) -> bool {
    evaluate(kind, role, round, workflow, phase).is_allowed()
}

/// Same gate as submission, and the bid must not be locked.
pub fn evaluate_edit(
    kind: BidKind,
    role: Role,
    round: Option<&Round>,
    workflow: Workflow,
    phase: Option<WorkflowPhase>,
    bid_state: BidState,
) -> GateDecision {
    if bid_state == BidState::Locked {
        return GateDecision::NotAllowed(DenyReason::BidLocked);
    }
    evaluate(kind, role, round, workflow, phase)
}

pub fn can_edit(
    kind: BidKind,
    role: Role,
    round: Option<&Round>,
    workflow: Workflow,
    phase: Option<WorkflowPhase>,
    bid_state: BidState,
) -> bool {
    evaluate_edit(kind, role, round, workflow, phase, bid_state).is_allowed()
}

/// Settlement actions stay unavailable while the ledger fails verification.
pub fn ensure_ledger_trusted(verification: &LedgerVerification) -> Result<()> {
    match verification.first_bad_seq {
        Some(first_bad_seq) if !verification.valid => {
            Err(ExchangeError::LedgerIntegrity { first_bad_seq })
        }
        _ => Ok(()),
    }
}
