//! # Workflow phase tables
//!
//! Each workflow is one declarative row: its canonical phase order and the
//! phase in which each bid kind may be submitted, and by whom. Adding a
//! workflow means adding a row here, not new branching logic.
//!
//! | Workflow   | Ask phase            | Quote phase          | Preference phase     |
//! |------------|----------------------|----------------------|----------------------|
//! | saleable   | `DEVELOPER_ASK_OPEN` | `BUYER_BIDDING_OPEN` | -                    |
//! | slum       | `DEVELOPER_ASK_OPEN` | `BUYER_BIDDING_OPEN` | -                    |
//! | clearland  | `DEVELOPER_ASK_OPEN` | `BUYER_BIDDING_OPEN` | `BUYER_BIDDING_OPEN` |
//! | subsidized | `DEVELOPER_ASK_OPEN` | `BUYER_BIDDING_OPEN` | -                    |

use serde::Serialize;

use crate::errors::{ExchangeError, Result};
use crate::types::{BidKind, Role, Workflow, WorkflowPhase};

use WorkflowPhase::*;

/// Who may submit a bid kind, and in which single phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BidRule {
    pub kind: BidKind,
    pub role: Role,
    pub phase: WorkflowPhase,
}

#[derive(Debug, Clone, Copy)]
pub struct WorkflowTable {
    pub workflow: Workflow,
    pub order: &'static [WorkflowPhase],
    pub bid_rules: &'static [BidRule],
}

const ASK: BidRule = BidRule {
    kind: BidKind::Ask,
    role: Role::Developer,
    phase: DeveloperAskOpen,
};

const QUOTE: BidRule = BidRule {
    kind: BidKind::Quote,
    role: Role::Buyer,
    phase: BuyerBiddingOpen,
};

const PREFERENCE: BidRule = BidRule {
    kind: BidKind::Preference,
    role: Role::Buyer,
    phase: BuyerBiddingOpen,
};

const SALEABLE: WorkflowTable = WorkflowTable {
    workflow: Workflow::Saleable,
    order: &[Init, DeveloperAskOpen, BuyerBiddingOpen, Locked, Settled, Closed],
    bid_rules: &[ASK, QUOTE],
};

const SLUM: WorkflowTable = WorkflowTable {
    workflow: Workflow::Slum,
    order: &[Init, DeveloperAskOpen, BuyerBiddingOpen, Locked, Settled, Closed],
    bid_rules: &[ASK, QUOTE],
};

const CLEARLAND: WorkflowTable = WorkflowTable {
    workflow: Workflow::Clearland,
    order: &[
        Init,
        DeveloperAskOpen,
        BuyerBiddingOpen,
        PreferencesCollected,
        Locked,
        Settled,
        Closed,
    ],
    bid_rules: &[ASK, QUOTE, PREFERENCE],
};

const SUBSIDIZED: WorkflowTable = WorkflowTable {
    workflow: Workflow::Subsidized,
    order: &[
        Init,
        InventoryDeclared,
        ValuerAssessed,
        GovernmentChargesFixed,
        DeveloperAskOpen,
        BuyerBiddingOpen,
        Locked,
        Settled,
        Closed,
    ],
    bid_rules: &[ASK, QUOTE],
};

pub const WORKFLOW_TABLES: [WorkflowTable; 4] = [SALEABLE, SLUM, CLEARLAND, SUBSIDIZED];

pub fn table(workflow: Workflow) -> &'static WorkflowTable {
    match workflow {
        Workflow::Saleable => &WORKFLOW_TABLES[0],
        Workflow::Slum => &WORKFLOW_TABLES[1],
        Workflow::Clearland => &WORKFLOW_TABLES[2],
        Workflow::Subsidized => &WORKFLOW_TABLES[3],
    }
}

impl WorkflowTable {
    pub fn rule_for(&self, kind: BidKind) -> Option<&'static BidRule> {
        self.bid_rules.iter().find(|rule| rule.kind == kind)
    }

    pub fn position(&self, phase: WorkflowPhase) -> Option<usize> {
        self.order.iter().position(|&p| p == phase)
    }
}

/// Legal forward targets from `current`.
///
/// A phase missing from `order` (or no phase at all) means the workflow has
/// not started, so only the first phase is offered.
pub fn legal_targets(order: &[WorkflowPhase], current: Option<WorkflowPhase>) -> Vec<WorkflowPhase> {
    match current.and_then(|c| order.iter().position(|&p| p == c)) {
        Some(index) => order[index + 1..].to_vec(),
        None => order.iter().take(1).copied().collect(),
    }
}

/// Reject any target that is not in [`legal_targets`].
pub fn check_transition(
    order: &[WorkflowPhase],
    current: Option<WorkflowPhase>,
    target: WorkflowPhase,
) -> Result<()> {
    if legal_targets(order, current).contains(&target) {
        return Ok(());
    }
    let from = current.map_or("(not started)", |c| c.as_str());
    Err(ExchangeError::precondition(format!(
        "phase transition {from} -> {target} is not a forward move"
    )))
}

pub const TRANSITION_WARNING: &str =
    "This phase change is recorded permanently on the project ledger and cannot be undone.";

/// A confirmed-to-be-legal phase change, with the warning the caller must show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionProposal {
    pub workflow: Workflow,
    pub from: Option<WorkflowPhase>,
    pub to: WorkflowPhase,
    pub warning: &'static str,
}

pub fn propose_transition(
    workflow: Workflow,
    current: Option<WorkflowPhase>,
    target: WorkflowPhase,
) -> Result<TransitionProposal> {
    check_transition(table(workflow).order, current, target)?;
    Ok(TransitionProposal {
        workflow,
        from: current,
        to: target,
        warning: TRANSITION_WARNING,
    })
}
