//! # Round lifecycle
//!
//! Authority-only transitions of a bidding round:
//!
//! | Action  | Legal source state     | Result                         |
//! |---------|------------------------|--------------------------------|
//! | `open`  | `new`                  | same `t`, `open`               |
//! | `open`  | `locked` (or no round) | creates `t+1` (or `t=0`), `open` |
//! | `close` | `open`                 | `closed`                       |
//! | `lock`  | `closed`               | `locked` (irreversible)        |
//!
//! Every action is planned here before any request is issued, and the round
//! returned by the exchange is checked against the plan afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{ExchangeError, Result};
use crate::types::{Round, RoundState};

/// Sequence number given to the first round of a project.
pub const FIRST_ROUND: u32 = 0;

/// Advisory bidding window supplied when opening a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiddingWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BiddingWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start >= end {
            return Err(ExchangeError::validation(format!(
                "bidding window start {start} must be before end {end}"
            )));
        }
        Ok(BiddingWindow { start, end })
    }

    /// Both bounds are required.
    pub fn from_bounds(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<Self> {
        match (start, end) {
            (Some(start), Some(end)) => Self::new(start, end),
            (None, _) => Err(ExchangeError::validation("bidding window start is required")),
            (_, None) => Err(ExchangeError::validation("bidding window end is required")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundAction {
    Open,
    Close,
    Lock,
}

impl RoundAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::Lock => "lock",
        }
    }
}

/// A locally validated transition, ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPlan {
    pub action: RoundAction,
    /// Round the action was planned from, if any.
    pub source_t: Option<u32>,
    /// Round the request targets.
    pub target_t: u32,
    pub from: RoundState,
    pub to: RoundState,
    pub window: Option<BiddingWindow>,
}

impl TransitionPlan {
    /// True when the action opens a round that does not exist yet.
    pub fn creates_round(&self) -> bool {
        self.source_t != Some(self.target_t)
    }
}

/// Plan `open`. A locked current round (or none at all) opens the next `t`.
pub fn plan_open(current: Option<&Round>, window: BiddingWindow) -> Result<TransitionPlan> {
    let (source_t, target_t) = match current {
        None => (None, FIRST_ROUND),
        Some(round) => {
            round.check_consistency()?;
            match round.state {
                RoundState::New => (Some(round.t), round.t),
                RoundState::Locked => {
                    let next = round.t.checked_add(1).ok_or_else(|| {
                        ExchangeError::precondition("round sequence exhausted")
                    })?;
                    (Some(round.t), next)
                }
                other => {
                    return Err(ExchangeError::precondition(format!(
                        "cannot open round {}: state is {other}, expected new or locked",
                        round.t
                    )))
                }
            }
        }
    };

    Ok(TransitionPlan {
        action: RoundAction::Open,
        source_t,
        target_t,
        from: RoundState::New,
        to: RoundState::Open,
        window: Some(window),
    })
}

pub fn plan_close(current: &Round) -> Result<TransitionPlan> {
    single_step(RoundAction::Close, current, RoundState::Open, RoundState::Closed)
}

/// Plan `lock`. Once confirmed the round never leaves `locked`.
pub fn plan_lock(current: &Round) -> Result<TransitionPlan> {
    single_step(RoundAction::Lock, current, RoundState::Closed, RoundState::Locked)
}

fn single_step(
    action: RoundAction,
    current: &Round,
    from: RoundState,
    to: RoundState,
) -> Result<TransitionPlan> {
    current.check_consistency()?;
    if current.state != from {
        return Err(ExchangeError::precondition(format!(
            "cannot {} round {}: state is {}, expected {from}",
            action.as_str(),
            current.t,
            current.state
        )));
    }
    Ok(TransitionPlan {
        action,
        source_t: Some(current.t),
        target_t: current.t,
        from,
        to,
        window: None,
    })
}

/// Re-validate the round the exchange returned against what was planned.
pub fn confirm(plan: &TransitionPlan, returned: &Round) -> Result<()> {
    returned.check_consistency()?;
    if returned.t != plan.target_t || returned.state != plan.to {
        return Err(ExchangeError::precondition(format!(
            "{} expected round {} to be {}, exchange reports round {} {}",
            plan.action.as_str(),
            plan.target_t,
            plan.to,
            returned.t,
            returned.state
        )));
    }
    Ok(())
}

/// Observed states for one `t` must never move backwards.
///
/// Repeated observations of the same state (polling) are allowed.
pub fn is_monotonic(observed: &[RoundState]) -> bool {
    observed.windows(2).all(|pair| pair[0] <= pair[1])
}

/// Round history must be strictly increasing in `t`, and only the last
/// round may be anything other than `locked`.
pub fn check_history(rounds: &[Round]) -> Result<()> {
    for round in rounds {
        round.check_consistency()?;
    }
    for pair in rounds.windows(2) {
        if pair[1].t <= pair[0].t {
            return Err(ExchangeError::precondition(format!(
                "round history out of order: {} after {}",
                pair[1].t, pair[0].t
            )));
        }
        if pair[0].state != RoundState::Locked {
            return Err(ExchangeError::precondition(format!(
                "round {} followed by {} before reaching locked",
                pair[0].t, pair[1].t
            )));
        }
    }
    Ok(())
}
