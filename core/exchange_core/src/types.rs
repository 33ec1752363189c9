//! # Types
//!
//! Shared data structures used across all modules of the exchange core.
//!
//! ## Round as a Finite-State Machine
//!
//! [`RoundState`] enforces a strict forward-only lifecycle:
//!
//! ```text
//! new ──► open ──► closed ──► locked
//!                               └──► (round t+1) new ──► open ...
//! ```
//!
//! The `is_open` / `is_locked` flags duplicate `state` on the wire. They must
//! always agree with it; divergence is reported, never smoothed over.
//!
//! ## Two phase vocabularies
//!
//! [`ProjectPhase`] is the coarse cross-workflow status derived from the
//! current round. [`WorkflowPhase`] is the richer per-workflow vocabulary.
//! They are independent state machines composed by the caller.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{ExchangeError, Result};

/// Lifecycle stage of a bidding round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundState {
    /// Created by the authority; not yet accepting bids.
    New,
    /// Accepting bids.
    Open,
    /// No longer accepting bids; may still be inspected.
    Closed,
    /// Irreversibly frozen; matching and settlement run externally.
    Locked,
}

impl RoundState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Locked => "locked",
        }
    }
}

impl fmt::Display for RoundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One bidding cycle within a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    /// Sequence number, monotonically increasing per project.
    pub t: u32,
    pub state: RoundState,
    pub is_open: bool,
    pub is_locked: bool,
    /// Advisory window, set only when the round is opened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bidding_window_start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bidding_window_end: Option<DateTime<Utc>>,
}

impl Round {
    /// A round in `state` with flags derived consistently and no window.
    pub fn new(t: u32, state: RoundState) -> Self {
        Round {
            t,
            state,
            is_open: state == RoundState::Open,
            is_locked: state == RoundState::Locked,
            bidding_window_start: None,
            bidding_window_end: None,
        }
    }

    /// `is_open ⇔ state = open` and `is_locked ⇔ state = locked`.
    pub fn check_consistency(&self) -> Result<()> {
        let open_ok = self.is_open == (self.state == RoundState::Open);
        let locked_ok = self.is_locked == (self.state == RoundState::Locked);
        if open_ok && locked_ok {
            Ok(())
        } else {
            Err(ExchangeError::RoundDivergence {
                t: self.t,
                state: self.state,
            })
        }
    }
}

/// Coarse cross-workflow status. Declaration order is lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectPhase {
    Draft,
    Published,
    RoundOpen,
    RoundClosed,
    RoundLocked,
    MatchingComputed,
    SettlementComputed,
    Finalized,
}

/// The parallel redevelopment programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Workflow {
    Saleable,
    Slum,
    Clearland,
    Subsidized,
}

impl Workflow {
    pub const ALL: [Workflow; 4] = [
        Workflow::Saleable,
        Workflow::Slum,
        Workflow::Clearland,
        Workflow::Subsidized,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Saleable => "saleable",
            Self::Slum => "slum",
            Self::Clearland => "clearland",
            Self::Subsidized => "subsidized",
        }
    }
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Workflow {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self> {
        Workflow::ALL
            .into_iter()
            .find(|w| w.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ExchangeError::validation(format!("unknown workflow: {s}")))
    }
}

/// Portal role of the acting participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Owns the project and drives the round lifecycle.
    Authority,
    Developer,
    Buyer,
}

/// The three kinds of sealed submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BidKind {
    Ask,
    Quote,
    Preference,
}

impl BidKind {
    pub const ALL: [BidKind; 3] = [BidKind::Ask, BidKind::Quote, BidKind::Preference];
}

/// Lifecycle of a single bid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BidState {
    Draft,
    Submitted,
    /// The round locked; the payload is immutable.
    Locked,
}

/// Union of every workflow's phase vocabulary.
///
/// Which phases a workflow uses, and in what order, lives in
/// [`crate::workflow`]; this enum only names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowPhase {
    Init,
    InventoryDeclared,
    ValuerAssessed,
    GovernmentChargesFixed,
    DeveloperAskOpen,
    BuyerBiddingOpen,
    PreferencesCollected,
    Locked,
    Settled,
    Closed,
}

impl WorkflowPhase {
    pub const ALL: [WorkflowPhase; 10] = [
        WorkflowPhase::Init,
        WorkflowPhase::InventoryDeclared,
        WorkflowPhase::ValuerAssessed,
        WorkflowPhase::GovernmentChargesFixed,
        WorkflowPhase::DeveloperAskOpen,
        WorkflowPhase::BuyerBiddingOpen,
        WorkflowPhase::PreferencesCollected,
        WorkflowPhase::Locked,
        WorkflowPhase::Settled,
        WorkflowPhase::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::InventoryDeclared => "INVENTORY_DECLARED",
            Self::ValuerAssessed => "VALUER_ASSESSED",
            Self::GovernmentChargesFixed => "GOVERNMENT_CHARGES_FIXED",
            Self::DeveloperAskOpen => "DEVELOPER_ASK_OPEN",
            Self::BuyerBiddingOpen => "BUYER_BIDDING_OPEN",
            Self::PreferencesCollected => "PREFERENCES_COLLECTED",
            Self::Locked => "LOCKED",
            Self::Settled => "SETTLED",
            Self::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowPhase {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self> {
        WorkflowPhase::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ExchangeError::validation(format!("unknown workflow phase: {s}")))
    }
}
