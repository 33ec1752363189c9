//! # Exchange Core
//!
//! Framework-independent rules of the development-rights auction exchange.
//! Matching, settlement and persistence all happen behind the exchange API;
//! this crate decides what the caller is allowed to do next and whether the
//! settlement record can be trusted.
//!
//! | Concern             | Module          | Entry point(s)                          |
//! |---------------------|-----------------|-----------------------------------------|
//! | Round lifecycle     | [`round`]       | `plan_open`, `plan_close`, `plan_lock`, `confirm` |
//! | Project phase       | [`phase`]       | `derive_phase`                          |
//! | Workflow phases     | [`workflow`]    | `legal_targets`, `propose_transition`   |
//! | Bid gating          | [`gate`]        | `can_submit`, `can_edit`, `evaluate`    |
//! | Bid payloads        | [`bids`]        | `BidPayload::validate`, `check_resubmission` |
//! | Ledger integrity    | [`ledger`]      | `verify`                                |
//! | Stale reads         | [`freshness`]   | `Watermark::observe`                    |
//!
//! ## Architecture
//!
//! Everything here is pure: no I/O, no clocks, no globals. Raw server state
//! flows in, decisions flow out:
//!
//! ```text
//! exchange API ──► round / ledger ──► phase / workflow ──► gate ──► caller
//! ```

pub mod bids;
pub mod canonical;
pub mod errors;
pub mod freshness;
pub mod gate;
pub mod ledger;
pub mod phase;
pub mod round;
pub mod types;
pub mod workflow;

#[cfg(test)]
mod invariants;
#[cfg(test)]
mod test_scenarios;

pub use errors::{ExchangeError, Recovery, Result};
pub use gate::{can_edit, can_submit, GateDecision};
pub use ledger::{verify, LedgerEntry, LedgerVerification};
pub use phase::derive_phase;
pub use types::{
    BidKind, BidState, ProjectPhase, Role, Round, RoundState, Workflow, WorkflowPhase,
};
pub use workflow::legal_targets;
