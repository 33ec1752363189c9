#![allow(dead_code)]

use crate::bids::{to_fixed, Ask};
use crate::ledger::{LedgerEntry, GENESIS_HASH};
use crate::phase::{matching_rules, PhaseInputs};
use crate::types::{Round, RoundState, WorkflowPhase};

/// Round flags must mirror `state`.
pub fn assert_round_flags_consistent(round: &Round) {
    assert_eq!(
        round.is_open,
        round.state == RoundState::Open,
        "round {} isOpen disagrees with state {}",
        round.t,
        round.state
    );
    assert_eq!(
        round.is_locked,
        round.state == RoundState::Locked,
        "round {} isLocked disagrees with state {}",
        round.t,
        round.state
    );
}

/// Only single forward steps are legal within one round:
///   new -> open -> closed -> locked
pub fn assert_valid_round_transition(from: RoundState, to: RoundState) {
    let valid = matches!(
        (from, to),
        (RoundState::New, RoundState::Open)
            | (RoundState::Open, RoundState::Closed)
            | (RoundState::Closed, RoundState::Locked)
    );
    assert!(valid, "invalid round transition from {from} to {to}");
}

/// Round history: strictly increasing `t`, every predecessor locked.
pub fn assert_round_history_monotonic(rounds: &[Round]) {
    for pair in rounds.windows(2) {
        assert!(
            pair[1].t > pair[0].t,
            "round {} listed after round {}",
            pair[1].t,
            pair[0].t
        );
        assert_eq!(
            pair[0].state,
            RoundState::Locked,
            "round {} superseded before locking",
            pair[0].t
        );
    }
}

/// No target may sit at or before `current` in `order`.
pub fn assert_forward_only(
    order: &[WorkflowPhase],
    current: Option<WorkflowPhase>,
    targets: &[WorkflowPhase],
) {
    let Some(index) = current.and_then(|c| order.iter().position(|&p| p == c)) else {
        return;
    };
    for target in targets {
        let target_index = order
            .iter()
            .position(|p| p == target)
            .unwrap_or_else(|| panic!("target {target} not in order"));
        assert!(
            target_index > index,
            "target {target} is not after {:?}",
            current
        );
    }
}

/// Exactly one derivation rule matches a valid input.
pub fn assert_single_phase_rule(inputs: &PhaseInputs) {
    let matched = matching_rules(inputs);
    assert_eq!(matched.len(), 1, "rules {matched:?} matched {inputs:?}");
}

pub fn assert_ask_total(ask: &Ask) {
    assert_eq!(
        to_fixed(ask.total_ask_inr),
        to_fixed(ask.dcu_units * ask.ask_price_per_unit_inr),
        "ask total {} != {} x {}",
        ask.total_ask_inr,
        ask.dcu_units,
        ask.ask_price_per_unit_inr
    );
}

/// Structural links only: seq from 1 and each prev_hash pointing back.
pub fn assert_chain_linked(entries: &[LedgerEntry]) {
    let mut prev = GENESIS_HASH.to_string();
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.seq, i as u64 + 1, "sequence gap at position {i}");
        assert_eq!(entry.prev_hash, prev, "broken link at seq {}", entry.seq);
        prev = entry.entry_hash.clone();
    }
}

/// Run all stateless round invariants.
pub fn assert_all_round_invariants(rounds: &[Round]) {
    for round in rounds {
        assert_round_flags_consistent(round);
    }
    assert_round_history_monotonic(rounds);
}
