//! Project phase derivation.
//!
//! [`ProjectPhase`] is never stored. It is recomputed on every read from the
//! current round and three completion flags, by checking the rules in
//! [`PHASE_RULES`] in order; the first match wins.

use serde::{Deserialize, Serialize};

use crate::types::{ProjectPhase, Round};

/// Everything phase derivation looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseInputs {
    pub is_published: bool,
    pub has_round: bool,
    pub round_open: bool,
    pub round_locked: bool,
    pub matching_computed: bool,
    pub settlement_computed: bool,
    pub finalized: bool,
}

impl PhaseInputs {
    pub fn new(
        is_published: bool,
        round: Option<&Round>,
        matching_computed: bool,
        settlement_computed: bool,
        finalized: bool,
    ) -> Self {
        PhaseInputs {
            is_published,
            has_round: round.is_some(),
            round_open: round.is_some_and(|r| r.is_open),
            round_locked: round.is_some_and(|r| r.is_locked),
            matching_computed,
            settlement_computed,
            finalized,
        }
    }

    /// Combinations the exchange can actually produce.
    ///
    /// Each downstream flag implies its upstream one, and an open round is
    /// never locked.
    pub fn is_valid(&self) -> bool {
        let round_ok = self.has_round || !(self.round_open || self.round_locked);
        let published_ok = self.is_published || !self.has_round;
        round_ok
            && published_ok
            && !(self.round_open && self.round_locked)
            && (!self.matching_computed || self.round_locked)
            && (!self.settlement_computed || self.matching_computed)
            && (!self.finalized || self.settlement_computed)
    }
}

type Rule = fn(&PhaseInputs) -> bool;

/// Ordered derivation rules.
pub const PHASE_RULES: [(ProjectPhase, Rule); 8] = [
    (ProjectPhase::Draft, |i| !i.is_published),
    (ProjectPhase::Published, |i| i.is_published && !i.has_round),
    (ProjectPhase::RoundOpen, |i| {
        in_round(i) && i.round_open && !i.round_locked
    }),
    (ProjectPhase::RoundClosed, |i| {
        in_round(i) && !i.round_open && !i.round_locked
    }),
    (ProjectPhase::RoundLocked, |i| {
        in_round(i) && i.round_locked && !i.matching_computed
    }),
    (ProjectPhase::MatchingComputed, |i| {
        in_round(i) && i.matching_computed && !i.settlement_computed
    }),
    (ProjectPhase::SettlementComputed, |i| {
        in_round(i) && i.settlement_computed && !i.finalized
    }),
    (ProjectPhase::Finalized, |i| {
        in_round(i) && i.settlement_computed && i.finalized
    }),
];

fn in_round(i: &PhaseInputs) -> bool {
    i.is_published && i.has_round
}

pub fn derive_phase(
    is_published: bool,
    round: Option<&Round>,
    matching_computed: bool,
    settlement_computed: bool,
    finalized: bool,
) -> ProjectPhase {
    derive_from(&PhaseInputs::new(
        is_published,
        round,
        matching_computed,
        settlement_computed,
        finalized,
    ))
}

pub fn derive_from(inputs: &PhaseInputs) -> ProjectPhase {
    PHASE_RULES
        .iter()
        .find(|(_, rule)| rule(inputs))
        .map(|(phase, _)| *phase)
        .unwrap_or(ProjectPhase::Finalized)
}

/// Every rule that matches, in order. Exactly one for valid inputs.
pub fn matching_rules(inputs: &PhaseInputs) -> Vec<ProjectPhase> {
    PHASE_RULES
        .iter()
        .filter(|(_, rule)| rule(inputs))
        .map(|(phase, _)| *phase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RoundState;

    #[test]
    fn unpublished_is_draft_even_with_flags() {
        let round = Round::new(0, RoundState::Locked);
        assert_eq!(
            derive_phase(false, Some(&round), true, true, true),
            ProjectPhase::Draft
        );
    }

    #[test]
    fn published_without_round() {
        assert_eq!(derive_phase(true, None, false, false, false), ProjectPhase::Published);
    }

    #[test]
    fn round_states_map_to_phases() {
        let cases = [
            (RoundState::New, ProjectPhase::RoundClosed),
            (RoundState::Open, ProjectPhase::RoundOpen),
            (RoundState::Closed, ProjectPhase::RoundClosed),
            (RoundState::Locked, ProjectPhase::RoundLocked),
        ];
        for (state, phase) in cases {
            let round = Round::new(1, state);
            assert_eq!(derive_phase(true, Some(&round), false, false, false), phase);
        }
    }

    #[test]
    fn downstream_flags_advance_locked_round() {
        let round = Round::new(1, RoundState::Locked);
        assert_eq!(
            derive_phase(true, Some(&round), true, false, false),
            ProjectPhase::MatchingComputed
        );
        assert_eq!(
            derive_phase(true, Some(&round), true, true, false),
            ProjectPhase::SettlementComputed
        );
        assert_eq!(
            derive_phase(true, Some(&round), true, true, true),
            ProjectPhase::Finalized
        );
    }

    #[test]
    fn validity_rejects_impossible_combinations() {
        let round = Round::new(1, RoundState::Open);
        assert!(!PhaseInputs::new(true, Some(&round), true, false, false).is_valid());
        assert!(!PhaseInputs::new(true, None, false, true, false).is_valid());
        assert!(PhaseInputs::new(true, Some(&round), false, false, false).is_valid());
    }
}
