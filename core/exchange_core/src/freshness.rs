//! Stale-response detection.
//!
//! Remote round state only moves forward: `t` never decreases, within one `t`
//! the round state never regresses, and within one round state the project
//! phase never regresses. A read that would move any of these backwards is
//! older than something already seen and must be discarded.
//!
//! The round state is compared before the derived phase because the phase
//! alone does not follow the lifecycle: a `new` round derives to
//! `ROUND_CLOSED`, which sorts after the `ROUND_OPEN` it moves to next.

use crate::types::{ProjectPhase, RoundState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Same as or newer than everything seen so far.
    Fresh,
    /// Older than the current watermark; discard it.
    Stale,
}

/// Lifecycle position of one read, ordered field by field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Progress {
    pub t: u32,
    pub state: RoundState,
    pub phase: ProjectPhase,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Watermark {
    latest: Option<Progress>,
}

impl Watermark {
    pub fn latest(&self) -> Option<Progress> {
        self.latest
    }

    /// Record a read of round `t` in `state` deriving to `phase`, unless it is stale.
    pub fn observe(&mut self, t: u32, state: RoundState, phase: ProjectPhase) -> Observation {
        let read = Progress { t, state, phase };
        match self.latest {
            Some(seen) if read < seen => Observation::Stale,
            _ => {
                self.latest = Some(read);
                Observation::Fresh
            }
        }
    }
}
