//! Bid payloads and their local validation.
//!
//! Validation failures are `ExchangeError::Validation` and never reach the
//! network. Amounts are compared in fixed point with [`AMOUNT_SCALE`]
//! decimal places, so `total == units × price` is checked with zero tolerance.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::errors::{ExchangeError, Result};
use crate::types::{BidKind, BidState, Workflow};

pub const AMOUNT_SCALE: u32 = 4;

/// Convert an amount to fixed point at [`AMOUNT_SCALE`] decimal places.
pub fn to_fixed(amount: f64) -> i128 {
    (amount * 10f64.powi(AMOUNT_SCALE as i32)).round() as i128
}

fn require_positive(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ExchangeError::validation(format!(
            "{name} must be a positive number, got {value}"
        )));
    }
    Ok(())
}

/// A developer's sealed offer of DCU at a unit price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ask {
    pub dcu_units: f64,
    pub ask_price_per_unit_inr: f64,
    pub total_ask_inr: f64,
}

impl Ask {
    /// Build an ask with the total derived from units and price.
    pub fn priced(dcu_units: f64, ask_price_per_unit_inr: f64) -> Self {
        Ask {
            dcu_units,
            ask_price_per_unit_inr,
            total_ask_inr: dcu_units * ask_price_per_unit_inr,
        }
    }

    pub fn validate(&self) -> Result<()> {
        require_positive("dcuUnits", self.dcu_units)?;
        require_positive("askPricePerUnitInr", self.ask_price_per_unit_inr)?;
        require_positive("totalAskInr", self.total_ask_inr)?;
        let expected = to_fixed(self.dcu_units * self.ask_price_per_unit_inr);
        if to_fixed(self.total_ask_inr) != expected {
            return Err(ExchangeError::validation(format!(
                "totalAskInr {} does not equal dcuUnits {} x askPricePerUnitInr {}",
                self.total_ask_inr, self.dcu_units, self.ask_price_per_unit_inr
            )));
        }
        Ok(())
    }
}

/// A buyer's single bundled valuation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub qbundle_inr: f64,
}

impl Quote {
    pub fn validate(&self) -> Result<()> {
        require_positive("qbundleInr", self.qbundle_inr)
    }
}

/// A buyer's ranked choice of options, most preferred first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preference {
    pub ranking: Vec<String>,
}

impl Preference {
    pub fn validate(&self) -> Result<()> {
        if self.ranking.is_empty() {
            return Err(ExchangeError::validation("preference ranking is empty"));
        }
        let mut seen = HashSet::new();
        for option in &self.ranking {
            if option.trim().is_empty() {
                return Err(ExchangeError::validation("preference ranking has a blank option"));
            }
            if !seen.insert(option.as_str()) {
                return Err(ExchangeError::validation(format!(
                    "option {option} ranked more than once"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BidPayload {
    Ask(Ask),
    Quote(Quote),
    Preference(Preference),
}

impl BidPayload {
    pub fn kind(&self) -> BidKind {
        match self {
            BidPayload::Ask(_) => BidKind::Ask,
            BidPayload::Quote(_) => BidKind::Quote,
            BidPayload::Preference(_) => BidKind::Preference,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            BidPayload::Ask(ask) => ask.validate(),
            BidPayload::Quote(quote) => quote.validate(),
            BidPayload::Preference(preference) => preference.validate(),
        }
    }
}

/// A participant's submission, scoped to `(workflow, project, round, participant)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub workflow: Workflow,
    pub project_id: String,
    pub round_t: u32,
    pub participant_id: String,
    pub state: BidState,
    #[serde(flatten)]
    pub payload: BidPayload,
}

/// At most one live bid per participant and round: a draft may be
/// overwritten, anything already submitted or locked may not.
pub fn check_resubmission(existing: Option<&Bid>, round_t: u32) -> Result<()> {
    match existing {
        Some(bid) if bid.round_t == round_t && bid.state != BidState::Draft => {
            Err(ExchangeError::precondition(format!(
                "a {:?} bid for round {} is already {:?}",
                bid.payload.kind(),
                round_t,
                bid.state
            )))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bid(state: BidState, round_t: u32) -> Bid {
        Bid {
            workflow: Workflow::Clearland,
            project_id: "p-1".into(),
            round_t,
            participant_id: "dev-9".into(),
            state,
            payload: BidPayload::Ask(Ask::priced(10.0, 2500.0)),
        }
    }

    #[test]
    fn priced_ask_is_valid() {
        assert!(Ask::priced(120.5, 3400.25).validate().is_ok());
    }

    #[test]
    fn ask_total_mismatch_is_rejected() {
        let ask = Ask {
            dcu_units: 10.0,
            ask_price_per_unit_inr: 2500.0,
            total_ask_inr: 25_000.01,
        };
        assert!(matches!(ask.validate(), Err(ExchangeError::Validation(_))));
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        assert!(Ask::priced(0.0, 10.0).validate().is_err());
        assert!(Ask::priced(5.0, -1.0).validate().is_err());
        assert!(Ask::priced(f64::NAN, 1.0).validate().is_err());
        assert!(Quote { qbundle_inr: 0.0 }.validate().is_err());
        assert!(Quote { qbundle_inr: 1.5e7 }.validate().is_ok());
    }

    #[test]
    fn preference_ranking_rules() {
        let ok = Preference {
            ranking: vec!["plot-a".into(), "plot-b".into()],
        };
        assert!(ok.validate().is_ok());
        assert!(Preference { ranking: vec![] }.validate().is_err());
        assert!(Preference {
            ranking: vec!["plot-a".into(), "plot-a".into()]
        }
        .validate()
        .is_err());
        assert!(Preference {
            ranking: vec!["  ".into()]
        }
        .validate()
        .is_err());
    }

    #[test]
    fn draft_may_be_overwritten() {
        assert!(check_resubmission(None, 2).is_ok());
        assert!(check_resubmission(Some(&bid(BidState::Draft, 2)), 2).is_ok());
    }

    #[test]
    fn submitted_or_locked_bid_blocks_resubmission() {
        assert!(check_resubmission(Some(&bid(BidState::Submitted, 2)), 2).is_err());
        assert!(check_resubmission(Some(&bid(BidState::Locked, 2)), 2).is_err());
        // A bid from an earlier round does not count.
        assert!(check_resubmission(Some(&bid(BidState::Locked, 1)), 2).is_ok());
    }

    #[test]
    fn bid_wire_shape_flattens_payload() {
        let json = serde_json::to_value(bid(BidState::Submitted, 3)).unwrap();
        assert_eq!(json["kind"], "ask");
        assert_eq!(json["dcuUnits"], 10.0);
        assert_eq!(json["roundT"], 3);
        assert_eq!(json["state"], "submitted");
    }
}
