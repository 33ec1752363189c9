//! # Ledger verification
//!
//! The settlement ledger is an append-only hash chain:
//!
//! ```text
//! entry_hash(i) = H(prev_hash(i) ‖ canonicalize(payload(i)))
//! prev_hash(1)  = GENESIS_HASH
//! prev_hash(i)  = entry_hash(i-1)            for i > 1
//! seq(i)        = i                          (gap-free, from 1)
//! ```
//!
//! [`verify`] replays the chain and stops at the first divergence; nothing
//! after it can be trusted. It performs no I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical::chain_hash;

pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub seq: u64,
    pub entry_type: String,
    pub contract_id: String,
    pub payload: Value,
    pub prev_hash: String,
    pub entry_hash: String,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Build the entry that follows `prev` (or the first entry when `None`).
    pub fn chained(
        prev: Option<&LedgerEntry>,
        entry_type: impl Into<String>,
        contract_id: impl Into<String>,
        payload: Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        let (seq, prev_hash) = match prev {
            Some(p) => (p.seq + 1, p.entry_hash.clone()),
            None => (1, GENESIS_HASH.to_string()),
        };
        let entry_hash = chain_hash(&prev_hash, &payload);
        LedgerEntry {
            seq,
            entry_type: entry_type.into(),
            contract_id: contract_id.into(),
            payload,
            prev_hash,
            entry_hash,
            created_at,
        }
    }
}

/// Why verification stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "fault", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerFault {
    SequenceGap { expected: u64 },
    PrevHashMismatch,
    EntryHashMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerVerification {
    pub valid: bool,
    pub first_bad_seq: Option<u64>,
    pub fault: Option<LedgerFault>,
    pub entries_checked: usize,
}

impl LedgerVerification {
    fn ok(entries_checked: usize) -> Self {
        LedgerVerification {
            valid: true,
            first_bad_seq: None,
            fault: None,
            entries_checked,
        }
    }

    fn broken(seq: u64, fault: LedgerFault, entries_checked: usize) -> Self {
        LedgerVerification {
            valid: false,
            first_bad_seq: Some(seq),
            fault: Some(fault),
            entries_checked,
        }
    }
}

pub fn verify(entries: &[LedgerEntry]) -> LedgerVerification {
    let mut prev_expected = GENESIS_HASH;

    for (index, entry) in entries.iter().enumerate() {
        let expected_seq = index as u64 + 1;
        let checked = index + 1;
        if entry.seq != expected_seq {
            return LedgerVerification::broken(
                entry.seq,
                LedgerFault::SequenceGap {
                    expected: expected_seq,
                },
                checked,
            );
        }
        if entry.prev_hash != prev_expected {
            return LedgerVerification::broken(entry.seq, LedgerFault::PrevHashMismatch, checked);
        }
        if chain_hash(prev_expected, &entry.payload) != entry.entry_hash {
            return LedgerVerification::broken(entry.seq, LedgerFault::EntryHashMismatch, checked);
        }
        prev_expected = entry.entry_hash.as_str();
    }

    LedgerVerification::ok(entries.len())
}
