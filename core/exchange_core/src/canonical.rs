//! Canonical JSON and the ledger hash function.
//!
//! Object keys are sorted recursively and output is compact, so the same
//! logical payload always produces the same bytes regardless of the key
//! order it arrived in. Numbers keep `serde_json`'s shortest round-trip form.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

pub fn canonicalize(value: &Value) -> Vec<u8> {
    normalize(value.clone()).to_string().into_bytes()
}

fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> =
                map.into_iter().map(|(k, v)| (k, normalize(v))).collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k, v);
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(normalize).collect()),
        other => other,
    }
}

/// `H(prev_hash ‖ canonicalize(payload))`, lowercase hex SHA-256.
pub fn chain_hash(prev_hash: &str, payload: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prev_hash.as_bytes());
    hasher.update(canonicalize(payload));
    hex::encode(hasher.finalize())
}
