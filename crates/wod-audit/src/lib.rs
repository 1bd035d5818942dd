//! Tamper-evident audit chain.
//!
//! Every audit decision row carries `hash_prev` (the previous row's
//! `hash_self` within the same order, `None` for the first) and
//! `hash_self` (SHA-256 of the row's canonical JSON with `hash_self`
//! blanked). A verifier re-walks a row sequence and reports the first
//! break, so any in-place edit or deletion of an audit row is detectable
//! offline. The rows themselves live in Postgres; this crate owns only the
//! pure chain math.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use wod_schemas::AuditLogEntry;

/// Canonical payload hashed for one audit row: every immutable field, keys
/// sorted, compact encoding.
fn chain_payload(entry: &AuditLogEntry) -> Value {
    json!({
        "order_id": entry.order_id,
        "auditor_id": entry.auditor_id,
        "action": entry.action.as_str(),
        "comments": entry.comments,
        "created_at": entry.created_at.to_rfc3339(),
        "hash_prev": entry.hash_prev,
    })
}

/// Canonicalize by sorting keys recursively and emitting compact JSON.
fn canonical_json(v: &Value) -> Result<String> {
    let sorted = sort_keys(v);
    serde_json::to_string(&sorted).context("json stringify failed")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// Compute `hash_self` for an entry whose `hash_prev` is already set.
pub fn compute_entry_hash(entry: &AuditLogEntry) -> Result<String> {
    let canonical = canonical_json(&chain_payload(entry))?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Result of chain verification over one order's audit rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    /// The entire chain is valid.
    Valid { rows: usize },
    /// The chain is broken at the given row (0-based position in the slice).
    Broken { row: usize, reason: String },
}

/// Verify one order's audit rows in insertion order.
///
/// Rows written before chaining was enabled (`hash_self == None`) end the
/// checked prefix: verification only asserts what the rows claim.
pub fn verify_chain(entries: &[AuditLogEntry]) -> Result<VerifyResult> {
    let mut prev_hash: Option<String> = None;

    for (i, entry) in entries.iter().enumerate() {
        if entry.hash_prev != prev_hash {
            return Ok(VerifyResult::Broken {
                row: i,
                reason: format!(
                    "hash_prev mismatch: expected {:?}, got {:?}",
                    prev_hash, entry.hash_prev
                ),
            });
        }

        if let Some(ref claimed) = entry.hash_self {
            let recomputed = compute_entry_hash(entry)?;
            if *claimed != recomputed {
                return Ok(VerifyResult::Broken {
                    row: i,
                    reason: format!("hash_self mismatch: claimed {claimed}, recomputed {recomputed}"),
                });
            }
        }

        prev_hash = entry.hash_self.clone();
    }

    Ok(VerifyResult::Valid { rows: entries.len() })
}

/// Build the chained `(hash_prev, hash_self)` pair for a row about to be
/// appended after `prev` (the last row's `hash_self`, if any).
pub fn chain_next(entry: &mut AuditLogEntry, prev: Option<String>) -> Result<()> {
    entry.hash_prev = prev;
    entry.hash_self = Some(compute_entry_hash(entry)?);
    Ok(())
}
