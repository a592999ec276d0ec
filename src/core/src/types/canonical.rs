//! Canonical JSON encoding used for signing and signature verification.
//!
//! Every node must agree byte-for-byte on the form being signed, so this
//! builds the canonical form from a `BTreeMap`, whose iteration order is
//! always key-sorted, rather than relying on incidental `serde_json::Map`
//! ordering (which preserves insertion order, not sort order).

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{CoreError, Result};

/// Recursively re-sort a `serde_json::Value`'s object keys into a
/// `BTreeMap`-backed form and serialize it to bytes.
pub fn canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let raw = serde_json::to_value(value)
        .map_err(|e| CoreError::serialization(format!("canonicalize: {e}")))?;
    let sorted = sort_value(raw);
    serde_json::to_vec(&sorted).map_err(|e| CoreError::serialization(format!("encode: {e}")))
}

fn sort_value(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, sort_value(v))).collect();
            // Re-emit as a Map; serde_json's Map preserves insertion order,
            // and insertion here is already key-sorted via BTreeMap iteration.
            let mut out = serde_json::Map::with_capacity(sorted.len());
            for (k, v) in sorted {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_value).collect()),
        other => other,
    }
}
