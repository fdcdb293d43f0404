//! Persisted Ledger Record Shapes
//!
//! Commits are opaque JSON-LD payloads; the core only guarantees a stable
//! address derived from their canonical byte form. Garbage and index-root
//! records are the bookkeeping files written next to commits.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Deterministic canonical JSON: object keys sorted recursively, compact
/// separators. This is the normalization contract content addressing hashes
/// over, so the same logical document always lands at the same address.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Object keys are JSON strings; reuse serde's escaping.
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

/// Garbage file: index nodes made unreachable by a reindex.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GarbageRecord {
    #[serde(rename = "ledger-id")]
    pub ledger_id: String,
    pub block: u64,
    pub garbage: Vec<String>,
}

/// Per-index statistics carried in a root record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStats {
    #[serde(default)]
    pub flakes: u64,
    #[serde(default)]
    pub size: u64,
}

/// Root file: the top of every index for one indexed state of a ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRootRecord {
    #[serde(rename = "ledger-id")]
    pub ledger_id: String,
    pub t: i64,
    pub ecount: Value,
    pub stats: IndexStats,
    pub spot: String,
    pub post: String,
    pub opst: String,
    pub tspo: String,
    pub timestamp: i64,
    #[serde(rename = "prevIndex", default, skip_serializing_if = "Option::is_none")]
    pub prev_index: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fork: Option<String>,
    #[serde(rename = "forkBlock", default, skip_serializing_if = "Option::is_none")]
    pub fork_block: Option<u64>,
}
