//! Canonical JSON rendering and the summary hash.
//!
//! The canonical form sorts object keys lexicographically at every depth and
//! keeps array order; scalars use serde_json's standard printable form. Only
//! the validation summary is ever hashed; timestamps, paths, and the run
//! manifest must never enter the canonical form.

use crate::schema::ValidationSummary;
use anyhow::{Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

pub fn canonical_json(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => {
            serde_json::to_string(text).expect("serialize JSON string")
        }
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", rendered.join(","))
        }
        Value::Object(map) => {
            let mut sorted = BTreeMap::new();
            for (key, value) in map {
                sorted.insert(key, canonical_json(value));
            }
            let rendered: Vec<String> = sorted
                .into_iter()
                .map(|(key, value)| {
                    let key = serde_json::to_string(key).expect("serialize JSON key");
                    format!("{key}:{value}")
                })
                .collect();
            format!("{{{}}}", rendered.join(","))
        }
    }
}

pub fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// The determinism witness: SHA-256 of the canonicalized summary.
pub fn summary_hash(summary: &ValidationSummary) -> Result<String> {
    let value = serde_json::to_value(summary).context("serialize validation summary")?;
    Ok(sha256_hex(&canonical_json(&value)))
}
