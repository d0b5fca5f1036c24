// Content hashes used to suppress repeat notifications.
// Keys are serialised in sorted order so the hash only moves when a value does.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::gateway::ApiFailure;
use crate::gates::SubstrateMismatch;

pub const FAILURE_NAMESPACE: &str = "order_failure";
pub const SUBSTRATE_NAMESPACE: &str = "printed_substrate_mismatch";

fn digest(fields: &BTreeMap<&str, Value>) -> String {
    let canonical = serde_json::to_string(fields).unwrap_or_default();
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// Signature of an order failure: step, message and the API fields behind it
pub fn failure_signature(step: &str, message: &str, api: Option<&ApiFailure>) -> String {
    let mut fields = BTreeMap::new();
    fields.insert("namespace", json!(FAILURE_NAMESPACE));
    fields.insert("step", json!(step));
    fields.insert("message", json!(message.trim()));
    fields.insert("api_entity", json!(api.map(|a| a.entity.as_str())));
    fields.insert("api_status", json!(api.and_then(|a| a.status)));
    fields.insert(
        "api_first_message",
        json!(api.and_then(|a| a.messages.first()).map(|m| m.trim())),
    );
    digest(&fields)
}

/// Signature of a printed-substrate mismatch, independent of the failure slot
pub fn substrate_signature(step: &str, mismatch: &SubstrateMismatch) -> String {
    let mut invalid = mismatch.invalid.clone();
    invalid.sort();
    let mut fields = BTreeMap::new();
    fields.insert("namespace", json!(SUBSTRATE_NAMESPACE));
    fields.insert("step", json!(step));
    fields.insert("base_item", json!(mismatch.base_item));
    fields.insert("expected", json!(mismatch.expected));
    fields.insert("invalid", json!(invalid));
    digest(&fields)
}
