// SPDX-License-Identifier: Apache-2.0
//! Pending-effect requirements (§3) and their deterministic identifiers.
//!
//! A requirement's id is `hash(schemaHash, intentId, actionId, nodePath)` so
//! that identical flow positions re-entered within the same intent produce
//! the same id (requirement idempotency, §8).

use std::collections::BTreeMap;

use crate::value::Value;
use crate::Hash;

/// The flow position at which an `effect` node produced a requirement:
/// `{nodePath, snapshotVersion}`.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowPosition {
    /// Dotted path through the flow AST to the `effect` node.
    pub node_path: String,
    /// `meta.version` of the snapshot in effect when the requirement was
    /// created.
    pub snapshot_version: u64,
}

/// A queued pending effect produced by an `effect` flow node.
#[derive(Debug, Clone, PartialEq)]
pub struct Requirement {
    /// Deterministic id: `hash(schemaHash, intentId, actionId, nodePath)`.
    pub id: Hash,
    /// The effect type name (the handler registration key).
    pub effect_type: String,
    /// Eagerly-evaluated effect parameters.
    pub params: BTreeMap<String, Value>,
    /// The action whose flow produced this requirement.
    pub action_id: String,
    /// Where in the flow this requirement was raised.
    pub flow_position: FlowPosition,
    /// The frozen job's `now` at creation time.
    pub created_at: i64,
}

/// Computes the deterministic requirement id per §3: `hash(schemaHash,
/// intentId, actionId, nodePath)`. Domain-separated with a fixed tag so
/// requirement ids never collide with schema hashes or world ids computed
/// over similar-looking input.
#[must_use]
pub fn requirement_id(schema_hash: &Hash, intent_id: &str, action_id: &str, node_path: &str) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"intent-core:requirement:v1");
    hasher.update(schema_hash);
    hasher.update(intent_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(action_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(node_path.as_bytes());
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requirement_id_is_stable_for_fixed_inputs() {
        let schema_hash = [7u8; 32];
        let a = requirement_id(&schema_hash, "intent-1", "createTask", "seq[0]");
        let b = requirement_id(&schema_hash, "intent-1", "createTask", "seq[0]");
        assert_eq!(a, b);
    }

    #[test]
    fn requirement_id_differs_on_node_path() {
        let schema_hash = [7u8; 32];
        let a = requirement_id(&schema_hash, "intent-1", "createTask", "seq[0]");
        let b = requirement_id(&schema_hash, "intent-1", "createTask", "seq[1]");
        assert_ne!(a, b);
    }
}
