// SPDX-License-Identifier: Apache-2.0
//! Immutable snapshot model and canonical hashing (§3, INV-SNAP).
//!
//! Snapshots are append-only: every mutating operation in this crate
//! returns a new `Snapshot` rather than mutating one in place. `meta.version`
//! strictly increases along any chain; `meta.timestamp` and `meta.randomSeed`
//! are set exactly once per job by the host (never by the evaluator).

use std::collections::BTreeMap;

use crate::error::ErrorValue;
use crate::value::{Object, Value};
use crate::Hash;

/// `system.status` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotStatus {
    /// No action is in flight.
    Idle,
    /// A compute cycle is running.
    Computing,
    /// One or more requirements are outstanding.
    Pending,
    /// The last action terminated in error.
    Error,
}

impl Default for SnapshotStatus {
    fn default() -> Self {
        SnapshotStatus::Idle
    }
}

impl SnapshotStatus {
    /// The wire/display name used in `system.status`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotStatus::Idle => "idle",
            SnapshotStatus::Computing => "computing",
            SnapshotStatus::Pending => "pending",
            SnapshotStatus::Error => "error",
        }
    }

    /// Parses a status from its wire name, defaulting to `Idle` for
    /// anything unrecognized (total, matches the evaluator's no-throw
    /// contract).
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "computing" => SnapshotStatus::Computing,
            "pending" => SnapshotStatus::Pending,
            "error" => SnapshotStatus::Error,
            _ => SnapshotStatus::Idle,
        }
    }
}

/// `system.*`: `{status, lastError, errors[], pendingRequirements[],
/// currentAction}`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SystemState {
    /// Current status.
    pub status: SnapshotStatus,
    /// The most recent error, if any.
    pub last_error: Option<ErrorValue>,
    /// All errors accumulated this action's lifetime.
    pub errors: Vec<ErrorValue>,
    /// Ids of requirements still awaiting fulfillment.
    pub pending_requirements: Vec<Hash>,
    /// The action currently executing, if any.
    pub current_action: Option<String>,
}

impl SystemState {
    /// Renders `system.*` as a `Value` object, addressable by the path
    /// module so `patch{op, path: "system.…"}` nodes can apply against it
    /// uniformly with `data.*`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut obj = Object::new();
        obj.insert("status".to_owned(), Value::Str(self.status.as_str().to_owned()));
        obj.insert(
            "lastError".to_owned(),
            self.last_error.as_ref().map_or(Value::Null, ErrorValue::to_value),
        );
        obj.insert(
            "errors".to_owned(),
            Value::Array(self.errors.iter().map(ErrorValue::to_value).collect()),
        );
        obj.insert(
            "pendingRequirements".to_owned(),
            Value::Array(
                self.pending_requirements
                    .iter()
                    .map(|h| Value::Str(crate::hash_hex(h)))
                    .collect(),
            ),
        );
        obj.insert(
            "currentAction".to_owned(),
            self.current_action.clone().map_or(Value::Null, Value::Str),
        );
        Value::Object(obj)
    }

    /// Reconstructs `system.*` from its `Value` rendering. Total: absent
    /// or malformed fields fall back to defaults.
    #[must_use]
    pub fn from_value(v: &Value) -> Self {
        let Some(obj) = v.as_object() else {
            return SystemState::default();
        };
        let status = obj
            .get("status")
            .map(Value::to_string_value)
            .map_or(SnapshotStatus::Idle, |s| SnapshotStatus::from_str_lossy(&s));
        let last_error = obj
            .get("lastError")
            .filter(|v| !v.is_null())
            .map(ErrorValue::from_value);
        let errors = obj
            .get("errors")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(ErrorValue::from_value).collect())
            .unwrap_or_default();
        let pending_requirements = obj
            .get("pendingRequirements")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| parse_hash_hex(&v.to_string_value()))
                    .collect()
            })
            .unwrap_or_default();
        let current_action = obj
            .get("currentAction")
            .filter(|v| !v.is_null())
            .map(Value::to_string_value);
        SystemState {
            status,
            last_error,
            errors,
            pending_requirements,
            current_action,
        }
    }
}

fn parse_hash_hex(s: &str) -> Option<Hash> {
    let bytes = hex::decode(s).ok()?;
    bytes.try_into().ok()
}

/// `meta`: `{version, timestamp, randomSeed, schemaHash}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Meta {
    /// Strictly increases along any parent→child chain (INV-SNAP).
    pub version: u64,
    /// Set exactly once per job by the host; never read or written by the
    /// pure evaluator.
    pub timestamp: i64,
    /// Deterministically derived from the intent id by the host.
    pub random_seed: String,
    /// Content hash of the schema this snapshot was computed against.
    pub schema_hash: Hash,
}

/// The immutable record the evaluator transforms.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Domain payload. Top-level keys prefixed with `$` are platform
    /// namespaces, reserved for engine use and excluded from
    /// `snapshotHash`.
    pub data: Object,
    /// `"computed.<name>"` → last-materialized derived value.
    pub computed: BTreeMap<String, Value>,
    /// Per-intent input payload plus the reserved `$app` slot.
    pub input: Object,
    /// Engine/job status.
    pub system: SystemState,
    /// Versioning and provenance.
    pub meta: Meta,
}

impl Snapshot {
    /// Builds the initial (version-0) snapshot for a fresh world.
    #[must_use]
    pub fn genesis(data: Object, schema_hash: Hash, timestamp: i64, random_seed: impl Into<String>) -> Self {
        Self {
            data,
            computed: BTreeMap::new(),
            input: Object::new(),
            system: SystemState::default(),
            meta: Meta {
                version: 0,
                timestamp,
                random_seed: random_seed.into(),
                schema_hash,
            },
        }
    }

    /// Produces a child snapshot with `meta.version` incremented and a
    /// fresh `timestamp`/`random_seed` stamped by the caller (the host).
    /// Domain/system content is otherwise inherited unchanged; callers
    /// apply patches afterwards.
    #[must_use]
    pub fn next(&self, timestamp: i64, random_seed: impl Into<String>) -> Self {
        Self {
            data: self.data.clone(),
            computed: self.computed.clone(),
            input: self.input.clone(),
            system: self.system.clone(),
            meta: Meta {
                version: self.meta.version + 1,
                timestamp,
                random_seed: random_seed.into(),
                schema_hash: self.meta.schema_hash,
            },
        }
    }

    /// The canonical form of `data`: all top-level `$`-prefixed keys
    /// removed. `BTreeMap` already keeps the remaining keys in
    /// lexicographic order.
    #[must_use]
    pub fn canonical_data(&self) -> Object {
        self.data
            .iter()
            .filter(|(k, _)| !k.starts_with('$'))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// `snapshotHash = BLAKE3(JCS(canonicalSnapshot))`, domain-separated so
    /// it never collides with requirement ids or world ids computed over
    /// similar-shaped input. Invariant under edits to any `data.$*`
    /// namespace (§8).
    #[must_use]
    pub fn snapshot_hash(&self) -> Hash {
        let canonical = Value::Object(self.canonical_data());
        let bytes = crate::jcs::canonicalize_bytes(&canonical);
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"intent-core:snapshot:v1");
        hasher.update(&bytes);
        *hasher.finalize().as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_with(pairs: Vec<(&str, Value)>) -> Object {
        pairs.into_iter().map(|(k, v)| (k.to_owned(), v)).collect()
    }

    #[test]
    fn next_strictly_increases_version() {
        let s0 = Snapshot::genesis(Object::new(), [0u8; 32], 0, "seed");
        let s1 = s0.next(1, "seed2");
        assert!(s1.meta.version > s0.meta.version);
    }

    #[test]
    fn hash_is_invariant_under_platform_namespace_edits() {
        let base = data_with(vec![
            ("count", Value::Num(0.0)),
            ("$host", data_with(vec![("v", Value::Num(1.0))]).into()),
        ]);
        let edited = data_with(vec![
            ("count", Value::Num(0.0)),
            (
                "$host",
                data_with(vec![("v", Value::Num(2.0)), ("extra", Value::Bool(true))]).into(),
            ),
        ]);
        let s_base = Snapshot::genesis(base, [0u8; 32], 0, "seed");
        let s_edited = Snapshot::genesis(edited, [0u8; 32], 0, "seed");
        assert_eq!(s_base.snapshot_hash(), s_edited.snapshot_hash());
    }

    #[test]
    fn hash_changes_on_domain_data_edit() {
        let a = Snapshot::genesis(data_with(vec![("count", Value::Num(0.0))]), [0u8; 32], 0, "seed");
        let b = Snapshot::genesis(data_with(vec![("count", Value::Num(1.0))]), [0u8; 32], 0, "seed");
        assert_ne!(a.snapshot_hash(), b.snapshot_hash());
    }

    #[test]
    fn hash_is_independent_of_meta_fields() {
        // `timestamp`/`randomSeed` never appear in `canonical_data`, so
        // two snapshots differing only in those fields must hash equal.
        let a = Snapshot::genesis(data_with(vec![("count", Value::Num(0.0))]), [0u8; 32], 100, "seed-a");
        let b = Snapshot::genesis(data_with(vec![("count", Value::Num(0.0))]), [0u8; 32], 999, "seed-b");
        assert_eq!(a.snapshot_hash(), b.snapshot_hash());
    }

    /// Golden vector: a fixed snapshot's canonical JSON pre-image is
    /// pinned exactly, guarding the encoding `snapshot_hash` feeds into
    /// BLAKE3 against accidental drift (key order, number rendering,
    /// `$`-namespace stripping).
    #[test]
    fn golden_vector_canonical_preimage() {
        let data = data_with(vec![
            ("count", Value::Num(1.0)),
            ("$host", data_with(vec![("v", Value::Num(1.0))]).into()),
        ]);
        let snapshot = Snapshot::genesis(data, [0u8; 32], 0, "seed");
        let canonical = Value::Object(snapshot.canonical_data());
        let bytes = crate::jcs::canonicalize_bytes(&canonical);
        assert_eq!(bytes, br#"{"count":1}"#);
    }
}

#[cfg(test)]
mod snapshot_hash_properties {
    //! Property tests for `snapshot_hash`'s determinism: grounds the
    //! "content-addressed" half of INV-SNAP the way a golden-vector test
    //! alone cannot, since it ranges over arbitrary `data` shapes rather
    //! than one fixed example.
    use proptest::prelude::*;

    use super::*;

    proptest! {
        #[test]
        fn same_canonical_data_always_hashes_equal(
            count in any::<f64>().prop_filter("finite", |n| n.is_finite()),
            timestamp_a in any::<i64>(),
            timestamp_b in any::<i64>(),
        ) {
            let data = || {
                let mut o = Object::new();
                o.insert("count".to_owned(), Value::Num(count));
                o
            };
            let a = Snapshot::genesis(data(), [0u8; 32], timestamp_a, "seed-a");
            let b = Snapshot::genesis(data(), [0u8; 32], timestamp_b, "seed-b");
            prop_assert_eq!(a.snapshot_hash(), b.snapshot_hash());
        }

        #[test]
        fn differing_canonical_data_hashes_differ(
            count_a in any::<f64>().prop_filter("finite", |n| n.is_finite()),
            count_b in any::<f64>().prop_filter("finite and distinct", |n| n.is_finite()),
        ) {
            prop_assume!(count_a != count_b);
            let mut a_data = Object::new();
            a_data.insert("count".to_owned(), Value::Num(count_a));
            let mut b_data = Object::new();
            b_data.insert("count".to_owned(), Value::Num(count_b));
            let a = Snapshot::genesis(a_data, [0u8; 32], 0, "seed");
            let b = Snapshot::genesis(b_data, [0u8; 32], 0, "seed");
            prop_assert_ne!(a.snapshot_hash(), b.snapshot_hash());
        }
    }
}
