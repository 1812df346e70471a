// SPDX-License-Identifier: Apache-2.0
//! Dependency-free evaluation context plumbing.
//!
//! [`EvalClock`] is the only carrier of non-determinism the pure core ever
//! sees: the host captures `now` once per job and derives `randomSeed`
//! deterministically from the intent id, then passes the frozen value
//! through every call. Nothing in this module reads a real clock or RNG —
//! that is the host's job (`intent-host`), not this crate's.

use std::collections::BTreeMap;

use crate::schema::DomainSchema;
use crate::snapshot::Snapshot;
use crate::value::Value;

/// Per-job frozen `{now, randomSeed}` bundle (CTX-1…5). A single job must
/// see a single `EvalClock`; consecutive jobs for the same intent may see
/// different ones.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalClock {
    /// Milliseconds since the Unix epoch, captured once by the host at job
    /// start.
    pub now: i64,
    /// Deterministically derived from the intent id; the evaluator treats
    /// it as an opaque string, never reseeding or mutating it.
    pub random_seed: String,
}

impl EvalClock {
    /// Builds a frozen clock value.
    #[must_use]
    pub fn new(now: i64, random_seed: impl Into<String>) -> Self {
        Self {
            now,
            random_seed: random_seed.into(),
        }
    }
}

/// The context threaded through every `evaluate(expr, ctx)` call (§4.1).
///
/// `get(path)` consults, in order: collection variables (`$item`, `$index`,
/// `$array`), `input.*`, `meta.*`, `computed.<name>`, `system.*`, then
/// `data.*`. Combinators like `filter`/`map` construct a [`EvalContext::with_binding`]
/// child that shadows the collection variables for the duration of the
/// predicate.
pub struct EvalContext<'a> {
    /// The snapshot being read (and, during flow evaluation, the one
    /// patches accumulate against).
    pub snapshot: &'a Snapshot,
    /// The domain schema, needed for patch validation and `call`
    /// resolution.
    pub schema: &'a DomainSchema,
    /// The frozen per-job clock.
    pub clock: &'a EvalClock,
    /// `$item`/`$index`/`$array` bindings introduced by the innermost
    /// enclosing collection combinator, if any.
    bindings: BTreeMap<String, Value>,
}

impl<'a> EvalContext<'a> {
    /// Builds a root context with no collection-variable bindings.
    #[must_use]
    pub fn new(snapshot: &'a Snapshot, schema: &'a DomainSchema, clock: &'a EvalClock) -> Self {
        Self {
            snapshot,
            schema,
            clock,
            bindings: BTreeMap::new(),
        }
    }

    /// Returns a child context with `$item`/`$index`/`$array` bound, for
    /// the duration of evaluating a collection combinator's predicate.
    #[must_use]
    pub fn with_item_binding(&self, item: Value, index: usize, array: Value) -> EvalContext<'_> {
        let mut bindings = BTreeMap::new();
        bindings.insert("$item".to_owned(), item);
        #[allow(clippy::cast_precision_loss)]
        bindings.insert("$index".to_owned(), Value::Num(index as f64));
        bindings.insert("$array".to_owned(), array);
        EvalContext {
            snapshot: self.snapshot,
            schema: self.schema,
            clock: self.clock,
            bindings,
        }
    }

    /// Looks up a bound collection variable (`$item`, `$index`, `$array`).
    #[must_use]
    pub fn binding(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Object;
    use std::collections::BTreeMap as Map;

    fn empty_schema() -> DomainSchema {
        DomainSchema {
            id: "t".to_owned(),
            version: 1,
            hash: [0u8; 32],
            state_fields: Map::new(),
            computed_fields: Map::new(),
            actions: Map::new(),
        }
    }

    #[test]
    fn item_binding_is_visible_only_in_child_context() {
        let snapshot = Snapshot::genesis(Object::new(), [0u8; 32], 0, "seed");
        let schema = empty_schema();
        let clock = EvalClock::new(0, "seed");
        let root = EvalContext::new(&snapshot, &schema, &clock);
        assert!(root.binding("$item").is_none());
        let child = root.with_item_binding(Value::Num(1.0), 0, Value::Array(vec![]));
        assert_eq!(child.binding("$item"), Some(&Value::Num(1.0)));
    }
}
