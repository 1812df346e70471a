// SPDX-License-Identifier: Apache-2.0
//! Memory context freezer (§4 ambient stack, "records memory-recall results
//! into a snapshot slot for replay").
//!
//! A host fronting an agent typically recalls context from an external
//! memory store before submitting an intent. That recall is itself a source
//! of non-determinism the pure core must never see directly: the host
//! freezes the recalled results into the intent's `input.$app.memory` slot
//! once, before submission, so replaying the same intent later replays the
//! same recalled context rather than re-querying a live store.

use intent_core::value::{Object, Value};

/// One memory-recall result keyed for later lookup under `input.$app.memory`.
#[derive(Debug, Clone)]
pub struct MemoryRecall {
    /// The slot name the recalled value is frozen under.
    pub key: String,
    /// The recalled value itself.
    pub value: Value,
}

impl MemoryRecall {
    /// Builds a recall entry.
    #[must_use]
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self { key: key.into(), value }
    }
}

/// Freezes `recalls` into `input`'s `$app.memory` slot, merging with
/// whatever is already there. Later recalls with the same key overwrite
/// earlier ones, last-write-wins within one freeze call.
pub fn freeze(input: &mut Object, recalls: &[MemoryRecall]) {
    if recalls.is_empty() {
        return;
    }
    let app = input.entry("$app".to_owned()).or_insert_with(Value::empty_object);
    if !matches!(app, Value::Object(_)) {
        *app = Value::empty_object();
    }
    let Some(app_obj) = app.as_object_mut() else { return };
    let memory = app_obj.entry("memory".to_owned()).or_insert_with(Value::empty_object);
    if !matches!(memory, Value::Object(_)) {
        *memory = Value::empty_object();
    }
    let Some(memory_obj) = memory.as_object_mut() else { return };
    for recall in recalls {
        memory_obj.insert(recall.key.clone(), recall.value.clone());
    }
}

/// Reads back a previously frozen recall by key, if present.
#[must_use]
pub fn recalled(input: &Object, key: &str) -> Option<&Value> {
    input.get("$app")?.as_object()?.get("memory")?.as_object()?.get(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freeze_then_recall_round_trips() {
        let mut input = Object::new();
        freeze(&mut input, &[MemoryRecall::new("last_seen", Value::Str("task-7".to_owned()))]);
        assert_eq!(recalled(&input, "last_seen"), Some(&Value::Str("task-7".to_owned())));
    }

    #[test]
    fn later_freeze_overwrites_same_key() {
        let mut input = Object::new();
        freeze(&mut input, &[MemoryRecall::new("k", Value::Num(1.0))]);
        freeze(&mut input, &[MemoryRecall::new("k", Value::Num(2.0))]);
        assert_eq!(recalled(&input, "k"), Some(&Value::Num(2.0)));
    }

    #[test]
    fn freeze_preserves_other_app_slot_keys() {
        let mut input = Object::new();
        let mut app = Object::new();
        app.insert("replaySeed".to_owned(), Value::Str("seed-1".to_owned()));
        input.insert("$app".to_owned(), Value::Object(app));
        freeze(&mut input, &[MemoryRecall::new("k", Value::Bool(true))]);
        let app_obj = input.get("$app").unwrap().as_object().unwrap();
        assert_eq!(app_obj.get("replaySeed"), Some(&Value::Str("seed-1".to_owned())));
        assert_eq!(recalled(&input, "k"), Some(&Value::Bool(true)));
    }

    #[test]
    fn empty_recalls_is_a_no_op() {
        let mut input = Object::new();
        freeze(&mut input, &[]);
        assert!(input.is_empty());
    }
}
