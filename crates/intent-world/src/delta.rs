// SPDX-License-Identifier: Apache-2.0
//! Delta generation between two canonical snapshots (§4.4).
//!
//! A [`WorldDelta`] records the structural edit between a world and its
//! parent: `set` for additions/changes, `unset` for removals, sorted by
//! path so repeated generation over identical input is byte-identical.
//! `$`-prefixed top-level keys are platform namespaces and are never
//! diffed, even when they changed.

use intent_core::value::{Object, Value};
use intent_core::{Hash, Patch};

/// The edge between two worlds: `fromWorld → toWorld` plus the patches that
/// reconstruct `toWorld`'s canonical data from `fromWorld`'s.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldDelta {
    /// The parent world.
    pub from_world: Hash,
    /// The world this delta produces.
    pub to_world: Hash,
    /// Structural edits, sorted by path.
    pub patches: Vec<Patch>,
    /// When this delta was recorded.
    pub created_at: i64,
}

/// Diffs `base`'s canonical data against `terminal`'s, returning a
/// lexicographically-sorted, deterministic patch list. Platform namespaces
/// (`$`-prefixed top-level keys) are skipped on both sides.
#[must_use]
pub fn generate_delta(base: &Object, terminal: &Object) -> Vec<Patch> {
    let mut patches = Vec::new();
    diff_into(&mut patches, "data", base, terminal);
    patches.sort_by(|a, b| a.path.cmp(&b.path));
    patches
}

fn diff_into(patches: &mut Vec<Patch>, prefix: &str, base: &Object, terminal: &Object) {
    for (key, value) in terminal {
        if key.starts_with('$') {
            continue;
        }
        let path = format!("{prefix}.{key}");
        match base.get(key) {
            None => patches.push(Patch::set(path, value.clone())),
            Some(prev) if prev != value => match (prev, value) {
                (Value::Object(prev_obj), Value::Object(term_obj)) => {
                    diff_into(patches, &path, prev_obj, term_obj);
                }
                _ => patches.push(Patch::set(path, value.clone())),
            },
            _ => {}
        }
    }
    for key in base.keys() {
        if key.starts_with('$') || terminal.contains_key(key) {
            continue;
        }
        patches.push(Patch::unset(format!("{prefix}.{key}")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(pairs: Vec<(&str, Value)>) -> Object {
        pairs.into_iter().map(|(k, v)| (k.to_owned(), v)).collect()
    }

    #[test]
    fn strips_platform_namespaces() {
        let base = obj(vec![
            ("count", Value::Num(0.0)),
            ("$host", Value::Object(obj(vec![("v", Value::Num(1.0))]))),
        ]);
        let terminal = obj(vec![
            ("count", Value::Num(1.0)),
            (
                "$host",
                Value::Object(obj(vec![("v", Value::Num(2.0)), ("extra", Value::Bool(true))])),
            ),
        ]);
        let patches = generate_delta(&base, &terminal);
        assert_eq!(patches, vec![Patch::set("data.count", Value::Num(1.0))]);
    }

    #[test]
    fn removed_keys_emit_unset() {
        let base = obj(vec![("count", Value::Num(1.0)), ("gone", Value::Bool(true))]);
        let terminal = obj(vec![("count", Value::Num(1.0))]);
        let patches = generate_delta(&base, &terminal);
        assert_eq!(patches, vec![Patch::unset("data.gone")]);
    }

    #[test]
    fn output_is_sorted_and_deterministic() {
        let base = obj(vec![]);
        let terminal = obj(vec![("zeta", Value::Num(1.0)), ("alpha", Value::Num(2.0))]);
        let first = generate_delta(&base, &terminal);
        let second = generate_delta(&base, &terminal);
        assert_eq!(first, second);
        let paths: Vec<&str> = first.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(paths, vec!["data.alpha", "data.zeta"]);
    }

    #[test]
    fn nested_object_changes_diff_recursively() {
        let base = obj(vec![("profile", Value::Object(obj(vec![("name", Value::from("a"))])))]);
        let terminal = obj(vec![("profile", Value::Object(obj(vec![("name", Value::from("b"))])))]);
        let patches = generate_delta(&base, &terminal);
        assert_eq!(patches, vec![Patch::set("data.profile.name", Value::from("b"))]);
    }
}
