// SPDX-License-Identifier: Apache-2.0
//! Dotted-path get/set/unset/merge over [`Value`] trees.
//!
//! A path is a `.`-separated sequence of segments; each segment is either
//! an object key or an object key followed by one or more `[index]`
//! array subscripts (e.g. `data.tasks[0].deletedAt`). Paths always address
//! `data.*` or `system.*` per the patch model in `spec.md` §3, but the
//! walker itself is root-agnostic — callers pass whichever [`Value`] they
//! want to address.

use crate::value::{Object, Value};

/// A single parsed path segment: a key, plus zero or more array indices
/// applied to the value found at that key.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    key: String,
    indices: Vec<usize>,
}

fn parse_path(path: &str) -> Vec<Segment> {
    path.split('.')
        .filter(|s| !s.is_empty())
        .map(parse_segment)
        .collect()
}

fn parse_segment(raw: &str) -> Segment {
    // `[` is ASCII and cannot occur as a continuation byte of a multi-byte
    // UTF-8 key, so slicing at its byte offset never splits a char.
    let key_end = raw.find('[').unwrap_or(raw.len());
    let key = raw[..key_end].to_owned();

    let mut indices = Vec::new();
    let bytes = raw.as_bytes();
    let mut i = key_end;
    while i < bytes.len() {
        if bytes[i] == b'[' {
            let start = i + 1;
            let mut j = start;
            while j < bytes.len() && bytes[j] != b']' {
                j += 1;
            }
            if let Ok(idx) = raw[start..j].parse::<usize>() {
                indices.push(idx);
            }
            i = j + 1;
        } else {
            i += 1;
        }
    }
    Segment { key, indices }
}

/// Reads the value at `path`, or `None` if any segment is missing.
#[must_use]
pub fn get_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let segments = parse_path(path);
    let mut current = root;
    for seg in &segments {
        current = descend(current, seg)?;
    }
    Some(current)
}

fn descend<'a>(current: &'a Value, seg: &Segment) -> Option<&'a Value> {
    let mut v = match current {
        Value::Object(o) => o.get(&seg.key)?,
        _ => return None,
    };
    for idx in &seg.indices {
        v = match v {
            Value::Array(items) => items.get(*idx)?,
            _ => return None,
        };
    }
    Some(v)
}

/// Error produced by mutating path operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// A non-terminal segment addressed a value that is not an object or
    /// array, so the walk could not continue.
    #[error("path segment is not traversable: {0}")]
    NotTraversable(String),
    /// `merge` was applied to a non-object value.
    #[error("merge requires an object value at {0}")]
    MergeRequiresObject(String),
    /// The path had no segments.
    #[error("empty path")]
    EmptyPath,
}

/// Sets `value` at `path`, creating intermediate objects as needed.
/// Replaces whatever was previously at `path` (`set` semantics).
pub fn set_path(root: &mut Value, path: &str, value: Value) -> Result<(), PathError> {
    let segments = parse_path(path);
    if segments.is_empty() {
        return Err(PathError::EmptyPath);
    }
    set_recursive(root, &segments, value)
}

#[allow(clippy::expect_used)]
fn set_recursive(current: &mut Value, segments: &[Segment], value: Value) -> Result<(), PathError> {
    let (head, rest) = segments.split_first().expect("non-empty by construction");
    if !matches!(current, Value::Object(_)) {
        *current = Value::empty_object();
    }
    let Value::Object(obj) = current else {
        unreachable!("coerced to object above");
    };
    if head.indices.is_empty() {
        if rest.is_empty() {
            obj.insert(head.key.clone(), value);
            return Ok(());
        }
        let entry = obj.entry(head.key.clone()).or_insert_with(Value::empty_object);
        return set_recursive(entry, rest, value);
    }
    let entry = obj.entry(head.key.clone()).or_insert_with(|| Value::Array(Vec::new()));
    set_indexed(entry, &head.indices, rest, value)
}

#[allow(clippy::expect_used)]
fn set_indexed(
    current: &mut Value,
    indices: &[usize],
    rest: &[Segment],
    value: Value,
) -> Result<(), PathError> {
    let (idx, remaining_indices) = indices.split_first().expect("non-empty by construction");
    if !matches!(current, Value::Array(_)) {
        *current = Value::Array(Vec::new());
    }
    let Value::Array(arr) = current else {
        unreachable!("coerced to array above");
    };
    while arr.len() <= *idx {
        arr.push(Value::Null);
    }
    if remaining_indices.is_empty() {
        if rest.is_empty() {
            arr[*idx] = value;
            return Ok(());
        }
        return set_recursive(&mut arr[*idx], rest, value);
    }
    set_indexed(&mut arr[*idx], remaining_indices, rest, value)
}

/// Removes the value at `path`. A missing path is a no-op.
pub fn unset_path(root: &mut Value, path: &str) -> Result<(), PathError> {
    let segments = parse_path(path);
    if segments.is_empty() {
        return Err(PathError::EmptyPath);
    }
    unset_recursive(root, &segments)
}

#[allow(clippy::expect_used)]
fn unset_recursive(current: &mut Value, segments: &[Segment]) -> Result<(), PathError> {
    let (head, rest) = segments.split_first().expect("non-empty by construction");
    let Value::Object(obj) = current else {
        return Ok(());
    };
    if head.indices.is_empty() && rest.is_empty() {
        obj.remove(&head.key);
        return Ok(());
    }
    let Some(child) = obj.get_mut(&head.key) else {
        return Ok(());
    };
    if head.indices.is_empty() {
        return unset_recursive(child, rest);
    }
    unset_indexed(child, &head.indices, rest)
}

#[allow(clippy::expect_used)]
fn unset_indexed(current: &mut Value, indices: &[usize], rest: &[Segment]) -> Result<(), PathError> {
    let (idx, remaining) = indices.split_first().expect("non-empty by construction");
    let Value::Array(arr) = current else {
        return Ok(());
    };
    let Some(slot) = arr.get_mut(*idx) else {
        return Ok(());
    };
    if remaining.is_empty() && rest.is_empty() {
        arr.remove(*idx);
        return Ok(());
    }
    if remaining.is_empty() {
        return unset_recursive(slot, rest);
    }
    unset_indexed(slot, remaining, rest)
}

/// Shallow-merges `value` (which must be an object) into the object found
/// at `path`, creating it if absent. Fails with [`PathError::MergeRequiresObject`]
/// if either side is not an object.
pub fn merge_path(root: &mut Value, path: &str, value: Value) -> Result<(), PathError> {
    let Value::Object(incoming) = value else {
        return Err(PathError::MergeRequiresObject(path.to_owned()));
    };
    let segments = parse_path(path);
    if segments.is_empty() {
        return Err(PathError::EmptyPath);
    }
    merge_recursive(root, &segments, incoming, path)
}

#[allow(clippy::expect_used)]
fn merge_recursive(
    current: &mut Value,
    segments: &[Segment],
    incoming: Object,
    full_path: &str,
) -> Result<(), PathError> {
    let (head, rest) = segments.split_first().expect("non-empty by construction");
    if !matches!(current, Value::Object(_)) {
        *current = Value::empty_object();
    }
    let Value::Object(obj) = current else {
        unreachable!("coerced to object above");
    };
    if head.indices.is_empty() && rest.is_empty() {
        let slot = obj.entry(head.key.clone()).or_insert_with(Value::empty_object);
        let Value::Object(target) = slot else {
            return Err(PathError::MergeRequiresObject(full_path.to_owned()));
        };
        for (k, v) in incoming {
            target.insert(k, v);
        }
        return Ok(());
    }
    let entry = obj.entry(head.key.clone()).or_insert_with(Value::empty_object);
    if head.indices.is_empty() {
        merge_recursive(entry, rest, incoming, full_path)
    } else {
        Err(PathError::NotTraversable(full_path.to_owned()))
    }
}

/// `true` if the path's first (root) segment begins with `$` — platform
/// namespaces are reserved and excluded from canonical hashing.
#[must_use]
pub fn is_platform_namespace(path: &str) -> bool {
    path.split('.')
        .next()
        .is_some_and(|first| first.starts_with('$'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(pairs: Vec<(&str, Value)>) -> Value {
        let mut o = Object::new();
        for (k, v) in pairs {
            o.insert(k.to_owned(), v);
        }
        Value::Object(o)
    }

    #[test]
    fn get_set_roundtrip() {
        let mut root = obj(vec![]);
        set_path(&mut root, "data.count", Value::Num(1.0)).unwrap();
        assert_eq!(get_path(&root, "data.count"), Some(&Value::Num(1.0)));
    }

    #[test]
    fn set_creates_intermediate_objects() {
        let mut root = obj(vec![]);
        set_path(&mut root, "data.profile.name", Value::from("ok")).unwrap();
        assert_eq!(
            get_path(&root, "data.profile.name"),
            Some(&Value::from("ok"))
        );
    }

    #[test]
    fn array_index_get_set() {
        let mut root = obj(vec![("data", obj(vec![("tasks", Value::Array(vec![]))]))]);
        set_path(&mut root, "data.tasks[0].done", Value::Bool(true)).unwrap();
        assert_eq!(
            get_path(&root, "data.tasks[0].done"),
            Some(&Value::Bool(true))
        );
    }

    #[test]
    fn unset_removes_key() {
        let mut root = obj(vec![("data", obj(vec![("x", Value::Num(1.0))]))]);
        unset_path(&mut root, "data.x").unwrap();
        assert_eq!(get_path(&root, "data.x"), None);
    }

    #[test]
    fn unset_missing_path_is_noop() {
        let mut root = obj(vec![]);
        assert!(unset_path(&mut root, "data.missing.deep").is_ok());
    }

    #[test]
    fn merge_shallow_merges_object() {
        let mut root = obj(vec![(
            "data",
            obj(vec![("response", obj(vec![("ok", Value::Bool(false))]))]),
        )]);
        merge_path(
            &mut root,
            "data.response",
            obj(vec![("extra", Value::Num(1.0))]),
        )
        .unwrap();
        assert_eq!(
            get_path(&root, "data.response.ok"),
            Some(&Value::Bool(false))
        );
        assert_eq!(
            get_path(&root, "data.response.extra"),
            Some(&Value::Num(1.0))
        );
    }

    #[test]
    fn merge_rejects_non_object_value() {
        let mut root = obj(vec![]);
        let err = merge_path(&mut root, "data.x", Value::Num(1.0)).unwrap_err();
        assert_eq!(err, PathError::MergeRequiresObject("data.x".to_owned()));
    }

    #[test]
    fn platform_namespace_detection() {
        assert!(is_platform_namespace("$host.v"));
        assert!(!is_platform_namespace("data.count"));
    }

    #[test]
    fn multi_byte_keys_round_trip() {
        let mut root = obj(vec![]);
        set_path(&mut root, "data.café", Value::from("ok")).unwrap();
        assert_eq!(get_path(&root, "data.café"), Some(&Value::from("ok")));
    }
}
