// SPDX-License-Identifier: Apache-2.0
//! Canonical JSON serialization (JCS) used as the hash pre-image for
//! `snapshotHash` and related content addresses.
//!
//! Object keys are emitted in lexicographic order (free, since [`Value::Object`]
//! is a `BTreeMap`); numbers are rendered with a fixed, architecture-independent
//! schedule so the same logical value always serializes to the same bytes.

use crate::value::Value;

/// Serializes `value` to its canonical JSON encoding.
///
/// This is a hash pre-image, not a general-purpose JSON writer: it exists
/// to make `SHA-256(JCS(canonicalSnapshot))`-style hashing byte-stable
/// across platforms and Rust versions, not to be human-pretty.
#[must_use]
pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

/// Serializes `value` to canonical JSON bytes, ready for hashing.
#[must_use]
pub fn canonicalize_bytes(value: &Value) -> Vec<u8> {
    canonicalize(value).into_bytes()
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Num(n) => write_number(*n, out),
        Value::Str(s) => write_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            for (i, (k, v)) in map.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(k, out);
                out.push(':');
                write_value(v, out);
            }
            out.push('}');
        }
    }
}

/// JCS numeric rendering: integral values (within safe precision) render
/// without a decimal point or exponent; non-integral values use the
/// shortest round-tripping decimal form. NaN/infinity have no JSON
/// representation and canonicalize to `0`, matching the evaluator's total
/// coercion schedule rather than producing invalid output.
fn write_number(n: f64, out: &mut String) {
    if n.is_nan() || n.is_infinite() {
        out.push('0');
        return;
    }
    if n == 0.0 {
        out.push('0');
        return;
    }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        #[allow(clippy::cast_possible_truncation)]
        let i = n as i64;
        out.push_str(&i.to_string());
    } else {
        out.push_str(&format!("{n}"));
    }
}

fn write_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Object;

    #[test]
    fn object_keys_are_lexicographically_ordered() {
        let mut o = Object::new();
        o.insert("b".to_owned(), Value::Num(1.0));
        o.insert("a".to_owned(), Value::Num(2.0));
        let json = canonicalize(&Value::Object(o));
        assert_eq!(json, r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn integral_numbers_render_without_decimal() {
        assert_eq!(canonicalize(&Value::Num(3.0)), "3");
        assert_eq!(canonicalize(&Value::Num(-7.0)), "-7");
    }

    #[test]
    fn same_value_produces_byte_identical_output() {
        let mut o = Object::new();
        o.insert("x".to_owned(), Value::Str("hi".to_owned()));
        let v = Value::Object(o);
        assert_eq!(canonicalize(&v), canonicalize(&v));
    }

    #[test]
    fn strings_escape_control_characters() {
        assert_eq!(canonicalize(&Value::Str("a\nb".to_owned())), "\"a\\nb\"");
    }

    /// Golden vector: a nested structure's canonical encoding is pinned
    /// exactly, so accidental drift in key ordering or number rendering
    /// shows up as a diff here rather than downstream in a hash mismatch.
    #[test]
    fn golden_vector_nested_structure() {
        let mut task = Object::new();
        task.insert("completed".to_owned(), Value::Bool(false));
        task.insert("deletedAt".to_owned(), Value::Null);
        task.insert("id".to_owned(), Value::Str("t1".to_owned()));

        let mut root = Object::new();
        root.insert("count".to_owned(), Value::Num(2.0));
        root.insert("tasks".to_owned(), Value::Array(vec![Value::Object(task)]));

        let json = canonicalize(&Value::Object(root));
        assert_eq!(
            json,
            r#"{"count":2,"tasks":[{"completed":false,"deletedAt":null,"id":"t1"}]}"#
        );
    }
}
