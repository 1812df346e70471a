// SPDX-License-Identifier: Apache-2.0
//! Domain schema: typed field specs, computed field declarations, actions,
//! and patch-value validation against declared field shape (§3, §4.2).

use std::collections::BTreeMap;

use crate::error::{ErrorCode, ErrorValue};
use crate::flow::FlowNode;
use crate::value::Value;
use crate::Hash;

/// The shape a `data.*` (or `system.*`) field is declared to hold.
///
/// Closed, tagged variant set mirroring [`crate::value::Value`]'s kinds plus
/// a couple of schema-only refinements (`Array` element shape, `Object`
/// member shape). `Any` accepts every value and is the default for schemas
/// that don't declare a shape for a given path.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldSpec {
    /// Accepts any value; used for undeclared or intentionally-untyped
    /// fields.
    Any,
    /// Accepts only `Value::Null`.
    Null,
    /// Accepts only `Value::Bool`.
    Bool,
    /// Accepts only `Value::Num`.
    Number,
    /// Accepts only `Value::Str`.
    String,
    /// Accepts `Value::Array` whose elements all conform to the boxed spec.
    Array(Box<FieldSpec>),
    /// Accepts `Value::Object` whose declared members conform to their
    /// specs; undeclared members are accepted (schemas are additive, not
    /// closed).
    Object(BTreeMap<String, FieldSpec>),
    /// Accepts a value that is either `Value::Null` or conforms to the
    /// boxed spec — the usual way optional fields are declared.
    Nullable(Box<FieldSpec>),
}

impl FieldSpec {
    /// `true` if `value` conforms to this spec.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldSpec::Any => true,
            FieldSpec::Null => matches!(value, Value::Null),
            FieldSpec::Bool => matches!(value, Value::Bool(_)),
            FieldSpec::Number => matches!(value, Value::Num(_)),
            FieldSpec::String => matches!(value, Value::Str(_)),
            FieldSpec::Array(elem) => match value {
                Value::Array(items) => items.iter().all(|v| elem.accepts(v)),
                _ => false,
            },
            FieldSpec::Object(members) => match value {
                Value::Object(obj) => members
                    .iter()
                    .all(|(k, spec)| obj.get(k).is_none_or(|v| spec.accepts(v))),
                _ => false,
            },
            FieldSpec::Nullable(inner) => value.is_null() || inner.accepts(value),
        }
    }
}

/// A computed field declaration: `name → {expr, deps}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedFieldSpec {
    /// The pure expression recomputed whenever a dependency changes.
    pub expr: crate::expr::ExprNode,
    /// Dotted paths this computed field reads, used by `core.explain` to
    /// report dependency chains.
    pub deps: Vec<String>,
}

/// An action: a named flow plus an optional availability guard.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSpec {
    /// The flow body evaluated when the action runs.
    pub flow: FlowNode,
    /// When present, evaluated against the current snapshot before the
    /// action is allowed to run; a falsy result makes the action
    /// unavailable. `None` means always available.
    pub available: Option<crate::expr::ExprNode>,
}

/// The declarative domain schema: entities, computed fields, and actions.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainSchema {
    /// Schema identifier (stable across versions).
    pub id: String,
    /// Monotonic schema version.
    pub version: u64,
    /// Content hash of the schema definition, used to domain-separate
    /// requirement ids and stamped into every snapshot's `meta.schemaHash`.
    pub hash: Hash,
    /// Field specs for `data.*` state, rooted at the top-level key.
    pub state_fields: BTreeMap<String, FieldSpec>,
    /// Computed field declarations, keyed by bare name (without the
    /// `computed.` prefix).
    pub computed_fields: BTreeMap<String, ComputedFieldSpec>,
    /// Named actions.
    pub actions: BTreeMap<String, ActionSpec>,
}

impl DomainSchema {
    /// Looks up the field spec governing a `data.*` or `system.*` patch
    /// path. Only the path's first segment is consulted against the
    /// schema's top-level declarations; nested shape is enforced by the
    /// nested [`FieldSpec`] variants.
    #[must_use]
    pub fn field_spec_for_path<'a>(&'a self, path: &str) -> Option<&'a FieldSpec> {
        let mut segments = path.split('.');
        let root = segments.next()?;
        if root == "system" {
            return None;
        }
        if root != "data" {
            return None;
        }
        let top_key = segments.next()?;
        self.state_fields.get(strip_index(top_key))
    }
}

fn strip_index(segment: &str) -> &str {
    segment.split('[').next().unwrap_or(segment)
}

/// Validates `value` against the schema's declared shape for `path`.
///
/// `system.*` paths are always accepted (the engine, not domain schemas,
/// owns `system` shape). Undeclared `data.*` top-level keys are rejected
/// with [`ErrorCode::PathNotFound`]; declared keys whose value doesn't
/// conform yield [`ErrorCode::TypeMismatch`].
pub fn validate_patch_value(schema: &DomainSchema, path: &str, value: &Value) -> Result<(), ErrorValue> {
    if path.starts_with("system.") || path == "system" {
        return Ok(());
    }
    if crate::path::is_platform_namespace(path) {
        return Ok(());
    }
    let Some(spec) = schema.field_spec_for_path(path) else {
        return Err(ErrorValue::new(
            ErrorCode::PathNotFound,
            format!("no field declared at path {path}"),
        )
        .with_node_path(path.to_owned()));
    };
    if spec.accepts(value) {
        Ok(())
    } else {
        Err(ErrorValue::new(
            ErrorCode::TypeMismatch,
            format!("value at {path} does not conform to its declared shape"),
        )
        .with_node_path(path.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema_with(fields: Vec<(&str, FieldSpec)>) -> DomainSchema {
        DomainSchema {
            id: "test".to_owned(),
            version: 1,
            hash: [0u8; 32],
            state_fields: fields.into_iter().map(|(k, v)| (k.to_owned(), v)).collect(),
            computed_fields: BTreeMap::new(),
            actions: BTreeMap::new(),
        }
    }

    #[test]
    fn accepts_matching_primitive() {
        let schema = schema_with(vec![("count", FieldSpec::Number)]);
        assert!(validate_patch_value(&schema, "data.count", &Value::Num(1.0)).is_ok());
    }

    #[test]
    fn rejects_type_mismatch() {
        let schema = schema_with(vec![("count", FieldSpec::Number)]);
        let err = validate_patch_value(&schema, "data.count", &Value::from("nope")).unwrap_err();
        assert_eq!(err.code, ErrorCode::TypeMismatch);
    }

    #[test]
    fn rejects_undeclared_path() {
        let schema = schema_with(vec![]);
        let err = validate_patch_value(&schema, "data.mystery", &Value::Num(1.0)).unwrap_err();
        assert_eq!(err.code, ErrorCode::PathNotFound);
    }

    #[test]
    fn platform_namespace_bypasses_validation() {
        let schema = schema_with(vec![]);
        assert!(validate_patch_value(&schema, "$host.v", &Value::Num(1.0)).is_ok());
    }

    #[test]
    fn system_paths_bypass_validation() {
        let schema = schema_with(vec![]);
        assert!(validate_patch_value(&schema, "system.status", &Value::from("idle")).is_ok());
    }

    #[test]
    fn nullable_accepts_null_or_inner() {
        let spec = FieldSpec::Nullable(Box::new(FieldSpec::String));
        assert!(spec.accepts(&Value::Null));
        assert!(spec.accepts(&Value::from("x")));
        assert!(!spec.accepts(&Value::Num(1.0)));
    }
}
