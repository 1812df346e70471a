// SPDX-License-Identifier: Apache-2.0
//! Patch model: `{op, path, value?}` (§3).

use crate::value::Value;

/// The operation a [`Patch`] applies at its `path`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum PatchOp {
    /// Replace whatever is at `path`.
    Set,
    /// Remove `path`. A missing path is a no-op.
    Unset,
    /// Shallow-merge an object value into the object at `path`.
    Merge,
}

/// A single structural edit to a snapshot's `data.*` or `system.*` tree.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Patch {
    /// The operation.
    pub op: PatchOp,
    /// Dotted path, rooted at `data` or `system`.
    pub path: String,
    /// The value to set/merge. Ignored (and normally `None`) for `unset`.
    pub value: Option<Value>,
}

impl Patch {
    /// Builds a `set` patch.
    #[must_use]
    pub fn set(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: PatchOp::Set,
            path: path.into(),
            value: Some(value),
        }
    }

    /// Builds an `unset` patch.
    #[must_use]
    pub fn unset(path: impl Into<String>) -> Self {
        Self {
            op: PatchOp::Unset,
            path: path.into(),
            value: None,
        }
    }

    /// Builds a `merge` patch.
    #[must_use]
    pub fn merge(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: PatchOp::Merge,
            path: path.into(),
            value: Some(value),
        }
    }

    /// `true` if `path`'s root segment is a reserved `$`-prefixed platform
    /// namespace. Such patches are never emitted by delta generation and
    /// never participate in `snapshotHash`.
    #[must_use]
    pub fn is_platform_namespace(&self) -> bool {
        crate::path::is_platform_namespace(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_expected_op() {
        assert_eq!(Patch::set("data.x", Value::Num(1.0)).op, PatchOp::Set);
        assert_eq!(Patch::unset("data.x").op, PatchOp::Unset);
        assert_eq!(Patch::merge("data.x", Value::empty_object()).op, PatchOp::Merge);
    }

    #[test]
    fn unset_has_no_value() {
        assert!(Patch::unset("data.x").value.is_none());
    }
}
