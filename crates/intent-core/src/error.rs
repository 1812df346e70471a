// SPDX-License-Identifier: Apache-2.0
//! Error taxonomy (§7) and the value wrapper carried on every evaluator
//! failure path.
//!
//! Every evaluator failure is a *value*, never a panic: [`ErrorValue`] is
//! what `Result<Value, ErrorValue>` and `FlowState::error` carry, and
//! [`ErrorCode`] enumerates the closed set of codes the spec names.

use std::fmt;

use crate::value::{Object, Value};

/// The closed taxonomy of engine error codes (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ErrorCode {
    /// A patch value does not conform to the field spec at its path.
    #[error("TYPE_MISMATCH")]
    TypeMismatch,
    /// A patch target is not declared in the schema.
    #[error("PATH_NOT_FOUND")]
    PathNotFound,
    /// Raised by a `fail` flow node.
    #[error("VALIDATION_ERROR")]
    ValidationError,
    /// `call{flowName}` referenced an action that does not exist.
    #[error("UNKNOWN_FLOW")]
    UnknownFlow,
    /// An AST node carried an expression/flow kind the evaluator does not
    /// recognize. Indicates a programmer error, not a domain error.
    #[error("INTERNAL_ERROR")]
    InternalError,
    /// The compute→effect loop exceeded its configured iteration bound.
    #[error("MAX_ITERATIONS_EXCEEDED")]
    MaxIterationsExceeded,
    /// A proposal FSM transition was attempted that the table forbids.
    #[error("INVALID_TRANSITION")]
    InvalidTransition,
    /// An effect fulfillment arrived for a requirement that is no longer
    /// current (stale or duplicate). Dropped, not surfaced as a failure.
    #[error("STALE_FULFILLMENT")]
    StaleFulfillment,
}

impl ErrorCode {
    /// The taxonomy code's wire/display name, used for `system.errors[]`
    /// patch round-tripping.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::TypeMismatch => "TYPE_MISMATCH",
            ErrorCode::PathNotFound => "PATH_NOT_FOUND",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::UnknownFlow => "UNKNOWN_FLOW",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::MaxIterationsExceeded => "MAX_ITERATIONS_EXCEEDED",
            ErrorCode::InvalidTransition => "INVALID_TRANSITION",
            ErrorCode::StaleFulfillment => "STALE_FULFILLMENT",
        }
    }

    /// Parses a taxonomy code from its wire name; unrecognized names fall
    /// back to `InternalError` rather than failing, keeping the round trip
    /// total.
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "TYPE_MISMATCH" => ErrorCode::TypeMismatch,
            "PATH_NOT_FOUND" => ErrorCode::PathNotFound,
            "VALIDATION_ERROR" => ErrorCode::ValidationError,
            "UNKNOWN_FLOW" => ErrorCode::UnknownFlow,
            "MAX_ITERATIONS_EXCEEDED" => ErrorCode::MaxIterationsExceeded,
            "INVALID_TRANSITION" => ErrorCode::InvalidTransition,
            "STALE_FULFILLMENT" => ErrorCode::StaleFulfillment,
            _ => ErrorCode::InternalError,
        }
    }
}

/// A user-visible failure: `{code, message, nodePath, actionName, timestamp}`
/// per §7.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorValue {
    /// The taxonomy code.
    pub code: ErrorCode,
    /// Human-readable detail.
    pub message: String,
    /// Dotted AST node path at which the error occurred, if known.
    pub node_path: Option<String>,
    /// The action in which the error occurred, if known.
    pub action_name: Option<String>,
    /// The frozen job's `now`, stamped by the host when the error is
    /// attached to a snapshot. `None` for errors raised purely inside the
    /// pure evaluator, which has no ambient clock.
    pub timestamp: Option<i64>,
}

impl ErrorValue {
    /// Builds a bare error with no node/action/timestamp context.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            node_path: None,
            action_name: None,
            timestamp: None,
        }
    }

    /// Attaches the AST node path at which this error surfaced.
    #[must_use]
    pub fn with_node_path(mut self, node_path: impl Into<String>) -> Self {
        self.node_path = Some(node_path.into());
        self
    }

    /// Attaches the enclosing action name.
    #[must_use]
    pub fn with_action_name(mut self, action_name: impl Into<String>) -> Self {
        self.action_name = Some(action_name.into());
        self
    }

    /// Stamps the frozen job's `now`. Only the host (never the pure
    /// evaluator) should call this.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Renders this error as a `Value` object, for storage under
    /// `system.lastError`/`system.errors[]`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut obj = Object::new();
        obj.insert("code".to_owned(), Value::Str(self.code.as_str().to_owned()));
        obj.insert("message".to_owned(), Value::Str(self.message.clone()));
        obj.insert(
            "nodePath".to_owned(),
            self.node_path.clone().map_or(Value::Null, Value::Str),
        );
        obj.insert(
            "actionName".to_owned(),
            self.action_name.clone().map_or(Value::Null, Value::Str),
        );
        #[allow(clippy::cast_precision_loss)]
        let timestamp = self.timestamp.map_or(Value::Null, |t| Value::Num(t as f64));
        obj.insert("timestamp".to_owned(), timestamp);
        Value::Object(obj)
    }

    /// Reconstructs an `ErrorValue` from its `Value` rendering. Total:
    /// missing or malformed fields fall back to sensible defaults rather
    /// than failing, since this only ever round-trips values this crate
    /// itself produced.
    #[must_use]
    pub fn from_value(v: &Value) -> Self {
        let Some(obj) = v.as_object() else {
            return ErrorValue::new(ErrorCode::InternalError, "malformed error value");
        };
        let code = obj
            .get("code")
            .and_then(|v| if let Value::Str(s) = v { Some(s.as_str()) } else { None })
            .map_or(ErrorCode::InternalError, ErrorCode::from_str_lossy);
        let message = obj
            .get("message")
            .map(Value::to_string_value)
            .unwrap_or_default();
        let node_path = obj.get("nodePath").filter(|v| !v.is_null()).map(Value::to_string_value);
        let action_name = obj.get("actionName").filter(|v| !v.is_null()).map(Value::to_string_value);
        #[allow(clippy::cast_possible_truncation)]
        let timestamp = obj
            .get("timestamp")
            .filter(|v| !v.is_null())
            .map(|v| v.to_number() as i64);
        ErrorValue {
            code,
            message,
            node_path,
            action_name,
            timestamp,
        }
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ErrorValue {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_chain_attaches_context() {
        let e = ErrorValue::new(ErrorCode::TypeMismatch, "expected number")
            .with_node_path("seq[0].patch")
            .with_action_name("createTask");
        assert_eq!(e.node_path.as_deref(), Some("seq[0].patch"));
        assert_eq!(e.action_name.as_deref(), Some("createTask"));
        assert!(e.timestamp.is_none());
    }

    #[test]
    fn display_includes_code_and_message() {
        let e = ErrorValue::new(ErrorCode::UnknownFlow, "no such action: foo");
        assert_eq!(e.to_string(), "UNKNOWN_FLOW: no such action: foo");
    }
}
