// SPDX-License-Identifier: Apache-2.0
//! The caller-submitted command that drives a compute cycle (§3 GLOSSARY).
//!
//! An intent names an action in the schema plus the input payload for that
//! action. `intent_id` is the idempotency key: re-entrant dispatch of two
//! intents sharing the same id against the same base snapshot must yield
//! identical requirement ids and, ultimately, identical snapshot hashes
//! (§8 "Re-entry idempotency").

use crate::value::Object;

/// A caller-submitted command `{type, input, intentId}` naming an action in
/// the schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    /// The action name this intent invokes (the spec's `type`).
    pub action: String,
    /// The per-intent input payload, addressable as `input.*` by the
    /// expression evaluator.
    pub input: Object,
    /// Idempotency key. Stable across re-entry of the same logical
    /// operation (e.g. a retried `ContinueCompute`).
    pub intent_id: String,
}

impl Intent {
    /// Builds an intent.
    #[must_use]
    pub fn new(action: impl Into<String>, input: Object, intent_id: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            input,
            intent_id: intent_id.into(),
        }
    }
}
