// SPDX-License-Identifier: Apache-2.0
//! The effect handler contract (§6) and pending-requirement dispatch
//! lifecycle (§4.3 step 4–5).
//!
//! Handlers MUST NOT throw — failures are expressed as patches to an error
//! path, by convention written under the domain's own `data.*` error slot.
//! The host never retries on a handler's behalf (§7): a handler that wants
//! retry semantics must encode that itself (e.g. by patching a retry
//! counter and re-raising its own effect on the next compute pass).

use std::collections::BTreeMap;

use async_trait::async_trait;
use intent_core::value::Value;
use intent_core::{ErrorValue, Patch};

use crate::clock::FrozenContext;

/// The requirement id type the host threads through dispatch/fulfillment —
/// re-exported from [`intent_core::Hash`] under a name that reads clearly
/// at the host layer.
pub type RequirementId = intent_core::Hash;

/// The frozen per-job context exposed to effect handlers: `now`,
/// `randomSeed`, and the host-injected `env`. Handlers never see a real
/// clock or RNG directly — only this frozen snapshot of one.
pub type EffectContext = FrozenContext;

/// `handler(type, params, context) → Result<Patch[], Error>` (§6).
///
/// Implementations must not panic; a failure is a patch to a domain error
/// field, not an `Err` escaping to the host (the host's own bookkeeping
/// errors, like "no handler registered", are the only `Err` case the host
/// itself produces).
#[async_trait]
pub trait EffectHandler: Send + Sync {
    /// Executes the effect and returns the patches to apply, or an error
    /// value if the handler itself could not run (distinct from a
    /// domain-level failure, which the handler should express as patches).
    async fn handle(
        &self,
        effect_type: &str,
        params: &BTreeMap<String, Value>,
        ctx: &EffectContext,
    ) -> Result<Vec<Patch>, ErrorValue>;
}

/// A handler used when no handler is registered for an effect type. Returns
/// no patches and logs a warning; the requirement is still cleared (the
/// host does not retry on a missing registration, matching §7's "the
/// engine does not retry on behalf of handlers").
pub struct UnregisteredEffectHandler;

#[async_trait]
impl EffectHandler for UnregisteredEffectHandler {
    async fn handle(
        &self,
        effect_type: &str,
        _params: &BTreeMap<String, Value>,
        _ctx: &EffectContext,
    ) -> Result<Vec<Patch>, ErrorValue> {
        tracing::warn!(effect_type, "no handler registered; requirement clears with no patches");
        Ok(Vec::new())
    }
}
