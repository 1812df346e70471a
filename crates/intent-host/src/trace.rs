// SPDX-License-Identifier: Apache-2.0
//! Trace events for deterministic replay (§4.3).
//!
//! Every named event family from the spec (`runner:*`, `job:*`, `core:*`,
//! `effect:*`, `requirement:clear`, `continue:enqueue`, `context:frozen`,
//! `fatal:escalate`) is a variant here. The host appends one [`TraceEvent`]
//! per occurrence to the execution's trace log; nothing is ever removed or
//! reordered, so two runs over identical input produce identical logs.

use crate::effect::RequirementId;
use crate::mailbox::ExecutionKey;

/// A single recorded host-runtime event.
#[derive(Debug, Clone)]
pub enum TraceEvent {
    /// A runner was asked to start while one was already active; the kick
    /// flag was set instead of spawning a second runner.
    RunnerKick {
        /// The execution this event belongs to.
        key: ExecutionKey,
    },
    /// A runner began draining a mailbox.
    RunnerStart {
        /// The execution this event belongs to.
        key: ExecutionKey,
    },
    /// A runner finished draining (mailbox empty, no kick pending).
    RunnerEnd {
        /// The execution this event belongs to.
        key: ExecutionKey,
    },
    /// The runner re-checked mailbox/kick state before fully releasing the
    /// flag and found more work, so it kept running (RUN-4).
    RunnerRecheck {
        /// The execution this event belongs to.
        key: ExecutionKey,
    },
    /// A job began processing.
    JobStart {
        /// The execution this event belongs to.
        key: ExecutionKey,
        /// The job kind's name.
        kind: &'static str,
    },
    /// A job finished processing.
    JobEnd {
        /// The execution this event belongs to.
        key: ExecutionKey,
        /// The job kind's name.
        kind: &'static str,
    },
    /// `core.compute` was invoked.
    CoreCompute {
        /// The execution this event belongs to.
        key: ExecutionKey,
        /// The resulting snapshot version.
        version: u64,
    },
    /// `core.apply` was invoked.
    CoreApply {
        /// The execution this event belongs to.
        key: ExecutionKey,
        /// The resulting snapshot version.
        version: u64,
    },
    /// A requirement was dispatched to its handler.
    EffectDispatch {
        /// The execution this event belongs to.
        key: ExecutionKey,
        /// The requirement id.
        requirement_id: RequirementId,
        /// The effect type name.
        effect_type: String,
    },
    /// A fulfillment arrived for a requirement that is no longer current
    /// and was dropped.
    EffectFulfillDrop {
        /// The execution this event belongs to.
        key: ExecutionKey,
        /// The requirement id.
        requirement_id: RequirementId,
    },
    /// A fulfillment's patches were applied.
    EffectFulfillApply {
        /// The execution this event belongs to.
        key: ExecutionKey,
        /// The requirement id.
        requirement_id: RequirementId,
    },
    /// A handler itself failed to run (as opposed to reporting a domain
    /// error via patches).
    EffectFulfillError {
        /// The execution this event belongs to.
        key: ExecutionKey,
        /// The requirement id.
        requirement_id: RequirementId,
    },
    /// A requirement id was cleared from `system.pendingRequirements`.
    RequirementClear {
        /// The execution this event belongs to.
        key: ExecutionKey,
        /// The requirement id.
        requirement_id: RequirementId,
    },
    /// A `ContinueCompute` job was enqueued.
    ContinueEnqueue {
        /// The execution this event belongs to.
        key: ExecutionKey,
        /// The intent being continued.
        intent_id: String,
    },
    /// A frozen context was captured for a job.
    ContextFrozen {
        /// The execution this event belongs to.
        key: ExecutionKey,
        /// The frozen `now`.
        now: i64,
    },
    /// A non-retriable failure was surfaced to the caller.
    FatalEscalate {
        /// The execution this event belongs to.
        key: ExecutionKey,
        /// The error's taxonomy code, as text.
        code: &'static str,
    },
}
