// SPDX-License-Identifier: Apache-2.0
//! intent-host: the event-loop host runtime around `intent-core`'s pure
//! evaluator.
//!
//! Everything non-deterministic lives here: the real clock, effect
//! dispatch, and the mailbox/runner discipline that serializes compute
//! cycles per execution. `intent-core` never sees any of it directly — the
//! host captures a [`clock::FrozenContext`] once per job and that is the
//! only non-deterministic value the pure core is ever handed.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, unused_must_use)]
#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::missing_errors_doc
)]

/// The host's clock abstraction and per-job frozen context (CTX-1…5).
pub mod clock;
/// The effect handler contract and pending-requirement dispatch lifecycle.
pub mod effect;
/// Priority-ordered post-hook side-job queue (§4.6).
pub mod hooks;
/// The mailbox/runner host (§4.3), implementing RUN-1…4.
pub mod host;
/// Job types and the per-execution mailbox.
pub mod mailbox;
/// Memory context freezer: recalled context frozen into a job's input.
pub mod memory;
/// Trace event types for deterministic replay of host-level activity.
pub mod trace;

pub use clock::{FixedClock, FrozenContext, HostClock, SystemClock};
pub use effect::{EffectContext, EffectHandler, RequirementId, UnregisteredEffectHandler};
pub use hooks::{HookJob, HookQueue, Priority};
pub use host::{Host, HostConfig};
pub use mailbox::{ExecutionKey, Job, Mailbox};
pub use memory::{freeze as freeze_memory_recall, recalled as recalled_memory, MemoryRecall};
pub use trace::TraceEvent;
