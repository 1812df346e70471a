// SPDX-License-Identifier: Apache-2.0
//! intent-core: pure, total, deterministic expression/flow evaluator and
//! snapshot model for the intent execution engine.
//!
//! Nothing in this crate observes wall-clock time, generates randomness, or
//! performs I/O. Every public entry point is a function of its explicit
//! inputs; non-determinism (the clock, the RNG seed) is injected by the
//! host as a [`context::EvalClock`] value and never read from the
//! environment here.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, unused_must_use)]
#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::missing_errors_doc
)]

/// Dependency-free evaluation context plumbing (clock/seed carriers only;
/// the host owns the real clock).
pub mod context;
/// Compute/apply/explain entry points tying schema + snapshot + flow
/// together.
pub mod engine;
/// Taxonomy of engine errors (§7) and the value wrapper carried on every
/// evaluator failure path.
pub mod error;
/// The expression evaluator (§4.1).
pub mod expr;
/// The flow evaluator (§4.2).
pub mod flow;
/// The caller-submitted intent driving a compute cycle.
pub mod intent;
/// Canonical JSON serialization used as the hash pre-image (JCS).
pub mod jcs;
/// Dotted-path get/set/unset/merge over [`value::Value`] trees.
pub mod path;
/// Patch model: `{op, path, value}`.
pub mod patch;
/// Pending-effect requirement identifiers.
pub mod requirement;
/// Domain schema, field specs, and patch-value validation.
pub mod schema;
/// Immutable snapshot model and canonical hashing.
pub mod snapshot;
/// The dynamic value sum type.
pub mod value;

pub use context::EvalClock;
pub use engine::{ComputeResult, ComputeStatus, ExplainResult};
pub use error::{ErrorCode, ErrorValue};
pub use expr::ExprNode;
pub use flow::FlowNode;
pub use intent::Intent;
pub use patch::{Patch, PatchOp};
pub use requirement::{FlowPosition, Requirement};
pub use schema::{ActionSpec, ComputedFieldSpec, DomainSchema, FieldSpec};
pub use snapshot::{Meta, Snapshot, SnapshotStatus, SystemState};
pub use value::Value;

/// Canonical 256-bit content digest used for schema hashes, world ids, and
/// requirement ids.
pub type Hash = [u8; 32];

/// Returns the lowercase hex encoding of a [`Hash`].
#[must_use]
pub fn hash_hex(h: &Hash) -> String {
    hex::encode(h)
}
