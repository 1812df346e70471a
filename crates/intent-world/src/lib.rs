// SPDX-License-Identifier: Apache-2.0
//! intent-world: the content-addressed world graph, delta generation, and
//! the proposal authority state machine (§4.4).
//!
//! Worlds reference their parent only by id — [`world::WorldStore`] is the
//! single place that resolves that reference. Proposals move through a
//! fixed seven-state machine; [`proposal::ProposalQueue`] owns them by
//! `proposalId` and only ever advances them through [`proposal::transition`].
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, unused_must_use)]
#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::missing_errors_doc
)]

/// Delta generation between two canonical snapshots (§4.4).
pub mod delta;
/// The proposal FSM, authority contract, and proposal queue (§4.4).
pub mod proposal;
/// The content-addressed world graph and its store.
pub mod world;

pub use delta::{generate_delta, WorldDelta};
pub use proposal::{
    AuthorityDecision, AuthorityHandler, AuthorityOutcome, AutoApprove, Proposal, ProposalQueue,
    ProposalStatus, TransitionOpts,
};
pub use world::{world_id, World, WorldStore};
