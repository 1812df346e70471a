// SPDX-License-Identifier: Apache-2.0
//! The host's job types and per-`ExecutionKey` mailbox (§4.3).
//!
//! An [`ExecutionKey`] is the serialization boundary: at most one runner
//! drains any one mailbox (RUN-1). The mailbox itself is a strict FIFO
//! queue — [`crate::host::Host`] owns the single-runner discipline that
//! drains it.

use std::collections::VecDeque;

use intent_core::{Intent, Patch};

use crate::effect::RequirementId;

/// Opaque per-proposal scheduler key; the serialization boundary for the
/// mailbox runner. Hosts commonly derive this from the intent id, but it is
/// kept distinct because a single proposal may re-enter with several
/// intents sharing one execution lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExecutionKey(pub String);

impl ExecutionKey {
    /// Builds a key from any string-like value.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }
}

impl std::fmt::Display for ExecutionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The four job kinds the host's mailbox carries (§4.3).
#[derive(Debug, Clone)]
pub enum Job {
    /// Creates the frozen context and invokes the first compute cycle.
    StartIntent {
        /// The intent to run.
        intent: Intent,
    },
    /// Re-invokes compute on the current snapshot for `intent_id`, typically
    /// after a fulfillment.
    ContinueCompute {
        /// The intent whose action is being re-driven.
        intent_id: String,
    },
    /// Applies effect-returned patches and clears the requirement.
    FulfillEffect {
        /// The requirement this fulfillment resolves.
        requirement_id: RequirementId,
        /// Patches the handler returned (empty on a handler-reported
        /// failure, which the handler itself encodes as an error patch).
        patches: Vec<Patch>,
    },
    /// Applies externally-submitted patches (tests, the projection layer).
    ApplyPatches {
        /// The patches to apply, in order.
        patches: Vec<Patch>,
        /// A free-form label identifying the caller, carried into trace
        /// events only.
        source: String,
    },
}

impl Job {
    /// The job kind's name, for trace events.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Job::StartIntent { .. } => "StartIntent",
            Job::ContinueCompute { .. } => "ContinueCompute",
            Job::FulfillEffect { .. } => "FulfillEffect",
            Job::ApplyPatches { .. } => "ApplyPatches",
        }
    }
}

/// A strict FIFO queue of jobs for one [`ExecutionKey`].
#[derive(Debug, Default)]
pub struct Mailbox {
    queue: VecDeque<Job>,
}

impl Mailbox {
    /// Builds an empty mailbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues `job` at the back.
    pub fn push(&mut self, job: Job) {
        self.queue.push_back(job);
    }

    /// Dequeues the next job, if any.
    pub fn pop(&mut self) -> Option<Job> {
        self.queue.pop_front()
    }

    /// `true` if no jobs are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mailbox_is_strict_fifo() {
        let mut mailbox = Mailbox::new();
        mailbox.push(Job::ContinueCompute { intent_id: "a".to_owned() });
        mailbox.push(Job::ContinueCompute { intent_id: "b".to_owned() });
        let Some(Job::ContinueCompute { intent_id }) = mailbox.pop() else {
            unreachable!()
        };
        assert_eq!(intent_id, "a");
    }

    #[test]
    fn empty_mailbox_pops_none() {
        let mut mailbox = Mailbox::new();
        assert!(mailbox.pop().is_none());
        assert!(mailbox.is_empty());
    }
}
