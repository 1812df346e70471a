// SPDX-License-Identifier: Apache-2.0
//! The proposal authority state machine and queue (§4.4 "Proposal FSM").
//!
//! ```text
//! submitted → evaluating → {approved, rejected}
//! approved  → executing  → {completed, failed}
//! ```
//!
//! Terminal: `{completed, rejected, failed}`. Only `approved`/`rejected`
//! require a `decisionId`; only `completed`/`failed` may attach a
//! `resultWorld`. Any transition outside the table above fails with
//! `INVALID_TRANSITION` — reverse transitions and state-skipping are both
//! rejected by the same check (§8 "FSM soundness").

use std::collections::HashMap;

use async_trait::async_trait;
use intent_core::value::Object;
use intent_core::{ErrorCode, ErrorValue, Hash, Intent};
use parking_lot::Mutex;

/// A proposal's position in the FSM (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProposalStatus {
    /// Freshly submitted; awaiting an authority decision.
    Submitted,
    /// An authority handler is deciding.
    Evaluating,
    /// The authority approved the proposal; awaiting execution.
    Approved,
    /// The authority rejected the proposal. Terminal.
    Rejected,
    /// The host is executing the proposal's intent.
    Executing,
    /// Execution produced a result world. Terminal.
    Completed,
    /// Execution failed. Terminal.
    Failed,
}

impl ProposalStatus {
    /// `true` for the three terminal states — no transition table entry
    /// accepts a terminal status as its `from`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, ProposalStatus::Completed | ProposalStatus::Rejected | ProposalStatus::Failed)
    }

    /// The wire/display name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ProposalStatus::Submitted => "submitted",
            ProposalStatus::Evaluating => "evaluating",
            ProposalStatus::Approved => "approved",
            ProposalStatus::Rejected => "rejected",
            ProposalStatus::Executing => "executing",
            ProposalStatus::Completed => "completed",
            ProposalStatus::Failed => "failed",
        }
    }

    /// Whether `next` is a legal direct successor of `self` per the FSM
    /// table. Self-transitions are never legal; neither is any transition
    /// out of a terminal state.
    #[must_use]
    pub fn can_advance_to(self, next: ProposalStatus) -> bool {
        use ProposalStatus::{Approved, Completed, Evaluating, Executing, Failed, Rejected, Submitted};
        matches!(
            (self, next),
            (Submitted, Evaluating)
                | (Evaluating, Approved)
                | (Evaluating, Rejected)
                | (Approved, Executing)
                | (Executing, Completed)
                | (Executing, Failed)
        )
    }
}

/// A submitted intent together with its lifecycle state (§3 GLOSSARY).
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    /// Content-derived identity of this proposal.
    pub proposal_id: Hash,
    /// The serialization key the host mailbox uses while executing this
    /// proposal's intent.
    pub execution_key: String,
    /// Who submitted this proposal.
    pub actor: String,
    /// The intent this proposal carries.
    pub intent: Intent,
    /// The world this proposal was evaluated against.
    pub base_world: Hash,
    /// Current FSM position.
    pub status: ProposalStatus,
    /// When this proposal was submitted.
    pub submitted_at: i64,
    /// Set by `evaluating → {approved, rejected}`.
    pub decision_id: Option<String>,
    /// Set by `executing → {completed, failed}` on success.
    pub result_world: Option<Hash>,
    /// Free-form trace payload attached at submission, carried through
    /// unmodified (e.g. the natural-language translator's provenance).
    pub trace: Option<Object>,
}

impl Proposal {
    /// Builds a freshly `submitted` proposal, deriving its id from content
    /// so re-submitting the same `(actor, intent, baseWorld, submittedAt)`
    /// is idempotent at the id level (callers still decide whether to
    /// de-duplicate).
    #[must_use]
    pub fn new(actor: impl Into<String>, intent: Intent, base_world: Hash, submitted_at: i64) -> Self {
        let actor = actor.into();
        let proposal_id = proposal_id(&actor, &intent, &base_world, submitted_at);
        Self {
            proposal_id,
            execution_key: intent.intent_id.clone(),
            actor,
            intent,
            base_world,
            status: ProposalStatus::Submitted,
            submitted_at,
            decision_id: None,
            result_world: None,
            trace: None,
        }
    }

    /// Attaches a trace payload (e.g. provenance from an upstream
    /// translator) at submission time.
    #[must_use]
    pub fn with_trace(mut self, trace: Object) -> Self {
        self.trace = Some(trace);
        self
    }
}

fn proposal_id(actor: &str, intent: &Intent, base_world: &Hash, submitted_at: i64) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"intent-world:proposal:v1");
    hasher.update(actor.as_bytes());
    hasher.update(b"\0");
    hasher.update(intent.intent_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(intent.action.as_bytes());
    hasher.update(base_world);
    hasher.update(&submitted_at.to_be_bytes());
    *hasher.finalize().as_bytes()
}

/// Options accepted by [`ProposalQueue::transition`]: the fields only some
/// transitions require, per the table above.
#[derive(Debug, Clone, Default)]
pub struct TransitionOpts {
    /// Required by `evaluating → {approved, rejected}`.
    pub decision_id: Option<String>,
    /// Required by `executing → completed` (optional for `executing →
    /// failed`, which need not have produced a world).
    pub result_world: Option<Hash>,
    /// Human-readable reason, carried for `rejected`/`failed` diagnostics.
    pub reason: Option<String>,
}

/// An authority's verdict on a proposal still in `evaluating` (§6
/// "Authority handler contract").
#[derive(Debug, Clone)]
pub struct AuthorityDecision {
    /// The next status: `approved`, `rejected`, or `pending` (stay in
    /// `evaluating`; the authority needs another round).
    pub status: AuthorityOutcome,
    /// Present when `status` is `approved`/`rejected`.
    pub decision_id: Option<String>,
    /// Human-readable justification.
    pub reason: Option<String>,
}

/// The three outcomes an authority may return from `evaluating`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorityOutcome {
    /// Advance to `approved`.
    Approved,
    /// Advance to `rejected`.
    Rejected,
    /// Stay in `evaluating`; call again later (e.g. awaiting a human).
    Pending,
}

/// `decide(proposal, baseSnapshot) → {status, decisionId?, reason?}` (§6).
/// Called only while the proposal is `evaluating`.
#[async_trait]
pub trait AuthorityHandler: Send + Sync {
    /// Decides a proposal's fate given its base snapshot's canonical data.
    async fn decide(&self, proposal: &Proposal, base_snapshot: &Object) -> AuthorityDecision;
}

/// An authority that approves everything immediately — the reference
/// "auto-approve" policy named in §1.
pub struct AutoApprove;

#[async_trait]
impl AuthorityHandler for AutoApprove {
    async fn decide(&self, _proposal: &Proposal, _base_snapshot: &Object) -> AuthorityDecision {
        AuthorityDecision {
            status: AuthorityOutcome::Approved,
            decision_id: Some("auto-approve".to_owned()),
            reason: None,
        }
    }
}

/// The proposal queue: owns proposals by `proposalId`, advances them only
/// through [`ProposalQueue::transition`], and supports query by status,
/// actor, or base world (§4.4).
#[derive(Default)]
pub struct ProposalQueue {
    proposals: Mutex<HashMap<Hash, Proposal>>,
}

impl ProposalQueue {
    /// Builds an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a freshly `submitted` proposal. Returns the stored proposal.
    pub fn submit(&self, proposal: Proposal) -> Proposal {
        let mut proposals = self.proposals.lock();
        proposals.insert(proposal.proposal_id, proposal.clone());
        proposal
    }

    /// Looks up a proposal by id.
    #[must_use]
    pub fn get(&self, proposal_id: &Hash) -> Option<Proposal> {
        self.proposals.lock().get(proposal_id).cloned()
    }

    /// Advances `proposal_id` to `next`, validating the transition against
    /// the FSM table and the opts required by that edge. Returns
    /// `INVALID_TRANSITION` for any edge not in the table, including
    /// reverse transitions, state-skipping, and any transition out of a
    /// terminal status.
    pub fn transition(
        &self,
        proposal_id: &Hash,
        next: ProposalStatus,
        opts: TransitionOpts,
    ) -> Result<Proposal, ErrorValue> {
        let mut proposals = self.proposals.lock();
        let proposal = proposals.get_mut(proposal_id).ok_or_else(|| {
            ErrorValue::new(ErrorCode::InvalidTransition, format!("unknown proposal {proposal_id:?}"))
        })?;

        if !proposal.status.can_advance_to(next) {
            return Err(ErrorValue::new(
                ErrorCode::InvalidTransition,
                format!("{} -> {} is not a legal transition", proposal.status.as_str(), next.as_str()),
            ));
        }

        if matches!(next, ProposalStatus::Approved | ProposalStatus::Rejected) && opts.decision_id.is_none() {
            return Err(ErrorValue::new(
                ErrorCode::InvalidTransition,
                format!("{} requires a decisionId", next.as_str()),
            ));
        }

        if matches!(next, ProposalStatus::Completed) && opts.result_world.is_none() {
            return Err(ErrorValue::new(
                ErrorCode::InvalidTransition,
                "completed requires a resultWorld",
            ));
        }

        proposal.status = next;
        if let Some(decision_id) = opts.decision_id {
            proposal.decision_id = Some(decision_id);
        }
        if let Some(result_world) = opts.result_world {
            proposal.result_world = Some(result_world);
        }
        Ok(proposal.clone())
    }

    /// Returns all proposals currently in `status`.
    #[must_use]
    pub fn by_status(&self, status: ProposalStatus) -> Vec<Proposal> {
        self.proposals
            .lock()
            .values()
            .filter(|p| p.status == status)
            .cloned()
            .collect()
    }

    /// Returns all proposals submitted by `actor`.
    #[must_use]
    pub fn by_actor(&self, actor: &str) -> Vec<Proposal> {
        self.proposals.lock().values().filter(|p| p.actor == actor).cloned().collect()
    }

    /// Returns all proposals evaluated against `base_world`.
    #[must_use]
    pub fn by_base_world(&self, base_world: &Hash) -> Vec<Proposal> {
        self.proposals
            .lock()
            .values()
            .filter(|p| &p.base_world == base_world)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use intent_core::value::Object;

    use super::*;

    fn intent() -> Intent {
        Intent::new("createTask", Object::new(), "intent-1")
    }

    #[test]
    fn happy_path_reaches_completed_with_result_world() {
        let queue = ProposalQueue::new();
        let proposal = queue.submit(Proposal::new("alice", intent(), [1u8; 32], 0));
        let id = proposal.proposal_id;

        queue.transition(&id, ProposalStatus::Evaluating, TransitionOpts::default()).unwrap();
        queue
            .transition(
                &id,
                ProposalStatus::Approved,
                TransitionOpts {
                    decision_id: Some("d1".to_owned()),
                    ..Default::default()
                },
            )
            .unwrap();
        queue.transition(&id, ProposalStatus::Executing, TransitionOpts::default()).unwrap();
        let done = queue
            .transition(
                &id,
                ProposalStatus::Completed,
                TransitionOpts {
                    result_world: Some([2u8; 32]),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(done.status, ProposalStatus::Completed);
        assert_eq!(done.result_world, Some([2u8; 32]));
        assert_eq!(done.decision_id.as_deref(), Some("d1"));
    }

    #[test]
    fn skipping_evaluating_is_rejected() {
        let queue = ProposalQueue::new();
        let proposal = queue.submit(Proposal::new("alice", intent(), [1u8; 32], 0));
        let err = queue
            .transition(&proposal.proposal_id, ProposalStatus::Executing, TransitionOpts::default())
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidTransition);
    }

    #[test]
    fn terminal_states_never_advance() {
        let queue = ProposalQueue::new();
        let proposal = queue.submit(Proposal::new("alice", intent(), [1u8; 32], 0));
        let id = proposal.proposal_id;
        queue.transition(&id, ProposalStatus::Evaluating, TransitionOpts::default()).unwrap();
        queue
            .transition(
                &id,
                ProposalStatus::Rejected,
                TransitionOpts {
                    decision_id: Some("d1".to_owned()),
                    ..Default::default()
                },
            )
            .unwrap();

        let err = queue
            .transition(&id, ProposalStatus::Evaluating, TransitionOpts::default())
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidTransition);
    }

    #[test]
    fn approve_without_decision_id_is_rejected() {
        let queue = ProposalQueue::new();
        let proposal = queue.submit(Proposal::new("alice", intent(), [1u8; 32], 0));
        let id = proposal.proposal_id;
        queue.transition(&id, ProposalStatus::Evaluating, TransitionOpts::default()).unwrap();
        let err = queue
            .transition(&id, ProposalStatus::Approved, TransitionOpts::default())
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidTransition);
    }

    #[test]
    fn query_by_status_actor_and_base_world() {
        let queue = ProposalQueue::new();
        let p1 = queue.submit(Proposal::new("alice", intent(), [1u8; 32], 0));
        let _p2 = queue.submit(Proposal::new("bob", Intent::new("deleteTask", Object::new(), "intent-2"), [1u8; 32], 1));

        assert_eq!(queue.by_status(ProposalStatus::Submitted).len(), 2);
        assert_eq!(queue.by_actor("alice"), vec![p1.clone()]);
        assert_eq!(queue.by_base_world(&[1u8; 32]).len(), 2);
    }
}
