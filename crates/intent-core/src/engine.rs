// SPDX-License-Identifier: Apache-2.0
//! Compute/apply/explain entry points (§6 "Snapshot API surface") tying the
//! schema, a snapshot, and the flow evaluator together.
//!
//! Every function here is pure: given the same `(schema, snapshot, intent,
//! clock)` it returns byte-identical results, and none of them retry,
//! sleep, or touch a real clock. The host (`intent-host`, an external
//! collaborator in this workspace) is the only caller that ever sees a real
//! clock or performs I/O; it calls these functions between jobs.

use crate::context::{EvalClock, EvalContext};
use crate::error::{ErrorCode, ErrorValue};
use crate::expr::{self, ExprNode};
use crate::flow::{self, FlowContext, FlowState, FlowStatus};
use crate::intent::Intent;
use crate::patch::Patch;
use crate::requirement::Requirement;
use crate::schema::{validate_patch_value, DomainSchema};
use crate::snapshot::{Snapshot, SnapshotStatus};
use crate::value::Value;

/// The compute cycle's outcome: the host's compute→effect loop branches on
/// `status` (§4.3 step 2–4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeStatus {
    /// The action ran to completion with no outstanding requirements.
    Complete,
    /// One or more `effect` nodes raised requirements; the host must
    /// dispatch them.
    Pending,
    /// The action hit a `halt` node (non-error termination).
    Halted,
    /// The action hit a `fail` node or a validation failure.
    Error,
}

impl ComputeStatus {
    fn from_flow_status(status: FlowStatus) -> Self {
        match status {
            // A `seq` that runs every step without hitting a terminal node
            // leaves the top-level state `Running` — that IS completion at
            // the compute level, there's simply nothing left to run.
            FlowStatus::Running | FlowStatus::Complete => ComputeStatus::Complete,
            FlowStatus::Pending => ComputeStatus::Pending,
            FlowStatus::Halted => ComputeStatus::Halted,
            FlowStatus::Error => ComputeStatus::Error,
        }
    }
}

/// The result of [`compute`]: the advanced snapshot, its terminal status,
/// the patches applied this cycle, and any requirements raised.
pub struct ComputeResult {
    /// The snapshot after this compute cycle's patches have been applied.
    pub snapshot: Snapshot,
    /// The cycle's terminal status.
    pub status: ComputeStatus,
    /// Patches applied during this cycle, in application order.
    pub patches: Vec<Patch>,
    /// Requirements raised during this cycle, in raise order.
    pub requirements: Vec<Requirement>,
    /// The evaluation trace, for deterministic replay.
    pub trace: flow::TraceNode,
}

/// Runs `intent.action`'s flow against `snapshot`, returning the advanced
/// snapshot plus its terminal status, patches, and requirements.
///
/// Pure: `clock` is the frozen per-job `{now, randomSeed}` bundle the host
/// captured once; this function never reads a real clock.
#[must_use]
pub fn compute(schema: &DomainSchema, snapshot: &Snapshot, intent: &Intent, clock: &EvalClock) -> ComputeResult {
    let mut working = snapshot.next(clock.now, clock.random_seed.clone());
    working.input = carry_forward_app_slot(&snapshot.input, intent);
    working.system.status = SnapshotStatus::Computing;
    working.system.current_action = Some(intent.action.clone());

    let Some(action) = schema.actions.get(&intent.action) else {
        let err = ErrorValue::new(ErrorCode::UnknownFlow, format!("no such action: {}", intent.action))
            .with_action_name(intent.action.clone())
            .with_timestamp(clock.now);
        return error_result(working, err);
    };

    if let Some(guard) = &action.available {
        let ctx = EvalContext::new(&working, schema, clock);
        let available = expr::evaluate(guard, &ctx).map(|v| v.is_flow_truthy()).unwrap_or(false);
        if !available {
            let err = ErrorValue::new(
                ErrorCode::ValidationError,
                format!("action not available: {}", intent.action),
            )
            .with_action_name(intent.action.clone())
            .with_timestamp(clock.now);
            return error_result(working, err);
        }
    }

    let fctx = FlowContext {
        schema,
        clock,
        intent_id: &intent.intent_id,
        action_id: &intent.action,
    };
    let flow::FlowResult { state, trace } = flow::evaluate(&action.flow, &fctx, FlowState::running(working));
    finish(state, trace, clock)
}

/// Applies externally-submitted patches directly to `snapshot` (used by the
/// host's `FulfillEffect`/`ApplyPatches` jobs and by tests/projection
/// adapters that bypass the flow evaluator).
///
/// Total: an invalid patch is recorded into `system.errors` and skipped
/// rather than aborting the whole batch. `system.status` is left untouched
/// — callers that want `idle`/`error` semantics set it themselves.
#[must_use]
pub fn apply(schema: &DomainSchema, snapshot: &Snapshot, patches: &[Patch], clock: &EvalClock) -> Snapshot {
    let mut working = snapshot.next(clock.now, clock.random_seed.clone());
    for patch in patches {
        if let Err(err) = validate_if_applicable(schema, patch) {
            working.system.errors.push(err.clone());
            working.system.last_error = Some(err);
            continue;
        }
        if let Err(err) = flow::apply_patch_to_snapshot(&mut working, patch) {
            working.system.errors.push(err.clone());
            working.system.last_error = Some(err);
        }
    }
    working
}

fn validate_if_applicable(schema: &DomainSchema, patch: &Patch) -> Result<(), ErrorValue> {
    if patch.op == crate::patch::PatchOp::Unset {
        return Ok(());
    }
    let Some(value) = &patch.value else {
        return Ok(());
    };
    validate_patch_value(schema, &patch.path, value)
}

/// A `get`/`computed` lookup replayed for introspection: `{value, trace,
/// deps}` (§4.4 implementation note, grounded in a read-only `GraphView`
/// pattern — see `DESIGN.md`).
pub struct ExplainResult {
    /// The value found at `path`.
    pub value: Value,
    /// A human-readable trace of how the value was derived (the dotted
    /// sub-paths consulted, in lookup order).
    pub trace: Vec<String>,
    /// The dependency paths this lookup rests on. For `computed.<name>`
    /// this is the computed field's declared `deps`; for any other path it
    /// is just `[path]`.
    pub deps: Vec<String>,
}

/// Replays the lookup at `path` against `snapshot`, returning the value
/// alongside its dependency trace. Pure; never fails — an unresolvable path
/// yields `Value::Null` with an empty trace, matching `get`'s total lookup
/// chain (§4.1).
#[must_use]
pub fn explain(schema: &DomainSchema, snapshot: &Snapshot, path: &str, clock: &EvalClock) -> ExplainResult {
    let ctx = EvalContext::new(snapshot, schema, clock);
    if let Some(name) = path.strip_prefix("computed.") {
        if let Some(spec) = schema.computed_fields.get(name) {
            let value = expr::evaluate(&spec.expr, &ctx).unwrap_or(Value::Null);
            return ExplainResult {
                value,
                trace: spec.deps.clone(),
                deps: spec.deps.clone(),
            };
        }
    }
    let value = expr::evaluate(&ExprNode::Get(path.to_owned()), &ctx).unwrap_or(Value::Null);
    ExplainResult {
        value,
        trace: vec![path.to_owned()],
        deps: vec![path.to_owned()],
    }
}

fn carry_forward_app_slot(previous_input: &crate::value::Object, intent: &Intent) -> crate::value::Object {
    let mut input = intent.input.clone();
    if let Some(app) = previous_input.get("$app") {
        input.entry("$app".to_owned()).or_insert_with(|| app.clone());
    }
    input
}

fn error_result(mut snapshot: Snapshot, err: ErrorValue) -> ComputeResult {
    snapshot.system.status = SnapshotStatus::Error;
    snapshot.system.last_error = Some(err.clone());
    snapshot.system.errors.push(err.clone());
    snapshot.system.current_action = None;
    ComputeResult {
        snapshot,
        status: ComputeStatus::Error,
        patches: Vec::new(),
        requirements: Vec::new(),
        trace: flow::TraceNode {
            id: 0,
            kind: "compute.error",
            node_path: "root".to_owned(),
            args: Value::Null,
            value: err.to_value(),
            children: Vec::new(),
        },
    }
}

fn finish(mut state: FlowState, trace: flow::TraceNode, clock: &EvalClock) -> ComputeResult {
    let status = ComputeStatus::from_flow_status(state.status);
    state.snapshot.system.status = match status {
        ComputeStatus::Complete => SnapshotStatus::Idle,
        ComputeStatus::Pending => SnapshotStatus::Pending,
        ComputeStatus::Halted => SnapshotStatus::Idle,
        ComputeStatus::Error => SnapshotStatus::Error,
    };
    if !matches!(status, ComputeStatus::Pending) {
        state.snapshot.system.current_action = None;
    }
    if let Some(err) = &state.error {
        let stamped = err.clone().with_timestamp(clock.now);
        state.snapshot.system.last_error = Some(stamped.clone());
        state.snapshot.system.errors.push(stamped);
    }
    ComputeResult {
        snapshot: state.snapshot,
        status,
        patches: state.patches,
        requirements: state.requirements,
        trace,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowNode;
    use crate::patch::PatchOp;
    use crate::schema::{ActionSpec, FieldSpec};
    use crate::value::Object;
    use std::collections::BTreeMap;

    fn schema_with(action: &str, flow: FlowNode, fields: Vec<(&str, FieldSpec)>) -> DomainSchema {
        let mut actions = BTreeMap::new();
        actions.insert(action.to_owned(), ActionSpec { flow, available: None });
        DomainSchema {
            id: "t".to_owned(),
            version: 1,
            hash: [9u8; 32],
            state_fields: fields.into_iter().map(|(k, v)| (k.to_owned(), v)).collect(),
            computed_fields: BTreeMap::new(),
            actions,
        }
    }

    #[test]
    fn compute_completes_with_no_requirements() {
        let flow = FlowNode::Patch {
            op: PatchOp::Set,
            path: "data.count".to_owned(),
            value: Some(ExprNode::Literal(Value::Num(1.0))),
        };
        let schema = schema_with("createTask", flow, vec![("count", FieldSpec::Number)]);
        let snapshot = Snapshot::genesis(Object::new(), schema.hash, 0, "seed");
        let intent = Intent::new("createTask", Object::new(), "intent-1");
        let clock = EvalClock::new(100, "seed");
        let result = compute(&schema, &snapshot, &intent, &clock);
        assert_eq!(result.status, ComputeStatus::Complete);
        assert_eq!(result.snapshot.data.get("count"), Some(&Value::Num(1.0)));
        assert_eq!(result.snapshot.meta.version, 1);
    }

    #[test]
    fn compute_unknown_action_yields_unknown_flow() {
        let schema = schema_with("createTask", FlowNode::Halt { reason: None }, vec![]);
        let snapshot = Snapshot::genesis(Object::new(), schema.hash, 0, "seed");
        let intent = Intent::new("missingAction", Object::new(), "intent-1");
        let clock = EvalClock::new(0, "seed");
        let result = compute(&schema, &snapshot, &intent, &clock);
        assert_eq!(result.status, ComputeStatus::Error);
        assert_eq!(
            result.snapshot.system.last_error.unwrap().code,
            ErrorCode::UnknownFlow
        );
    }

    #[test]
    fn compute_is_deterministic_for_identical_inputs() {
        let flow = FlowNode::Patch {
            op: PatchOp::Set,
            path: "data.x".to_owned(),
            value: Some(ExprNode::Literal(Value::Num(5.0))),
        };
        let schema = schema_with("a", flow, vec![("x", FieldSpec::Number)]);
        let snapshot = Snapshot::genesis(Object::new(), schema.hash, 0, "seed");
        let intent = Intent::new("a", Object::new(), "intent-1");
        let clock = EvalClock::new(42, "seed-x");
        let r1 = compute(&schema, &snapshot, &intent, &clock);
        let r2 = compute(&schema, &snapshot, &intent, &clock);
        assert_eq!(r1.snapshot.snapshot_hash(), r2.snapshot.snapshot_hash());
    }

    #[test]
    fn apply_applies_external_patches() {
        let schema = schema_with("a", FlowNode::Halt { reason: None }, vec![("x", FieldSpec::Number)]);
        let snapshot = Snapshot::genesis(Object::new(), schema.hash, 0, "seed");
        let clock = EvalClock::new(0, "seed");
        let patches = vec![Patch::set("data.x", Value::Num(9.0))];
        let result = apply(&schema, &snapshot, &patches, &clock);
        assert_eq!(result.data.get("x"), Some(&Value::Num(9.0)));
    }

    #[test]
    fn apply_records_invalid_patch_without_aborting_others() {
        let schema = schema_with("a", FlowNode::Halt { reason: None }, vec![("x", FieldSpec::Number)]);
        let snapshot = Snapshot::genesis(Object::new(), schema.hash, 0, "seed");
        let clock = EvalClock::new(0, "seed");
        let patches = vec![
            Patch::set("data.x", Value::from("not a number")),
            Patch::set("data.$host.v", Value::Num(1.0)),
        ];
        let result = apply(&schema, &snapshot, &patches, &clock);
        assert_eq!(result.system.errors.len(), 1);
    }

    #[test]
    fn explain_reports_computed_field_deps() {
        let mut schema = schema_with("a", FlowNode::Halt { reason: None }, vec![("count", FieldSpec::Number)]);
        schema.computed_fields.insert(
            "doubled".to_owned(),
            crate::schema::ComputedFieldSpec {
                expr: ExprNode::Mul(vec![
                    ExprNode::Get("data.count".to_owned()),
                    ExprNode::Literal(Value::Num(2.0)),
                ]),
                deps: vec!["data.count".to_owned()],
            },
        );
        let mut data = Object::new();
        data.insert("count".to_owned(), Value::Num(3.0));
        let snapshot = Snapshot::genesis(data, schema.hash, 0, "seed");
        let clock = EvalClock::new(0, "seed");
        let result = explain(&schema, &snapshot, "computed.doubled", &clock);
        assert_eq!(result.value, Value::Num(6.0));
        assert_eq!(result.deps, vec!["data.count".to_owned()]);
    }
}
