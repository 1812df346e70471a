// SPDX-License-Identifier: Apache-2.0
//! The flow evaluator (§4.2): drives a [`FlowNode`] AST against a working
//! [`Snapshot`], accumulating patches, halting on effects, and recursing
//! through branches/loops/calls. Never throws — every failure surfaces as
//! `state.error` with `state.status = FlowStatus::Error`.

use std::collections::BTreeMap;

use crate::context::{EvalClock, EvalContext};
use crate::error::{ErrorCode, ErrorValue};
use crate::expr::{self, ExprNode};
use crate::patch::{Patch, PatchOp};
use crate::requirement::{requirement_id, FlowPosition, Requirement};
use crate::schema::{validate_patch_value, DomainSchema};
use crate::snapshot::Snapshot;
use crate::value::Value;

/// The closed set of flow AST kinds (§3, §4.2).
#[derive(Debug, Clone, PartialEq)]
pub enum FlowNode {
    /// Runs `steps` left to right, threading state; stops at the first
    /// non-`Running` status.
    Seq(Vec<FlowNode>),
    /// Evaluates `cond`; truthiness is `value ∉ {null, false}`. A missing
    /// `else_branch` is a no-op.
    If {
        /// The condition expression.
        cond: ExprNode,
        /// Evaluated when `cond` is flow-truthy.
        then_branch: Box<FlowNode>,
        /// Evaluated otherwise; absence is a no-op.
        else_branch: Option<Box<FlowNode>>,
    },
    /// Evaluates `value`, validates it against the field spec at `path`,
    /// then applies it to the working snapshot.
    Patch {
        /// The structural operation.
        op: PatchOp,
        /// Dotted path, rooted at `data` or `system`.
        path: String,
        /// The value expression; absent for `unset`.
        value: Option<ExprNode>,
    },
    /// Evaluates all `params` eagerly and either dispatches a pending
    /// requirement (the common case) or, for the two privileged inline
    /// effect types, executes a pure array transform directly.
    Effect {
        /// The handler registration key (e.g. `"api:fetch"`), or one of
        /// the two privileged inline kinds (`"array.map"`,
        /// `"array.filter"`).
        effect_type: String,
        /// Named parameter expressions.
        params: BTreeMap<String, ExprNode>,
    },
    /// Resolves `flow_name` against the schema's actions and recursively
    /// evaluates its flow.
    Call {
        /// The target action's name.
        flow_name: String,
    },
    /// Non-error termination.
    Halt {
        /// Optional human-readable reason.
        reason: Option<String>,
    },
    /// Records a `VALIDATION_ERROR` and transitions to `Error`.
    Fail {
        /// Caller-supplied code, folded into the error message (the
        /// taxonomy code itself is always `VALIDATION_ERROR`).
        code: String,
        /// Optional additional detail.
        message: Option<String>,
    },
}

/// `state.status` (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStatus {
    /// Still executing; more steps remain in the enclosing `seq`.
    Running,
    /// Finished with no pending requirements.
    Complete,
    /// Halted with one or more outstanding requirements.
    Pending,
    /// Hit a `halt` node (non-error termination).
    Halted,
    /// Hit a `fail` node or a validation failure.
    Error,
}

/// The flow evaluator's working state, threaded through every recursive
/// step.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowState {
    /// The working snapshot; patches apply directly here as they're
    /// evaluated.
    pub snapshot: Snapshot,
    /// Current status.
    pub status: FlowStatus,
    /// The patches applied so far, in application order.
    pub patches: Vec<Patch>,
    /// Requirements raised so far, in raise order.
    pub requirements: Vec<Requirement>,
    /// Set when `status == Error`.
    pub error: Option<ErrorValue>,
}

impl FlowState {
    /// Builds the initial running state for a fresh compute cycle.
    #[must_use]
    pub fn running(snapshot: Snapshot) -> Self {
        Self {
            snapshot,
            status: FlowStatus::Running,
            patches: Vec::new(),
            requirements: Vec::new(),
            error: None,
        }
    }
}

/// A single evaluation-step trace node, for deterministic replay. Trace
/// ids are assigned from a per-evaluation counter in depth-first
/// evaluation order, so identical input reproduces byte-identical traces.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceNode {
    /// Monotonic id within this flow evaluation.
    pub id: u64,
    /// The flow node kind's name (e.g. `"seq"`, `"patch"`, `"effect"`).
    pub kind: &'static str,
    /// Dotted path through the flow AST to this node.
    pub node_path: String,
    /// Evaluated arguments, informational.
    pub args: Value,
    /// The value produced (or `Null` for nodes without one).
    pub value: Value,
    /// Nested trace nodes for recursed-into children.
    pub children: Vec<TraceNode>,
}

/// The immutable context a flow evaluation needs beyond its [`FlowState`]:
/// the schema (for validation and `call` resolution), the frozen clock,
/// and the ids used to derive stable requirement ids.
pub struct FlowContext<'a> {
    /// The domain schema.
    pub schema: &'a DomainSchema,
    /// The frozen per-job clock.
    pub clock: &'a EvalClock,
    /// The intent this flow evaluation is running on behalf of.
    pub intent_id: &'a str,
    /// The top-level action id, held constant across `call` recursion so
    /// requirement ids stay stable regardless of call depth.
    pub action_id: &'a str,
}

/// The result of a flow evaluation: the updated state plus its trace.
pub struct FlowResult {
    /// The updated state.
    pub state: FlowState,
    /// The root trace node for this evaluation.
    pub trace: TraceNode,
}

#[derive(Default)]
struct TraceCounter(u64);

impl TraceCounter {
    fn next(&mut self) -> u64 {
        let id = self.0;
        self.0 += 1;
        id
    }
}

/// Evaluates `flow` against `state`, returning the updated state and its
/// trace. Never throws; failures are recorded in `state.error`.
pub fn evaluate(flow: &FlowNode, fctx: &FlowContext<'_>, state: FlowState) -> FlowResult {
    let mut counter = TraceCounter::default();
    let (state, trace) = eval_node(flow, fctx, state, "root", &mut counter);
    FlowResult { state, trace }
}

fn eval_ctx<'a>(fctx: &'a FlowContext<'a>, snapshot: &'a Snapshot) -> EvalContext<'a> {
    EvalContext::new(snapshot, fctx.schema, fctx.clock)
}

fn eval_node(
    flow: &FlowNode,
    fctx: &FlowContext<'_>,
    state: FlowState,
    node_path: &str,
    counter: &mut TraceCounter,
) -> (FlowState, TraceNode) {
    match flow {
        FlowNode::Seq(steps) => eval_seq(steps, fctx, state, node_path, counter),
        FlowNode::If {
            cond,
            then_branch,
            else_branch,
        } => eval_if(cond, then_branch, else_branch.as_deref(), fctx, state, node_path, counter),
        FlowNode::Patch { op, path, value } => eval_patch(*op, path, value.as_ref(), fctx, state, node_path, counter),
        FlowNode::Effect { effect_type, params } => {
            eval_effect(effect_type, params, fctx, state, node_path, counter)
        }
        FlowNode::Call { flow_name } => eval_call(flow_name, fctx, state, node_path, counter),
        FlowNode::Halt { reason } => eval_halt(reason.as_deref(), state, node_path, counter),
        FlowNode::Fail { code, message } => eval_fail(code, message.as_deref(), fctx, state, node_path, counter),
    }
}

fn leaf_trace(counter: &mut TraceCounter, kind: &'static str, node_path: &str, args: Value, value: Value) -> TraceNode {
    TraceNode {
        id: counter.next(),
        kind,
        node_path: node_path.to_owned(),
        args,
        value,
        children: Vec::new(),
    }
}

fn eval_seq(
    steps: &[FlowNode],
    fctx: &FlowContext<'_>,
    mut state: FlowState,
    node_path: &str,
    counter: &mut TraceCounter,
) -> (FlowState, TraceNode) {
    let id = counter.next();
    let mut children = Vec::with_capacity(steps.len());
    for (i, step) in steps.iter().enumerate() {
        let child_path = format!("{node_path}.seq[{i}]");
        let (next_state, child_trace) = eval_node(step, fctx, state, &child_path, counter);
        state = next_state;
        children.push(child_trace);
        if state.status != FlowStatus::Running {
            break;
        }
    }
    (
        state,
        TraceNode {
            id,
            kind: "seq",
            node_path: node_path.to_owned(),
            args: Value::Null,
            value: Value::Null,
            children,
        },
    )
}

fn eval_if(
    cond: &ExprNode,
    then_branch: &FlowNode,
    else_branch: Option<&FlowNode>,
    fctx: &FlowContext<'_>,
    state: FlowState,
    node_path: &str,
    counter: &mut TraceCounter,
) -> (FlowState, TraceNode) {
    let id = counter.next();
    let cond_value = expr::evaluate(cond, &eval_ctx(fctx, &state.snapshot)).unwrap_or(Value::Null);
    let taken = cond_value.is_flow_truthy();
    let cond_trace = leaf_trace(counter, "if.cond", &format!("{node_path}.cond"), Value::Null, cond_value);
    if taken {
        let (state, branch_trace) = eval_node(then_branch, fctx, state, &format!("{node_path}.then"), counter);
        (
            state,
            TraceNode {
                id,
                kind: "if",
                node_path: node_path.to_owned(),
                args: Value::Bool(taken),
                value: Value::Null,
                children: vec![cond_trace, branch_trace],
            },
        )
    } else if let Some(else_node) = else_branch {
        let (state, branch_trace) = eval_node(else_node, fctx, state, &format!("{node_path}.else"), counter);
        (
            state,
            TraceNode {
                id,
                kind: "if",
                node_path: node_path.to_owned(),
                args: Value::Bool(taken),
                value: Value::Null,
                children: vec![cond_trace, branch_trace],
            },
        )
    } else {
        (
            state,
            TraceNode {
                id,
                kind: "if",
                node_path: node_path.to_owned(),
                args: Value::Bool(taken),
                value: Value::Null,
                children: vec![cond_trace],
            },
        )
    }
}

/// Wraps `snapshot.data`/`snapshot.system` into one addressable `Value`
/// tree so `patch{path: "data.…" | "system.…"}` can apply through
/// [`crate::path`] uniformly, then un-wraps the result back into the
/// snapshot's typed fields.
/// Applies a single patch to `snapshot`'s `data`/`system` trees. Exposed
/// for `engine::apply`, which drives externally-submitted patches (e.g.
/// the host's `ApplyPatches` job) through the same structural-edit path
/// the flow evaluator's own `patch` node uses.
pub fn apply_patch_to_snapshot(snapshot: &mut Snapshot, patch: &Patch) -> Result<(), ErrorValue> {
    let mut wrapper = Value::Object(snapshot_as_value(snapshot));
    let apply_result = match patch.op {
        PatchOp::Set => crate::path::set_path(&mut wrapper, &patch.path, patch.value.clone().unwrap_or(Value::Null)),
        PatchOp::Unset => crate::path::unset_path(&mut wrapper, &patch.path),
        PatchOp::Merge => crate::path::merge_path(&mut wrapper, &patch.path, patch.value.clone().unwrap_or(Value::Null)),
    };
    apply_result.map_err(|e| match e {
        crate::path::PathError::MergeRequiresObject(p) => {
            ErrorValue::new(ErrorCode::TypeMismatch, format!("merge requires an object value at {p}"))
        }
        crate::path::PathError::NotTraversable(p) => {
            ErrorValue::new(ErrorCode::PathNotFound, format!("path segment is not traversable: {p}"))
        }
        crate::path::PathError::EmptyPath => ErrorValue::new(ErrorCode::PathNotFound, "empty path"),
    })?;
    let Value::Object(top) = wrapper else {
        return Ok(());
    };
    if let Some(Value::Object(data)) = top.get("data") {
        snapshot.data = data.clone();
    }
    if let Some(system_value) = top.get("system") {
        snapshot.system = crate::snapshot::SystemState::from_value(system_value);
    }
    Ok(())
}

fn snapshot_as_value(snapshot: &Snapshot) -> crate::value::Object {
    let mut obj = crate::value::Object::new();
    obj.insert("data".to_owned(), Value::Object(snapshot.data.clone()));
    obj.insert("system".to_owned(), snapshot.system.to_value());
    obj
}

fn eval_patch(
    op: PatchOp,
    path: &str,
    value_expr: Option<&ExprNode>,
    fctx: &FlowContext<'_>,
    mut state: FlowState,
    node_path: &str,
    counter: &mut TraceCounter,
) -> (FlowState, TraceNode) {
    let id = counter.next();
    let value = match value_expr {
        Some(expr) => match expr::evaluate(expr, &eval_ctx(fctx, &state.snapshot)) {
            Ok(v) => Some(v),
            Err(err) => {
                state.status = FlowStatus::Error;
                state.error = Some(err.clone().with_node_path(node_path.to_owned()));
                return (
                    state,
                    leaf_trace(counter, "patch", node_path, Value::Null, err.to_value()),
                );
            }
        },
        None => None,
    };
    if !path.starts_with("system.") && !crate::path::is_platform_namespace(path) {
        if let Some(v) = &value {
            if op != PatchOp::Unset {
                if let Err(err) = validate_patch_value(fctx.schema, path, v) {
                    state.status = FlowStatus::Error;
                    state.error = Some(err.clone().with_node_path(node_path.to_owned()));
                    return (state, leaf_trace(counter, "patch", node_path, Value::Null, err.to_value()));
                }
            }
        }
    }
    let patch = Patch {
        op,
        path: path.to_owned(),
        value: value.clone(),
    };
    if let Err(err) = apply_patch_to_snapshot(&mut state.snapshot, &patch) {
        state.status = FlowStatus::Error;
        state.error = Some(err.clone().with_node_path(node_path.to_owned()));
        return (state, leaf_trace(counter, "patch", node_path, Value::Null, err.to_value()));
    }
    state.patches.push(patch);
    (
        state,
        leaf_trace(counter, "patch", node_path, Value::Str(path.to_owned()), value.unwrap_or(Value::Null)),
    )
}

fn eval_effect(
    effect_type: &str,
    params: &BTreeMap<String, ExprNode>,
    fctx: &FlowContext<'_>,
    mut state: FlowState,
    node_path: &str,
    counter: &mut TraceCounter,
) -> (FlowState, TraceNode) {
    let id_trace = counter.next();
    if effect_type == "array.map" || effect_type == "array.filter" {
        return eval_inline_array_effect(effect_type, params, fctx, state, node_path, id_trace, counter);
    }
    let mut evaluated = BTreeMap::new();
    for (k, expr) in params {
        match expr::evaluate(expr, &eval_ctx(fctx, &state.snapshot)) {
            Ok(v) => {
                evaluated.insert(k.clone(), v);
            }
            Err(err) => {
                state.status = FlowStatus::Error;
                state.error = Some(err.clone().with_node_path(node_path.to_owned()));
                return (
                    state,
                    TraceNode {
                        id: id_trace,
                        kind: "effect",
                        node_path: node_path.to_owned(),
                        args: Value::Null,
                        value: err.to_value(),
                        children: Vec::new(),
                    },
                );
            }
        }
    }
    let rid = requirement_id(&fctx.schema.hash, fctx.intent_id, fctx.action_id, node_path);
    let requirement = Requirement {
        id: rid,
        effect_type: effect_type.to_owned(),
        params: evaluated.clone(),
        action_id: fctx.action_id.to_owned(),
        flow_position: FlowPosition {
            node_path: node_path.to_owned(),
            snapshot_version: state.snapshot.meta.version,
        },
        created_at: fctx.clock.now,
    };
    state.requirements.push(requirement);
    state.snapshot.system.pending_requirements.push(rid);
    state.status = FlowStatus::Pending;
    (
        state,
        TraceNode {
            id: id_trace,
            kind: "effect",
            node_path: node_path.to_owned(),
            args: Value::Object(evaluated),
            value: Value::Str(crate::hash_hex(&rid)),
            children: Vec::new(),
        },
    )
}

fn eval_inline_array_effect(
    effect_type: &str,
    params: &BTreeMap<String, ExprNode>,
    fctx: &FlowContext<'_>,
    mut state: FlowState,
    node_path: &str,
    id_trace: u64,
    counter: &mut TraceCounter,
) -> (FlowState, TraceNode) {
    let ctx = eval_ctx(fctx, &state.snapshot);
    let source_path = params.get("source").and_then(|e| expr::evaluate(e, &ctx).ok());
    let into_path = params.get("into").and_then(|e| expr::evaluate(e, &ctx).ok());
    let (Some(source_path), Some(into_path)) = (source_path, into_path) else {
        state.status = FlowStatus::Error;
        let err = ErrorValue::new(ErrorCode::InternalError, "array effect missing source/into params")
            .with_node_path(node_path.to_owned());
        state.error = Some(err.clone());
        return (
            state,
            TraceNode {
                id: id_trace,
                kind: "effect.inline",
                node_path: node_path.to_owned(),
                args: Value::Null,
                value: err.to_value(),
                children: Vec::new(),
            },
        );
    };
    let source_path = source_path.to_string_value();
    let into_path = into_path.to_string_value();
    let wrapper = Value::Object(snapshot_as_value(&state.snapshot));
    let items = crate::path::get_path(&wrapper, &source_path)
        .and_then(Value::as_array)
        .map(<[Value]>::to_vec)
        .unwrap_or_default();
    let array_value = Value::Array(items.clone());
    let item_expr = params.get("item");
    let mut result = Vec::new();
    for (i, item) in items.into_iter().enumerate() {
        let child_ctx = ctx.with_item_binding(item.clone(), i, array_value.clone());
        let Some(item_expr) = item_expr else { break };
        match expr::evaluate(item_expr, &child_ctx) {
            Ok(v) => {
                if effect_type == "array.map" {
                    result.push(v);
                } else if v.to_boolean() {
                    result.push(item);
                }
            }
            Err(err) => {
                state.status = FlowStatus::Error;
                state.error = Some(err.clone().with_node_path(node_path.to_owned()));
                return (
                    state,
                    TraceNode {
                        id: id_trace,
                        kind: "effect.inline",
                        node_path: node_path.to_owned(),
                        args: Value::Null,
                        value: err.to_value(),
                        children: Vec::new(),
                    },
                );
            }
        }
    }
    let patch = Patch::set(into_path.clone(), Value::Array(result.clone()));
    if let Err(err) = apply_patch_to_snapshot(&mut state.snapshot, &patch) {
        state.status = FlowStatus::Error;
        state.error = Some(err.clone().with_node_path(node_path.to_owned()));
        return (
            state,
            TraceNode {
                id: id_trace,
                kind: "effect.inline",
                node_path: node_path.to_owned(),
                args: Value::Null,
                value: err.to_value(),
                children: Vec::new(),
            },
        );
    }
    state.patches.push(patch);
    (
        state,
        TraceNode {
            id: id_trace,
            kind: "effect.inline",
            node_path: node_path.to_owned(),
            args: Value::Str(source_path),
            value: Value::Array(result),
            children: Vec::new(),
        },
    )
}

fn eval_call(
    flow_name: &str,
    fctx: &FlowContext<'_>,
    mut state: FlowState,
    node_path: &str,
    counter: &mut TraceCounter,
) -> (FlowState, TraceNode) {
    let id = counter.next();
    let Some(action) = fctx.schema.actions.get(flow_name) else {
        state.status = FlowStatus::Error;
        let err = ErrorValue::new(ErrorCode::UnknownFlow, format!("no such action: {flow_name}"))
            .with_node_path(node_path.to_owned());
        state.error = Some(err.clone());
        return (
            state,
            TraceNode {
                id,
                kind: "call",
                node_path: node_path.to_owned(),
                args: Value::Str(flow_name.to_owned()),
                value: err.to_value(),
                children: Vec::new(),
            },
        );
    };
    let flow = action.flow.clone();
    let (state, child_trace) = eval_node(&flow, fctx, state, &format!("{node_path}.call[{flow_name}]"), counter);
    (
        state,
        TraceNode {
            id,
            kind: "call",
            node_path: node_path.to_owned(),
            args: Value::Str(flow_name.to_owned()),
            value: Value::Null,
            children: vec![child_trace],
        },
    )
}

fn eval_halt(reason: Option<&str>, mut state: FlowState, node_path: &str, counter: &mut TraceCounter) -> (FlowState, TraceNode) {
    state.status = FlowStatus::Halted;
    let value = reason.map_or(Value::Null, |r| Value::Str(r.to_owned()));
    (state, leaf_trace(counter, "halt", node_path, Value::Null, value))
}

fn eval_fail(
    code: &str,
    message: Option<&str>,
    fctx: &FlowContext<'_>,
    mut state: FlowState,
    node_path: &str,
    counter: &mut TraceCounter,
) -> (FlowState, TraceNode) {
    state.status = FlowStatus::Error;
    let full_message = message.map_or_else(|| code.to_owned(), |m| format!("{code}: {m}"));
    let err = ErrorValue::new(ErrorCode::ValidationError, full_message)
        .with_node_path(node_path.to_owned())
        .with_action_name(fctx.action_id.to_owned())
        .with_timestamp(fctx.clock.now);
    state.error = Some(err.clone());
    (state, leaf_trace(counter, "fail", node_path, Value::Str(code.to_owned()), err.to_value()))
}
