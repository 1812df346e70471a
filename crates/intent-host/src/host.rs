// SPDX-License-Identifier: Apache-2.0
//! The event-loop host (§4.3 "Host Runtime").
//!
//! [`Host`] owns the single-writer mailbox/runner discipline per
//! [`ExecutionKey`] (RUN-1…4): at most one runner task drains any one
//! mailbox at a time, and a kick that arrives mid-drain is remembered and
//! rechecked before the runner fully releases its flag rather than being
//! dropped or spawning a second runner.
//!
//! A job's own turn — `compute`/`apply` against the pure core — always runs
//! to completion synchronously; the host only ever suspends *between* jobs,
//! never mid-job. Effect dispatch therefore happens as a task spawned
//! alongside the runner rather than as part of the job that raised the
//! requirement: the `StartIntent`/`ContinueCompute` job itself finishes in
//! `Pending` status and returns control to the runner immediately, and the
//! spawned dispatch task re-enters the mailbox with a `FulfillEffect` job
//! once the handler resolves.

use std::collections::HashMap;
use std::sync::Arc;

use intent_core::{DomainSchema, Intent, Patch, Requirement, Snapshot};
use parking_lot::Mutex;

use crate::clock::{FrozenContext, HostClock};
use crate::effect::{EffectHandler, RequirementId, UnregisteredEffectHandler};
use crate::mailbox::{ExecutionKey, Job, Mailbox};
use crate::trace::TraceEvent;

/// Host-wide tunables the spec leaves to deployment (§7 "max_iterations").
#[derive(Debug, Clone, Copy)]
pub struct HostConfig {
    /// Upper bound on compute cycles a single intent may drive before the
    /// host escalates `MAX_ITERATIONS_EXCEEDED` instead of continuing.
    pub max_iterations: u32,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self { max_iterations: 64 }
    }
}

/// Per-[`ExecutionKey`] runtime state: the live snapshot, its mailbox, the
/// single-runner flags, and the bookkeeping needed for iteration bounding
/// and stale-fulfillment detection.
struct ExecutionState {
    snapshot: Snapshot,
    mailbox: Mailbox,
    running: bool,
    kick_pending: bool,
    trace: Vec<TraceEvent>,
    iterations: HashMap<String, u32>,
    current_intent: Option<Intent>,
    dispatched: HashMap<RequirementId, u64>,
    watch_tx: tokio::sync::watch::Sender<Snapshot>,
}

impl ExecutionState {
    fn new(snapshot: Snapshot) -> Self {
        let (watch_tx, _rx) = tokio::sync::watch::channel(snapshot.clone());
        Self {
            snapshot,
            mailbox: Mailbox::new(),
            running: false,
            kick_pending: false,
            trace: Vec::new(),
            iterations: HashMap::new(),
            current_intent: None,
            dispatched: HashMap::new(),
            watch_tx,
        }
    }
}

enum NextStep {
    Run(Job),
    Recheck,
    Done,
}

struct Inner {
    schema: DomainSchema,
    clock: Box<dyn HostClock>,
    handlers: Mutex<HashMap<String, Arc<dyn EffectHandler>>>,
    unregistered: Arc<UnregisteredEffectHandler>,
    config: HostConfig,
    executions: Mutex<HashMap<ExecutionKey, ExecutionState>>,
}

/// The host runtime. Cheap to clone — every clone shares the same
/// executions table and spawned runners operate on a cloned handle.
#[derive(Clone)]
pub struct Host {
    inner: Arc<Inner>,
}

impl Host {
    /// Builds a host bound to `schema`, driven by `clock`.
    #[must_use]
    pub fn new(schema: DomainSchema, clock: Box<dyn HostClock>, config: HostConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                schema,
                clock,
                handlers: Mutex::new(HashMap::new()),
                unregistered: Arc::new(UnregisteredEffectHandler),
                config,
                executions: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The domain schema this host was built with.
    #[must_use]
    pub fn schema(&self) -> &DomainSchema {
        &self.inner.schema
    }

    /// Reads the host's injected clock directly, for read-only callers
    /// (e.g. the bridge's `get`/`explain`) that need a clock bundle but are
    /// not running inside a job.
    #[must_use]
    pub fn now_millis(&self) -> i64 {
        self.inner.clock.now_millis()
    }

    /// Registers a handler for `effect_type`. Replaces any prior handler
    /// registered under the same name.
    pub fn register_handler(&self, effect_type: impl Into<String>, handler: Arc<dyn EffectHandler>) {
        self.inner.handlers.lock().insert(effect_type.into(), handler);
    }

    /// Registers `key` with its starting snapshot. Idempotent: a second
    /// call for an already-known key is a no-op, so callers don't need to
    /// track whether they've seen a key before.
    pub fn start_execution(&self, key: ExecutionKey, snapshot: Snapshot) {
        self.inner
            .executions
            .lock()
            .entry(key)
            .or_insert_with(|| ExecutionState::new(snapshot));
    }

    /// Returns the current snapshot for `key`, if the key is known.
    #[must_use]
    pub fn snapshot(&self, key: &ExecutionKey) -> Option<Snapshot> {
        self.inner.executions.lock().get(key).map(|e| e.snapshot.clone())
    }

    /// Subscribes to snapshot changes for `key`. The receiver's initial
    /// value is the snapshot current at subscription time; every
    /// subsequent compute/apply/fulfill cycle sends the new snapshot.
    /// Returns `None` if `key` is not a known execution.
    #[must_use]
    pub fn watch(&self, key: &ExecutionKey) -> Option<tokio::sync::watch::Receiver<Snapshot>> {
        self.inner.executions.lock().get(key).map(|e| e.watch_tx.subscribe())
    }

    /// Returns a clone of the accumulated trace log for `key`.
    #[must_use]
    pub fn trace(&self, key: &ExecutionKey) -> Vec<TraceEvent> {
        self.inner
            .executions
            .lock()
            .get(key)
            .map(|e| e.trace.clone())
            .unwrap_or_default()
    }

    /// Enqueues `job` on `key`'s mailbox and ensures a runner is draining it
    /// (RUN-1…4). Returns once the job has been queued; the job itself may
    /// still be in flight when this returns.
    pub async fn submit(&self, key: ExecutionKey, job: Job) {
        let should_spawn = {
            let mut executions = self.inner.executions.lock();
            let Some(exec) = executions.get_mut(&key) else {
                tracing::warn!(%key, "submit to unknown execution key, dropping job");
                return;
            };
            exec.mailbox.push(job);
            if exec.running {
                exec.kick_pending = true;
                exec.trace.push(TraceEvent::RunnerKick { key: key.clone() });
                false
            } else {
                exec.running = true;
                exec.trace.push(TraceEvent::RunnerStart { key: key.clone() });
                true
            }
        };
        if should_spawn {
            let host = self.clone();
            tokio::spawn(async move { host.run(key).await });
        }
    }

    async fn run(self, key: ExecutionKey) {
        loop {
            let step = {
                let mut executions = self.inner.executions.lock();
                let Some(exec) = executions.get_mut(&key) else {
                    return;
                };
                match exec.mailbox.pop() {
                    Some(job) => NextStep::Run(job),
                    None if exec.kick_pending => {
                        exec.kick_pending = false;
                        exec.trace.push(TraceEvent::RunnerRecheck { key: key.clone() });
                        NextStep::Recheck
                    }
                    None => {
                        exec.running = false;
                        exec.trace.push(TraceEvent::RunnerEnd { key: key.clone() });
                        NextStep::Done
                    }
                }
            };
            match step {
                NextStep::Run(job) => {
                    let kind = job.kind_name();
                    {
                        let mut executions = self.inner.executions.lock();
                        if let Some(exec) = executions.get_mut(&key) {
                            exec.trace.push(TraceEvent::JobStart { key: key.clone(), kind });
                        }
                    }
                    self.process_job(&key, job).await;
                    let mut executions = self.inner.executions.lock();
                    if let Some(exec) = executions.get_mut(&key) {
                        exec.trace.push(TraceEvent::JobEnd { key: key.clone(), kind });
                    }
                }
                NextStep::Recheck => continue,
                NextStep::Done => return,
            }
        }
    }

    async fn process_job(&self, key: &ExecutionKey, job: Job) {
        match job {
            Job::StartIntent { intent } => self.run_compute(key, intent).await,
            Job::ContinueCompute { intent_id } => {
                let intent = {
                    let executions = self.inner.executions.lock();
                    executions
                        .get(key)
                        .and_then(|e| e.current_intent.clone())
                        .filter(|i| i.intent_id == intent_id)
                };
                match intent {
                    Some(intent) => self.run_compute(key, intent).await,
                    None => tracing::warn!(%key, intent_id, "continue for unknown/stale intent, dropping"),
                }
            }
            Job::FulfillEffect { requirement_id, patches } => self.handle_fulfill(key, requirement_id, patches),
            Job::ApplyPatches { patches, source } => self.handle_apply_patches(key, patches, &source),
        }
    }

    async fn run_compute(&self, key: &ExecutionKey, intent: Intent) {
        let requirements = {
            let mut executions = self.inner.executions.lock();
            let Some(exec) = executions.get_mut(key) else { return };

            let count = exec.iterations.entry(intent.intent_id.clone()).or_insert(0);
            if *count >= self.inner.config.max_iterations {
                let err = intent_core::ErrorValue::new(
                    intent_core::ErrorCode::MaxIterationsExceeded,
                    format!("intent {} exceeded max_iterations", intent.intent_id),
                );
                exec.snapshot.system.status = intent_core::SnapshotStatus::Error;
                exec.snapshot.system.last_error = Some(err.clone());
                exec.snapshot.system.errors.push(err);
                exec.trace.push(TraceEvent::FatalEscalate {
                    key: key.clone(),
                    code: "MAX_ITERATIONS_EXCEEDED",
                });
                return Vec::new();
            }
            *count += 1;

            let frozen = FrozenContext::capture(&*self.inner.clock, &intent.intent_id, Default::default());
            exec.trace.push(TraceEvent::ContextFrozen {
                key: key.clone(),
                now: frozen.clock.now,
            });

            let result = intent_core::engine::compute(&self.inner.schema, &exec.snapshot, &intent, &frozen.clock);
            exec.snapshot = result.snapshot;
            let _ = exec.watch_tx.send(exec.snapshot.clone());
            exec.current_intent = Some(intent.clone());
            exec.trace.push(TraceEvent::CoreCompute {
                key: key.clone(),
                version: exec.snapshot.meta.version,
            });

            if matches!(result.status, intent_core::ComputeStatus::Error) {
                exec.trace.push(TraceEvent::FatalEscalate {
                    key: key.clone(),
                    code: exec
                        .snapshot
                        .system
                        .last_error
                        .as_ref()
                        .map_or("INTERNAL_ERROR", |e| e.code.as_str()),
                });
            }

            let version = exec.snapshot.meta.version;
            let mut fresh = Vec::new();
            for req in result.requirements {
                if exec.dispatched.insert(req.id, version).is_none() {
                    fresh.push(req);
                }
            }
            fresh
        };

        for req in requirements {
            self.spawn_effect_dispatch(key.clone(), req);
        }
    }

    fn spawn_effect_dispatch(&self, key: ExecutionKey, req: Requirement) {
        let host = self.clone();
        tokio::spawn(async move {
            let handler = {
                let handlers = host.inner.handlers.lock();
                handlers.get(&req.effect_type).cloned()
            };
            let frozen = FrozenContext::capture(&*host.inner.clock, &req.action_id, Default::default());
            {
                let mut executions = host.inner.executions.lock();
                if let Some(exec) = executions.get_mut(&key) {
                    exec.trace.push(TraceEvent::EffectDispatch {
                        key: key.clone(),
                        requirement_id: req.id,
                        effect_type: req.effect_type.clone(),
                    });
                }
            }
            let outcome = match handler {
                Some(h) => h.handle(&req.effect_type, &req.params, &frozen).await,
                None => host.inner.unregistered.handle(&req.effect_type, &req.params, &frozen).await,
            };
            let patches = match outcome {
                Ok(patches) => patches,
                Err(err) => {
                    tracing::warn!(effect_type = %req.effect_type, error = %err, "effect handler failed");
                    let mut executions = host.inner.executions.lock();
                    if let Some(exec) = executions.get_mut(&key) {
                        exec.trace.push(TraceEvent::EffectFulfillError {
                            key: key.clone(),
                            requirement_id: req.id,
                        });
                    }
                    Vec::new()
                }
            };
            host.submit(
                key,
                Job::FulfillEffect {
                    requirement_id: req.id,
                    patches,
                },
            )
            .await;
        });
    }

    fn handle_fulfill(&self, key: &ExecutionKey, requirement_id: RequirementId, patches: Vec<Patch>) {
        let mut executions = self.inner.executions.lock();
        let Some(exec) = executions.get_mut(key) else { return };

        if !exec.snapshot.system.pending_requirements.contains(&requirement_id) {
            exec.trace.push(TraceEvent::EffectFulfillDrop {
                key: key.clone(),
                requirement_id,
            });
            return;
        }

        let seed = intent_core::hash_hex(&requirement_id);
        let clock = intent_core::EvalClock::new(self.inner.clock.now_millis(), crate::clock::derive_random_seed(&seed));
        exec.snapshot = intent_core::engine::apply(&self.inner.schema, &exec.snapshot, &patches, &clock);
        exec.snapshot.system.pending_requirements.retain(|id| id != &requirement_id);
        let _ = exec.watch_tx.send(exec.snapshot.clone());
        exec.dispatched.remove(&requirement_id);
        exec.trace.push(TraceEvent::EffectFulfillApply {
            key: key.clone(),
            requirement_id,
        });
        exec.trace.push(TraceEvent::RequirementClear {
            key: key.clone(),
            requirement_id,
        });

        if exec.snapshot.system.pending_requirements.is_empty() {
            if let Some(intent) = exec.current_intent.clone() {
                exec.mailbox.push(Job::ContinueCompute {
                    intent_id: intent.intent_id.clone(),
                });
                exec.trace.push(TraceEvent::ContinueEnqueue {
                    key: key.clone(),
                    intent_id: intent.intent_id,
                });
            }
        }
    }

    fn handle_apply_patches(&self, key: &ExecutionKey, patches: Vec<Patch>, source: &str) {
        let mut executions = self.inner.executions.lock();
        let Some(exec) = executions.get_mut(key) else { return };
        let seed = format!("apply-patches:{source}");
        let clock = intent_core::EvalClock::new(self.inner.clock.now_millis(), crate::clock::derive_random_seed(&seed));
        exec.snapshot = intent_core::engine::apply(&self.inner.schema, &exec.snapshot, &patches, &clock);
        let _ = exec.watch_tx.send(exec.snapshot.clone());
        exec.trace.push(TraceEvent::CoreApply {
            key: key.clone(),
            version: exec.snapshot.meta.version,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use async_trait::async_trait;
    use intent_core::value::{Object, Value};
    use intent_core::{ActionSpec, ErrorValue, FieldSpec, FlowNode, Patch, PatchOp, Snapshot};

    use super::*;
    use crate::clock::FixedClock;

    fn schema_with(action: &str, flow: FlowNode) -> DomainSchema {
        let mut actions = BTreeMap::new();
        actions.insert(action.to_owned(), ActionSpec { flow, available: None });
        let mut fields = BTreeMap::new();
        fields.insert("count".to_owned(), FieldSpec::Number);
        fields.insert("result".to_owned(), FieldSpec::Number);
        DomainSchema {
            id: "task-list".to_owned(),
            version: 1,
            hash: [11u8; 32],
            state_fields: fields,
            computed_fields: BTreeMap::new(),
            actions,
        }
    }

    struct EchoHandler;

    #[async_trait]
    impl EffectHandler for EchoHandler {
        async fn handle(
            &self,
            _effect_type: &str,
            _params: &BTreeMap<String, Value>,
            _ctx: &FrozenContext,
        ) -> Result<Vec<Patch>, ErrorValue> {
            Ok(vec![Patch::set("data.result", Value::Num(1.0))])
        }
    }

    #[tokio::test]
    async fn start_intent_completes_synchronously_with_no_effects() {
        let flow = FlowNode::Patch {
            op: PatchOp::Set,
            path: "data.count".to_owned(),
            value: Some(intent_core::ExprNode::Literal(Value::Num(1.0))),
        };
        let schema = schema_with("createTask", flow);
        let host = Host::new(schema.clone(), Box::new(FixedClock(0)), HostConfig::default());
        let key = ExecutionKey::new("exec-1");
        host.start_execution(key.clone(), Snapshot::genesis(Object::new(), schema.hash, 0, "seed"));
        host.submit(
            key.clone(),
            Job::StartIntent {
                intent: Intent::new("createTask", Object::new(), "intent-1"),
            },
        )
        .await;
        tokio::task::yield_now().await;
        let snap = host.snapshot(&key).expect("execution exists");
        assert_eq!(snap.data.get("count"), Some(&Value::Num(1.0)));
    }

    #[tokio::test]
    async fn pending_effect_resolves_through_fulfillment() {
        let mut params = BTreeMap::new();
        params.insert(
            "kind".to_owned(),
            intent_core::ExprNode::Literal(Value::Str("notify".to_owned())),
        );
        let flow = FlowNode::Seq(vec![
            FlowNode::Effect {
                effect_type: "notify".to_owned(),
                params,
            },
            FlowNode::Halt { reason: None },
        ]);
        let schema = schema_with("createTask", flow);
        let host = Host::new(schema.clone(), Box::new(FixedClock(0)), HostConfig::default());
        host.register_handler("notify", Arc::new(EchoHandler));
        let key = ExecutionKey::new("exec-2");
        host.start_execution(key.clone(), Snapshot::genesis(Object::new(), schema.hash, 0, "seed"));
        host.submit(
            key.clone(),
            Job::StartIntent {
                intent: Intent::new("createTask", Object::new(), "intent-2"),
            },
        )
        .await;

        for _ in 0..20 {
            tokio::task::yield_now().await;
            if host
                .snapshot(&key)
                .is_some_and(|s| s.data.get("result") == Some(&Value::Num(1.0)))
            {
                break;
            }
        }
        let snap = host.snapshot(&key).expect("execution exists");
        assert_eq!(snap.data.get("result"), Some(&Value::Num(1.0)));
        assert!(snap.system.pending_requirements.is_empty());
    }

    #[tokio::test]
    async fn watchers_observe_every_snapshot_change() {
        let flow = FlowNode::Patch {
            op: PatchOp::Set,
            path: "data.count".to_owned(),
            value: Some(intent_core::ExprNode::Literal(Value::Num(1.0))),
        };
        let schema = schema_with("createTask", flow);
        let host = Host::new(schema.clone(), Box::new(FixedClock(0)), HostConfig::default());
        let key = ExecutionKey::new("exec-3");
        host.start_execution(key.clone(), Snapshot::genesis(Object::new(), schema.hash, 0, "seed"));
        let mut rx = host.watch(&key).expect("known key has a watcher");
        assert_eq!(rx.borrow().meta.version, 0);

        host.submit(
            key.clone(),
            Job::StartIntent {
                intent: Intent::new("createTask", Object::new(), "intent-3"),
            },
        )
        .await;

        rx.changed().await.expect("sender still alive");
        assert_eq!(rx.borrow().data.get("count"), Some(&Value::Num(1.0)));
    }
}
