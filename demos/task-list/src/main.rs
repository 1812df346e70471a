// SPDX-License-Identifier: Apache-2.0
//! End-to-end walk through the `task-list` schema: two `createTask`
//! intents, a soft `deleteTask`, and a `notifyAssignee` action that
//! exercises the compute→effect→apply loop, all driven through a
//! [`Host`] and observed through a [`Bridge`]. The resulting snapshot is
//! then committed to a [`WorldStore`] behind an auto-approving
//! [`ProposalQueue`], mirroring how an outer caller would move an intent
//! from submission to a recorded world.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use intent_core::value::{Object, Value};
use intent_core::{ErrorValue, Intent, Patch, Snapshot};
use intent_host::{EffectContext, EffectHandler, ExecutionKey, Host, HostConfig, Job, SystemClock};
use intent_world::{AuthorityOutcome, AutoApprove, ProposalQueue, TransitionOpts};
use intent_world::{generate_delta, world_id, AuthorityHandler, Proposal, ProposalStatus, World, WorldDelta, WorldStore};
use tracing::info;

mod schema;

struct NotifyHandler;

#[async_trait]
impl EffectHandler for NotifyHandler {
    async fn handle(
        &self,
        _effect_type: &str,
        params: &BTreeMap<String, Value>,
        _ctx: &EffectContext,
    ) -> Result<Vec<Patch>, ErrorValue> {
        let task_id = params.get("taskId").map(Value::to_string_value).unwrap_or_default();
        info!(task_id, "dispatched notify effect");
        Ok(vec![
            Patch::set("data.response", Value::Str(format!("notified:{task_id}"))),
            Patch::set("data.loading", Value::Bool(false)),
        ])
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let schema = schema::build();
    let host = Host::new(schema.clone(), Box::new(SystemClock), HostConfig::default());
    host.register_handler("notify", Arc::new(NotifyHandler));

    let key = ExecutionKey::new("demo-exec-1");
    let genesis = Snapshot::genesis(Object::new(), schema.hash, 0, "genesis-seed");
    host.start_execution(key.clone(), genesis.clone());

    dispatch(&host, &key, "createTask", input([("id", "t1"), ("title", "write spec")]), "intent-create-1").await?;
    dispatch(&host, &key, "createTask", input([("id", "t2"), ("title", "ship it")]), "intent-create-2").await?;
    dispatch(&host, &key, "deleteTask", input([("id", "t1")]), "intent-delete-1").await?;
    dispatch(&host, &key, "notifyAssignee", input([("taskId", "t2")]), "intent-notify-1").await?;

    let terminal = wait_for_idle(&host, &key).await.context("host never settled")?;
    info!(version = terminal.meta.version, "demo sequence settled");

    let world_store = WorldStore::new();
    let genesis_world = World::new(schema.hash, genesis.snapshot_hash(), genesis.meta.timestamp, None);
    world_store.store_horizon(genesis_world.clone(), genesis.canonical_data());

    let proposal_queue = ProposalQueue::new();
    let authority = AutoApprove;
    let proposal = proposal_queue.submit(Proposal::new(
        "demo-actor",
        Intent::new("createTask", Object::new(), "intent-create-1"),
        genesis_world.world_id,
        terminal.meta.timestamp,
    ));
    proposal_queue
        .transition(&proposal.proposal_id, ProposalStatus::Evaluating, TransitionOpts::default())
        .context("submitted -> evaluating")?;
    let decision = authority.decide(&proposal, &genesis.canonical_data()).await;
    let decided = match decision.status {
        AuthorityOutcome::Approved => proposal_queue.transition(
            &proposal.proposal_id,
            ProposalStatus::Approved,
            TransitionOpts {
                decision_id: decision.decision_id.clone(),
                ..Default::default()
            },
        ),
        AuthorityOutcome::Rejected => proposal_queue.transition(
            &proposal.proposal_id,
            ProposalStatus::Rejected,
            TransitionOpts {
                decision_id: decision.decision_id.clone(),
                ..Default::default()
            },
        ),
        AuthorityOutcome::Pending => unreachable!("AutoApprove never returns Pending"),
    }
    .context("evaluating -> decided")?;
    proposal_queue
        .transition(&decided.proposal_id, ProposalStatus::Executing, TransitionOpts::default())
        .context("approved -> executing")?;

    let patches = generate_delta(&genesis.canonical_data(), &terminal.canonical_data());
    let terminal_world = World::new(schema.hash, terminal.snapshot_hash(), terminal.meta.timestamp, Some(proposal.proposal_id));
    world_store.store(
        terminal_world.clone(),
        WorldDelta {
            from_world: genesis_world.world_id,
            to_world: terminal_world.world_id,
            patches,
            created_at: terminal.meta.timestamp,
        },
    );
    proposal_queue
        .transition(
            &decided.proposal_id,
            ProposalStatus::Completed,
            TransitionOpts {
                result_world: Some(terminal_world.world_id),
                ..Default::default()
            },
        )
        .context("executing -> completed")?;

    let restored = world_store.restore(terminal_world.world_id).context("restore terminal world")?;
    info!(
        world_id = %intent_core::hash_hex(&terminal_world.world_id),
        tasks = ?restored.get("tasks"),
        "committed demo world"
    );
    assert_eq!(
        world_id(&schema.hash, &terminal.snapshot_hash(), Some(&proposal.proposal_id)),
        terminal_world.world_id
    );

    Ok(())
}

async fn dispatch(host: &Host, key: &ExecutionKey, action: &str, input: Object, intent_id: &str) -> Result<()> {
    host.submit(
        key.clone(),
        Job::StartIntent {
            intent: Intent::new(action, input, intent_id),
        },
    )
    .await;
    wait_for_idle(host, key).await?;
    Ok(())
}

async fn wait_for_idle(host: &Host, key: &ExecutionKey) -> Result<Snapshot> {
    for _ in 0..200 {
        tokio::task::yield_now().await;
        if let Some(snapshot) = host.snapshot(key) {
            if !matches!(snapshot.system.status, intent_core::SnapshotStatus::Computing | intent_core::SnapshotStatus::Pending)
            {
                return Ok(snapshot);
            }
        }
    }
    host.snapshot(key).context("execution key vanished while waiting")
}

fn input(pairs: impl IntoIterator<Item = (&'static str, &'static str)>) -> Object {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_owned(), Value::Str(v.to_owned())))
        .collect()
}
