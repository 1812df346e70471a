// SPDX-License-Identifier: Apache-2.0
//! The content-addressed world graph (§4.4).
//!
//! A [`World`] is a snapshot's identity in the graph: `{worldId, schemaHash,
//! snapshotHash, createdAt, createdBy}`. Worlds reference their parent only
//! by id — [`WorldStore`] is the single place that resolves that reference,
//! so there is no aliasing pointer between worlds, only lookups through the
//! store. The store is append-only and safe to share behind a shared
//! reference: internal mutation goes through a `parking_lot::Mutex`, the
//! same lock-protected-shared-state shape used throughout this workspace.

use std::collections::HashMap;

use intent_core::value::{Object, Value};
use intent_core::Hash;
use parking_lot::Mutex;

use crate::delta::WorldDelta;

/// A world's identity in the content-addressed graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct World {
    /// Content-derived id: `hash(schemaHash, snapshotHash, createdBy)`.
    pub world_id: Hash,
    /// The schema this world's snapshot was computed against.
    pub schema_hash: Hash,
    /// `Snapshot::snapshot_hash()` of this world's canonical data.
    pub snapshot_hash: Hash,
    /// When this world was created.
    pub created_at: i64,
    /// The proposal whose execution produced this world, if any (absent
    /// for a genesis world).
    pub created_by: Option<Hash>,
}

impl World {
    /// Builds a world, deriving its id from its content.
    #[must_use]
    pub fn new(schema_hash: Hash, snapshot_hash: Hash, created_at: i64, created_by: Option<Hash>) -> Self {
        let world_id = world_id(&schema_hash, &snapshot_hash, created_by.as_ref());
        Self {
            world_id,
            schema_hash,
            snapshot_hash,
            created_at,
            created_by,
        }
    }
}

/// Derives a world's id. Domain-separated so world ids never collide with
/// requirement ids or snapshot hashes computed over similarly-shaped input.
#[must_use]
pub fn world_id(schema_hash: &Hash, snapshot_hash: &Hash, created_by: Option<&Hash>) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"intent-world:world:v1");
    hasher.update(schema_hash);
    hasher.update(snapshot_hash);
    match created_by {
        Some(id) => {
            hasher.update(b"\x01");
            hasher.update(id);
        }
        None => {
            hasher.update(b"\x00");
        }
    }
    *hasher.finalize().as_bytes()
}

struct Entry {
    world: World,
    delta: Option<WorldDelta>,
    materialized: Option<Object>,
}

/// Append-only store of `{world, delta}` edges, with horizon-based
/// restoration: a materialized entry caches a full canonical snapshot so
/// restoring any descendant only has to fold the deltas back to the
/// nearest horizon, not all the way to genesis.
#[derive(Default)]
pub struct WorldStore {
    entries: Mutex<HashMap<Hash, Entry>>,
}

impl WorldStore {
    /// Builds an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a horizon world: one whose full canonical snapshot is cached
    /// directly rather than reconstructed from a delta. Every store needs
    /// at least one (its genesis world).
    pub fn store_horizon(&self, world: World, canonical_snapshot: Object) {
        self.entries.lock().insert(
            world.world_id,
            Entry {
                world,
                delta: None,
                materialized: Some(canonical_snapshot),
            },
        );
    }

    /// Records `world` as the result of applying `delta` to its parent.
    /// `delta.to_world` must equal `world.world_id`.
    pub fn store(&self, world: World, delta: WorldDelta) {
        debug_assert_eq!(world.world_id, delta.to_world, "delta must target the stored world");
        self.entries.lock().insert(
            world.world_id,
            Entry {
                world,
                delta: Some(delta),
                materialized: None,
            },
        );
    }

    /// Looks up a world's metadata by id.
    #[must_use]
    pub fn get(&self, world_id: &Hash) -> Option<World> {
        self.entries.lock().get(world_id).map(|e| e.world.clone())
    }

    /// Reconstructs `world_id`'s canonical snapshot by walking parent links
    /// back to the nearest horizon and folding deltas forward. Returns
    /// `None` if `world_id` is unknown or the chain is broken.
    #[must_use]
    pub fn restore(&self, world_id: Hash) -> Option<Object> {
        let entries = self.entries.lock();
        let mut chain = Vec::new();
        let mut current = world_id;
        let base = loop {
            let entry = entries.get(&current)?;
            if let Some(snapshot) = &entry.materialized {
                break snapshot.clone();
            }
            let delta = entry.delta.as_ref()?;
            chain.push(delta.patches.clone());
            current = delta.from_world;
        };
        drop(entries);
        if chain.is_empty() {
            return Some(base);
        }
        // Delta patches are rooted at `data.*` (`generate_delta` seeds that
        // prefix), but `base` is the bare canonical object — wrap it under
        // `data` before folding and unwrap afterward.
        let mut wrapped = Object::new();
        wrapped.insert("data".to_owned(), Value::Object(base));
        let mut folded = chain.into_iter().rev().fold(wrapped, apply_patches);
        match folded.remove("data") {
            Some(Value::Object(data)) => Some(data),
            _ => Some(Object::new()),
        }
    }
}

fn apply_patches(root_fields: Object, patches: Vec<intent_core::Patch>) -> Object {
    use intent_core::path::{merge_path, set_path, unset_path};
    use intent_core::PatchOp;

    let mut root = Value::Object(root_fields);
    for patch in patches {
        let _ = match patch.op {
            PatchOp::Set => set_path(&mut root, &patch.path, patch.value.unwrap_or(Value::Null)),
            PatchOp::Unset => unset_path(&mut root, &patch.path),
            PatchOp::Merge => merge_path(&mut root, &patch.path, patch.value.unwrap_or_else(Value::empty_object)),
        };
    }
    match root {
        Value::Object(o) => o,
        _ => Object::new(),
    }
}

#[cfg(test)]
mod tests {
    use intent_core::value::Value;
    use intent_core::Patch;

    use super::*;

    fn obj(pairs: Vec<(&str, Value)>) -> Object {
        pairs.into_iter().map(|(k, v)| (k.to_owned(), v)).collect()
    }

    #[test]
    fn world_id_is_stable_for_fixed_content() {
        let a = world_id(&[1u8; 32], &[2u8; 32], None);
        let b = world_id(&[1u8; 32], &[2u8; 32], None);
        assert_eq!(a, b);
    }

    #[test]
    fn world_id_differs_when_created_by_differs() {
        let a = world_id(&[1u8; 32], &[2u8; 32], None);
        let b = world_id(&[1u8; 32], &[2u8; 32], Some(&[3u8; 32]));
        assert_ne!(a, b);
    }

    #[test]
    fn restore_returns_horizon_directly() {
        let store = WorldStore::new();
        let genesis_data = obj(vec![("count", Value::Num(0.0))]);
        let genesis = World::new([0u8; 32], [9u8; 32], 0, None);
        store.store_horizon(genesis.clone(), genesis_data.clone());
        assert_eq!(store.restore(genesis.world_id), Some(genesis_data));
    }

    #[test]
    fn restore_folds_a_chain_of_deltas() {
        let store = WorldStore::new();
        let genesis_data = obj(vec![("count", Value::Num(0.0))]);
        let genesis = World::new([0u8; 32], [1u8; 32], 0, None);
        store.store_horizon(genesis.clone(), genesis_data);

        let w1 = World::new([0u8; 32], [2u8; 32], 1, None);
        store.store(
            w1.clone(),
            WorldDelta {
                from_world: genesis.world_id,
                to_world: w1.world_id,
                patches: vec![Patch::set("data.count", Value::Num(1.0))],
                created_at: 1,
            },
        );

        let w2 = World::new([0u8; 32], [3u8; 32], 2, None);
        store.store(
            w2.clone(),
            WorldDelta {
                from_world: w1.world_id,
                to_world: w2.world_id,
                patches: vec![Patch::set("data.count", Value::Num(2.0))],
                created_at: 2,
            },
        );

        let restored = store.restore(w2.world_id).expect("chain resolves");
        assert_eq!(restored.get("count"), Some(&Value::Num(2.0)));
    }

    #[test]
    fn restore_of_unknown_world_is_none() {
        let store = WorldStore::new();
        assert_eq!(store.restore([42u8; 32]), None);
    }
}
