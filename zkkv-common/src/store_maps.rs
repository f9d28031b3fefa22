use std::collections::HashMap;

use crate::field::{Scalar, EMPTY};
use crate::merkle_map::{MerkleMap, MerkleMapWitness};
use crate::rollup::{OneStepInput, StepWitness};
use crate::store::{Record, Store};

/// The two-level map behind a manager commitment: the manager map from store
/// identifier to store root, plus the map of every store.
///
/// Clients use it to prepare witnesses, the indexer keeps one as its mirror
/// and the sequencer plays pending writes forward on a copy.
#[derive(Debug, Clone)]
pub struct StoreMaps {
    manager_id: Scalar,
    manager: MerkleMap,
    stores: HashMap<Scalar, MerkleMap>,
}

impl StoreMaps {
    pub fn new(manager_id: Scalar) -> Self {
        Self {
            manager_id,
            manager: MerkleMap::new(),
            stores: HashMap::new(),
        }
    }

    pub fn manager_id(&self) -> Scalar {
        self.manager_id
    }

    pub fn manager_root(&self) -> Scalar {
        self.manager.root()
    }

    pub fn manager(&self) -> &MerkleMap {
        &self.manager
    }

    /// The manager as a store value.
    pub fn manager_store(&self) -> Store {
        Store::new(self.manager_id, self.manager.root())
    }

    /// Map of `id`, which may be the manager itself.
    pub fn map(&self, id: &Scalar) -> Option<&MerkleMap> {
        if *id == self.manager_id {
            Some(&self.manager)
        } else {
            self.stores.get(id)
        }
    }

    /// Map of `id`, created empty when unknown.
    pub fn map_mut(&mut self, id: Scalar) -> &mut MerkleMap {
        if id == self.manager_id {
            &mut self.manager
        } else {
            self.stores.entry(id).or_default()
        }
    }

    pub fn store_ids(&self) -> impl Iterator<Item = &Scalar> {
        self.stores.keys()
    }

    /// True once `id` holds a non-empty root in the manager map.
    pub fn contains_store(&self, id: &Scalar) -> bool {
        !self.manager.get(id).is_empty()
    }

    /// Replaces the map of a store without touching the manager map.
    pub fn insert_store_map(&mut self, id: Scalar, map: MerkleMap) {
        if id == self.manager_id {
            self.manager = map;
        } else {
            self.stores.insert(id, map);
        }
    }

    /// Registers a store in the manager map under its current root.
    pub fn add_store(&mut self, id: Scalar, map: MerkleMap) -> Store {
        let store = Store::new(id, map.root());
        self.manager.set(id, store.commitment);
        self.stores.insert(id, map);
        store
    }

    pub fn store(&self, id: &Scalar) -> Store {
        let commitment = self
            .stores
            .get(id)
            .map(MerkleMap::root)
            .unwrap_or_else(MerkleMap::empty_root);
        Store::new(*id, commitment)
    }

    pub fn get(&self, store_id: &Scalar, key: &Scalar) -> Scalar {
        self.stores
            .get(store_id)
            .map(|map| map.get(key))
            .unwrap_or(EMPTY)
    }

    /// Current record at `(store_id, key)`.
    pub fn record(&self, store_id: &Scalar, key: &Scalar) -> Record {
        Record::init(self.store(store_id), *key, self.get(store_id, key))
    }

    /// Current entry of `store_id` in the manager map, as a manager record.
    pub fn manager_record(&self, store_id: &Scalar) -> Record {
        Record::init(self.manager_store(), *store_id, self.manager.get(store_id))
    }

    /// `(witness_store, witness_manager)` for a write to `(store_id, key)`.
    pub fn witnesses(&self, store_id: &Scalar, key: &Scalar) -> (MerkleMapWitness, MerkleMapWitness) {
        let witness_store = match self.stores.get(store_id) {
            Some(map) => map.witness(key),
            None => MerkleMap::new().witness(key),
        };
        (witness_store, self.manager.witness(store_id))
    }

    pub fn manager_witness(&self, store_id: &Scalar) -> MerkleMapWitness {
        self.manager.witness(store_id)
    }

    /// Writes a value into a store and propagates the store root to the
    /// manager. Returns the new manager root.
    pub fn set_data(&mut self, store_id: Scalar, key: Scalar, value: Scalar) -> Scalar {
        let map = self.stores.entry(store_id).or_default();
        map.set(key, value);
        let store_root = map.root();
        self.manager.set(store_id, store_root);
        self.manager.root()
    }

    /// Writes a value and returns the one-step input proving it.
    pub fn apply_set(&mut self, store_id: Scalar, key: Scalar, value: Scalar) -> OneStepInput {
        let root0 = self.manager_root();
        let value0 = self.get(&store_id, &key);
        let (witness_store, witness_manager) = self.witnesses(&store_id, &key);
        let root1 = self.set_data(store_id, key, value);
        OneStepInput {
            root0,
            root1,
            key,
            value0,
            value1: value,
            witness: StepWitness::Store {
                store_id,
                witness_store,
                witness_manager,
            },
        }
    }
}
