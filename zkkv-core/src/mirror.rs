//! In-memory copy of the authenticated maps, rebuilt from events.

use std::collections::HashMap;

use tracing::{debug, warn};
use zkkv_common::{EventStore, MerkleMap, Scalar, StoreMaps};

/// Result of folding one `store:set` into the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorOutcome {
    Applied,
    /// The map was not at the event's `root0`; nothing was applied.
    BaseMismatch { local: Scalar },
    /// The write was applied but produced a root other than `root1`.
    ResultMismatch { local: Scalar },
}

impl MirrorOutcome {
    pub fn is_divergent(&self) -> bool {
        !matches!(self, MirrorOutcome::Applied)
    }
}

#[derive(Debug, Clone)]
pub struct Mirror {
    maps: StoreMaps,
    divergence: HashMap<Scalar, u32>,
}

impl Mirror {
    pub fn new(manager_id: Scalar) -> Self {
        Self {
            maps: StoreMaps::new(manager_id),
            divergence: HashMap::new(),
        }
    }

    pub fn maps(&self) -> &StoreMaps {
        &self.maps
    }

    pub fn manager_id(&self) -> Scalar {
        self.maps.manager_id()
    }

    pub fn manager_root(&self) -> Scalar {
        self.maps.manager_root()
    }

    pub fn root_of(&self, id: &Scalar) -> Option<Scalar> {
        self.maps.map(id).map(MerkleMap::root)
    }

    /// Consecutive divergent events seen for a map.
    pub fn divergence(&self, id: &Scalar) -> u32 {
        self.divergence.get(id).copied().unwrap_or(0)
    }

    /// Makes sure a map exists for `id`.
    pub fn track(&mut self, id: Scalar) {
        self.maps.map_mut(id);
    }

    pub fn apply_set(&mut self, event: &EventStore) -> MirrorOutcome {
        let map = self.maps.map_mut(event.id);
        let local = map.root();
        // Folded before an interrupted sync; applying it again is a no-op.
        if local == event.root1 && local != event.root0 && map.get(&event.key) == event.value {
            debug!("store:set on {} already applied", event.id);
            return MirrorOutcome::Applied;
        }
        let outcome = if local != event.root0 {
            MirrorOutcome::BaseMismatch { local }
        } else {
            map.set(event.key, event.value);
            if map.root() == event.root1 {
                MirrorOutcome::Applied
            } else {
                MirrorOutcome::ResultMismatch { local: map.root() }
            }
        };

        if outcome.is_divergent() {
            let count = self.divergence.entry(event.id).or_insert(0);
            *count += 1;
            warn!(
                "mirror of {} diverged ({} in a row): {:?}, event {} -> {}",
                event.id, count, outcome, event.root0, event.root1
            );
        } else {
            self.divergence.remove(&event.id);
        }
        outcome
    }

    /// Writes a settled value and propagates the store root to the manager.
    pub fn settle(&mut self, store_id: Scalar, key: Scalar, value: Scalar) -> Scalar {
        self.maps.set_data(store_id, key, value)
    }

    /// Replaces a map with one rebuilt from persisted entries.
    pub fn rebuild(&mut self, id: Scalar, entries: impl IntoIterator<Item = (Scalar, Scalar)>) {
        let map = MerkleMap::from_entries(entries);
        debug!("rebuilt map {} with {} entries, root {}", id, map.len(), map.root());
        self.maps.insert_store_map(id, map);
        self.divergence.remove(&id);
    }
}
