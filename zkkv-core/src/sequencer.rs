//! Turns queued concurrent writes into one settlement.
//!
//! Pending writes are replayed in ledger order against a working copy of the
//! maps at the base being settled. The first writer of a `(store, key)` path
//! wins; later writers to the same path are skipped and must be resubmitted
//! against the new root.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;
use zkkv_common::{OneStepInput, Scalar, StoreMaps};
use zkkv_script::rollup::prove_chain;
use zkkv_script::validation::MAX_BATCH_SIZE;
use zkkv_script::RollupProver;

use crate::contract::ZkkvContract;
use crate::error::SequencerError;
use crate::indexer::Indexer;
use crate::storage::{PendingTransformation, Storage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    /// `settlement_checksum` does not match `data1`.
    ChecksumMismatch,
    /// `data0` and `data1` address different paths.
    KeyMismatch,
    UnknownStore,
    /// An earlier write in the same batch already wrote this path.
    Conflict,
    /// `data0.value` is not the current value at the path.
    Stale,
    /// The store map does not match its root in the manager.
    Diverged,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipReason::ChecksumMismatch => "checksum mismatch",
            SkipReason::KeyMismatch => "key mismatch",
            SkipReason::UnknownStore => "unknown store",
            SkipReason::Conflict => "conflicting write",
            SkipReason::Stale => "stale value",
            SkipReason::Diverged => "diverged store map",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone)]
pub struct SettlementPlan {
    pub base: Scalar,
    /// One input per included write, in order.
    pub steps: Vec<OneStepInput>,
    pub included: Vec<PendingTransformation>,
    pub skipped: Vec<(Uuid, SkipReason)>,
    /// Valid writes left for a later batch.
    pub deferred: Vec<Uuid>,
}

impl SettlementPlan {
    pub fn root1(&self) -> Scalar {
        self.steps.last().map_or(self.base, |step| step.root1)
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

fn check(
    working: &StoreMaps,
    written: &HashSet<(Scalar, Scalar)>,
    pending: &PendingTransformation,
) -> Result<(), SkipReason> {
    let (data0, data1) = (&pending.data0, &pending.data1);
    if pending.settlement_checksum != data1.checksum() {
        return Err(SkipReason::ChecksumMismatch);
    }
    if data0.key != data1.key || data0.store.identifier != data1.store.identifier {
        return Err(SkipReason::KeyMismatch);
    }

    let store_id = data1.store.identifier;
    if store_id == working.manager_id() || !working.contains_store(&store_id) {
        return Err(SkipReason::UnknownStore);
    }
    if written.contains(&(store_id, data1.key)) {
        return Err(SkipReason::Conflict);
    }
    if working.store(&store_id).commitment != working.manager().get(&store_id) {
        return Err(SkipReason::Diverged);
    }
    if working.get(&store_id, &data1.key) != data0.value {
        return Err(SkipReason::Stale);
    }
    Ok(())
}

/// Selects and orders the writes of the next settlement from `maps`.
///
/// Only writes made against `maps.manager_root()` are considered; at most
/// `max_batch` are included.
pub fn plan_settlement(
    maps: &StoreMaps,
    pending: &[PendingTransformation],
    max_batch: usize,
) -> SettlementPlan {
    let base = maps.manager_root();
    let mut candidates: Vec<&PendingTransformation> = pending
        .iter()
        .filter(|p| p.commitment_pending == base)
        .collect();
    candidates.sort_by_key(|p| p.position());

    let mut working = maps.clone();
    let mut written = HashSet::new();
    let mut plan = SettlementPlan {
        base,
        steps: Vec::new(),
        included: Vec::new(),
        skipped: Vec::new(),
        deferred: Vec::new(),
    };

    for candidate in candidates {
        if let Err(reason) = check(&working, &written, candidate) {
            plan.skipped.push((candidate.id, reason));
            continue;
        }
        if plan.steps.len() >= max_batch {
            plan.deferred.push(candidate.id);
            continue;
        }

        let data1 = &candidate.data1;
        let step = working.apply_set(data1.store.identifier, data1.key, data1.value);
        written.insert((data1.store.identifier, data1.key));
        plan.steps.push(step);
        plan.included.push(candidate.clone());
    }
    plan
}

#[derive(Debug, Clone, Serialize)]
pub struct SettlementReceipt {
    pub batch_id: Uuid,
    pub included: Vec<Uuid>,
    pub skipped: Vec<(Uuid, SkipReason)>,
    pub deferred: Vec<Uuid>,
    pub root0: Scalar,
    pub root1: Scalar,
}

pub struct SettlementProcessor<P> {
    prover: P,
    max_batch: usize,
}

impl<P: RollupProver> SettlementProcessor<P> {
    /// `max_batch` is clamped to `1..=MAX_BATCH_SIZE`.
    pub fn new(prover: P, max_batch: usize) -> Self {
        Self {
            prover,
            max_batch: max_batch.clamp(1, MAX_BATCH_SIZE),
        }
    }

    pub fn prover(&self) -> &P {
        &self.prover
    }

    /// Proves and commits the next batch of pending writes.
    ///
    /// Returns `None` when nothing can be settled, including when the
    /// indexer has not caught up with the live commitment.
    pub fn process_batch<S: Storage>(
        &self,
        contract: &ZkkvContract,
        indexer: &Indexer<S>,
    ) -> Result<Option<SettlementReceipt>, SequencerError> {
        let live = contract.store_commitment();
        if indexer.mirror().manager_root() != live {
            info!("mirror is behind the commitment {}, skipping settlement", live);
            return Ok(None);
        }

        let pending = indexer.pending_for(&live);
        let plan = plan_settlement(indexer.mirror().maps(), &pending, self.max_batch);
        for (id, reason) in &plan.skipped {
            warn!("pending transformation {} skipped: {}", id, reason);
        }
        if plan.is_empty() {
            return Ok(None);
        }

        let batch_id = Uuid::new_v4();
        info!(
            "settling batch {} with {} writes ({} deferred)",
            batch_id,
            plan.steps.len(),
            plan.deferred.len()
        );
        let proof = prove_chain(&self.prover, &plan.steps)?;
        contract.commit_pending_transformations(&proof)?;

        Ok(Some(SettlementReceipt {
            batch_id,
            included: plan.included.iter().map(|p| p.id).collect(),
            skipped: plan.skipped,
            deferred: plan.deferred,
            root0: proof.root0(),
            root1: proof.root1(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use zkkv_common::{MerkleMap, Record};

    struct Fixture {
        maps: StoreMaps,
        stores: [Scalar; 2],
        height: u64,
    }

    impl Fixture {
        fn new() -> Self {
            let mut maps = StoreMaps::new(Scalar::from_label("manager"));
            let stores = [Scalar::from_label("store0"), Scalar::from_label("store1")];
            for id in stores {
                maps.add_store(id, MerkleMap::new());
            }
            Self {
                maps,
                stores,
                height: 0,
            }
        }

        fn pending(&mut self, store: usize, key: u64, value: u64) -> PendingTransformation {
            let store_id = self.stores[store];
            let key = Scalar::from_u64(key);
            let data0 = self.maps.record(&store_id, &key);
            let data1 = Record::init(data0.store, key, Scalar::from_u64(value));
            self.height += 1;
            PendingTransformation {
                id: Uuid::new_v4(),
                commitment_pending: self.maps.manager_root(),
                settlement_checksum: data1.checksum(),
                data0,
                data1,
                block_height: self.height,
                sequence: 0,
                created_at: Utc::now(),
            }
        }
    }

    #[test]
    fn test_plan_chains_roots() {
        let mut fx = Fixture::new();
        let pending = vec![fx.pending(0, 1, 10), fx.pending(1, 1, 20), fx.pending(0, 2, 30)];
        let plan = plan_settlement(&fx.maps, &pending, 100);

        assert_eq!(plan.steps.len(), 3);
        assert!(plan.skipped.is_empty());
        assert_eq!(plan.steps[0].root0, fx.maps.manager_root());
        for pair in plan.steps.windows(2) {
            assert_eq!(pair[0].root1, pair[1].root0);
        }

        let mut expected = fx.maps.clone();
        expected.set_data(fx.stores[0], Scalar::from_u64(1), Scalar::from_u64(10));
        expected.set_data(fx.stores[1], Scalar::from_u64(1), Scalar::from_u64(20));
        expected.set_data(fx.stores[0], Scalar::from_u64(2), Scalar::from_u64(30));
        assert_eq!(plan.root1(), expected.manager_root());
    }

    #[test]
    fn test_first_writer_wins() {
        let mut fx = Fixture::new();
        let first = fx.pending(0, 7, 1);
        let second = fx.pending(0, 7, 2);
        let plan = plan_settlement(&fx.maps, &[second.clone(), first.clone()], 100);

        assert_eq!(plan.included.len(), 1);
        assert_eq!(plan.included[0].id, first.id);
        assert_eq!(plan.skipped, vec![(second.id, SkipReason::Conflict)]);
    }

    #[test]
    fn test_rejects_bad_pending() {
        let mut fx = Fixture::new();
        let mut bad_checksum = fx.pending(0, 1, 1);
        bad_checksum.settlement_checksum = Scalar::ONE;

        let mut stale = fx.pending(0, 2, 1);
        stale.data0.value = Scalar::from_u64(5);
        stale.settlement_checksum = stale.data1.checksum();

        let mut unknown = fx.pending(0, 3, 1);
        unknown.data0.store.identifier = Scalar::from_u64(404);
        unknown.data1.store.identifier = Scalar::from_u64(404);
        unknown.settlement_checksum = unknown.data1.checksum();

        let mut other_base = fx.pending(1, 1, 1);
        other_base.commitment_pending = Scalar::ONE;

        let plan = plan_settlement(
            &fx.maps,
            &[bad_checksum.clone(), stale.clone(), unknown.clone(), other_base],
            100,
        );
        assert!(plan.is_empty());
        assert_eq!(plan.root1(), fx.maps.manager_root());
        assert_eq!(
            plan.skipped,
            vec![
                (bad_checksum.id, SkipReason::ChecksumMismatch),
                (stale.id, SkipReason::Stale),
                (unknown.id, SkipReason::UnknownStore),
            ]
        );
    }

    #[test]
    fn test_max_batch_defers() {
        let mut fx = Fixture::new();
        let pending: Vec<_> = (0..5).map(|i| fx.pending(0, i, i + 1)).collect();
        let plan = plan_settlement(&fx.maps, &pending, 2);
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.deferred, vec![pending[2].id, pending[3].id, pending[4].id]);
    }
}
