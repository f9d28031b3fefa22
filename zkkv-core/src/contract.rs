//! The store state machine holding the manager commitment.
//!
//! Every operation reads the live commitment, checks the caller's witness
//! against it and, on success, moves it to exactly one new value while
//! appending its events to the ledger, all under one write lock.
//! Settlement verifies the rollup proof with the verifier fixed at deploy,
//! outside the lock, and then moves the commitment with a compare-and-swap.

use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use tracing::{info, warn};
use zkkv_common::{
    EventStore, EventStoreCommit, EventStorePending, MerkleMapWitness, Record, Scalar,
    StoreEvent, VerifyingKeyDigest, EMPTY,
};
use zkkv_script::{RollupProof, RollupVerifier};

use crate::error::ContractError;
use crate::ledger::Ledger;
use crate::state::ContractState;

/// The rollup verifier a contract is deployed with.
pub type SharedVerifier = Arc<dyn RollupVerifier + Send + Sync>;

pub struct ZkkvContract {
    state: RwLock<ContractState>,
    verifier: SharedVerifier,
    verifying_key: VerifyingKeyDigest,
    ledger: Arc<Ledger>,
}

fn check_witness_key(witness: &MerkleMapWitness, expected: Scalar) -> Result<(), ContractError> {
    let actual = witness.key();
    if actual != expected {
        return Err(ContractError::WitnessKeyMismatch { expected, actual });
    }
    Ok(())
}

/// Roots before and after a two-level write.
struct TwoLevelRoots {
    store_root0: Scalar,
    manager_root0: Scalar,
    store_root1: Scalar,
    manager_root1: Scalar,
}

impl ZkkvContract {
    /// Initializes the manager store and announces it on the ledger.
    /// Settlement proofs are only ever checked against `verifier`.
    pub fn deploy(
        store_identifier: Scalar,
        store_commitment: Scalar,
        verifier: SharedVerifier,
        ledger: Arc<Ledger>,
    ) -> Self {
        let verifying_key = verifier.verifying_key();
        let height = ledger.append_block(vec![StoreEvent::New(EventStore::created(
            store_identifier,
            store_commitment,
        ))]);
        info!(
            "deployed manager store {} at {} (block {})",
            store_identifier, store_commitment, height
        );
        Self {
            state: RwLock::new(ContractState::new(store_identifier, store_commitment)),
            verifier,
            verifying_key,
            ledger,
        }
    }

    pub fn state(&self) -> ContractState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn store_commitment(&self) -> Scalar {
        self.state().store_commitment.get()
    }

    pub fn store_identifier(&self) -> Scalar {
        self.state().store_identifier
    }

    pub fn verifying_key(&self) -> VerifyingKeyDigest {
        self.verifying_key
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    fn write(&self) -> RwLockWriteGuard<'_, ContractState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a store to the manager: `record.key` is the store identifier and
    /// `record.value` its root. The witness must prove the key is absent.
    pub fn add_store(
        &self,
        record: &Record,
        witness_manager: &MerkleMapWitness,
    ) -> Result<Scalar, ContractError> {
        check_witness_key(witness_manager, record.key)?;

        let mut state = self.write();
        let commitment = state.store_commitment.get();
        let (root0, _) = witness_manager.compute_root_and_key(EMPTY);
        if root0 != commitment {
            return Err(ContractError::StoreAlreadyAdded);
        }

        let (root1, _) = witness_manager.compute_root_and_key(record.value);
        state
            .store_commitment
            .compare_and_swap(commitment, root1)
            .map_err(|_| ContractError::StoreAlreadyAdded)?;

        self.ledger.append_block(vec![
            StoreEvent::Set(EventStore {
                id: state.store_identifier,
                root0,
                root1,
                key: record.key,
                value: record.value,
                meta: record.meta,
            }),
            StoreEvent::New(EventStore::created(record.key, record.value)),
        ]);
        info!("added store {}", record.key);
        Ok(root1)
    }

    /// Replaces the root of a store already in the manager.
    pub fn set_store(
        &self,
        record0: &Record,
        record1: &Record,
        witness_manager: &MerkleMapWitness,
    ) -> Result<Scalar, ContractError> {
        if record0.key != record1.key {
            return Err(ContractError::StoreKeysMismatch);
        }
        check_witness_key(witness_manager, record0.key)?;

        let mut state = self.write();
        let commitment = state.store_commitment.get();
        let (root0, _) = witness_manager.compute_root_and_key(record0.value);
        if root0 != commitment {
            return Err(ContractError::StoreNotAdded);
        }

        let (root1, _) = witness_manager.compute_root_and_key(record1.value);
        state
            .store_commitment
            .compare_and_swap(commitment, root1)
            .map_err(|_| ContractError::StoreNotAdded)?;

        self.ledger.append_block(vec![StoreEvent::Set(EventStore {
            id: state.store_identifier,
            root0,
            root1,
            key: record1.key,
            value: record1.value,
            meta: record1.meta,
        })]);
        info!("set store {}", record1.key);
        Ok(root1)
    }

    fn check_data_keys(data0: &Record, data1: &Record) -> Result<(), ContractError> {
        if data0.key != data1.key {
            return Err(ContractError::StoreDataKeysMismatch);
        }
        if data0.store.identifier != data1.store.identifier {
            return Err(ContractError::StoreKeysMismatch);
        }
        Ok(())
    }

    fn two_level_roots(
        data0: &Record,
        data1: &Record,
        witness_store: &MerkleMapWitness,
        witness_manager: &MerkleMapWitness,
        commitment: Scalar,
    ) -> Result<TwoLevelRoots, ContractError> {
        check_witness_key(witness_store, data1.key)?;
        check_witness_key(witness_manager, data1.store.identifier)?;

        let (store_root0, _) = witness_store.compute_root_and_key(data0.value);
        let (manager_root0, _) = witness_manager.compute_root_and_key(store_root0);
        if manager_root0 != commitment {
            return Err(ContractError::StoreDataAssertion);
        }

        let (store_root1, _) = witness_store.compute_root_and_key(data1.value);
        let (manager_root1, _) = witness_manager.compute_root_and_key(store_root1);
        Ok(TwoLevelRoots {
            store_root0,
            manager_root0,
            store_root1,
            manager_root1,
        })
    }

    /// Writes `data1.value` at `(store, key)`; `data0.value` must be the
    /// current value, `EMPTY` for a new key. Writing `EMPTY` deletes.
    pub fn set_store_data(
        &self,
        data0: &Record,
        data1: &Record,
        witness_store: &MerkleMapWitness,
        witness_manager: &MerkleMapWitness,
    ) -> Result<Scalar, ContractError> {
        Self::check_data_keys(data0, data1)?;

        let mut state = self.write();
        let commitment = state.store_commitment.get();
        let roots =
            Self::two_level_roots(data0, data1, witness_store, witness_manager, commitment)?;
        state
            .store_commitment
            .compare_and_swap(commitment, roots.manager_root1)
            .map_err(|_| ContractError::StoreDataAssertion)?;

        let store_id = data1.store.identifier;
        self.ledger.append_block(vec![
            StoreEvent::Set(EventStore {
                id: store_id,
                root0: roots.store_root0,
                root1: roots.store_root1,
                key: data1.key,
                value: data1.value,
                meta: data1.meta,
            }),
            StoreEvent::Set(EventStore {
                id: state.store_identifier,
                root0: roots.manager_root0,
                root1: roots.manager_root1,
                key: store_id,
                value: roots.store_root1,
                ..Default::default()
            }),
        ]);
        Ok(roots.manager_root1)
    }

    /// Same checks as [`ZkkvContract::set_store_data`] but leaves the
    /// commitment alone and records the write as pending settlement.
    pub fn set_store_data_concurrent(
        &self,
        data0: &Record,
        data1: &Record,
        witness_store: &MerkleMapWitness,
        witness_manager: &MerkleMapWitness,
    ) -> Result<Scalar, ContractError> {
        Self::check_data_keys(data0, data1)?;

        let state = self.write();
        let commitment = state.store_commitment.get();
        Self::two_level_roots(data0, data1, witness_store, witness_manager, commitment)?;

        self.ledger
            .append_block(vec![StoreEvent::Pending(EventStorePending {
                commitment_pending: commitment,
                settlement_checksum: data1.checksum(),
                data0: *data0,
                data1: *data1,
            })]);
        Ok(commitment)
    }

    /// Settles a rollup proof: moves the commitment from `proof.root0` to
    /// `proof.root1` in one step.
    pub fn commit_pending_transformations(
        &self,
        proof: &RollupProof,
    ) -> Result<Scalar, ContractError> {
        let commitment = self.store_commitment();
        if proof.root0() != commitment {
            return Err(ContractError::StaleBase {
                commitment,
                proof_root0: proof.root0(),
            });
        }
        if proof.vkey() != self.verifying_key {
            return Err(ContractError::ForeignVerifyingKey {
                expected: self.verifying_key,
                actual: proof.vkey(),
            });
        }
        self.verifier
            .verify(proof)
            .map_err(ContractError::VerificationFailure)?;

        let mut state = self.write();
        if let Err(moved) = state
            .store_commitment
            .compare_and_swap(proof.root0(), proof.root1())
        {
            warn!("commitment moved to {} while verifying settlement", moved);
            return Err(ContractError::StaleBase {
                commitment: moved,
                proof_root0: proof.root0(),
            });
        }

        self.ledger
            .append_block(vec![StoreEvent::Commit(EventStoreCommit {
                commitment_pending: proof.root0(),
                commitment_settled: proof.root1(),
            })]);
        info!("settled {} -> {}", proof.root0(), proof.root1());
        Ok(proof.root1())
    }
}
