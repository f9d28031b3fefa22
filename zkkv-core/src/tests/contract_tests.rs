use zkkv_common::{
    MerkleMap, Record, RollupPublicValues, RollupState, Scalar, StoreEvent, StoreMaps, EMPTY,
};
use zkkv_script::rollup::prove_chain;
use zkkv_script::{NativeProver, RollupProof, RollupProver, Seal};

use super::util::{store_id, Harness};
use crate::error::{ContractError, ErrorKind};

#[test]
fn test_add_store_twice() {
    let mut harness = Harness::deploy();
    let before = harness.contract.store_commitment();
    let after = harness.add_store(store_id(0)).unwrap();
    assert_ne!(before, after);
    assert_eq!(after, harness.client.manager_root());

    // Same record, witness now computed against the new root.
    let err = harness.add_store(store_id(0)).unwrap_err();
    assert!(matches!(err, ContractError::StoreAlreadyAdded));
    assert_eq!(err.kind(), ErrorKind::StaleWitness);
    assert_eq!(err.to_string(), "Store already added");
    assert_eq!(harness.contract.store_commitment(), after);
}

#[test]
fn test_add_store_emits_events() {
    let mut harness = Harness::deploy();
    let id = store_id(0);
    harness.add_store(id).unwrap();

    let events = harness.ledger.fetch_events(2, 2);
    assert_eq!(events.len(), 2);
    match (&events[0].event, &events[1].event) {
        (StoreEvent::Set(set), StoreEvent::New(new)) => {
            assert_eq!(set.id, harness.client.manager_id());
            assert_eq!(set.key, id);
            assert_eq!(set.value, MerkleMap::empty_root());
            assert_eq!(set.root1, harness.contract.store_commitment());
            assert_eq!(new.id, id);
            assert_eq!(new.root1, MerkleMap::empty_root());
        }
        other => panic!("unexpected events {:?}", other),
    }
}

#[test]
fn test_witness_for_other_key() {
    let harness = Harness::deploy();
    let record = Record::init(harness.client.manager_store(), store_id(0), Scalar::ONE);
    let witness = harness.client.manager_witness(&store_id(1));
    let err = harness.contract.add_store(&record, &witness).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(harness.ledger.last_height(), 1);
}

#[test]
fn test_set_store() {
    let mut harness = Harness::with_stores(2);
    let id = store_id(1);
    let mut map = MerkleMap::new();
    map.set(Scalar::from_u64(100), Scalar::from_u64(100));

    let record0 = harness.client.manager_record(&id);
    let record1 = Record::init(record0.store, id, map.root());
    let mismatched = Record::init(record0.store, store_id(0), map.root());
    let witness = harness.client.manager_witness(&id);

    let err = harness
        .contract
        .set_store(&record0, &mismatched, &witness)
        .unwrap_err();
    assert_eq!(err.to_string(), "Store keys do not match");

    let root = harness.contract.set_store(&record0, &record1, &witness).unwrap();
    harness.client.add_store(id, map);
    assert_eq!(root, harness.client.manager_root());

    // record0 is no longer the member value.
    let err = harness
        .contract
        .set_store(&record0, &record1, &harness.client.manager_witness(&id))
        .unwrap_err();
    assert!(matches!(err, ContractError::StoreNotAdded));
}

#[test]
fn test_set_store_not_added() {
    let harness = Harness::with_stores(1);
    let unknown = Scalar::from_label("!store");
    let record0 = Record::init(harness.client.manager_store(), unknown, MerkleMap::empty_root());
    let record1 = Record::init(record0.store, unknown, Scalar::from_u64(5));
    let err = harness
        .contract
        .set_store(&record0, &record1, &harness.client.manager_witness(&unknown))
        .unwrap_err();
    assert_eq!(err.to_string(), "Store not added");
}

#[test]
fn test_set_store_data_stale_witness() {
    let mut harness = Harness::with_stores(2);
    let store = store_id(0);
    let base = harness.client.clone();

    harness.set_data(store, 222, 999).unwrap();
    let r1 = harness.contract.store_commitment();

    // A second write prepared against the old root.
    let key = Scalar::from_u64(333);
    let data0 = base.record(&store, &key);
    let data1 = Record::init(data0.store, key, Scalar::from_u64(1));
    let (ws, wm) = base.witnesses(&store, &key);
    let err = harness
        .contract
        .set_store_data(&data0, &data1, &ws, &wm)
        .unwrap_err();
    assert_eq!(err.to_string(), "current StoreData assertion failed");
    assert_eq!(err.kind(), ErrorKind::StaleWitness);
    assert_eq!(harness.contract.store_commitment(), r1);

    // The same write against the current root.
    let r2 = harness.set_data(store, 333, 1).unwrap();
    assert_ne!(r2, r1);
    assert_eq!(r2, harness.client.manager_root());
}

#[test]
fn test_set_store_data_key_checks() {
    let harness = Harness::with_stores(2);
    let (data0, mut data1) = harness.records(store_id(0), 1, 1);
    let (ws, wm) = harness.client.witnesses(&store_id(0), &data1.key);

    data1.key = Scalar::from_u64(2);
    let err = harness
        .contract
        .set_store_data(&data0, &data1, &ws, &wm)
        .unwrap_err();
    assert_eq!(err.to_string(), "StoreData keys do not match");

    let (_, mut data1) = harness.records(store_id(0), 1, 1);
    data1.store.identifier = store_id(1);
    let err = harness
        .contract
        .set_store_data(&data0, &data1, &ws, &wm)
        .unwrap_err();
    assert_eq!(err.to_string(), "Store keys do not match");
}

#[test]
fn test_write_then_delete_restores_root() {
    let mut harness = Harness::with_stores(1);
    let before = harness.contract.store_commitment();
    harness.set_data(store_id(0), 7, 70).unwrap();

    let (data0, data1) = harness.records(store_id(0), 7, 0);
    assert_eq!(data1.value, EMPTY);
    let (ws, wm) = harness.client.witnesses(&store_id(0), &data1.key);
    let root = harness
        .contract
        .set_store_data(&data0, &data1, &ws, &wm)
        .unwrap();
    assert_eq!(root, before);
}

#[test]
fn test_concurrent_leaves_commitment() {
    let harness = Harness::with_stores(2);
    let before = harness.contract.store_commitment();
    let height = harness.ledger.last_height();

    let base = harness.set_data_concurrent(store_id(0), 1, 10).unwrap();
    assert_eq!(base, before);
    assert_eq!(harness.contract.store_commitment(), before);

    let events = harness.ledger.fetch_events(height + 1, height + 1);
    match &events[0].event {
        StoreEvent::Pending(pending) => {
            assert_eq!(pending.commitment_pending, before);
            assert_eq!(pending.settlement_checksum, pending.data1.checksum());
            assert_eq!(pending.data1.value, Scalar::from_u64(10));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

fn settlement_proof(harness: &Harness, writes: &[(u64, u64, u64)]) -> zkkv_script::RollupProof {
    let mut working = harness.client.clone();
    let steps: Vec<_> = writes
        .iter()
        .map(|&(store, key, value)| {
            working.apply_set(store_id(store), Scalar::from_u64(key), Scalar::from_u64(value))
        })
        .collect();
    prove_chain(&harness.prover, &steps).unwrap()
}

#[test]
fn test_commit_settles() {
    let harness = Harness::with_stores(2);
    let proof = settlement_proof(&harness, &[(0, 1, 10), (1, 1, 20)]);
    let root = harness
        .contract
        .commit_pending_transformations(&proof)
        .unwrap();
    assert_eq!(root, proof.root1());
    assert_eq!(harness.contract.store_commitment(), proof.root1());
    assert_eq!(harness.contract.state().store_commitment.version(), 3);

    let last = harness.ledger.fetch_events(harness.ledger.last_height(), u64::MAX);
    match &last[0].event {
        StoreEvent::Commit(commit) => {
            assert_eq!(commit.commitment_pending, proof.root0());
            assert_eq!(commit.commitment_settled, proof.root1());
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn test_commit_stale_base() {
    let mut harness = Harness::with_stores(2);
    let proof = settlement_proof(&harness, &[(0, 1, 10)]);
    harness.set_data(store_id(1), 5, 5).unwrap();
    let live = harness.contract.store_commitment();

    let err = harness
        .contract
        .commit_pending_transformations(&proof)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StaleBase);
    assert_eq!(harness.contract.store_commitment(), live);
}

#[test]
fn test_commit_rejects_bad_proofs() {
    let harness = Harness::with_stores(2);
    let before = harness.contract.store_commitment();

    let foreign = NativeProver::with_key(zkkv_common::VerifyingKeyDigest([7; 8]));
    let steps = vec![harness.client.clone().apply_set(
        store_id(0),
        Scalar::ONE,
        Scalar::ONE,
    )];
    let proof = prove_chain(&foreign, &steps).unwrap();
    let err = harness
        .contract
        .commit_pending_transformations(&proof)
        .unwrap_err();
    assert!(matches!(err, ContractError::ForeignVerifyingKey { .. }));
    assert_eq!(err.kind(), ErrorKind::VerificationFailure);

    let mut tampered = settlement_proof(&harness, &[(0, 1, 10)]);
    tampered.public_values.state.root1 = Scalar::from_u64(42);
    let err = harness
        .contract
        .commit_pending_transformations(&tampered)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::VerificationFailure);
    assert_eq!(harness.contract.store_commitment(), before);
}

#[test]
fn test_commit_rejects_forged_proof() {
    let harness = Harness::with_stores(1);
    let live = harness.contract.store_commitment();

    // Claims the deployed key but carries no evidence for it.
    let forged = RollupProof {
        public_values: RollupPublicValues {
            state: RollupState::new(live, Scalar::from_u64(1337)),
            vkey: harness.contract.verifying_key(),
        },
        seal: Seal::Sp1(vec![]),
    };
    let err = harness
        .contract
        .commit_pending_transformations(&forged)
        .unwrap_err();
    assert!(matches!(err, ContractError::VerificationFailure(_)));
    assert_eq!(err.kind(), ErrorKind::VerificationFailure);

    // A genuine one-step proof whose claimed output was swapped.
    let mut swapped = settlement_proof(&harness, &[(0, 1, 10)]);
    swapped.public_values.state.root1 = Scalar::from_u64(1337);
    assert!(harness
        .contract
        .commit_pending_transformations(&swapped)
        .is_err());

    assert_eq!(harness.contract.store_commitment(), live);
    assert_eq!(harness.contract.state().store_commitment.version(), 1);
}

#[test]
fn test_set_events_replay() {
    let mut harness = Harness::deploy();
    let c0 = harness.contract.store_commitment();
    harness.add_store(store_id(1)).unwrap();
    harness.add_store(store_id(2)).unwrap();
    let c2 = harness.contract.store_commitment();

    let mut replayed = StoreMaps::new(harness.client.manager_id());
    assert_eq!(replayed.manager_root(), c0);
    for event in harness.ledger.fetch_events(1, harness.ledger.last_height()) {
        if let StoreEvent::Set(set) = event.event {
            let map = replayed.map_mut(set.id);
            assert_eq!(map.root(), set.root0);
            map.set(set.key, set.value);
            assert_eq!(map.root(), set.root1);
        }
    }
    assert_eq!(replayed.manager_root(), c2);
}

#[test]
fn test_prover_rejects_stale_step() {
    let harness = Harness::with_stores(1);
    let mut step = harness
        .client
        .clone()
        .apply_set(store_id(0), Scalar::ONE, Scalar::ONE);
    step.value0 = Scalar::from_u64(9);
    assert!(harness.prover.prove_one_step(&step).is_err());
}
