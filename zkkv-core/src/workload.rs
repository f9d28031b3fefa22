//! Startup workload exercising every contract operation.
//!
//! The client keeps its own copy of the maps to build witnesses, the way an
//! application holding off-chain data would, and only updates it after an
//! operation succeeds.

use serde::Serialize;
use tracing::{info, warn};
use zkkv_common::{MerkleMap, Record, Scalar, StoreMaps};

use crate::contract::ZkkvContract;
use crate::error::{ContractError, ErrorKind};

/// An operation the workload expected to be rejected.
#[derive(Debug, Clone, Serialize)]
pub struct Rejection {
    pub operation: &'static str,
    pub message: String,
    #[serde(skip)]
    pub kind: ErrorKind,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkloadReport {
    pub stores: Vec<Scalar>,
    pub rejected: Vec<Rejection>,
    /// Concurrent writes submitted for settlement.
    pub pending: usize,
    pub commitment: Scalar,
}

pub fn store_identifier(index: usize) -> Scalar {
    Scalar::from_label(&format!("store{}", index))
}

fn expect_rejection(
    report: &mut WorkloadReport,
    operation: &'static str,
    result: Result<Scalar, ContractError>,
) -> Result<(), ContractError> {
    match result {
        Ok(root) => {
            warn!("{} unexpectedly succeeded with root {}", operation, root);
            Ok(())
        }
        Err(e) => {
            info!("{} rejected: {}", operation, e);
            report.rejected.push(Rejection {
                operation,
                message: e.to_string(),
                kind: e.kind(),
            });
            Ok(())
        }
    }
}

/// Adds `store_count` stores and runs writes against them.
///
/// Expected rejections are collected in the report; any other failure is
/// returned.
pub fn run_workload(
    contract: &ZkkvContract,
    client: &mut StoreMaps,
    store_count: usize,
    recursion_enabled: bool,
) -> Result<WorkloadReport, ContractError> {
    let mut report = WorkloadReport::default();

    for index in 0..store_count {
        let id = store_identifier(index);
        let map = MerkleMap::new();
        let record = Record::init(client.manager_store(), id, map.root());
        contract.add_store(&record, &client.manager_witness(&id))?;
        client.add_store(id, map);
        report.stores.push(id);
    }

    let first = store_identifier(0);
    let duplicate = Record::init(client.manager_store(), first, MerkleMap::empty_root());
    expect_rejection(
        &mut report,
        "add_store",
        contract.add_store(&duplicate, &client.manager_witness(&first)),
    )?;

    // Replace the root of the last store with one holding an entry.
    let last = store_identifier(store_count - 1);
    let mut replaced = MerkleMap::new();
    replaced.set(Scalar::from_u64(100), Scalar::from_u64(100));
    let record0 = client.manager_record(&last);
    let record1 = Record::init(record0.store, last, replaced.root());
    contract.set_store(&record0, &record1, &client.manager_witness(&last))?;
    client.add_store(last, replaced);

    let unknown = Scalar::from_label("!store");
    let mut unknown_map = MerkleMap::new();
    let record0 = Record::init(client.manager_store(), unknown, unknown_map.root());
    unknown_map.set(Scalar::from_u64(100), Scalar::from_u64(100));
    let record1 = Record::init(record0.store, unknown, unknown_map.root());
    expect_rejection(
        &mut report,
        "set_store",
        contract.set_store(&record0, &record1, &client.manager_witness(&unknown)),
    )?;

    let (key, value) = (Scalar::from_u64(222), Scalar::from_u64(999));
    let data0 = client.record(&first, &key);
    let data1 = Record::init(data0.store, key, value);
    let (witness_store, witness_manager) = client.witnesses(&first, &key);
    contract.set_store_data(&data0, &data1, &witness_store, &witness_manager)?;
    client.set_data(first, key, value);

    if recursion_enabled {
        // The last store is left out, its content never went through events.
        // The final two writers race for the same path.
        let writes = (0..store_count - 1)
            .map(|index| (store_identifier(index), 222, 1000 + index as u64))
            .chain([(first, 111, 777), (first, 111, 555)]);
        for (store_id, key, value) in writes {
            let key = Scalar::from_u64(key);
            let data0 = client.record(&store_id, &key);
            let data1 = Record::init(data0.store, key, Scalar::from_u64(value));
            let (witness_store, witness_manager) = client.witnesses(&store_id, &key);
            contract.set_store_data_concurrent(&data0, &data1, &witness_store, &witness_manager)?;
            report.pending += 1;
        }
    }

    report.commitment = contract.store_commitment();
    info!(
        "workload done: {} stores, {} rejected, {} pending, commitment {}",
        report.stores.len(),
        report.rejected.len(),
        report.pending,
        report.commitment
    );
    Ok(report)
}
