use std::sync::Arc;

use zkkv_common::{MerkleMap, Record, Scalar, StoreMaps};
use zkkv_script::NativeProver;

use crate::contract::ZkkvContract;
use crate::error::ContractError;
use crate::ledger::Ledger;

/// A deployed contract plus a client copy of its maps.
pub struct Harness {
    pub ledger: Arc<Ledger>,
    pub contract: ZkkvContract,
    pub client: StoreMaps,
    pub prover: NativeProver,
}

pub fn store_id(index: u64) -> Scalar {
    Scalar::from_label(&format!("store{}", index))
}

impl Harness {
    pub fn deploy() -> Self {
        let ledger = Arc::new(Ledger::new());
        let prover = NativeProver::new();
        let manager_id = Scalar::from_label("zkkv-test");
        let contract = ZkkvContract::deploy(
            manager_id,
            MerkleMap::empty_root(),
            Arc::new(prover.clone()),
            ledger.clone(),
        );
        Self {
            ledger,
            contract,
            client: StoreMaps::new(manager_id),
            prover,
        }
    }

    /// Deploys and adds `count` empty stores.
    pub fn with_stores(count: u64) -> Self {
        let mut harness = Self::deploy();
        for index in 0..count {
            harness.add_store(store_id(index)).unwrap();
        }
        harness
    }

    pub fn add_store(&mut self, id: Scalar) -> Result<Scalar, ContractError> {
        let map = MerkleMap::new();
        let record = Record::init(self.client.manager_store(), id, map.root());
        let root = self
            .contract
            .add_store(&record, &self.client.manager_witness(&id))?;
        self.client.add_store(id, map);
        Ok(root)
    }

    /// `(data0, data1)` for writing `value` at `(store, key)` from the client's view.
    pub fn records(&self, store: Scalar, key: u64, value: u64) -> (Record, Record) {
        let key = Scalar::from_u64(key);
        let data0 = self.client.record(&store, &key);
        let data1 = Record::init(data0.store, key, Scalar::from_u64(value));
        (data0, data1)
    }

    pub fn set_data(&mut self, store: Scalar, key: u64, value: u64) -> Result<Scalar, ContractError> {
        let (data0, data1) = self.records(store, key, value);
        let (ws, wm) = self.client.witnesses(&store, &data1.key);
        let root = self.contract.set_store_data(&data0, &data1, &ws, &wm)?;
        self.client.set_data(store, data1.key, data1.value);
        Ok(root)
    }

    pub fn set_data_concurrent(
        &self,
        store: Scalar,
        key: u64,
        value: u64,
    ) -> Result<Scalar, ContractError> {
        let (data0, data1) = self.records(store, key, value);
        let (ws, wm) = self.client.witnesses(&store, &data1.key);
        self.contract
            .set_store_data_concurrent(&data0, &data1, &ws, &wm)
    }
}
