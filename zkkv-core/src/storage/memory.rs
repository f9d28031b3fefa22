use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;
use zkkv_common::Scalar;

use super::{InstanceRow, PendingTransformation, RecordRow, Storage, StoreRow};
use crate::error::StorageError;

#[derive(Debug, Default)]
struct Tables {
    stores: BTreeMap<Scalar, StoreRow>,
    records: BTreeMap<(Scalar, Scalar), RecordRow>,
    pending: Vec<PendingTransformation>,
    instances: HashMap<String, InstanceRow>,
}

/// Process-local storage for tests and runs without a database.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: RwLock<Tables>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    async fn create_store(&self, row: &StoreRow) -> Result<StoreRow, StorageError> {
        let mut tables = self.tables.write().await;
        Ok(tables.stores.entry(row.id).or_insert_with(|| row.clone()).clone())
    }

    async fn get_store(&self, id: &Scalar) -> Result<Option<StoreRow>, StorageError> {
        Ok(self.tables.read().await.stores.get(id).cloned())
    }

    async fn stores(&self, instance: &str) -> Result<Vec<StoreRow>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables
            .stores
            .values()
            .filter(|s| s.instance == instance)
            .cloned()
            .collect())
    }

    async fn set_store_commitment(
        &self,
        id: &Scalar,
        commitment: &Scalar,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        let store = tables
            .stores
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(format!("store {}", id)))?;
        store.commitment = *commitment;
        store.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_store(&self, id: &Scalar) -> Result<bool, StorageError> {
        let mut tables = self.tables.write().await;
        tables.records.retain(|(store_id, _), _| store_id != id);
        Ok(tables.stores.remove(id).is_some())
    }

    async fn get_record(
        &self,
        store_id: &Scalar,
        key: &Scalar,
    ) -> Result<Option<RecordRow>, StorageError> {
        Ok(self.tables.read().await.records.get(&(*store_id, *key)).cloned())
    }

    async fn set_record(&self, row: &RecordRow) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        if !tables.stores.contains_key(&row.store_id) {
            return Err(StorageError::NotFound(format!("store {}", row.store_id)));
        }
        tables.records.insert((row.store_id, row.key), row.clone());
        Ok(())
    }

    async fn delete_record(&self, store_id: &Scalar, key: &Scalar) -> Result<bool, StorageError> {
        let mut tables = self.tables.write().await;
        Ok(tables.records.remove(&(*store_id, *key)).is_some())
    }

    async fn records(&self, store_id: &Scalar) -> Result<Vec<RecordRow>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables
            .records
            .range((*store_id, Scalar::ZERO)..)
            .take_while(|((id, _), _)| id == store_id)
            .map(|(_, row)| row.clone())
            .collect())
    }

    async fn create_pending(&self, pending: &PendingTransformation) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        if tables.pending.iter().any(|p| p.id == pending.id) {
            return Ok(());
        }
        let at = tables
            .pending
            .partition_point(|p| p.position() <= pending.position());
        tables.pending.insert(at, pending.clone());
        Ok(())
    }

    async fn pending(&self) -> Result<Vec<PendingTransformation>, StorageError> {
        Ok(self.tables.read().await.pending.clone())
    }

    async fn delete_pending(&self, ids: &[Uuid]) -> Result<u64, StorageError> {
        let mut tables = self.tables.write().await;
        let before = tables.pending.len();
        tables.pending.retain(|p| !ids.contains(&p.id));
        Ok((before - tables.pending.len()) as u64)
    }

    async fn create_instance(&self, address: &str) -> Result<InstanceRow, StorageError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let row = tables
            .instances
            .entry(address.to_string())
            .or_insert_with(|| InstanceRow {
                address: address.to_string(),
                block_init: None,
                block_last: None,
                created_at: now,
                updated_at: now,
            });
        Ok(row.clone())
    }

    async fn get_instance(&self, address: &str) -> Result<Option<InstanceRow>, StorageError> {
        Ok(self.tables.read().await.instances.get(address).cloned())
    }

    async fn update_instance(
        &self,
        address: &str,
        block_init: Option<u64>,
        block_last: u64,
    ) -> Result<InstanceRow, StorageError> {
        let mut tables = self.tables.write().await;
        let row = tables
            .instances
            .get_mut(address)
            .ok_or_else(|| StorageError::NotFound(format!("instance {}", address)))?;
        row.block_init = row.block_init.or(block_init);
        row.block_last = Some(block_last);
        row.updated_at = Utc::now();
        Ok(row.clone())
    }
}
