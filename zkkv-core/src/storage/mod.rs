//! Persistence of the reconstructed state.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zkkv_common::{Record, Scalar, META_LEN};

use crate::error::StorageError;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStorage;
pub use postgres::PgStorage;

/// A store known to an indexed instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRow {
    pub id: Scalar,
    pub commitment: Scalar,
    pub meta: [Scalar; META_LEN],
    pub instance: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoreRow {
    pub fn new(id: Scalar, commitment: Scalar, meta: [Scalar; META_LEN], instance: &str) -> Self {
        let now = Utc::now();
        Self {
            id,
            commitment,
            meta,
            instance: instance.to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A key/value pair of a store, with the block that last wrote it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRow {
    pub store_id: Scalar,
    pub key: Scalar,
    pub value: Scalar,
    pub meta: [Scalar; META_LEN],
    pub block_height: u64,
    pub sequence: u32,
    pub updated_at: DateTime<Utc>,
}

/// Indexing cursor of one deployed instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRow {
    pub address: String,
    pub block_init: Option<u64>,
    pub block_last: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A concurrent write waiting for settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransformation {
    pub id: Uuid,
    pub commitment_pending: Scalar,
    pub settlement_checksum: Scalar,
    pub data0: Record,
    pub data1: Record,
    pub block_height: u64,
    pub sequence: u32,
    pub created_at: DateTime<Utc>,
}

impl PendingTransformation {
    /// Id of the pending write at a ledger position of an instance, stable
    /// across re-indexing.
    pub fn id_for(address: &str, block_height: u64, sequence: u32) -> Uuid {
        let name = format!("{}/{}/{}", address, block_height, sequence);
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
    }

    pub fn store_id(&self) -> Scalar {
        self.data1.store.identifier
    }

    /// Ledger position, the order in which pending writes are settled.
    pub fn position(&self) -> (u64, u32) {
        (self.block_height, self.sequence)
    }
}

pub trait Storage: Send + Sync {
    /// Creates the store unless it exists; returns the stored row either way.
    fn create_store(&self, row: &StoreRow)
        -> impl Future<Output = Result<StoreRow, StorageError>> + Send;

    fn get_store(&self, id: &Scalar)
        -> impl Future<Output = Result<Option<StoreRow>, StorageError>> + Send;

    fn stores(&self, instance: &str)
        -> impl Future<Output = Result<Vec<StoreRow>, StorageError>> + Send;

    fn set_store_commitment(
        &self,
        id: &Scalar,
        commitment: &Scalar,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Deletes a store and its records.
    fn delete_store(&self, id: &Scalar)
        -> impl Future<Output = Result<bool, StorageError>> + Send;

    fn get_record(
        &self,
        store_id: &Scalar,
        key: &Scalar,
    ) -> impl Future<Output = Result<Option<RecordRow>, StorageError>> + Send;

    /// Inserts or replaces the record at `(store_id, key)`.
    fn set_record(&self, row: &RecordRow)
        -> impl Future<Output = Result<(), StorageError>> + Send;

    fn delete_record(
        &self,
        store_id: &Scalar,
        key: &Scalar,
    ) -> impl Future<Output = Result<bool, StorageError>> + Send;

    /// Records of a store in ascending key order.
    fn records(&self, store_id: &Scalar)
        -> impl Future<Output = Result<Vec<RecordRow>, StorageError>> + Send;

    /// Inserting an id that is already stored is a no-op.
    fn create_pending(&self, pending: &PendingTransformation)
        -> impl Future<Output = Result<(), StorageError>> + Send;

    /// All pending transformations in ledger order.
    fn pending(&self)
        -> impl Future<Output = Result<Vec<PendingTransformation>, StorageError>> + Send;

    fn delete_pending(&self, ids: &[Uuid])
        -> impl Future<Output = Result<u64, StorageError>> + Send;

    fn create_instance(&self, address: &str)
        -> impl Future<Output = Result<InstanceRow, StorageError>> + Send;

    fn get_instance(&self, address: &str)
        -> impl Future<Output = Result<Option<InstanceRow>, StorageError>> + Send;

    /// Moves the cursor to `block_last`; `block_init` is only recorded once.
    fn update_instance(
        &self,
        address: &str,
        block_init: Option<u64>,
        block_last: u64,
    ) -> impl Future<Output = Result<InstanceRow, StorageError>> + Send;
}
