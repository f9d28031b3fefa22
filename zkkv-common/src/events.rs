//! Events emitted by the store state machine.

use serde::{Deserialize, Serialize};

use crate::field::Scalar;
use crate::store::{Record, META_LEN};

/// Payload of `store:new` and `store:set`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStore {
    pub id: Scalar,
    pub root0: Scalar,
    pub root1: Scalar,
    pub key: Scalar,
    pub value: Scalar,
    pub meta: [Scalar; META_LEN],
}

impl EventStore {
    /// A store came into existence with the given root.
    pub fn created(id: Scalar, root1: Scalar) -> Self {
        Self {
            id,
            root1,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventStorePending {
    pub commitment_pending: Scalar,
    pub settlement_checksum: Scalar,
    pub data0: Record,
    pub data1: Record,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventStoreCommit {
    pub commitment_pending: Scalar,
    pub commitment_settled: Scalar,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StoreEvent {
    #[serde(rename = "store:new")]
    New(EventStore),
    #[serde(rename = "store:set")]
    Set(EventStore),
    #[serde(rename = "store:pending")]
    Pending(EventStorePending),
    #[serde(rename = "store:commit")]
    Commit(EventStoreCommit),
}

impl StoreEvent {
    pub fn name(&self) -> &'static str {
        match self {
            StoreEvent::New(_) => "store:new",
            StoreEvent::Set(_) => "store:set",
            StoreEvent::Pending(_) => "store:pending",
            StoreEvent::Commit(_) => "store:commit",
        }
    }
}
