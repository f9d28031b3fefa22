//! Append-only event log standing in for the settlement chain.

use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use zkkv_common::StoreEvent;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub block_height: u64,
    /// Position of the event within its block.
    pub sequence: u32,
    pub event: StoreEvent,
}

#[derive(Debug, Default)]
struct LedgerInner {
    events: Vec<LedgerEvent>,
    height: u64,
}

/// Blocks are numbered from 1; each successful operation is one block.
#[derive(Debug)]
pub struct Ledger {
    inner: RwLock<LedgerInner>,
    updates: broadcast::Sender<LedgerEvent>,
}

impl Ledger {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(1000);
        Self {
            inner: RwLock::new(LedgerInner::default()),
            updates,
        }
    }

    /// Appends one block holding `events` and returns its height.
    pub fn append_block(&self, events: Vec<StoreEvent>) -> u64 {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.height += 1;
        let block_height = inner.height;
        for (sequence, event) in events.into_iter().enumerate() {
            let event = LedgerEvent {
                block_height,
                sequence: sequence as u32,
                event,
            };
            debug!("block {} event {}", block_height, event.event.name());
            // No subscribers is fine.
            let _ = self.updates.send(event.clone());
            inner.events.push(event);
        }
        block_height
    }

    /// Events of blocks `from..=to`, in order.
    pub fn fetch_events(&self, from: u64, to: u64) -> Vec<LedgerEvent> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let start = inner.events.partition_point(|e| e.block_height < from);
        inner.events[start..]
            .iter()
            .take_while(|e| e.block_height <= to)
            .cloned()
            .collect()
    }

    pub fn last_height(&self) -> u64 {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).height
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.updates.subscribe()
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}
