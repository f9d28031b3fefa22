//! Rebuilds the store state from the ledger's event stream.
//!
//! The indexer folds events in ledger order into persistent storage and an
//! in-memory [`Mirror`] of the authenticated maps. Progress is tracked per
//! instance address and acknowledged block by block, so that a restarted or
//! retried sync resumes after the last block it fully applied.

use std::collections::HashSet;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;
use zkkv_common::{
    EventStore, EventStoreCommit, EventStorePending, Scalar, StoreEvent, EMPTY, META_LEN,
};

use crate::error::IndexerError;
use crate::ledger::{Ledger, LedgerEvent};
use crate::mirror::Mirror;
use crate::sequencer::plan_settlement;
use crate::storage::{InstanceRow, PendingTransformation, RecordRow, Storage, StoreRow};

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Instance address the cursor is stored under.
    pub address: String,
    /// Consecutive divergent events after which a map is rebuilt from storage.
    pub resync_threshold: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub from: u64,
    pub to: u64,
    pub applied: usize,
}

/// A store with all of its records.
#[derive(Debug, Clone, Serialize)]
pub struct StoreView {
    pub store: StoreRow,
    pub records: Vec<RecordRow>,
}

pub struct Indexer<S> {
    storage: S,
    config: IndexerConfig,
    mirror: Mirror,
    queue: Vec<PendingTransformation>,
    /// Bases whose settlement could not be replayed; their writes are kept.
    held: HashSet<Scalar>,
}

impl<S: Storage> Indexer<S> {
    pub fn new(storage: S, config: IndexerConfig, manager_id: Scalar) -> Self {
        Self {
            storage,
            config,
            mirror: Mirror::new(manager_id),
            queue: Vec::new(),
            held: HashSet::new(),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    pub fn mirror(&self) -> &Mirror {
        &self.mirror
    }

    /// Queued pending transformations made against `base`, in ledger order.
    pub fn pending_for(&self, base: &Scalar) -> Vec<PendingTransformation> {
        self.queue
            .iter()
            .filter(|p| p.commitment_pending == *base)
            .cloned()
            .collect()
    }

    pub async fn by_id(&self, store_id: &Scalar) -> Result<Option<StoreView>, IndexerError> {
        let Some(store) = self.storage.get_store(store_id).await? else {
            return Ok(None);
        };
        let records = self.storage.records(store_id).await?;
        Ok(Some(StoreView { store, records }))
    }

    pub async fn by_address(&self, address: &str) -> Result<Option<InstanceRow>, IndexerError> {
        Ok(self.storage.get_instance(address).await?)
    }

    /// Settlement bases whose queued writes are kept because the mirror
    /// could not replay them.
    pub fn held(&self) -> impl Iterator<Item = &Scalar> {
        self.held.iter()
    }

    /// Reloads the mirror and the pending queue from storage.
    pub async fn restore(&mut self) -> Result<(), IndexerError> {
        let (mirror, stores) = self.load_mirror().await?;
        self.mirror = mirror;
        self.queue = self.storage.pending().await?;
        self.held.clear();
        info!(
            "restored {} stores and {} pending transformations",
            stores,
            self.queue.len()
        );
        Ok(())
    }

    async fn load_mirror(&self) -> Result<(Mirror, usize), IndexerError> {
        let mut mirror = Mirror::new(self.mirror.manager_id());
        let stores = self.storage.stores(&self.config.address).await?;
        for store in &stores {
            let records = self.storage.records(&store.id).await?;
            mirror.rebuild(store.id, records.iter().map(|r| (r.key, r.value)));
            if mirror.root_of(&store.id) != Some(store.commitment) {
                warn!(
                    "stored map of {} does not match its stored commitment {}",
                    store.id, store.commitment
                );
            }
        }
        Ok((mirror, stores.len()))
    }

    /// Applies every block after the instance cursor up to the ledger head.
    pub async fn sync(&mut self, ledger: &Ledger) -> Result<SyncReport, IndexerError> {
        let address = self.config.address.clone();
        let instance = match self.storage.get_instance(&address).await? {
            Some(instance) => instance,
            None => self.storage.create_instance(&address).await?,
        };

        let head = ledger.last_height();
        let indexed = instance.block_last.unwrap_or(0);
        if indexed > head {
            return Err(IndexerError::LedgerBehind {
                address,
                ledger: head,
                indexed,
            });
        }

        let from = indexed + 1;
        if from > head {
            return Ok(SyncReport {
                from,
                to: head,
                applied: 0,
            });
        }

        let events = ledger.fetch_events(from, head);
        let block_init = Some(events.first().map_or(from, |e| e.block_height));
        let mut acknowledged = indexed;
        for (i, event) in events.iter().enumerate() {
            self.apply(event).await?;
            let block_done = events
                .get(i + 1)
                .map_or(true, |next| next.block_height != event.block_height);
            if block_done {
                self.storage
                    .update_instance(&address, block_init, event.block_height)
                    .await?;
                acknowledged = event.block_height;
            }
        }
        if acknowledged < head {
            self.storage
                .update_instance(&address, block_init, head)
                .await?;
        }

        debug!("indexed blocks {}..={} ({} events)", from, head, events.len());
        Ok(SyncReport {
            from,
            to: head,
            applied: events.len(),
        })
    }

    pub async fn apply(&mut self, event: &LedgerEvent) -> Result<(), IndexerError> {
        match &event.event {
            StoreEvent::New(store) => self.on_new(store).await,
            StoreEvent::Set(set) => self.on_set(event, set).await,
            StoreEvent::Pending(pending) => self.on_pending(event, pending).await,
            StoreEvent::Commit(commit) => self.on_commit(event, commit).await,
        }
    }

    async fn on_new(&mut self, event: &EventStore) -> Result<(), IndexerError> {
        let row = StoreRow::new(event.id, event.root1, event.meta, &self.config.address);
        self.storage.create_store(&row).await?;
        self.mirror.track(event.id);
        debug!("indexed store {}", event.id);
        Ok(())
    }

    async fn persist_value(
        &self,
        at: &LedgerEvent,
        store_id: Scalar,
        key: Scalar,
        value: Scalar,
        meta: [Scalar; META_LEN],
        commitment: Scalar,
    ) -> Result<(), IndexerError> {
        if self.storage.get_store(&store_id).await?.is_none() {
            warn!("write to unindexed store {}", store_id);
            let row = StoreRow::new(store_id, commitment, Default::default(), &self.config.address);
            self.storage.create_store(&row).await?;
        }

        if value == EMPTY {
            self.storage.delete_record(&store_id, &key).await?;
        } else {
            self.storage
                .set_record(&RecordRow {
                    store_id,
                    key,
                    value,
                    meta,
                    block_height: at.block_height,
                    sequence: at.sequence,
                    updated_at: Utc::now(),
                })
                .await?;
        }
        self.storage
            .set_store_commitment(&store_id, &commitment)
            .await?;
        Ok(())
    }

    async fn on_set(&mut self, at: &LedgerEvent, event: &EventStore) -> Result<(), IndexerError> {
        self.persist_value(at, event.id, event.key, event.value, event.meta, event.root1)
            .await?;

        let outcome = self.mirror.apply_set(event);
        if outcome.is_divergent() && self.mirror.divergence(&event.id) >= self.config.resync_threshold
        {
            let records = self.storage.records(&event.id).await?;
            self.mirror
                .rebuild(event.id, records.iter().map(|r| (r.key, r.value)));
            info!("resynced map {} from {} stored records", event.id, records.len());
        }

        if event.id == self.mirror.manager_id() {
            self.orphan_stale(event.root1).await?;
        }
        Ok(())
    }

    async fn on_pending(
        &mut self,
        at: &LedgerEvent,
        event: &EventStorePending,
    ) -> Result<(), IndexerError> {
        if event.settlement_checksum != event.data1.checksum() {
            warn!(
                "dropping pending write at block {}: checksum mismatch",
                at.block_height
            );
            return Ok(());
        }

        let id = PendingTransformation::id_for(&self.config.address, at.block_height, at.sequence);
        if self.queue.iter().any(|p| p.id == id) {
            debug!("pending write {} already queued", id);
            return Ok(());
        }

        let pending = PendingTransformation {
            id,
            commitment_pending: event.commitment_pending,
            settlement_checksum: event.settlement_checksum,
            data0: event.data0,
            data1: event.data1,
            block_height: at.block_height,
            sequence: at.sequence,
            created_at: Utc::now(),
        };
        self.storage.create_pending(&pending).await?;
        let index = self
            .queue
            .partition_point(|p| p.position() <= pending.position());
        self.queue.insert(index, pending);
        Ok(())
    }

    async fn on_commit(
        &mut self,
        at: &LedgerEvent,
        event: &EventStoreCommit,
    ) -> Result<(), IndexerError> {
        let base = event.commitment_pending;
        let settled_root = event.commitment_settled;

        if base != settled_root && self.mirror.manager_root() == settled_root {
            debug!("settlement {} -> {} already applied", base, settled_root);
            return self.orphan_stale(settled_root).await;
        }
        if self.mirror.manager_root() != base {
            let (stored, _) = self.load_mirror().await?;
            if stored.manager_root() != base {
                warn!(
                    "settlement from {} but the mirror is at {}, keeping its queued writes",
                    base,
                    self.mirror.manager_root()
                );
                self.held.insert(base);
                return self.orphan_stale(settled_root).await;
            }
            info!("mirror reloaded from storage to replay settlement from {}", base);
            self.mirror = stored;
        }

        let candidates = self.pending_for(&base);
        let plan = plan_settlement(self.mirror.maps(), &candidates, usize::MAX);
        let prefix = plan
            .steps
            .iter()
            .position(|step| step.root1 == settled_root);
        match prefix {
            Some(last) => {
                // Swapped in only once every settled write is persisted.
                let mut mirror = self.mirror.clone();
                let settled = &plan.included[..=last];
                for pending in settled {
                    self.settle(&mut mirror, at, pending).await?;
                }
                let ids: Vec<Uuid> = settled.iter().map(|p| p.id).collect();
                self.storage.delete_pending(&ids).await?;
                self.queue.retain(|p| !ids.contains(&p.id));
                self.mirror = mirror;
                info!(
                    "settled {} pending writes {} -> {}",
                    ids.len(),
                    base,
                    settled_root
                );
            }
            None => {
                warn!(
                    "no queued writes reproduce settlement {} -> {}, keeping them",
                    base, settled_root
                );
                self.held.insert(base);
            }
        }

        self.orphan_stale(settled_root).await
    }

    async fn settle(
        &self,
        mirror: &mut Mirror,
        at: &LedgerEvent,
        pending: &PendingTransformation,
    ) -> Result<(), IndexerError> {
        let data = &pending.data1;
        let store_id = data.store.identifier;
        let manager_root = mirror.settle(store_id, data.key, data.value);
        let store_root = mirror.root_of(&store_id).unwrap_or(EMPTY);

        self.persist_value(at, store_id, data.key, data.value, data.meta, store_root)
            .await?;
        let manager_id = mirror.manager_id();
        self.persist_value(
            at,
            manager_id,
            store_id,
            store_root,
            Default::default(),
            manager_root,
        )
        .await
    }

    /// Drops queued writes whose base is no longer `root`, except held ones.
    async fn orphan_stale(&mut self, root: Scalar) -> Result<(), IndexerError> {
        let stale: Vec<Uuid> = self
            .queue
            .iter()
            .filter(|p| {
                p.commitment_pending != root && !self.held.contains(&p.commitment_pending)
            })
            .map(|p| p.id)
            .collect();
        if stale.is_empty() {
            return Ok(());
        }
        warn!(
            "orphaning {} pending writes, commitment moved to {}",
            stale.len(),
            root
        );
        self.storage.delete_pending(&stale).await?;
        self.queue.retain(|p| !stale.contains(&p.id));
        Ok(())
    }
}
