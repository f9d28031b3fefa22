pub mod config;
pub mod contract;
pub mod error;
pub mod indexer;
pub mod ledger;
pub mod mirror;
pub mod sequencer;
pub mod state;
pub mod storage;
pub mod workload;

pub use config::NodeConfig;
pub use contract::{SharedVerifier, ZkkvContract};
pub use error::{ContractError, ErrorKind, IndexerError, NodeError, SequencerError, StorageError};
pub use indexer::{Indexer, IndexerConfig, StoreView, SyncReport};
pub use ledger::{Ledger, LedgerEvent};
pub use sequencer::{plan_settlement, SettlementPlan, SettlementProcessor, SettlementReceipt};
pub use storage::{MemoryStorage, PgStorage, Storage};
