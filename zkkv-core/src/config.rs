use std::time::Duration;

use clap::{ArgAction, Parser};
use zkkv_script::validation::MAX_BATCH_SIZE;

use crate::error::NodeError;
use crate::indexer::IndexerConfig;

#[derive(Parser, Debug, Clone)]
#[command(name = "zkkv-node", about = "Runs a ZKKV store with its indexer and sequencer")]
pub struct NodeConfig {
    /// PostgreSQL connection string; in-memory storage when unset
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Instance address the manager store is derived from
    #[arg(long, env = "ZKKV_ADDRESS", default_value = "zkkv-local")]
    pub address: String,

    /// Seconds between indexer cycles
    #[arg(long, env = "INDEXER_CYCLE_TIME", default_value_t = 180)]
    pub cycle_time: u64,

    /// Maximum pending writes settled by one proof
    #[arg(long, env = "SETTLEMENT_MAX_BATCH", default_value_t = MAX_BATCH_SIZE)]
    pub max_batch: usize,

    /// Divergent events tolerated before a map is rebuilt from storage
    #[arg(long, env = "RESYNC_THRESHOLD", default_value_t = 3)]
    pub resync_threshold: u32,

    /// Enable concurrent writes and rollup settlement
    #[arg(long, env = "RECURSION_ENABLED", default_value_t = true, action = ArgAction::Set)]
    pub recursion_enabled: bool,

    /// Stores created by the startup workload
    #[arg(long, default_value_t = 4)]
    pub stores: usize,

    /// Run a single indexer cycle and exit
    #[arg(long)]
    pub once: bool,
}

impl NodeConfig {
    pub fn cycle_time(&self) -> Duration {
        Duration::from_secs(self.cycle_time)
    }

    pub fn indexer(&self) -> IndexerConfig {
        IndexerConfig {
            address: self.address.clone(),
            resync_threshold: self.resync_threshold,
        }
    }

    pub fn validate(&self) -> Result<(), NodeError> {
        if self.address.is_empty() {
            return Err(NodeError::Config("ZKKV_ADDRESS must not be empty".into()));
        }
        if !(1..=MAX_BATCH_SIZE).contains(&self.max_batch) {
            return Err(NodeError::Config(format!(
                "SETTLEMENT_MAX_BATCH must be between 1 and {}, got {}",
                MAX_BATCH_SIZE, self.max_batch
            )));
        }
        if self.resync_threshold == 0 {
            return Err(NodeError::Config("RESYNC_THRESHOLD must be at least 1".into()));
        }
        if self.stores < 2 {
            return Err(NodeError::Config(format!(
                "the workload needs at least 2 stores, got {}",
                self.stores
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NodeConfig::parse_from(["zkkv-node", "--address", "test-node"]);
        assert_eq!(config.address, "test-node");
        assert_eq!(config.max_batch, MAX_BATCH_SIZE);
        assert!(config.stores >= 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_bounds() {
        let config = NodeConfig::parse_from([
            "zkkv-node",
            "--max-batch",
            "0",
            "--recursion-enabled",
            "false",
        ]);
        assert!(!config.recursion_enabled);
        assert!(config.validate().is_err());

        let config = NodeConfig::parse_from(["zkkv-node", "--stores", "1"]);
        assert!(config.validate().is_err());
    }
}
