use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{debug, error, info};
use zkkv_common::{MerkleMap, Scalar, StoreMaps};
use zkkv_core::workload::run_workload;
use zkkv_core::{
    Indexer, Ledger, MemoryStorage, NodeConfig, NodeError, PgStorage, SettlementProcessor,
    Storage, ZkkvContract,
};
use zkkv_script::RollupProver;

#[cfg(not(feature = "sp1"))]
fn load_prover() -> zkkv_script::NativeProver {
    zkkv_script::NativeProver::new()
}

#[cfg(feature = "sp1")]
fn load_prover() -> zkkv_script::Sp1RollupProver {
    zkkv_script::Sp1RollupProver::new()
}

async fn run<S: Storage, P: RollupProver + Send + Sync + 'static>(
    config: NodeConfig,
    storage: S,
    prover: Arc<P>,
) -> Result<(), NodeError> {
    // The ledger lives in this process, so a persisted cursor cannot be resumed.
    if let Some(instance) = storage.get_instance(&config.address).await? {
        if instance.block_last.is_some() {
            return Err(NodeError::Config(format!(
                "instance {} was indexed against an earlier ledger, choose another ZKKV_ADDRESS",
                config.address
            )));
        }
    }

    let ledger = Arc::new(Ledger::new());
    let manager_id = Scalar::from_label(&config.address);
    let contract = ZkkvContract::deploy(
        manager_id,
        MerkleMap::empty_root(),
        prover.clone(),
        ledger.clone(),
    );

    let mut indexer = Indexer::new(storage, config.indexer(), manager_id);
    indexer.restore().await?;
    indexer.sync(&ledger).await?;

    let mut client = StoreMaps::new(manager_id);
    let workload = run_workload(&contract, &mut client, config.stores, config.recursion_enabled)?;
    info!(
        "workload: {}",
        serde_json::to_string(&workload).unwrap_or_default()
    );

    let processor = SettlementProcessor::new(prover, config.max_batch);
    loop {
        let report = indexer.sync(&ledger).await?;
        info!(
            "indexed {} events up to block {}, manager root {}",
            report.applied,
            report.to,
            indexer.mirror().manager_root()
        );

        if config.recursion_enabled {
            let receipt =
                tokio::task::block_in_place(|| processor.process_batch(&contract, &indexer))?;
            if let Some(receipt) = receipt {
                info!(
                    "batch {} settled {} writes ({} skipped, {} deferred): {} -> {}",
                    receipt.batch_id,
                    receipt.included.len(),
                    receipt.skipped.len(),
                    receipt.deferred.len(),
                    receipt.root0,
                    receipt.root1
                );
                debug!(
                    "receipt: {}",
                    serde_json::to_string(&receipt).unwrap_or_default()
                );
                indexer.sync(&ledger).await?;
            }
        }

        if config.once {
            break;
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
            _ = tokio::time::sleep(config.cycle_time()) => {}
        }
    }

    if let Some(view) = indexer.by_id(&manager_id).await? {
        info!(
            "manager {} holds {} stores at {}",
            view.store.id,
            view.records.len(),
            view.store.commitment
        );
    }
    Ok(())
}

async fn start(config: NodeConfig) -> Result<(), NodeError> {
    config.validate()?;
    let prover = Arc::new(load_prover());
    match config.database_url.clone() {
        Some(url) => {
            let storage = PgStorage::connect(&url).await?;
            info!("using PostgreSQL storage");
            run(config, storage, prover).await
        }
        None => {
            info!("DATABASE_URL not set, using in-memory storage");
            run(config, MemoryStorage::new(), prover).await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = NodeConfig::parse();
    match start(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
