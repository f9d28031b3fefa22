use std::sync::Arc;

use sqlx::postgres::{PgConnectOptions, PgPool};
use sqlx::ConnectOptions;
use zkkv_common::{MerkleMap, Scalar, StoreMaps};
use zkkv_core::workload::{run_workload, store_identifier};
use zkkv_core::{
    Indexer, IndexerConfig, Ledger, PgStorage, SettlementProcessor, Storage, ZkkvContract,
};
use zkkv_script::NativeProver;

async fn setup_storage() -> PgStorage {
    // Use a unique database for each test
    let db_name = format!("zkkv_test_{}", uuid::Uuid::new_v4().simple());
    let db_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let admin_pool = PgPool::connect(&db_url).await.unwrap();

    sqlx::query(&format!(r#"CREATE DATABASE "{}""#, db_name))
        .execute(&admin_pool)
        .await
        .unwrap();

    let options: PgConnectOptions = db_url.parse().unwrap();
    let options = options.database(&db_name).disable_statement_logging();
    let pool = PgPool::connect_with(options).await.unwrap();
    PgStorage::from_pool(pool).await.unwrap()
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_postgres_roundtrip() {
    let storage = setup_storage().await;
    let address = "zkkv-postgres";
    let ledger = Arc::new(Ledger::new());
    let manager_id = Scalar::from_label(address);
    let prover = NativeProver::new();
    let contract = ZkkvContract::deploy(
        manager_id,
        MerkleMap::empty_root(),
        Arc::new(prover.clone()),
        ledger.clone(),
    );
    let mut client = StoreMaps::new(manager_id);
    run_workload(&contract, &mut client, 3, true).unwrap();

    let config = IndexerConfig {
        address: address.to_string(),
        resync_threshold: 3,
    };
    let mut indexer = Indexer::new(storage, config.clone(), manager_id);
    indexer.sync(&ledger).await.unwrap();
    assert_eq!(indexer.storage().pending().await.unwrap().len(), 4);

    let processor = SettlementProcessor::new(prover, 100);
    let receipt = processor
        .process_batch(&contract, &indexer)
        .unwrap()
        .unwrap();
    indexer.sync(&ledger).await.unwrap();
    assert_eq!(indexer.mirror().manager_root(), receipt.root1);

    let view = indexer.by_id(&store_identifier(0)).await.unwrap().unwrap();
    assert_eq!(view.records.len(), 2);
    let cursor = indexer.by_address(address).await.unwrap().unwrap();
    assert_eq!(cursor.block_last, Some(ledger.last_height()));

    // A restarted indexer restores the settled state.
    let mut restarted = Indexer::new(indexer.into_storage(), config, manager_id);
    restarted.restore().await.unwrap();
    assert_eq!(restarted.mirror().manager_root(), receipt.root1);
    assert!(restarted.pending_for(&receipt.root1).is_empty());
}
