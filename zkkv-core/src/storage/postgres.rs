use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use uuid::Uuid;
use zkkv_common::{Record, Scalar, META_LEN};

use super::{InstanceRow, PendingTransformation, RecordRow, Storage, StoreRow};
use crate::error::StorageError;

pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Self::from_pool(pool).await
    }

    /// Wraps an existing pool, running pending migrations first.
    pub async fn from_pool(pool: PgPool) -> Result<Self, StorageError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn scalar(row: &PgRow, column: &str) -> Result<Scalar, StorageError> {
    let text: String = row.try_get(column)?;
    text.parse()
        .map_err(|e| StorageError::Corrupt(format!("{}: {}", column, e)))
}

fn to_i64(value: u64) -> Result<i64, StorageError> {
    i64::try_from(value).map_err(|_| StorageError::Corrupt(format!("height {} out of range", value)))
}

fn to_u64(value: i64) -> Result<u64, StorageError> {
    u64::try_from(value).map_err(|_| StorageError::Corrupt(format!("negative height {}", value)))
}

fn to_i32(value: u32) -> Result<i32, StorageError> {
    i32::try_from(value).map_err(|_| StorageError::Corrupt(format!("sequence {} out of range", value)))
}

fn to_sequence(value: i32) -> Result<u32, StorageError> {
    u32::try_from(value).map_err(|_| StorageError::Corrupt(format!("negative sequence {}", value)))
}

fn store_row(row: &PgRow) -> Result<StoreRow, StorageError> {
    let meta: Json<[Scalar; META_LEN]> = row.try_get("meta")?;
    Ok(StoreRow {
        id: scalar(row, "id")?,
        commitment: scalar(row, "commitment")?,
        meta: meta.0,
        instance: row.try_get("instance")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn record_row(row: &PgRow) -> Result<RecordRow, StorageError> {
    let meta: Json<[Scalar; META_LEN]> = row.try_get("meta")?;
    Ok(RecordRow {
        store_id: scalar(row, "store_id")?,
        key: scalar(row, "key")?,
        value: scalar(row, "value")?,
        meta: meta.0,
        block_height: to_u64(row.try_get("block_height")?)?,
        sequence: to_sequence(row.try_get("sequence")?)?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn instance_row(row: &PgRow) -> Result<InstanceRow, StorageError> {
    let block_init: Option<i64> = row.try_get("block_init")?;
    let block_last: Option<i64> = row.try_get("block_last")?;
    Ok(InstanceRow {
        address: row.try_get("address")?,
        block_init: block_init.map(to_u64).transpose()?,
        block_last: block_last.map(to_u64).transpose()?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn pending_row(row: &PgRow) -> Result<PendingTransformation, StorageError> {
    let data0: Json<Record> = row.try_get("data0")?;
    let data1: Json<Record> = row.try_get("data1")?;
    Ok(PendingTransformation {
        id: row.try_get("id")?,
        commitment_pending: scalar(row, "commitment_pending")?,
        settlement_checksum: scalar(row, "settlement_checksum")?,
        data0: data0.0,
        data1: data1.0,
        block_height: to_u64(row.try_get("block_height")?)?,
        sequence: to_sequence(row.try_get("sequence")?)?,
        created_at: row.try_get("created_at")?,
    })
}

impl Storage for PgStorage {
    async fn create_store(&self, row: &StoreRow) -> Result<StoreRow, StorageError> {
        sqlx::query(
            r#"
            INSERT INTO stores (id, commitment, meta, instance, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(row.id.to_string())
        .bind(row.commitment.to_string())
        .bind(Json(&row.meta))
        .bind(&row.instance)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;

        self.get_store(&row.id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("store {}", row.id)))
    }

    async fn get_store(&self, id: &Scalar) -> Result<Option<StoreRow>, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT id, commitment, meta, instance, created_at, updated_at
            FROM stores
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(store_row).transpose()
    }

    async fn stores(&self, instance: &str) -> Result<Vec<StoreRow>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT id, commitment, meta, instance, created_at, updated_at
            FROM stores
            WHERE instance = $1
            ORDER BY id ASC
            "#,
        )
        .bind(instance)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(store_row).collect()
    }

    async fn set_store_commitment(
        &self,
        id: &Scalar,
        commitment: &Scalar,
    ) -> Result<(), StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE stores
            SET commitment = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .bind(commitment.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("store {}", id)));
        }
        Ok(())
    }

    async fn delete_store(&self, id: &Scalar) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM stores WHERE id = $1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_record(
        &self,
        store_id: &Scalar,
        key: &Scalar,
    ) -> Result<Option<RecordRow>, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT store_id, key, value, meta, block_height, sequence, updated_at
            FROM records
            WHERE store_id = $1 AND key = $2
            "#,
        )
        .bind(store_id.to_string())
        .bind(key.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(record_row).transpose()
    }

    async fn set_record(&self, row: &RecordRow) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO records (store_id, key, value, meta, block_height, sequence, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (store_id, key) DO UPDATE
            SET value = EXCLUDED.value,
                meta = EXCLUDED.meta,
                block_height = EXCLUDED.block_height,
                sequence = EXCLUDED.sequence,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(row.store_id.to_string())
        .bind(row.key.to_string())
        .bind(row.value.to_string())
        .bind(Json(&row.meta))
        .bind(to_i64(row.block_height)?)
        .bind(to_i32(row.sequence)?)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_record(&self, store_id: &Scalar, key: &Scalar) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM records WHERE store_id = $1 AND key = $2")
            .bind(store_id.to_string())
            .bind(key.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn records(&self, store_id: &Scalar) -> Result<Vec<RecordRow>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT store_id, key, value, meta, block_height, sequence, updated_at
            FROM records
            WHERE store_id = $1
            ORDER BY key ASC
            "#,
        )
        .bind(store_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_row).collect()
    }

    async fn create_pending(&self, pending: &PendingTransformation) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO pending_transformations
                (id, commitment_pending, settlement_checksum, data0, data1, block_height, sequence, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(pending.id)
        .bind(pending.commitment_pending.to_string())
        .bind(pending.settlement_checksum.to_string())
        .bind(Json(&pending.data0))
        .bind(Json(&pending.data1))
        .bind(to_i64(pending.block_height)?)
        .bind(to_i32(pending.sequence)?)
        .bind(pending.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn pending(&self) -> Result<Vec<PendingTransformation>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT id, commitment_pending, settlement_checksum, data0, data1,
                   block_height, sequence, created_at
            FROM pending_transformations
            ORDER BY block_height ASC, sequence ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(pending_row).collect()
    }

    async fn delete_pending(&self, ids: &[Uuid]) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM pending_transformations WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn create_instance(&self, address: &str) -> Result<InstanceRow, StorageError> {
        let row = sqlx::query(
            r#"
            INSERT INTO instances (address)
            VALUES ($1)
            ON CONFLICT (address) DO UPDATE SET address = EXCLUDED.address
            RETURNING address, block_init, block_last, created_at, updated_at
            "#,
        )
        .bind(address)
        .fetch_one(&self.pool)
        .await?;

        instance_row(&row)
    }

    async fn get_instance(&self, address: &str) -> Result<Option<InstanceRow>, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT address, block_init, block_last, created_at, updated_at
            FROM instances
            WHERE address = $1
            "#,
        )
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(instance_row).transpose()
    }

    async fn update_instance(
        &self,
        address: &str,
        block_init: Option<u64>,
        block_last: u64,
    ) -> Result<InstanceRow, StorageError> {
        let block_init = block_init.map(to_i64).transpose()?;
        let row = sqlx::query(
            r#"
            UPDATE instances
            SET block_init = COALESCE(block_init, $2),
                block_last = $3,
                updated_at = NOW()
            WHERE address = $1
            RETURNING address, block_init, block_last, created_at, updated_at
            "#,
        )
        .bind(address)
        .bind(block_init)
        .bind(to_i64(block_last)?)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::NotFound(format!("instance {}", address)))?;

        instance_row(&row)
    }
}
