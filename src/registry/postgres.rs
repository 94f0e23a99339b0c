use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime, Timeouts};
use std::future::Future;
use std::time::Duration;
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, Row};
use uuid::Uuid;

use super::models::{TargetKind, TargetRecord};
use super::store::{StoreError, TargetStore};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS targets (
    id UUID PRIMARY KEY,
    kind TEXT NOT NULL,
    name TEXT NOT NULL,
    address TEXT NOT NULL,
    username TEXT,
    encrypted_password TEXT,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    UNIQUE (kind, name)
)";

const COLUMNS: &str =
    "id, kind, name, address, username, encrypted_password, created_at, updated_at";

/// Registry store backed by the `targets` table. Uniqueness of `(kind, name)`
/// is left to the database constraint.
///
/// Every call, pool checkout included, is bounded by `timeout`.
#[derive(Clone)]
pub struct PostgresStore {
    pool: Pool,
    timeout: Duration,
}

impl PostgresStore {
    pub async fn connect(database_url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let mut cfg = Config::new();
        cfg.url = Some(database_url.to_string());
        cfg.connect_timeout = Some(timeout);
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(PoolConfig {
            timeouts: Timeouts {
                wait: Some(timeout),
                create: Some(timeout),
                recycle: Some(timeout),
            },
            ..PoolConfig::default()
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let store = Self { pool, timeout };
        store.migrate().await?;
        Ok(store)
    }

    async fn client(&self) -> Result<deadpool_postgres::Client, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    /// Runs one store call under the per-call deadline.
    async fn bounded<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| {
                StoreError::Backend(format!("target store call timed out after {:?}", self.timeout))
            })?
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        self.bounded(async {
            let client = self.client().await?;
            client.batch_execute(SCHEMA).await.map_err(store_error)?;
            Ok(())
        })
        .await
    }
}

fn store_error(e: tokio_postgres::Error) -> StoreError {
    if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        return StoreError::Duplicate;
    }
    StoreError::Backend(e.to_string())
}

fn record_from_row(row: &Row) -> Result<TargetRecord, StoreError> {
    let kind: String = row.get("kind");
    Ok(TargetRecord {
        id: row.get("id"),
        kind: kind
            .parse()
            .map_err(|e: anyhow::Error| StoreError::Backend(e.to_string()))?,
        name: row.get("name"),
        address: row.get("address"),
        username: row.get("username"),
        encrypted_password: row.get("encrypted_password"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl TargetStore for PostgresStore {
    async fn insert(&self, record: TargetRecord) -> Result<(), StoreError> {
        self.bounded(async {
            let client = self.client().await?;
            let stmt = client
                .prepare(&format!(
                    "INSERT INTO targets ({COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
                ))
                .await
                .map_err(store_error)?;

            client
                .execute(
                    &stmt,
                    &[
                        &record.id,
                        &record.kind.as_str(),
                        &record.name,
                        &record.address,
                        &record.username,
                        &record.encrypted_password,
                        &record.created_at,
                        &record.updated_at,
                    ],
                )
                .await
                .map_err(store_error)?;

            Ok(())
        })
        .await
    }

    async fn get(&self, kind: TargetKind, id: Uuid) -> Result<Option<TargetRecord>, StoreError> {
        self.bounded(async {
            let client = self.client().await?;
            let rows = client
                .query(
                    format!("SELECT {COLUMNS} FROM targets WHERE kind = $1 AND id = $2").as_str(),
                    &[&kind.as_str(), &id],
                )
                .await
                .map_err(store_error)?;

            rows.first().map(record_from_row).transpose()
        })
        .await
    }

    async fn find_by_name(
        &self,
        kind: TargetKind,
        name: &str,
    ) -> Result<Option<TargetRecord>, StoreError> {
        self.bounded(async {
            let client = self.client().await?;
            let rows = client
                .query(
                    format!("SELECT {COLUMNS} FROM targets WHERE kind = $1 AND name = $2").as_str(),
                    &[&kind.as_str(), &name],
                )
                .await
                .map_err(store_error)?;

            rows.first().map(record_from_row).transpose()
        })
        .await
    }

    async fn update(&self, record: TargetRecord) -> Result<bool, StoreError> {
        self.bounded(async {
            let client = self.client().await?;
            let rows_affected = client
                .execute(
                    "UPDATE targets
                     SET address = $3, username = $4, encrypted_password = $5, updated_at = $6
                     WHERE kind = $1 AND id = $2",
                    &[
                        &record.kind.as_str(),
                        &record.id,
                        &record.address,
                        &record.username,
                        &record.encrypted_password,
                        &record.updated_at,
                    ],
                )
                .await
                .map_err(store_error)?;

            Ok(rows_affected > 0)
        })
        .await
    }

    async fn delete(&self, kind: TargetKind, id: Uuid) -> Result<bool, StoreError> {
        self.bounded(async {
            let client = self.client().await?;
            let rows_affected = client
                .execute(
                    "DELETE FROM targets WHERE kind = $1 AND id = $2",
                    &[&kind.as_str(), &id],
                )
                .await
                .map_err(store_error)?;

            Ok(rows_affected > 0)
        })
        .await
    }

    async fn list(&self, kind: TargetKind) -> Result<Vec<TargetRecord>, StoreError> {
        self.bounded(async {
            let client = self.client().await?;
            let rows = client
                .query(
                    format!("SELECT {COLUMNS} FROM targets WHERE kind = $1 ORDER BY created_at")
                        .as_str(),
                    &[&kind.as_str()],
                )
                .await
                .map_err(store_error)?;

            rows.iter().map(record_from_row).collect()
        })
        .await
    }
}
