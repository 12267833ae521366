//! `SQLite` backed store.
//!
//! All statements are static and use bound parameters.

use core::str::FromStr as _;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eyre::WrapErr as _;
use sqlx::{
    FromRow,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions},
};
use vpswatch_common::EndpointStatus;

use super::{Endpoint, EndpointId, EndpointStore, OwnerId, StoreError};

#[derive(FromRow)]
struct EndpointRow {
    id: i64,
    owner_id: i64,
    host: String,
    port: i64,
    label: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<EndpointRow> for Endpoint {
    type Error = StoreError;

    fn try_from(row: EndpointRow) -> Result<Self, Self::Error> {
        let port = u16::try_from(row.port)
            .wrap_err_with(|| format!("Invalid port stored for endpoint {}", row.id))
            .map_err(StoreError::Unavailable)?;
        let status = EndpointStatus::from_str(&row.status)
            .wrap_err_with(|| format!("Invalid status stored for endpoint {}", row.id))
            .map_err(StoreError::Unavailable)?;
        Ok(Self {
            id: row.id,
            owner: row.owner_id,
            host: row.host,
            port,
            label: row.label,
            status,
            created_at: row.created_at,
        })
    }
}

fn unavailable(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable(e.into())
}

fn into_endpoints(rows: Vec<EndpointRow>) -> Result<Vec<Endpoint>, StoreError> {
    rows.into_iter().map(Endpoint::try_from).collect()
}

/// Endpoint store on top of a `sqlx` `SQLite` pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path` and runs migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn open(path: &Path) -> eyre::Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .wrap_err(format!("Failed to open database at: {}", path.display()))?;
        Self::migrate(pool).await
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created or migrated.
    pub async fn in_memory() -> eyre::Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // Every connection would get its own empty database, so pin exactly one.
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .wrap_err("Failed to open in-memory database")?;
        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> eyre::Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .wrap_err("Failed to run database migrations")?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl EndpointStore for SqliteStore {
    async fn insert(
        &self,
        owner: OwnerId,
        host: &str,
        port: u16,
        label: &str,
    ) -> Result<Endpoint, StoreError> {
        let result = sqlx::query_as::<_, EndpointRow>(
            "INSERT INTO endpoints (owner_id, host, port, label, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING id, owner_id, host, port, label, status, created_at",
        )
        .bind(owner)
        .bind(host)
        .bind(i64::from(port))
        .bind(label)
        .bind(EndpointStatus::Unknown.as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Endpoint::try_from(row),
            Err(sqlx::Error::Database(ref db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::Duplicate {
                    host: host.to_owned(),
                })
            }
            Err(e) => Err(unavailable(e)),
        }
    }

    async fn list_by_owner(&self, owner: OwnerId) -> Result<Vec<Endpoint>, StoreError> {
        let rows = sqlx::query_as::<_, EndpointRow>(
            "SELECT id, owner_id, host, port, label, status, created_at
             FROM endpoints WHERE owner_id = ? ORDER BY id",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;
        into_endpoints(rows)
    }

    async fn find_by_owner_and_host(
        &self,
        owner: OwnerId,
        host: &str,
    ) -> Result<Option<Endpoint>, StoreError> {
        sqlx::query_as::<_, EndpointRow>(
            "SELECT id, owner_id, host, port, label, status, created_at
             FROM endpoints WHERE owner_id = ? AND host = ?",
        )
        .bind(owner)
        .bind(host)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?
        .map(Endpoint::try_from)
        .transpose()
    }

    async fn find_by_owner_and_id(
        &self,
        owner: OwnerId,
        id: EndpointId,
    ) -> Result<Option<Endpoint>, StoreError> {
        sqlx::query_as::<_, EndpointRow>(
            "SELECT id, owner_id, host, port, label, status, created_at
             FROM endpoints WHERE owner_id = ? AND id = ?",
        )
        .bind(owner)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?
        .map(Endpoint::try_from)
        .transpose()
    }

    async fn update_status(
        &self,
        id: EndpointId,
        status: EndpointStatus,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE endpoints SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, owner: OwnerId, id: EndpointId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM endpoints WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_all(&self) -> Result<Vec<Endpoint>, StoreError> {
        let rows = sqlx::query_as::<_, EndpointRow>(
            "SELECT id, owner_id, host, port, label, status, created_at
             FROM endpoints ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;
        into_endpoints(rows)
    }
}
