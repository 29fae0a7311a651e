use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use evm_core::{ControllerId, Event};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::debug;

use crate::sql::Dialect;
use crate::{
    collect_indices, validate_table_name, with_timeout, EventStore, LogRecord, StoreError,
    StoreOptions, StoreStatus,
};

const DIALECT: Dialect = Dialect::Sqlite;

/// SQLite file-backed [`EventStore`].
#[derive(Debug, Clone)]
pub struct SqliteEventStore {
    pool: SqlitePool,
    timeout: Duration,
}

impl SqliteEventStore {
    /// Open the database file at `path`. A missing file is a connect error
    /// unless `opts.create_if_missing` is set.
    pub async fn open(path: &str, opts: &StoreOptions) -> Result<Self, StoreError> {
        if !opts.create_if_missing && !Path::new(path).exists() {
            return Err(StoreError::Connect(format!(
                "database file {path} does not exist"
            )));
        }

        let connect = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(opts.create_if_missing);

        let pool = with_timeout(opts.timeout, "connect", async {
            SqlitePoolOptions::new()
                .max_connections(opts.max_connections)
                .acquire_timeout(opts.timeout)
                .connect_with(connect)
                .await
                .map_err(|e| StoreError::Connect(e.to_string()))
        })
        .await?;

        Ok(Self::from_pool(pool, opts.timeout))
    }

    pub fn from_pool(pool: SqlitePool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        let n: i64 = sqlx::query_scalar(DIALECT.table_exists())
            .bind(table)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::read)?;
        Ok(n > 0)
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn stored_indices(
        &self,
        table: &str,
        controller: ControllerId,
    ) -> Result<BTreeSet<u32>, StoreError> {
        let sql = DIALECT.select_indices(validate_table_name(table)?);

        with_timeout(self.timeout, "stored_indices", async {
            let rows: Vec<i64> = sqlx::query_scalar(&sql)
                .bind(i64::from(controller))
                .fetch_all(&self.pool)
                .await
                .map_err(StoreError::read)?;
            collect_indices(rows)
        })
        .await
    }

    async fn append(&self, table: &str, events: &[Event]) -> Result<u64, StoreError> {
        let sql = DIALECT.upsert_event(validate_table_name(table)?);
        if events.is_empty() {
            return Ok(0);
        }

        with_timeout(self.timeout, "append", async {
            let mut tx = self.pool.begin().await.map_err(StoreError::write)?;
            let mut affected = 0;
            for e in events {
                affected += sqlx::query(&sql)
                    .bind(i64::from(e.controller_id))
                    .bind(i64::from(e.index))
                    .bind(e.timestamp)
                    .bind(i32::from(e.event_type))
                    .bind(e.granted)
                    .bind(i32::from(e.door))
                    .bind(i32::from(e.direction))
                    .bind(i64::from(e.card_number))
                    .bind(i32::from(e.reason))
                    .execute(&mut *tx)
                    .await
                    .map_err(StoreError::write)?
                    .rows_affected();
            }
            tx.commit().await.map_err(StoreError::write)?;
            debug!(table, rows = affected, "append committed");
            Ok(affected)
        })
        .await
    }

    async fn log(&self, table: &str, records: &[LogRecord]) -> Result<u64, StoreError> {
        let sql = DIALECT.insert_log(validate_table_name(table)?);
        if records.is_empty() {
            return Ok(0);
        }

        with_timeout(self.timeout, "log", async {
            let mut tx = self.pool.begin().await.map_err(StoreError::write)?;
            let mut affected = 0;
            for r in records {
                affected += sqlx::query(&sql)
                    .bind(r.logged_at)
                    .bind(&r.operation)
                    .bind(r.controller.map(i64::from))
                    .bind(&r.detail)
                    .execute(&mut *tx)
                    .await
                    .map_err(StoreError::write)?
                    .rows_affected();
            }
            tx.commit().await.map_err(StoreError::write)?;
            Ok(affected)
        })
        .await
    }

    async fn ensure_schema(
        &self,
        events_table: &str,
        log_table: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut ddl = vec![DIALECT.create_events_table(validate_table_name(events_table)?)];
        if let Some(t) = log_table {
            ddl.push(DIALECT.create_log_table(validate_table_name(t)?));
        }

        with_timeout(self.timeout, "ensure_schema", async {
            for stmt in &ddl {
                sqlx::query(stmt)
                    .execute(&self.pool)
                    .await
                    .map_err(StoreError::write)?;
            }
            Ok(())
        })
        .await
    }

    async fn status(
        &self,
        events_table: &str,
        log_table: Option<&str>,
    ) -> Result<StoreStatus, StoreError> {
        let events_table = validate_table_name(events_table)?;
        let log_table = log_table.map(validate_table_name).transpose()?;

        with_timeout(self.timeout, "status", async {
            let (one,): (i32,) = sqlx::query_as("select 1")
                .fetch_one(&self.pool)
                .await
                .map_err(StoreError::read)?;

            let has_events_table = self.table_exists(events_table).await?;
            let has_log_table = match log_table {
                Some(t) => Some(self.table_exists(t).await?),
                None => None,
            };

            Ok(StoreStatus {
                ok: one == 1,
                has_events_table,
                has_log_table,
            })
        })
        .await
    }
}
