//! evm-db
//!
//! Event store capability and its backends.
//!
//! - One trait ([`EventStore`]); the runtime depends on nothing else.
//! - Backend chosen at runtime from the DSN prefix ([`connect`]).
//! - Every call is bounded by the configured timeout; writes are one
//!   transaction per call, so a failed or timed-out batch leaves no rows.

mod postgres;
mod sql;
mod sqlite;

pub use postgres::PgEventStore;
pub use sql::Dialect;
pub use sqlite::SqliteEventStore;

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use evm_core::{ControllerId, Event};

pub const ENV_DB_URL: &str = "EVM_DATABASE_URL";

/// Default bound on one store round trip.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_TABLE_NAME_LEN: usize = 63;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// DSN prefix names no known backend.
    UnsupportedDsn(String),
    /// Database could not be opened or reached.
    Connect(String),
    /// Table name is not a plain SQL identifier.
    InvalidTable(String),
    /// A read query failed.
    Read(String),
    /// A write failed; the transaction was rolled back.
    Write(String),
    /// The round trip exceeded the store timeout.
    Timeout { op: &'static str },
}

impl StoreError {
    pub(crate) fn read(e: sqlx::Error) -> Self {
        StoreError::Read(e.to_string())
    }

    pub(crate) fn write(e: sqlx::Error) -> Self {
        StoreError::Write(e.to_string())
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::UnsupportedDsn(dsn) => write!(f, "unsupported DSN ({dsn})"),
            StoreError::Connect(msg) => write!(f, "store connect failed: {msg}"),
            StoreError::InvalidTable(t) => write!(f, "invalid table name '{t}'"),
            StoreError::Read(msg) => write!(f, "store read failed: {msg}"),
            StoreError::Write(msg) => write!(f, "store write failed: {msg}"),
            StoreError::Timeout { op } => write!(f, "store {op} timed out"),
        }
    }
}

impl std::error::Error for StoreError {}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One operations-log row (free-text run summary).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub logged_at: DateTime<Utc>,
    pub operation: String,
    /// `None` for run-wide records.
    pub controller: Option<ControllerId>,
    pub detail: String,
}

impl LogRecord {
    pub fn new(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            logged_at: Utc::now(),
            operation: operation.into(),
            controller: None,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStatus {
    pub ok: bool,
    pub has_events_table: bool,
    /// `None` when no log table was asked about.
    pub has_log_table: Option<bool>,
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// Destination store for mirrored events.
///
/// Table names are passed per call (they come from configuration) and are
/// validated with [`validate_table_name`] before reaching SQL.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Backend label (e.g. `"postgres"`).
    fn backend(&self) -> &'static str;

    /// Every index already stored for `controller`, placeholders included.
    async fn stored_indices(
        &self,
        table: &str,
        controller: ControllerId,
    ) -> Result<BTreeSet<u32>, StoreError>;

    /// Upsert `events` keyed on `(controller, index)` in one transaction.
    /// Returns rows affected. All-or-nothing.
    async fn append(&self, table: &str, events: &[Event]) -> Result<u64, StoreError>;

    /// Append operations-log records in one transaction.
    async fn log(&self, table: &str, records: &[LogRecord]) -> Result<u64, StoreError>;

    /// Create the events table (and log table) when missing.
    async fn ensure_schema(
        &self,
        events_table: &str,
        log_table: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Connectivity and table presence.
    async fn status(
        &self,
        events_table: &str,
        log_table: Option<&str>,
    ) -> Result<StoreStatus, StoreError>;
}

// ---------------------------------------------------------------------------
// DSN dispatch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Bound on each store round trip (and on pool acquisition).
    pub timeout: Duration,
    pub max_connections: u32,
    /// SQLite only: create the database file when it does not exist.
    pub create_if_missing: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_STORE_TIMEOUT,
            max_connections: 5,
            create_if_missing: false,
        }
    }
}

/// Backend selected from a DSN prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend<'a> {
    /// Full connection URL, passed through to the driver.
    Postgres(&'a str),
    /// Database file path.
    Sqlite(&'a str),
}

impl<'a> Backend<'a> {
    pub fn from_dsn(dsn: &'a str) -> Result<Self, StoreError> {
        let dsn = dsn.trim();
        if dsn.starts_with("postgresql://") || dsn.starts_with("postgres://") {
            return Ok(Backend::Postgres(dsn));
        }
        for prefix in ["sqlite3://", "sqlite://"] {
            if let Some(path) = dsn.strip_prefix(prefix) {
                if path.is_empty() {
                    break;
                }
                return Ok(Backend::Sqlite(path));
            }
        }
        Err(StoreError::UnsupportedDsn(redact_dsn(dsn)))
    }
}

/// Open the store named by `dsn`.
pub async fn connect(dsn: &str, opts: &StoreOptions) -> Result<Box<dyn EventStore>, StoreError> {
    match Backend::from_dsn(dsn)? {
        Backend::Postgres(url) => Ok(Box::new(PgEventStore::connect(url, opts).await?)),
        Backend::Sqlite(path) => Ok(Box::new(SqliteEventStore::open(path, opts).await?)),
    }
}

/// Drop inline credentials before a DSN reaches logs or error messages.
pub fn redact_dsn(dsn: &str) -> String {
    match (dsn.find("://"), dsn.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://REDACTED{}", &dsn[..scheme_end], &dsn[at..])
        }
        _ => dsn.to_string(),
    }
}

/// Accept plain identifiers only: `[A-Za-z_][A-Za-z0-9_]*`, at most 63 chars.
pub fn validate_table_name(name: &str) -> Result<&str, StoreError> {
    let mut chars = name.chars();
    let head_ok = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    let tail_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if head_ok && tail_ok && name.len() <= MAX_TABLE_NAME_LEN {
        Ok(name)
    } else {
        Err(StoreError::InvalidTable(name.to_string()))
    }
}

pub(crate) async fn with_timeout<T, F>(
    timeout: Duration,
    op: &'static str,
    fut: F,
) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| StoreError::Timeout { op })?
}

/// Stored indices arrive as BIGINT; anything outside u32 is corrupt data.
pub(crate) fn collect_indices(values: Vec<i64>) -> Result<BTreeSet<u32>, StoreError> {
    let mut out = BTreeSet::new();
    for v in values {
        let ix = u32::try_from(v)
            .map_err(|_| StoreError::Read(format!("event index out of range: {v}")))?;
        out.insert(ix);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dsn_dispatch_by_prefix() {
        assert_eq!(
            Backend::from_dsn("postgresql://evm@db.local/events").unwrap(),
            Backend::Postgres("postgresql://evm@db.local/events")
        );
        assert_eq!(
            Backend::from_dsn("postgres://localhost/x").unwrap(),
            Backend::Postgres("postgres://localhost/x")
        );
        assert_eq!(
            Backend::from_dsn("sqlite3://./db/ACL.db").unwrap(),
            Backend::Sqlite("./db/ACL.db")
        );
        assert_eq!(
            Backend::from_dsn("sqlite:///var/lib/evm.db").unwrap(),
            Backend::Sqlite("/var/lib/evm.db")
        );
    }

    #[test]
    fn unknown_dsn_is_rejected_and_redacted() {
        let err = Backend::from_dsn("mysql://root:hunter22@db/acl").unwrap_err();
        assert_eq!(err, StoreError::UnsupportedDsn("mysql://REDACTED@db/acl".to_string()));
        assert!(Backend::from_dsn("sqlite3://").is_err());
        assert!(Backend::from_dsn("").is_err());
    }

    #[test]
    fn table_names_must_be_identifiers() {
        assert!(validate_table_name("events").is_ok());
        assert!(validate_table_name("_ops_log2").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("2events").is_err());
        assert!(validate_table_name("events; drop table x").is_err());
        assert!(validate_table_name("public.events").is_err());
        assert!(validate_table_name(&"e".repeat(64)).is_err());
    }

    #[test]
    fn out_of_range_index_is_read_error() {
        let got = collect_indices(vec![1, i64::from(u32::MAX) + 1]);
        assert!(matches!(got, Err(StoreError::Read(_))));
        assert!(collect_indices(vec![-1]).is_err());

        let got = collect_indices(vec![3, 1, 3]).unwrap();
        assert_eq!(got.into_iter().collect::<Vec<_>>(), vec![1, 3]);
    }

    #[tokio::test]
    async fn slow_call_times_out() {
        let got: Result<(), StoreError> = with_timeout(Duration::from_millis(10), "append", async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;
        assert_eq!(got, Err(StoreError::Timeout { op: "append" }));
    }
}
