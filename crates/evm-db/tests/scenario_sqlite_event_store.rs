//! Scenario: SQLite event store round trip.
//!
//! # Invariants under test
//! - `append` is an idempotent upsert keyed on `(controller, index)`.
//! - `stored_indices` reports placeholders alongside full records and is
//!   scoped to one controller.
//! - A failed batch leaves no rows behind.
//!
//! Uses a temp-dir database file; no external services required.

use chrono::NaiveDate;
use evm_core::Event;
use evm_db::{connect, EventStore, LogRecord, SqliteEventStore, StoreError, StoreOptions};
use sqlx::Row;
use tempfile::TempDir;

const EVENTS: &str = "events";
const OPS_LOG: &str = "ops_log";

async fn fresh_store(dir: &TempDir) -> anyhow::Result<Box<dyn EventStore>> {
    let dsn = format!("sqlite3://{}", dir.path().join("evm.db").display());
    let opts = StoreOptions {
        create_if_missing: true,
        ..StoreOptions::default()
    };
    let store = connect(&dsn, &opts).await?;
    store.ensure_schema(EVENTS, Some(OPS_LOG)).await?;
    Ok(store)
}

fn event(controller: u32, index: u32, card: u32) -> Event {
    Event {
        controller_id: controller,
        index,
        timestamp: NaiveDate::from_ymd_opt(2024, 5, 1).and_then(|d| d.and_hms_opt(8, 15, 42)),
        event_type: 1,
        granted: true,
        door: 2,
        direction: 1,
        card_number: card,
        reason: 1,
    }
}

#[tokio::test]
async fn append_then_read_indices() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let store = fresh_store(&dir).await?;

    let batch = vec![
        event(100, 3, 1),
        event(100, 1, 1),
        Event::placeholder(100, 2),
        event(200, 9, 1),
    ];
    assert_eq!(store.append(EVENTS, &batch).await?, 4);

    let got: Vec<u32> = store.stored_indices(EVENTS, 100).await?.into_iter().collect();
    assert_eq!(got, vec![1, 2, 3]);

    let other: Vec<u32> = store.stored_indices(EVENTS, 200).await?.into_iter().collect();
    assert_eq!(other, vec![9]);

    assert!(store.stored_indices(EVENTS, 300).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn re_append_is_upsert_not_duplicate() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("evm.db");
    let opts = StoreOptions {
        create_if_missing: true,
        ..StoreOptions::default()
    };
    let store = SqliteEventStore::open(&path.to_string_lossy(), &opts).await?;
    store.ensure_schema(EVENTS, None).await?;

    store.append(EVENTS, &[Event::placeholder(100, 5)]).await?;
    store.append(EVENTS, &[event(100, 5, 4242)]).await?;

    let rows = sqlx::query("select card_number from events where controller = 100")
        .fetch_all(store.pool())
        .await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get::<i64, _>("card_number"), 4242);
    Ok(())
}

#[tokio::test]
async fn failed_batch_writes_nothing() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("evm.db");
    let opts = StoreOptions {
        create_if_missing: true,
        ..StoreOptions::default()
    };
    let store = SqliteEventStore::open(&path.to_string_lossy(), &opts).await?;
    store.ensure_schema(EVENTS, None).await?;

    // Trigger aborts the transaction on the third row.
    sqlx::query(
        r#"
        create trigger reject_seven before insert on events
        when new.event_index = 7
        begin select raise(abort, 'rejected'); end
        "#,
    )
    .execute(store.pool())
    .await?;

    let batch = vec![event(100, 5, 1), event(100, 6, 1), event(100, 7, 1)];
    let err = store.append(EVENTS, &batch).await.unwrap_err();
    assert!(matches!(err, StoreError::Write(_)), "got {err:?}");

    assert!(store.stored_indices(EVENTS, 100).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn status_reports_tables_and_log_appends() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let store = fresh_store(&dir).await?;

    let st = store.status(EVENTS, Some(OPS_LOG)).await?;
    assert!(st.ok);
    assert!(st.has_events_table);
    assert_eq!(st.has_log_table, Some(true));

    let st = store.status("not_created", None).await?;
    assert!(!st.has_events_table);
    assert_eq!(st.has_log_table, None);

    let n = store
        .log(OPS_LOG, &[LogRecord::new("get-events", "records:3  errors:0")])
        .await?;
    assert_eq!(n, 1);
    Ok(())
}

#[tokio::test]
async fn missing_file_without_create_is_connect_error() {
    let dir = TempDir::new().unwrap();
    let dsn = format!("sqlite3://{}", dir.path().join("absent.db").display());
    let err = connect(&dsn, &StoreOptions::default()).await.err().unwrap();
    assert!(matches!(err, StoreError::Connect(_)), "got {err:?}");
}

#[tokio::test]
async fn bad_table_name_never_reaches_sql() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let store = fresh_store(&dir).await?;

    let err = store
        .stored_indices("events; drop table events", 1)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        StoreError::InvalidTable("events; drop table events".to_string())
    );
    assert!(store.status(EVENTS, None).await?.has_events_table);
    Ok(())
}
