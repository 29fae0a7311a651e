//! Scenario: PostgreSQL event store upsert and index snapshot.
//!
//! # Invariant under test
//! Appending the same `(controller, index)` twice leaves one row, and
//! `stored_indices` sees placeholders.
//!
//! DB-backed test, skipped if EVM_DATABASE_URL is not set.

use evm_core::Event;
use evm_db::{connect, StoreOptions};

#[tokio::test]
async fn pg_upsert_is_idempotent() -> anyhow::Result<()> {
    let url = match std::env::var(evm_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: EVM_DATABASE_URL not set");
            return Ok(());
        }
    };

    let table = format!("evm_test_events_{}", std::process::id());
    let store = connect(&url, &StoreOptions::default()).await?;
    store.ensure_schema(&table, None).await?;

    let controller = 405419896;
    store
        .append(&table, &[Event::placeholder(controller, 11), Event::placeholder(controller, 12)])
        .await?;
    store
        .append(&table, &[Event::placeholder(controller, 12)])
        .await?;

    let got: Vec<u32> = store
        .stored_indices(&table, controller)
        .await?
        .into_iter()
        .collect();
    assert_eq!(got, vec![11, 12]);

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(1)
        .connect(&url)
        .await?;
    sqlx::query(&format!("drop table {table}"))
        .execute(&pool)
        .await?;
    Ok(())
}
