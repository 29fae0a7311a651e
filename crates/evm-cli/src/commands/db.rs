use anyhow::{Context, Result};
use evm_db::StoreOptions;

use super::{display_dsn, resolve_dsn};

pub async fn init(dsn: Option<String>, events_table: &str, log_table: Option<&str>) -> Result<()> {
    let dsn = resolve_dsn(dsn)?;
    let opts = StoreOptions {
        create_if_missing: true,
        ..StoreOptions::default()
    };
    let store = evm_db::connect(&dsn, &opts)
        .await
        .with_context(|| format!("failed to open store {}", display_dsn(&dsn)))?;

    store
        .ensure_schema(events_table, log_table)
        .await
        .context("db init failed")?;

    println!("schema_ready=true");
    println!("backend={}", store.backend());
    println!("events_table={events_table}");
    println!("log_table={}", log_table.unwrap_or(""));
    Ok(())
}

pub async fn status(
    dsn: Option<String>,
    events_table: &str,
    log_table: Option<&str>,
) -> Result<()> {
    let dsn = resolve_dsn(dsn)?;
    let store = evm_db::connect(&dsn, &StoreOptions::default())
        .await
        .with_context(|| format!("failed to open store {}", display_dsn(&dsn)))?;

    let s = store
        .status(events_table, log_table)
        .await
        .context("db status failed")?;

    print!(
        "db_ok={} backend={} has_events_table={}",
        s.ok,
        store.backend(),
        s.has_events_table
    );
    match s.has_log_table {
        Some(v) => println!(" has_log_table={v}"),
        None => println!(),
    }
    Ok(())
}
