use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use evm_config::MirrorConfig;
use evm_db::StoreOptions;
use evm_device::HttpGateway;
use evm_runtime::{Reconciler, RunConfig, RunOutcome, RunReport};
use tracing::{debug, info};

use super::{display_dsn, resolve_dsn};
use crate::lock::{default_lockfile, RunLock};

/// Exit status when events were stored but some controllers aborted.
pub const EXIT_PARTIAL: u8 = 2;

pub struct GetEventsArgs {
    pub config_paths: Vec<String>,
    pub dsn: Option<String>,
    pub table_events: Option<String>,
    pub table_log: Option<String>,
    pub batch_size: Option<u32>,
    pub lockfile: Option<PathBuf>,
}

/// Flags override the config file.
fn run_config(cfg: &MirrorConfig, args: &GetEventsArgs) -> RunConfig {
    RunConfig {
        events_table: args
            .table_events
            .clone()
            .unwrap_or_else(|| cfg.store.events_table.clone()),
        log_table: args.table_log.clone().or_else(|| cfg.store.log_table.clone()),
        batch_size: args.batch_size.unwrap_or(cfg.reconcile.batch_size),
        max_interior_gaps: cfg.reconcile.max_interior_gaps,
        interior_gaps: cfg.reconcile.interior_gaps,
    }
}

pub async fn run(args: GetEventsArgs) -> Result<ExitCode> {
    let loaded = evm_config::load_layered_yaml(args.config_paths.as_slice())?;
    let cfg = MirrorConfig::from_loaded(&loaded)?;
    let dsn = resolve_dsn(args.dsn.clone())?;
    let run_cfg = run_config(&cfg, &args);

    let lock_path = args.lockfile.clone().unwrap_or_else(default_lockfile);
    let lock = RunLock::acquire(&lock_path)?;
    debug!(lockfile = %lock.path().display(), "lock acquired");

    let store = evm_db::connect(
        &dsn,
        &StoreOptions {
            timeout: cfg.store_timeout(),
            ..StoreOptions::default()
        },
    )
    .await
    .with_context(|| format!("failed to open store {}", display_dsn(&dsn)))?;

    let gateway = HttpGateway::new(cfg.gateway.base_url.clone(), cfg.gateway_timeout())
        .context("failed to build gateway client")?;

    info!(
        config_hash = %loaded.config_hash,
        controllers = cfg.controllers.len(),
        backend = store.backend(),
        events_table = %run_cfg.events_table,
        batch_size = run_cfg.batch_size,
        "get-events starting"
    );

    let report = Reconciler::new(&gateway, store.as_ref(), run_cfg)
        .run(&cfg.controllers)
        .await?;

    print_report(&loaded.config_hash, &report);

    Ok(match report.outcome() {
        RunOutcome::Complete => ExitCode::SUCCESS,
        RunOutcome::Partial => ExitCode::from(EXIT_PARTIAL),
    })
}

fn print_report(config_hash: &str, report: &RunReport) {
    println!("outcome={}", report.outcome().as_str());
    println!("config_hash={config_hash}");
    println!("events_fetched={}", report.events_fetched);
    println!("placeholders={}", report.placeholders);
    println!("transport_errors={}", report.transport_errors);
    println!("stored={}", report.stored);
    println!("errors={}", report.errors.len());

    for c in &report.controllers {
        println!(
            "controller={} first={} last={} current={} attempted={} events={} placeholders={} skipped_gaps={}",
            c.controller,
            c.bounds.first,
            c.bounds.last,
            c.bounds.current,
            c.attempted,
            c.events,
            c.placeholders,
            c.skipped_gaps
        );
    }
    for e in &report.errors {
        println!(
            "error controller={} phase={} failure=\"{}\"",
            e.controller,
            e.phase.as_str(),
            e.failure
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evm_core::InteriorGapPolicy;

    fn cfg() -> MirrorConfig {
        let loaded = evm_config::load_layered_yaml_from_strings(&[
            "controllers: [1]\ngateway: {base_url: 'http://b'}\nstore: {log_table: ops}\nreconcile: {interior_gaps: budgeted}\n",
        ])
        .unwrap();
        MirrorConfig::from_loaded(&loaded).unwrap()
    }

    fn args() -> GetEventsArgs {
        GetEventsArgs {
            config_paths: vec![],
            dsn: None,
            table_events: None,
            table_log: None,
            batch_size: None,
            lockfile: None,
        }
    }

    #[test]
    fn config_values_apply_without_flags() {
        let rc = run_config(&cfg(), &args());
        assert_eq!(rc.events_table, "events");
        assert_eq!(rc.log_table.as_deref(), Some("ops"));
        assert_eq!(rc.batch_size, 5);
        assert_eq!(rc.interior_gaps, InteriorGapPolicy::Budgeted);
    }

    #[test]
    fn flags_override_config() {
        let a = GetEventsArgs {
            table_events: Some("ev2".to_string()),
            table_log: Some("log2".to_string()),
            batch_size: Some(50),
            ..args()
        };
        let rc = run_config(&cfg(), &a);
        assert_eq!(rc.events_table, "ev2");
        assert_eq!(rc.log_table.as_deref(), Some("log2"));
        assert_eq!(rc.batch_size, 50);
    }
}
