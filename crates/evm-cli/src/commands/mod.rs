//! Command handler modules for the `evm` binary.
//!
//! Shared helpers live here; command-specific logic lives in the submodules.

pub mod db;
pub mod get_events;

use anyhow::{bail, Result};
use evm_db::{redact_dsn, ENV_DB_URL};

/// `--dsn` wins; otherwise the environment. Config files never carry a DSN.
pub fn resolve_dsn(flag: Option<String>) -> Result<String> {
    let dsn = match flag {
        Some(v) => v,
        None => match std::env::var(ENV_DB_URL) {
            Ok(v) => v,
            Err(_) => bail!("no store DSN: pass --dsn or set {ENV_DB_URL}"),
        },
    };

    if dsn.trim().is_empty() {
        bail!("empty store DSN");
    }
    Ok(dsn)
}

/// DSN as it may appear in stdout or logs.
pub fn display_dsn(dsn: &str) -> String {
    redact_dsn(dsn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_wins_over_env() {
        assert_eq!(
            resolve_dsn(Some("sqlite3:///tmp/a.db".to_string())).unwrap(),
            "sqlite3:///tmp/a.db"
        );
        assert!(resolve_dsn(Some("  ".to_string())).is_err());
    }

    #[test]
    fn display_hides_password() {
        assert_eq!(
            display_dsn("postgresql://evm:pw@db:5432/events"),
            "postgresql://REDACTED@db:5432/events"
        );
    }
}
