//! evm-runtime
//!
//! Executes one reconciliation run: per controller, read live bounds and the
//! stored-index snapshot, plan the bounded fetch, query the device, then
//! persist everything in a single store write.
//!
//! Architectural decisions:
//! - Controller passes are independent; one failing never stops the others
//! - Per-index transport errors are skipped, never fatal (next run retries)
//! - Exactly one `append` per run, after every pass has finished
//! - Run parameters arrive as an explicit [`RunConfig`], never global state

mod driver;
mod fetcher;

pub use driver::{
    ControllerError, ControllerFailure, ControllerReport, Phase, Reconciler, RunConfig, RunError,
    RunOutcome, RunReport, OPS_LOG_OPERATION,
};
pub use fetcher::{fetch_planned, FetchOutcome};
