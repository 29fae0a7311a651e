use std::fmt;

use evm_core::{
    missing_intervals, plan_fetch, ControllerBounds, ControllerId, Event, FetchPolicy,
    InteriorGapPolicy, DEFAULT_BATCH_SIZE, DEFAULT_MAX_INTERIOR_GAPS,
};
use evm_db::{EventStore, LogRecord, StoreError};
use evm_device::{DeviceError, DeviceGateway};
use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::fetcher::fetch_planned;

/// `operation` column of the per-run operations-log record.
pub const OPS_LOG_OPERATION: &str = "get-events";

/// Explicit parameters for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub events_table: String,
    /// When set, one summary record is appended per run.
    pub log_table: Option<String>,
    pub batch_size: u32,
    pub max_interior_gaps: usize,
    pub interior_gaps: InteriorGapPolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            events_table: "events".to_string(),
            log_table: None,
            batch_size: DEFAULT_BATCH_SIZE,
            max_interior_gaps: DEFAULT_MAX_INTERIOR_GAPS,
            interior_gaps: InteriorGapPolicy::default(),
        }
    }
}

impl RunConfig {
    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            batch_size: self.batch_size,
            interior: self.interior_gaps,
        }
    }
}

// ---------------------------------------------------------------------------
// Per-controller state and errors
// ---------------------------------------------------------------------------

/// Last phase a controller pass reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    BoundsFetched,
    IndicesFetched,
    GapsComputed,
    EventsFetched,
    Done,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Start => "start",
            Phase::BoundsFetched => "bounds-fetched",
            Phase::IndicesFetched => "indices-fetched",
            Phase::GapsComputed => "gaps-computed",
            Phase::EventsFetched => "events-fetched",
            Phase::Done => "done",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerFailure {
    /// Live bounds could not be read from the device.
    Bounds(DeviceError),
    /// The stored-index snapshot could not be read.
    StorageRead(StoreError),
}

impl fmt::Display for ControllerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerFailure::Bounds(e) => write!(f, "bounds: {e}"),
            ControllerFailure::StorageRead(e) => write!(f, "stored indices: {e}"),
        }
    }
}

/// A controller pass that aborted. The rest of the run carries on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerError {
    pub controller: ControllerId,
    /// Phase the pass had reached when it aborted.
    pub phase: Phase,
    pub failure: ControllerFailure,
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "controller {} aborted at {}: {}",
            self.controller,
            self.phase.as_str(),
            self.failure
        )
    }
}

impl std::error::Error for ControllerError {}

/// Counters for a completed controller pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerReport {
    pub controller: ControllerId,
    pub bounds: ControllerBounds,
    pub stored_before: usize,
    pub gaps: usize,
    /// Gaps outside the retrievable window.
    pub skipped_gaps: usize,
    pub attempted: usize,
    pub events: usize,
    pub placeholders: usize,
    pub transport_errors: usize,
    pub phase: Phase,
}

// ---------------------------------------------------------------------------
// Run result
// ---------------------------------------------------------------------------

/// The final store write failed; nothing from this run was persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    StorageWrite(StoreError),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::StorageWrite(e) => write!(f, "run failed, nothing persisted: {e}"),
        }
    }
}

impl std::error::Error for RunError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every controller pass completed.
    Complete,
    /// Events were persisted but at least one controller aborted.
    Partial,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Complete => "complete",
            RunOutcome::Partial => "partial",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Events handed to the store, placeholders included.
    pub events_fetched: usize,
    pub placeholders: usize,
    pub transport_errors: usize,
    /// Rows affected by the final append.
    pub stored: u64,
    /// Completed passes, in controller order.
    pub controllers: Vec<ControllerReport>,
    /// Aborted passes, in controller order.
    pub errors: Vec<ControllerError>,
}

impl RunReport {
    pub fn outcome(&self) -> RunOutcome {
        if self.errors.is_empty() {
            RunOutcome::Complete
        } else {
            RunOutcome::Partial
        }
    }

    /// Operations-log detail text.
    pub fn summary(&self) -> String {
        format!("records:{}  errors:{}", self.events_fetched, self.errors.len())
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

struct ControllerPass {
    report: ControllerReport,
    events: Vec<Event>,
}

pub struct Reconciler<'a> {
    gateway: &'a dyn DeviceGateway,
    store: &'a dyn EventStore,
    cfg: RunConfig,
}

impl<'a> Reconciler<'a> {
    pub fn new(gateway: &'a dyn DeviceGateway, store: &'a dyn EventStore, cfg: RunConfig) -> Self {
        Self {
            gateway,
            store,
            cfg,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.cfg
    }

    /// One run over `controllers`.
    ///
    /// Passes run concurrently; results are gathered in controller order and
    /// written with a single `append`. `Err` only when that write fails.
    pub async fn run(&self, controllers: &[ControllerId]) -> Result<RunReport, RunError> {
        let passes = join_all(controllers.iter().map(|&c| self.reconcile_controller(c))).await;

        let mut report = RunReport::default();
        let mut batch: Vec<Event> = Vec::new();

        for pass in passes {
            match pass {
                Ok(pass) => {
                    report.placeholders += pass.report.placeholders;
                    report.transport_errors += pass.report.transport_errors;
                    batch.extend(pass.events);
                    report.controllers.push(pass.report);
                }
                Err(err) => {
                    warn!(
                        controller = err.controller,
                        phase = err.phase.as_str(),
                        error = %err.failure,
                        "controller skipped"
                    );
                    report.errors.push(err);
                }
            }
        }
        report.events_fetched = batch.len();

        if batch.is_empty() {
            debug!("no events to store");
        } else {
            report.stored = self
                .store
                .append(&self.cfg.events_table, &batch)
                .await
                .map_err(RunError::StorageWrite)?;
        }

        self.write_ops_log(&report).await;

        info!(
            fetched = report.events_fetched,
            placeholders = report.placeholders,
            stored = report.stored,
            errors = report.errors.len(),
            outcome = report.outcome().as_str(),
            "get-events finished"
        );
        Ok(report)
    }

    async fn reconcile_controller(
        &self,
        controller: ControllerId,
    ) -> Result<ControllerPass, ControllerError> {
        let abort = |phase: Phase, failure: ControllerFailure| ControllerError {
            controller,
            phase,
            failure,
        };

        info!(controller, "get-events");

        let bounds = self
            .gateway
            .bounds(controller)
            .await
            .map_err(|e| abort(Phase::Start, ControllerFailure::Bounds(e)))?;
        debug!(
            controller,
            first = bounds.first,
            last = bounds.last,
            current = bounds.current,
            "bounds"
        );

        let stored = self
            .store
            .stored_indices(&self.cfg.events_table, controller)
            .await
            .map_err(|e| abort(Phase::BoundsFetched, ControllerFailure::StorageRead(e)))?;

        let gaps = missing_intervals(&stored, self.cfg.max_interior_gaps);
        let plan = plan_fetch(&gaps, &bounds, &self.cfg.fetch_policy());
        for g in &plan.skipped {
            debug!(
                controller,
                kind = g.kind.as_str(),
                interval = %g.interval,
                "gap outside retrievable window"
            );
        }

        let outcome = fetch_planned(self.gateway, controller, &plan).await;

        Ok(ControllerPass {
            report: ControllerReport {
                controller,
                bounds,
                stored_before: stored.len(),
                gaps: gaps.len(),
                skipped_gaps: plan.skipped.len(),
                attempted: outcome.attempted,
                events: outcome.events.len(),
                placeholders: outcome.placeholders,
                transport_errors: outcome.transport_errors,
                phase: Phase::Done,
            },
            events: outcome.events,
        })
    }

    /// Summary record for the run. A failure here only warns; the events
    /// are already committed.
    async fn write_ops_log(&self, report: &RunReport) {
        let Some(table) = self.cfg.log_table.as_deref() else {
            return;
        };

        let record = LogRecord::new(OPS_LOG_OPERATION, report.summary());
        if let Err(err) = self.store.log(table, &[record]).await {
            warn!(table, error = %err, "operations log write failed");
        }
    }
}
