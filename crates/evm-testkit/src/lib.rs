//! evm-testkit
//!
//! In-memory fakes for the two runtime boundaries:
//! - [`MemoryEventStore`]: an [`EventStore`] with switchable read/write failures
//! - [`ScriptedGateway`]: controllers with fixed buffers, empty slots and
//!   failing indices, recording every fetch it serves
//!
//! Scenario tests under `tests/` drive the reconciler against these.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use evm_core::{ControllerBounds, ControllerId, Event, INDEX_EARLIEST, INDEX_LATEST};
use evm_db::{validate_table_name, EventStore, LogRecord, StoreError, StoreStatus};
use evm_device::{DeviceError, DeviceGateway};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking test thread must not hide the state from the assertions.
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// MemoryEventStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct StoreState {
    tables: BTreeMap<String, BTreeMap<(ControllerId, u32), Event>>,
    log: Vec<(String, LogRecord)>,
    fail_reads: BTreeSet<ControllerId>,
    fail_writes: bool,
    fail_log: bool,
    append_calls: usize,
}

/// Upserting in-memory store keyed on `(controller, index)` per table.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    state: Mutex<StoreState>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate `table`.
    pub fn seed(&self, table: &str, events: impl IntoIterator<Item = Event>) {
        let mut st = lock(&self.state);
        let rows = st.tables.entry(table.to_string()).or_default();
        for e in events {
            rows.insert(e.key(), e);
        }
    }

    /// `stored_indices` fails for this controller.
    pub fn fail_reads_for(&self, controller: ControllerId) {
        lock(&self.state).fail_reads.insert(controller);
    }

    /// `append` fails for every call.
    pub fn fail_writes(&self, on: bool) {
        lock(&self.state).fail_writes = on;
    }

    /// `log` fails for every call.
    pub fn fail_log(&self, on: bool) {
        lock(&self.state).fail_log = on;
    }

    pub fn events(&self, table: &str) -> Vec<Event> {
        lock(&self.state)
            .tables
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn indices(&self, table: &str, controller: ControllerId) -> Vec<u32> {
        lock(&self.state)
            .tables
            .get(table)
            .map(|rows| {
                rows.keys()
                    .filter(|(c, _)| *c == controller)
                    .map(|(_, ix)| *ix)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn log_records(&self, table: &str) -> Vec<LogRecord> {
        lock(&self.state)
            .log
            .iter()
            .filter(|(t, _)| t == table)
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub fn append_calls(&self) -> usize {
        lock(&self.state).append_calls
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn stored_indices(
        &self,
        table: &str,
        controller: ControllerId,
    ) -> Result<BTreeSet<u32>, StoreError> {
        validate_table_name(table)?;
        let st = lock(&self.state);
        if st.fail_reads.contains(&controller) {
            return Err(StoreError::Read(format!(
                "injected read failure for controller {controller}"
            )));
        }
        Ok(st
            .tables
            .get(table)
            .map(|rows| {
                rows.keys()
                    .filter(|(c, _)| *c == controller)
                    .map(|(_, ix)| *ix)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn append(&self, table: &str, events: &[Event]) -> Result<u64, StoreError> {
        validate_table_name(table)?;
        let mut st = lock(&self.state);
        st.append_calls += 1;
        if st.fail_writes {
            return Err(StoreError::Write("injected write failure".to_string()));
        }
        let rows = st.tables.entry(table.to_string()).or_default();
        for e in events {
            rows.insert(e.key(), e.clone());
        }
        Ok(events.len() as u64)
    }

    async fn log(&self, table: &str, records: &[LogRecord]) -> Result<u64, StoreError> {
        validate_table_name(table)?;
        let mut st = lock(&self.state);
        if st.fail_log {
            return Err(StoreError::Write("injected log failure".to_string()));
        }
        st.log
            .extend(records.iter().map(|r| (table.to_string(), r.clone())));
        Ok(records.len() as u64)
    }

    async fn ensure_schema(
        &self,
        events_table: &str,
        log_table: Option<&str>,
    ) -> Result<(), StoreError> {
        validate_table_name(events_table)?;
        if let Some(t) = log_table {
            validate_table_name(t)?;
        }
        lock(&self.state)
            .tables
            .entry(events_table.to_string())
            .or_default();
        Ok(())
    }

    async fn status(
        &self,
        events_table: &str,
        log_table: Option<&str>,
    ) -> Result<StoreStatus, StoreError> {
        let st = lock(&self.state);
        Ok(StoreStatus {
            ok: true,
            has_events_table: st.tables.contains_key(events_table),
            has_log_table: log_table.map(|_| true),
        })
    }
}

// ---------------------------------------------------------------------------
// ScriptedGateway
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct ScriptedController {
    first: u32,
    last: u32,
    cursor: u32,
    empty: BTreeSet<u32>,
    failing: BTreeSet<u32>,
    bounds_error: Option<DeviceError>,
}

impl ScriptedController {
    fn holds(&self, index: u32) -> bool {
        self.last != 0 && self.first <= index && index <= self.last
    }
}

/// Deterministic payload for slot `index` of `controller`.
pub fn scripted_event(controller: ControllerId, index: u32) -> Event {
    Event {
        event_type: 1,
        granted: index % 2 == 0,
        door: (index % 4 + 1) as u8,
        direction: 1,
        card_number: 10_000_000 + index,
        reason: 1,
        ..Event::placeholder(controller, index)
    }
}

/// Controllers with a fixed retained window `[first, last]`.
///
/// Every non-sentinel `get_event` is recorded (see [`ScriptedGateway::fetches`]);
/// the bounds queries are not.
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    controllers: BTreeMap<ControllerId, ScriptedController>,
    fetches: Mutex<Vec<(ControllerId, u32)>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// A controller retaining `window`; the write cursor sits on its last slot.
    pub fn controller(mut self, id: ControllerId, window: RangeInclusive<u32>) -> Self {
        self.controllers.insert(
            id,
            ScriptedController {
                first: *window.start(),
                last: *window.end(),
                cursor: *window.end(),
                empty: BTreeSet::new(),
                failing: BTreeSet::new(),
                bounds_error: None,
            },
        );
        self
    }

    /// A controller that has recorded nothing yet.
    pub fn empty_controller(mut self, id: ControllerId) -> Self {
        self.controllers.insert(
            id,
            ScriptedController {
                first: 0,
                last: 0,
                cursor: 0,
                empty: BTreeSet::new(),
                failing: BTreeSet::new(),
                bounds_error: None,
            },
        );
        self
    }

    /// Slot `index` answers "empty".
    pub fn empty_slot(mut self, id: ControllerId, index: u32) -> Self {
        if let Some(c) = self.controllers.get_mut(&id) {
            c.empty.insert(index);
        }
        self
    }

    /// Slot `index` answers with a transport error.
    pub fn failing_index(mut self, id: ControllerId, index: u32) -> Self {
        if let Some(c) = self.controllers.get_mut(&id) {
            c.failing.insert(index);
        }
        self
    }

    /// Bounds queries for this controller fail with `err`.
    pub fn bounds_failure(mut self, id: ControllerId, err: DeviceError) -> Self {
        if let Some(c) = self.controllers.get_mut(&id) {
            c.bounds_error = Some(err);
        }
        self
    }

    /// Every served fetch, in call order.
    pub fn fetches(&self) -> Vec<(ControllerId, u32)> {
        lock(&self.fetches).clone()
    }

    pub fn fetches_for(&self, id: ControllerId) -> Vec<u32> {
        lock(&self.fetches)
            .iter()
            .filter(|(c, _)| *c == id)
            .map(|(_, ix)| *ix)
            .collect()
    }

    pub fn clear_fetches(&self) {
        lock(&self.fetches).clear();
    }

    fn scripted(&self, id: ControllerId) -> Result<&ScriptedController, DeviceError> {
        self.controllers
            .get(&id)
            .ok_or_else(|| DeviceError::Transport(format!("no route to controller {id}")))
    }
}

#[async_trait]
impl DeviceGateway for ScriptedGateway {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn get_event(
        &self,
        controller: ControllerId,
        index: u32,
    ) -> Result<Option<Event>, DeviceError> {
        let c = self.scripted(controller)?;

        if index == INDEX_EARLIEST || index == INDEX_LATEST {
            if let Some(err) = &c.bounds_error {
                return Err(err.clone());
            }
            if c.last == 0 {
                return Ok(None);
            }
            let ix = if index == INDEX_EARLIEST { c.first } else { c.last };
            return Ok(Some(scripted_event(controller, ix)));
        }

        lock(&self.fetches).push((controller, index));

        if c.failing.contains(&index) {
            return Err(DeviceError::Timeout);
        }
        if !c.holds(index) || c.empty.contains(&index) {
            return Ok(None);
        }
        Ok(Some(scripted_event(controller, index)))
    }

    async fn get_event_index(&self, controller: ControllerId) -> Result<u32, DeviceError> {
        let c = self.scripted(controller)?;
        match &c.bounds_error {
            Some(err) => Err(err.clone()),
            None => Ok(c.cursor),
        }
    }
}

/// Bounds as the scripted controller reports them.
pub fn scripted_bounds(window: RangeInclusive<u32>) -> ControllerBounds {
    ControllerBounds::new(*window.start(), *window.end(), *window.end())
}
