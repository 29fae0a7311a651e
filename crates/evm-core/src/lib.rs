//! evm-core
//!
//! Event mirror reconciliation model.
//!
//! Architectural decisions:
//! - `(controller_id, index)` is the identity of an event; stores upsert on it
//! - An empty hardware slot is mirrored as a placeholder so it is never retried
//! - Gaps are recomputed every run from the stored-index snapshot (no persisted cursor)
//! - Fetch order and budget are deterministic for identical inputs
//!
//! Pure deterministic logic. No IO, no wall-clock. The runtime supplies the
//! stored indices and the live controller bounds.

mod gaps;
mod plan;

pub use gaps::{missing_intervals, Gap, GapKind, DEFAULT_MAX_INTERIOR_GAPS};
pub use plan::{plan_fetch, FetchPlan, FetchPolicy, InteriorGapPolicy, PlannedFetch, Walk, DEFAULT_BATCH_SIZE};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Controller serial number.
pub type ControllerId = u32;

/// Query sentinel: "oldest event still held by the controller".
pub const INDEX_EARLIEST: u32 = 0;

/// Query sentinel: "newest event recorded by the controller".
pub const INDEX_LATEST: u32 = 0xFFFF_FFFF;

/// One hardware access-log entry.
///
/// Only `controller_id` and `index` matter to reconciliation; the payload is
/// carried through to the store untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub controller_id: ControllerId,
    /// 1-based slot number in the controller's ring buffer.
    pub index: u32,
    pub timestamp: Option<NaiveDateTime>,
    pub event_type: u8,
    pub granted: bool,
    pub door: u8,
    pub direction: u8,
    pub card_number: u32,
    pub reason: u8,
}

impl Event {
    /// Record for a slot the controller reported as empty.
    ///
    /// Persisting it marks the index as seen, so later runs stop asking the
    /// controller for something it can no longer serve.
    pub fn placeholder(controller_id: ControllerId, index: u32) -> Self {
        Self {
            controller_id,
            index,
            ..Self::default()
        }
    }

    pub fn key(&self) -> (ControllerId, u32) {
        (self.controller_id, self.index)
    }

    pub fn is_placeholder(&self) -> bool {
        *self == Self::placeholder(self.controller_id, self.index)
    }
}

/// Inclusive index range `[from, to]`, `from <= to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub from: u32,
    pub to: u32,
}

impl Interval {
    /// Returns `None` for an inverted range.
    pub fn new(from: u32, to: u32) -> Option<Self> {
        (from <= to).then_some(Self { from, to })
    }

    pub fn contains(&self, index: u32) -> bool {
        self.from <= index && index <= self.to
    }

    /// Number of indices covered (u64: `[0, u32::MAX]` holds 2^32 values).
    pub fn span(&self) -> u64 {
        u64::from(self.to) - u64::from(self.from) + 1
    }

    /// True when the whole interval lies inside `[first, last]`.
    pub fn is_within(&self, first: u32, last: u32) -> bool {
        self.from >= first && self.to <= last
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.from, self.to)
    }
}

/// Live buffer bounds reported by a controller.
///
/// `first`/`last` are the oldest/newest retrievable indices (older ones may
/// already be overwritten); `current` is the controller's own write cursor.
/// `0` means the controller returned nothing for that query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerBounds {
    pub first: u32,
    pub last: u32,
    pub current: u32,
}

impl ControllerBounds {
    pub fn new(first: u32, last: u32, current: u32) -> Self {
        Self { first, last, current }
    }

    /// Controller holds no retrievable events.
    pub fn is_empty(&self) -> bool {
        self.last == 0
    }

    pub fn contains(&self, index: u32) -> bool {
        !self.is_empty() && self.first <= index && index <= self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_has_zero_payload() {
        let e = Event::placeholder(405419896, 17);
        assert_eq!(e.key(), (405419896, 17));
        assert!(e.timestamp.is_none());
        assert!(!e.granted);
        assert_eq!(e.card_number, 0);
        assert!(e.is_placeholder());
    }

    #[test]
    fn populated_event_is_not_placeholder() {
        let mut e = Event::placeholder(1, 2);
        e.card_number = 10058400;
        assert!(!e.is_placeholder());
    }

    #[test]
    fn interval_rejects_inverted_range() {
        assert!(Interval::new(5, 4).is_none());
        assert_eq!(Interval::new(4, 4).map(|i| i.span()), Some(1));
    }

    #[test]
    fn interval_len_covers_full_u32_range() {
        let all = Interval::new(0, u32::MAX).unwrap();
        assert_eq!(all.span(), 1_u64 << 32);
    }

    #[test]
    fn interval_within_bounds() {
        let i = Interval::new(4, 6).unwrap();
        assert!(i.is_within(1, 12));
        assert!(i.is_within(4, 6));
        assert!(!i.is_within(5, 12));
        assert!(!i.is_within(1, 5));
    }

    #[test]
    fn empty_bounds_contain_nothing() {
        let b = ControllerBounds::default();
        assert!(b.is_empty());
        assert!(!b.contains(0));
        assert!(!b.contains(1));
    }
}
