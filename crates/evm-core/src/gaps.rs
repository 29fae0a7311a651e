use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::Interval;

/// Interior gaps repaired per controller per run unless configured otherwise.
pub const DEFAULT_MAX_INTERIOR_GAPS: usize = 2;

/// Where a missing band sits relative to what is already mirrored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GapKind {
    /// After the newest stored index: events not seen yet.
    Tail,
    /// Before the oldest stored index: backfill.
    Head,
    /// Hole between two stored indices.
    Interior,
}

impl GapKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GapKind::Tail => "tail",
            GapKind::Head => "head",
            GapKind::Interior => "interior",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gap {
    pub kind: GapKind,
    pub interval: Interval,
}

impl Gap {
    fn new(kind: GapKind, from: u32, to: u32) -> Option<Self> {
        Interval::new(from, to).map(|interval| Self { kind, interval })
    }
}

/// Compute the bands of indices not yet present in the store.
///
/// Order is fixed and significant to the fetch planner:
/// 1. tail `[last_stored + 1, u32::MAX]` (always present; `[1, u32::MAX]` when nothing is stored)
/// 2. head `[1, first_stored - 1]` when `first_stored > 1`
/// 3. up to `max_interior_gaps` interior holes, oldest first
/// Holes past the cap are left for later runs.
pub fn missing_intervals(stored: &BTreeSet<u32>, max_interior_gaps: usize) -> Vec<Gap> {
    let mut gaps = Vec::new();

    let first_stored = stored.first().copied();
    let last_stored = stored.last().copied();

    let tail_from = last_stored.map_or(1, |last| last.saturating_add(1));
    gaps.extend(Gap::new(GapKind::Tail, tail_from, u32::MAX));

    if let Some(first) = first_stored {
        if first > 1 {
            gaps.extend(Gap::new(GapKind::Head, 1, first - 1));
        }
    }

    let mut budget = max_interior_gaps;
    let mut prev: Option<u32> = None;
    for &ix in stored {
        if budget == 0 {
            break;
        }
        if let Some(p) = prev {
            // ix > p, so p + 1 and ix - 1 cannot overflow.
            if ix - p > 1 {
                gaps.extend(Gap::new(GapKind::Interior, p + 1, ix - 1));
                budget -= 1;
            }
        }
        prev = Some(ix);
    }

    gaps
}
