use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{ControllerBounds, Gap, GapKind};

/// Per-controller, per-run fetch budget unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: u32 = 5;

/// How interior gaps (holes strictly inside the retrievable window) are
/// charged against the run budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteriorGapPolicy {
    /// Fetch the whole hole once started, even past the budget. Interior gaps
    /// are few (capped by the gap analyzer) and are never left half filled.
    #[default]
    Complete,
    /// Same budget check as tail/head walks.
    Budgeted,
}

impl InteriorGapPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteriorGapPolicy::Complete => "complete",
            InteriorGapPolicy::Budgeted => "budgeted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    /// Maximum fetch attempts per controller per run (tail/head walks, and
    /// interior gaps under [`InteriorGapPolicy::Budgeted`]).
    pub batch_size: u32,
    pub interior: InteriorGapPolicy,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            interior: InteriorGapPolicy::Complete,
        }
    }
}

/// Direction an interval was walked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Walk {
    /// Interval holds the newest index: oldest-first up to `last`.
    Forward,
    /// Interval holds the oldest index: newest-first down to `first`.
    Backward,
    /// Interval lies inside the window: every index, ascending.
    Whole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedFetch {
    pub index: u32,
    pub gap: GapKind,
    pub walk: Walk,
}

/// Ordered list of indices to request from one controller this run.
///
/// Every planned index is one attempt against the budget, whatever the
/// device answers (event, empty slot, or transport failure).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchPlan {
    pub fetches: Vec<PlannedFetch>,
    /// Gaps entirely outside `[first, last]`: the controller can no longer serve them.
    pub skipped: Vec<Gap>,
}

impl FetchPlan {
    pub fn indices(&self) -> Vec<u32> {
        self.fetches.iter().map(|f| f.index).collect()
    }

    pub fn len(&self) -> usize {
        self.fetches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fetches.is_empty()
    }
}

struct PlanBuilder {
    plan: FetchPlan,
    seen: BTreeSet<u32>,
    consumed: u64,
    budget: u64,
}

impl PlanBuilder {
    fn exhausted(&self) -> bool {
        self.consumed >= self.budget
    }

    fn push(&mut self, index: u32, gap: GapKind, walk: Walk) {
        if self.seen.insert(index) {
            self.plan.fetches.push(PlannedFetch { index, gap, walk });
            self.consumed += 1;
        }
    }
}

/// Decide which indices to fetch, in which order, within the run budget.
///
/// Gaps are evaluated in the order given. For each one the first matching
/// rule applies:
/// - holds `last`: forward from `max(from, first)` to `last`, budgeted
/// - holds `first`: backward from `min(to, last)` to `first`, budgeted
/// - inside `[first, last]`: every index, budget per [`InteriorGapPolicy`]
/// - otherwise: skipped, zero attempts
pub fn plan_fetch(gaps: &[Gap], bounds: &ControllerBounds, policy: &FetchPolicy) -> FetchPlan {
    let mut b = PlanBuilder {
        plan: FetchPlan::default(),
        seen: BTreeSet::new(),
        consumed: 0,
        budget: u64::from(policy.batch_size),
    };

    if bounds.is_empty() {
        b.plan.skipped.extend_from_slice(gaps);
        return b.plan;
    }

    let first = bounds.first;
    let last = bounds.last;

    for gap in gaps {
        let iv = gap.interval;

        if iv.contains(last) {
            // u64 cursor: `last` may be u32::MAX.
            let mut ix = u64::from(iv.from.max(first));
            while ix <= u64::from(last) && !b.exhausted() {
                b.push(ix as u32, gap.kind, Walk::Forward);
                ix += 1;
            }
        } else if iv.contains(first) {
            let mut ix = i64::from(iv.to.min(last));
            while ix >= i64::from(first) && !b.exhausted() {
                b.push(ix as u32, gap.kind, Walk::Backward);
                ix -= 1;
            }
        } else if iv.is_within(first, last) {
            for ix in u64::from(iv.from)..=u64::from(iv.to) {
                if policy.interior == InteriorGapPolicy::Budgeted && b.exhausted() {
                    break;
                }
                b.push(ix as u32, gap.kind, Walk::Whole);
            }
        } else {
            b.plan.skipped.push(*gap);
        }
    }

    b.plan
}
