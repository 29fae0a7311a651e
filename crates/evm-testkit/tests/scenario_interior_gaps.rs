//! Scenario: interior holes inside the retrievable window.
//!
//! # Invariants under test
//! - Stored `{1,2,3,7,8,10}` on a controller holding `[1, 10]` -> the holes
//!   `[4,6]` and `[9,9]` are fetched, oldest first; the tail needs nothing.
//! - Interior holes are filled in full by default even past `batch_size`;
//!   the budgeted policy stops at `batch_size`.
//! - At most `max_interior_gaps` holes are considered per run.

use evm_core::{missing_intervals, GapKind, InteriorGapPolicy};
use evm_runtime::{Reconciler, RunConfig};
use evm_testkit::{scripted_event, MemoryEventStore, ScriptedGateway};
use std::collections::BTreeSet;

const C: u32 = 201020304;

fn seeded(indices: &[u32]) -> MemoryEventStore {
    let store = MemoryEventStore::new();
    store.seed("events", indices.iter().map(|&ix| scripted_event(C, ix)));
    store
}

#[test]
fn gap_analyzer_worked_example() {
    let stored: BTreeSet<u32> = [1, 2, 3, 7, 8, 10].into_iter().collect();
    let gaps = missing_intervals(&stored, 2);

    let got: Vec<(GapKind, u32, u32)> = gaps
        .iter()
        .map(|g| (g.kind, g.interval.from, g.interval.to))
        .collect();
    assert_eq!(
        got,
        vec![
            (GapKind::Tail, 11, u32::MAX),
            (GapKind::Interior, 4, 6),
            (GapKind::Interior, 9, 9),
        ]
    );
}

#[tokio::test]
async fn interior_holes_fetched_oldest_first() {
    let gw = ScriptedGateway::new().controller(C, 1..=10);
    let store = seeded(&[1, 2, 3, 7, 8, 10]);

    Reconciler::new(&gw, &store, RunConfig::default())
        .run(&[C])
        .await
        .unwrap();

    assert_eq!(gw.fetches_for(C), vec![4, 5, 6, 9]);
    assert_eq!(store.indices("events", C), (1..=10).collect::<Vec<_>>());
}

#[tokio::test]
async fn complete_policy_exceeds_budget_for_interior_hole() {
    let gw = ScriptedGateway::new().controller(C, 1..=30);
    let store = seeded(&[1, 30]);

    let cfg = RunConfig {
        batch_size: 3,
        ..RunConfig::default()
    };
    Reconciler::new(&gw, &store, cfg).run(&[C]).await.unwrap();

    assert_eq!(gw.fetches_for(C), (2..=29).collect::<Vec<_>>());
}

#[tokio::test]
async fn budgeted_policy_caps_interior_hole() {
    let gw = ScriptedGateway::new().controller(C, 1..=30);
    let store = seeded(&[1, 30]);

    let cfg = RunConfig {
        batch_size: 3,
        interior_gaps: InteriorGapPolicy::Budgeted,
        ..RunConfig::default()
    };
    let r = Reconciler::new(&gw, &store, cfg);
    r.run(&[C]).await.unwrap();
    assert_eq!(gw.fetches_for(C), vec![2, 3, 4]);

    gw.clear_fetches();
    r.run(&[C]).await.unwrap();
    assert_eq!(gw.fetches_for(C), vec![5, 6, 7]);
}

#[tokio::test]
async fn interior_gap_cap_limits_holes_per_run() {
    let gw = ScriptedGateway::new().controller(C, 1..=9);
    // Holes at 2, 4, 6, 8; cap of 2 -> only the two oldest this run.
    let store = seeded(&[1, 3, 5, 7, 9]);

    let cfg = RunConfig {
        max_interior_gaps: 2,
        ..RunConfig::default()
    };
    let r = Reconciler::new(&gw, &store, cfg);
    r.run(&[C]).await.unwrap();
    assert_eq!(gw.fetches_for(C), vec![2, 4]);

    gw.clear_fetches();
    r.run(&[C]).await.unwrap();
    assert_eq!(gw.fetches_for(C), vec![6, 8]);
}
