//! Cross-run conflict detection.
//!
//! Successive snapshots of the same location are compared item by item. The
//! first count of an item is taken as ground truth; every later count is
//! compared against the previous one only, so a recount that agrees with the
//! latest value clears the conflict.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use stocktake_core::LocationId;

use crate::snapshot::CountingSnapshot;

/// Tracked state for one (location, item code) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedItem {
    pub last_quantity: i64,
    pub in_conflict: bool,
}

/// Result of one `evaluate` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictEvaluation {
    /// Every item code of the location flagged in conflict after the call.
    pub active: BTreeSet<String>,
    /// Item codes that entered conflict during this call.
    pub newly_triggered: BTreeSet<String>,
}

impl ConflictEvaluation {
    pub fn has_conflicts(&self) -> bool {
        !self.active.is_empty()
    }
}

/// Stateful comparator across successive snapshots.
///
/// There is no internal synchronization: `evaluate` takes `&mut self`, so the
/// owner serializes evaluations (wrap it in a mutex to share it).
///
/// Entries are never removed. An item missing from a newer snapshot keeps its
/// last tracked state, including an active conflict.
#[derive(Debug, Default)]
pub struct CountingConflictTracker {
    locations: HashMap<LocationId, BTreeMap<String, TrackedItem>>,
}

impl CountingConflictTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare `snapshot` with the previously observed counts of its location.
    ///
    /// An item is in conflict when its quantity differs from the last observed
    /// one by more than `tolerance`.
    pub fn evaluate(&mut self, snapshot: &CountingSnapshot, tolerance: u64) -> ConflictEvaluation {
        let location_id = snapshot.location_id();
        let tracked = self.locations.entry(location_id).or_default();
        let mut newly_triggered = BTreeSet::new();

        for (item_code, &quantity) in snapshot.items() {
            match tracked.get_mut(item_code) {
                None => {
                    tracked.insert(
                        item_code.clone(),
                        TrackedItem {
                            last_quantity: quantity,
                            in_conflict: false,
                        },
                    );
                }
                Some(entry) => {
                    let conflict = quantity.abs_diff(entry.last_quantity) > tolerance;
                    if conflict && !entry.in_conflict {
                        newly_triggered.insert(item_code.clone());
                    }
                    *entry = TrackedItem {
                        last_quantity: quantity,
                        in_conflict: conflict,
                    };
                }
            }
        }

        let active = active_codes(tracked);
        if !newly_triggered.is_empty() {
            tracing::info!(
                location_id = %location_id,
                run_id = %snapshot.run_id(),
                newly_triggered = newly_triggered.len(),
                active = active.len(),
                "counting conflicts triggered"
            );
        }

        ConflictEvaluation {
            active,
            newly_triggered,
        }
    }

    /// Item codes currently in conflict for `location_id`.
    pub fn active_conflicts(&self, location_id: LocationId) -> BTreeSet<String> {
        self.locations
            .get(&location_id)
            .map(active_codes)
            .unwrap_or_default()
    }

    pub fn tracked(&self, location_id: LocationId, item_code: &str) -> Option<TrackedItem> {
        self.locations
            .get(&location_id)
            .and_then(|items| items.get(item_code))
            .copied()
    }
}

fn active_codes(items: &BTreeMap<String, TrackedItem>) -> BTreeSet<String> {
    items
        .iter()
        .filter(|(_, item)| item.in_conflict)
        .map(|(code, _)| code.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::test_snapshot;
    use proptest::prelude::*;

    fn codes(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn first_observation_is_a_baseline() {
        let mut tracker = CountingConflictTracker::new();
        let location = LocationId::new();

        let eval = tracker.evaluate(&test_snapshot(location, &[("X", 10)]), 0);
        assert!(!eval.has_conflicts());
        assert!(eval.newly_triggered.is_empty());
        assert_eq!(
            tracker.tracked(location, "X"),
            Some(TrackedItem {
                last_quantity: 10,
                in_conflict: false
            })
        );
    }

    #[test]
    fn recount_matching_latest_value_self_resolves() {
        let mut tracker = CountingConflictTracker::new();
        let location = LocationId::new();

        tracker.evaluate(&test_snapshot(location, &[("X", 10)]), 0);

        let eval = tracker.evaluate(&test_snapshot(location, &[("X", 12)]), 0);
        assert_eq!(eval.active, codes(&["X"]));
        assert_eq!(eval.newly_triggered, codes(&["X"]));

        let eval = tracker.evaluate(&test_snapshot(location, &[("X", 12)]), 0);
        assert!(eval.active.is_empty());
        assert!(eval.newly_triggered.is_empty());
    }

    #[test]
    fn persisting_conflict_is_not_newly_triggered() {
        let mut tracker = CountingConflictTracker::new();
        let location = LocationId::new();

        tracker.evaluate(&test_snapshot(location, &[("X", 10)]), 1);
        tracker.evaluate(&test_snapshot(location, &[("X", 20)]), 1);

        let eval = tracker.evaluate(&test_snapshot(location, &[("X", 30)]), 1);
        assert_eq!(eval.active, codes(&["X"]));
        assert!(eval.newly_triggered.is_empty());
    }

    #[test]
    fn delta_within_tolerance_is_not_a_conflict() {
        let mut tracker = CountingConflictTracker::new();
        let location = LocationId::new();

        tracker.evaluate(&test_snapshot(location, &[("X", 10)]), 2);
        let eval = tracker.evaluate(&test_snapshot(location, &[("X", 12)]), 2);
        assert!(!eval.has_conflicts());

        let eval = tracker.evaluate(&test_snapshot(location, &[("X", 15)]), 2);
        assert_eq!(eval.newly_triggered, codes(&["X"]));
    }

    #[test]
    fn missing_items_keep_stale_conflict() {
        let mut tracker = CountingConflictTracker::new();
        let location = LocationId::new();

        tracker.evaluate(&test_snapshot(location, &[("X", 1), ("Y", 5)]), 0);
        tracker.evaluate(&test_snapshot(location, &[("X", 2), ("Y", 5)]), 0);

        let eval = tracker.evaluate(&test_snapshot(location, &[("Y", 5)]), 0);
        assert_eq!(eval.active, codes(&["X"]));
        assert!(eval.newly_triggered.is_empty());
        assert_eq!(tracker.active_conflicts(location), codes(&["X"]));
    }

    #[test]
    fn locations_are_tracked_separately() {
        let mut tracker = CountingConflictTracker::new();
        let shop_floor = LocationId::new();
        let back_room = LocationId::new();

        tracker.evaluate(&test_snapshot(shop_floor, &[("X", 1)]), 0);
        let eval = tracker.evaluate(&test_snapshot(back_room, &[("X", 9)]), 0);
        assert!(!eval.has_conflicts());

        tracker.evaluate(&test_snapshot(shop_floor, &[("X", 3)]), 0);
        assert_eq!(tracker.active_conflicts(shop_floor), codes(&["X"]));
        assert!(tracker.active_conflicts(back_room).is_empty());
    }

    #[test]
    fn tolerance_is_applied_per_call() {
        let mut tracker = CountingConflictTracker::new();
        let location = LocationId::new();

        tracker.evaluate(&test_snapshot(location, &[("X", 10)]), 0);
        let eval = tracker.evaluate(&test_snapshot(location, &[("X", 14)]), 5);
        assert!(!eval.has_conflicts());

        let eval = tracker.evaluate(&test_snapshot(location, &[("X", 18)]), 3);
        assert_eq!(eval.newly_triggered, codes(&["X"]));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: two identical consecutive counts never conflict.
        #[test]
        fn identical_counts_never_conflict(qty in 0i64..1_000_000, tolerance in 0u64..1_000) {
            let mut tracker = CountingConflictTracker::new();
            let location = LocationId::new();

            tracker.evaluate(&test_snapshot(location, &[("X", qty)]), tolerance);
            let eval = tracker.evaluate(&test_snapshot(location, &[("X", qty)]), tolerance);
            prop_assert!(eval.active.is_empty());
            prop_assert!(eval.newly_triggered.is_empty());
        }

        /// Property: a delta beyond tolerance on a clean item is both active and newly triggered.
        #[test]
        fn delta_beyond_tolerance_triggers(
            first in 0i64..1_000_000,
            tolerance in 0u64..1_000,
            extra in 1i64..1_000,
        ) {
            let mut tracker = CountingConflictTracker::new();
            let location = LocationId::new();
            let second = first + tolerance as i64 + extra;

            tracker.evaluate(&test_snapshot(location, &[("X", first)]), tolerance);
            let eval = tracker.evaluate(&test_snapshot(location, &[("X", second)]), tolerance);
            prop_assert!(eval.active.contains("X"));
            prop_assert!(eval.newly_triggered.contains("X"));
        }
    }
}
