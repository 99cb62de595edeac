use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use stocktake_core::{DomainError, DomainResult, LocationId, RunId, ValueObject};

/// Immutable aggregated result of one completed counting run.
///
/// This is the unit the conflict tracker compares across runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountingSnapshot {
    location_id: LocationId,
    run_id: RunId,
    items: BTreeMap<String, i64>,
    taken_at: DateTime<Utc>,
}

impl CountingSnapshot {
    pub(crate) fn new(
        location_id: LocationId,
        run_id: RunId,
        items: BTreeMap<String, i64>,
        taken_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if items.is_empty() {
            return Err(DomainError::empty_aggregate(
                "snapshot requires at least one counted item",
            ));
        }
        Ok(Self {
            location_id,
            run_id,
            items,
            taken_at,
        })
    }

    pub fn location_id(&self) -> LocationId {
        self.location_id
    }

    /// The run this snapshot was taken from.
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    /// Aggregated quantity per item code, ordered by code.
    pub fn items(&self) -> &BTreeMap<String, i64> {
        &self.items
    }

    pub fn quantity_of(&self, item_code: &str) -> Option<i64> {
        self.items.get(item_code).copied()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Never true for a snapshot built from a completed run.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl ValueObject for CountingSnapshot {}

#[cfg(test)]
pub(crate) fn test_snapshot(location_id: LocationId, items: &[(&str, i64)]) -> CountingSnapshot {
    let items = items
        .iter()
        .map(|(code, qty)| (code.to_string(), *qty))
        .collect();
    CountingSnapshot::new(location_id, RunId::new(), items, Utc::now()).unwrap()
}
