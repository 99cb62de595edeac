use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stocktake_core::{AggregateRoot, DomainError, DomainResult, LocationId, RunId};

use crate::line::CountLine;
use crate::registry::ActiveRunRegistry;
use crate::snapshot::CountingSnapshot;

/// Counting run status lifecycle.
///
/// Transitions are one-directional: `NotStarted -> InProgress -> Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountingRunStatus {
    NotStarted,
    InProgress,
    Completed,
}

/// Aggregate root: one single-operator counting pass over a location.
///
/// The caller that creates a run owns it; exclusivity against other runs of
/// the same location goes through an [`ActiveRunRegistry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountingRun {
    id: RunId,
    location_id: LocationId,
    tolerance: u64,
    status: CountingRunStatus,
    lines: Vec<CountLine>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    version: u64,
}

impl CountingRun {
    /// Create a not-yet-started run with a fresh identifier.
    pub fn new(location_id: LocationId, tolerance: u64) -> Self {
        Self::with_id(RunId::new(), location_id, tolerance)
    }

    pub fn with_id(id: RunId, location_id: LocationId, tolerance: u64) -> Self {
        Self {
            id,
            location_id,
            tolerance,
            status: CountingRunStatus::NotStarted,
            lines: Vec::new(),
            started_at: None,
            completed_at: None,
            version: 0,
        }
    }

    pub fn id_typed(&self) -> RunId {
        self.id
    }

    pub fn location_id(&self) -> LocationId {
        self.location_id
    }

    /// Maximum deviation tolerated between two counts of the same item.
    pub fn tolerance(&self) -> u64 {
        self.tolerance
    }

    pub fn status(&self) -> CountingRunStatus {
        self.status
    }

    pub fn lines(&self) -> &[CountLine] {
        &self.lines
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Claim the location and move to `InProgress`.
    pub fn start<R>(&mut self, registry: &R) -> DomainResult<()>
    where
        R: ActiveRunRegistry + ?Sized,
    {
        self.ensure_status(CountingRunStatus::NotStarted, "start")?;

        if !registry.try_acquire(self.location_id, self.id) {
            tracing::warn!(
                run_id = %self.id,
                location_id = %self.location_id,
                "counting run declined: location busy"
            );
            return Err(DomainError::contention(
                "another run already active for this location",
            ));
        }

        self.status = CountingRunStatus::InProgress;
        self.started_at = Some(Utc::now());
        self.version += 1;
        tracing::info!(run_id = %self.id, location_id = %self.location_id, "counting run started");
        Ok(())
    }

    /// Record one scan. Lines are appended as-is; duplicates are not merged.
    pub fn add_line(&mut self, item_code: &str, quantity: i64) -> DomainResult<()> {
        self.ensure_status(CountingRunStatus::InProgress, "add a line to")?;
        let line = CountLine::new(item_code, quantity)?;
        self.lines.push(line);
        self.version += 1;
        Ok(())
    }

    /// Close the run and free the location.
    ///
    /// A run without lines cannot complete; in that case it stays `InProgress`
    /// and keeps holding the location.
    pub fn complete<R>(&mut self, registry: &R) -> DomainResult<()>
    where
        R: ActiveRunRegistry + ?Sized,
    {
        self.ensure_status(CountingRunStatus::InProgress, "complete")?;
        if self.lines.is_empty() {
            return Err(DomainError::empty_aggregate(
                "cannot complete a counting run without lines",
            ));
        }

        self.status = CountingRunStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.version += 1;
        registry.release(self.location_id, self.id);

        tracing::info!(
            run_id = %self.id,
            location_id = %self.location_id,
            lines = self.lines.len(),
            "counting run completed"
        );
        Ok(())
    }

    /// Sum quantities per item code.
    ///
    /// Independent of scan order. Fails with `Overflow` instead of wrapping.
    pub fn aggregate_by_item_code(&self) -> DomainResult<BTreeMap<String, i64>> {
        let mut totals: BTreeMap<String, i64> = BTreeMap::new();
        for line in &self.lines {
            let total = totals.entry(line.item_code().to_string()).or_insert(0);
            *total = total.checked_add(line.quantity()).ok_or_else(|| {
                DomainError::overflow(format!(
                    "aggregated quantity for item {} exceeds the representable range",
                    line.item_code()
                ))
            })?;
        }
        Ok(totals)
    }

    pub fn create_snapshot(&self) -> DomainResult<CountingSnapshot> {
        self.ensure_status(CountingRunStatus::Completed, "snapshot")?;
        let items = self.aggregate_by_item_code()?;
        let taken_at = self.completed_at.unwrap_or_else(Utc::now);
        CountingSnapshot::new(self.location_id, self.id, items, taken_at)
    }

    fn ensure_status(&self, expected: CountingRunStatus, action: &str) -> DomainResult<()> {
        if self.status != expected {
            return Err(DomainError::state_violation(format!(
                "cannot {action} a counting run in status {:?} (expected {expected:?})",
                self.status
            )));
        }
        Ok(())
    }
}

impl AggregateRoot for CountingRun {
    type Id = RunId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
