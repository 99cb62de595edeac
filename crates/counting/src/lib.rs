//! Stock-counting domain module.
//!
//! Counting runs, their aggregation into snapshots, the per-location
//! exclusivity capability and the cross-run conflict tracker. Pure domain
//! logic: no IO, no HTTP, no storage.

pub mod conflict;
pub mod line;
pub mod registry;
pub mod run;
pub mod snapshot;

pub use conflict::{ConflictEvaluation, CountingConflictTracker, TrackedItem};
pub use line::CountLine;
pub use registry::{ActiveRunRegistry, InMemoryActiveRunRegistry};
pub use run::{CountingRun, CountingRunStatus};
pub use snapshot::CountingSnapshot;
