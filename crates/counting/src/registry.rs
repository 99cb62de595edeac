use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use stocktake_core::{LocationId, RunId};

/// Capability granting at most one active counting run per location.
///
/// Implementations must be safe under concurrent callers: among competing
/// `try_acquire` calls for the same location, at most one returns `true`.
/// Backings range from the in-process map below to a transactional row lock
/// owned by a persistence collaborator.
pub trait ActiveRunRegistry: Send + Sync {
    /// Atomically claim `location_id` for `run_id`.
    ///
    /// Returns `true` if the location was free or is already held by `run_id`.
    fn try_acquire(&self, location_id: LocationId, run_id: RunId) -> bool;

    /// Release `location_id` if, and only if, it is currently held by `run_id`.
    ///
    /// Releasing an absent entry or one held by another run is a silent no-op.
    fn release(&self, location_id: LocationId, run_id: RunId);
}

impl<R> ActiveRunRegistry for Arc<R>
where
    R: ActiveRunRegistry + ?Sized,
{
    fn try_acquire(&self, location_id: LocationId, run_id: RunId) -> bool {
        (**self).try_acquire(location_id, run_id)
    }

    fn release(&self, location_id: LocationId, run_id: RunId) {
        (**self).release(location_id, run_id)
    }
}

/// In-process registry backed by a guarded map.
///
/// Construct one per process (or per test) and pass it by reference; state
/// lives as long as the value unless `clear` is called.
#[derive(Debug, Default)]
pub struct InMemoryActiveRunRegistry {
    holders: Mutex<HashMap<LocationId, RunId>>,
}

impl InMemoryActiveRunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// The run currently holding `location_id`, if any.
    pub fn holder(&self, location_id: LocationId) -> Option<RunId> {
        let holders = self.holders.lock().unwrap_or_else(|p| p.into_inner());
        holders.get(&location_id).copied()
    }

    /// Drop every held slot.
    pub fn clear(&self) {
        let mut holders = self.holders.lock().unwrap_or_else(|p| p.into_inner());
        holders.clear();
    }
}

impl ActiveRunRegistry for InMemoryActiveRunRegistry {
    fn try_acquire(&self, location_id: LocationId, run_id: RunId) -> bool {
        let mut holders = self.holders.lock().unwrap_or_else(|p| p.into_inner());
        match holders.get(&location_id) {
            Some(current) => *current == run_id,
            None => {
                holders.insert(location_id, run_id);
                true
            }
        }
    }

    fn release(&self, location_id: LocationId, run_id: RunId) {
        let mut holders = self.holders.lock().unwrap_or_else(|p| p.into_inner());
        if holders.get(&location_id) == Some(&run_id) {
            holders.remove(&location_id);
        }
    }
}
