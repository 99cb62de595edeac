use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use super::r#trait::{ImportLease, ImportLockError, ImportLockKey, ImportLockService, LeaseHandle};

type Slots = Arc<Mutex<HashMap<ImportLockKey, Arc<Semaphore>>>>;

/// In-process import lock: one single-permit semaphore per key.
///
/// Only valid within one running instance; locks vanish with the process.
/// Suitable for single-instance deployments and tests. A key's semaphore is
/// dropped from the map once nothing holds or is trying to take it.
#[derive(Debug, Default)]
pub struct InProcessImportLockService {
    slots: Slots,
}

impl InProcessImportLockService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of keys currently tracked (held or mid-acquisition).
    pub fn tracked_keys(&self) -> usize {
        self.slots.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    fn slot(&self, key: ImportLockKey) -> Arc<Semaphore> {
        let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        slots
            .entry(key)
            .or_insert_with(|| Arc::new(Semaphore::new(1)))
            .clone()
    }
}

/// Remove `key` when the map holds the only reference to its semaphore.
///
/// Callers must have dropped their own reference first. New references are
/// only handed out under the same lock, so a removed semaphore is unreachable.
fn prune(slots: &mut HashMap<ImportLockKey, Arc<Semaphore>>, key: ImportLockKey) {
    if slots.get(&key).is_some_and(|sem| Arc::strong_count(sem) == 1) {
        slots.remove(&key);
    }
}

struct PermitHandle {
    key: ImportLockKey,
    slots: Slots,
    permit: Option<OwnedSemaphorePermit>,
}

#[async_trait]
impl LeaseHandle for PermitHandle {
    async fn release(self: Box<Self>) -> Result<(), ImportLockError> {
        // Dropping the handle hands the slot back.
        Ok(())
    }
}

impl Drop for PermitHandle {
    fn drop(&mut self) {
        let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        self.permit.take();
        prune(&mut slots, self.key);
    }
}

#[async_trait]
impl ImportLockService for InProcessImportLockService {
    async fn try_acquire(
        &self,
        key: ImportLockKey,
    ) -> Result<Option<ImportLease>, ImportLockError> {
        let semaphore = self.slot(key);
        match semaphore.try_acquire_owned() {
            Ok(permit) => {
                tracing::debug!(lock = %key, "import lock acquired");
                let handle = PermitHandle {
                    key,
                    slots: Arc::clone(&self.slots),
                    permit: Some(permit),
                };
                Ok(Some(ImportLease::new(key, Box::new(handle))))
            }
            Err(TryAcquireError::NoPermits) => {
                tracing::debug!(lock = %key, "import lock busy");
                let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
                prune(&mut slots, key);
                Ok(None)
            }
            Err(TryAcquireError::Closed) => Err(ImportLockError::Backend(format!(
                "lock slot for {key} was closed"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stocktake_core::ShopId;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_shop_acquire_grants_exactly_one() {
        let service = InProcessImportLockService::arc();
        let shop_id = ShopId::new();

        let a = tokio::spawn({
            let service = service.clone();
            async move { service.try_acquire_for_shop(shop_id).await.unwrap() }
        });
        let b = tokio::spawn({
            let service = service.clone();
            async move { service.try_acquire_for_shop(shop_id).await.unwrap() }
        });
        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        let mut winner = match (a, b) {
            (Some(lease), None) | (None, Some(lease)) => lease,
            other => panic!("Expected exactly one lease, got {other:?}"),
        };

        winner.release().await.unwrap();
        let third = service.try_acquire_for_shop(shop_id).await.unwrap();
        assert!(third.is_some());
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let service = InProcessImportLockService::new();
        let mut lease = service.try_acquire_global().await.unwrap().unwrap();

        lease.release().await.unwrap();
        assert!(!lease.is_held());
        lease.release().await.unwrap();

        let mut again = service.try_acquire_global().await.unwrap().unwrap();
        // The stale lease must not free the new holder's slot.
        lease.release().await.unwrap();
        assert!(service.try_acquire_global().await.unwrap().is_none());
        again.release().await.unwrap();
    }

    #[tokio::test]
    async fn dropping_a_lease_frees_the_key() {
        let service = InProcessImportLockService::new();
        let shop_id = ShopId::new();

        let lease = service.try_acquire_for_shop(shop_id).await.unwrap();
        assert!(lease.is_some());
        assert!(service.try_acquire_for_shop(shop_id).await.unwrap().is_none());

        drop(lease);
        assert!(service.try_acquire_for_shop(shop_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let service = InProcessImportLockService::new();

        let global = service.try_acquire_global().await.unwrap();
        let shop_a = service.try_acquire_for_shop(ShopId::new()).await.unwrap();
        let shop_b = service.try_acquire_for_shop(ShopId::new()).await.unwrap();

        assert!(global.is_some());
        assert!(shop_a.is_some());
        assert!(shop_b.is_some());
        assert_eq!(global.unwrap().key(), ImportLockKey::Global);
    }

    #[tokio::test]
    async fn released_keys_are_pruned() {
        let service = InProcessImportLockService::new();

        for _ in 0..16 {
            let mut lease = service.try_acquire_for_shop(ShopId::new()).await.unwrap().unwrap();
            lease.release().await.unwrap();
        }
        let dropped = service.try_acquire_global().await.unwrap();
        drop(dropped);

        assert_eq!(service.tracked_keys(), 0);
    }

    #[tokio::test]
    async fn busy_attempt_keeps_the_holders_slot() {
        let service = InProcessImportLockService::new();
        let shop_id = ShopId::new();

        let mut lease = service.try_acquire_for_shop(shop_id).await.unwrap().unwrap();
        assert!(service.try_acquire_for_shop(shop_id).await.unwrap().is_none());
        assert_eq!(service.tracked_keys(), 1);

        lease.release().await.unwrap();
        assert_eq!(service.tracked_keys(), 0);
        assert!(service.try_acquire_for_shop(shop_id).await.unwrap().is_some());
    }
}
