use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stocktake_core::ShopId;

/// Scope of a catalog-import lock.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportLockKey {
    /// Whole-catalog import, across every shop.
    Global,
    /// Import restricted to a single shop.
    Shop(ShopId),
}

impl ImportLockKey {
    /// Stable, human-readable lock identifier.
    ///
    /// The database backing hashes this string, so it must never change for a
    /// given key.
    pub fn name(&self) -> String {
        match self {
            ImportLockKey::Global => "product_import_global".to_string(),
            ImportLockKey::Shop(shop_id) => format!("product_import_shop_{shop_id}"),
        }
    }
}

impl core::fmt::Display for ImportLockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.name())
    }
}

/// Import lock backend failure.
///
/// A lock that is simply taken is **not** an error: acquisition returns
/// `Ok(None)` for that case.
#[derive(Debug, Error)]
pub enum ImportLockError {
    #[error("lock backend unavailable: {0}")]
    Unavailable(String),

    #[error("lock backend error: {0}")]
    Backend(String),
}

/// Backend-specific part of a lease. Dropping it without `release` must still
/// free the lock.
#[async_trait]
pub(crate) trait LeaseHandle: Send {
    async fn release(self: Box<Self>) -> Result<(), ImportLockError>;
}

/// A held import lock.
///
/// Exactly one live lease exists per key. `release` is idempotent; dropping an
/// unreleased lease frees the lock as well.
pub struct ImportLease {
    key: ImportLockKey,
    handle: Option<Box<dyn LeaseHandle>>,
}

impl ImportLease {
    pub(crate) fn new(key: ImportLockKey, handle: Box<dyn LeaseHandle>) -> Self {
        Self {
            key,
            handle: Some(handle),
        }
    }

    pub fn key(&self) -> ImportLockKey {
        self.key
    }

    pub fn is_held(&self) -> bool {
        self.handle.is_some()
    }

    /// Release the lock. Calling it again is a no-op.
    pub async fn release(&mut self) -> Result<(), ImportLockError> {
        match self.handle.take() {
            Some(handle) => {
                tracing::debug!(lock = %self.key, "releasing import lock");
                handle.release().await
            }
            None => Ok(()),
        }
    }
}

impl core::fmt::Debug for ImportLease {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ImportLease")
            .field("key", &self.key)
            .field("held", &self.is_held())
            .finish()
    }
}

/// Non-blocking named-lock service serializing catalog imports.
///
/// Acquisition is a single attempt: it returns `Ok(None)` immediately when the
/// lock is held elsewhere and never waits or queues. Polling or backoff is up
/// to the caller. Dropping an in-flight acquisition never leaves a lock held.
#[async_trait]
pub trait ImportLockService: Send + Sync {
    async fn try_acquire(&self, key: ImportLockKey)
    -> Result<Option<ImportLease>, ImportLockError>;

    async fn try_acquire_global(&self) -> Result<Option<ImportLease>, ImportLockError> {
        self.try_acquire(ImportLockKey::Global).await
    }

    async fn try_acquire_for_shop(
        &self,
        shop_id: ShopId,
    ) -> Result<Option<ImportLease>, ImportLockError> {
        self.try_acquire(ImportLockKey::Shop(shop_id)).await
    }
}

#[async_trait]
impl<S> ImportLockService for Arc<S>
where
    S: ImportLockService + ?Sized,
{
    async fn try_acquire(
        &self,
        key: ImportLockKey,
    ) -> Result<Option<ImportLease>, ImportLockError> {
        (**self).try_acquire(key).await
    }
}
