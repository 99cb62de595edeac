//! Infrastructure layer: catalog-import locks, database wiring, config.

pub mod config;
pub mod import_lock;

pub use config::{ConfigError, LockBackend, LockConfig, build_import_lock_service};
pub use import_lock::{
    ImportLease, ImportLockError, ImportLockKey, ImportLockService, InProcessImportLockService,
    PostgresImportLockService,
};
