//! Non-blocking named locks serializing catalog imports.
//!
//! Two interchangeable backings share one contract: an in-process semaphore
//! map for single-instance deployments and Postgres advisory locks shared by
//! every instance on the same database.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InProcessImportLockService;
pub use postgres::PostgresImportLockService;
pub use r#trait::{ImportLease, ImportLockError, ImportLockKey, ImportLockService};
