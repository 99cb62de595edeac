//! PostgreSQL advisory-lock backing for import locks.
//!
//! Each lease pins one pooled connection for its whole lifetime, because
//! session-level advisory locks belong to the session that took them. The
//! lock id is `hashtext(<lock name>)`, so every instance talking to the same
//! database agrees on it.
//!
//! ## Crash safety
//!
//! If a lease is dropped without `release`, or an unlock fails, the pinned
//! connection is detached from the pool and closed. Postgres then ends the
//! session and frees its advisory locks. The same happens when the holding
//! process dies.
//!
//! ## Error Mapping
//!
//! | SQLx Error | ImportLockError |
//! |------------|-----------------|
//! | PoolClosed / PoolTimedOut | `Unavailable` |
//! | Database | `Backend` (with SQLSTATE) |
//! | Other | `Backend` |

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool, Postgres};
use tracing::instrument;

use super::r#trait::{ImportLease, ImportLockError, ImportLockKey, ImportLockService, LeaseHandle};

/// Import lock service backed by Postgres advisory locks.
///
/// Shared across all instances using the same database. The pool size bounds
/// how many leases can be held at once, plus one connection per in-flight
/// acquisition attempt.
#[derive(Debug, Clone)]
pub struct PostgresImportLockService {
    pool: PgPool,
}

impl PostgresImportLockService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Build a service over a lazily connecting pool.
    pub fn connect_lazy(database_url: &str, max_connections: u32) -> Result<Self, ImportLockError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_lazy(database_url)
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ImportLockService for PostgresImportLockService {
    #[instrument(skip(self), fields(lock = %key), err)]
    async fn try_acquire(
        &self,
        key: ImportLockKey,
    ) -> Result<Option<ImportLease>, ImportLockError> {
        let conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire_connection", e))?;

        // Wrap before querying: if this future is dropped mid-query the handle
        // closes the session instead of pooling a connection that may hold the lock.
        let name = key.name();
        let mut handle = AdvisoryLockHandle {
            conn: Some(conn),
            name: name.clone(),
        };

        let result: Result<bool, sqlx::Error> =
            sqlx::query_scalar("SELECT pg_try_advisory_lock(hashtext($1)::bigint)")
                .bind(&name)
                .fetch_one(handle.connection()?)
                .await;
        let acquired = match result {
            Ok(acquired) => acquired,
            Err(e) => {
                // Lock state unknown: never pool this session.
                handle.close_session();
                return Err(map_sqlx_error("pg_try_advisory_lock", e));
            }
        };

        if !acquired {
            handle.return_to_pool();
            tracing::debug!("import lock busy");
            return Ok(None);
        }

        tracing::debug!("import lock acquired");
        Ok(Some(ImportLease::new(key, Box::new(handle))))
    }
}

struct AdvisoryLockHandle {
    conn: Option<PoolConnection<Postgres>>,
    name: String,
}

impl AdvisoryLockHandle {
    fn connection(&mut self) -> Result<&mut PgConnection, ImportLockError> {
        self.conn
            .as_deref_mut()
            .ok_or_else(|| ImportLockError::Backend("advisory lock connection already released".to_string()))
    }

    /// Hand the connection back to the pool. Only valid when no lock is held.
    fn return_to_pool(&mut self) {
        self.conn.take();
    }

    /// Detach and close the session, letting Postgres free whatever it holds.
    fn close_session(&mut self) {
        if let Some(conn) = self.conn.take() {
            drop(conn.detach());
        }
    }
}

#[async_trait]
impl LeaseHandle for AdvisoryLockHandle {
    async fn release(self: Box<Self>) -> Result<(), ImportLockError> {
        let mut this = self;
        if this.conn.is_none() {
            return Ok(());
        }

        // The connection stays in the handle while unlocking: if this future is
        // dropped mid-query, `Drop` closes the session instead of pooling it.
        let name = this.name.clone();
        let result: Result<bool, sqlx::Error> =
            sqlx::query_scalar("SELECT pg_advisory_unlock(hashtext($1)::bigint)")
                .bind(&name)
                .fetch_one(this.connection()?)
                .await;

        match result {
            Ok(true) => {
                this.return_to_pool();
                Ok(())
            }
            Ok(false) => {
                // Session no longer holds the lock; do not reuse it.
                tracing::warn!(lock = %name, "advisory lock was not held at release");
                this.close_session();
                Ok(())
            }
            Err(e) => {
                this.close_session();
                Err(map_sqlx_error("pg_advisory_unlock", e))
            }
        }
    }
}

impl Drop for AdvisoryLockHandle {
    fn drop(&mut self) {
        if self.conn.is_some() {
            tracing::warn!(lock = %self.name, "advisory lock dropped while held; closing session");
            self.close_session();
        }
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> ImportLockError {
    match err {
        sqlx::Error::PoolClosed => {
            ImportLockError::Unavailable(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::PoolTimedOut => {
            ImportLockError::Unavailable(format!("timed out waiting for a connection in {operation}"))
        }
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.into_owned()).unwrap_or_default();
            ImportLockError::Backend(format!(
                "database error in {operation} ({code}): {}",
                db_err.message()
            ))
        }
        _ => ImportLockError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}
