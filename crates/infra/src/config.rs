//! Configuration loading and representation.

use std::env;
use std::sync::Arc;

use thiserror::Error;

use crate::import_lock::{
    ImportLockError, ImportLockService, InProcessImportLockService, PostgresImportLockService,
};

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Which backing serves catalog-import locks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockBackend {
    /// Process-local locks; only correct with a single running instance.
    InProcess,
    /// Postgres advisory locks shared by every instance on the database.
    Postgres { database_url: String },
}

/// Import lock configuration resolved from environment variables.
///
/// - `IMPORT_LOCK_BACKEND`: `in_process` (default) or `postgres`
/// - `DATABASE_URL`: required for `postgres`
/// - `IMPORT_LOCK_MAX_CONNECTIONS`: pool size for `postgres` (default 5); one
///   connection is pinned per held lease
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConfig {
    pub backend: LockBackend,
    pub max_connections: u32,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            backend: LockBackend::InProcess,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl LockConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Resolve the configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = match lookup("IMPORT_LOCK_BACKEND").as_deref().map(str::trim) {
            None | Some("") | Some("in_process") | Some("memory") => LockBackend::InProcess,
            Some("postgres") => {
                let database_url = lookup("DATABASE_URL")
                    .filter(|url| !url.trim().is_empty())
                    .ok_or(ConfigError::MissingDatabaseUrl)?;
                LockBackend::Postgres { database_url }
            }
            Some(other) => return Err(ConfigError::InvalidBackend(other.to_string())),
        };

        let max_connections = match lookup("IMPORT_LOCK_MAX_CONNECTIONS") {
            None => DEFAULT_MAX_CONNECTIONS,
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => return Err(ConfigError::InvalidMaxConnections(raw)),
            },
        };

        Ok(Self {
            backend,
            max_connections,
        })
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("IMPORT_LOCK_BACKEND must be 'in_process' or 'postgres' (got {0})")]
    InvalidBackend(String),

    #[error("DATABASE_URL must be set when IMPORT_LOCK_BACKEND=postgres")]
    MissingDatabaseUrl,

    #[error("IMPORT_LOCK_MAX_CONNECTIONS must be a positive integer (got {0})")]
    InvalidMaxConnections(String),
}

/// Construct the configured import lock service.
///
/// The Postgres pool connects lazily, so this does not touch the database.
pub fn build_import_lock_service(
    config: &LockConfig,
) -> Result<Arc<dyn ImportLockService>, ImportLockError> {
    match &config.backend {
        LockBackend::InProcess => {
            tracing::info!("import locks: in-process backing");
            Ok(InProcessImportLockService::arc())
        }
        LockBackend::Postgres { database_url } => {
            tracing::info!(
                max_connections = config.max_connections,
                "import locks: postgres advisory backing"
            );
            let service =
                PostgresImportLockService::connect_lazy(database_url, config.max_connections)?;
            Ok(Arc::new(service))
        }
    }
}
