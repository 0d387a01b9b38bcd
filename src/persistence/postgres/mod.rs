//! PostgreSQL-backed persistence for the synchronization core.
//!
//! A single `PostgresPersistence` facade owns the connection pool; the
//! queries live in child modules grouped by area. All multi-statement
//! updates run inside a transaction owned by the method, so callers
//! never see a half-applied write.

mod devices;
mod ledger;
mod notifications;
mod queue;
mod resilience;

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::config::GatewayConfig;
use crate::error::GatewayError;

/// Maps a driver error to the gateway's persistence error.
pub(super) fn db_err(e: sqlx::Error) -> GatewayError {
    GatewayError::PersistenceError(e.to_string())
}

/// PostgreSQL-backed storage for devices, the sync ledger, the offline
/// queue, notifications and resilience state.
#[derive(Debug, Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    /// Wraps an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to PostgreSQL using the configured pool limits and runs
    /// the embedded migrations.
    ///
    /// Called once at startup, before the listener is bound, so every
    /// handler can assume the schema is in place.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::PersistenceError` if the pool cannot be
    /// established or a migration fails.
    pub async fn connect(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await
            .map_err(db_err)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| GatewayError::PersistenceError(e.to_string()))?;

        Ok(Self::new(pool))
    }
}
