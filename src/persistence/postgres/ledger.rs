//! Sync ledger and entity snapshot queries.
//!
//! Every ledger append and its snapshot side effect commit in one
//! transaction. The snapshot upsert is guarded by the row's
//! `updated_at`, so an out-of-order append can never roll the server
//! truth backwards.

use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use super::{PostgresPersistence, db_err};
use crate::domain::{EntityType, LedgerEntry, NewLedgerEntry, ServerState, SyncOperation};
use crate::error::GatewayError;
use crate::persistence::models::{LedgerEntryRow, SnapshotRow, SnapshotUpsert};

const LEDGER_COLUMNS: &str = "id, user_id, device_id, entity_type, entity_id, operation, \
                              status, data_before, data_after, conflict_detected, resolution, created_at";

impl PostgresPersistence {
    /// Appends one ledger entry and applies its snapshot side effect
    /// in a single transaction.
    ///
    /// When `snapshot` is given, the entity snapshot is upserted, but
    /// only if the new `updated_at` is strictly newer than the stored
    /// one. A `delete` operation removes the snapshot row instead.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::PersistenceError` on database failure or
    /// a corrupt stored row.
    pub async fn append_entry(
        &self,
        entry: &NewLedgerEntry,
        snapshot: Option<&SnapshotUpsert>,
    ) -> Result<LedgerEntry, GatewayError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let row = Self::insert_ledger_entry(&mut tx, entry).await?;
        Self::apply_snapshot(&mut tx, entry, snapshot).await?;
        tx.commit().await.map_err(db_err)?;
        row.into_domain()
    }

    /// Inserts a ledger row inside an existing transaction.
    pub(super) async fn insert_ledger_entry(
        tx: &mut Transaction<'_, Postgres>,
        entry: &NewLedgerEntry,
    ) -> Result<LedgerEntryRow, GatewayError> {
        sqlx::query_as::<_, LedgerEntryRow>(
            "INSERT INTO sync_ledger (user_id, device_id, entity_type, entity_id, operation, \
             status, data_before, data_after, conflict_detected, resolution) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING id, user_id, device_id, entity_type, entity_id, operation, \
                       status, data_before, data_after, conflict_detected, resolution, created_at",
        )
        .bind(entry.user_id)
        .bind(entry.device_id.as_uuid())
        .bind(entry.entity_type.as_str())
        .bind(entry.entity_id)
        .bind(entry.operation.as_str())
        .bind(entry.status.as_str())
        .bind(entry.data_before.as_ref())
        .bind(entry.data_after.as_ref())
        .bind(entry.conflict_detected)
        .bind(entry.resolution.map(|r| r.as_str()))
        .fetch_one(&mut **tx)
        .await
        .map_err(db_err)
    }

    /// Applies an entry's snapshot side effect inside an existing
    /// transaction: guarded upsert for a winning write, row removal
    /// for a delete.
    pub(super) async fn apply_snapshot(
        tx: &mut Transaction<'_, Postgres>,
        entry: &NewLedgerEntry,
        snapshot: Option<&SnapshotUpsert>,
    ) -> Result<(), GatewayError> {
        if entry.operation == SyncOperation::Delete {
            sqlx::query("DELETE FROM entity_snapshots WHERE entity_type = $1 AND entity_id = $2")
                .bind(entry.entity_type.as_str())
                .bind(entry.entity_id)
                .execute(&mut **tx)
                .await
                .map_err(db_err)?;
            return Ok(());
        }

        if let Some(snapshot) = snapshot {
            sqlx::query(
                "INSERT INTO entity_snapshots (entity_type, entity_id, data, updated_at) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (entity_type, entity_id) DO UPDATE SET \
                     data = EXCLUDED.data, updated_at = EXCLUDED.updated_at \
                 WHERE entity_snapshots.updated_at < EXCLUDED.updated_at",
            )
            .bind(entry.entity_type.as_str())
            .bind(entry.entity_id)
            .bind(&snapshot.data)
            .bind(snapshot.updated_at)
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;
        }

        Ok(())
    }

    /// Returns the most recent ledger entries for one entity, newest
    /// first.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::PersistenceError` on database failure or
    /// a corrupt stored row.
    pub async fn ledger_history(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
        limit: i64,
    ) -> Result<Vec<LedgerEntry>, GatewayError> {
        let rows = sqlx::query_as::<_, LedgerEntryRow>(&format!(
            "SELECT {LEDGER_COLUMNS} FROM sync_ledger \
             WHERE entity_type = $1 AND entity_id = $2 \
             ORDER BY id DESC LIMIT $3",
        ))
        .bind(entity_type.as_str())
        .bind(entity_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(LedgerEntryRow::into_domain).collect()
    }

    /// Loads the server-side snapshot of one entity, if any.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::PersistenceError` on database failure.
    pub async fn entity_snapshot(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<Option<ServerState>, GatewayError> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            "SELECT entity_type, entity_id, data, updated_at \
             FROM entity_snapshots WHERE entity_type = $1 AND entity_id = $2",
        )
        .bind(entity_type.as_str())
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(SnapshotRow::into_server_state))
    }
}
