//! Offline operation queue queries.
//!
//! The queue is drained cooperatively: claims use `FOR UPDATE SKIP
//! LOCKED` so concurrent drain ticks never pick the same row, and the
//! completion paths fold the ledger append, snapshot commit, queue
//! status and replay marker into one transaction.

use chrono::{DateTime, Utc};

use super::{PostgresPersistence, db_err};
use crate::domain::{DeviceId, LedgerEntry, NewLedgerEntry, OperationId, QueuedOperation};
use crate::error::GatewayError;
use crate::persistence::models::{OperationRow, SnapshotUpsert};

const OPERATION_COLUMNS: &str = "id, device_id, operation_type, payload, priority, retry_count, \
                                 max_retries, status, idempotency_key, error, next_retry_at, \
                                 claimed_at, created_at, updated_at";

impl PostgresPersistence {
    /// Enqueues an operation, deduplicating on `(device_id,
    /// idempotency_key)`.
    ///
    /// Returns the stored operation and `true` when this call created
    /// it, or the previously queued row and `false` when the key was
    /// already taken.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::PersistenceError` on database failure.
    pub async fn insert_operation(
        &self,
        device_id: DeviceId,
        operation_type: &str,
        payload: &serde_json::Value,
        priority: i16,
        max_retries: u32,
        idempotency_key: &str,
    ) -> Result<(QueuedOperation, bool), GatewayError> {
        let inserted = sqlx::query_as::<_, OperationRow>(&format!(
            "INSERT INTO offline_operations \
                 (id, device_id, operation_type, payload, priority, max_retries, idempotency_key) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (device_id, idempotency_key) DO NOTHING \
             RETURNING {OPERATION_COLUMNS}",
        ))
        .bind(OperationId::new().as_uuid())
        .bind(device_id.as_uuid())
        .bind(operation_type)
        .bind(payload)
        .bind(priority)
        .bind(i32::try_from(max_retries).unwrap_or(i32::MAX))
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        if let Some(row) = inserted {
            return Ok((row.into_domain()?, true));
        }

        let existing = sqlx::query_as::<_, OperationRow>(&format!(
            "SELECT {OPERATION_COLUMNS} FROM offline_operations \
             WHERE device_id = $1 AND idempotency_key = $2",
        ))
        .bind(device_id.as_uuid())
        .bind(idempotency_key)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok((existing.into_domain()?, false))
    }

    /// Loads one queued operation by id.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::PersistenceError` on database failure.
    pub async fn operation_by_id(
        &self,
        id: OperationId,
    ) -> Result<Option<QueuedOperation>, GatewayError> {
        let row = sqlx::query_as::<_, OperationRow>(&format!(
            "SELECT {OPERATION_COLUMNS} FROM offline_operations WHERE id = $1",
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(OperationRow::into_domain).transpose()
    }

    /// Cancels an operation if and only if it is still `pending`.
    ///
    /// Returns `None` when the row exists but is not cancellable (or
    /// does not exist); callers disambiguate with [`operation_by_id`].
    ///
    /// [`operation_by_id`]: Self::operation_by_id
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::PersistenceError` on database failure.
    pub async fn cancel_operation(
        &self,
        id: OperationId,
        now: DateTime<Utc>,
    ) -> Result<Option<QueuedOperation>, GatewayError> {
        let row = sqlx::query_as::<_, OperationRow>(&format!(
            "UPDATE offline_operations \
             SET status = 'cancelled', updated_at = $2 \
             WHERE id = $1 AND status = 'pending' \
             RETURNING {OPERATION_COLUMNS}",
        ))
        .bind(id.as_uuid())
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(OperationRow::into_domain).transpose()
    }

    /// Lists operations whose retry budget is exhausted, most recently
    /// failed first.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::PersistenceError` on database failure.
    pub async fn dead_letter_operations(
        &self,
        limit: i64,
    ) -> Result<Vec<QueuedOperation>, GatewayError> {
        let rows = sqlx::query_as::<_, OperationRow>(&format!(
            "SELECT {OPERATION_COLUMNS} FROM offline_operations \
             WHERE status = 'failed' AND retry_count >= max_retries \
             ORDER BY updated_at DESC LIMIT $1",
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(OperationRow::into_domain).collect()
    }

    /// Returns claims abandoned before `cutoff` to `pending`.
    ///
    /// A drain tick that crashed mid-flight leaves rows in
    /// `processing`; the next tick reclaims them here before claiming
    /// fresh work.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::PersistenceError` on database failure.
    pub async fn release_stale_claims(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, GatewayError> {
        let result = sqlx::query(
            "UPDATE offline_operations \
             SET status = 'pending', claimed_at = NULL, updated_at = $2 \
             WHERE status = 'processing' AND claimed_at IS NOT NULL AND claimed_at < $1",
        )
        .bind(cutoff)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected())
    }

    /// Moves `failed` operations whose backoff deadline has passed
    /// back to `pending`, provided retries remain.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::PersistenceError` on database failure.
    pub async fn requeue_due_retries(&self, now: DateTime<Utc>) -> Result<u64, GatewayError> {
        let result = sqlx::query(
            "UPDATE offline_operations \
             SET status = 'pending', updated_at = $1 \
             WHERE status = 'failed' AND retry_count < max_retries \
               AND next_retry_at IS NOT NULL AND next_retry_at <= $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected())
    }

    /// Claims up to `batch` due operations for processing.
    ///
    /// Rows are taken highest priority first, oldest first within a
    /// priority, and are skipped rather than waited on when another
    /// drain tick holds them.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::PersistenceError` on database failure.
    pub async fn claim_due_operations(
        &self,
        batch: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueuedOperation>, GatewayError> {
        let rows = sqlx::query_as::<_, OperationRow>(&format!(
            "WITH claimable AS ( \
                 SELECT id FROM offline_operations \
                 WHERE status = 'pending' \
                   AND (next_retry_at IS NULL OR next_retry_at <= $1) \
                   AND retry_count < max_retries \
                 ORDER BY priority DESC, created_at ASC \
                 LIMIT $2 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             UPDATE offline_operations o \
             SET status = 'processing', claimed_at = $1, updated_at = $1 \
             FROM claimable c WHERE o.id = c.id \
             RETURNING {OPERATION_COLUMNS}",
        ))
        .bind(now)
        .bind(batch)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(OperationRow::into_domain).collect()
    }

    /// Checks whether an operation has already been applied
    /// downstream in a previous attempt.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::PersistenceError` on database failure.
    pub async fn was_operation_applied(&self, id: OperationId) -> Result<bool, GatewayError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM applied_operations WHERE operation_id = $1)",
        )
        .bind(id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }

    /// Records a failed attempt.
    ///
    /// The row moves to `failed` with the new retry count; when a
    /// retry deadline is given the next drain tick re-queues the row
    /// once it is due, otherwise the row stays in the dead letter set.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::PersistenceError` on database failure.
    pub async fn fail_operation(
        &self,
        id: OperationId,
        retry_count: u32,
        error: &str,
        next_retry_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        sqlx::query(
            "UPDATE offline_operations \
             SET status = 'failed', retry_count = $2, error = $3, next_retry_at = $4, \
                 claimed_at = NULL, updated_at = $5 \
             WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(i32::try_from(retry_count).unwrap_or(i32::MAX))
        .bind(error)
        .bind(next_retry_at)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    /// Completes a claimed operation: appends its ledger entry,
    /// applies the snapshot side effect, marks the row `completed` and
    /// records the replay marker, all in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::PersistenceError` on database failure or
    /// a corrupt stored row.
    pub async fn complete_operation(
        &self,
        id: OperationId,
        entry: &NewLedgerEntry,
        snapshot: Option<&SnapshotUpsert>,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, GatewayError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let row = Self::insert_ledger_entry(&mut tx, entry).await?;
        Self::apply_snapshot(&mut tx, entry, snapshot).await?;

        sqlx::query(
            "UPDATE offline_operations \
             SET status = 'completed', error = NULL, claimed_at = NULL, updated_at = $2 \
             WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "INSERT INTO applied_operations (operation_id, applied_at) VALUES ($1, $2) \
             ON CONFLICT (operation_id) DO NOTHING",
        )
        .bind(id.as_uuid())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        row.into_domain()
    }

    /// Marks a claimed operation `completed` without touching the
    /// ledger. Used when the replay marker shows a previous attempt
    /// already applied it downstream.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::PersistenceError` on database failure.
    pub async fn complete_replayed_operation(
        &self,
        id: OperationId,
        now: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        sqlx::query(
            "UPDATE offline_operations \
             SET status = 'completed', error = NULL, claimed_at = NULL, updated_at = $2 \
             WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }
}
