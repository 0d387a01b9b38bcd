//! Offline operation queue service: enqueue, lifecycle, and the
//! scheduler-driven drain worker.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::domain::conflict::decide;
use crate::domain::operation::{clamp_priority, retry_backoff};
use crate::domain::{
    DeviceId, EventBus, NewLedgerEntry, OfflineOperation, OperationId, QueuedOperation,
    ResolutionAction, SyncEvent, SyncOperation,
};
use crate::error::GatewayError;
use crate::persistence::PostgresPersistence;
use crate::persistence::models::SnapshotUpsert;
use crate::service::ResilienceService;
use crate::service::dispatcher::OperationDispatcher;

/// Most dead-letter rows one view call returns.
const MAX_DEAD_LETTER_LIMIT: i64 = 500;

/// Summary of one drain cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct DrainReport {
    /// Abandoned `processing` claims returned to `pending`.
    pub released: u64,
    /// `failed` rows whose backoff came due, returned to `pending`.
    pub requeued: u64,
    /// Rows claimed by this cycle.
    pub claimed: usize,
    /// Claimed rows that completed (applied, replayed, or stale no-op).
    pub completed: usize,
    /// Claimed rows that failed this attempt.
    pub failed: usize,
}

/// Tunables for the queue, taken from configuration at startup.
#[derive(Debug, Clone, Copy)]
pub struct QueuePolicy {
    /// Retry budget stamped onto newly enqueued operations.
    pub max_retries: u32,
    /// Most operations one drain cycle claims.
    pub drain_batch_size: i64,
    /// Age after which a `processing` claim counts as abandoned.
    pub claim_timeout_secs: i64,
}

/// Orchestrates the offline operation queue.
///
/// Enqueue is client-facing; drain is invoked by an external scheduler
/// and replays claimed operations through the resolver, the circuit
/// breaker and the collaborator dispatch seam.
#[derive(Debug, Clone)]
pub struct QueueService {
    persistence: Arc<PostgresPersistence>,
    dispatcher: Arc<dyn OperationDispatcher>,
    resilience: ResilienceService,
    event_bus: EventBus,
    policy: QueuePolicy,
    environment: String,
}

impl QueueService {
    /// Creates a new `QueueService`.
    ///
    /// `environment` names the deployment environment of the
    /// collaborators this queue dispatches to; breaker state is keyed
    /// on it.
    #[must_use]
    pub fn new(
        persistence: Arc<PostgresPersistence>,
        dispatcher: Arc<dyn OperationDispatcher>,
        resilience: ResilienceService,
        event_bus: EventBus,
        policy: QueuePolicy,
        environment: String,
    ) -> Self {
        Self {
            persistence,
            dispatcher,
            resilience,
            event_bus,
            policy,
            environment,
        }
    }

    /// Accepts an operation from a device that worked offline.
    ///
    /// The payload is validated by parsing it into the typed operation
    /// union; unknown types and payloads without entity identity are
    /// rejected here, once, rather than at drain time. Re-submitting
    /// an existing (device, `idempotency_key`) returns the previously
    /// queued operation with `created = false`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::DeviceNotFound`] for an unregistered
    /// device, [`GatewayError::InvalidOperationType`] /
    /// [`GatewayError::InvalidRequest`] for a bad submission, or a
    /// persistence error.
    pub async fn enqueue(
        &self,
        device_id: DeviceId,
        operation_type: &str,
        payload: serde_json::Value,
        priority: i64,
        idempotency_key: &str,
    ) -> Result<(QueuedOperation, bool), GatewayError> {
        self.persistence
            .device_by_id(device_id)
            .await?
            .ok_or(GatewayError::DeviceNotFound(*device_id.as_uuid()))?;

        OfflineOperation::from_parts(operation_type, &payload)?;
        if idempotency_key.trim().is_empty() {
            return Err(GatewayError::InvalidRequest(
                "idempotency_key must not be empty".to_string(),
            ));
        }

        let priority = clamp_priority(priority);
        let (operation, created) = self
            .persistence
            .insert_operation(
                device_id,
                operation_type,
                &payload,
                priority,
                self.policy.max_retries,
                idempotency_key,
            )
            .await?;

        if created {
            let _ = self.event_bus.publish(SyncEvent::OperationEnqueued {
                operation_id: operation.id,
                device_id,
                operation_type: operation.operation_type.clone(),
                priority: operation.priority,
                timestamp: Utc::now(),
            });
            tracing::info!(
                operation_id = %operation.id,
                device_id = %device_id,
                operation_type = %operation.operation_type,
                priority = operation.priority,
                "offline operation enqueued"
            );
        } else {
            tracing::debug!(
                operation_id = %operation.id,
                device_id = %device_id,
                idempotency_key,
                "duplicate enqueue; returning existing operation"
            );
        }

        Ok((operation, created))
    }

    /// Loads one queued operation.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::OperationNotFound`] when no such
    /// operation exists, or a persistence error.
    pub async fn get(&self, id: OperationId) -> Result<QueuedOperation, GatewayError> {
        self.persistence
            .operation_by_id(id)
            .await?
            .ok_or(GatewayError::OperationNotFound(*id.as_uuid()))
    }

    /// Cancels an operation that is still `pending`.
    ///
    /// An operation in any other state is left alone: `processing` is
    /// allowed to finish, and a `failed` row awaiting its backoff is
    /// considered in flight.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::OperationNotFound`] when no such
    /// operation exists, [`GatewayError::CancelRejected`] when it is
    /// no longer pending, or a persistence error.
    pub async fn cancel(&self, id: OperationId) -> Result<QueuedOperation, GatewayError> {
        if let Some(operation) = self.persistence.cancel_operation(id, Utc::now()).await? {
            let _ = self.event_bus.publish(SyncEvent::OperationCancelled {
                operation_id: operation.id,
                timestamp: Utc::now(),
            });
            tracing::info!(operation_id = %operation.id, "operation cancelled");
            return Ok(operation);
        }

        match self.persistence.operation_by_id(id).await? {
            None => Err(GatewayError::OperationNotFound(*id.as_uuid())),
            Some(operation) => Err(GatewayError::CancelRejected {
                operation_id: *id.as_uuid(),
                status: operation.status.to_string(),
            }),
        }
    }

    /// Lists operations whose retry budget is spent.
    ///
    /// # Errors
    ///
    /// Returns a persistence error on database failure.
    pub async fn dead_letter(&self, limit: i64) -> Result<Vec<QueuedOperation>, GatewayError> {
        self.persistence
            .dead_letter_operations(limit.clamp(1, MAX_DEAD_LETTER_LIMIT))
            .await
    }

    /// Runs one drain cycle. Invoked by the external scheduler; an
    /// idempotent no-op when nothing is due.
    ///
    /// The cycle reclaims abandoned `processing` rows, re-queues due
    /// retries, claims a batch of due work, and processes each claimed
    /// operation: replay check, resolver decision, then dispatch under
    /// the circuit breaker.
    ///
    /// # Errors
    ///
    /// Returns a persistence error when the claim phase itself fails;
    /// per-operation failures are recorded on their rows instead.
    pub async fn drain(&self) -> Result<DrainReport, GatewayError> {
        let now = Utc::now();
        let cutoff = now - Duration::seconds(self.policy.claim_timeout_secs);

        let released = self.persistence.release_stale_claims(cutoff, now).await?;
        let requeued = self.persistence.requeue_due_retries(now).await?;
        let claimed_ops = self
            .persistence
            .claim_due_operations(self.policy.drain_batch_size, now)
            .await?;

        let mut report = DrainReport {
            released,
            requeued,
            claimed: claimed_ops.len(),
            completed: 0,
            failed: 0,
        };

        for operation in claimed_ops {
            match self.process_claimed(&operation).await {
                Ok(true) => report.completed = report.completed.saturating_add(1),
                Ok(false) => report.failed = report.failed.saturating_add(1),
                Err(e) => {
                    report.failed = report.failed.saturating_add(1);
                    tracing::error!(
                        operation_id = %operation.id,
                        error = %e,
                        "drain attempt could not be recorded"
                    );
                }
            }
        }

        let _ = self.event_bus.publish(SyncEvent::QueueDrained {
            claimed: report.claimed,
            completed: report.completed,
            failed: report.failed,
            timestamp: Utc::now(),
        });
        tracing::info!(
            claimed = report.claimed,
            completed = report.completed,
            failed = report.failed,
            released = report.released,
            requeued = report.requeued,
            "offline queue drained"
        );
        Ok(report)
    }

    /// Processes one claimed operation. `Ok(true)` means completed
    /// (applied, replayed, or stale no-op); `Ok(false)` means the
    /// attempt failed and was recorded on the row.
    async fn process_claimed(&self, operation: &QueuedOperation) -> Result<bool, GatewayError> {
        let now = Utc::now();

        let parsed = match operation.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                // A row that cannot be parsed will never succeed;
                // burn the budget and dead-letter it now.
                self.record_failure(operation, operation.max_retries, &e.to_string())
                    .await?;
                return Ok(false);
            }
        };

        if self.persistence.was_operation_applied(operation.id).await? {
            self.persistence
                .complete_replayed_operation(operation.id, now)
                .await?;
            let _ = self.event_bus.publish(SyncEvent::OperationCompleted {
                operation_id: operation.id,
                device_id: operation.device_id,
                applied: false,
                timestamp: Utc::now(),
            });
            tracing::info!(
                operation_id = %operation.id,
                "operation already applied downstream; completed without re-dispatch"
            );
            return Ok(true);
        }

        let device = self
            .persistence
            .device_by_id(operation.device_id)
            .await?
            .ok_or(GatewayError::DeviceNotFound(*operation.device_id.as_uuid()))?;

        let write = parsed.write();
        let entity_type = parsed.entity_type();
        let server = self
            .persistence
            .entity_snapshot(entity_type, write.entity_id)
            .await?;
        let resolution = decide(server.as_ref(), write);

        if resolution.action == ResolutionAction::KeepExisting {
            // Stale write: completes as a no-op, with the decision on
            // the ledger. Server state is both before and after.
            let server_value = server.map(|s| s.data);
            let entry = NewLedgerEntry::new(
                device.user_id,
                operation.device_id,
                entity_type,
                write.entity_id,
                SyncOperation::Sync,
                server_value.clone(),
                server_value,
                resolution.conflict,
                Some(ResolutionAction::KeepExisting),
            );
            self.persistence
                .complete_operation(operation.id, &entry, None, now)
                .await?;
            let _ = self.event_bus.publish(SyncEvent::OperationCompleted {
                operation_id: operation.id,
                device_id: operation.device_id,
                applied: false,
                timestamp: Utc::now(),
            });
            tracing::info!(
                operation_id = %operation.id,
                entity_id = %write.entity_id,
                conflict = resolution.conflict,
                "stale operation completed as no-op"
            );
            return Ok(true);
        }

        let service = parsed.downstream_service();
        if let Err(e) = self.resilience.admit(service, &self.environment).await {
            self.record_failure(
                operation,
                operation.retry_count.saturating_add(1),
                &e.to_string(),
            )
            .await?;
            return Ok(false);
        }

        match self.dispatcher.apply(&parsed, &operation.idempotency_key).await {
            Ok(()) => {
                self.resilience
                    .record_outcome(service, &self.environment, true)
                    .await?;

                let entry = NewLedgerEntry::new(
                    device.user_id,
                    operation.device_id,
                    entity_type,
                    write.entity_id,
                    parsed.ledger_operation(),
                    server.map(|s| s.data),
                    Some(write.data.clone()),
                    resolution.conflict,
                    Some(ResolutionAction::UseLatest),
                );
                let snapshot = SnapshotUpsert {
                    data: write.data.clone(),
                    updated_at: write.updated_at,
                };
                self.persistence
                    .complete_operation(operation.id, &entry, Some(&snapshot), now)
                    .await?;

                let _ = self.event_bus.publish(SyncEvent::OperationCompleted {
                    operation_id: operation.id,
                    device_id: operation.device_id,
                    applied: true,
                    timestamp: Utc::now(),
                });
                tracing::info!(
                    operation_id = %operation.id,
                    entity_id = %write.entity_id,
                    service,
                    "operation applied downstream"
                );
                Ok(true)
            }
            Err(e) => {
                self.resilience
                    .record_outcome(service, &self.environment, false)
                    .await?;
                self.record_failure(
                    operation,
                    operation.retry_count.saturating_add(1),
                    &format!("{e:#}"),
                )
                .await?;
                Ok(false)
            }
        }
    }

    /// Records a failed attempt with the given post-attempt retry
    /// count, scheduling the backoff or dead-lettering the row.
    async fn record_failure(
        &self,
        operation: &QueuedOperation,
        retry_count: u32,
        error: &str,
    ) -> Result<(), GatewayError> {
        let now = Utc::now();
        let retries_left = retry_count < operation.max_retries;
        let next_retry_at = retries_left.then(|| now + retry_backoff(retry_count));

        self.persistence
            .fail_operation(operation.id, retry_count, error, next_retry_at, now)
            .await?;

        let _ = self.event_bus.publish(SyncEvent::OperationFailed {
            operation_id: operation.id,
            device_id: operation.device_id,
            retry_count,
            dead_lettered: !retries_left,
            timestamp: now,
        });

        if retries_left {
            tracing::warn!(
                operation_id = %operation.id,
                retry_count,
                error,
                "operation attempt failed; retry scheduled"
            );
        } else {
            tracing::warn!(
                operation_id = %operation.id,
                retry_count,
                error,
                "operation dead-lettered"
            );
        }
        Ok(())
    }
}
