//! Sync ledger service: append, history, and conflict resolution.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::conflict::{decide, resolved_value};
use crate::domain::ledger::extract_updated_at;
use crate::domain::{
    DeviceId, EntityType, EventBus, IncomingWrite, LedgerEntry, NewLedgerEntry, ResolutionAction,
    SyncEvent, SyncOperation,
};
use crate::error::GatewayError;
use crate::persistence::PostgresPersistence;
use crate::persistence::models::SnapshotUpsert;

/// Most ledger entries one history call returns.
const MAX_HISTORY_LIMIT: i64 = 500;

/// Outcome of a resolve call: the decision plus the value that won.
#[derive(Debug, Clone)]
pub struct ResolvedWrite {
    /// Whether two writers diverged on the entity.
    pub conflict: bool,
    /// Which value won.
    pub action: ResolutionAction,
    /// The value the caller must now treat as current.
    pub resolved_value: serde_json::Value,
}

/// Orchestrates the append-only sync ledger and the last-write-wins
/// resolver.
#[derive(Debug, Clone)]
pub struct SyncService {
    persistence: Arc<PostgresPersistence>,
    event_bus: EventBus,
}

impl SyncService {
    /// Creates a new `SyncService`.
    #[must_use]
    pub fn new(persistence: Arc<PostgresPersistence>, event_bus: EventBus) -> Self {
        Self {
            persistence,
            event_bus,
        }
    }

    /// Appends one ledger entry for a committed mutation.
    ///
    /// This is the collaborator write path: every create/update/delete
    /// of a synchronizable entity lands here. When the entry carries an
    /// after-value, the entity snapshot advances with it (guarded, so
    /// replayed appends cannot roll it back); a `delete` drops the
    /// snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::DeviceNotFound`] for an unregistered
    /// device, or a persistence error.
    pub async fn append(&self, entry: NewLedgerEntry) -> Result<LedgerEntry, GatewayError> {
        self.persistence
            .device_by_id(entry.device_id)
            .await?
            .ok_or(GatewayError::DeviceNotFound(*entry.device_id.as_uuid()))?;

        let snapshot = entry.data_after.as_ref().map(|after| SnapshotUpsert {
            data: after.clone(),
            // Entities on this platform carry their own updated_at; an
            // after-value without one is versioned at append time.
            updated_at: extract_updated_at(after).unwrap_or_else(Utc::now),
        });

        let stored = self.persistence.append_entry(&entry, snapshot.as_ref()).await?;

        let _ = self.event_bus.publish(SyncEvent::LedgerAppended {
            entry_id: stored.id,
            user_id: stored.user_id,
            device_id: stored.device_id,
            entity_type: stored.entity_type,
            entity_id: stored.entity_id,
            operation: stored.operation,
            conflict_detected: stored.conflict_detected,
            timestamp: Utc::now(),
        });

        tracing::info!(
            entry_id = stored.id,
            entity_type = %stored.entity_type,
            entity_id = %stored.entity_id,
            operation = %stored.operation,
            conflict = stored.conflict_detected,
            "ledger entry appended"
        );
        Ok(stored)
    }

    /// Returns the most recent ledger entries for one entity.
    ///
    /// # Errors
    ///
    /// Returns a persistence error on database failure.
    pub async fn history(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
        limit: i64,
    ) -> Result<Vec<LedgerEntry>, GatewayError> {
        let limit = limit.clamp(1, MAX_HISTORY_LIMIT);
        self.persistence.ledger_history(entity_type, entity_id, limit).await
    }

    /// Resolves an incoming device write against the current server
    /// state and records the decision in the ledger.
    ///
    /// The decision is pure last-write-wins on `updated_at` (see
    /// [`decide`]); a winning write advances the entity snapshot in
    /// the same transaction as the `sync` ledger entry.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::DeviceNotFound`] for an unregistered
    /// device, or a persistence error.
    pub async fn resolve(
        &self,
        device_id: DeviceId,
        entity_type: EntityType,
        incoming: IncomingWrite,
    ) -> Result<ResolvedWrite, GatewayError> {
        let device = self
            .persistence
            .device_by_id(device_id)
            .await?
            .ok_or(GatewayError::DeviceNotFound(*device_id.as_uuid()))?;

        let server = self
            .persistence
            .entity_snapshot(entity_type, incoming.entity_id)
            .await?;

        let resolution = decide(server.as_ref(), &incoming);
        let winner = resolved_value(resolution, server.as_ref(), &incoming).clone();

        let snapshot = (resolution.action == ResolutionAction::UseLatest).then(|| SnapshotUpsert {
            data: incoming.data.clone(),
            updated_at: incoming.updated_at,
        });

        let entry = NewLedgerEntry::new(
            device.user_id,
            device_id,
            entity_type,
            incoming.entity_id,
            SyncOperation::Sync,
            server.map(|s| s.data),
            Some(winner.clone()),
            resolution.conflict,
            Some(resolution.action),
        );
        self.persistence.append_entry(&entry, snapshot.as_ref()).await?;

        let _ = self.event_bus.publish(SyncEvent::ConflictResolved {
            entity_type,
            entity_id: incoming.entity_id,
            device_id,
            conflict: resolution.conflict,
            action: resolution.action,
            timestamp: Utc::now(),
        });

        tracing::info!(
            entity_type = %entity_type,
            entity_id = %incoming.entity_id,
            device_id = %device_id,
            conflict = resolution.conflict,
            action = %resolution.action,
            "incoming write resolved"
        );

        Ok(ResolvedWrite {
            conflict: resolution.conflict,
            action: resolution.action,
            resolved_value: winner,
        })
    }
}
