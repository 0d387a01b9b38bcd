//! Sync ledger and conflict resolution DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{
    DeviceId, EntityType, IncomingWrite, LedgerEntry, NewLedgerEntry, ResolutionAction,
    SyncEntryStatus, SyncOperation,
};
use crate::service::ResolvedWrite;

/// Request body for `POST /sync/ledger`.
///
/// Collaborator services log their own committed writes here; entries
/// default to `completed` unless the caller stages them explicitly.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AppendLedgerRequest {
    /// User whose entity was mutated.
    pub user_id: uuid::Uuid,
    /// Device the mutation is attributed to.
    pub device_id: uuid::Uuid,
    /// Entity class.
    pub entity_type: EntityType,
    /// Identifier of the mutated entity.
    pub entity_id: uuid::Uuid,
    /// Kind of mutation.
    pub operation: SyncOperation,
    /// Entity value before the mutation, when known.
    #[serde(default)]
    pub data_before: Option<serde_json::Value>,
    /// Entity value after the mutation, when known.
    #[serde(default)]
    pub data_after: Option<serde_json::Value>,
    /// Whether the caller already detected a conflict.
    #[serde(default)]
    pub conflict_detected: bool,
    /// Entry status override for staged writes.
    #[serde(default)]
    pub status: Option<SyncEntryStatus>,
}

impl From<AppendLedgerRequest> for NewLedgerEntry {
    fn from(req: AppendLedgerRequest) -> Self {
        let entry = Self::new(
            req.user_id,
            DeviceId::from(req.device_id),
            req.entity_type,
            req.entity_id,
            req.operation,
            req.data_before,
            req.data_after,
            req.conflict_detected,
            None,
        );
        match req.status {
            Some(status) => entry.with_status(status),
            None => entry,
        }
    }
}

/// Ledger entry as returned by history and append endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct LedgerEntryDto {
    /// Monotonic append order.
    pub id: i64,
    /// User whose entity was mutated.
    pub user_id: uuid::Uuid,
    /// Device the mutation is attributed to.
    pub device_id: DeviceId,
    /// Entity class.
    pub entity_type: EntityType,
    /// Identifier of the mutated entity.
    pub entity_id: uuid::Uuid,
    /// Kind of mutation.
    pub operation: SyncOperation,
    /// Entry status.
    pub status: SyncEntryStatus,
    /// Entity value before the mutation.
    pub data_before: Option<serde_json::Value>,
    /// Entity value after the mutation.
    pub data_after: Option<serde_json::Value>,
    /// Whether this entry records a detected conflict.
    pub conflict_detected: bool,
    /// Resolution decision, when the entry came out of the resolver.
    pub resolution: Option<ResolutionAction>,
    /// Append timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<LedgerEntry> for LedgerEntryDto {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            id: entry.id,
            user_id: entry.user_id,
            device_id: entry.device_id,
            entity_type: entry.entity_type,
            entity_id: entry.entity_id,
            operation: entry.operation,
            status: entry.status,
            data_before: entry.data_before,
            data_after: entry.data_after,
            conflict_detected: entry.conflict_detected,
            resolution: entry.resolution,
            created_at: entry.created_at,
        }
    }
}

/// Query parameters for `GET /sync/ledger`.
#[derive(Debug, Deserialize, IntoParams)]
pub struct LedgerHistoryParams {
    /// Entity class to read history for.
    pub entity_type: EntityType,
    /// Entity identifier.
    pub entity_id: uuid::Uuid,
    /// Most entries to return, newest first (max 500). Defaults to 50.
    #[serde(default = "default_history_limit")]
    pub limit: i64,
}

fn default_history_limit() -> i64 {
    50
}

/// Response body for `GET /sync/ledger`.
#[derive(Debug, Serialize, ToSchema)]
pub struct LedgerHistoryResponse {
    /// Entries newest first.
    pub data: Vec<LedgerEntryDto>,
    /// Number of entries returned.
    pub total: usize,
}

/// Request body for `POST /sync/resolve`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ResolveRequest {
    /// Device submitting the write.
    pub device_id: uuid::Uuid,
    /// Entity class the write targets.
    pub entity_type: EntityType,
    /// Entity the write targets.
    pub entity_id: uuid::Uuid,
    /// Client-side mutation timestamp.
    pub updated_at: DateTime<Utc>,
    /// Server version the device last observed, when known.
    #[serde(default)]
    pub base_updated_at: Option<DateTime<Utc>>,
    /// The proposed entity value.
    pub data: serde_json::Value,
}

impl ResolveRequest {
    /// Splits the request into its write payload.
    #[must_use]
    pub fn into_write(self) -> (DeviceId, EntityType, IncomingWrite) {
        (
            DeviceId::from(self.device_id),
            self.entity_type,
            IncomingWrite {
                entity_id: self.entity_id,
                updated_at: self.updated_at,
                base_updated_at: self.base_updated_at,
                data: self.data,
            },
        )
    }
}

/// Response body for `POST /sync/resolve`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ResolveResponse {
    /// Whether two writers diverged on this entity.
    pub conflict: bool,
    /// Which side won.
    pub action: ResolutionAction,
    /// The value that is now authoritative.
    pub resolved_value: serde_json::Value,
}

impl From<ResolvedWrite> for ResolveResponse {
    fn from(resolved: ResolvedWrite) -> Self {
        Self {
            conflict: resolved.conflict,
            action: resolved.action,
            resolved_value: resolved.resolved_value,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn append_request_defaults_to_completed() {
        let json = serde_json::json!({
            "user_id": uuid::Uuid::new_v4(),
            "device_id": uuid::Uuid::new_v4(),
            "entity_type": "booking",
            "entity_id": uuid::Uuid::new_v4(),
            "operation": "create",
            "data_after": {"status": "confirmed"},
        });
        let req: AppendLedgerRequest = serde_json::from_value(json).ok().unwrap_or_else(|| {
            panic!("request should deserialize");
        });
        let entry = NewLedgerEntry::from(req);
        assert_eq!(entry.status, SyncEntryStatus::Completed);
        assert_eq!(entry.operation, SyncOperation::Create);
        assert!(entry.data_before.is_none());
    }

    #[test]
    fn append_request_honors_staged_status() {
        let json = serde_json::json!({
            "user_id": uuid::Uuid::new_v4(),
            "device_id": uuid::Uuid::new_v4(),
            "entity_type": "profile",
            "entity_id": uuid::Uuid::new_v4(),
            "operation": "update",
            "status": "pending",
        });
        let req: AppendLedgerRequest = serde_json::from_value(json).ok().unwrap_or_else(|| {
            panic!("request should deserialize");
        });
        let entry = NewLedgerEntry::from(req);
        assert_eq!(entry.status, SyncEntryStatus::Pending);
    }

    #[test]
    fn resolve_request_splits_into_write() {
        let device = uuid::Uuid::new_v4();
        let entity = uuid::Uuid::new_v4();
        let json = serde_json::json!({
            "device_id": device,
            "entity_type": "preferences",
            "entity_id": entity,
            "updated_at": "2026-08-01T10:30:00Z",
            "data": {"theme": "dark"},
        });
        let req: ResolveRequest = serde_json::from_value(json).ok().unwrap_or_else(|| {
            panic!("request should deserialize");
        });
        let (device_id, entity_type, write) = req.into_write();
        assert_eq!(*device_id.as_uuid(), device);
        assert_eq!(entity_type, EntityType::Preferences);
        assert_eq!(write.entity_id, entity);
        assert!(write.base_updated_at.is_none());
    }
}
