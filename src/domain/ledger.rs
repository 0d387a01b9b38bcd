//! Append-only sync ledger entry types.
//!
//! Every mutation to a synchronizable entity produces exactly one
//! [`LedgerEntry`], whether it originates from the owning write path
//! (self-writes log `data_after` only), from an offline operation drained
//! out of the queue, or from an explicit conflict resolution. Entries are
//! never updated or deleted; the ledger is the audit trail the resolver
//! and support staff read back.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::conflict::ResolutionAction;
use super::device::DeviceId;
use crate::error::GatewayError;

/// Synchronizable entity class an entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// A service booking (appointment).
    Booking,
    /// A user profile.
    Profile,
    /// A user preference blob.
    Preferences,
}

impl EntityType {
    /// Returns the entity type as its stored string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Booking => "booking",
            Self::Profile => "profile",
            Self::Preferences => "preferences",
        }
    }

    /// Parses an entity type from its stored string form.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidEntityType`] for unknown strings.
    pub fn parse(s: &str) -> Result<Self, GatewayError> {
        match s {
            "booking" => Ok(Self::Booking),
            "profile" => Ok(Self::Profile),
            "preferences" => Ok(Self::Preferences),
            other => Err(GatewayError::InvalidEntityType(other.to_string())),
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of mutation an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    /// Entity was created.
    Create,
    /// Entity was updated in place.
    Update,
    /// Entity was deleted.
    Delete,
    /// A conflict-resolution decision (no direct entity mutation).
    Sync,
}

impl SyncOperation {
    /// Returns the operation as its stored string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Sync => "sync",
        }
    }

    /// Parses an operation from its stored string form.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] for unknown strings.
    pub fn parse(s: &str) -> Result<Self, GatewayError> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "sync" => Ok(Self::Sync),
            other => Err(GatewayError::InvalidRequest(format!(
                "unknown sync operation: {other}"
            ))),
        }
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing status of a ledger entry.
///
/// Entries appended by this gateway record committed facts and are born
/// `completed`; `pending`/`in_progress` exist for collaborators that
/// stage an entry before finishing their own write. An entry is never
/// mutated once it reaches `completed` or `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SyncEntryStatus {
    /// Entry staged, mutation not yet committed.
    Pending,
    /// Mutation in flight.
    InProgress,
    /// Mutation committed; entry is immutable.
    Completed,
    /// Mutation failed; entry is immutable.
    Failed,
}

impl SyncEntryStatus {
    /// Returns the status as its stored string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from its stored string form.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] for unknown strings.
    pub fn parse(s: &str) -> Result<Self, GatewayError> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(GatewayError::InvalidRequest(format!(
                "unknown sync entry status: {other}"
            ))),
        }
    }
}

impl fmt::Display for SyncEntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A committed row of the sync ledger.
///
/// `id` is a `BIGSERIAL`; entries for one entity are totally ordered by
/// their commit order in the store.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
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
    /// Entity value before the mutation, when known.
    pub data_before: Option<serde_json::Value>,
    /// Entity value after the mutation, when known.
    pub data_after: Option<serde_json::Value>,
    /// Whether this entry records a detected conflict.
    pub conflict_detected: bool,
    /// Resolution decision, when the entry came out of the resolver.
    pub resolution: Option<ResolutionAction>,
    /// Append timestamp.
    pub created_at: DateTime<Utc>,
}

/// Input for a ledger append, mirroring the `append` operation.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
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
    /// Conflict flag.
    pub conflict_detected: bool,
    /// Resolution decision.
    pub resolution: Option<ResolutionAction>,
}

impl NewLedgerEntry {
    /// Creates an append input for the given mutation.
    ///
    /// The entry is born `completed`; use [`Self::with_status`] for the
    /// staged variants.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: uuid::Uuid,
        device_id: DeviceId,
        entity_type: EntityType,
        entity_id: uuid::Uuid,
        operation: SyncOperation,
        data_before: Option<serde_json::Value>,
        data_after: Option<serde_json::Value>,
        conflict_detected: bool,
        resolution: Option<ResolutionAction>,
    ) -> Self {
        Self {
            user_id,
            device_id,
            entity_type,
            entity_id,
            operation,
            status: SyncEntryStatus::Completed,
            data_before,
            data_after,
            conflict_detected,
            resolution,
        }
    }

    /// Overrides the entry status.
    #[must_use]
    pub const fn with_status(mut self, status: SyncEntryStatus) -> Self {
        self.status = status;
        self
    }
}

/// Reads the `updated_at` field out of an entity value, when present.
///
/// Synchronizable entities on this platform carry their own `updated_at`
/// column; the snapshot upsert uses it as the authoritative version
/// timestamp of an appended after-value.
#[must_use]
pub fn extract_updated_at(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    value
        .get("updated_at")
        .and_then(serde_json::Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn entity_type_parse_round_trip() {
        for t in [EntityType::Booking, EntityType::Profile, EntityType::Preferences] {
            let parsed = EntityType::parse(t.as_str());
            let Ok(parsed) = parsed else {
                panic!("round trip failed for {t}");
            };
            assert_eq!(parsed, t);
        }
    }

    #[test]
    fn entity_type_parse_rejects_unknown() {
        let result = EntityType::parse("invoice");
        assert!(matches!(result, Err(GatewayError::InvalidEntityType(_))));
    }

    #[test]
    fn operation_parse_round_trip() {
        for op in [
            SyncOperation::Create,
            SyncOperation::Update,
            SyncOperation::Delete,
            SyncOperation::Sync,
        ] {
            let parsed = SyncOperation::parse(op.as_str());
            let Ok(parsed) = parsed else {
                panic!("round trip failed for {op}");
            };
            assert_eq!(parsed, op);
        }
    }

    #[test]
    fn new_entry_is_completed() {
        let entry = NewLedgerEntry::new(
            uuid::Uuid::new_v4(),
            DeviceId::new(),
            EntityType::Booking,
            uuid::Uuid::new_v4(),
            SyncOperation::Create,
            None,
            Some(serde_json::json!({"status": "confirmed"})),
            false,
            None,
        );
        assert_eq!(entry.status, SyncEntryStatus::Completed);
        assert!(entry.data_before.is_none());
        assert!(!entry.conflict_detected);
    }

    #[test]
    fn extract_updated_at_reads_rfc3339() {
        let value = serde_json::json!({
            "status": "confirmed",
            "updated_at": "2026-08-01T10:30:00Z",
        });
        let ts = extract_updated_at(&value);
        let Some(ts) = ts else {
            panic!("expected timestamp");
        };
        assert_eq!(ts.to_rfc3339(), "2026-08-01T10:30:00+00:00");
    }

    #[test]
    fn extract_updated_at_tolerates_missing_or_invalid() {
        assert!(extract_updated_at(&serde_json::json!({})).is_none());
        assert!(extract_updated_at(&serde_json::json!({"updated_at": "yesterday"})).is_none());
        assert!(extract_updated_at(&serde_json::json!({"updated_at": 12})).is_none());
    }
}
