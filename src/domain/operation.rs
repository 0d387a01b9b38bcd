//! Offline operation queue types: the typed operation union, the
//! per-operation status machine, and the retry backoff schedule.
//!
//! Operations are submitted while a device is disconnected and replayed
//! by the drain worker. The union has one variant per supported
//! `operation_type`, so dispatch is an exhaustive match rather than a
//! string comparison; unknown types are rejected once, at the enqueue
//! boundary.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::conflict::IncomingWrite;
use super::device::DeviceId;
use super::ledger::{EntityType, SyncOperation};
use crate::error::GatewayError;

/// Unique identifier for a queued offline operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct OperationId(uuid::Uuid);

impl OperationId {
    /// Creates a new random `OperationId` (UUID v4).
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Creates an `OperationId` from an existing [`uuid::Uuid`].
    #[must_use]
    pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner [`uuid::Uuid`].
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<uuid::Uuid> for OperationId {
    fn from(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }
}

impl From<OperationId> for uuid::Uuid {
    fn from(id: OperationId) -> Self {
        id.0
    }
}

/// Lifecycle status of a queued operation.
///
/// `pending → processing → {completed | failed}`; a `failed` row with
/// retries remaining is re-queued to `pending` by the next drain cycle
/// once its backoff is due, and is dead-lettered once `retry_count`
/// reaches `max_retries`. `cancelled` is reachable from `pending` alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Waiting to be claimed by a drain cycle.
    Pending,
    /// Claimed by a drain worker; in flight.
    Processing,
    /// Applied successfully; terminal.
    Completed,
    /// Last attempt failed; terminal only once the retry budget is spent.
    Failed,
    /// Cancelled by the client while still pending; terminal.
    Cancelled,
}

impl OperationStatus {
    /// Returns the status as its stored string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
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
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(GatewayError::InvalidRequest(format!(
                "unknown operation status: {other}"
            ))),
        }
    }

    /// Whether the status admits no further transitions regardless of
    /// the retry budget. `failed` is deliberately excluded: it is
    /// terminal only when `retry_count` has reached `max_retries`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A queued operation row as stored, payload still untyped.
///
/// The payload is parsed into an [`OfflineOperation`] at drain time, not
/// at load time, so a malformed row can be dead-lettered instead of
/// poisoning the whole batch.
#[derive(Debug, Clone, Serialize)]
pub struct QueuedOperation {
    /// Operation identifier.
    pub id: OperationId,
    /// Submitting device.
    pub device_id: DeviceId,
    /// Operation type tag (`create_booking`, ...).
    pub operation_type: String,
    /// Raw JSON payload as submitted.
    pub payload: serde_json::Value,
    /// Drain priority 0–10; higher drains first.
    pub priority: i16,
    /// Failed attempts so far.
    pub retry_count: u32,
    /// Retry budget.
    pub max_retries: u32,
    /// Lifecycle status.
    pub status: OperationStatus,
    /// Client-generated dedup token, unique per device.
    pub idempotency_key: String,
    /// Message from the most recent failed attempt.
    pub error: Option<String>,
    /// Earliest time the next attempt may run.
    pub next_retry_at: Option<DateTime<Utc>>,
    /// When the current `processing` claim was taken.
    pub claimed_at: Option<DateTime<Utc>>,
    /// Enqueue timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl QueuedOperation {
    /// Parses the stored payload into the typed operation union.
    ///
    /// # Errors
    ///
    /// Same as [`OfflineOperation::from_parts`].
    pub fn parse(&self) -> Result<OfflineOperation, GatewayError> {
        OfflineOperation::from_parts(&self.operation_type, &self.payload)
    }

    /// Whether the retry budget is spent and the row requires an operator.
    #[must_use]
    pub const fn is_dead_lettered(&self) -> bool {
        matches!(self.status, OperationStatus::Failed) && self.retry_count >= self.max_retries
    }

    /// Whether the client may still cancel this operation.
    #[must_use]
    pub const fn is_cancellable(&self) -> bool {
        matches!(self.status, OperationStatus::Pending)
    }
}

/// A parsed offline operation, one variant per supported type.
///
/// Every variant carries an [`IncomingWrite`]: the payload a client
/// queued while offline always targets one synchronizable entity and
/// must name it (`entity_id`) and version it (`updated_at`) so the
/// drain worker can run it through the resolver before dispatching.
#[derive(Debug, Clone)]
pub enum OfflineOperation {
    /// Create a booking at the booking collaborator.
    CreateBooking(IncomingWrite),
    /// Update the user profile at the profile collaborator.
    UpdateProfile(IncomingWrite),
    /// Cancel a booking at the booking collaborator.
    CancelBooking(IncomingWrite),
    /// Update the preference blob at the preferences collaborator.
    UpdatePreferences(IncomingWrite),
}

impl OfflineOperation {
    /// All supported `operation_type` strings, for error messages.
    pub const SUPPORTED_TYPES: [&'static str; 4] = [
        "create_booking",
        "update_profile",
        "cancel_booking",
        "update_preferences",
    ];

    /// Assembles an operation from its stored (`operation_type`,
    /// `payload`) parts.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidOperationType`] for an unknown type
    /// string and [`GatewayError::InvalidRequest`] when the payload does
    /// not carry the required `entity_id`/`updated_at` fields.
    pub fn from_parts(
        operation_type: &str,
        payload: &serde_json::Value,
    ) -> Result<Self, GatewayError> {
        let write: IncomingWrite = serde_json::from_value(payload.clone()).map_err(|e| {
            GatewayError::InvalidRequest(format!("malformed operation payload: {e}"))
        })?;

        match operation_type {
            "create_booking" => Ok(Self::CreateBooking(write)),
            "update_profile" => Ok(Self::UpdateProfile(write)),
            "cancel_booking" => Ok(Self::CancelBooking(write)),
            "update_preferences" => Ok(Self::UpdatePreferences(write)),
            other => Err(GatewayError::InvalidOperationType(other.to_string())),
        }
    }

    /// Returns the `operation_type` string this variant is stored under.
    #[must_use]
    pub const fn operation_type(&self) -> &'static str {
        match self {
            Self::CreateBooking(_) => "create_booking",
            Self::UpdateProfile(_) => "update_profile",
            Self::CancelBooking(_) => "cancel_booking",
            Self::UpdatePreferences(_) => "update_preferences",
        }
    }

    /// Entity class the operation mutates.
    #[must_use]
    pub const fn entity_type(&self) -> EntityType {
        match self {
            Self::CreateBooking(_) | Self::CancelBooking(_) => EntityType::Booking,
            Self::UpdateProfile(_) => EntityType::Profile,
            Self::UpdatePreferences(_) => EntityType::Preferences,
        }
    }

    /// Ledger operation recorded when this write wins.
    ///
    /// A cancellation is a status update to the booking, not a delete.
    #[must_use]
    pub const fn ledger_operation(&self) -> SyncOperation {
        match self {
            Self::CreateBooking(_) => SyncOperation::Create,
            Self::UpdateProfile(_) | Self::CancelBooking(_) | Self::UpdatePreferences(_) => {
                SyncOperation::Update
            }
        }
    }

    /// Downstream collaborator service the operation dispatches to.
    #[must_use]
    pub const fn downstream_service(&self) -> &'static str {
        match self {
            Self::CreateBooking(_) | Self::CancelBooking(_) => "booking-api",
            Self::UpdateProfile(_) => "profile-api",
            Self::UpdatePreferences(_) => "preferences-api",
        }
    }

    /// The entity write carried by the operation.
    #[must_use]
    pub const fn write(&self) -> &IncomingWrite {
        match self {
            Self::CreateBooking(w)
            | Self::UpdateProfile(w)
            | Self::CancelBooking(w)
            | Self::UpdatePreferences(w) => w,
        }
    }
}

/// Highest priority a client may request.
pub const MAX_PRIORITY: i16 = 10;

/// Clamps a requested priority into the 0–10 range.
#[must_use]
pub fn clamp_priority(priority: i64) -> i16 {
    #[allow(clippy::cast_possible_truncation)]
    {
        priority.clamp(0, i64::from(MAX_PRIORITY)) as i16
    }
}

/// Exponent cap for the retry backoff, so a misconfigured retry budget
/// cannot overflow the shift.
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Backoff delay before the next attempt, given the failure count so far.
///
/// The Nth retry waits `2^N` minutes: retry 1 → 2 min, retry 2 → 4 min,
/// retry 3 → 8 min.
#[must_use]
pub fn retry_backoff(retry_count: u32) -> chrono::Duration {
    let exponent = retry_count.min(MAX_BACKOFF_EXPONENT);
    chrono::Duration::minutes(1_i64 << exponent)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn booking_payload() -> serde_json::Value {
        serde_json::json!({
            "entity_id": uuid::Uuid::new_v4(),
            "updated_at": "2026-08-01T10:00:00Z",
            "data": {"service": "haircut", "starts_at": "2026-08-02T09:00:00Z"},
        })
    }

    #[test]
    fn from_parts_accepts_all_supported_types() {
        for op_type in OfflineOperation::SUPPORTED_TYPES {
            let op = OfflineOperation::from_parts(op_type, &booking_payload());
            let Ok(op) = op else {
                panic!("expected {op_type} to parse");
            };
            assert_eq!(op.operation_type(), op_type);
        }
    }

    #[test]
    fn from_parts_rejects_unknown_type() {
        let result = OfflineOperation::from_parts("reindex_catalog", &booking_payload());
        assert!(matches!(
            result,
            Err(GatewayError::InvalidOperationType(_))
        ));
    }

    #[test]
    fn from_parts_rejects_payload_without_identity() {
        let result = OfflineOperation::from_parts(
            "create_booking",
            &serde_json::json!({"data": {"service": "massage"}}),
        );
        assert!(matches!(result, Err(GatewayError::InvalidRequest(_))));
    }

    #[test]
    fn variants_route_to_their_collaborator() {
        let payload = booking_payload();
        let cases = [
            ("create_booking", "booking-api", EntityType::Booking),
            ("cancel_booking", "booking-api", EntityType::Booking),
            ("update_profile", "profile-api", EntityType::Profile),
            (
                "update_preferences",
                "preferences-api",
                EntityType::Preferences,
            ),
        ];
        for (op_type, service, entity) in cases {
            let Ok(op) = OfflineOperation::from_parts(op_type, &payload) else {
                panic!("parse failed for {op_type}");
            };
            assert_eq!(op.downstream_service(), service);
            assert_eq!(op.entity_type(), entity);
        }
    }

    #[test]
    fn cancel_is_an_update_not_a_delete() {
        let Ok(op) = OfflineOperation::from_parts("cancel_booking", &booking_payload()) else {
            panic!("parse failed");
        };
        assert_eq!(op.ledger_operation(), SyncOperation::Update);
    }

    #[test]
    fn priority_is_clamped_to_range() {
        assert_eq!(clamp_priority(-3), 0);
        assert_eq!(clamp_priority(0), 0);
        assert_eq!(clamp_priority(7), 7);
        assert_eq!(clamp_priority(10), 10);
        assert_eq!(clamp_priority(99), 10);
    }

    #[test]
    fn backoff_doubles_per_retry() {
        assert_eq!(retry_backoff(1), chrono::Duration::minutes(2));
        assert_eq!(retry_backoff(2), chrono::Duration::minutes(4));
        assert_eq!(retry_backoff(3), chrono::Duration::minutes(8));
        assert_eq!(retry_backoff(4), chrono::Duration::minutes(16));
    }

    #[test]
    fn backoff_exponent_is_capped() {
        assert_eq!(retry_backoff(40), retry_backoff(16));
    }

    #[test]
    fn terminal_statuses() {
        assert!(!OperationStatus::Pending.is_terminal());
        assert!(!OperationStatus::Processing.is_terminal());
        assert!(OperationStatus::Completed.is_terminal());
        assert!(OperationStatus::Cancelled.is_terminal());
        // failed stays retryable until the budget runs out
        assert!(!OperationStatus::Failed.is_terminal());
    }

    fn queued(status: OperationStatus, retry_count: u32) -> QueuedOperation {
        QueuedOperation {
            id: OperationId::new(),
            device_id: DeviceId::new(),
            operation_type: "create_booking".to_string(),
            payload: booking_payload(),
            priority: 5,
            retry_count,
            max_retries: 3,
            status,
            idempotency_key: "op-1".to_string(),
            error: None,
            next_retry_at: None,
            claimed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn dead_letter_requires_exhausted_budget() {
        assert!(!queued(OperationStatus::Failed, 2).is_dead_lettered());
        assert!(queued(OperationStatus::Failed, 3).is_dead_lettered());
        assert!(!queued(OperationStatus::Completed, 3).is_dead_lettered());
    }

    #[test]
    fn only_pending_is_cancellable() {
        assert!(queued(OperationStatus::Pending, 0).is_cancellable());
        assert!(!queued(OperationStatus::Processing, 0).is_cancellable());
        assert!(!queued(OperationStatus::Failed, 1).is_cancellable());
    }

    #[test]
    fn stored_row_parses_back_to_typed_operation() {
        let row = queued(OperationStatus::Pending, 0);
        let Ok(op) = row.parse() else {
            panic!("stored payload failed to parse");
        };
        assert_eq!(op.operation_type(), "create_booking");
    }

    #[test]
    fn status_parse_round_trip() {
        for s in [
            OperationStatus::Pending,
            OperationStatus::Processing,
            OperationStatus::Completed,
            OperationStatus::Failed,
            OperationStatus::Cancelled,
        ] {
            let parsed = OperationStatus::parse(s.as_str());
            let Ok(parsed) = parsed else {
                panic!("round trip failed for {s}");
            };
            assert_eq!(parsed, s);
        }
    }
}
