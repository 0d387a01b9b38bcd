//! Domain events reflecting sync state mutations.
//!
//! Every state change emits a [`SyncEvent`] through the
//! [`super::EventBus`]. Subscribers are in-process observers; events are
//! not persisted and carry no delivery guarantee beyond the broadcast
//! ring buffer.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::circuit::CircuitState;
use super::conflict::ResolutionAction;
use super::device::{DeviceId, Platform};
use super::health::HealthStatus;
use super::ledger::{EntityType, SyncOperation};
use super::notification::NotificationId;
use super::operation::OperationId;

/// Domain event emitted after every state mutation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// Emitted when a device registers or refreshes.
    DeviceRegistered {
        /// Device identifier.
        device_id: DeviceId,
        /// Owning user.
        user_id: uuid::Uuid,
        /// Device platform.
        platform: Platform,
        /// Whether this device holds the primary slot for its platform.
        is_primary: bool,
        /// Registration timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when a device is soft-deactivated.
    DeviceDeactivated {
        /// Device identifier.
        device_id: DeviceId,
        /// Owning user.
        user_id: uuid::Uuid,
        /// Deactivation timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted after a ledger entry commits.
    LedgerAppended {
        /// Ledger entry identifier (commit order).
        entry_id: i64,
        /// Owning user.
        user_id: uuid::Uuid,
        /// Originating device.
        device_id: DeviceId,
        /// Synchronized entity type.
        entity_type: EntityType,
        /// Entity identifier.
        entity_id: uuid::Uuid,
        /// Operation recorded.
        operation: SyncOperation,
        /// Whether a conflict was detected on this write.
        conflict_detected: bool,
        /// Commit timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted after the resolver decides a write.
    ConflictResolved {
        /// Synchronized entity type.
        entity_type: EntityType,
        /// Entity identifier.
        entity_id: uuid::Uuid,
        /// Device that submitted the write.
        device_id: DeviceId,
        /// Whether the write conflicted with the server state.
        conflict: bool,
        /// Decision taken.
        action: ResolutionAction,
        /// Resolution timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when an offline operation is accepted into the queue.
    OperationEnqueued {
        /// Operation identifier.
        operation_id: OperationId,
        /// Submitting device.
        device_id: DeviceId,
        /// Operation type tag.
        operation_type: String,
        /// Drain priority.
        priority: i16,
        /// Enqueue timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when a drained operation completes.
    OperationCompleted {
        /// Operation identifier.
        operation_id: OperationId,
        /// Submitting device.
        device_id: DeviceId,
        /// Whether the payload was applied or completed as a stale no-op.
        applied: bool,
        /// Completion timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when a drained operation fails an attempt.
    OperationFailed {
        /// Operation identifier.
        operation_id: OperationId,
        /// Submitting device.
        device_id: DeviceId,
        /// Attempts so far.
        retry_count: u32,
        /// Whether the retry budget is spent (dead-lettered).
        dead_lettered: bool,
        /// Failure timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when a pending operation is cancelled.
    OperationCancelled {
        /// Operation identifier.
        operation_id: OperationId,
        /// Cancellation timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted once per drain cycle with its tallies.
    QueueDrained {
        /// Operations claimed this cycle.
        claimed: usize,
        /// Operations completed (applied or stale no-op).
        completed: usize,
        /// Operations that failed an attempt.
        failed: usize,
        /// Drain timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when a notification is accepted for fan-out.
    NotificationQueued {
        /// Notification identifier.
        notification_id: NotificationId,
        /// Addressed user.
        user_id: uuid::Uuid,
        /// Producer-defined type tag.
        notification_type: String,
        /// Delivery priority.
        priority: i16,
        /// Enqueue timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted after the delivery worker finishes a notification.
    NotificationDelivered {
        /// Notification identifier.
        notification_id: NotificationId,
        /// Addressed user.
        user_id: uuid::Uuid,
        /// Targets that accepted delivery.
        sent: usize,
        /// Targets that failed.
        failed: usize,
        /// Delivery timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when a notification expires before delivery.
    NotificationExpired {
        /// Notification identifier.
        notification_id: NotificationId,
        /// Addressed user.
        user_id: uuid::Uuid,
        /// Expiry processing timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when a circuit breaker changes position.
    CircuitTransitioned {
        /// Guarded service.
        service: String,
        /// Deployment environment.
        environment: String,
        /// Position before the outcome was recorded.
        from: CircuitState,
        /// Position after.
        to: CircuitState,
        /// Transition timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when a credential is stored or rotated.
    CredentialRotated {
        /// Downstream service.
        service: String,
        /// Deployment environment.
        environment: String,
        /// Whether a previous record was rotated out.
        rotated: bool,
        /// Rotation timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted after a health probe is recorded.
    HealthRecorded {
        /// Downstream service.
        service: String,
        /// Deployment environment.
        environment: String,
        /// Reported status.
        status: HealthStatus,
        /// Probes since the last healthy report.
        consecutive_failures: u32,
        /// Probe timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl SyncEvent {
    /// Returns the event timestamp.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::DeviceRegistered { timestamp, .. }
            | Self::DeviceDeactivated { timestamp, .. }
            | Self::LedgerAppended { timestamp, .. }
            | Self::ConflictResolved { timestamp, .. }
            | Self::OperationEnqueued { timestamp, .. }
            | Self::OperationCompleted { timestamp, .. }
            | Self::OperationFailed { timestamp, .. }
            | Self::OperationCancelled { timestamp, .. }
            | Self::QueueDrained { timestamp, .. }
            | Self::NotificationQueued { timestamp, .. }
            | Self::NotificationDelivered { timestamp, .. }
            | Self::NotificationExpired { timestamp, .. }
            | Self::CircuitTransitioned { timestamp, .. }
            | Self::CredentialRotated { timestamp, .. }
            | Self::HealthRecorded { timestamp, .. } => *timestamp,
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::DeviceRegistered { .. } => "device_registered",
            Self::DeviceDeactivated { .. } => "device_deactivated",
            Self::LedgerAppended { .. } => "ledger_appended",
            Self::ConflictResolved { .. } => "conflict_resolved",
            Self::OperationEnqueued { .. } => "operation_enqueued",
            Self::OperationCompleted { .. } => "operation_completed",
            Self::OperationFailed { .. } => "operation_failed",
            Self::OperationCancelled { .. } => "operation_cancelled",
            Self::QueueDrained { .. } => "queue_drained",
            Self::NotificationQueued { .. } => "notification_queued",
            Self::NotificationDelivered { .. } => "notification_delivered",
            Self::NotificationExpired { .. } => "notification_expired",
            Self::CircuitTransitioned { .. } => "circuit_transitioned",
            Self::CredentialRotated { .. } => "credential_rotated",
            Self::HealthRecorded { .. } => "health_recorded",
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn device_registered_event_type() {
        let event = SyncEvent::DeviceRegistered {
            device_id: DeviceId::new(),
            user_id: uuid::Uuid::new_v4(),
            platform: Platform::Ios,
            is_primary: true,
            timestamp: Utc::now(),
        };
        assert_eq!(event.event_type_str(), "device_registered");
    }

    #[test]
    fn conflict_resolved_serializes() {
        let event = SyncEvent::ConflictResolved {
            entity_type: EntityType::Booking,
            entity_id: uuid::Uuid::new_v4(),
            device_id: DeviceId::new(),
            conflict: true,
            action: ResolutionAction::KeepExisting,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event);
        assert!(json.is_ok());
        let json_str = json.unwrap_or_default();
        assert!(json_str.contains("conflict_resolved"));
        assert!(json_str.contains("keep_existing"));
    }

    #[test]
    fn timestamp_accessor() {
        let ts = Utc::now();
        let event = SyncEvent::OperationCancelled {
            operation_id: OperationId::new(),
            timestamp: ts,
        };
        assert_eq!(event.timestamp(), ts);
    }
}
