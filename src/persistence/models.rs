//! Database models mapping table rows into domain types.
//!
//! Row structs are direct `sqlx::FromRow` images of the SQL schema and
//! stay separate from the domain types so that column names and storage
//! formats (enum strings, UUID arrays, JSONB maps) are parsed in one
//! place. A string that fails to parse here means a corrupted row, so
//! conversions surface [`GatewayError::PersistenceError`] rather than a
//! client-facing validation error.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::domain::{
    CircuitBreaker, CircuitState, CredentialRecord, Device, DeviceId, EntityType, HealthStatus,
    LedgerEntry, Notification, NotificationId, NotificationStatus, OperationId, OperationStatus,
    Platform, QueuedOperation, ResolutionAction, SealedSecret, ServerState, ServiceHealth,
    SyncEntryStatus, SyncOperation,
};
use crate::error::GatewayError;

fn corrupt(table: &str, detail: impl std::fmt::Display) -> GatewayError {
    GatewayError::PersistenceError(format!("corrupt {table} row: {detail}"))
}

/// A row from the `devices` table.
#[derive(Debug, Clone, FromRow)]
pub struct DeviceRow {
    /// Device UUID.
    pub id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// Client-supplied installation identifier.
    pub device_identifier: String,
    /// Platform string (`web`/`ios`/`android`).
    pub platform: String,
    /// Display name.
    pub device_name: Option<String>,
    /// App version at last registration.
    pub app_version: Option<String>,
    /// OS version at last registration.
    pub os_version: Option<String>,
    /// Push-delivery token.
    pub push_token: Option<String>,
    /// Soft-delete flag.
    pub is_active: bool,
    /// Primary-device election flag.
    pub is_primary: bool,
    /// Last heartbeat time.
    pub last_seen_at: DateTime<Utc>,
    /// Client preference blob.
    pub preferences: serde_json::Value,
    /// First registration time.
    pub created_at: DateTime<Utc>,
}

impl DeviceRow {
    /// Converts the row into a domain [`Device`].
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] when the stored
    /// platform string is unknown.
    pub fn into_domain(self) -> Result<Device, GatewayError> {
        let platform =
            Platform::parse(&self.platform).map_err(|_| corrupt("devices", &self.platform))?;
        Ok(Device {
            id: DeviceId::from_uuid(self.id),
            user_id: self.user_id,
            device_identifier: self.device_identifier,
            platform,
            device_name: self.device_name,
            app_version: self.app_version,
            os_version: self.os_version,
            push_token: self.push_token,
            is_active: self.is_active,
            is_primary: self.is_primary,
            last_seen_at: self.last_seen_at,
            preferences: self.preferences,
            created_at: self.created_at,
        })
    }
}

/// A row from the `sync_ledger` table.
#[derive(Debug, Clone, FromRow)]
pub struct LedgerEntryRow {
    /// BIGSERIAL append order.
    pub id: i64,
    /// Owning user.
    pub user_id: Uuid,
    /// Originating device.
    pub device_id: Uuid,
    /// Entity type string.
    pub entity_type: String,
    /// Mutated entity.
    pub entity_id: Uuid,
    /// Operation string.
    pub operation: String,
    /// Entry status string.
    pub status: String,
    /// Value before the mutation.
    pub data_before: Option<serde_json::Value>,
    /// Value after the mutation.
    pub data_after: Option<serde_json::Value>,
    /// Conflict flag.
    pub conflict_detected: bool,
    /// Resolution action string.
    pub resolution: Option<String>,
    /// Append timestamp.
    pub created_at: DateTime<Utc>,
}

impl LedgerEntryRow {
    /// Converts the row into a domain [`LedgerEntry`].
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] when a stored enum
    /// string is unknown.
    pub fn into_domain(self) -> Result<LedgerEntry, GatewayError> {
        let entity_type = EntityType::parse(&self.entity_type)
            .map_err(|_| corrupt("sync_ledger", &self.entity_type))?;
        let operation = SyncOperation::parse(&self.operation)
            .map_err(|_| corrupt("sync_ledger", &self.operation))?;
        let status = SyncEntryStatus::parse(&self.status)
            .map_err(|_| corrupt("sync_ledger", &self.status))?;
        let resolution = self
            .resolution
            .map(|s| ResolutionAction::parse(&s).ok_or_else(|| corrupt("sync_ledger", &s)))
            .transpose()?;
        Ok(LedgerEntry {
            id: self.id,
            user_id: self.user_id,
            device_id: DeviceId::from_uuid(self.device_id),
            entity_type,
            entity_id: self.entity_id,
            operation,
            status,
            data_before: self.data_before,
            data_after: self.data_after,
            conflict_detected: self.conflict_detected,
            resolution,
            created_at: self.created_at,
        })
    }
}

/// A row from the `entity_snapshots` table.
#[derive(Debug, Clone, FromRow)]
pub struct SnapshotRow {
    /// Entity type string.
    pub entity_type: String,
    /// Entity identifier.
    pub entity_id: Uuid,
    /// Latest committed value.
    pub data: serde_json::Value,
    /// Version timestamp of the committed value.
    pub updated_at: DateTime<Utc>,
}

impl SnapshotRow {
    /// Converts the row into the resolver's [`ServerState`] view.
    #[must_use]
    pub fn into_server_state(self) -> ServerState {
        ServerState {
            updated_at: self.updated_at,
            data: self.data,
        }
    }
}

/// Snapshot value committed alongside a ledger append.
#[derive(Debug, Clone)]
pub struct SnapshotUpsert {
    /// The committed entity value.
    pub data: serde_json::Value,
    /// Version timestamp; the upsert only applies when strictly newer
    /// than the stored snapshot.
    pub updated_at: DateTime<Utc>,
}

/// A row from the `offline_operations` table.
#[derive(Debug, Clone, FromRow)]
pub struct OperationRow {
    /// Operation UUID.
    pub id: Uuid,
    /// Submitting device.
    pub device_id: Uuid,
    /// Operation type tag.
    pub operation_type: String,
    /// Raw payload.
    pub payload: serde_json::Value,
    /// Drain priority.
    pub priority: i16,
    /// Failed attempts so far.
    pub retry_count: i32,
    /// Retry budget.
    pub max_retries: i32,
    /// Status string.
    pub status: String,
    /// Client dedup token.
    pub idempotency_key: String,
    /// Last failure message.
    pub error: Option<String>,
    /// Next retry due time.
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Claim time of the current `processing` attempt.
    pub claimed_at: Option<DateTime<Utc>>,
    /// Enqueue timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl OperationRow {
    /// Converts the row into a domain [`QueuedOperation`].
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] when the stored status
    /// string is unknown.
    pub fn into_domain(self) -> Result<QueuedOperation, GatewayError> {
        let status = OperationStatus::parse(&self.status)
            .map_err(|_| corrupt("offline_operations", &self.status))?;
        Ok(QueuedOperation {
            id: OperationId::from_uuid(self.id),
            device_id: DeviceId::from_uuid(self.device_id),
            operation_type: self.operation_type,
            payload: self.payload,
            priority: self.priority,
            retry_count: u32::try_from(self.retry_count).unwrap_or(0),
            max_retries: u32::try_from(self.max_retries).unwrap_or(0),
            status,
            idempotency_key: self.idempotency_key,
            error: self.error,
            next_retry_at: self.next_retry_at,
            claimed_at: self.claimed_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// A row from the `notifications` table.
#[derive(Debug, Clone, FromRow)]
pub struct NotificationRow {
    /// Notification UUID.
    pub id: Uuid,
    /// Addressed user.
    pub user_id: Uuid,
    /// Title.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Producer type tag.
    pub notification_type: String,
    /// Delivery priority.
    pub priority: i16,
    /// Opaque payload.
    pub data: serde_json::Value,
    /// Explicit target devices.
    pub target_devices: Vec<Uuid>,
    /// Excluded devices.
    pub exclude_devices: Vec<Uuid>,
    /// Status string.
    pub status: String,
    /// Per-device outcome map as JSONB.
    pub delivery_status: serde_json::Value,
    /// Earliest delivery time.
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Drop-dead time.
    pub expires_at: Option<DateTime<Utc>>,
    /// When delivery finished resolving.
    pub sent_at: Option<DateTime<Utc>>,
    /// Enqueue timestamp.
    pub created_at: DateTime<Utc>,
}

impl NotificationRow {
    /// Converts the row into a domain [`Notification`].
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] when the stored status
    /// string or delivery map is malformed.
    pub fn into_domain(self) -> Result<Notification, GatewayError> {
        let status = NotificationStatus::parse(&self.status)
            .map_err(|_| corrupt("notifications", &self.status))?;
        let delivery_status = serde_json::from_value(self.delivery_status)
            .map_err(|e| corrupt("notifications", format!("delivery_status: {e}")))?;
        Ok(Notification {
            id: NotificationId::from_uuid(self.id),
            user_id: self.user_id,
            title: self.title,
            message: self.message,
            notification_type: self.notification_type,
            priority: self.priority,
            data: self.data,
            target_devices: self
                .target_devices
                .into_iter()
                .map(DeviceId::from_uuid)
                .collect(),
            exclude_devices: self
                .exclude_devices
                .into_iter()
                .map(DeviceId::from_uuid)
                .collect(),
            status,
            delivery_status,
            scheduled_at: self.scheduled_at,
            expires_at: self.expires_at,
            sent_at: self.sent_at,
            created_at: self.created_at,
        })
    }
}

/// A row from the `credential_records` table.
#[derive(Debug, Clone, FromRow)]
pub struct CredentialRow {
    /// Row UUID.
    pub id: Uuid,
    /// Downstream service.
    pub service_name: String,
    /// Deployment environment.
    pub environment: String,
    /// Base64 AEAD ciphertext of the API key.
    pub encrypted_key: String,
    /// Base64 nonce for the key field.
    pub key_nonce: String,
    /// Base64 AEAD ciphertext of the API secret.
    pub encrypted_secret: Option<String>,
    /// Base64 nonce for the secret field.
    pub secret_nonce: Option<String>,
    /// Active-record flag.
    pub is_active: bool,
    /// Expiry.
    pub expires_at: Option<DateTime<Utc>>,
    /// When this record superseded a previous one.
    pub last_rotated_at: Option<DateTime<Utc>>,
    /// Insertion timestamp.
    pub created_at: DateTime<Utc>,
}

impl CredentialRow {
    /// Converts the row into a domain [`CredentialRecord`].
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] when a secret
    /// ciphertext is stored without its nonce (or vice versa).
    pub fn into_domain(self) -> Result<CredentialRecord, GatewayError> {
        let sealed_secret = match (self.encrypted_secret, self.secret_nonce) {
            (Some(ciphertext), Some(nonce)) => Some(SealedSecret { ciphertext, nonce }),
            (None, None) => None,
            _ => {
                return Err(corrupt(
                    "credential_records",
                    "secret ciphertext and nonce must be stored together",
                ));
            }
        };
        Ok(CredentialRecord {
            id: self.id,
            service_name: self.service_name,
            environment: self.environment,
            sealed_key: SealedSecret {
                ciphertext: self.encrypted_key,
                nonce: self.key_nonce,
            },
            sealed_secret,
            is_active: self.is_active,
            expires_at: self.expires_at,
            last_rotated_at: self.last_rotated_at,
            created_at: self.created_at,
        })
    }
}

/// A row from the `circuit_breakers` table.
#[derive(Debug, Clone, FromRow)]
pub struct CircuitBreakerRow {
    /// Guarded service.
    pub service_name: String,
    /// Deployment environment.
    pub environment: String,
    /// State string.
    pub state: String,
    /// Consecutive failures in `closed`.
    pub failure_count: i32,
    /// Consecutive probe successes in `half_open`.
    pub success_count: i32,
    /// Failures that trip the breaker.
    pub failure_threshold: i32,
    /// Probe successes that close it.
    pub success_threshold: i32,
    /// Seconds the breaker stays open.
    pub open_timeout_secs: i64,
    /// Most recent failure.
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Probe window start while open.
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Last state-machine update.
    pub updated_at: DateTime<Utc>,
}

impl CircuitBreakerRow {
    /// Converts the row into a domain [`CircuitBreaker`].
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] when the stored state
    /// string is unknown.
    pub fn into_domain(self) -> Result<CircuitBreaker, GatewayError> {
        let state = CircuitState::parse(&self.state)
            .map_err(|_| corrupt("circuit_breakers", &self.state))?;
        Ok(CircuitBreaker {
            service_name: self.service_name,
            environment: self.environment,
            state,
            failure_count: u32::try_from(self.failure_count).unwrap_or(0),
            success_count: u32::try_from(self.success_count).unwrap_or(0),
            failure_threshold: u32::try_from(self.failure_threshold).unwrap_or(0),
            success_threshold: u32::try_from(self.success_threshold).unwrap_or(0),
            open_timeout_secs: self.open_timeout_secs,
            last_failure_at: self.last_failure_at,
            next_retry_at: self.next_retry_at,
            updated_at: self.updated_at,
        })
    }
}

/// A row from the `service_health` table.
#[derive(Debug, Clone, FromRow)]
pub struct ServiceHealthRow {
    /// Downstream service.
    pub service_name: String,
    /// Deployment environment.
    pub environment: String,
    /// Status string.
    pub status: String,
    /// Latest probe time.
    pub last_check_at: DateTime<Utc>,
    /// Probe round-trip in milliseconds.
    pub response_time_ms: Option<f64>,
    /// Observed error rate.
    pub error_rate: Option<f64>,
    /// Probes since the last healthy report.
    pub consecutive_failures: i32,
    /// Message from the most recent failing probe.
    pub last_error: Option<String>,
}

impl ServiceHealthRow {
    /// Converts the row into a domain [`ServiceHealth`].
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] when the stored status
    /// string is unknown.
    pub fn into_domain(self) -> Result<ServiceHealth, GatewayError> {
        let status = HealthStatus::parse(&self.status)
            .map_err(|_| corrupt("service_health", &self.status))?;
        Ok(ServiceHealth {
            service_name: self.service_name,
            environment: self.environment,
            status,
            last_check_at: self.last_check_at,
            response_time_ms: self.response_time_ms,
            error_rate: self.error_rate,
            consecutive_failures: u32::try_from(self.consecutive_failures).unwrap_or(0),
            last_error: self.last_error,
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn unknown_enum_string_surfaces_as_persistence_error() {
        let row = CircuitBreakerRow {
            service_name: "booking-api".to_string(),
            environment: "production".to_string(),
            state: "ajar".to_string(),
            failure_count: 0,
            success_count: 0,
            failure_threshold: 5,
            success_threshold: 1,
            open_timeout_secs: 60,
            last_failure_at: None,
            next_retry_at: None,
            updated_at: Utc::now(),
        };
        assert!(matches!(
            row.into_domain(),
            Err(GatewayError::PersistenceError(_))
        ));
    }

    #[test]
    fn credential_secret_fields_must_travel_together() {
        let row = CredentialRow {
            id: Uuid::new_v4(),
            service_name: "sms-provider".to_string(),
            environment: "staging".to_string(),
            encrypted_key: "a".to_string(),
            key_nonce: "b".to_string(),
            encrypted_secret: Some("c".to_string()),
            secret_nonce: None,
            is_active: true,
            expires_at: None,
            last_rotated_at: None,
            created_at: Utc::now(),
        };
        assert!(matches!(
            row.into_domain(),
            Err(GatewayError::PersistenceError(_))
        ));
    }

    #[test]
    fn device_row_maps_into_domain() {
        let row = DeviceRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            device_identifier: "install-1".to_string(),
            platform: "ios".to_string(),
            device_name: Some("Maria's iPhone".to_string()),
            app_version: None,
            os_version: None,
            push_token: None,
            is_active: true,
            is_primary: true,
            last_seen_at: Utc::now(),
            preferences: serde_json::json!({}),
            created_at: Utc::now(),
        };
        let Ok(device) = row.into_domain() else {
            panic!("conversion failed");
        };
        assert_eq!(device.platform, Platform::Ios);
        assert!(device.is_primary);
    }
}
