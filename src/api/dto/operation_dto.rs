//! Offline operation queue DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{DeviceId, OperationId, OperationStatus, QueuedOperation};
use crate::service::DrainReport;

/// Request body for `POST /operations`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct EnqueueOperationRequest {
    /// Device that performed the operation while offline.
    pub device_id: uuid::Uuid,
    /// Operation type tag (`create_booking`, `update_profile`,
    /// `cancel_booking`, `update_preferences`).
    pub operation_type: String,
    /// Operation payload; must carry `entity_id` and `updated_at`.
    pub payload: serde_json::Value,
    /// Drain priority 0–10; higher drains first. Defaults to 0.
    #[serde(default)]
    pub priority: i64,
    /// Client-generated dedup token, unique per device.
    pub idempotency_key: String,
}

/// Queued operation as returned by queue endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct OperationDto {
    /// Operation identifier.
    pub id: OperationId,
    /// Submitting device.
    pub device_id: DeviceId,
    /// Operation type tag.
    pub operation_type: String,
    /// Raw payload as submitted.
    pub payload: serde_json::Value,
    /// Drain priority.
    pub priority: i16,
    /// Failed attempts so far.
    pub retry_count: u32,
    /// Retry budget.
    pub max_retries: u32,
    /// Lifecycle status.
    pub status: OperationStatus,
    /// Client-generated dedup token.
    pub idempotency_key: String,
    /// Message from the most recent failed attempt.
    pub error: Option<String>,
    /// Earliest time the next attempt may run.
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Enqueue timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl From<QueuedOperation> for OperationDto {
    fn from(op: QueuedOperation) -> Self {
        Self {
            id: op.id,
            device_id: op.device_id,
            operation_type: op.operation_type,
            payload: op.payload,
            priority: op.priority,
            retry_count: op.retry_count,
            max_retries: op.max_retries,
            status: op.status,
            idempotency_key: op.idempotency_key,
            error: op.error,
            next_retry_at: op.next_retry_at,
            created_at: op.created_at,
            updated_at: op.updated_at,
        }
    }
}

/// Response body for `POST /operations`.
#[derive(Debug, Serialize, ToSchema)]
pub struct EnqueueOperationResponse {
    /// The queued (or previously queued) operation.
    pub operation: OperationDto,
    /// Whether this request hit an existing idempotency key.
    pub duplicate: bool,
}

/// Query parameters for `GET /operations/dead-letter`.
#[derive(Debug, Deserialize, IntoParams)]
pub struct DeadLetterParams {
    /// Most operations to return (max 500). Defaults to 50.
    #[serde(default = "default_dead_letter_limit")]
    pub limit: i64,
}

fn default_dead_letter_limit() -> i64 {
    50
}

/// Response body for `GET /operations/dead-letter`.
#[derive(Debug, Serialize, ToSchema)]
pub struct DeadLetterResponse {
    /// Exhausted operations, most recently failed first.
    pub data: Vec<OperationDto>,
    /// Number of operations returned.
    pub total: usize,
}

/// Response body for `POST /operations/drain`.
#[derive(Debug, Serialize, ToSchema)]
pub struct DrainResponse {
    /// Abandoned `processing` claims returned to `pending`.
    pub released: u64,
    /// `failed` rows whose backoff came due, returned to `pending`.
    pub requeued: u64,
    /// Operations claimed by this cycle.
    pub claimed: usize,
    /// Claimed operations that completed.
    pub completed: usize,
    /// Claimed operations that failed this attempt.
    pub failed: usize,
}

impl From<DrainReport> for DrainResponse {
    fn from(report: DrainReport) -> Self {
        Self {
            released: report.released,
            requeued: report.requeued,
            claimed: report.claimed,
            completed: report.completed,
            failed: report.failed,
        }
    }
}
