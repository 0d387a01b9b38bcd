//! Resilience DTOs: credentials, circuit breakers, service health.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{
    ActiveCredential, CircuitBreaker, CircuitState, CredentialRecord, HealthProbe, HealthStatus,
    ServiceHealth,
};

/// Request body for `POST /resilience/credentials`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct StoreCredentialRequest {
    /// Downstream service the credential authenticates against.
    pub service_name: String,
    /// Deployment environment.
    pub environment: String,
    /// Plain API key; sealed before it reaches storage.
    pub api_key: String,
    /// Plain API secret, when the service uses one.
    #[serde(default)]
    pub api_secret: Option<String>,
    /// Expiry; an active record past this fails closed.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Response body for `POST /resilience/credentials`.
///
/// Echoes record metadata only; sealed material never leaves storage
/// through this endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct CredentialStoredResponse {
    /// Row identifier of the new active record.
    pub id: uuid::Uuid,
    /// Downstream service name.
    pub service_name: String,
    /// Deployment environment.
    pub environment: String,
    /// Whether an existing credential was rotated out.
    pub rotated: bool,
    /// Expiry of the new record.
    pub expires_at: Option<DateTime<Utc>>,
    /// Rotation timestamp, set when `rotated` is true.
    pub last_rotated_at: Option<DateTime<Utc>>,
    /// Insertion timestamp.
    pub created_at: DateTime<Utc>,
}

impl CredentialStoredResponse {
    /// Builds the response from the stored record and rotation flag.
    #[must_use]
    pub fn from_record(record: CredentialRecord, rotated: bool) -> Self {
        Self {
            id: record.id,
            service_name: record.service_name,
            environment: record.environment,
            rotated,
            expires_at: record.expires_at,
            last_rotated_at: record.last_rotated_at,
            created_at: record.created_at,
        }
    }
}

/// Decrypted credential as returned by
/// `GET /resilience/credentials/{service}/{environment}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActiveCredentialDto {
    /// Downstream service name.
    pub service_name: String,
    /// Deployment environment.
    pub environment: String,
    /// Decrypted API key.
    pub api_key: String,
    /// Decrypted API secret, when present.
    pub api_secret: Option<String>,
    /// Expiry of the active record.
    pub expires_at: Option<DateTime<Utc>>,
    /// When the record was last rotated in.
    pub last_rotated_at: Option<DateTime<Utc>>,
}

impl From<ActiveCredential> for ActiveCredentialDto {
    fn from(credential: ActiveCredential) -> Self {
        Self {
            service_name: credential.service_name,
            environment: credential.environment,
            api_key: credential.api_key,
            api_secret: credential.api_secret,
            expires_at: credential.expires_at,
            last_rotated_at: credential.last_rotated_at,
        }
    }
}

/// Request body for `POST /resilience/outcome`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RecordOutcomeRequest {
    /// Downstream service that was called.
    pub service_name: String,
    /// Deployment environment.
    pub environment: String,
    /// Whether the call succeeded.
    pub success: bool,
}

/// Response body for `POST /resilience/outcome`.
#[derive(Debug, Serialize, ToSchema)]
pub struct OutcomeResponse {
    /// Downstream service name.
    pub service_name: String,
    /// Deployment environment.
    pub environment: String,
    /// Breaker position after recording the outcome.
    pub state: CircuitState,
}

/// Circuit breaker state as returned by
/// `GET /resilience/circuits/{service}/{environment}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct CircuitDto {
    /// Guarded downstream service.
    pub service_name: String,
    /// Deployment environment.
    pub environment: String,
    /// Current position.
    pub state: CircuitState,
    /// Consecutive failures observed in `closed`.
    pub failure_count: u32,
    /// Consecutive probe successes observed in `half_open`.
    pub success_count: u32,
    /// Failures that trip this breaker.
    pub failure_threshold: u32,
    /// Probe successes that close this breaker.
    pub success_threshold: u32,
    /// Seconds the breaker stays open before allowing a probe.
    pub open_timeout_secs: i64,
    /// Most recent recorded failure.
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Earliest time an `open` breaker allows a probe.
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Last state-machine update.
    pub updated_at: DateTime<Utc>,
}

impl From<CircuitBreaker> for CircuitDto {
    fn from(breaker: CircuitBreaker) -> Self {
        Self {
            service_name: breaker.service_name,
            environment: breaker.environment,
            state: breaker.state,
            failure_count: breaker.failure_count,
            success_count: breaker.success_count,
            failure_threshold: breaker.failure_threshold,
            success_threshold: breaker.success_threshold,
            open_timeout_secs: breaker.open_timeout_secs,
            last_failure_at: breaker.last_failure_at,
            next_retry_at: breaker.next_retry_at,
            updated_at: breaker.updated_at,
        }
    }
}

/// Request body for `POST /resilience/health`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RecordHealthRequest {
    /// Downstream service the probe observed.
    pub service_name: String,
    /// Deployment environment.
    pub environment: String,
    /// Reported status.
    pub status: HealthStatus,
    /// Probe round-trip time in milliseconds, when measured.
    #[serde(default)]
    pub response_time_ms: Option<f64>,
    /// Observed error rate in [0, 1], when measured.
    #[serde(default)]
    pub error_rate: Option<f64>,
    /// Failure message, ignored for `healthy` reports.
    #[serde(default)]
    pub last_error: Option<String>,
}

impl From<RecordHealthRequest> for HealthProbe {
    fn from(req: RecordHealthRequest) -> Self {
        Self {
            service_name: req.service_name,
            environment: req.environment,
            status: req.status,
            response_time_ms: req.response_time_ms,
            error_rate: req.error_rate,
            last_error: req.last_error,
        }
    }
}

/// Health record as returned by
/// `GET /resilience/health/{service}/{environment}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthDto {
    /// Downstream service name.
    pub service_name: String,
    /// Deployment environment.
    pub environment: String,
    /// Latest reported status.
    pub status: HealthStatus,
    /// When the latest probe ran.
    pub last_check_at: DateTime<Utc>,
    /// Probe round-trip time in milliseconds, when measured.
    pub response_time_ms: Option<f64>,
    /// Observed error rate in [0, 1], when measured.
    pub error_rate: Option<f64>,
    /// Probes since the last `healthy` report.
    pub consecutive_failures: u32,
    /// Message from the most recent failing probe.
    pub last_error: Option<String>,
}

impl From<ServiceHealth> for HealthDto {
    fn from(health: ServiceHealth) -> Self {
        Self {
            service_name: health.service_name,
            environment: health.environment,
            status: health.status,
            last_check_at: health.last_check_at,
            response_time_ms: health.response_time_ms,
            error_rate: health.error_rate,
            consecutive_failures: health.consecutive_failures,
            last_error: health.last_error,
        }
    }
}
