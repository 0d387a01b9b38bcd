//! Gateway error types with HTTP status code mapping.
//!
//! [`GatewayError`] is the central error type for the gateway. Each variant
//! maps to a specific HTTP status code and structured JSON error response.
//!
//! Two failure classes never appear here because they are not HTTP errors:
//! transient downstream failures during queue drain are recorded on the
//! queued operation and retried with backoff, and a detected sync conflict
//! is a normal resolver outcome returned in the response body. Retries that
//! exhaust the budget surface through the dead-letter view, not as a 5xx.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 1001,
///     "message": "invalid request: title must not be empty",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see code ranges on [`GatewayError`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category          | HTTP Status                 |
/// |-----------|-------------------|-----------------------------|
/// | 1000–1999 | Validation        | 400 Bad Request             |
/// | 2000–2999 | State / Not Found | 404 Not Found / 409 Conflict |
/// | 3000–3999 | Server            | 500 Internal Server Error   |
/// | 4000–4999 | Fail-Fast Guards  | 410 Gone / 503 Unavailable  |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Unsupported platform string (expected `web`, `ios`, or `android`).
    #[error("invalid platform: {0}")]
    InvalidPlatform(String),

    /// Unsupported offline operation type string.
    #[error("invalid operation type: {0}")]
    InvalidOperationType(String),

    /// Unsupported synchronizable entity type string.
    #[error("invalid entity type: {0}")]
    InvalidEntityType(String),

    /// Device with the given ID was not found.
    #[error("device not found: {0}")]
    DeviceNotFound(uuid::Uuid),

    /// Queued operation with the given ID was not found.
    #[error("operation not found: {0}")]
    OperationNotFound(uuid::Uuid),

    /// Notification with the given ID was not found.
    #[error("notification not found: {0}")]
    NotificationNotFound(uuid::Uuid),

    /// No active credential stored for the (service, environment) pair.
    #[error("no active credential for {service}/{environment}")]
    CredentialNotFound {
        /// Downstream service name.
        service: String,
        /// Deployment environment.
        environment: String,
    },

    /// No circuit breaker row for the (service, environment) pair.
    #[error("no circuit breaker state for {service}/{environment}")]
    CircuitNotFound {
        /// Downstream service name.
        service: String,
        /// Deployment environment.
        environment: String,
    },

    /// No health record for the (service, environment) pair.
    #[error("no health record for {service}/{environment}")]
    HealthNotFound {
        /// Downstream service name.
        service: String,
        /// Deployment environment.
        environment: String,
    },

    /// Cancellation requested for an operation that is no longer pending.
    #[error("operation {operation_id} cannot be cancelled in status {status}")]
    CancelRejected {
        /// Operation the caller tried to cancel.
        operation_id: uuid::Uuid,
        /// Current status of the operation.
        status: String,
    },

    /// The active credential is past its expiry; caller must rotate first.
    #[error("credential for {service}/{environment} expired at {expired_at}")]
    CredentialExpired {
        /// Downstream service name.
        service: String,
        /// Deployment environment.
        environment: String,
        /// Expiry timestamp of the active record.
        expired_at: chrono::DateTime<chrono::Utc>,
    },

    /// Circuit breaker is open; the call was rejected without a network
    /// attempt.
    #[error("circuit open for {service}; retry after {retry_after_secs} s")]
    CircuitOpen {
        /// Downstream service name.
        service: String,
        /// Seconds until the breaker admits a probe.
        retry_after_secs: i64,
    },

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    PersistenceError(String),

    /// Credential vault encryption/decryption failure.
    #[error("crypto error: {0}")]
    CryptoError(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::InvalidPlatform(_) => 1002,
            Self::InvalidOperationType(_) => 1003,
            Self::InvalidEntityType(_) => 1004,
            Self::DeviceNotFound(_) => 2001,
            Self::OperationNotFound(_) => 2002,
            Self::NotificationNotFound(_) => 2003,
            Self::CredentialNotFound { .. } => 2004,
            Self::CircuitNotFound { .. } => 2005,
            Self::HealthNotFound { .. } => 2006,
            Self::CancelRejected { .. } => 2101,
            Self::CredentialExpired { .. } => 4101,
            Self::CircuitOpen { .. } => 4201,
            Self::PersistenceError(_) => 3001,
            Self::CryptoError(_) => 3002,
            Self::Internal(_) => 3000,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_)
            | Self::InvalidPlatform(_)
            | Self::InvalidOperationType(_)
            | Self::InvalidEntityType(_) => StatusCode::BAD_REQUEST,
            Self::DeviceNotFound(_)
            | Self::OperationNotFound(_)
            | Self::NotificationNotFound(_)
            | Self::CredentialNotFound { .. }
            | Self::CircuitNotFound { .. }
            | Self::HealthNotFound { .. } => StatusCode::NOT_FOUND,
            Self::CancelRejected { .. } => StatusCode::CONFLICT,
            Self::CredentialExpired { .. } => StatusCode::GONE,
            Self::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::PersistenceError(_) | Self::CryptoError(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_map_to_400() {
        let errors = [
            GatewayError::InvalidRequest("x".to_string()),
            GatewayError::InvalidPlatform("desktop".to_string()),
            GatewayError::InvalidOperationType("reboot".to_string()),
            GatewayError::InvalidEntityType("invoice".to_string()),
        ];
        for e in errors {
            assert_eq!(e.status_code(), StatusCode::BAD_REQUEST);
            assert!(e.error_code() >= 1000 && e.error_code() < 2000);
        }
    }

    #[test]
    fn not_found_errors_map_to_404() {
        let id = uuid::Uuid::new_v4();
        let errors = [
            GatewayError::DeviceNotFound(id),
            GatewayError::OperationNotFound(id),
            GatewayError::NotificationNotFound(id),
        ];
        for e in errors {
            assert_eq!(e.status_code(), StatusCode::NOT_FOUND);
        }
    }

    #[test]
    fn cancel_rejected_maps_to_409() {
        let e = GatewayError::CancelRejected {
            operation_id: uuid::Uuid::new_v4(),
            status: "processing".to_string(),
        };
        assert_eq!(e.status_code(), StatusCode::CONFLICT);
        assert_eq!(e.error_code(), 2101);
    }

    #[test]
    fn fail_fast_guards_do_not_use_500() {
        let expired = GatewayError::CredentialExpired {
            service: "sms-provider".to_string(),
            environment: "production".to_string(),
            expired_at: chrono::Utc::now(),
        };
        assert_eq!(expired.status_code(), StatusCode::GONE);

        let open = GatewayError::CircuitOpen {
            service: "booking-api".to_string(),
            retry_after_secs: 42,
        };
        assert_eq!(open.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        let msg = open.to_string();
        assert!(msg.contains("42"));
    }

    #[test]
    fn error_codes_are_unique() {
        let id = uuid::Uuid::new_v4();
        let all = [
            GatewayError::InvalidRequest(String::new()),
            GatewayError::InvalidPlatform(String::new()),
            GatewayError::InvalidOperationType(String::new()),
            GatewayError::InvalidEntityType(String::new()),
            GatewayError::DeviceNotFound(id),
            GatewayError::OperationNotFound(id),
            GatewayError::NotificationNotFound(id),
            GatewayError::CredentialNotFound {
                service: String::new(),
                environment: String::new(),
            },
            GatewayError::CircuitNotFound {
                service: String::new(),
                environment: String::new(),
            },
            GatewayError::HealthNotFound {
                service: String::new(),
                environment: String::new(),
            },
            GatewayError::CancelRejected {
                operation_id: id,
                status: String::new(),
            },
            GatewayError::CredentialExpired {
                service: String::new(),
                environment: String::new(),
                expired_at: chrono::Utc::now(),
            },
            GatewayError::CircuitOpen {
                service: String::new(),
                retry_after_secs: 0,
            },
            GatewayError::PersistenceError(String::new()),
            GatewayError::CryptoError(String::new()),
            GatewayError::Internal(String::new()),
        ];
        let mut codes: Vec<u32> = all.iter().map(GatewayError::error_code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }
}
