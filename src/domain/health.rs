//! Downstream service health records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::GatewayError;

/// Reported health of a downstream service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Responding normally.
    Healthy,
    /// Responding but impaired (slow, elevated errors).
    Degraded,
    /// Failing probes.
    Unhealthy,
    /// No probe recorded yet.
    Unknown,
}

impl HealthStatus {
    /// Returns the status as its stored string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
            Self::Unknown => "unknown",
        }
    }

    /// Parses a status from its stored string form.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] for unknown strings.
    pub fn parse(s: &str) -> Result<Self, GatewayError> {
        match s {
            "healthy" => Ok(Self::Healthy),
            "degraded" => Ok(Self::Degraded),
            "unhealthy" => Ok(Self::Unhealthy),
            "unknown" => Ok(Self::Unknown),
            other => Err(GatewayError::InvalidRequest(format!(
                "unknown health status: {other}"
            ))),
        }
    }

    /// Whether this status resets the consecutive-failure streak.
    ///
    /// Only `healthy` resets; `degraded` still counts as a failure for
    /// streak purposes.
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One probe report, as submitted by a health checker.
///
/// The consecutive-failure streak is not part of the report; the
/// persistence upsert derives it from the stored row and
/// [`HealthStatus::is_healthy`].
#[derive(Debug, Clone)]
pub struct HealthProbe {
    /// Downstream service name.
    pub service_name: String,
    /// Deployment environment.
    pub environment: String,
    /// Reported status.
    pub status: HealthStatus,
    /// Probe round-trip time in milliseconds, when measured.
    pub response_time_ms: Option<f64>,
    /// Observed error rate in [0, 1], when measured.
    pub error_rate: Option<f64>,
    /// Failure message, ignored for `healthy` reports.
    pub last_error: Option<String>,
}

/// One health row per (service, environment), upserted on every probe.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
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

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_round_trip() {
        for status in [
            HealthStatus::Healthy,
            HealthStatus::Degraded,
            HealthStatus::Unhealthy,
            HealthStatus::Unknown,
        ] {
            let Ok(parsed) = HealthStatus::parse(status.as_str()) else {
                panic!("round trip failed for {status}");
            };
            assert_eq!(parsed, status);
        }
        assert!(HealthStatus::parse("flaky").is_err());
    }

    #[test]
    fn only_healthy_resets_the_streak() {
        assert!(HealthStatus::Healthy.is_healthy());
        assert!(!HealthStatus::Degraded.is_healthy());
        assert!(!HealthStatus::Unhealthy.is_healthy());
        assert!(!HealthStatus::Unknown.is_healthy());
    }
}
