//! Circuit breaker state machine for downstream service calls.
//!
//! The machine itself is pure: transitions take an explicit `now` and
//! mutate in memory only. Persistence loads a [`CircuitBreaker`] row
//! under a row lock, drives it through [`CircuitBreaker::try_admit`] /
//! [`CircuitBreaker::record_success`] / [`CircuitBreaker::record_failure`],
//! and writes the result back in the same transaction. Thresholds live
//! on the row, seeded from [`BreakerPolicy`] when the row is created.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::GatewayError;

/// Breaker position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow normally; failures are counted.
    Closed,
    /// Calls are rejected until the retry deadline passes.
    Open,
    /// A limited probe is allowed through to test recovery.
    HalfOpen,
}

impl CircuitState {
    /// Returns the state as its stored string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }

    /// Parses a state from its stored string form.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] for unknown strings.
    pub fn parse(s: &str) -> Result<Self, GatewayError> {
        match s {
            "closed" => Ok(Self::Closed),
            "open" => Ok(Self::Open),
            "half_open" => Ok(Self::HalfOpen),
            other => Err(GatewayError::InvalidRequest(format!(
                "unknown circuit state: {other}"
            ))),
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thresholds and timing applied to newly created breaker rows.
///
/// Existing rows keep the thresholds they were created with; a config
/// change affects services first seen after the change.
#[derive(Debug, Clone, Copy)]
pub struct BreakerPolicy {
    /// Consecutive failures in `closed` that trip the breaker.
    pub failure_threshold: u32,
    /// Consecutive probe successes in `half_open` that close it again.
    pub success_threshold: u32,
    /// Seconds an opened breaker rejects before allowing a probe.
    pub open_timeout_secs: i64,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 1,
            open_timeout_secs: 60,
        }
    }
}

/// Outcome of asking the breaker whether a call may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The call may proceed.
    Allowed,
    /// The breaker is open; retry after the given number of seconds.
    Rejected {
        /// Seconds until the next probe window opens.
        retry_after_secs: i64,
    },
}

/// Per-(service, environment) breaker state.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreaker {
    /// Downstream service this breaker guards.
    pub service_name: String,
    /// Deployment environment of the downstream service.
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

impl CircuitBreaker {
    /// Creates a closed breaker for `(service_name, environment)`.
    #[must_use]
    pub fn new(
        service_name: impl Into<String>,
        environment: impl Into<String>,
        policy: &BreakerPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            environment: environment.into(),
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            failure_threshold: policy.failure_threshold,
            success_threshold: policy.success_threshold,
            open_timeout_secs: policy.open_timeout_secs,
            last_failure_at: None,
            next_retry_at: None,
            updated_at: now,
        }
    }

    /// Decides whether a call to the guarded service may proceed.
    ///
    /// An open breaker whose retry deadline has passed moves to
    /// `half_open` and admits the call as a probe.
    pub fn try_admit(&mut self, now: DateTime<Utc>) -> Admission {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => Admission::Allowed,
            CircuitState::Open => {
                let retry_at = self.next_retry_at.unwrap_or(now);
                if now >= retry_at {
                    self.state = CircuitState::HalfOpen;
                    self.success_count = 0;
                    self.updated_at = now;
                    Admission::Allowed
                } else {
                    Admission::Rejected {
                        retry_after_secs: (retry_at - now).num_seconds().max(0),
                    }
                }
            }
        }
    }

    /// Records a successful call.
    pub fn record_success(&mut self, now: DateTime<Utc>) {
        match self.state {
            CircuitState::Closed => {
                if self.failure_count != 0 {
                    self.failure_count = 0;
                    self.updated_at = now;
                }
            }
            CircuitState::HalfOpen => {
                self.success_count = self.success_count.saturating_add(1);
                self.updated_at = now;
                if self.success_count >= self.success_threshold {
                    self.state = CircuitState::Closed;
                    self.failure_count = 0;
                    self.success_count = 0;
                    self.next_retry_at = None;
                }
            }
            // A success reported after the breaker re-opened belongs to a
            // stale in-flight call; ignore it.
            CircuitState::Open => {}
        }
    }

    /// Records a failed call.
    pub fn record_failure(&mut self, now: DateTime<Utc>) {
        self.last_failure_at = Some(now);
        self.updated_at = now;
        match self.state {
            CircuitState::Closed => {
                self.failure_count = self.failure_count.saturating_add(1);
                if self.failure_count >= self.failure_threshold {
                    self.trip(now);
                }
            }
            CircuitState::HalfOpen => self.trip(now),
            // Stale in-flight failure; the retry deadline stays put so
            // the probe window is not pushed out indefinitely.
            CircuitState::Open => {}
        }
    }

    fn trip(&mut self, now: DateTime<Utc>) {
        self.state = CircuitState::Open;
        self.success_count = 0;
        self.next_retry_at = Some(now + Duration::seconds(self.open_timeout_secs));
    }

    /// Seconds until an open breaker allows a probe, zero otherwise.
    #[must_use]
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> i64 {
        match (self.state, self.next_retry_at) {
            (CircuitState::Open, Some(retry_at)) if retry_at > now => {
                (retry_at - now).num_seconds().max(0)
            }
            _ => 0,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        let policy = BreakerPolicy {
            failure_threshold: 3,
            success_threshold: 2,
            open_timeout_secs: 60,
        };
        CircuitBreaker::new("booking-api", "production", &policy, Utc::now())
    }

    #[test]
    fn closed_admits_calls() {
        let mut b = breaker();
        let now = b.updated_at;
        assert_eq!(b.try_admit(now), Admission::Allowed);
        assert_eq!(b.state, CircuitState::Closed);
    }

    #[test]
    fn trips_open_at_failure_threshold() {
        let mut b = breaker();
        let now = b.updated_at;
        b.record_failure(now);
        b.record_failure(now);
        assert_eq!(b.state, CircuitState::Closed);
        b.record_failure(now);
        assert_eq!(b.state, CircuitState::Open);
        assert_eq!(b.next_retry_at, Some(now + Duration::seconds(60)));
    }

    #[test]
    fn open_rejects_until_deadline() {
        let mut b = breaker();
        let now = b.updated_at;
        for _ in 0..3 {
            b.record_failure(now);
        }
        let Admission::Rejected { retry_after_secs } = b.try_admit(now + Duration::seconds(10))
        else {
            panic!("expected rejection while open");
        };
        assert_eq!(retry_after_secs, 50);
        assert_eq!(b.state, CircuitState::Open);
    }

    #[test]
    fn open_becomes_half_open_after_timeout() {
        let mut b = breaker();
        let now = b.updated_at;
        for _ in 0..3 {
            b.record_failure(now);
        }
        let later = now + Duration::seconds(61);
        assert_eq!(b.try_admit(later), Admission::Allowed);
        assert_eq!(b.state, CircuitState::HalfOpen);
    }

    #[test]
    fn half_open_closes_after_enough_successes() {
        let mut b = breaker();
        let now = b.updated_at;
        for _ in 0..3 {
            b.record_failure(now);
        }
        let later = now + Duration::seconds(61);
        let _ = b.try_admit(later);
        b.record_success(later);
        assert_eq!(b.state, CircuitState::HalfOpen);
        b.record_success(later);
        assert_eq!(b.state, CircuitState::Closed);
        assert_eq!(b.failure_count, 0);
        assert_eq!(b.next_retry_at, None);
    }

    #[test]
    fn half_open_failure_reopens_with_fresh_deadline() {
        let mut b = breaker();
        let now = b.updated_at;
        for _ in 0..3 {
            b.record_failure(now);
        }
        let later = now + Duration::seconds(61);
        let _ = b.try_admit(later);
        b.record_failure(later);
        assert_eq!(b.state, CircuitState::Open);
        assert_eq!(b.next_retry_at, Some(later + Duration::seconds(60)));
    }

    #[test]
    fn success_in_closed_resets_failure_count() {
        let mut b = breaker();
        let now = b.updated_at;
        b.record_failure(now);
        b.record_failure(now);
        b.record_success(now);
        assert_eq!(b.failure_count, 0);
        b.record_failure(now);
        assert_eq!(b.state, CircuitState::Closed);
    }

    #[test]
    fn stale_failure_while_open_keeps_deadline() {
        let mut b = breaker();
        let now = b.updated_at;
        for _ in 0..3 {
            b.record_failure(now);
        }
        let deadline = b.next_retry_at;
        b.record_failure(now + Duration::seconds(30));
        assert_eq!(b.next_retry_at, deadline);
        assert_eq!(b.state, CircuitState::Open);
    }

    #[test]
    fn state_strings_round_trip() {
        for state in [CircuitState::Closed, CircuitState::Open, CircuitState::HalfOpen] {
            let Ok(parsed) = CircuitState::parse(state.as_str()) else {
                panic!("round trip failed for {state}");
            };
            assert_eq!(parsed, state);
        }
    }
}
