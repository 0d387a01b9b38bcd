//! Resilience service: credential vault, circuit breakers, and
//! downstream health records.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::{
    ActiveCredential, Admission, BreakerPolicy, CircuitBreaker, CircuitState, CredentialCipher,
    CredentialRecord, EventBus, HealthProbe, ServiceHealth, SyncEvent,
};
use crate::error::GatewayError;
use crate::persistence::PostgresPersistence;

/// Guards calls to downstream collaborators: sealed credentials,
/// per-(service, environment) circuit breakers, and health records.
#[derive(Debug, Clone)]
pub struct ResilienceService {
    persistence: Arc<PostgresPersistence>,
    cipher: Arc<CredentialCipher>,
    policy: BreakerPolicy,
    event_bus: EventBus,
}

impl ResilienceService {
    /// Creates a new `ResilienceService`.
    #[must_use]
    pub fn new(
        persistence: Arc<PostgresPersistence>,
        cipher: Arc<CredentialCipher>,
        policy: BreakerPolicy,
        event_bus: EventBus,
    ) -> Self {
        Self {
            persistence,
            cipher,
            policy,
            event_bus,
        }
    }

    /// Seals and stores a credential, rotating out the active one if
    /// present.
    ///
    /// Returns the stored record (still sealed) and whether an
    /// existing credential was rotated.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::CryptoError`] when sealing fails, or a
    /// persistence error.
    pub async fn store_credential(
        &self,
        service: &str,
        environment: &str,
        api_key: &str,
        api_secret: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(CredentialRecord, bool), GatewayError> {
        let sealed_key = self.cipher.seal(api_key)?;
        let sealed_secret = api_secret.map(|s| self.cipher.seal(s)).transpose()?;

        let (record, rotated) = self
            .persistence
            .store_credential(
                service,
                environment,
                &sealed_key,
                sealed_secret.as_ref(),
                expires_at,
                Utc::now(),
            )
            .await?;

        let _ = self.event_bus.publish(SyncEvent::CredentialRotated {
            service: service.to_string(),
            environment: environment.to_string(),
            rotated,
            timestamp: Utc::now(),
        });

        tracing::info!(service, environment, rotated, "credential stored");
        Ok((record, rotated))
    }

    /// Loads and opens the active credential for
    /// `(service, environment)`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::CredentialNotFound`] when none is
    /// stored, [`GatewayError::CredentialExpired`] when the active
    /// record is past `expires_at`, [`GatewayError::CryptoError`] when
    /// opening fails, or a persistence error.
    pub async fn active_credential(
        &self,
        service: &str,
        environment: &str,
    ) -> Result<ActiveCredential, GatewayError> {
        let record = self
            .persistence
            .active_credential(service, environment)
            .await?
            .ok_or_else(|| GatewayError::CredentialNotFound {
                service: service.to_string(),
                environment: environment.to_string(),
            })?;

        if record.is_expired(Utc::now()) {
            let expired_at = record.expires_at.unwrap_or_else(Utc::now);
            tracing::warn!(service, environment, %expired_at, "active credential expired");
            return Err(GatewayError::CredentialExpired {
                service: service.to_string(),
                environment: environment.to_string(),
                expired_at,
            });
        }

        let api_key = self.cipher.open(&record.sealed_key)?;
        let api_secret = record
            .sealed_secret
            .as_ref()
            .map(|sealed| self.cipher.open(sealed))
            .transpose()?;

        Ok(ActiveCredential {
            service_name: record.service_name,
            environment: record.environment,
            api_key,
            api_secret,
            expires_at: record.expires_at,
            last_rotated_at: record.last_rotated_at,
        })
    }

    /// Asks the breaker whether a call to `(service, environment)` may
    /// proceed, failing fast with [`GatewayError::CircuitOpen`] when it
    /// may not.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::CircuitOpen`] while the breaker rejects,
    /// or a persistence error.
    pub async fn admit(&self, service: &str, environment: &str) -> Result<(), GatewayError> {
        let (admission, from, to) = self
            .persistence
            .admit_call(service, environment, Utc::now())
            .await?;
        self.publish_transition(service, environment, from, to);

        match admission {
            Admission::Allowed => Ok(()),
            Admission::Rejected { retry_after_secs } => {
                tracing::warn!(service, environment, retry_after_secs, "circuit open; call rejected");
                Err(GatewayError::CircuitOpen {
                    service: service.to_string(),
                    retry_after_secs,
                })
            }
        }
    }

    /// Records a call outcome and returns the breaker state after it.
    ///
    /// # Errors
    ///
    /// Returns a persistence error on database failure.
    pub async fn record_outcome(
        &self,
        service: &str,
        environment: &str,
        success: bool,
    ) -> Result<CircuitState, GatewayError> {
        let (from, to) = self
            .persistence
            .record_call_outcome(service, environment, success, &self.policy, Utc::now())
            .await?;
        self.publish_transition(service, environment, from, to);

        if from != to {
            tracing::info!(service, environment, from = %from, to = %to, "circuit transitioned");
        }
        Ok(to)
    }

    /// Loads the breaker state for `(service, environment)`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::CircuitNotFound`] when no outcome has
    /// ever been recorded for the pair, or a persistence error.
    pub async fn circuit(
        &self,
        service: &str,
        environment: &str,
    ) -> Result<CircuitBreaker, GatewayError> {
        self.persistence
            .breaker_state(service, environment)
            .await?
            .ok_or_else(|| GatewayError::CircuitNotFound {
                service: service.to_string(),
                environment: environment.to_string(),
            })
    }

    /// Applies one health probe report.
    ///
    /// # Errors
    ///
    /// Returns a persistence error on database failure.
    pub async fn record_health(&self, probe: HealthProbe) -> Result<ServiceHealth, GatewayError> {
        let health = self.persistence.upsert_health(&probe, Utc::now()).await?;

        let _ = self.event_bus.publish(SyncEvent::HealthRecorded {
            service: health.service_name.clone(),
            environment: health.environment.clone(),
            status: health.status,
            consecutive_failures: health.consecutive_failures,
            timestamp: Utc::now(),
        });

        tracing::info!(
            service = %health.service_name,
            environment = %health.environment,
            status = %health.status,
            consecutive_failures = health.consecutive_failures,
            "health probe recorded"
        );
        Ok(health)
    }

    /// Loads the health record for `(service, environment)`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::HealthNotFound`] when no probe has been
    /// recorded for the pair, or a persistence error.
    pub async fn health(
        &self,
        service: &str,
        environment: &str,
    ) -> Result<ServiceHealth, GatewayError> {
        self.persistence
            .health_record(service, environment)
            .await?
            .ok_or_else(|| GatewayError::HealthNotFound {
                service: service.to_string(),
                environment: environment.to_string(),
            })
    }

    fn publish_transition(
        &self,
        service: &str,
        environment: &str,
        from: CircuitState,
        to: CircuitState,
    ) {
        if from != to {
            let _ = self.event_bus.publish(SyncEvent::CircuitTransitioned {
                service: service.to_string(),
                environment: environment.to_string(),
                from,
                to,
                timestamp: Utc::now(),
            });
        }
    }
}
