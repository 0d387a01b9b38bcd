//! Resilience queries: credential vault, circuit breakers, service
//! health.
//!
//! Breaker rows are driven through the in-memory state machine under a
//! `SELECT ... FOR UPDATE` row lock, so concurrent outcome reports for
//! the same `(service, environment)` serialize instead of clobbering
//! each other. Credential rotation deactivates the old record and
//! inserts the new one in the same transaction; history rows are never
//! deleted.

use chrono::{DateTime, Utc};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use super::{PostgresPersistence, db_err};
use crate::domain::{
    Admission, BreakerPolicy, CircuitBreaker, CircuitState, CredentialAuditAction,
    CredentialRecord, HealthProbe, SealedSecret, ServiceHealth,
};
use crate::error::GatewayError;
use crate::persistence::models::{CircuitBreakerRow, CredentialRow, ServiceHealthRow};

const CREDENTIAL_COLUMNS: &str = "id, service_name, environment, encrypted_key, key_nonce, \
                                  encrypted_secret, secret_nonce, is_active, expires_at, \
                                  last_rotated_at, created_at";

const BREAKER_COLUMNS: &str = "service_name, environment, state, failure_count, success_count, \
                               failure_threshold, success_threshold, open_timeout_secs, \
                               last_failure_at, next_retry_at, updated_at";

const HEALTH_COLUMNS: &str = "service_name, environment, status, last_check_at, \
                              response_time_ms, error_rate, consecutive_failures, last_error";

impl PostgresPersistence {
    /// Loads the active credential for `(service, environment)`, if
    /// one is stored.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::PersistenceError` on database failure or
    /// a corrupt stored row.
    pub async fn active_credential(
        &self,
        service: &str,
        environment: &str,
    ) -> Result<Option<CredentialRecord>, GatewayError> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM credential_records \
             WHERE service_name = $1 AND environment = $2 AND is_active",
        ))
        .bind(service)
        .bind(environment)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(CredentialRow::into_domain).transpose()
    }

    /// Stores a sealed credential, rotating out any active one.
    ///
    /// The previous active record (if any) is deactivated, the new one
    /// inserted with `last_rotated_at` set, and audit rows written,
    /// all in one transaction. Returns the stored record and whether
    /// this call rotated an existing credential.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::PersistenceError` on database failure or
    /// a corrupt stored row.
    pub async fn store_credential(
        &self,
        service: &str,
        environment: &str,
        sealed_key: &SealedSecret,
        sealed_secret: Option<&SealedSecret>,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<(CredentialRecord, bool), GatewayError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let previous: Option<Uuid> = sqlx::query_scalar(
            "UPDATE credential_records SET is_active = FALSE \
             WHERE service_name = $1 AND environment = $2 AND is_active \
             RETURNING id",
        )
        .bind(service)
        .bind(environment)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;
        let rotated = previous.is_some();

        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "INSERT INTO credential_records \
                 (id, service_name, environment, encrypted_key, key_nonce, \
                  encrypted_secret, secret_nonce, is_active, expires_at, last_rotated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE, $8, $9) \
             RETURNING {CREDENTIAL_COLUMNS}",
        ))
        .bind(Uuid::new_v4())
        .bind(service)
        .bind(environment)
        .bind(&sealed_key.ciphertext)
        .bind(&sealed_key.nonce)
        .bind(sealed_secret.map(|s| s.ciphertext.as_str()))
        .bind(sealed_secret.map(|s| s.nonce.as_str()))
        .bind(expires_at)
        .bind(rotated.then_some(now))
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        if let Some(previous_id) = previous {
            Self::insert_credential_audit(
                &mut tx,
                previous_id,
                service,
                environment,
                CredentialAuditAction::Deactivate,
                now,
            )
            .await?;
            Self::insert_credential_audit(
                &mut tx,
                row.id,
                service,
                environment,
                CredentialAuditAction::Rotate,
                now,
            )
            .await?;
        } else {
            Self::insert_credential_audit(
                &mut tx,
                row.id,
                service,
                environment,
                CredentialAuditAction::Create,
                now,
            )
            .await?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok((row.into_domain()?, rotated))
    }

    async fn insert_credential_audit(
        tx: &mut Transaction<'_, Postgres>,
        credential_id: Uuid,
        service: &str,
        environment: &str,
        action: CredentialAuditAction,
        now: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        sqlx::query(
            "INSERT INTO credential_audit \
                 (credential_id, service_name, environment, action, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(credential_id)
        .bind(service)
        .bind(environment)
        .bind(action.as_str())
        .bind(now)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    /// Asks the breaker for `(service, environment)` whether a call
    /// may proceed.
    ///
    /// Returns the admission decision plus the breaker state before
    /// and after, so callers can publish the open → half-open
    /// transition. A service with no breaker row yet is admitted
    /// without creating one; the row appears on its first recorded
    /// outcome.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::PersistenceError` on database failure or
    /// a corrupt stored row.
    pub async fn admit_call(
        &self,
        service: &str,
        environment: &str,
        now: DateTime<Utc>,
    ) -> Result<(Admission, CircuitState, CircuitState), GatewayError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let Some(mut breaker) = Self::load_breaker_for_update(&mut tx, service, environment)
            .await?
        else {
            tx.commit().await.map_err(db_err)?;
            return Ok((Admission::Allowed, CircuitState::Closed, CircuitState::Closed));
        };

        let before = breaker.state;
        let admission = breaker.try_admit(now);
        if breaker.state != before {
            Self::save_breaker(&mut tx, &breaker).await?;
        }
        tx.commit().await.map_err(db_err)?;

        Ok((admission, before, breaker.state))
    }

    /// Records the outcome of a call to `(service, environment)` and
    /// returns the breaker state before and after.
    ///
    /// Creates the breaker row on first use, seeded from `policy`.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::PersistenceError` on database failure or
    /// a corrupt stored row.
    pub async fn record_call_outcome(
        &self,
        service: &str,
        environment: &str,
        success: bool,
        policy: &BreakerPolicy,
        now: DateTime<Utc>,
    ) -> Result<(CircuitState, CircuitState), GatewayError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let mut breaker = Self::load_breaker_for_update(&mut tx, service, environment)
            .await?
            .unwrap_or_else(|| CircuitBreaker::new(service, environment, policy, now));

        let before = breaker.state;
        if success {
            breaker.record_success(now);
        } else {
            breaker.record_failure(now);
        }
        Self::save_breaker(&mut tx, &breaker).await?;
        tx.commit().await.map_err(db_err)?;

        Ok((before, breaker.state))
    }

    /// Loads the breaker row for `(service, environment)` without
    /// locking it.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::PersistenceError` on database failure or
    /// a corrupt stored row.
    pub async fn breaker_state(
        &self,
        service: &str,
        environment: &str,
    ) -> Result<Option<CircuitBreaker>, GatewayError> {
        let row = sqlx::query_as::<_, CircuitBreakerRow>(&format!(
            "SELECT {BREAKER_COLUMNS} FROM circuit_breakers \
             WHERE service_name = $1 AND environment = $2",
        ))
        .bind(service)
        .bind(environment)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(CircuitBreakerRow::into_domain).transpose()
    }

    async fn load_breaker_for_update(
        tx: &mut Transaction<'_, Postgres>,
        service: &str,
        environment: &str,
    ) -> Result<Option<CircuitBreaker>, GatewayError> {
        let row = sqlx::query_as::<_, CircuitBreakerRow>(&format!(
            "SELECT {BREAKER_COLUMNS} FROM circuit_breakers \
             WHERE service_name = $1 AND environment = $2 FOR UPDATE",
        ))
        .bind(service)
        .bind(environment)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_err)?;

        row.map(CircuitBreakerRow::into_domain).transpose()
    }

    async fn save_breaker(
        tx: &mut Transaction<'_, Postgres>,
        breaker: &CircuitBreaker,
    ) -> Result<(), GatewayError> {
        sqlx::query(
            "INSERT INTO circuit_breakers \
                 (service_name, environment, state, failure_count, success_count, \
                  failure_threshold, success_threshold, open_timeout_secs, \
                  last_failure_at, next_retry_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (service_name, environment) DO UPDATE SET \
                 state = EXCLUDED.state, \
                 failure_count = EXCLUDED.failure_count, \
                 success_count = EXCLUDED.success_count, \
                 last_failure_at = EXCLUDED.last_failure_at, \
                 next_retry_at = EXCLUDED.next_retry_at, \
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(&breaker.service_name)
        .bind(&breaker.environment)
        .bind(breaker.state.as_str())
        .bind(i32::try_from(breaker.failure_count).unwrap_or(i32::MAX))
        .bind(i32::try_from(breaker.success_count).unwrap_or(i32::MAX))
        .bind(i32::try_from(breaker.failure_threshold).unwrap_or(i32::MAX))
        .bind(i32::try_from(breaker.success_threshold).unwrap_or(i32::MAX))
        .bind(breaker.open_timeout_secs)
        .bind(breaker.last_failure_at)
        .bind(breaker.next_retry_at)
        .bind(breaker.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    /// Applies one probe report to the health row for its
    /// `(service, environment)`.
    ///
    /// The consecutive-failure streak resets on `healthy` and
    /// increments on anything else, including `degraded`; the stored
    /// error message is cleared on `healthy`.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::PersistenceError` on database failure or
    /// a corrupt stored row.
    pub async fn upsert_health(
        &self,
        probe: &HealthProbe,
        now: DateTime<Utc>,
    ) -> Result<ServiceHealth, GatewayError> {
        let row = sqlx::query_as::<_, ServiceHealthRow>(&format!(
            "INSERT INTO service_health \
                 (service_name, environment, status, last_check_at, response_time_ms, \
                  error_rate, consecutive_failures, last_error) \
             VALUES ($1, $2, $3, $4, $5, $6, \
                     CASE WHEN $3 = 'healthy' THEN 0 ELSE 1 END, \
                     CASE WHEN $3 = 'healthy' THEN NULL ELSE $7 END) \
             ON CONFLICT (service_name, environment) DO UPDATE SET \
                 status = EXCLUDED.status, \
                 last_check_at = EXCLUDED.last_check_at, \
                 response_time_ms = EXCLUDED.response_time_ms, \
                 error_rate = EXCLUDED.error_rate, \
                 consecutive_failures = CASE WHEN EXCLUDED.status = 'healthy' THEN 0 \
                                        ELSE service_health.consecutive_failures + 1 END, \
                 last_error = CASE WHEN EXCLUDED.status = 'healthy' THEN NULL \
                              ELSE EXCLUDED.last_error END \
             RETURNING {HEALTH_COLUMNS}",
        ))
        .bind(&probe.service_name)
        .bind(&probe.environment)
        .bind(probe.status.as_str())
        .bind(now)
        .bind(probe.response_time_ms)
        .bind(probe.error_rate)
        .bind(probe.last_error.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        row.into_domain()
    }

    /// Loads the health row for `(service, environment)`, if any.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::PersistenceError` on database failure or
    /// a corrupt stored row.
    pub async fn health_record(
        &self,
        service: &str,
        environment: &str,
    ) -> Result<Option<ServiceHealth>, GatewayError> {
        let row = sqlx::query_as::<_, ServiceHealthRow>(&format!(
            "SELECT {HEALTH_COLUMNS} FROM service_health \
             WHERE service_name = $1 AND environment = $2",
        ))
        .bind(service)
        .bind(environment)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(ServiceHealthRow::into_domain).transpose()
    }
}
