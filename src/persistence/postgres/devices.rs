//! Device registry queries.
//!
//! Registration is an upsert keyed on `(user_id, device_identifier)`;
//! the first device a user registers per platform is elected primary
//! inside the same statement, and the flag never moves after that.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{PostgresPersistence, db_err};
use crate::domain::{Device, DeviceId, DeviceRegistration};
use crate::error::GatewayError;
use crate::persistence::models::DeviceRow;

impl PostgresPersistence {
    /// Registers a device, or refreshes it if the user already
    /// registered this `device_identifier`.
    ///
    /// A refresh updates the descriptive fields, reactivates the row
    /// and bumps `last_seen_at`; a `NULL` push token in the request
    /// keeps the stored one. `is_primary` is decided only on first
    /// insert: the device becomes primary when the user has no primary
    /// device on that platform yet.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::PersistenceError` on database failure.
    pub async fn upsert_device(
        &self,
        registration: &DeviceRegistration,
        now: DateTime<Utc>,
    ) -> Result<Device, GatewayError> {
        let row = sqlx::query_as::<_, DeviceRow>(
            "INSERT INTO devices (id, user_id, device_identifier, platform, device_name, \
             app_version, os_version, push_token, is_active, is_primary, last_seen_at, preferences) \
             SELECT $1, $2, $3, $4, $5, $6, $7, $8, TRUE, \
                    NOT EXISTS (SELECT 1 FROM devices d \
                                WHERE d.user_id = $2 AND d.platform = $4 AND d.is_primary), \
                    $9, '{}'::jsonb \
             ON CONFLICT (user_id, device_identifier) DO UPDATE SET \
                 platform = EXCLUDED.platform, \
                 device_name = EXCLUDED.device_name, \
                 app_version = EXCLUDED.app_version, \
                 os_version = EXCLUDED.os_version, \
                 push_token = COALESCE(EXCLUDED.push_token, devices.push_token), \
                 is_active = TRUE, \
                 last_seen_at = EXCLUDED.last_seen_at \
             RETURNING id, user_id, device_identifier, platform, device_name, app_version, \
                       os_version, push_token, is_active, is_primary, last_seen_at, \
                       preferences, created_at",
        )
        .bind(DeviceId::new().as_uuid())
        .bind(registration.user_id)
        .bind(&registration.device_identifier)
        .bind(registration.platform.as_str())
        .bind(registration.device_name.as_deref())
        .bind(registration.app_version.as_deref())
        .bind(registration.os_version.as_deref())
        .bind(registration.push_token.as_deref())
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        row.into_domain()
    }

    /// Loads a single device by id.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::PersistenceError` on database failure.
    pub async fn device_by_id(&self, id: DeviceId) -> Result<Option<Device>, GatewayError> {
        let row = sqlx::query_as::<_, DeviceRow>(
            "SELECT id, user_id, device_identifier, platform, device_name, app_version, \
                    os_version, push_token, is_active, is_primary, last_seen_at, \
                    preferences, created_at \
             FROM devices WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(DeviceRow::into_domain).transpose()
    }

    /// Lists every device a user has registered, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::PersistenceError` on database failure.
    pub async fn devices_for_user(&self, user_id: Uuid) -> Result<Vec<Device>, GatewayError> {
        let rows = sqlx::query_as::<_, DeviceRow>(
            "SELECT id, user_id, device_identifier, platform, device_name, app_version, \
                    os_version, push_token, is_active, is_primary, last_seen_at, \
                    preferences, created_at \
             FROM devices WHERE user_id = $1 ORDER BY created_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(DeviceRow::into_domain).collect()
    }

    /// Lists the user's active devices, oldest first. This is the
    /// candidate set for notification fan-out.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::PersistenceError` on database failure.
    pub async fn active_devices_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Device>, GatewayError> {
        let rows = sqlx::query_as::<_, DeviceRow>(
            "SELECT id, user_id, device_identifier, platform, device_name, app_version, \
                    os_version, push_token, is_active, is_primary, last_seen_at, \
                    preferences, created_at \
             FROM devices WHERE user_id = $1 AND is_active ORDER BY created_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(DeviceRow::into_domain).collect()
    }

    /// Marks a device inactive. The primary flag is left in place so a
    /// later re-registration restores the device unchanged.
    ///
    /// Returns `None` when no such device exists.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::PersistenceError` on database failure.
    pub async fn deactivate_device(&self, id: DeviceId) -> Result<Option<Device>, GatewayError> {
        let row = sqlx::query_as::<_, DeviceRow>(
            "UPDATE devices SET is_active = FALSE WHERE id = $1 \
             RETURNING id, user_id, device_identifier, platform, device_name, app_version, \
                       os_version, push_token, is_active, is_primary, last_seen_at, \
                       preferences, created_at",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(DeviceRow::into_domain).transpose()
    }
}
