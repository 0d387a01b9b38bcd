//! Device registry service: registration, listing, deactivation.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::{Device, DeviceId, DeviceRegistration, EventBus, SyncEvent};
use crate::error::GatewayError;
use crate::persistence::PostgresPersistence;

/// Orchestrates device identity: one row per (user, installation),
/// refreshed on every registration.
#[derive(Debug, Clone)]
pub struct DeviceService {
    persistence: Arc<PostgresPersistence>,
    event_bus: EventBus,
}

impl DeviceService {
    /// Creates a new `DeviceService`.
    #[must_use]
    pub fn new(persistence: Arc<PostgresPersistence>, event_bus: EventBus) -> Self {
        Self {
            persistence,
            event_bus,
        }
    }

    /// Registers a device or refreshes an existing registration.
    ///
    /// Re-registering the same (user, `device_identifier`) acts as a
    /// heartbeat: metadata and `last_seen_at` are refreshed and the
    /// device is reactivated. The first device a user registers on a
    /// platform is elected primary.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] on a malformed
    /// registration, or a persistence error.
    pub async fn register(&self, registration: DeviceRegistration) -> Result<Device, GatewayError> {
        registration.validate()?;
        let device = self.persistence.upsert_device(&registration, Utc::now()).await?;

        let _ = self.event_bus.publish(SyncEvent::DeviceRegistered {
            device_id: device.id,
            user_id: device.user_id,
            platform: device.platform,
            is_primary: device.is_primary,
            timestamp: Utc::now(),
        });

        tracing::info!(
            device_id = %device.id,
            user_id = %device.user_id,
            platform = %device.platform,
            is_primary = device.is_primary,
            "device registered"
        );
        Ok(device)
    }

    /// Loads one device.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::DeviceNotFound`] when no such device
    /// exists, or a persistence error.
    pub async fn get(&self, id: DeviceId) -> Result<Device, GatewayError> {
        self.persistence
            .device_by_id(id)
            .await?
            .ok_or(GatewayError::DeviceNotFound(*id.as_uuid()))
    }

    /// Lists every device a user has registered, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a persistence error on database failure.
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<Device>, GatewayError> {
        self.persistence.devices_for_user(user_id).await
    }

    /// Soft-deactivates a device.
    ///
    /// The row is kept (ledger entries reference it) and the primary
    /// flag stays put, so a later re-registration restores the device
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::DeviceNotFound`] when no such device
    /// exists, or a persistence error.
    pub async fn deactivate(&self, id: DeviceId) -> Result<Device, GatewayError> {
        let device = self
            .persistence
            .deactivate_device(id)
            .await?
            .ok_or(GatewayError::DeviceNotFound(*id.as_uuid()))?;

        let _ = self.event_bus.publish(SyncEvent::DeviceDeactivated {
            device_id: device.id,
            user_id: device.user_id,
            timestamp: Utc::now(),
        });

        tracing::info!(device_id = %device.id, user_id = %device.user_id, "device deactivated");
        Ok(device)
    }
}
