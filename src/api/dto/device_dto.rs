//! Device registry DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{Device, DeviceId, DeviceRegistration, Platform};

/// Request body for `POST /devices`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterDeviceRequest {
    /// Owning user.
    pub user_id: uuid::Uuid,
    /// Client-supplied installation identifier, stable per install.
    pub device_identifier: String,
    /// Platform the device runs on.
    pub platform: Platform,
    /// Optional display name ("Maria's iPhone").
    #[serde(default)]
    pub device_name: Option<String>,
    /// Application version.
    #[serde(default)]
    pub app_version: Option<String>,
    /// Operating system version.
    #[serde(default)]
    pub os_version: Option<String>,
    /// Push-delivery token, when the client granted push permissions.
    #[serde(default)]
    pub push_token: Option<String>,
}

impl From<RegisterDeviceRequest> for DeviceRegistration {
    fn from(req: RegisterDeviceRequest) -> Self {
        Self {
            user_id: req.user_id,
            device_identifier: req.device_identifier,
            platform: req.platform,
            device_name: req.device_name,
            app_version: req.app_version,
            os_version: req.os_version,
            push_token: req.push_token,
        }
    }
}

/// Device record as returned by registry endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct DeviceDto {
    /// Canonical device identifier.
    pub id: DeviceId,
    /// Owning user.
    pub user_id: uuid::Uuid,
    /// Client-supplied installation identifier.
    pub device_identifier: String,
    /// Platform the device runs on.
    pub platform: Platform,
    /// Display name, when set.
    pub device_name: Option<String>,
    /// Application version from the last registration.
    pub app_version: Option<String>,
    /// OS version from the last registration.
    pub os_version: Option<String>,
    /// Whether a push token is on file (the token itself stays private).
    pub has_push_token: bool,
    /// Soft-delete flag.
    pub is_active: bool,
    /// Primary-device election flag.
    pub is_primary: bool,
    /// Last heartbeat or re-registration time.
    pub last_seen_at: DateTime<Utc>,
    /// First registration time.
    pub created_at: DateTime<Utc>,
}

impl From<Device> for DeviceDto {
    fn from(device: Device) -> Self {
        Self {
            id: device.id,
            user_id: device.user_id,
            device_identifier: device.device_identifier,
            platform: device.platform,
            device_name: device.device_name,
            app_version: device.app_version,
            os_version: device.os_version,
            has_push_token: device.push_token.is_some(),
            is_active: device.is_active,
            is_primary: device.is_primary,
            last_seen_at: device.last_seen_at,
            created_at: device.created_at,
        }
    }
}

/// Query parameters for `GET /devices`.
#[derive(Debug, Deserialize, IntoParams)]
pub struct DeviceListParams {
    /// User whose devices to list.
    pub user_id: uuid::Uuid,
}

/// Response body for `GET /devices`.
#[derive(Debug, Serialize, ToSchema)]
pub struct DeviceListResponse {
    /// Devices ordered by first registration.
    pub data: Vec<DeviceDto>,
    /// Number of devices returned.
    pub total: usize,
}
