//! Device identity and registration records.
//!
//! A [`Device`] is one authenticated client instance (browser, iOS app,
//! Android app) belonging to a user. Devices are created on first contact,
//! refreshed on every heartbeat, and soft-deactivated when the client
//! unregisters. The registry guarantees at most one primary device per
//! (user, platform) pair.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::GatewayError;

/// Unique identifier for a registered device.
///
/// Wraps a UUID v4. Generated once at registration time and immutable
/// thereafter. The client-supplied installation identifier is a separate
/// field on [`Device`]; this is the canonical server-side key used for
/// queue routing, fan-out targeting, and ledger attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct DeviceId(uuid::Uuid);

impl DeviceId {
    /// Creates a new random `DeviceId` (UUID v4).
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Creates a `DeviceId` from an existing [`uuid::Uuid`].
    #[must_use]
    pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner [`uuid::Uuid`].
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for DeviceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<uuid::Uuid> for DeviceId {
    fn from(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }
}

impl From<DeviceId> for uuid::Uuid {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}

/// Client platform a device runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Browser client.
    Web,
    /// iOS application.
    Ios,
    /// Android application.
    Android,
}

impl Platform {
    /// Returns the platform as its stored string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Ios => "ios",
            Self::Android => "android",
        }
    }

    /// Parses a platform from its stored string form.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidPlatform`] for unknown strings.
    pub fn parse(s: &str) -> Result<Self, GatewayError> {
        match s {
            "web" => Ok(Self::Web),
            "ios" => Ok(Self::Ios),
            "android" => Ok(Self::Android),
            other => Err(GatewayError::InvalidPlatform(other.to_string())),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered device record.
#[derive(Debug, Clone, Serialize)]
pub struct Device {
    /// Canonical device identifier.
    pub id: DeviceId,
    /// Owning user.
    pub user_id: uuid::Uuid,
    /// Client-supplied installation identifier, unique per user.
    pub device_identifier: String,
    /// Platform the device runs on.
    pub platform: Platform,
    /// Optional display name ("Maria's iPhone").
    pub device_name: Option<String>,
    /// Application version reported at last registration.
    pub app_version: Option<String>,
    /// Operating system version reported at last registration.
    pub os_version: Option<String>,
    /// Push-delivery token, when the client granted push permissions.
    pub push_token: Option<String>,
    /// Soft-delete flag; inactive devices are excluded from fan-out.
    pub is_active: bool,
    /// Primary-device election flag, at most one per (user, platform).
    pub is_primary: bool,
    /// Last heartbeat or re-registration time.
    pub last_seen_at: DateTime<Utc>,
    /// Arbitrary client preference blob.
    pub preferences: serde_json::Value,
    /// First registration time.
    pub created_at: DateTime<Utc>,
}

/// Registration input for [`DeviceService::register`].
///
/// [`DeviceService::register`]: crate::service::DeviceService::register
#[derive(Debug, Clone)]
pub struct DeviceRegistration {
    /// Owning user.
    pub user_id: uuid::Uuid,
    /// Client-supplied installation identifier.
    pub device_identifier: String,
    /// Platform the device runs on.
    pub platform: Platform,
    /// Optional display name.
    pub device_name: Option<String>,
    /// Application version.
    pub app_version: Option<String>,
    /// Operating system version.
    pub os_version: Option<String>,
    /// Push-delivery token.
    pub push_token: Option<String>,
}

impl DeviceRegistration {
    /// Validates the registration input.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] if the installation
    /// identifier is empty or unreasonably long.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.device_identifier.trim().is_empty() {
            return Err(GatewayError::InvalidRequest(
                "device_identifier must not be empty".to_string(),
            ));
        }
        if self.device_identifier.len() > 255 {
            return Err(GatewayError::InvalidRequest(
                "device_identifier must be at most 255 characters".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn device_id_new_generates_unique_ids() {
        let a = DeviceId::new();
        let b = DeviceId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn device_id_display_is_uuid_format() {
        let id = DeviceId::new();
        let s = format!("{id}");
        assert_eq!(s.len(), 36);
        assert!(s.contains('-'));
    }

    #[test]
    fn device_id_serde_round_trip() {
        let id = DeviceId::new();
        let json = serde_json::to_string(&id).ok();
        let Some(json) = json else {
            panic!("serialization failed");
        };
        let deserialized: DeviceId = serde_json::from_str(&json).ok().unwrap_or_else(|| {
            panic!("deserialization failed");
        });
        assert_eq!(id, deserialized);
    }

    #[test]
    fn platform_parse_round_trip() {
        for p in [Platform::Web, Platform::Ios, Platform::Android] {
            let parsed = Platform::parse(p.as_str());
            let Ok(parsed) = parsed else {
                panic!("round trip failed for {p}");
            };
            assert_eq!(parsed, p);
        }
    }

    #[test]
    fn platform_parse_rejects_unknown() {
        let result = Platform::parse("blackberry");
        assert!(matches!(result, Err(GatewayError::InvalidPlatform(_))));
    }

    #[test]
    fn registration_rejects_empty_identifier() {
        let reg = DeviceRegistration {
            user_id: uuid::Uuid::new_v4(),
            device_identifier: "  ".to_string(),
            platform: Platform::Web,
            device_name: None,
            app_version: None,
            os_version: None,
            push_token: None,
        };
        assert!(reg.validate().is_err());
    }

    #[test]
    fn registration_accepts_normal_identifier() {
        let reg = DeviceRegistration {
            user_id: uuid::Uuid::new_v4(),
            device_identifier: "install-7f3a".to_string(),
            platform: Platform::Android,
            device_name: Some("Pixel 9".to_string()),
            app_version: Some("2.14.0".to_string()),
            os_version: None,
            push_token: None,
        };
        assert!(reg.validate().is_ok());
    }
}
