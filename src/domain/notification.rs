//! Notification fan-out types and target resolution.
//!
//! A [`Notification`] is addressed to a user, not a device; the delivery
//! worker resolves the concrete device set at delivery time against the
//! registry and records one delivery outcome per target. Transport
//! mechanics (APNs, FCM, WebSocket) live behind the `PushTransport`
//! seam and are out of scope here.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::device::DeviceId;
use crate::error::GatewayError;

/// Unique identifier for a queued notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct NotificationId(uuid::Uuid);

impl NotificationId {
    /// Creates a new random `NotificationId` (UUID v4).
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Creates a `NotificationId` from an existing [`uuid::Uuid`].
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

impl Default for NotificationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<uuid::Uuid> for NotificationId {
    fn from(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }
}

impl From<NotificationId> for uuid::Uuid {
    fn from(id: NotificationId) -> Self {
        id.0
    }
}

/// Worker-side lifecycle of a notification.
///
/// `pending → sending → {sent | expired}`. `sent` means the worker
/// resolved every target and recorded a per-device outcome; individual
/// devices may still show `failed` in the delivery map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    /// Waiting for the delivery worker.
    Pending,
    /// Claimed by a delivery cycle.
    Sending,
    /// Delivery attempted for every target; terminal.
    Sent,
    /// Past `expires_at` before any attempt; dropped, terminal.
    Expired,
}

impl NotificationStatus {
    /// Returns the status as its stored string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Expired => "expired",
        }
    }

    /// Parses a status from its stored string form.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] for unknown strings.
    pub fn parse(s: &str) -> Result<Self, GatewayError> {
        match s {
            "pending" => Ok(Self::Pending),
            "sending" => Ok(Self::Sending),
            "sent" => Ok(Self::Sent),
            "expired" => Ok(Self::Expired),
            other => Err(GatewayError::InvalidRequest(format!(
                "unknown notification status: {other}"
            ))),
        }
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-device delivery outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// The transport accepted the notification for this device.
    Sent,
    /// The transport rejected it or the device is unknown.
    Failed,
    /// The notification expired before this device was attempted.
    Expired,
}

impl DeliveryOutcome {
    /// Returns the outcome as its stored string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map of device → delivery outcome, stored as JSONB on the row.
///
/// `BTreeMap` keeps the serialized form stable for audit diffs.
pub type DeliveryStatusMap = BTreeMap<uuid::Uuid, DeliveryOutcome>;

/// A queued notification.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    /// Notification identifier.
    pub id: NotificationId,
    /// Addressed user.
    pub user_id: uuid::Uuid,
    /// Short title shown to the user.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Producer-defined type tag (e.g. `booking_reminder`).
    pub notification_type: String,
    /// Priority 0–10; higher is delivered first within a cycle.
    pub priority: i16,
    /// Opaque payload forwarded to the client.
    pub data: serde_json::Value,
    /// Explicit target devices; empty means "all active devices".
    pub target_devices: Vec<DeviceId>,
    /// Devices excluded from the implicit all-active target set.
    pub exclude_devices: Vec<DeviceId>,
    /// Worker lifecycle status.
    pub status: NotificationStatus,
    /// Per-device outcomes, populated as delivery resolves.
    pub delivery_status: DeliveryStatusMap,
    /// Earliest delivery time; `None` means immediately.
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Drop-dead time; unsent past this is dropped, not attempted.
    pub expires_at: Option<DateTime<Utc>>,
    /// When the worker finished resolving delivery.
    pub sent_at: Option<DateTime<Utc>>,
    /// Enqueue timestamp.
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Whether the notification is past its drop-dead time.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|t| t <= now)
    }
}

/// A notification accepted for queueing but not yet stored.
#[derive(Debug, Clone)]
pub struct NewNotification {
    /// Addressed user.
    pub user_id: uuid::Uuid,
    /// Short title shown to the user.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Producer-defined type tag.
    pub notification_type: String,
    /// Priority 0–10, already clamped by the caller.
    pub priority: i16,
    /// Opaque payload forwarded to the client.
    pub data: serde_json::Value,
    /// Explicit target devices; empty means "all active devices".
    pub target_devices: Vec<DeviceId>,
    /// Devices excluded from the implicit all-active target set.
    pub exclude_devices: Vec<DeviceId>,
    /// Earliest delivery time.
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Drop-dead time.
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewNotification {
    /// Validates the user-supplied fields.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] when the title or
    /// message is empty.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.title.trim().is_empty() {
            return Err(GatewayError::InvalidRequest(
                "notification title must not be empty".to_string(),
            ));
        }
        if self.message.trim().is_empty() {
            return Err(GatewayError::InvalidRequest(
                "notification message must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Resolves the device set a notification targets.
///
/// An explicit `targets` list is honored exactly and bypasses the
/// exclude list; an empty `targets` list means every active device of
/// the user minus `excludes`. Order follows the input lists; duplicates
/// keep their first occurrence.
#[must_use]
pub fn resolve_targets(
    active: &[DeviceId],
    targets: &[DeviceId],
    excludes: &[DeviceId],
) -> Vec<DeviceId> {
    let mut seen = std::collections::HashSet::new();
    if targets.is_empty() {
        active
            .iter()
            .filter(|d| !excludes.contains(d))
            .filter(|d| seen.insert(**d))
            .copied()
            .collect()
    } else {
        targets.iter().filter(|d| seen.insert(**d)).copied().collect()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn empty_targets_resolve_to_active_minus_excludes() {
        let d1 = DeviceId::new();
        let d2 = DeviceId::new();
        let d3 = DeviceId::new();
        let resolved = resolve_targets(&[d1, d2, d3], &[], &[d2]);
        assert_eq!(resolved, vec![d1, d3]);
    }

    #[test]
    fn explicit_targets_bypass_excludes() {
        let d1 = DeviceId::new();
        let d2 = DeviceId::new();
        let resolved = resolve_targets(&[d1, d2], &[d2], &[d2]);
        assert_eq!(resolved, vec![d2]);
    }

    #[test]
    fn explicit_targets_may_name_inactive_devices() {
        let active = DeviceId::new();
        let dormant = DeviceId::new();
        let resolved = resolve_targets(&[active], &[dormant], &[]);
        assert_eq!(resolved, vec![dormant]);
    }

    #[test]
    fn duplicates_keep_first_occurrence() {
        let d1 = DeviceId::new();
        let d2 = DeviceId::new();
        let resolved = resolve_targets(&[d1, d2], &[d1, d2, d1], &[]);
        assert_eq!(resolved, vec![d1, d2]);
    }

    #[test]
    fn excluding_everything_resolves_to_no_targets() {
        let d1 = DeviceId::new();
        let resolved = resolve_targets(&[d1], &[], &[d1]);
        assert!(resolved.is_empty());
    }

    #[test]
    fn expiry_uses_inclusive_cutoff() {
        let now = Utc::now();
        let n = Notification {
            id: NotificationId::new(),
            user_id: uuid::Uuid::new_v4(),
            title: "Reminder".to_string(),
            message: "Your appointment is tomorrow".to_string(),
            notification_type: "booking_reminder".to_string(),
            priority: 5,
            data: serde_json::Value::Null,
            target_devices: vec![],
            exclude_devices: vec![],
            status: NotificationStatus::Pending,
            delivery_status: DeliveryStatusMap::new(),
            scheduled_at: None,
            expires_at: Some(now),
            sent_at: None,
            created_at: now,
        };
        assert!(n.is_expired(now));
        assert!(!n.is_expired(now - chrono::Duration::seconds(1)));
    }

    #[test]
    fn delivery_map_serializes_to_string_outcomes() {
        let mut map = DeliveryStatusMap::new();
        let device = uuid::Uuid::new_v4();
        map.insert(device, DeliveryOutcome::Sent);
        let json = serde_json::to_value(&map).ok();
        let Some(json) = json else {
            panic!("serialization failed");
        };
        assert_eq!(json.get(device.to_string()), Some(&serde_json::json!("sent")));
    }
}
