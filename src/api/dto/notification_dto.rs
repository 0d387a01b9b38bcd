//! Notification fanout DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::operation::clamp_priority;
use crate::domain::{
    DeliveryOutcome, DeliveryStatusMap, DeviceId, NewNotification, Notification, NotificationId,
    NotificationStatus,
};
use crate::service::DeliveryReport;

/// Request body for `POST /notifications`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct QueueNotificationRequest {
    /// Addressed user.
    pub user_id: uuid::Uuid,
    /// Short title shown to the user.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Producer-defined type tag. Defaults to `general`.
    #[serde(default = "default_notification_type")]
    pub notification_type: String,
    /// Delivery priority 0–10; higher delivers first. Defaults to 0.
    #[serde(default)]
    pub priority: i64,
    /// Opaque payload forwarded to the client.
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    /// Explicit target devices; empty means "all active devices".
    #[serde(default)]
    pub target_devices: Vec<uuid::Uuid>,
    /// Devices excluded from the implicit all-active target set.
    #[serde(default)]
    pub exclude_devices: Vec<uuid::Uuid>,
    /// Earliest delivery time; omit for immediate delivery.
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Drop-dead time; unsent past this is dropped.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_notification_type() -> String {
    "general".to_string()
}

impl From<QueueNotificationRequest> for NewNotification {
    fn from(req: QueueNotificationRequest) -> Self {
        Self {
            user_id: req.user_id,
            title: req.title,
            message: req.message,
            notification_type: req.notification_type,
            priority: clamp_priority(req.priority),
            data: req.data.unwrap_or(serde_json::Value::Null),
            target_devices: req.target_devices.into_iter().map(DeviceId::from).collect(),
            exclude_devices: req.exclude_devices.into_iter().map(DeviceId::from).collect(),
            scheduled_at: req.scheduled_at,
            expires_at: req.expires_at,
        }
    }
}

/// Notification as returned by fanout endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationDto {
    /// Notification identifier.
    pub id: NotificationId,
    /// Addressed user.
    pub user_id: uuid::Uuid,
    /// Short title shown to the user.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Producer-defined type tag.
    pub notification_type: String,
    /// Delivery priority.
    pub priority: i16,
    /// Opaque payload forwarded to the client.
    pub data: serde_json::Value,
    /// Explicit target devices.
    pub target_devices: Vec<DeviceId>,
    /// Excluded devices.
    pub exclude_devices: Vec<DeviceId>,
    /// Worker lifecycle status.
    pub status: NotificationStatus,
    /// Per-device outcomes, keyed by device id.
    #[schema(value_type = std::collections::BTreeMap<uuid::Uuid, DeliveryOutcome>)]
    pub delivery_status: DeliveryStatusMap,
    /// Earliest delivery time.
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Drop-dead time.
    pub expires_at: Option<DateTime<Utc>>,
    /// When the worker finished resolving delivery.
    pub sent_at: Option<DateTime<Utc>>,
    /// Enqueue timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<Notification> for NotificationDto {
    fn from(n: Notification) -> Self {
        Self {
            id: n.id,
            user_id: n.user_id,
            title: n.title,
            message: n.message,
            notification_type: n.notification_type,
            priority: n.priority,
            data: n.data,
            target_devices: n.target_devices,
            exclude_devices: n.exclude_devices,
            status: n.status,
            delivery_status: n.delivery_status,
            scheduled_at: n.scheduled_at,
            expires_at: n.expires_at,
            sent_at: n.sent_at,
            created_at: n.created_at,
        }
    }
}

/// Response body for `POST /notifications/deliver`.
#[derive(Debug, Serialize, ToSchema)]
pub struct DeliverResponse {
    /// Notifications claimed by this cycle.
    pub claimed: usize,
    /// Notifications that finished as sent.
    pub sent: usize,
    /// Notifications that had expired before delivery.
    pub expired: usize,
}

impl From<DeliveryReport> for DeliverResponse {
    fn from(report: DeliveryReport) -> Self {
        Self {
            claimed: report.claimed,
            sent: report.sent,
            expired: report.expired,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn queue_request_clamps_priority_and_defaults() {
        let json = serde_json::json!({
            "user_id": uuid::Uuid::new_v4(),
            "title": "Booking reminder",
            "message": "Your appointment is tomorrow at 10:00",
            "priority": 99,
        });
        let req: QueueNotificationRequest =
            serde_json::from_value(json).ok().unwrap_or_else(|| {
                panic!("request should deserialize");
            });
        let new = NewNotification::from(req);
        assert_eq!(new.priority, 10);
        assert_eq!(new.notification_type, "general");
        assert!(new.data.is_null());
        assert!(new.target_devices.is_empty());
    }
}
