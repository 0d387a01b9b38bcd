//! Push transport seam.
//!
//! The delivery worker resolves targets and records outcomes; the
//! actual channel (APNs, FCM, WebSocket) sits behind this trait and is
//! out of scope for the gateway. The logging transport stands in for
//! it in every environment until a real one is wired up.

use std::fmt;

use async_trait::async_trait;

use crate::domain::{Device, Notification, Platform};

/// Delivers one notification to one device.
#[async_trait]
pub trait PushTransport: fmt::Debug + Send + Sync {
    /// Pushes the notification to the device.
    ///
    /// # Errors
    ///
    /// Any transport error; the delivery worker records the device as
    /// `failed` in the notification's delivery map.
    async fn push(&self, device: &Device, notification: &Notification) -> anyhow::Result<()>;
}

/// Transport that records deliveries in the log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingPushTransport;

#[async_trait]
impl PushTransport for LoggingPushTransport {
    async fn push(&self, device: &Device, notification: &Notification) -> anyhow::Result<()> {
        // Web clients are reached over their own channel and carry no
        // push token; for mobile a missing token is a real failure.
        if device.push_token.is_none() && device.platform != Platform::Web {
            anyhow::bail!("device {} has no push token", device.id);
        }
        tracing::info!(
            device_id = %device.id,
            notification_id = %notification.id,
            notification_type = %notification.notification_type,
            platform = %device.platform,
            "notification delivered (logging transport)"
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{DeviceId, DeliveryStatusMap, NotificationId, NotificationStatus};
    use chrono::Utc;

    fn device(platform: Platform, push_token: Option<&str>) -> Device {
        Device {
            id: DeviceId::new(),
            user_id: uuid::Uuid::new_v4(),
            device_identifier: "install-1".to_string(),
            platform,
            device_name: None,
            app_version: None,
            os_version: None,
            push_token: push_token.map(str::to_string),
            is_active: true,
            is_primary: false,
            last_seen_at: Utc::now(),
            preferences: serde_json::json!({}),
            created_at: Utc::now(),
        }
    }

    fn notification() -> Notification {
        Notification {
            id: NotificationId::new(),
            user_id: uuid::Uuid::new_v4(),
            title: "Reminder".to_string(),
            message: "Your appointment is tomorrow at 9:00".to_string(),
            notification_type: "booking_reminder".to_string(),
            priority: 5,
            data: serde_json::Value::Null,
            target_devices: vec![],
            exclude_devices: vec![],
            status: NotificationStatus::Sending,
            delivery_status: DeliveryStatusMap::new(),
            scheduled_at: None,
            expires_at: None,
            sent_at: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn mobile_device_without_token_fails() {
        let transport = LoggingPushTransport;
        let result = transport.push(&device(Platform::Ios, None), &notification()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn web_device_without_token_succeeds() {
        let transport = LoggingPushTransport;
        let result = transport.push(&device(Platform::Web, None), &notification()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn mobile_device_with_token_succeeds() {
        let transport = LoggingPushTransport;
        let result = transport
            .push(&device(Platform::Android, Some("fcm-token")), &notification())
            .await;
        assert!(result.is_ok());
    }
}
