//! Notification fanout service: enqueue and the scheduler-driven
//! delivery worker.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use crate::domain::notification::resolve_targets;
use crate::domain::{
    DeliveryOutcome, DeliveryStatusMap, Device, DeviceId, EventBus, NewNotification, Notification,
    NotificationId, NotificationStatus, SyncEvent,
};
use crate::error::GatewayError;
use crate::persistence::PostgresPersistence;
use crate::service::push::PushTransport;

/// Summary of one delivery cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeliveryReport {
    /// Notifications claimed by this cycle.
    pub claimed: usize,
    /// Notifications that finished as sent.
    pub sent: usize,
    /// Notifications that had expired before delivery.
    pub expired: usize,
}

/// Fans notifications out to a user's devices.
///
/// Enqueue stores the notification; delivery happens asynchronously
/// when the external scheduler invokes [`deliver_due`].
///
/// [`deliver_due`]: NotificationService::deliver_due
#[derive(Debug, Clone)]
pub struct NotificationService {
    persistence: Arc<PostgresPersistence>,
    transport: Arc<dyn PushTransport>,
    event_bus: EventBus,
    delivery_batch_size: i64,
}

impl NotificationService {
    /// Creates a new `NotificationService`.
    #[must_use]
    pub fn new(
        persistence: Arc<PostgresPersistence>,
        transport: Arc<dyn PushTransport>,
        event_bus: EventBus,
        delivery_batch_size: i64,
    ) -> Self {
        Self {
            persistence,
            transport,
            event_bus,
            delivery_batch_size,
        }
    }

    /// Queues a notification for asynchronous delivery.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] when the title or
    /// message is empty, or a persistence error.
    pub async fn enqueue(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, GatewayError> {
        notification.validate()?;
        let stored = self.persistence.insert_notification(&notification).await?;

        let _ = self.event_bus.publish(SyncEvent::NotificationQueued {
            notification_id: stored.id,
            user_id: stored.user_id,
            notification_type: stored.notification_type.clone(),
            priority: stored.priority,
            timestamp: Utc::now(),
        });
        tracing::info!(
            notification_id = %stored.id,
            user_id = %stored.user_id,
            notification_type = %stored.notification_type,
            priority = stored.priority,
            "notification queued"
        );
        Ok(stored)
    }

    /// Loads one notification with its per-device delivery outcomes.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::NotificationNotFound`] when no such
    /// notification exists, or a persistence error.
    pub async fn get(&self, id: NotificationId) -> Result<Notification, GatewayError> {
        self.persistence
            .notification_by_id(id)
            .await?
            .ok_or(GatewayError::NotificationNotFound(*id.as_uuid()))
    }

    /// Runs one delivery cycle. Invoked by the external scheduler; an
    /// idempotent no-op when nothing is due.
    ///
    /// Claims a batch of due notifications, resolves each one's target
    /// devices, pushes to every target, and records the per-device
    /// outcome. A notification past its `expires_at` is finished as
    /// expired without any push attempt.
    ///
    /// # Errors
    ///
    /// Returns a persistence error when the claim phase itself fails;
    /// per-notification failures are recorded on their rows instead.
    pub async fn deliver_due(&self) -> Result<DeliveryReport, GatewayError> {
        let now = Utc::now();
        let claimed = self
            .persistence
            .claim_due_notifications(self.delivery_batch_size, now)
            .await?;

        let mut report = DeliveryReport {
            claimed: claimed.len(),
            sent: 0,
            expired: 0,
        };

        for notification in claimed {
            match self.deliver_one(&notification).await {
                Ok(true) => report.sent = report.sent.saturating_add(1),
                Ok(false) => report.expired = report.expired.saturating_add(1),
                Err(e) => tracing::error!(
                    notification_id = %notification.id,
                    error = %e,
                    "delivery outcome could not be recorded"
                ),
            }
        }

        tracing::info!(
            claimed = report.claimed,
            sent = report.sent,
            expired = report.expired,
            "notification queue delivered"
        );
        Ok(report)
    }

    /// Delivers one claimed notification. `Ok(true)` means it finished
    /// as sent, `Ok(false)` as expired.
    async fn deliver_one(&self, notification: &Notification) -> Result<bool, GatewayError> {
        let now = Utc::now();
        let active = self
            .persistence
            .active_devices_for_user(notification.user_id)
            .await?;
        let active_ids: Vec<DeviceId> = active.iter().map(|d| d.id).collect();
        let targets = resolve_targets(
            &active_ids,
            &notification.target_devices,
            &notification.exclude_devices,
        );

        if notification.is_expired(now) {
            let delivery: DeliveryStatusMap = targets
                .iter()
                .map(|d| (*d.as_uuid(), DeliveryOutcome::Expired))
                .collect();
            self.persistence
                .finish_notification(notification.id, NotificationStatus::Expired, &delivery, None)
                .await?;
            let _ = self.event_bus.publish(SyncEvent::NotificationExpired {
                notification_id: notification.id,
                user_id: notification.user_id,
                timestamp: Utc::now(),
            });
            tracing::info!(
                notification_id = %notification.id,
                user_id = %notification.user_id,
                "notification expired before delivery"
            );
            return Ok(false);
        }

        let mut by_id: HashMap<DeviceId, Device> =
            active.into_iter().map(|d| (d.id, d)).collect();
        let mut delivery = DeliveryStatusMap::new();
        for target in targets {
            let outcome = match self.push_to(target, &mut by_id, notification).await? {
                Ok(()) => DeliveryOutcome::Sent,
                Err(e) => {
                    tracing::warn!(
                        notification_id = %notification.id,
                        device_id = %target,
                        error = %e,
                        "push delivery failed for device"
                    );
                    DeliveryOutcome::Failed
                }
            };
            delivery.insert(*target.as_uuid(), outcome);
        }

        let sent = delivery
            .values()
            .filter(|o| **o == DeliveryOutcome::Sent)
            .count();
        let failed = delivery.len().saturating_sub(sent);

        self.persistence
            .finish_notification(
                notification.id,
                NotificationStatus::Sent,
                &delivery,
                Some(now),
            )
            .await?;
        let _ = self.event_bus.publish(SyncEvent::NotificationDelivered {
            notification_id: notification.id,
            user_id: notification.user_id,
            sent,
            failed,
            timestamp: Utc::now(),
        });
        tracing::info!(
            notification_id = %notification.id,
            user_id = %notification.user_id,
            sent,
            failed,
            "notification delivered"
        );
        Ok(true)
    }

    /// Pushes to one target device. The outer `Result` is a database
    /// error; the inner one is the transport outcome for the device.
    ///
    /// Explicit targets may name devices outside the user's active
    /// set; those are fetched individually. An unknown device is a
    /// failed delivery, not an error.
    async fn push_to(
        &self,
        target: DeviceId,
        by_id: &mut HashMap<DeviceId, Device>,
        notification: &Notification,
    ) -> Result<anyhow::Result<()>, GatewayError> {
        if !by_id.contains_key(&target) {
            match self.persistence.device_by_id(target).await? {
                Some(device) => {
                    by_id.insert(target, device);
                }
                None => {
                    return Ok(Err(anyhow::anyhow!("device {target} is not registered")));
                }
            }
        }
        let Some(device) = by_id.get(&target) else {
            return Ok(Err(anyhow::anyhow!("device {target} is not registered")));
        };
        Ok(self.transport.push(device, notification).await)
    }
}
