//! Notification queue queries.
//!
//! The delivery worker claims due rows with `FOR UPDATE SKIP LOCKED`
//! (same shape as the offline queue) and writes the final status and
//! per-device outcome map back in one statement.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{PostgresPersistence, db_err};
use crate::domain::{
    DeliveryStatusMap, NewNotification, Notification, NotificationId, NotificationStatus,
};
use crate::error::GatewayError;
use crate::persistence::models::NotificationRow;

const NOTIFICATION_COLUMNS: &str = "id, user_id, title, message, notification_type, priority, \
                                    data, target_devices, exclude_devices, status, \
                                    delivery_status, scheduled_at, expires_at, sent_at, created_at";

impl PostgresPersistence {
    /// Stores a new notification in `pending`.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::PersistenceError` on database failure.
    pub async fn insert_notification(
        &self,
        notification: &NewNotification,
    ) -> Result<Notification, GatewayError> {
        let targets: Vec<Uuid> = notification
            .target_devices
            .iter()
            .map(|d| *d.as_uuid())
            .collect();
        let excludes: Vec<Uuid> = notification
            .exclude_devices
            .iter()
            .map(|d| *d.as_uuid())
            .collect();

        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            "INSERT INTO notifications \
                 (id, user_id, title, message, notification_type, priority, data, \
                  target_devices, exclude_devices, scheduled_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING {NOTIFICATION_COLUMNS}",
        ))
        .bind(NotificationId::new().as_uuid())
        .bind(notification.user_id)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(&notification.notification_type)
        .bind(notification.priority)
        .bind(&notification.data)
        .bind(&targets)
        .bind(&excludes)
        .bind(notification.scheduled_at)
        .bind(notification.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        row.into_domain()
    }

    /// Loads one notification by id.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::PersistenceError` on database failure.
    pub async fn notification_by_id(
        &self,
        id: NotificationId,
    ) -> Result<Option<Notification>, GatewayError> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = $1",
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(NotificationRow::into_domain).transpose()
    }

    /// Claims up to `batch` due notifications for delivery, moving
    /// them to `sending`.
    ///
    /// A row is due when its `scheduled_at` is unset or has passed.
    /// Expired rows are still claimed; the worker records them as
    /// `expired` rather than silently leaving them behind.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::PersistenceError` on database failure.
    pub async fn claim_due_notifications(
        &self,
        batch: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>, GatewayError> {
        let rows = sqlx::query_as::<_, NotificationRow>(&format!(
            "WITH claimable AS ( \
                 SELECT id FROM notifications \
                 WHERE status = 'pending' \
                   AND (scheduled_at IS NULL OR scheduled_at <= $1) \
                 ORDER BY priority DESC, created_at ASC \
                 LIMIT $2 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             UPDATE notifications n \
             SET status = 'sending' \
             FROM claimable c WHERE n.id = c.id \
             RETURNING {NOTIFICATION_COLUMNS}",
        ))
        .bind(now)
        .bind(batch)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(NotificationRow::into_domain).collect()
    }

    /// Writes the final status and per-device outcome map for a
    /// claimed notification.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::PersistenceError` on database failure.
    pub async fn finish_notification(
        &self,
        id: NotificationId,
        status: NotificationStatus,
        delivery: &DeliveryStatusMap,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<(), GatewayError> {
        let delivery = serde_json::to_value(delivery)
            .map_err(|e| GatewayError::PersistenceError(e.to_string()))?;

        sqlx::query(
            "UPDATE notifications \
             SET status = $2, delivery_status = $3, sent_at = $4 \
             WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(status.as_str())
        .bind(delivery)
        .bind(sent_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }
}
