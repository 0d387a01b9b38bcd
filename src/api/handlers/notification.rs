//! Notification fanout handlers: queue, status, and the scheduler
//! delivery hook.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{DeliverResponse, NotificationDto, QueueNotificationRequest};
use crate::app_state::AppState;
use crate::domain::{NewNotification, NotificationId};
use crate::error::{ErrorResponse, GatewayError};

/// `POST /notifications` — Queue a notification for delivery.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] on an empty title or
/// message.
#[utoipa::path(
    post,
    path = "/api/v1/notifications",
    tag = "Notifications",
    summary = "Queue a notification",
    description = "Stores a notification for asynchronous fan-out to the user's devices. An empty target list means every active device minus the exclude list; an explicit target list is honored exactly. Delivery happens on the next worker tick at or after `scheduled_at`.",
    request_body = QueueNotificationRequest,
    responses(
        (status = 201, description = "Notification queued", body = NotificationDto),
        (status = 400, description = "Invalid notification", body = ErrorResponse),
    )
)]
pub async fn queue_notification(
    State(state): State<AppState>,
    Json(req): Json<QueueNotificationRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let notification = state
        .notification_service
        .enqueue(NewNotification::from(req))
        .await?;
    Ok((StatusCode::CREATED, Json(NotificationDto::from(notification))))
}

/// `GET /notifications/:id` — Delivery status.
///
/// # Errors
///
/// Returns [`GatewayError::NotificationNotFound`] if no such
/// notification exists.
#[utoipa::path(
    get,
    path = "/api/v1/notifications/{notification_id}",
    tag = "Notifications",
    summary = "Get notification status",
    description = "Returns one notification with its per-device delivery outcomes.",
    params(
        ("notification_id" = uuid::Uuid, Path, description = "Notification UUID"),
    ),
    responses(
        (status = 200, description = "Notification record", body = NotificationDto),
        (status = 404, description = "Notification not found", body = ErrorResponse),
    )
)]
pub async fn get_notification(
    State(state): State<AppState>,
    Path(notification_id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, GatewayError> {
    let notification = state
        .notification_service
        .get(NotificationId::from(notification_id))
        .await?;
    Ok(Json(NotificationDto::from(notification)))
}

/// `POST /notifications/deliver` — Run one delivery cycle.
///
/// # Errors
///
/// Returns [`GatewayError`] when the claim phase fails.
#[utoipa::path(
    post,
    path = "/api/v1/notifications/deliver",
    tag = "Notifications",
    summary = "Deliver due notifications",
    description = "Scheduler hook: claims due notifications, resolves each one's target devices and pushes to every target, recording per-device outcomes. Notifications past their expiry are dropped without an attempt. Safe to call at any interval.",
    responses(
        (status = 200, description = "Delivery cycle summary", body = DeliverResponse),
    )
)]
pub async fn deliver_notifications(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, GatewayError> {
    let report = state.notification_service.deliver_due().await?;
    Ok(Json(DeliverResponse::from(report)))
}

/// Notification fanout routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/notifications", post(queue_notification))
        .route("/notifications/deliver", post(deliver_notifications))
        .route("/notifications/{notification_id}", get(get_notification))
}
