//! Offline operation queue handlers: enqueue, status, cancel,
//! dead-letter view, and the scheduler drain hook.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    DeadLetterParams, DeadLetterResponse, DrainResponse, EnqueueOperationRequest,
    EnqueueOperationResponse, OperationDto,
};
use crate::app_state::AppState;
use crate::domain::{DeviceId, OperationId};
use crate::error::{ErrorResponse, GatewayError};

/// `POST /operations` — Enqueue an operation performed offline.
///
/// # Errors
///
/// Returns [`GatewayError::DeviceNotFound`] for an unregistered device
/// and validation errors for a bad submission.
#[utoipa::path(
    post,
    path = "/api/v1/operations",
    tag = "Operations",
    summary = "Enqueue an offline operation",
    description = "Accepts an operation a device performed while offline. The operation is validated, stored, and applied asynchronously by the drain worker. Re-submitting the same (device_id, idempotency_key) returns the already-queued operation with `duplicate: true` instead of creating a second one.",
    request_body = EnqueueOperationRequest,
    responses(
        (status = 202, description = "Operation accepted", body = EnqueueOperationResponse),
        (status = 200, description = "Duplicate submission; existing operation returned", body = EnqueueOperationResponse),
        (status = 400, description = "Invalid operation", body = ErrorResponse),
        (status = 404, description = "Device not found", body = ErrorResponse),
    )
)]
pub async fn enqueue_operation(
    State(state): State<AppState>,
    Json(req): Json<EnqueueOperationRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let (operation, created) = state
        .queue_service
        .enqueue(
            DeviceId::from(req.device_id),
            &req.operation_type,
            req.payload,
            req.priority,
            &req.idempotency_key,
        )
        .await?;

    let status = if created {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    let body = EnqueueOperationResponse {
        operation: OperationDto::from(operation),
        duplicate: !created,
    };
    Ok((status, Json(body)))
}

/// `GET /operations/:id` — Operation status.
///
/// # Errors
///
/// Returns [`GatewayError::OperationNotFound`] if no such operation
/// exists.
#[utoipa::path(
    get,
    path = "/api/v1/operations/{operation_id}",
    tag = "Operations",
    summary = "Get operation status",
    description = "Returns one queued operation with its retry bookkeeping.",
    params(
        ("operation_id" = uuid::Uuid, Path, description = "Operation UUID"),
    ),
    responses(
        (status = 200, description = "Operation record", body = OperationDto),
        (status = 404, description = "Operation not found", body = ErrorResponse),
    )
)]
pub async fn get_operation(
    State(state): State<AppState>,
    Path(operation_id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, GatewayError> {
    let operation = state
        .queue_service
        .get(OperationId::from(operation_id))
        .await?;
    Ok(Json(OperationDto::from(operation)))
}

/// `POST /operations/:id/cancel` — Cancel a pending operation.
///
/// # Errors
///
/// Returns [`GatewayError::OperationNotFound`] if no such operation
/// exists and [`GatewayError::CancelRejected`] if it is no longer
/// pending.
#[utoipa::path(
    post,
    path = "/api/v1/operations/{operation_id}/cancel",
    tag = "Operations",
    summary = "Cancel a pending operation",
    description = "Cancels an operation that the drain worker has not picked up yet. An operation that is processing, completed, failed, or already cancelled is left alone and the request is rejected with 409.",
    params(
        ("operation_id" = uuid::Uuid, Path, description = "Operation UUID"),
    ),
    responses(
        (status = 200, description = "Operation cancelled", body = OperationDto),
        (status = 404, description = "Operation not found", body = ErrorResponse),
        (status = 409, description = "Operation is no longer pending", body = ErrorResponse),
    )
)]
pub async fn cancel_operation(
    State(state): State<AppState>,
    Path(operation_id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, GatewayError> {
    let operation = state
        .queue_service
        .cancel(OperationId::from(operation_id))
        .await?;
    Ok(Json(OperationDto::from(operation)))
}

/// `GET /operations/dead-letter` — Operations out of retry budget.
///
/// # Errors
///
/// Returns [`GatewayError`] on internal failures.
#[utoipa::path(
    get,
    path = "/api/v1/operations/dead-letter",
    tag = "Operations",
    summary = "List dead-lettered operations",
    description = "Returns operations whose retry budget is spent, most recently failed first. These rows stay for support inspection and are never retried automatically.",
    params(DeadLetterParams),
    responses(
        (status = 200, description = "Dead-lettered operations", body = DeadLetterResponse),
    )
)]
pub async fn dead_letter(
    State(state): State<AppState>,
    Query(params): Query<DeadLetterParams>,
) -> Result<impl IntoResponse, GatewayError> {
    let operations = state.queue_service.dead_letter(params.limit).await?;
    let data: Vec<OperationDto> = operations.into_iter().map(OperationDto::from).collect();
    let total = data.len();
    Ok(Json(DeadLetterResponse { data, total }))
}

/// `POST /operations/drain` — Run one drain cycle.
///
/// # Errors
///
/// Returns [`GatewayError`] when the claim phase fails.
#[utoipa::path(
    post,
    path = "/api/v1/operations/drain",
    tag = "Operations",
    summary = "Drain due operations",
    description = "Scheduler hook: reclaims abandoned work, re-queues due retries, claims a batch of pending operations and replays each one through conflict resolution and the circuit breaker. Safe to call at any interval; an empty queue is a cheap no-op.",
    responses(
        (status = 200, description = "Drain cycle summary", body = DrainResponse),
    )
)]
pub async fn drain_operations(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, GatewayError> {
    let report = state.queue_service.drain().await?;
    Ok(Json(DrainResponse::from(report)))
}

/// Offline queue routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/operations", post(enqueue_operation))
        .route("/operations/dead-letter", get(dead_letter))
        .route("/operations/drain", post(drain_operations))
        .route("/operations/{operation_id}", get(get_operation))
        .route("/operations/{operation_id}/cancel", post(cancel_operation))
}
