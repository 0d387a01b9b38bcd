//! Device registry handlers: register, list, get, deactivate.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{DeviceDto, DeviceListParams, DeviceListResponse, RegisterDeviceRequest};
use crate::app_state::AppState;
use crate::domain::{DeviceId, DeviceRegistration};
use crate::error::{ErrorResponse, GatewayError};

/// `POST /devices` — Register a device or refresh an existing one.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] on a bad installation
/// identifier.
#[utoipa::path(
    post,
    path = "/api/v1/devices",
    tag = "Devices",
    summary = "Register or refresh a device",
    description = "Registers a device for a user. Re-registering the same (user_id, device_identifier) refreshes the existing record in place instead of creating a duplicate, so the call is safe on every app launch.",
    request_body = RegisterDeviceRequest,
    responses(
        (status = 201, description = "Device registered or refreshed", body = DeviceDto),
        (status = 400, description = "Invalid registration", body = ErrorResponse),
    )
)]
pub async fn register_device(
    State(state): State<AppState>,
    Json(req): Json<RegisterDeviceRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let registration = DeviceRegistration::from(req);
    let device = state.device_service.register(registration).await?;
    Ok((StatusCode::CREATED, Json(DeviceDto::from(device))))
}

/// `GET /devices?user_id=` — List a user's devices.
///
/// # Errors
///
/// Returns [`GatewayError`] on internal failures.
#[utoipa::path(
    get,
    path = "/api/v1/devices",
    tag = "Devices",
    summary = "List a user's devices",
    description = "Returns every device registered for the user, active and inactive, ordered by first registration.",
    params(DeviceListParams),
    responses(
        (status = 200, description = "Device list", body = DeviceListResponse),
    )
)]
pub async fn list_devices(
    State(state): State<AppState>,
    Query(params): Query<DeviceListParams>,
) -> Result<impl IntoResponse, GatewayError> {
    let devices = state.device_service.list(params.user_id).await?;
    let data: Vec<DeviceDto> = devices.into_iter().map(DeviceDto::from).collect();
    let total = data.len();
    Ok(Json(DeviceListResponse { data, total }))
}

/// `GET /devices/:id` — Get one device.
///
/// # Errors
///
/// Returns [`GatewayError::DeviceNotFound`] if the device does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/devices/{device_id}",
    tag = "Devices",
    summary = "Get device details",
    description = "Returns one device record by its canonical identifier.",
    params(
        ("device_id" = uuid::Uuid, Path, description = "Device UUID"),
    ),
    responses(
        (status = 200, description = "Device record", body = DeviceDto),
        (status = 404, description = "Device not found", body = ErrorResponse),
    )
)]
pub async fn get_device(
    State(state): State<AppState>,
    Path(device_id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, GatewayError> {
    let device = state.device_service.get(DeviceId::from(device_id)).await?;
    Ok(Json(DeviceDto::from(device)))
}

/// `DELETE /devices/:id` — Soft-deactivate a device.
///
/// # Errors
///
/// Returns [`GatewayError::DeviceNotFound`] if the device does not exist.
#[utoipa::path(
    delete,
    path = "/api/v1/devices/{device_id}",
    tag = "Devices",
    summary = "Deactivate a device",
    description = "Soft-deletes a device. The record stays for ledger attribution but the device no longer receives notification fan-out. Deactivating an already inactive device is a no-op.",
    params(
        ("device_id" = uuid::Uuid, Path, description = "Device UUID"),
    ),
    responses(
        (status = 200, description = "Device deactivated", body = DeviceDto),
        (status = 404, description = "Device not found", body = ErrorResponse),
    )
)]
pub async fn deactivate_device(
    State(state): State<AppState>,
    Path(device_id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, GatewayError> {
    let device = state
        .device_service
        .deactivate(DeviceId::from(device_id))
        .await?;
    Ok(Json(DeviceDto::from(device)))
}

/// Device registry routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/devices", post(register_device).get(list_devices))
        .route("/devices/{device_id}", get(get_device).delete(deactivate_device))
}
