//! System endpoints: health check and the operation type catalog.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app_state::AppState;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
struct HealthResponse {
    status: String,
    timestamp: String,
    version: String,
}

/// `GET /health` — Service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns service health status, version, and current timestamp.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// Supported offline operation type info.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
struct OperationTypeInfo {
    operation_type: &'static str,
    entity_type: &'static str,
    downstream_service: &'static str,
    description: &'static str,
}

/// Dispatch rules for the operation types the offline queue accepts.
/// Must stay in step with [`crate::domain::OfflineOperation`].
const OPERATION_TYPES: [OperationTypeInfo; 4] = [
    OperationTypeInfo {
        operation_type: "create_booking",
        entity_type: "booking",
        downstream_service: "booking-api",
        description: "Create a service booking made while offline",
    },
    OperationTypeInfo {
        operation_type: "cancel_booking",
        entity_type: "booking",
        downstream_service: "booking-api",
        description: "Cancel an existing booking (status update, not a delete)",
    },
    OperationTypeInfo {
        operation_type: "update_profile",
        entity_type: "profile",
        downstream_service: "profile-api",
        description: "Update the user profile",
    },
    OperationTypeInfo {
        operation_type: "update_preferences",
        entity_type: "preferences",
        downstream_service: "preferences-api",
        description: "Update the user preference blob",
    },
];

/// `GET /config/operation-types` — List supported operation types.
#[utoipa::path(
    get,
    path = "/config/operation-types",
    tag = "System",
    summary = "List supported offline operation types",
    description = "Returns metadata for every operation type the offline queue accepts, including the entity it mutates and the downstream service it dispatches to.",
    responses(
        (status = 200, description = "Operation type catalog", body = Vec<OperationTypeInfo>),
    )
)]
pub async fn operation_types_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(OPERATION_TYPES))
}

/// System routes mounted at the root level (not under /api/v1).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/config/operation-types", get(operation_types_handler))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::OfflineOperation;

    #[test]
    fn catalog_covers_every_supported_type() {
        let mut catalog: Vec<&str> = OPERATION_TYPES.iter().map(|t| t.operation_type).collect();
        catalog.sort_unstable();
        let mut supported = OfflineOperation::SUPPORTED_TYPES.to_vec();
        supported.sort_unstable();
        assert_eq!(catalog, supported);
    }
}
