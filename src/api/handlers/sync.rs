//! Sync ledger handlers: append, history, conflict resolution.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::dto::{
    AppendLedgerRequest, LedgerEntryDto, LedgerHistoryParams, LedgerHistoryResponse,
    ResolveRequest, ResolveResponse,
};
use crate::app_state::AppState;
use crate::domain::NewLedgerEntry;
use crate::error::{ErrorResponse, GatewayError};

/// `POST /sync/ledger` — Append one entry to the sync ledger.
///
/// # Errors
///
/// Returns [`GatewayError::DeviceNotFound`] for an unregistered
/// device.
#[utoipa::path(
    post,
    path = "/api/v1/sync/ledger",
    tag = "Sync",
    summary = "Append a ledger entry",
    description = "Records one committed entity mutation in the append-only sync ledger. Collaborator services call this after their own write path commits; a winning after-value also advances the entity snapshot used for conflict resolution.",
    request_body = AppendLedgerRequest,
    responses(
        (status = 201, description = "Entry appended", body = LedgerEntryDto),
        (status = 404, description = "Device not found", body = ErrorResponse),
    )
)]
pub async fn append_ledger(
    State(state): State<AppState>,
    Json(req): Json<AppendLedgerRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let entry = state.sync_service.append(NewLedgerEntry::from(req)).await?;
    Ok((StatusCode::CREATED, Json(LedgerEntryDto::from(entry))))
}

/// `GET /sync/ledger` — Read an entity's ledger history.
///
/// # Errors
///
/// Returns [`GatewayError`] on internal failures.
#[utoipa::path(
    get,
    path = "/api/v1/sync/ledger",
    tag = "Sync",
    summary = "Read ledger history",
    description = "Returns the most recent ledger entries for one entity, newest first.",
    params(LedgerHistoryParams),
    responses(
        (status = 200, description = "Ledger entries", body = LedgerHistoryResponse),
        (status = 400, description = "Unknown entity type", body = ErrorResponse),
    )
)]
pub async fn ledger_history(
    State(state): State<AppState>,
    Query(params): Query<LedgerHistoryParams>,
) -> Result<impl IntoResponse, GatewayError> {
    let entries = state
        .sync_service
        .history(params.entity_type, params.entity_id, params.limit)
        .await?;
    let data: Vec<LedgerEntryDto> = entries.into_iter().map(LedgerEntryDto::from).collect();
    let total = data.len();
    Ok(Json(LedgerHistoryResponse { data, total }))
}

/// `POST /sync/resolve` — Resolve a device write against server state.
///
/// # Errors
///
/// Returns [`GatewayError::DeviceNotFound`] for an unregistered
/// device.
#[utoipa::path(
    post,
    path = "/api/v1/sync/resolve",
    tag = "Sync",
    summary = "Resolve a conflicting write",
    description = "Applies last-write-wins between an incoming device write and the current server state. The decision is recorded in the ledger either way; a winning write also advances the entity snapshot. A detected conflict is a normal 200 outcome, not an error.",
    request_body = ResolveRequest,
    responses(
        (status = 200, description = "Resolution decision", body = ResolveResponse),
        (status = 404, description = "Device not found", body = ErrorResponse),
    )
)]
pub async fn resolve_conflict(
    State(state): State<AppState>,
    Json(req): Json<ResolveRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let (device_id, entity_type, write) = req.into_write();
    let resolved = state
        .sync_service
        .resolve(device_id, entity_type, write)
        .await?;
    Ok(Json(ResolveResponse::from(resolved)))
}

/// Sync ledger routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sync/ledger", post(append_ledger).get(ledger_history))
        .route("/sync/resolve", post(resolve_conflict))
}
