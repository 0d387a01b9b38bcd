//! Resilience handlers: credential vault, circuit breakers, and
//! service health records.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    ActiveCredentialDto, CircuitDto, CredentialStoredResponse, HealthDto, OutcomeResponse,
    RecordHealthRequest, RecordOutcomeRequest, StoreCredentialRequest,
};
use crate::app_state::AppState;
use crate::domain::HealthProbe;
use crate::error::{ErrorResponse, GatewayError};

/// `POST /resilience/credentials` — Store or rotate a credential.
///
/// # Errors
///
/// Returns [`GatewayError::CryptoError`] when sealing fails.
#[utoipa::path(
    post,
    path = "/api/v1/resilience/credentials",
    tag = "Resilience",
    summary = "Store or rotate a credential",
    description = "Seals the submitted API key (and secret, when given) and stores it as the active credential for the (service, environment) pair. An existing active record is deactivated in the same transaction and the move is written to the audit trail.",
    request_body = StoreCredentialRequest,
    responses(
        (status = 201, description = "Credential stored", body = CredentialStoredResponse),
        (status = 500, description = "Sealing failed", body = ErrorResponse),
    )
)]
pub async fn store_credential(
    State(state): State<AppState>,
    Json(req): Json<StoreCredentialRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let (record, rotated) = state
        .resilience_service
        .store_credential(
            &req.service_name,
            &req.environment,
            &req.api_key,
            req.api_secret.as_deref(),
            req.expires_at,
        )
        .await?;
    let body = CredentialStoredResponse::from_record(record, rotated);
    Ok((StatusCode::CREATED, Json(body)))
}

/// `GET /resilience/credentials/:service/:environment` — Active
/// credential, decrypted.
///
/// # Errors
///
/// Returns [`GatewayError::CredentialNotFound`] when none is stored
/// and [`GatewayError::CredentialExpired`] when the active record is
/// past its expiry.
#[utoipa::path(
    get,
    path = "/api/v1/resilience/credentials/{service}/{environment}",
    tag = "Resilience",
    summary = "Get the active credential",
    description = "Returns the decrypted active credential for a (service, environment) pair. An expired credential fails closed with 410 rather than handing out stale material.",
    params(
        ("service" = String, Path, description = "Downstream service name"),
        ("environment" = String, Path, description = "Deployment environment"),
    ),
    responses(
        (status = 200, description = "Active credential", body = ActiveCredentialDto),
        (status = 404, description = "No credential stored", body = ErrorResponse),
        (status = 410, description = "Credential expired", body = ErrorResponse),
    )
)]
pub async fn get_credential(
    State(state): State<AppState>,
    Path((service, environment)): Path<(String, String)>,
) -> Result<impl IntoResponse, GatewayError> {
    let credential = state
        .resilience_service
        .active_credential(&service, &environment)
        .await?;
    Ok(Json(ActiveCredentialDto::from(credential)))
}

/// `POST /resilience/outcome` — Record a downstream call outcome.
///
/// # Errors
///
/// Returns [`GatewayError`] on internal failures.
#[utoipa::path(
    post,
    path = "/api/v1/resilience/outcome",
    tag = "Resilience",
    summary = "Record a call outcome",
    description = "Feeds one downstream call result into the circuit breaker for the (service, environment) pair, creating the breaker row on first use. Enough consecutive failures open the circuit; a successful probe closes it again.",
    request_body = RecordOutcomeRequest,
    responses(
        (status = 200, description = "Breaker state after the outcome", body = OutcomeResponse),
    )
)]
pub async fn record_outcome(
    State(state): State<AppState>,
    Json(req): Json<RecordOutcomeRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let state_after = state
        .resilience_service
        .record_outcome(&req.service_name, &req.environment, req.success)
        .await?;
    Ok(Json(OutcomeResponse {
        service_name: req.service_name,
        environment: req.environment,
        state: state_after,
    }))
}

/// `GET /resilience/circuits/:service/:environment` — Breaker state.
///
/// # Errors
///
/// Returns [`GatewayError::CircuitNotFound`] when no outcome has ever
/// been recorded for the pair.
#[utoipa::path(
    get,
    path = "/api/v1/resilience/circuits/{service}/{environment}",
    tag = "Resilience",
    summary = "Get circuit breaker state",
    description = "Returns the breaker position, counters, and thresholds for a (service, environment) pair.",
    params(
        ("service" = String, Path, description = "Downstream service name"),
        ("environment" = String, Path, description = "Deployment environment"),
    ),
    responses(
        (status = 200, description = "Breaker state", body = CircuitDto),
        (status = 404, description = "No breaker state recorded", body = ErrorResponse),
    )
)]
pub async fn get_circuit(
    State(state): State<AppState>,
    Path((service, environment)): Path<(String, String)>,
) -> Result<impl IntoResponse, GatewayError> {
    let breaker = state.resilience_service.circuit(&service, &environment).await?;
    Ok(Json(CircuitDto::from(breaker)))
}

/// `POST /resilience/health` — Record a health probe.
///
/// # Errors
///
/// Returns [`GatewayError`] on internal failures.
#[utoipa::path(
    post,
    path = "/api/v1/resilience/health",
    tag = "Resilience",
    summary = "Record a health probe",
    description = "Upserts the health record for a (service, environment) pair. A healthy report resets the consecutive-failure streak and clears the last error; any other status extends the streak.",
    request_body = RecordHealthRequest,
    responses(
        (status = 200, description = "Health record after the probe", body = HealthDto),
    )
)]
pub async fn record_health(
    State(state): State<AppState>,
    Json(req): Json<RecordHealthRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let health = state
        .resilience_service
        .record_health(HealthProbe::from(req))
        .await?;
    Ok(Json(HealthDto::from(health)))
}

/// `GET /resilience/health/:service/:environment` — Health record.
///
/// # Errors
///
/// Returns [`GatewayError::HealthNotFound`] when no probe has been
/// recorded for the pair.
#[utoipa::path(
    get,
    path = "/api/v1/resilience/health/{service}/{environment}",
    tag = "Resilience",
    summary = "Get a service health record",
    description = "Returns the latest probe outcome and failure streak for a (service, environment) pair.",
    params(
        ("service" = String, Path, description = "Downstream service name"),
        ("environment" = String, Path, description = "Deployment environment"),
    ),
    responses(
        (status = 200, description = "Health record", body = HealthDto),
        (status = 404, description = "No health record", body = ErrorResponse),
    )
)]
pub async fn get_health(
    State(state): State<AppState>,
    Path((service, environment)): Path<(String, String)>,
) -> Result<impl IntoResponse, GatewayError> {
    let health = state.resilience_service.health(&service, &environment).await?;
    Ok(Json(HealthDto::from(health)))
}

/// Resilience routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/resilience/credentials", post(store_credential))
        .route(
            "/resilience/credentials/{service}/{environment}",
            get(get_credential),
        )
        .route("/resilience/outcome", post(record_outcome))
        .route(
            "/resilience/circuits/{service}/{environment}",
            get(get_circuit),
        )
        .route("/resilience/health", post(record_health))
        .route(
            "/resilience/health/{service}/{environment}",
            get(get_health),
        )
}
