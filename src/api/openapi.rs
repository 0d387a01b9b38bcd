//! OpenAPI schema aggregation for the gateway API.
//!
//! Collects all routes and schema types into a single OpenAPI document
//! served at `/api-docs/openapi.json` (and through Swagger UI when the
//! `swagger-ui` feature is enabled).

use utoipa::OpenApi;

use crate::api::dto::{
    ActiveCredentialDto, AppendLedgerRequest, CircuitDto, CredentialStoredResponse,
    DeadLetterResponse, DeliverResponse, DeviceDto, DeviceListResponse, DrainResponse,
    EnqueueOperationRequest, EnqueueOperationResponse, HealthDto, LedgerEntryDto,
    LedgerHistoryResponse, NotificationDto, OperationDto, OutcomeResponse,
    QueueNotificationRequest, RecordHealthRequest, RecordOutcomeRequest, RegisterDeviceRequest,
    ResolveRequest, ResolveResponse, StoreCredentialRequest,
};
use crate::api::handlers::{device, notification, operation, resilience, sync, system};
use crate::domain::{
    CircuitState, DeliveryOutcome, DeviceId, EntityType, HealthStatus, NotificationId,
    NotificationStatus, OperationId, OperationStatus, Platform, ResolutionAction, SyncEntryStatus,
    SyncOperation,
};
use crate::error::{ErrorBody, ErrorResponse};

/// Aggregated OpenAPI document for every gateway endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "sync-gateway",
        version = env!("CARGO_PKG_VERSION"),
        description = "Cross-device synchronization gateway: device registry, sync ledger, offline operation queue, notification fan-out, and downstream resilience"
    ),
    paths(
        system::health_handler,
        system::operation_types_handler,
        device::register_device,
        device::list_devices,
        device::get_device,
        device::deactivate_device,
        sync::append_ledger,
        sync::ledger_history,
        sync::resolve_conflict,
        operation::enqueue_operation,
        operation::get_operation,
        operation::cancel_operation,
        operation::dead_letter,
        operation::drain_operations,
        notification::queue_notification,
        notification::get_notification,
        notification::deliver_notifications,
        resilience::store_credential,
        resilience::get_credential,
        resilience::record_outcome,
        resilience::get_circuit,
        resilience::record_health,
        resilience::get_health
    ),
    components(schemas(
        ErrorResponse,
        ErrorBody,
        DeviceId,
        Platform,
        RegisterDeviceRequest,
        DeviceDto,
        DeviceListResponse,
        EntityType,
        SyncOperation,
        SyncEntryStatus,
        ResolutionAction,
        AppendLedgerRequest,
        LedgerEntryDto,
        LedgerHistoryResponse,
        ResolveRequest,
        ResolveResponse,
        OperationId,
        OperationStatus,
        EnqueueOperationRequest,
        EnqueueOperationResponse,
        OperationDto,
        DeadLetterResponse,
        DrainResponse,
        NotificationId,
        NotificationStatus,
        DeliveryOutcome,
        QueueNotificationRequest,
        NotificationDto,
        DeliverResponse,
        StoreCredentialRequest,
        CredentialStoredResponse,
        ActiveCredentialDto,
        RecordOutcomeRequest,
        OutcomeResponse,
        CircuitState,
        CircuitDto,
        HealthStatus,
        RecordHealthRequest,
        HealthDto
    )),
    tags(
        (name = "System", description = "Health and configuration catalog"),
        (name = "Devices", description = "Device registry"),
        (name = "Sync", description = "Sync ledger and conflict resolution"),
        (name = "Operations", description = "Offline operation queue"),
        (name = "Notifications", description = "Notification fan-out"),
        (name = "Resilience", description = "Credentials, circuit breakers, service health")
    )
)]
pub struct ApiDoc;
