//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::service::{
    DeviceService, NotificationService, QueueService, ResilienceService, SyncService,
};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
///
/// Each service holds its own [`EventBus`] clone, so handlers never
/// publish events directly.
///
/// [`EventBus`]: crate::domain::EventBus
#[derive(Debug, Clone)]
pub struct AppState {
    /// Device registry operations.
    pub device_service: Arc<DeviceService>,
    /// Sync ledger and conflict resolution.
    pub sync_service: Arc<SyncService>,
    /// Offline operation queue and drain worker.
    pub queue_service: Arc<QueueService>,
    /// Notification fanout and delivery worker.
    pub notification_service: Arc<NotificationService>,
    /// Credentials, circuit breakers, and health records.
    pub resilience_service: Arc<ResilienceService>,
}
