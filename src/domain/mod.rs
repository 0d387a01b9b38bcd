//! Domain layer: sync records, decision logic, and the event system.
//!
//! This module contains the server-side domain model: device identity,
//! the append-only sync ledger, the last-write-wins conflict decision,
//! the offline operation union, notification fan-out targeting, the
//! resilience primitives (circuit breaker, credential vault, health),
//! and the event bus for broadcasting state changes.

pub mod circuit;
pub mod conflict;
pub mod credential;
pub mod device;
pub mod event;
pub mod event_bus;
pub mod health;
pub mod ledger;
pub mod notification;
pub mod operation;

pub use circuit::{Admission, BreakerPolicy, CircuitBreaker, CircuitState};
pub use conflict::{IncomingWrite, Resolution, ResolutionAction, ServerState};
pub use credential::{
    ActiveCredential, CredentialAuditAction, CredentialCipher, CredentialRecord, SealedSecret,
};
pub use device::{Device, DeviceId, DeviceRegistration, Platform};
pub use event::SyncEvent;
pub use event_bus::EventBus;
pub use health::{HealthProbe, HealthStatus, ServiceHealth};
pub use ledger::{EntityType, LedgerEntry, NewLedgerEntry, SyncEntryStatus, SyncOperation};
pub use notification::{
    DeliveryOutcome, DeliveryStatusMap, NewNotification, Notification, NotificationId,
    NotificationStatus,
};
pub use operation::{OfflineOperation, OperationId, OperationStatus, QueuedOperation};
