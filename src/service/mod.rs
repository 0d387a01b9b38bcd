//! Service layer: business logic orchestration.
//!
//! Each service owns one concern of the gateway — device registry,
//! sync ledger, offline queue, notification fanout, resilience — and
//! emits events through the [`super::domain::EventBus`]. Outbound
//! side effects go through the [`dispatcher`] and [`push`] seams so
//! workers can be exercised without live collaborators.

pub mod device_service;
pub mod dispatcher;
pub mod notification_service;
pub mod push;
pub mod queue_service;
pub mod resilience_service;
pub mod sync_service;

pub use device_service::DeviceService;
pub use dispatcher::{HttpOperationDispatcher, OperationDispatcher};
pub use notification_service::{DeliveryReport, NotificationService};
pub use push::{LoggingPushTransport, PushTransport};
pub use queue_service::{DrainReport, QueuePolicy, QueueService};
pub use resilience_service::ResilienceService;
pub use sync_service::{ResolvedWrite, SyncService};
