//! # sync-gateway
//!
//! REST gateway for cross-device synchronization on a multi-device
//! booking platform.
//!
//! The gateway owns the device registry, the append-only sync ledger
//! with last-write-wins conflict resolution, the offline operation
//! queue that replays client writes against downstream services, the
//! notification fan-out worker, and the resilience layer (credential
//! vault, circuit breakers, health records) guarding those downstream
//! calls. Entity data itself lives in the collaborator services; this
//! crate is the coordination layer between devices and them.
//!
//! ## Architecture
//!
//! ```text
//! Devices / collaborator services (HTTP)
//!     │
//!     ├── REST Handlers (api/)
//!     │
//!     ├── DeviceService ─ SyncService ─ QueueService
//!     ├── NotificationService ─ ResilienceService (service/)
//!     ├── EventBus (domain/)
//!     │
//!     ├── PostgreSQL Persistence (persistence/)
//!     │
//!     └── Collaborators: booking-api, profile-api, preferences-api
//! ```
//!
//! Background work (queue drain, notification delivery) runs inside
//! scheduler-invoked request handlers, not resident tasks, so the
//! gateway stays stateless between requests.

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod service;
