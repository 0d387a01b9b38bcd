//! Data Transfer Objects for REST request/response serialization.
//!
//! Request DTOs convert into domain inputs via `From`/`into_*`
//! helpers; response DTOs mirror domain records minus internal fields
//! (push tokens, sealed credential material, claim bookkeeping).

pub mod device_dto;
pub mod notification_dto;
pub mod operation_dto;
pub mod resilience_dto;
pub mod sync_dto;

pub use device_dto::*;
pub use notification_dto::*;
pub use operation_dto::*;
pub use resilience_dto::*;
pub use sync_dto::*;
