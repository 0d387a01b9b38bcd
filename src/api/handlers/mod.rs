//! REST endpoint handlers organized by resource.

pub mod device;
pub mod notification;
pub mod operation;
pub mod resilience;
pub mod sync;
pub mod system;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(device::routes())
        .merge(sync::routes())
        .merge(operation::routes())
        .merge(notification::routes())
        .merge(resilience::routes())
}
