//! Collaborator dispatch seam.
//!
//! Winning offline operations are applied to the collaborator service
//! that owns the entity (booking, profile, preferences). The trait
//! keeps drain logic testable without a network; the production
//! implementation posts JSON to the configured base URLs.

use std::fmt;

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;

use crate::config::GatewayConfig;
use crate::domain::OfflineOperation;

/// Applies a winning offline operation at its downstream collaborator.
#[async_trait]
pub trait OperationDispatcher: fmt::Debug + Send + Sync {
    /// Applies the operation downstream.
    ///
    /// Implementations must treat `idempotency_key` as an apply-once
    /// token: the drain worker may re-dispatch the same operation
    /// after a crash.
    ///
    /// # Errors
    ///
    /// Any transport or downstream error; the drain worker turns it
    /// into a retry with backoff.
    async fn apply(&self, operation: &OfflineOperation, idempotency_key: &str)
    -> anyhow::Result<()>;
}

/// JSON body posted to a collaborator's apply endpoint.
#[derive(Debug, Serialize)]
struct ApplyRequest<'a> {
    operation_type: &'a str,
    entity_type: &'a str,
    entity_id: uuid::Uuid,
    updated_at: chrono::DateTime<chrono::Utc>,
    data: &'a serde_json::Value,
}

/// Dispatcher that posts operations to collaborator base URLs.
#[derive(Debug, Clone)]
pub struct HttpOperationDispatcher {
    client: reqwest::Client,
    booking_api_url: String,
    profile_api_url: String,
    preferences_api_url: String,
}

impl HttpOperationDispatcher {
    /// Builds a dispatcher from the configured collaborator URLs.
    #[must_use]
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            booking_api_url: config.booking_api_url.clone(),
            profile_api_url: config.profile_api_url.clone(),
            preferences_api_url: config.preferences_api_url.clone(),
        }
    }

    /// Base URL for a collaborator service name.
    ///
    /// The operation union only produces the three known names; the
    /// booking API doubles as the fallback so a future variant fails
    /// loudly downstream rather than silently here.
    fn base_url(&self, service: &str) -> &str {
        match service {
            "profile-api" => &self.profile_api_url,
            "preferences-api" => &self.preferences_api_url,
            _ => &self.booking_api_url,
        }
    }
}

#[async_trait]
impl OperationDispatcher for HttpOperationDispatcher {
    async fn apply(
        &self,
        operation: &OfflineOperation,
        idempotency_key: &str,
    ) -> anyhow::Result<()> {
        let service = operation.downstream_service();
        let write = operation.write();
        let url = format!("{}/internal/sync/apply", self.base_url(service));

        let response = self
            .client
            .post(&url)
            .header("Idempotency-Key", idempotency_key)
            .json(&ApplyRequest {
                operation_type: operation.operation_type(),
                entity_type: operation.entity_type().as_str(),
                entity_id: write.entity_id,
                updated_at: write.updated_at,
                data: &write.data,
            })
            .send()
            .await
            .with_context(|| format!("posting {} to {service}", operation.operation_type()))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!(
                "{service} rejected {} with {status}",
                operation.operation_type()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn dispatcher() -> HttpOperationDispatcher {
        HttpOperationDispatcher {
            client: reqwest::Client::new(),
            booking_api_url: "http://booking.internal".to_string(),
            profile_api_url: "http://profile.internal".to_string(),
            preferences_api_url: "http://preferences.internal".to_string(),
        }
    }

    #[test]
    fn operations_route_to_their_collaborator_url() {
        let d = dispatcher();
        assert_eq!(d.base_url("booking-api"), "http://booking.internal");
        assert_eq!(d.base_url("profile-api"), "http://profile.internal");
        assert_eq!(d.base_url("preferences-api"), "http://preferences.internal");
    }

    #[test]
    fn apply_request_serializes_flat_payload() {
        let entity_id = uuid::Uuid::new_v4();
        let data = serde_json::json!({"service": "haircut"});
        let body = ApplyRequest {
            operation_type: "create_booking",
            entity_type: "booking",
            entity_id,
            updated_at: chrono::Utc::now(),
            data: &data,
        };
        let Ok(json) = serde_json::to_value(&body) else {
            panic!("serialization failed");
        };
        assert_eq!(json.get("operation_type"), Some(&serde_json::json!("create_booking")));
        assert_eq!(
            json.get("entity_id"),
            Some(&serde_json::json!(entity_id.to_string()))
        );
    }
}
