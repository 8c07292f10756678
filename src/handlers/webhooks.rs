//! # Webhook Handlers
//!
//! HTTP surface for inbound Fluid webhook deliveries. The handler stays
//! thin: extract the raw body and signature header, hand off to the
//! ingestion coordinator, and translate the outcome into the generic
//! acknowledgement the platform expects. Internal processing detail never
//! appears in the response.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::ingest::IngestCoordinator;
use crate::server::AppState;
use crate::signature::SIGNATURE_HEADER;

/// Request headers captured onto the event row for diagnostics.
const CAPTURED_HEADERS: [&str; 3] = ["content-type", "user-agent", "x-fluid-event"];

/// Generic webhook acknowledgement
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    /// Disposition of the delivery (processed, accepted, duplicate)
    pub status: String,
}

/// Receive a webhook delivery from the Fluid platform
#[utoipa::path(
    post,
    path = "/api/webhook/fluid/{installation_id}",
    params(
        ("installation_id" = String, Path, description = "Target installation identifier"),
        ("X-Fluid-Signature" = String, Header, description = "HMAC-SHA256 delivery signature, sha256=<hex>"),
    ),
    request_body = JsonValue,
    responses(
        (status = 200, description = "Delivery acknowledged", body = WebhookAck),
        (status = 400, description = "Malformed payload", body = ApiError),
        (status = 401, description = "Authentication required", body = ApiError),
        (status = 403, description = "Installation not active", body = ApiError),
        (status = 404, description = "Installation not found", body = ApiError),
    ),
    tag = "webhooks"
)]
pub async fn receive_fluid_webhook(
    State(state): State<AppState>,
    Path(installation_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let coordinator = IngestCoordinator::new(&state.db, state.config.processing.clone());
    let outcome = coordinator
        .handle_delivery(
            state.processor.as_ref(),
            &installation_id,
            &body,
            signature,
            captured_headers(&headers),
        )
        .await?;

    Ok(Json(WebhookAck {
        status: outcome.status_label().to_string(),
    }))
}

/// Allow-listed subset of request headers stored with the event.
fn captured_headers(headers: &HeaderMap) -> JsonValue {
    let mut map = serde_json::Map::new();
    for name in CAPTURED_HEADERS {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            map.insert(name.to_string(), JsonValue::String(value.to_string()));
        }
    }
    JsonValue::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captured_headers_allow_list() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());
        headers.insert("x-fluid-signature", "sha256=abc".parse().unwrap());
        headers.insert("authorization", "Bearer secret".parse().unwrap());

        let captured = captured_headers(&headers);
        assert_eq!(captured["content-type"], "application/json");
        // The signature and any credentials never land in the stored headers.
        assert!(captured.get("x-fluid-signature").is_none());
        assert!(captured.get("authorization").is_none());
    }
}
