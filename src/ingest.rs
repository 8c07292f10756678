//! Webhook ingestion orchestration.
//!
//! [`IngestCoordinator::handle_delivery`] is the single path every inbound
//! delivery takes: resolve the tenant, verify the signature, decode, capture
//! exactly once, then drive one synchronous processing attempt. Duplicates
//! short-circuit before processing, and a failed attempt is still an
//! acknowledged delivery (retries are internal).

use metrics::counter;
use sea_orm::DatabaseConnection;
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::config::ProcessingConfig;
use crate::error::{IngestError, ProcessingError};
use crate::events::{FluidEventType, decode_delivery};
use crate::models::webhook_event;
use crate::processing::{AttemptResult, EventProcessor, ProcessingEngine};
use crate::repositories::activity_log::{ActivityLogRepository, NewActivity, activity};
use crate::repositories::installation::InstallationRepository;
use crate::repositories::webhook_event::{InsertOutcome, NewWebhookEvent, WebhookEventRepository};
use crate::signature::verify_signature;

/// How a delivery was disposed of. All three variants acknowledge with 200;
/// the distinction is internal.
#[derive(Debug)]
pub enum IngestOutcome {
    /// Stored and processed in the synchronous attempt.
    Completed(webhook_event::Model),
    /// Stored; the synchronous attempt failed and retries will follow.
    Accepted(webhook_event::Model),
    /// A row for this (installation, external event id) already existed.
    Duplicate(webhook_event::Model),
}

impl IngestOutcome {
    /// Label for the generic acknowledgement body.
    pub fn status_label(&self) -> &'static str {
        match self {
            Self::Completed(_) => "processed",
            Self::Accepted(_) => "accepted",
            Self::Duplicate(_) => "duplicate",
        }
    }

    pub fn event(&self) -> &webhook_event::Model {
        match self {
            Self::Completed(e) | Self::Accepted(e) | Self::Duplicate(e) => e,
        }
    }
}

/// Orchestrates the ingest pipeline for one delivery at a time.
pub struct IngestCoordinator<'a> {
    db: &'a DatabaseConnection,
    config: ProcessingConfig,
}

impl<'a> IngestCoordinator<'a> {
    pub fn new(db: &'a DatabaseConnection, config: ProcessingConfig) -> Self {
        Self { db, config }
    }

    /// Ingest one delivery.
    ///
    /// Errors map directly to the HTTP surface: `TenantNotFound` 404,
    /// `TenantInactive` 403, `SignatureInvalid` 401, `InvalidPayload` 400.
    /// A `droplet_installed` delivery is exempt from the active-status check
    /// so a pending or previously uninstalled installation can (re)activate.
    pub async fn handle_delivery(
        &self,
        processor: &dyn EventProcessor,
        installation_id: &str,
        raw_body: &[u8],
        signature_header: Option<&str>,
        headers: JsonValue,
    ) -> Result<IngestOutcome, IngestError> {
        let installations = InstallationRepository::new(self.db);
        let activity_log = ActivityLogRepository::new(self.db);

        let installation = match installations.resolve(installation_id).await {
            Ok(installation) => installation,
            Err(err) => {
                if matches!(err, IngestError::TenantNotFound) {
                    counter!("droplet_webhooks_rejected_total").increment(1);
                    warn!(installation_id, "delivery for unknown installation");
                }
                return Err(err);
            }
        };

        if !verify_signature(
            raw_body,
            signature_header,
            installation.webhook_secret.as_deref(),
        ) {
            counter!("droplet_webhooks_rejected_total").increment(1);
            activity_log
                .record_best_effort(NewActivity::warning(
                    installation.id,
                    activity::WEBHOOK_REJECTED,
                    "signature verification failed",
                ))
                .await;
            return Err(IngestError::SignatureInvalid);
        }

        let parsed = decode_delivery(raw_body)?;

        if !installation.is_active() && parsed.event_type != FluidEventType::DropletInstalled {
            counter!("droplet_webhooks_rejected_total").increment(1);
            activity_log
                .record_best_effort(NewActivity::warning(
                    installation.id,
                    activity::WEBHOOK_REJECTED,
                    format!(
                        "{} delivery to {} installation",
                        parsed.event_type.as_wire(),
                        installation.status
                    ),
                ))
                .await;
            return Err(IngestError::TenantInactive);
        }

        let events = WebhookEventRepository::new(self.db);
        let event = match events
            .insert_if_new(NewWebhookEvent {
                installation_id: installation.id,
                external_event_id: parsed.external_event_id.clone(),
                event_type: parsed.event_type.as_wire().to_string(),
                payload: parsed.payload,
                headers,
                signature: signature_header.map(str::to_string),
            })
            .await?
        {
            InsertOutcome::AlreadyExists(existing) => {
                counter!("droplet_webhooks_duplicate_total").increment(1);
                return Ok(IngestOutcome::Duplicate(existing));
            }
            InsertOutcome::Inserted(event) => event,
        };

        counter!("droplet_webhooks_received_total").increment(1);
        activity_log
            .record_best_effort(
                NewActivity::success(
                    installation.id,
                    activity::WEBHOOK_RECEIVED,
                    format!("{} received", event.event_type),
                )
                .with_details(serde_json::json!({ "event_id": event.id })),
            )
            .await;

        let engine = ProcessingEngine::new(self.config.clone());
        match engine
            .attempt(self.db, processor, &installation, event.id)
            .await
        {
            Ok(AttemptResult::Completed(model)) => Ok(IngestOutcome::Completed(model)),
            Ok(AttemptResult::Failed { event: model, .. }) => Ok(IngestOutcome::Accepted(model)),
            // Another worker claimed the fresh row first; it is their attempt
            // now, the delivery itself is still acknowledged.
            Ok(AttemptResult::NotClaimed) => Ok(IngestOutcome::Accepted(event)),
            Err(ProcessingError::Db(db_err)) => Err(IngestError::Db(db_err)),
            Err(other) => {
                warn!(event_id = %event.id, error = %other, "synchronous attempt errored");
                Ok(IngestOutcome::Accepted(event))
            }
        }
    }
}
