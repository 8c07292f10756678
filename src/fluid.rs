//! Fluid platform API client and the default event processor.
//!
//! [`FluidClient`] is a thin reqwest wrapper for the handful of outbound
//! calls the droplet makes. [`DefaultEventProcessor`] is the downstream
//! handler wired into the processing engine in production: system events
//! drive installation lifecycle transitions, order events are acknowledged
//! back to the platform, and everything else (including unknown types) is
//! stored without further action.

use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};

use crate::crypto::CryptoKey;
use crate::error::ProcessingError;
use crate::events::{EventCategory, FluidEventType};
use crate::models::{installation, webhook_event};
use crate::processing::EventProcessor;
use crate::repositories::activity_log::{ActivityLogRepository, NewActivity, activity};
use crate::repositories::installation::{InstallationRepository, NewInstallation};

/// Fluid platform API errors
#[derive(Debug, Error)]
pub enum FluidError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },
}

impl From<FluidError> for ProcessingError {
    fn from(error: FluidError) -> Self {
        ProcessingError::Downstream(error.to_string())
    }
}

/// Client for the Fluid platform API.
#[derive(Debug, Clone)]
pub struct FluidClient {
    client: reqwest::Client,
    base_url: String,
}

impl FluidClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Fetch company details for an installation.
    pub async fn fetch_company(
        &self,
        auth_token: &str,
        company_id: &str,
    ) -> Result<JsonValue, FluidError> {
        let response = self
            .client
            .get(format!("{}/api/companies/{}", self.base_url, company_id))
            .header("Authorization", format!("Bearer {}", auth_token))
            .header("Accept", "application/json")
            .send()
            .await?;

        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(FluidError::Api {
                status,
                message: format!("company fetch failed: {}", body),
            })
        }
    }

    /// Acknowledge receipt of an event back to the platform.
    pub async fn acknowledge_event(
        &self,
        auth_token: &str,
        external_event_id: &str,
    ) -> Result<(), FluidError> {
        let response = self
            .client
            .post(format!(
                "{}/api/webhooks/events/{}/ack",
                self.base_url, external_event_id
            ))
            .header("Authorization", format!("Bearer {}", auth_token))
            .header("Accept", "application/json")
            .json(&serde_json::json!({ "acknowledged": true }))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(FluidError::Api {
                status,
                message: format!("event acknowledgement failed: {}", body),
            })
        }
    }
}

/// Production [`EventProcessor`]: lifecycle transitions for system events,
/// platform acknowledgements for order events, no-op for the rest.
pub struct DefaultEventProcessor {
    db: DatabaseConnection,
    key: CryptoKey,
    client: FluidClient,
}

impl DefaultEventProcessor {
    pub fn new(db: DatabaseConnection, key: CryptoKey, client: FluidClient) -> Self {
        Self { db, key, client }
    }

    async fn handle_install(
        &self,
        installation: &installation::Model,
        payload: &JsonValue,
    ) -> Result<(), ProcessingError> {
        let str_field = |names: &[&str]| -> Option<String> {
            names
                .iter()
                .find_map(|n| payload.get(n).and_then(|v| v.as_str()))
                .map(str::to_string)
        };

        let company_id = payload
            .get("company")
            .and_then(|c| c.get("id"))
            .or_else(|| payload.get("company_id"))
            .map(|v| match v {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| installation.company_id.clone());

        let auth_token = str_field(&["auth_token", "authentication_token"]);
        let mut company_metadata = payload.get("company").cloned();

        // Company details are a cache; a fetch failure must not fail the
        // install.
        if company_metadata.is_none()
            && let Some(token) = &auth_token
        {
            match self.client.fetch_company(token, &company_id).await {
                Ok(info) => company_metadata = Some(info),
                Err(err) => {
                    warn!(company_id = %company_id, error = %err, "company fetch failed on install");
                }
            }
        }

        let repo = InstallationRepository::new(&self.db);
        let updated = repo
            .upsert_from_install(
                &self.key,
                NewInstallation {
                    installation_id: installation.installation_id.clone(),
                    company_id,
                    auth_token,
                    api_key: str_field(&["api_key"]),
                    webhook_secret: str_field(&["webhook_secret", "webhook_auth_token"])
                        .or_else(|| installation.webhook_secret.clone()),
                    settings: payload.get("settings").cloned(),
                    company_metadata,
                },
            )
            .await
            .map_err(|e| ProcessingError::Downstream(e.to_string()))?;

        ActivityLogRepository::new(&self.db)
            .record_best_effort(NewActivity::success(
                updated.id,
                activity::DROPLET_INSTALLED,
                format!("droplet installed for company {}", updated.company_id),
            ))
            .await;
        Ok(())
    }

    async fn handle_uninstall(
        &self,
        installation: &installation::Model,
    ) -> Result<(), ProcessingError> {
        let repo = InstallationRepository::new(&self.db);
        let updated = repo
            .mark_uninstalled(installation.clone())
            .await
            .map_err(|e| ProcessingError::Downstream(e.to_string()))?;

        ActivityLogRepository::new(&self.db)
            .record_best_effort(NewActivity::success(
                updated.id,
                activity::DROPLET_UNINSTALLED,
                "droplet uninstalled, credentials dropped",
            ))
            .await;
        Ok(())
    }

    async fn handle_auth_revoked(
        &self,
        installation: &installation::Model,
    ) -> Result<(), ProcessingError> {
        let repo = InstallationRepository::new(&self.db);
        repo.mark_suspended(installation.clone())
            .await
            .map_err(|e| ProcessingError::Downstream(e.to_string()))?;
        Ok(())
    }

    async fn handle_order(
        &self,
        installation: &installation::Model,
        event: &webhook_event::Model,
    ) -> Result<(), ProcessingError> {
        let repo = InstallationRepository::new(&self.db);
        let Some(token) = repo
            .decrypt_auth_token(&self.key, installation)
            .await
            .map_err(|e| ProcessingError::Downstream(e.to_string()))?
        else {
            debug!(
                installation_id = %installation.installation_id,
                "no platform token stored, skipping acknowledgement"
            );
            return Ok(());
        };

        if let Some(external_event_id) = &event.external_event_id {
            self.client
                .acknowledge_event(&token, external_event_id)
                .await?;
        }

        repo.touch_last_synced(installation.clone())
            .await
            .map_err(|e| ProcessingError::Downstream(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl EventProcessor for DefaultEventProcessor {
    async fn process(
        &self,
        installation: &installation::Model,
        event: &webhook_event::Model,
    ) -> Result<(), ProcessingError> {
        let event_type = FluidEventType::from_wire(&event.event_type);
        match &event_type {
            FluidEventType::DropletInstalled => {
                self.handle_install(installation, &event.payload).await
            }
            FluidEventType::DropletUninstalled => self.handle_uninstall(installation).await,
            FluidEventType::AuthRevoked => self.handle_auth_revoked(installation).await,
            other if other.category() == EventCategory::Order => {
                self.handle_order(installation, event).await
            }
            other => {
                debug!(event_type = %other.as_wire(), "event stored, no downstream action");
                Ok(())
            }
        }
    }
}
