//! # Droplet Handlers
//!
//! Customer-facing status endpoint and the admin cleanup endpoint. Status
//! queries authenticate with the installation's own credentials; cleanup
//! requires the service-wide admin key. Neither response ever carries
//! stored secrets.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::{self, ApiError};
use crate::repositories::activity_log::{NewActivity, activity};
use crate::repositories::{
    ActivityLogRepository, InstallationRepository, WebhookEventRepository,
};
use crate::server::AppState;

/// Header carrying the admin key for maintenance endpoints.
const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Pending installations older than this are considered abandoned handshakes.
const PENDING_ORPHAN_DAYS: i64 = 7;

/// Query parameters for the status endpoint
#[derive(Debug, Deserialize, IntoParams)]
pub struct StatusQuery {
    /// Installation credential (customer API key or platform token)
    #[serde(rename = "fluidApiKey")]
    pub fluid_api_key: Option<String>,
}

/// Per-status webhook event counts
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EventCounts {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
}

/// One recent activity entry
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ActivityEntry {
    pub activity_type: String,
    pub description: String,
    pub status: String,
    pub created_at: String,
}

/// Installation status summary
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DropletStatusResponse {
    pub installation_id: String,
    pub company_id: String,
    pub status: String,
    pub last_synced_at: Option<String>,
    pub event_counts: EventCounts,
    pub recent_activity: Vec<ActivityEntry>,
}

/// Cleanup summary
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CleanupResponse {
    /// Installations removed together with their dependent rows
    pub purged_installations: u64,
}

/// Installation status for the owning customer
#[utoipa::path(
    get,
    path = "/api/droplet/status/{installation_id}",
    params(
        ("installation_id" = String, Path, description = "Installation identifier"),
        StatusQuery,
    ),
    responses(
        (status = 200, description = "Installation summary", body = DropletStatusResponse),
        (status = 401, description = "Authentication required", body = ApiError),
        (status = 404, description = "Installation not found", body = ApiError),
    ),
    tag = "droplet"
)]
pub async fn droplet_status(
    State(state): State<AppState>,
    Path(installation_id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<DropletStatusResponse>, ApiError> {
    let installations = InstallationRepository::new(&state.db);
    let installation = installations
        .find_by_installation_id(&installation_id)
        .await?
        .ok_or_else(|| {
            ApiError::new(
                axum::http::StatusCode::NOT_FOUND,
                "NOT_FOUND",
                "Installation not found",
            )
        })?;

    let presented = query.fluid_api_key.as_deref().unwrap_or_default();
    if presented.is_empty()
        || !installations
            .authenticate(&state.crypto_key, &installation, presented)
            .await?
    {
        ActivityLogRepository::new(&state.db)
            .record_best_effort(NewActivity::warning(
                installation.id,
                activity::AUTH_FAILED,
                "status query with invalid credential",
            ))
            .await;
        return Err(error::unauthorized(None));
    }

    let counts = WebhookEventRepository::new(&state.db)
        .status_counts(installation.id)
        .await?;
    let recent = ActivityLogRepository::new(&state.db)
        .recent(installation.id, 10)
        .await?;

    Ok(Json(DropletStatusResponse {
        installation_id: installation.installation_id,
        company_id: installation.company_id,
        status: installation.status,
        last_synced_at: installation.last_synced_at.map(|t| t.to_rfc3339()),
        event_counts: EventCounts {
            pending: counts.pending,
            processing: counts.processing,
            completed: counts.completed,
            failed: counts.failed,
        },
        recent_activity: recent
            .into_iter()
            .map(|entry| ActivityEntry {
                activity_type: entry.activity_type,
                description: entry.description,
                status: entry.status,
                created_at: entry.created_at.to_rfc3339(),
            })
            .collect(),
    }))
}

/// Purge orphaned installations and their dependent rows
#[utoipa::path(
    post,
    path = "/api/droplet/cleanup",
    params(
        ("X-Admin-Key" = String, Header, description = "Service admin key"),
    ),
    responses(
        (status = 200, description = "Cleanup summary", body = CleanupResponse),
        (status = 401, description = "Authentication required", body = ApiError),
    ),
    tag = "droplet"
)]
pub async fn cleanup(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CleanupResponse>, ApiError> {
    let Some(expected) = state.config.admin_key.as_deref() else {
        // No admin key configured means the endpoint is disabled.
        return Err(error::unauthorized(None));
    };
    let provided = headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if !admin_key_matches(expected, provided) {
        tracing::warn!("cleanup called with invalid admin key");
        return Err(error::unauthorized(None));
    }

    let purged = InstallationRepository::new(&state.db)
        .purge_orphans(chrono::Duration::days(PENDING_ORPHAN_DAYS))
        .await?;
    tracing::info!(purged, "cleanup purged orphaned installations");

    Ok(Json(CleanupResponse {
        purged_installations: purged,
    }))
}

fn admin_key_matches(expected: &str, provided: &str) -> bool {
    if expected.is_empty() || expected.len() != provided.len() {
        return false;
    }
    subtle::ConstantTimeEq::ct_eq(expected.as_bytes(), provided.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_key_matches() {
        assert!(admin_key_matches("admin-key", "admin-key"));
        assert!(!admin_key_matches("admin-key", "admin-kez"));
        assert!(!admin_key_matches("admin-key", "short"));
        assert!(!admin_key_matches("", ""));
    }
}
