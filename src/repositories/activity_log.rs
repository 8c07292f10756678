//! # Activity Log Repository
//!
//! Append-only audit trail. Recording an entry must never fail the request
//! that triggered it, so callers use [`ActivityLogRepository::record_best_effort`]
//! on hot paths and only the admin/read side surfaces errors.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::models::activity_log::{ActiveModel, Column, Entity as ActivityLog, Model, status};

/// Activity kinds recorded by the gateway.
pub mod activity {
    pub const WEBHOOK_RECEIVED: &str = "webhook_received";
    pub const WEBHOOK_REJECTED: &str = "webhook_rejected";
    pub const AUTH_FAILED: &str = "auth_failed";
    pub const EVENT_PROCESSED: &str = "event_processed";
    pub const EVENT_FAILED: &str = "event_failed";
    pub const RETRY_EXHAUSTED: &str = "retry_exhausted";
    pub const DROPLET_INSTALLED: &str = "droplet_installed";
    pub const DROPLET_UNINSTALLED: &str = "droplet_uninstalled";
}

/// One entry to be appended.
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub installation_id: Uuid,
    pub activity_type: String,
    pub description: String,
    pub details: Option<JsonValue>,
    pub status: String,
}

impl NewActivity {
    fn with_status(
        installation_id: Uuid,
        activity_type: &str,
        description: impl Into<String>,
        entry_status: &str,
    ) -> Self {
        Self {
            installation_id,
            activity_type: activity_type.to_string(),
            description: description.into(),
            details: None,
            status: entry_status.to_string(),
        }
    }

    pub fn success(
        installation_id: Uuid,
        activity_type: &str,
        description: impl Into<String>,
    ) -> Self {
        Self::with_status(installation_id, activity_type, description, status::SUCCESS)
    }

    pub fn error(
        installation_id: Uuid,
        activity_type: &str,
        description: impl Into<String>,
    ) -> Self {
        Self::with_status(installation_id, activity_type, description, status::ERROR)
    }

    pub fn warning(
        installation_id: Uuid,
        activity_type: &str,
        description: impl Into<String>,
    ) -> Self {
        Self::with_status(installation_id, activity_type, description, status::WARNING)
    }

    pub fn with_details(mut self, details: JsonValue) -> Self {
        self.details = Some(details);
        self
    }
}

/// Repository for ActivityLog database operations
pub struct ActivityLogRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> ActivityLogRepository<'a> {
    /// Create a new ActivityLogRepository with the given database connection
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Append an entry.
    pub async fn record(&self, entry: NewActivity) -> Result<Model, DbErr> {
        let active = ActiveModel {
            id: Set(Uuid::new_v4()),
            installation_id: Set(entry.installation_id),
            activity_type: Set(entry.activity_type),
            description: Set(entry.description),
            details: Set(entry.details),
            status: Set(entry.status),
            created_at: Set(Utc::now().into()),
        };
        active.insert(self.db).await
    }

    /// Append an entry, logging instead of failing on error.
    pub async fn record_best_effort(&self, entry: NewActivity) {
        let activity_type = entry.activity_type.clone();
        if let Err(err) = self.record(entry).await {
            tracing::warn!(
                activity_type = %activity_type,
                error = %err,
                "failed to record activity entry"
            );
        }
    }

    /// Most recent entries for one installation, newest first.
    pub async fn recent(&self, installation_id: Uuid, limit: u64) -> Result<Vec<Model>, DbErr> {
        ActivityLog::find()
            .filter(Column::InstallationId.eq(installation_id))
            .order_by_desc(Column::CreatedAt)
            .order_by_desc(Column::Id)
            .limit(limit)
            .all(self.db)
            .await
    }
}
