//! ActivityLog entity model
//!
//! This module contains the SeaORM entity model for the activity_logs table,
//! an append-only audit trail of notable actions per installation.

use super::installation::Entity as Installation;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Outcome markers for an activity entry.
pub mod status {
    pub const SUCCESS: &str = "success";
    pub const ERROR: &str = "error";
    pub const WARNING: &str = "warning";
}

/// ActivityLog entity representing one audit trail entry
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "activity_logs")]
pub struct Model {
    /// Unique identifier for the log entry (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Installation the entry belongs to
    pub installation_id: Uuid,

    /// Kind of activity (e.g. webhook_received, event_processed)
    pub activity_type: String,

    /// Human-readable description of what happened
    pub description: String,

    /// Structured detail for the entry
    #[sea_orm(column_type = "JsonBinary")]
    pub details: Option<JsonValue>,

    /// Outcome of the activity (success, error, warning)
    pub status: String,

    /// Timestamp when the entry was recorded
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Installation",
        from = "Column::InstallationId",
        to = "super::installation::Column::Id"
    )]
    Installation,
}

impl Related<Installation> for Entity {
    fn to() -> RelationDef {
        Relation::Installation.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
