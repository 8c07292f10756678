//! WebhookEvent entity model
//!
//! This module contains the SeaORM entity model for the webhook_events table,
//! the durable record of every delivery accepted from the Fluid platform.

use super::installation::Entity as Installation;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Processing states an event row moves through.
pub mod processing_status {
    pub const PENDING: &str = "pending";
    pub const PROCESSING: &str = "processing";
    pub const COMPLETED: &str = "completed";
    pub const FAILED: &str = "failed";
}

/// WebhookEvent entity representing a single accepted delivery
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "webhook_events")]
pub struct Model {
    /// Unique identifier for the event row (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Installation this delivery was addressed to
    pub installation_id: Uuid,

    /// Platform-assigned event id, the idempotency key when present
    pub external_event_id: Option<String>,

    /// Wire name of the event type (e.g. order_created)
    pub event_type: String,

    /// Raw delivery payload as received
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: JsonValue,

    /// Subset of request headers captured for diagnostics
    #[sea_orm(column_type = "JsonBinary")]
    pub headers: JsonValue,

    /// Signature header value the delivery carried, if any
    pub signature: Option<String>,

    /// Whether a processing attempt has completed successfully
    pub processed: bool,

    /// Current processing status (pending, processing, completed, failed)
    pub processing_status: String,

    /// Message from the most recent failed attempt
    pub error_message: Option<String>,

    /// Number of failed attempts so far
    pub retry_count: i32,

    /// Timestamp when the event row was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the event row was last updated
    pub updated_at: DateTimeWithTimeZone,

    /// Timestamp of the successful attempt, if any
    pub processed_at: Option<DateTimeWithTimeZone>,
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

impl Model {
    /// Whether this row has reached a terminal successful state.
    pub fn is_completed(&self) -> bool {
        self.processing_status == processing_status::COMPLETED
    }
}
