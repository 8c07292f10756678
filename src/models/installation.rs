//! Installation entity model
//!
//! This module contains the SeaORM entity model for the installations table,
//! one row per droplet installation on a Fluid company (the tenant boundary
//! for every other table).

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Lifecycle states an installation moves through.
pub mod status {
    pub const PENDING: &str = "pending";
    pub const ACTIVE: &str = "active";
    pub const SUSPENDED: &str = "suspended";
    pub const INACTIVE: &str = "inactive";
}

/// Installation entity representing a droplet installed on a Fluid company
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "installations")]
pub struct Model {
    /// Unique identifier for the installation row (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Platform-assigned installation identifier used in webhook URLs
    pub installation_id: String,

    /// Fluid company (tenant) this installation belongs to
    pub company_id: String,

    /// Encrypted Fluid platform token for outbound API calls
    #[sea_orm(column_type = "VarBinary(StringLen::None)", nullable)]
    pub auth_token_ciphertext: Option<Vec<u8>>,

    /// Encrypted customer API key used to authenticate status queries
    #[sea_orm(column_type = "VarBinary(StringLen::None)", nullable)]
    pub api_key_ciphertext: Option<Vec<u8>>,

    /// Shared secret for verifying inbound webhook signatures
    pub webhook_secret: Option<String>,

    /// Current lifecycle status (pending, active, suspended, inactive)
    pub status: String,

    /// Installation-scoped settings chosen by the customer
    #[sea_orm(column_type = "JsonBinary")]
    pub settings: Option<JsonValue>,

    /// Company details captured at install time
    #[sea_orm(column_type = "JsonBinary")]
    pub company_metadata: Option<JsonValue>,

    /// Timestamp when the installation row was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the installation row was last updated
    pub updated_at: DateTimeWithTimeZone,

    /// Timestamp of the last successful outbound sync, if any
    pub last_synced_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::webhook_event::Entity")]
    WebhookEvents,
    #[sea_orm(has_many = "super::activity_log::Entity")]
    ActivityLogs,
    #[sea_orm(has_many = "super::custom_data::Entity")]
    CustomData,
}

impl Related<super::webhook_event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WebhookEvents.def()
    }
}

impl Related<super::activity_log::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ActivityLogs.def()
    }
}

impl Related<super::custom_data::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CustomData.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Whether the installation should accept webhook traffic.
    pub fn is_active(&self) -> bool {
        self.status == status::ACTIVE
    }
}
