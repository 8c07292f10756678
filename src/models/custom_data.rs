//! CustomData entity model
//!
//! This module contains the SeaORM entity model for the custom_data table,
//! a tenant-scoped key/value store for per-installation state that does not
//! warrant its own table (cursors, caches, feature toggles).

use super::installation::Entity as Installation;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// CustomData entity representing one (data_type, data_key) value per installation
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "custom_data")]
pub struct Model {
    /// Unique identifier for the row (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Installation the value belongs to
    pub installation_id: Uuid,

    /// Namespace for the key (e.g. sync_cursor, preference)
    pub data_type: String,

    /// Key within the namespace
    pub data_key: String,

    /// Stored value
    #[sea_orm(column_type = "JsonBinary")]
    pub data_value: JsonValue,

    /// Timestamp when the row was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the row was last updated
    pub updated_at: DateTimeWithTimeZone,
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
