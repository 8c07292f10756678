//! # Custom Data Repository
//!
//! Tenant-scoped key/value storage keyed by (installation, data_type,
//! data_key). Writes are last-writer-wins upserts.

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::models::custom_data::{ActiveModel, Column, Entity as CustomData, Model};

/// Repository for CustomData database operations
pub struct CustomDataRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> CustomDataRepository<'a> {
    /// Create a new CustomDataRepository with the given database connection
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insert or replace the value stored under (data_type, data_key).
    pub async fn upsert(
        &self,
        installation_id: Uuid,
        data_type: &str,
        data_key: &str,
        value: JsonValue,
    ) -> Result<Model, DbErr> {
        let now = Utc::now();
        let active = ActiveModel {
            id: Set(Uuid::new_v4()),
            installation_id: Set(installation_id),
            data_type: Set(data_type.to_string()),
            data_key: Set(data_key.to_string()),
            data_value: Set(value),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        CustomData::insert(active)
            .on_conflict(
                OnConflict::columns([Column::InstallationId, Column::DataType, Column::DataKey])
                    .update_columns([Column::DataValue, Column::UpdatedAt])
                    .to_owned(),
            )
            .exec(self.db)
            .await?;

        self.get(installation_id, data_type, data_key)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("custom data {}/{}", data_type, data_key)))
    }

    /// Fetch the value stored under (data_type, data_key), if any.
    pub async fn get(
        &self,
        installation_id: Uuid,
        data_type: &str,
        data_key: &str,
    ) -> Result<Option<Model>, DbErr> {
        CustomData::find()
            .filter(Column::InstallationId.eq(installation_id))
            .filter(Column::DataType.eq(data_type))
            .filter(Column::DataKey.eq(data_key))
            .one(self.db)
            .await
    }

    /// Remove the value stored under (data_type, data_key).
    pub async fn delete(
        &self,
        installation_id: Uuid,
        data_type: &str,
        data_key: &str,
    ) -> Result<bool, DbErr> {
        let result = CustomData::delete_many()
            .filter(Column::InstallationId.eq(installation_id))
            .filter(Column::DataType.eq(data_type))
            .filter(Column::DataKey.eq(data_key))
            .exec(self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }
}
