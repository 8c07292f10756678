//! Migration to create the custom_data table.
//!
//! Free-form per-tenant key/value extension store, unique per
//! (installation_id, data_type, data_key).

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CustomData::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CustomData::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CustomData::InstallationId).uuid().not_null())
                    .col(ColumnDef::new(CustomData::DataType).text().not_null())
                    .col(ColumnDef::new(CustomData::DataKey).text().not_null())
                    .col(
                        ColumnDef::new(CustomData::DataValue)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CustomData::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(CustomData::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_custom_data_installation_id")
                            .from(CustomData::Table, CustomData::InstallationId)
                            .to(Installations::Table, Installations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_custom_data_installation_type_key")
                    .table(CustomData::Table)
                    .col(CustomData::InstallationId)
                    .col(CustomData::DataType)
                    .col(CustomData::DataKey)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_custom_data_installation_type_key")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(CustomData::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CustomData {
    Table,
    Id,
    InstallationId,
    DataType,
    DataKey,
    DataValue,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Installations {
    Table,
    Id,
}
