//! Migration to create the installations table.
//!
//! Installations are the tenant root: one row per Fluid droplet install,
//! holding encrypted platform credentials, lifecycle status, and cached
//! company metadata. Every other table is scoped to this one.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Installations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Installations::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Installations::InstallationId)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Installations::CompanyId).text().not_null())
                    .col(
                        ColumnDef::new(Installations::AuthTokenCiphertext)
                            .binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Installations::ApiKeyCiphertext)
                            .binary()
                            .null(),
                    )
                    .col(ColumnDef::new(Installations::WebhookSecret).text().null())
                    .col(
                        ColumnDef::new(Installations::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Installations::Settings).json_binary().null())
                    .col(
                        ColumnDef::new(Installations::CompanyMetadata)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Installations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Installations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Installations::LastSyncedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        // External installation identifier must be globally unique
        manager
            .create_index(
                Index::create()
                    .name("idx_installations_installation_id")
                    .table(Installations::Table)
                    .col(Installations::InstallationId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_installations_company_id")
                    .table(Installations::Table)
                    .col(Installations::CompanyId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_installations_installation_id")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(Index::drop().name("idx_installations_company_id").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Installations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Installations {
    Table,
    Id,
    InstallationId,
    CompanyId,
    AuthTokenCiphertext,
    ApiKeyCiphertext,
    WebhookSecret,
    Status,
    Settings,
    CompanyMetadata,
    CreatedAt,
    UpdatedAt,
    LastSyncedAt,
}
