//! Migration to create the activity_logs table.
//!
//! Append-only audit trail of ingestion and processing outcomes, read by
//! dashboards. Never mutated after insert.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ActivityLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ActivityLogs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ActivityLogs::InstallationId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ActivityLogs::ActivityType).text().not_null())
                    .col(ColumnDef::new(ActivityLogs::Description).text().not_null())
                    .col(ColumnDef::new(ActivityLogs::Details).json_binary().null())
                    .col(
                        ColumnDef::new(ActivityLogs::Status)
                            .text()
                            .not_null()
                            .default("success"),
                    )
                    .col(
                        ColumnDef::new(ActivityLogs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_activity_logs_installation_id")
                            .from(ActivityLogs::Table, ActivityLogs::InstallationId)
                            .to(Installations::Table, Installations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_activity_logs_installation_created")
                    .table(ActivityLogs::Table)
                    .col(ActivityLogs::InstallationId)
                    .col(ActivityLogs::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_activity_logs_installation_created")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(ActivityLogs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ActivityLogs {
    Table,
    Id,
    InstallationId,
    ActivityType,
    Description,
    Details,
    Status,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Installations {
    Table,
    Id,
}
