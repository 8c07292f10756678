//! Migration to create the webhook_events table.
//!
//! Append-only record of inbound webhook deliveries. The composite unique
//! index on (installation_id, external_event_id) is the idempotency key for
//! deliveries that carry a platform event id; deliveries without one are
//! never deduplicated (NULLs do not collide in the unique index).

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(WebhookEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WebhookEvents::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(WebhookEvents::InstallationId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WebhookEvents::ExternalEventId)
                            .text()
                            .null(),
                    )
                    .col(ColumnDef::new(WebhookEvents::EventType).text().not_null())
                    .col(
                        ColumnDef::new(WebhookEvents::Payload)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WebhookEvents::Headers)
                            .json_binary()
                            .not_null(),
                    )
                    .col(ColumnDef::new(WebhookEvents::Signature).text().null())
                    .col(
                        ColumnDef::new(WebhookEvents::Processed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(WebhookEvents::ProcessingStatus)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(WebhookEvents::ErrorMessage).text().null())
                    .col(
                        ColumnDef::new(WebhookEvents::RetryCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(WebhookEvents::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(WebhookEvents::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(WebhookEvents::ProcessedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_webhook_events_installation_id")
                            .from(WebhookEvents::Table, WebhookEvents::InstallationId)
                            .to(Installations::Table, Installations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Idempotency key: at most one row per (installation, external event id)
        manager
            .create_index(
                Index::create()
                    .name("idx_webhook_events_installation_external")
                    .table(WebhookEvents::Table)
                    .col(WebhookEvents::InstallationId)
                    .col(WebhookEvents::ExternalEventId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_webhook_events_installation_id")
                    .table(WebhookEvents::Table)
                    .col(WebhookEvents::InstallationId)
                    .to_owned(),
            )
            .await?;

        // Retry sweeps scan by status
        manager
            .create_index(
                Index::create()
                    .name("idx_webhook_events_processing_status")
                    .table(WebhookEvents::Table)
                    .col(WebhookEvents::ProcessingStatus)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_webhook_events_installation_external")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_webhook_events_installation_id")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_webhook_events_processing_status")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(WebhookEvents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum WebhookEvents {
    Table,
    Id,
    InstallationId,
    ExternalEventId,
    EventType,
    Payload,
    Headers,
    Signature,
    Processed,
    ProcessingStatus,
    ErrorMessage,
    RetryCount,
    CreatedAt,
    UpdatedAt,
    ProcessedAt,
}

#[derive(DeriveIden)]
enum Installations {
    Table,
    Id,
}
