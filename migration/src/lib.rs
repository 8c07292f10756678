//! Database migrations for the Fluid droplet gateway.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_06_01_000001_create_installations;
mod m2025_06_01_000002_create_webhook_events;
mod m2025_06_01_000003_create_activity_logs;
mod m2025_06_01_000004_create_custom_data;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_06_01_000001_create_installations::Migration),
            Box::new(m2025_06_01_000002_create_webhook_events::Migration),
            Box::new(m2025_06_01_000003_create_activity_logs::Migration),
            Box::new(m2025_06_01_000004_create_custom_data::Migration),
        ]
    }
}
