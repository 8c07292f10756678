//! Test utilities for database and fixture setup.
//!
//! Provides in-memory SQLite databases with migrations applied and helpers
//! for seeding installations the way the install flow would.

use anyhow::Result;
use fluid_droplet::crypto::CryptoKey;
use fluid_droplet::migration::{Migrator, MigratorTrait};
use fluid_droplet::models::installation;
use fluid_droplet::repositories::installation::{InstallationRepository, NewInstallation};
use sea_orm::{Database, DatabaseConnection};

/// Key every test fixture encrypts credentials with.
pub fn test_crypto_key() -> CryptoKey {
    CryptoKey::new(vec![9u8; 32]).expect("test key is 32 bytes")
}

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Seeds an active installation with a webhook secret and an API key.
#[allow(dead_code)]
pub async fn seed_installation(
    db: &DatabaseConnection,
    installation_id: &str,
    webhook_secret: &str,
    api_key: Option<&str>,
) -> Result<installation::Model> {
    let installation = InstallationRepository::new(db)
        .upsert_from_install(
            &test_crypto_key(),
            NewInstallation {
                installation_id: installation_id.to_string(),
                company_id: "company-42".to_string(),
                auth_token: None,
                api_key: api_key.map(str::to_string),
                webhook_secret: Some(webhook_secret.to_string()),
                settings: None,
                company_metadata: None,
            },
        )
        .await?;
    Ok(installation)
}
