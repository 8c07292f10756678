//! # Installation Repository
//!
//! Data access for installation rows: resolution by the platform-assigned
//! installation id, credential handling (encrypt on write, decrypt on read,
//! constant-time comparison for presented keys), lifecycle transitions, and
//! the purge used by the admin cleanup endpoint.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::crypto::{self, CryptoKey};
use crate::error::IngestError;
use crate::models::installation::{ActiveModel, Column, Entity as Installation, Model, status};

/// Ciphertext AAD field labels. Changing these invalidates stored blobs.
const FIELD_AUTH_TOKEN: &str = "auth_token";
const FIELD_API_KEY: &str = "api_key";

/// Payload captured from a droplet_installed event.
#[derive(Debug, Clone)]
pub struct NewInstallation {
    pub installation_id: String,
    pub company_id: String,
    pub auth_token: Option<String>,
    pub api_key: Option<String>,
    pub webhook_secret: Option<String>,
    pub settings: Option<JsonValue>,
    pub company_metadata: Option<JsonValue>,
}

/// Repository for Installation database operations
pub struct InstallationRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> InstallationRepository<'a> {
    /// Create a new InstallationRepository with the given database connection
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Look up an installation by its platform-assigned identifier.
    pub async fn find_by_installation_id(
        &self,
        installation_id: &str,
    ) -> Result<Option<Model>, DbErr> {
        Installation::find()
            .filter(Column::InstallationId.eq(installation_id))
            .one(self.db)
            .await
    }

    /// Resolve the installation a delivery is addressed to.
    ///
    /// Unknown ids fail with `TenantNotFound`; there is no fallback to any
    /// other installation. The row comes back in whatever status it is in,
    /// since signature verification must happen before status checks.
    pub async fn resolve(&self, installation_id: &str) -> Result<Model, IngestError> {
        self.find_by_installation_id(installation_id)
            .await?
            .ok_or(IngestError::TenantNotFound)
    }

    /// Create or refresh an installation from a droplet_installed event.
    ///
    /// Re-installation of an existing row refreshes credentials and metadata
    /// and reactivates the installation rather than creating a duplicate.
    pub async fn upsert_from_install(
        &self,
        key: &CryptoKey,
        new: NewInstallation,
    ) -> Result<Model, IngestError> {
        let auth_token_ciphertext = match &new.auth_token {
            Some(token) => Some(crypto::encrypt_credential(
                key,
                &new.installation_id,
                FIELD_AUTH_TOKEN,
                token,
            )?),
            None => None,
        };
        let api_key_ciphertext = match &new.api_key {
            Some(api_key) => Some(crypto::encrypt_credential(
                key,
                &new.installation_id,
                FIELD_API_KEY,
                api_key,
            )?),
            None => None,
        };

        let now = Utc::now();
        match self.find_by_installation_id(&new.installation_id).await? {
            Some(existing) => {
                let mut active: ActiveModel = existing.into();
                active.company_id = Set(new.company_id);
                active.auth_token_ciphertext = Set(auth_token_ciphertext);
                active.api_key_ciphertext = Set(api_key_ciphertext);
                active.webhook_secret = Set(new.webhook_secret);
                active.status = Set(status::ACTIVE.to_string());
                active.settings = Set(new.settings);
                active.company_metadata = Set(new.company_metadata);
                active.updated_at = Set(now.into());
                Ok(active.update(self.db).await?)
            }
            None => {
                let active = ActiveModel {
                    id: Set(Uuid::new_v4()),
                    installation_id: Set(new.installation_id),
                    company_id: Set(new.company_id),
                    auth_token_ciphertext: Set(auth_token_ciphertext),
                    api_key_ciphertext: Set(api_key_ciphertext),
                    webhook_secret: Set(new.webhook_secret),
                    status: Set(status::ACTIVE.to_string()),
                    settings: Set(new.settings),
                    company_metadata: Set(new.company_metadata),
                    created_at: Set(now.into()),
                    updated_at: Set(now.into()),
                    last_synced_at: Set(None),
                };
                Ok(active.insert(self.db).await?)
            }
        }
    }

    /// Compare a presented key against the stored credentials.
    ///
    /// Both the customer API key and the platform token are decrypted and
    /// compared in constant time; either match authorizes. Missing stored
    /// credentials authenticate nothing. Decryption failures surface as
    /// errors rather than a silent reject because they indicate key rotation
    /// or data corruption.
    pub async fn authenticate(
        &self,
        key: &CryptoKey,
        installation: &Model,
        presented: &str,
    ) -> Result<bool, IngestError> {
        let candidates = [
            (FIELD_API_KEY, &installation.api_key_ciphertext),
            (FIELD_AUTH_TOKEN, &installation.auth_token_ciphertext),
        ];

        for (field, ciphertext) in candidates {
            let Some(ciphertext) = ciphertext else {
                continue;
            };
            let stored = crypto::decrypt_credential(
                key,
                &installation.installation_id,
                field,
                ciphertext,
            )?;
            if constant_time_str_eq(&stored, presented) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Decrypt the stored Fluid platform token for outbound API calls.
    pub async fn decrypt_auth_token(
        &self,
        key: &CryptoKey,
        installation: &Model,
    ) -> Result<Option<String>, IngestError> {
        match &installation.auth_token_ciphertext {
            Some(ciphertext) => Ok(Some(crypto::decrypt_credential(
                key,
                &installation.installation_id,
                FIELD_AUTH_TOKEN,
                ciphertext,
            )?)),
            None => Ok(None),
        }
    }

    /// Replace stored credentials with freshly encrypted values.
    ///
    /// The update is guarded by the snapshot's `updated_at`, so a rotation
    /// working from a stale row cannot overwrite a newer rotation. Returns
    /// `None` when the guard matched nothing; callers re-read and retry.
    pub async fn rotate_credentials(
        &self,
        key: &CryptoKey,
        installation: &Model,
        auth_token: Option<&str>,
        api_key: Option<&str>,
    ) -> Result<Option<Model>, IngestError> {
        let mut update = Installation::update_many()
            .filter(Column::Id.eq(installation.id))
            .filter(Column::UpdatedAt.eq(installation.updated_at));

        if let Some(token) = auth_token {
            let ciphertext = crypto::encrypt_credential(
                key,
                &installation.installation_id,
                FIELD_AUTH_TOKEN,
                token,
            )?;
            update = update.col_expr(Column::AuthTokenCiphertext, Expr::value(ciphertext));
        }
        if let Some(api_key) = api_key {
            let ciphertext = crypto::encrypt_credential(
                key,
                &installation.installation_id,
                FIELD_API_KEY,
                api_key,
            )?;
            update = update.col_expr(Column::ApiKeyCiphertext, Expr::value(ciphertext));
        }
        update = update.col_expr(Column::UpdatedAt, Expr::value(Utc::now()));

        let result = update.exec(self.db).await?;
        if result.rows_affected == 0 {
            return Ok(None);
        }
        Ok(Installation::find_by_id(installation.id).one(self.db).await?)
    }

    /// Mark an installation inactive and drop its credentials.
    ///
    /// Event history is kept for audit until the admin cleanup purges it.
    pub async fn mark_uninstalled(&self, installation: Model) -> Result<Model, DbErr> {
        self.deactivate(installation, status::INACTIVE).await
    }

    /// Suspend an installation whose platform authorization was revoked.
    pub async fn mark_suspended(&self, installation: Model) -> Result<Model, DbErr> {
        self.deactivate(installation, status::SUSPENDED).await
    }

    async fn deactivate(&self, installation: Model, new_status: &str) -> Result<Model, DbErr> {
        let mut active: ActiveModel = installation.into();
        active.status = Set(new_status.to_string());
        active.auth_token_ciphertext = Set(None);
        active.api_key_ciphertext = Set(None);
        active.updated_at = Set(Utc::now().into());
        active.update(self.db).await
    }

    /// Record a successful outbound sync.
    pub async fn touch_last_synced(&self, installation: Model) -> Result<Model, DbErr> {
        let now = Utc::now();
        let mut active: ActiveModel = installation.into();
        active.last_synced_at = Set(Some(now.into()));
        active.updated_at = Set(now.into());
        active.update(self.db).await
    }

    /// Delete orphaned installations and, via cascade, all their rows.
    ///
    /// An installation is orphaned when it was uninstalled (inactive), has
    /// lost its company id, or never completed the install handshake within
    /// the cutoff. Returns the number of installations removed.
    pub async fn purge_orphans(&self, pending_older_than: chrono::Duration) -> Result<u64, DbErr> {
        let cutoff = Utc::now() - pending_older_than;
        let result = Installation::delete_many()
            .filter(
                sea_orm::Condition::any()
                    .add(Column::Status.eq(status::INACTIVE))
                    .add(Column::CompanyId.eq(""))
                    .add(
                        sea_orm::Condition::all()
                            .add(Column::Status.eq(status::PENDING))
                            .add(Column::CreatedAt.lt(cutoff)),
                    ),
            )
            .exec(self.db)
            .await?;
        Ok(result.rows_affected)
    }
}

/// Constant-time string equality. Length differences still return early;
/// the secret's length is not considered sensitive here.
fn constant_time_str_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    subtle::ConstantTimeEq::ct_eq(a.as_bytes(), b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::{Database, PaginatorTrait};

    async fn setup_db() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("Failed to open test DB");
        Migrator::up(&db, None).await.expect("Failed to migrate");
        db
    }

    fn test_key() -> CryptoKey {
        CryptoKey::new(vec![7u8; 32]).expect("valid test key")
    }

    fn install_payload(installation_id: &str) -> NewInstallation {
        NewInstallation {
            installation_id: installation_id.to_string(),
            company_id: "company-1".to_string(),
            auth_token: Some("fluid-token".to_string()),
            api_key: Some("customer-api-key".to_string()),
            webhook_secret: Some("wh-secret".to_string()),
            settings: None,
            company_metadata: Some(serde_json::json!({"name": "Acme"})),
        }
    }

    #[tokio::test]
    async fn test_upsert_creates_active_installation() {
        let db = setup_db().await;
        let repo = InstallationRepository::new(&db);
        let key = test_key();

        let model = repo
            .upsert_from_install(&key, install_payload("inst-1"))
            .await
            .unwrap();

        assert_eq!(model.installation_id, "inst-1");
        assert_eq!(model.status, status::ACTIVE);
        assert!(model.auth_token_ciphertext.is_some());

        // Ciphertext must not contain the plaintext
        let blob = model.auth_token_ciphertext.as_ref().unwrap();
        assert!(!blob.windows(11).any(|w| w == b"fluid-token"));
    }

    #[tokio::test]
    async fn test_upsert_reinstall_updates_in_place() {
        let db = setup_db().await;
        let repo = InstallationRepository::new(&db);
        let key = test_key();

        let first = repo
            .upsert_from_install(&key, install_payload("inst-1"))
            .await
            .unwrap();
        let uninstalled = repo.mark_uninstalled(first.clone()).await.unwrap();
        assert_eq!(uninstalled.status, status::INACTIVE);

        let second = repo
            .upsert_from_install(&key, install_payload("inst-1"))
            .await
            .unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.status, status::ACTIVE);
        assert_eq!(Installation::find().count(&db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_authenticate_accepts_either_credential() {
        let db = setup_db().await;
        let repo = InstallationRepository::new(&db);
        let key = test_key();

        let model = repo
            .upsert_from_install(&key, install_payload("inst-1"))
            .await
            .unwrap();

        assert!(
            repo.authenticate(&key, &model, "customer-api-key")
                .await
                .unwrap()
        );
        assert!(repo.authenticate(&key, &model, "fluid-token").await.unwrap());
        assert!(!repo.authenticate(&key, &model, "wrong-key").await.unwrap());
        assert!(!repo.authenticate(&key, &model, "").await.unwrap());
    }

    #[tokio::test]
    async fn test_authenticate_without_stored_credentials_rejects() {
        let db = setup_db().await;
        let repo = InstallationRepository::new(&db);
        let key = test_key();

        let mut payload = install_payload("inst-1");
        payload.api_key = None;
        payload.auth_token = None;
        let model = repo.upsert_from_install(&key, payload).await.unwrap();

        assert!(!repo.authenticate(&key, &model, "anything").await.unwrap());
    }

    #[tokio::test]
    async fn test_resolve_finds_rows_in_any_status() {
        let db = setup_db().await;
        let repo = InstallationRepository::new(&db);
        let key = test_key();

        let model = repo
            .upsert_from_install(&key, install_payload("inst-1"))
            .await
            .unwrap();
        assert!(repo.resolve("inst-1").await.is_ok());

        // Inactive rows still resolve; the status check belongs downstream.
        repo.mark_uninstalled(model).await.unwrap();
        assert!(repo.resolve("inst-1").await.is_ok());

        assert!(matches!(
            repo.resolve("inst-unknown").await,
            Err(IngestError::TenantNotFound)
        ));
    }

    #[tokio::test]
    async fn test_upsert_returns_row_findable_by_generated_id() {
        let db = setup_db().await;
        let repo = InstallationRepository::new(&db);
        let key = test_key();

        let model = repo
            .upsert_from_install(&key, install_payload("inst-1"))
            .await
            .unwrap();

        // The uuid primary key is assigned client-side, never by the database.
        let fetched = Installation::find_by_id(model.id)
            .one(&db)
            .await
            .unwrap()
            .expect("row exists under its returned id");
        assert_eq!(fetched.installation_id, "inst-1");
    }

    #[tokio::test]
    async fn test_decrypt_with_wrong_master_key_errors() {
        let db = setup_db().await;
        let repo = InstallationRepository::new(&db);
        let key = test_key();

        let model = repo
            .upsert_from_install(&key, install_payload("inst-1"))
            .await
            .unwrap();

        let other_key = CryptoKey::new(vec![9u8; 32]).unwrap();
        let result = repo.decrypt_auth_token(&other_key, &model).await;
        assert!(matches!(result, Err(IngestError::Decrypt(_))));
    }

    #[tokio::test]
    async fn test_rotate_credentials() {
        let db = setup_db().await;
        let repo = InstallationRepository::new(&db);
        let key = test_key();

        let model = repo
            .upsert_from_install(&key, install_payload("inst-1"))
            .await
            .unwrap();

        let rotated = repo
            .rotate_credentials(&key, &model, Some("new-token"), None)
            .await
            .unwrap()
            .expect("rotation from a fresh snapshot applies");

        let token = repo.decrypt_auth_token(&key, &rotated).await.unwrap();
        assert_eq!(token.as_deref(), Some("new-token"));
        // API key untouched
        assert!(
            repo.authenticate(&key, &rotated, "customer-api-key")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_rotate_from_stale_snapshot_changes_nothing() {
        let db = setup_db().await;
        let repo = InstallationRepository::new(&db);
        let key = test_key();

        let snapshot = repo
            .upsert_from_install(&key, install_payload("inst-1"))
            .await
            .unwrap();

        repo.rotate_credentials(&key, &snapshot, Some("token-v2"), None)
            .await
            .unwrap()
            .expect("first rotation applies");

        // A second rotation holding the pre-rotation row must not win.
        let stale = repo
            .rotate_credentials(&key, &snapshot, Some("token-v2-stale"), None)
            .await
            .unwrap();
        assert!(stale.is_none());

        let current = repo
            .find_by_installation_id("inst-1")
            .await
            .unwrap()
            .unwrap();
        let token = repo.decrypt_auth_token(&key, &current).await.unwrap();
        assert_eq!(token.as_deref(), Some("token-v2"));
    }

    #[tokio::test]
    async fn test_mark_uninstalled_drops_credentials() {
        let db = setup_db().await;
        let repo = InstallationRepository::new(&db);
        let key = test_key();

        let model = repo
            .upsert_from_install(&key, install_payload("inst-1"))
            .await
            .unwrap();
        let uninstalled = repo.mark_uninstalled(model).await.unwrap();

        assert_eq!(uninstalled.status, status::INACTIVE);
        assert!(uninstalled.auth_token_ciphertext.is_none());
        assert!(uninstalled.api_key_ciphertext.is_none());
    }

    #[tokio::test]
    async fn test_purge_orphans_spares_active_rows() {
        let db = setup_db().await;
        let repo = InstallationRepository::new(&db);
        let key = test_key();

        let keep = repo
            .upsert_from_install(&key, install_payload("inst-keep"))
            .await
            .unwrap();
        let drop = repo
            .upsert_from_install(&key, install_payload("inst-drop"))
            .await
            .unwrap();
        repo.mark_uninstalled(drop).await.unwrap();

        let purged = repo.purge_orphans(chrono::Duration::hours(24)).await.unwrap();
        assert_eq!(purged, 1);

        assert!(
            repo.find_by_installation_id(&keep.installation_id)
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            repo.find_by_installation_id("inst-drop")
                .await
                .unwrap()
                .is_none()
        );
    }
}
