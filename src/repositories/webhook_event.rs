//! # Webhook Event Repository
//!
//! Data access for stored deliveries. Two invariants live here:
//!
//! * Idempotent capture: an insert on (installation_id, external_event_id)
//!   that collides with an existing row reports the existing row instead of
//!   creating a second one. Deliveries without an external event id are
//!   never deduplicated.
//! * Single-writer processing: a row enters `processing` only through the
//!   conditional claim update, so two workers can never process the same
//!   event concurrently.

use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TryInsertResult,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::models::webhook_event::{
    ActiveModel, Column, Entity as WebhookEvent, Model, processing_status,
};

/// Result of attempting to capture a delivery.
#[derive(Debug)]
pub enum InsertOutcome {
    /// A new row was created for this delivery.
    Inserted(Model),
    /// A row with the same (installation, external event id) already exists.
    AlreadyExists(Model),
}

/// A delivery ready to be captured.
#[derive(Debug, Clone)]
pub struct NewWebhookEvent {
    pub installation_id: Uuid,
    pub external_event_id: Option<String>,
    pub event_type: String,
    pub payload: JsonValue,
    pub headers: JsonValue,
    pub signature: Option<String>,
}

/// Per-status row counts for one installation.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Repository for WebhookEvent database operations
pub struct WebhookEventRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> WebhookEventRepository<'a> {
    /// Create a new WebhookEventRepository with the given database connection
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Capture a delivery, deduplicating on (installation, external event id).
    ///
    /// The insert races against concurrent deliveries of the same event; the
    /// unique index decides the winner and the loser gets the winner's row.
    pub async fn insert_if_new(&self, new: NewWebhookEvent) -> Result<InsertOutcome, DbErr> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let active = ActiveModel {
            id: Set(id),
            installation_id: Set(new.installation_id),
            external_event_id: Set(new.external_event_id.clone()),
            event_type: Set(new.event_type),
            payload: Set(new.payload),
            headers: Set(new.headers),
            signature: Set(new.signature),
            processed: Set(false),
            processing_status: Set(processing_status::PENDING.to_string()),
            error_message: Set(None),
            retry_count: Set(0),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            processed_at: Set(None),
        };

        let Some(external_event_id) = new.external_event_id else {
            // No idempotency key: always a fresh row.
            let model = active.insert(self.db).await?;
            return Ok(InsertOutcome::Inserted(model));
        };

        let result = WebhookEvent::insert(active)
            .on_conflict(
                OnConflict::columns([Column::InstallationId, Column::ExternalEventId])
                    .do_nothing()
                    .to_owned(),
            )
            .do_nothing()
            .exec(self.db)
            .await?;

        match result {
            TryInsertResult::Inserted(_) => {
                let model = self.fetch_required(id).await?;
                Ok(InsertOutcome::Inserted(model))
            }
            TryInsertResult::Conflicted | TryInsertResult::Empty => {
                let existing = WebhookEvent::find()
                    .filter(Column::InstallationId.eq(new.installation_id))
                    .filter(Column::ExternalEventId.eq(external_event_id.clone()))
                    .one(self.db)
                    .await?
                    .ok_or_else(|| {
                        DbErr::RecordNotFound(format!(
                            "conflicting webhook event {} vanished",
                            external_event_id
                        ))
                    })?;
                Ok(InsertOutcome::AlreadyExists(existing))
            }
        }
    }

    /// Atomically claim an event for a processing attempt.
    ///
    /// The claim succeeds only when the row is still pending or failed and
    /// has attempts left. Returns `None` when another worker holds the row,
    /// it already completed, or retries are exhausted.
    pub async fn claim_for_processing(
        &self,
        event_id: Uuid,
        max_retries: u32,
    ) -> Result<Option<Model>, DbErr> {
        let now = Utc::now();
        let result = WebhookEvent::update_many()
            .col_expr(
                Column::ProcessingStatus,
                Expr::value(processing_status::PROCESSING),
            )
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(event_id))
            .filter(
                Column::ProcessingStatus
                    .is_in([processing_status::PENDING, processing_status::FAILED]),
            )
            .filter(Column::RetryCount.lt(max_retries as i32))
            .exec(self.db)
            .await?;

        if result.rows_affected == 0 {
            return Ok(None);
        }
        Ok(Some(self.fetch_required(event_id).await?))
    }

    /// Mark a claimed event completed.
    pub async fn mark_completed(&self, event_id: Uuid) -> Result<Model, DbErr> {
        let now = Utc::now();
        let active = ActiveModel {
            id: Set(event_id),
            processed: Set(true),
            processing_status: Set(processing_status::COMPLETED.to_string()),
            error_message: Set(None),
            processed_at: Set(Some(now.into())),
            updated_at: Set(now.into()),
            ..Default::default()
        };
        active.update(self.db).await
    }

    /// Mark a claimed event failed and count the attempt.
    pub async fn mark_failed(&self, event_id: Uuid, error: &str) -> Result<Model, DbErr> {
        let now = Utc::now();
        WebhookEvent::update_many()
            .col_expr(
                Column::ProcessingStatus,
                Expr::value(processing_status::FAILED),
            )
            .col_expr(Column::ErrorMessage, Expr::value(error))
            .col_expr(
                Column::RetryCount,
                Expr::value(Expr::col(Column::RetryCount).add(1)),
            )
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(event_id))
            .exec(self.db)
            .await?;

        self.fetch_required(event_id).await
    }

    /// Return rows stuck in `processing` to `failed` so they become
    /// claimable again. The attempt is counted so a crash loop still hits
    /// the retry bound.
    pub async fn release_stuck(&self, stuck_after_minutes: u64) -> Result<u64, DbErr> {
        let now = Utc::now();
        let cutoff = now - chrono::Duration::minutes(stuck_after_minutes as i64);

        let result = WebhookEvent::update_many()
            .col_expr(
                Column::ProcessingStatus,
                Expr::value(processing_status::FAILED),
            )
            .col_expr(Column::ErrorMessage, Expr::value("stuck in processing"))
            .col_expr(
                Column::RetryCount,
                Expr::value(Expr::col(Column::RetryCount).add(1)),
            )
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::ProcessingStatus.eq(processing_status::PROCESSING))
            .filter(Column::UpdatedAt.lt(cutoff))
            .exec(self.db)
            .await?;

        Ok(result.rows_affected)
    }

    /// Failed events with attempts left, oldest first.
    pub async fn find_retry_candidates(
        &self,
        max_retries: u32,
        limit: u64,
    ) -> Result<Vec<Model>, DbErr> {
        WebhookEvent::find()
            .filter(Column::ProcessingStatus.eq(processing_status::FAILED))
            .filter(Column::RetryCount.lt(max_retries as i32))
            .order_by_asc(Column::UpdatedAt)
            .limit(limit)
            .all(self.db)
            .await
    }

    /// Recent events for one installation, newest first.
    pub async fn recent_for_installation(
        &self,
        installation_id: Uuid,
        limit: u64,
    ) -> Result<Vec<Model>, DbErr> {
        WebhookEvent::find()
            .filter(Column::InstallationId.eq(installation_id))
            .order_by_desc(Column::CreatedAt)
            .order_by_desc(Column::Id)
            .limit(limit)
            .all(self.db)
            .await
    }

    /// Per-status counts for one installation.
    pub async fn status_counts(&self, installation_id: Uuid) -> Result<StatusCounts, DbErr> {
        let count_for = |status: &'static str| {
            WebhookEvent::find()
                .filter(Column::InstallationId.eq(installation_id))
                .filter(Column::ProcessingStatus.eq(status))
                .count(self.db)
        };

        Ok(StatusCounts {
            pending: count_for(processing_status::PENDING).await?,
            processing: count_for(processing_status::PROCESSING).await?,
            completed: count_for(processing_status::COMPLETED).await?,
            failed: count_for(processing_status::FAILED).await?,
        })
    }

    async fn fetch_required(&self, event_id: Uuid) -> Result<Model, DbErr> {
        WebhookEvent::find_by_id(event_id)
            .one(self.db)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("webhook event {}", event_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::CryptoKey;
    use crate::repositories::installation::{InstallationRepository, NewInstallation};
    use migration::{Migrator, MigratorTrait};
    use sea_orm::Database;

    async fn setup_db() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("Failed to open test DB");
        Migrator::up(&db, None).await.expect("Failed to migrate");
        db
    }

    async fn seed_installation(db: &DatabaseConnection, installation_id: &str) -> Uuid {
        let key = CryptoKey::new(vec![1u8; 32]).unwrap();
        let repo = InstallationRepository::new(db);
        let model = repo
            .upsert_from_install(
                &key,
                NewInstallation {
                    installation_id: installation_id.to_string(),
                    company_id: "company-1".to_string(),
                    auth_token: None,
                    api_key: None,
                    webhook_secret: Some("secret".to_string()),
                    settings: None,
                    company_metadata: None,
                },
            )
            .await
            .unwrap();
        model.id
    }

    fn delivery(installation_id: Uuid, external_event_id: Option<&str>) -> NewWebhookEvent {
        NewWebhookEvent {
            installation_id,
            external_event_id: external_event_id.map(str::to_string),
            event_type: "order_created".to_string(),
            payload: serde_json::json!({"event_type": "order_created"}),
            headers: serde_json::json!({}),
            signature: Some("sha256=abc".to_string()),
        }
    }

    #[tokio::test]
    async fn test_duplicate_external_id_returns_existing_row() {
        let db = setup_db().await;
        let inst = seed_installation(&db, "inst-1").await;
        let repo = WebhookEventRepository::new(&db);

        let first = match repo
            .insert_if_new(delivery(inst, Some("evt-1")))
            .await
            .unwrap()
        {
            InsertOutcome::Inserted(m) => m,
            InsertOutcome::AlreadyExists(_) => panic!("first delivery must insert"),
        };

        match repo
            .insert_if_new(delivery(inst, Some("evt-1")))
            .await
            .unwrap()
        {
            InsertOutcome::AlreadyExists(existing) => assert_eq!(existing.id, first.id),
            InsertOutcome::Inserted(_) => panic!("redelivery must not create a row"),
        }

        assert_eq!(WebhookEvent::find().count(&db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_same_external_id_different_installations() {
        let db = setup_db().await;
        let inst_a = seed_installation(&db, "inst-a").await;
        let inst_b = seed_installation(&db, "inst-b").await;
        let repo = WebhookEventRepository::new(&db);

        assert!(matches!(
            repo.insert_if_new(delivery(inst_a, Some("evt-1")))
                .await
                .unwrap(),
            InsertOutcome::Inserted(_)
        ));
        assert!(matches!(
            repo.insert_if_new(delivery(inst_b, Some("evt-1")))
                .await
                .unwrap(),
            InsertOutcome::Inserted(_)
        ));
    }

    #[tokio::test]
    async fn test_missing_external_id_never_deduplicates() {
        let db = setup_db().await;
        let inst = seed_installation(&db, "inst-1").await;
        let repo = WebhookEventRepository::new(&db);

        for _ in 0..3 {
            assert!(matches!(
                repo.insert_if_new(delivery(inst, None)).await.unwrap(),
                InsertOutcome::Inserted(_)
            ));
        }
        assert_eq!(WebhookEvent::find().count(&db).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let db = setup_db().await;
        let inst = seed_installation(&db, "inst-1").await;
        let repo = WebhookEventRepository::new(&db);

        let InsertOutcome::Inserted(event) = repo
            .insert_if_new(delivery(inst, Some("evt-1")))
            .await
            .unwrap()
        else {
            panic!("insert expected");
        };

        let claimed = repo.claim_for_processing(event.id, 5).await.unwrap();
        assert!(claimed.is_some());
        assert_eq!(
            claimed.unwrap().processing_status,
            processing_status::PROCESSING
        );

        // Second claim while the row is processing must lose.
        assert!(
            repo.claim_for_processing(event.id, 5)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_completed_event_cannot_be_reclaimed() {
        let db = setup_db().await;
        let inst = seed_installation(&db, "inst-1").await;
        let repo = WebhookEventRepository::new(&db);

        let InsertOutcome::Inserted(event) = repo
            .insert_if_new(delivery(inst, Some("evt-1")))
            .await
            .unwrap()
        else {
            panic!("insert expected");
        };

        repo.claim_for_processing(event.id, 5).await.unwrap();
        let completed = repo.mark_completed(event.id).await.unwrap();
        assert!(completed.processed);
        assert!(completed.processed_at.is_some());

        assert!(
            repo.claim_for_processing(event.id, 5)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_retry_bound_refuses_sixth_attempt() {
        let db = setup_db().await;
        let inst = seed_installation(&db, "inst-1").await;
        let repo = WebhookEventRepository::new(&db);

        let InsertOutcome::Inserted(event) = repo
            .insert_if_new(delivery(inst, Some("evt-1")))
            .await
            .unwrap()
        else {
            panic!("insert expected");
        };

        for attempt in 1..=5 {
            let claimed = repo.claim_for_processing(event.id, 5).await.unwrap();
            assert!(claimed.is_some(), "attempt {} should be claimable", attempt);
            let failed = repo.mark_failed(event.id, "downstream unavailable").await.unwrap();
            assert_eq!(failed.retry_count, attempt);
            assert_eq!(failed.processing_status, processing_status::FAILED);
        }

        // Five recorded failures exhaust the budget.
        assert!(
            repo.claim_for_processing(event.id, 5)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_release_stuck_counts_the_attempt() {
        let db = setup_db().await;
        let inst = seed_installation(&db, "inst-1").await;
        let repo = WebhookEventRepository::new(&db);

        let InsertOutcome::Inserted(event) = repo
            .insert_if_new(delivery(inst, Some("evt-1")))
            .await
            .unwrap()
        else {
            panic!("insert expected");
        };
        repo.claim_for_processing(event.id, 5).await.unwrap();

        // Backdate the claim so it looks abandoned.
        let stale = Utc::now() - chrono::Duration::minutes(60);
        WebhookEvent::update_many()
            .col_expr(Column::UpdatedAt, Expr::value(stale))
            .filter(Column::Id.eq(event.id))
            .exec(&db)
            .await
            .unwrap();

        let released = repo.release_stuck(15).await.unwrap();
        assert_eq!(released, 1);

        let row = WebhookEvent::find_by_id(event.id)
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.processing_status, processing_status::FAILED);
        assert_eq!(row.retry_count, 1);

        // Nothing left to release on a second sweep.
        assert_eq!(repo.release_stuck(15).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_status_counts_are_tenant_scoped() {
        let db = setup_db().await;
        let inst_a = seed_installation(&db, "inst-a").await;
        let inst_b = seed_installation(&db, "inst-b").await;
        let repo = WebhookEventRepository::new(&db);

        let InsertOutcome::Inserted(a1) = repo
            .insert_if_new(delivery(inst_a, Some("evt-1")))
            .await
            .unwrap()
        else {
            panic!("insert expected");
        };
        repo.insert_if_new(delivery(inst_a, Some("evt-2")))
            .await
            .unwrap();
        repo.insert_if_new(delivery(inst_b, Some("evt-1")))
            .await
            .unwrap();

        repo.claim_for_processing(a1.id, 5).await.unwrap();
        repo.mark_completed(a1.id).await.unwrap();

        let counts_a = repo.status_counts(inst_a).await.unwrap();
        assert_eq!(counts_a.completed, 1);
        assert_eq!(counts_a.pending, 1);

        let counts_b = repo.status_counts(inst_b).await.unwrap();
        assert_eq!(counts_b.pending, 1);
        assert_eq!(counts_b.completed, 0);
    }

    #[tokio::test]
    async fn test_recent_for_installation_isolated() {
        let db = setup_db().await;
        let inst_a = seed_installation(&db, "inst-a").await;
        let inst_b = seed_installation(&db, "inst-b").await;
        let repo = WebhookEventRepository::new(&db);

        repo.insert_if_new(delivery(inst_a, Some("evt-a")))
            .await
            .unwrap();
        repo.insert_if_new(delivery(inst_b, Some("evt-b")))
            .await
            .unwrap();

        let events = repo.recent_for_installation(inst_a, 10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].external_event_id.as_deref(), Some("evt-a"));
    }
}
