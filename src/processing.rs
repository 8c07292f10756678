//! Event processing lifecycle.
//!
//! The lifecycle is pending|failed -> processing -> {completed, failed} with
//! a bounded number of attempts. [`transition`] encodes the legal moves as a
//! pure function; [`ProcessingEngine`] drives one attempt at a time against
//! the database, where the conditional claim update in the event repository
//! is the serialization point between concurrent workers.

use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use sea_orm::{DatabaseConnection, EntityTrait};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ProcessingConfig;
use crate::error::ProcessingError;
use crate::models::{installation, webhook_event};
use crate::repositories::activity_log::{ActivityLogRepository, NewActivity, activity};
use crate::repositories::webhook_event::WebhookEventRepository;
use crate::retry::RetryPolicy;

/// Processing state of an event row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl EventState {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            webhook_event::processing_status::PENDING => Some(Self::Pending),
            webhook_event::processing_status::PROCESSING => Some(Self::Processing),
            webhook_event::processing_status::COMPLETED => Some(Self::Completed),
            webhook_event::processing_status::FAILED => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => webhook_event::processing_status::PENDING,
            Self::Processing => webhook_event::processing_status::PROCESSING,
            Self::Completed => webhook_event::processing_status::COMPLETED,
            Self::Failed => webhook_event::processing_status::FAILED,
        }
    }
}

/// An occurrence the state machine reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptEvent {
    /// A worker wants to start an attempt. `retry_count` is the number of
    /// failures already recorded on the row.
    Begin { retry_count: u32, max_retries: u32 },
    /// The attempt finished cleanly.
    Succeed,
    /// The attempt failed; `retry_count_after` counts this failure.
    Fail {
        reason: String,
        retry_count_after: u32,
        max_retries: u32,
    },
}

/// Persistence actions a transition demands from its caller.
#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    /// Set `processed = true` and stamp `processed_at`.
    MarkProcessed,
    /// Store the failure reason on the row.
    StoreError(String),
    /// Append a success activity entry.
    RecordSuccessActivity,
    /// Append an error activity entry for the failed attempt.
    RecordFailureActivity,
    /// Append the terminal retry-exhaustion activity entry.
    RecordRetryExhausted,
}

/// Illegal state machine moves.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot begin an attempt from {0:?}")]
    NotClaimable(EventState),
    #[error("retry limit reached")]
    RetriesExhausted,
    #[error("no attempt in flight in {0:?}")]
    NotProcessing(EventState),
}

/// The legal transitions of the event lifecycle, free of I/O.
pub fn transition(
    state: EventState,
    event: &AttemptEvent,
) -> Result<(EventState, Vec<SideEffect>), TransitionError> {
    match event {
        AttemptEvent::Begin {
            retry_count,
            max_retries,
        } => match state {
            EventState::Pending | EventState::Failed => {
                if retry_count >= max_retries {
                    Err(TransitionError::RetriesExhausted)
                } else {
                    Ok((EventState::Processing, Vec::new()))
                }
            }
            other => Err(TransitionError::NotClaimable(other)),
        },
        AttemptEvent::Succeed => match state {
            EventState::Processing => Ok((
                EventState::Completed,
                vec![SideEffect::MarkProcessed, SideEffect::RecordSuccessActivity],
            )),
            other => Err(TransitionError::NotProcessing(other)),
        },
        AttemptEvent::Fail {
            reason,
            retry_count_after,
            max_retries,
        } => match state {
            EventState::Processing => {
                let mut effects = vec![
                    SideEffect::StoreError(reason.clone()),
                    SideEffect::RecordFailureActivity,
                ];
                if retry_count_after >= max_retries {
                    effects.push(SideEffect::RecordRetryExhausted);
                }
                Ok((EventState::Failed, effects))
            }
            other => Err(TransitionError::NotProcessing(other)),
        },
    }
}

/// Downstream handler for a claimed event. Implementations must be safe to
/// call more than once per event: an attempt can succeed downstream and
/// still be retried if the process dies before `mark_completed` lands.
#[async_trait]
pub trait EventProcessor: Send + Sync {
    async fn process(
        &self,
        installation: &installation::Model,
        event: &webhook_event::Model,
    ) -> Result<(), ProcessingError>;
}

/// Outcome of one driven attempt.
#[derive(Debug)]
pub enum AttemptResult {
    /// Another worker holds the row, it already completed, or retries are
    /// exhausted.
    NotClaimed,
    Completed(webhook_event::Model),
    Failed {
        event: webhook_event::Model,
        exhausted: bool,
    },
}

/// Drives processing attempts with claim, timeout, and bookkeeping.
pub struct ProcessingEngine {
    config: ProcessingConfig,
}

impl ProcessingEngine {
    pub fn new(config: ProcessingConfig) -> Self {
        Self { config }
    }

    /// Run one attempt for an event.
    ///
    /// Whatever the downstream outcome, the row leaves `processing` before
    /// this returns: success lands in `completed`, errors and timeouts in
    /// `failed` with the attempt counted.
    pub async fn attempt(
        &self,
        db: &DatabaseConnection,
        processor: &dyn EventProcessor,
        installation: &installation::Model,
        event_id: Uuid,
    ) -> Result<AttemptResult, ProcessingError> {
        let events = WebhookEventRepository::new(db);
        let activity_log = ActivityLogRepository::new(db);

        let Some(claimed) = events
            .claim_for_processing(event_id, self.config.max_retries)
            .await?
        else {
            debug!(event_id = %event_id, "event not claimable");
            return Ok(AttemptResult::NotClaimed);
        };

        counter!("droplet_processing_attempts_total").increment(1);

        let attempt = tokio::time::timeout(
            Duration::from_secs(self.config.timeout_seconds),
            processor.process(installation, &claimed),
        );
        let outcome = match attempt.await {
            Ok(result) => result,
            Err(_) => Err(ProcessingError::Timeout),
        };

        match outcome {
            Ok(()) => {
                let model = events.mark_completed(claimed.id).await?;
                counter!("droplet_events_completed_total").increment(1);
                activity_log
                    .record_best_effort(
                        NewActivity::success(
                            installation.id,
                            activity::EVENT_PROCESSED,
                            format!("{} processed", model.event_type),
                        )
                        .with_details(serde_json::json!({ "event_id": model.id })),
                    )
                    .await;
                Ok(AttemptResult::Completed(model))
            }
            Err(err) => {
                let reason = err.to_string();
                let model = events.mark_failed(claimed.id, &reason).await?;
                counter!("droplet_events_failed_total").increment(1);
                warn!(
                    event_id = %model.id,
                    retry_count = model.retry_count,
                    error = %reason,
                    "processing attempt failed"
                );

                activity_log
                    .record_best_effort(
                        NewActivity::error(
                            installation.id,
                            activity::EVENT_FAILED,
                            format!(
                                "{} attempt {} failed: {}",
                                model.event_type, model.retry_count, reason
                            ),
                        )
                        .with_details(serde_json::json!({ "event_id": model.id })),
                    )
                    .await;

                let exhausted = model.retry_count >= self.config.max_retries as i32;
                if exhausted {
                    counter!("droplet_retries_exhausted_total").increment(1);
                    activity_log
                        .record_best_effort(NewActivity::error(
                            installation.id,
                            activity::RETRY_EXHAUSTED,
                            format!(
                                "{} gave up after {} attempts",
                                model.event_type, model.retry_count
                            ),
                        ))
                        .await;
                }

                Ok(AttemptResult::Failed {
                    event: model,
                    exhausted,
                })
            }
        }
    }

    /// Fail rows abandoned in `processing` so they become claimable again.
    pub async fn sweep_stuck(&self, db: &DatabaseConnection) -> Result<u64, ProcessingError> {
        let released = WebhookEventRepository::new(db)
            .release_stuck(self.config.stuck_processing_minutes)
            .await?;
        if released > 0 {
            warn!(released, "released stuck processing rows");
        }
        Ok(released)
    }

    /// Attempt every failed event whose backoff has elapsed.
    pub async fn retry_due(
        &self,
        db: &DatabaseConnection,
        processor: &dyn EventProcessor,
    ) -> Result<usize, ProcessingError> {
        let policy = RetryPolicy::from_config(&self.config);
        let events = WebhookEventRepository::new(db);
        let candidates = events
            .find_retry_candidates(self.config.max_retries, 50)
            .await?;

        let now = Utc::now();
        let mut attempted = 0;
        for candidate in candidates {
            if !policy.should_retry_now(&candidate, now) {
                continue;
            }
            let Some(installation) =
                crate::models::Installation::find_by_id(candidate.installation_id)
                    .one(db)
                    .await?
            else {
                continue;
            };
            self.attempt(db, processor, &installation, candidate.id)
                .await?;
            attempted += 1;
        }
        Ok(attempted)
    }
}
