//! Retry scheduling for failed processing attempts.
//!
//! Backoff is capped exponential with jitter. Eligibility is a pure
//! predicate over an event row so the sweep that drives retries stays
//! trivially testable.

use chrono::{DateTime, Utc};
use rand::{Rng, thread_rng};
use std::time::Duration;

use crate::config::ProcessingConfig;
use crate::models::webhook_event::{Model, processing_status};

/// Policy governing when a failed event becomes claimable again.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_seconds: u64,
    pub max_seconds: u64,
    pub jitter_factor: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_seconds: config.retry_base_seconds,
            max_seconds: config.retry_max_seconds,
            jitter_factor: config.retry_jitter_factor,
        }
    }

    /// Jitter-free backoff floor after `retry_count` recorded failures.
    fn backoff_floor_seconds(&self, retry_count: u32) -> f64 {
        let exponent = retry_count.min(30) as i32;
        (self.base_seconds as f64 * 2_f64.powi(exponent)).min(self.max_seconds as f64)
    }

    /// Backoff to wait after `retry_count` recorded failures, with jitter.
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let floor = self.backoff_floor_seconds(retry_count);
        let jitter_max = self.jitter_factor * floor;
        let jitter = if jitter_max > 0.0 {
            thread_rng().gen_range(0.0..jitter_max)
        } else {
            0.0
        };
        Duration::from_secs_f64(floor + jitter)
    }

    /// Whether a failed event is due for another attempt at `now`.
    ///
    /// True iff the row is `failed`, has attempts left, and the jitter-free
    /// backoff floor since the last failure has elapsed. The floor keeps the
    /// predicate deterministic; jitter only spreads the driving sweep.
    pub fn should_retry_now(&self, event: &Model, now: DateTime<Utc>) -> bool {
        if event.processing_status != processing_status::FAILED {
            return false;
        }
        if event.retry_count < 0 || event.retry_count as u32 >= self.max_retries {
            return false;
        }

        let wait_ms = (self.backoff_floor_seconds(event.retry_count as u32) * 1000.0) as i64;
        let due_at = event.updated_at + chrono::Duration::milliseconds(wait_ms);
        now >= due_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 5,
            base_seconds: 60,
            max_seconds: 3600,
            jitter_factor: 0.1,
        }
    }

    fn failed_event(retry_count: i32, failed_at: DateTime<Utc>) -> Model {
        Model {
            id: Uuid::new_v4(),
            installation_id: Uuid::new_v4(),
            external_event_id: Some("evt-1".to_string()),
            event_type: "order_created".to_string(),
            payload: json!({}),
            headers: json!({}),
            signature: None,
            processed: false,
            processing_status: processing_status::FAILED.to_string(),
            error_message: Some("downstream unavailable".to_string()),
            retry_count,
            created_at: failed_at.into(),
            updated_at: failed_at.into(),
            processed_at: None,
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = policy();
        assert_eq!(policy.backoff_floor_seconds(0), 60.0);
        assert_eq!(policy.backoff_floor_seconds(1), 120.0);
        assert_eq!(policy.backoff_floor_seconds(4), 960.0);
        // 60 * 2^10 would be 61440s; capped at one hour.
        assert_eq!(policy.backoff_floor_seconds(10), 3600.0);
    }

    #[test]
    fn test_backoff_jitter_bounds() {
        let policy = policy();
        for _ in 0..50 {
            let d = policy.backoff(1).as_secs_f64();
            assert!((120.0..132.0).contains(&d), "got {}", d);
        }
    }

    #[test]
    fn test_zero_jitter_factor() {
        let mut policy = policy();
        policy.jitter_factor = 0.0;
        assert_eq!(policy.backoff(0), Duration::from_secs(60));
    }

    #[test]
    fn test_due_after_backoff_elapsed() {
        let policy = policy();
        let failed_at = Utc::now() - chrono::Duration::seconds(130);
        // retry_count 1 waits 120s; 130s have passed.
        assert!(policy.should_retry_now(&failed_event(1, failed_at), Utc::now()));
    }

    #[test]
    fn test_not_due_before_backoff_elapsed() {
        let policy = policy();
        let failed_at = Utc::now() - chrono::Duration::seconds(30);
        assert!(!policy.should_retry_now(&failed_event(1, failed_at), Utc::now()));
    }

    #[test]
    fn test_exhausted_event_never_retries() {
        let policy = policy();
        let failed_at = Utc::now() - chrono::Duration::days(30);
        assert!(!policy.should_retry_now(&failed_event(5, failed_at), Utc::now()));
    }

    #[test]
    fn test_non_failed_status_never_retries() {
        let policy = policy();
        let failed_at = Utc::now() - chrono::Duration::days(1);
        let mut event = failed_event(1, failed_at);
        event.processing_status = processing_status::COMPLETED.to_string();
        assert!(!policy.should_retry_now(&event, Utc::now()));
        event.processing_status = processing_status::PROCESSING.to_string();
        assert!(!policy.should_retry_now(&event, Utc::now()));
    }
}
