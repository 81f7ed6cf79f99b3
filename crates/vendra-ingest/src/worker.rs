//! Bounded-concurrency worker loop over the ingested-event queue.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use vendra_db::models::IngestedEvent;

use crate::error::HandlerError;
use crate::registry::HandlerRegistry;

/// Retry backoff schedule in seconds: 30s, 2min, 10min, 30min, 1hr.
pub const BACKOFF_SCHEDULE_SECS: [i64; 5] = [30, 120, 600, 1800, 3600];

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Concurrent jobs per process.
    pub concurrency: usize,
    /// Poll interval when the queue is idle.
    pub poll_interval: Duration,
    /// Attempts before an event is terminally failed.
    pub max_attempts: i32,
    /// Overall processing budget per job; past it the attempt fails.
    pub job_budget: Duration,
    /// Age past which a `processing` row is considered stalled.
    pub stale_after: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval: Duration::from_secs(5),
            max_attempts: 5,
            job_budget: Duration::from_secs(120),
            stale_after: Duration::from_secs(600),
        }
    }
}

/// Next retry timestamp for a 1-based attempt number, or `None` once the
/// budget is exhausted.
#[must_use]
pub fn next_attempt_at(attempt_number: i32, max_attempts: i32) -> Option<chrono::DateTime<Utc>> {
    if attempt_number >= max_attempts {
        return None;
    }

    let idx = (attempt_number - 1).max(0) as usize;
    let delay_secs = BACKOFF_SCHEDULE_SECS
        .get(idx)
        .copied()
        .unwrap_or(BACKOFF_SCHEDULE_SECS[BACKOFF_SCHEDULE_SECS.len() - 1]);

    Some(Utc::now() + chrono::Duration::seconds(delay_secs))
}

/// The ingestion worker.
#[derive(Clone)]
pub struct IngestWorker {
    pool: PgPool,
    registry: Arc<HandlerRegistry>,
    config: WorkerConfig,
    permits: Arc<Semaphore>,
}

impl IngestWorker {
    /// Create a worker.
    #[must_use]
    pub fn new(pool: PgPool, registry: Arc<HandlerRegistry>, config: WorkerConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.concurrency));
        Self {
            pool,
            registry,
            config,
            permits,
        }
    }

    /// Spawn the polling loop.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(
                target: "ingest_worker",
                concurrency = self.config.concurrency,
                topics = ?self.registry.topics(),
                "Ingestion worker started"
            );
            loop {
                let claimed = self.tick().await;
                if claimed == 0 {
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        })
    }

    /// One scheduling pass: reclaim stalled rows, claim due events up to
    /// the free concurrency, and dispatch each on its own task. Returns
    /// the number of events claimed.
    pub async fn tick(&self) -> usize {
        if let Err(e) =
            IngestedEvent::reclaim_stalled(&self.pool, self.config.stale_after.as_secs() as i64)
                .await
        {
            tracing::error!(target: "ingest_worker", error = %e, "Stalled-event reclaim failed");
        }

        let free = self.permits.available_permits();
        if free == 0 {
            return 0;
        }

        let claimed = match IngestedEvent::claim_due(
            &self.pool,
            free as i64,
            self.registry.priority_topics(),
        )
        .await
        {
            Ok(events) => events,
            Err(e) => {
                tracing::error!(target: "ingest_worker", error = %e, "Event claim failed");
                return 0;
            }
        };

        let count = claimed.len();
        for event in claimed {
            let permit = match self.permits.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => return count,
            };
            let worker = self.clone();
            tokio::spawn(async move {
                worker.process(&event).await;
                drop(permit);
            });
        }
        count
    }

    /// Process one claimed event through its topic handler.
    pub async fn process(&self, event: &IngestedEvent) {
        let Some(handler) = self.registry.get(&event.topic) else {
            self.finish_failure(
                event,
                &HandlerError::Terminal(format!("no handler registered for topic '{}'", event.topic)),
            )
            .await;
            return;
        };

        let outcome = tokio::time::timeout(self.config.job_budget, handler.handle(event)).await;
        let result = match outcome {
            Ok(r) => r,
            Err(_) => Err(HandlerError::Retryable(format!(
                "processing budget of {}s exceeded",
                self.config.job_budget.as_secs()
            ))),
        };

        match result {
            Ok(value) => {
                match IngestedEvent::mark_completed(&self.pool, event.id, &value).await {
                    Ok(true) => {
                        tracing::info!(
                            target: "ingest_worker",
                            event_id = %event.event_id,
                            topic = %event.topic,
                            attempt = event.attempts + 1,
                            "Event completed"
                        );
                    }
                    Ok(false) => {
                        tracing::warn!(
                            target: "ingest_worker",
                            event_id = %event.event_id,
                            "Completion skipped, event no longer processing"
                        );
                    }
                    Err(e) => {
                        tracing::error!(
                            target: "ingest_worker",
                            event_id = %event.event_id,
                            error = %e,
                            "Failed to record completion"
                        );
                    }
                }
            }
            Err(failure) => self.finish_failure(event, &failure).await,
        }
    }

    /// Record a failed attempt: schedule a retry within budget for
    /// retryable failures, else mark terminally failed.
    async fn finish_failure(&self, event: &IngestedEvent, failure: &HandlerError) {
        let attempt_number = event.attempts + 1;
        let next = if failure.is_retryable() {
            next_attempt_at(attempt_number, self.config.max_attempts)
        } else {
            None
        };

        tracing::warn!(
            target: "ingest_worker",
            event_id = %event.event_id,
            topic = %event.topic,
            attempt = attempt_number,
            error = %failure,
            will_retry = next.is_some(),
            "Event processing failed"
        );

        if let Err(e) =
            IngestedEvent::mark_attempt_failed(&self.pool, event.id, &failure.to_string(), next)
                .await
        {
            tracing::error!(
                target: "ingest_worker",
                event_id = %event.event_id,
                error = %e,
                "Failed to record attempt failure"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule_is_increasing() {
        for pair in BACKOFF_SCHEDULE_SECS.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[test]
    fn test_next_attempt_within_budget() {
        let next = next_attempt_at(1, 5).unwrap();
        let delay = next - Utc::now();
        assert!(delay.num_seconds() >= 28 && delay.num_seconds() <= 32);

        let next = next_attempt_at(3, 5).unwrap();
        let delay = next - Utc::now();
        assert!(delay.num_seconds() >= 598 && delay.num_seconds() <= 602);
    }

    #[test]
    fn test_next_attempt_exhausted() {
        assert!(next_attempt_at(5, 5).is_none());
        assert!(next_attempt_at(9, 5).is_none());
    }

    #[test]
    fn test_default_config_bounds() {
        let config = WorkerConfig::default();
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.max_attempts, 5);
        assert!(config.stale_after > config.job_budget);
    }
}
