//! C8 Timeout Transitioner: reaps task runs stuck past their TTL in a given
//! status, ported from `transit_task_run_status/impls.py`'s four concrete
//! transitions. Each is just a `(from_status, to_status, ttl)` triple
//! applied uniformly; keeping them as named functions rather than a single
//! parameterized loop mirrors the original's one-class-per-transition
//! structure, which reads better when a future transition needs bespoke
//! behavior (e.g. emitting a different log description).

use crate::catalog::InMemoryCatalog;
use crate::store::StatusStore;
use cadence_shared::{StatusLogEntry, TaskRunId, TaskRunStatus};
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub struct TimeoutTransitioner {
    catalog: Arc<InMemoryCatalog>,
    status_store: Arc<dyn StatusStore<TaskRunId, TaskRunStatus>>,
    queued_ttl_seconds: i64,
    execution_ttl_seconds: i64,
    temp_error_ttl_seconds: i64,
}

impl TimeoutTransitioner {
    pub fn new(
        catalog: Arc<InMemoryCatalog>,
        status_store: Arc<dyn StatusStore<TaskRunId, TaskRunStatus>>,
        queued_ttl_seconds: i64,
        execution_ttl_seconds: i64,
        temp_error_ttl_seconds: i64,
    ) -> Self {
        Self {
            catalog,
            status_store,
            queued_ttl_seconds,
            execution_ttl_seconds,
            temp_error_ttl_seconds,
        }
    }

    async fn transition(
        &self,
        from: TaskRunStatus,
        to: TaskRunStatus,
        ttl_seconds: i64,
        now: DateTime<Utc>,
        description: &str,
    ) -> usize {
        // `ttl == 0` means immediately eligible regardless of timing;
        // otherwise the comparison is strict `<` — a run whose
        // `status_updated_at` lands exactly on the cutoff, to the
        // microsecond, has not yet expired (P6).
        let cutoff = now - chrono::Duration::seconds(ttl_seconds);
        let mut transitioned = 0;
        for mut run in self.catalog.list_task_runs() {
            let expired = ttl_seconds == 0 || run.status_updated_at < cutoff;
            if run.status != from || !expired {
                continue;
            }
            run.status = to;
            run.status_updated_at = now;
            run.description = Some(description.to_string());
            self.catalog.update_task_run(run.clone());
            if self
                .status_store
                .append(StatusLogEntry {
                    target_id: run.id,
                    timestamp: now,
                    status: to,
                    description: Some(description.to_string()),
                })
                .await
                .is_ok()
            {
                transitioned += 1;
            }
        }
        transitioned
    }

    /// `QUEUED` runs that never reached `EXECUTION` within their TTL are
    /// interrupted — the worker likely never picked up the command.
    pub async fn queued_to_interrupted(&self, now: DateTime<Utc>) -> usize {
        self.transition(
            TaskRunStatus::Queued,
            TaskRunStatus::Interrupted,
            self.queued_ttl_seconds,
            now,
            "queued timeout exceeded",
        )
        .await
    }

    /// `EXECUTION` runs that never reported a result within their TTL are
    /// interrupted — the worker likely died mid-run.
    pub async fn execution_to_interrupted(&self, now: DateTime<Utc>) -> usize {
        self.transition(
            TaskRunStatus::Execution,
            TaskRunStatus::Interrupted,
            self.execution_ttl_seconds,
            now,
            "execution timeout exceeded",
        )
        .await
    }

    /// `INTERRUPTED` runs are always retried — put them back in `WAITING`
    /// immediately (TTL zero by construction; interruption already implies
    /// the retry is due).
    pub async fn interrupted_to_waiting(&self, now: DateTime<Utc>) -> usize {
        self.transition(
            TaskRunStatus::Interrupted,
            TaskRunStatus::Waiting,
            0,
            now,
            "retrying after interruption",
        )
        .await
    }

    /// `TEMP_ERROR` runs wait out a backoff TTL, then retry.
    pub async fn temp_error_to_waiting(&self, now: DateTime<Utc>) -> usize {
        self.transition(
            TaskRunStatus::TempError,
            TaskRunStatus::Waiting,
            self.temp_error_ttl_seconds,
            now,
            "retrying after temporary error",
        )
        .await
    }

    /// Runs all four transitions in their defined precedence order
    /// (interruption detection before interruption recovery).
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        self.queued_to_interrupted(now).await
            + self.execution_to_interrupted(now).await
            + self.interrupted_to_waiting(now).await
            + self.temp_error_to_waiting(now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStatusStore;
    use cadence_shared::{Priority, TaskRun, TaskType};

    fn run_in_status(status: TaskRunStatus, updated_at: DateTime<Utc>) -> TaskRun {
        TaskRun {
            id: 0,
            task_id: 1,
            group_name: "g".into(),
            priority: Priority::Medium,
            task_type: TaskType::Pagination,
            payload: None,
            execution_bounds: None,
            execution_arguments: None,
            status,
            status_updated_at: updated_at,
            description: None,
        }
    }

    #[tokio::test]
    async fn queued_run_past_ttl_is_interrupted() {
        let catalog = Arc::new(InMemoryCatalog::new());
        let now = Utc::now();
        let run = catalog.create_task_run(run_in_status(
            TaskRunStatus::Queued,
            now - chrono::Duration::seconds(400),
        ));
        let status_store: Arc<dyn StatusStore<TaskRunId, TaskRunStatus>> =
            Arc::new(InMemoryStatusStore::new());
        let transitioner = TimeoutTransitioner::new(catalog.clone(), status_store, 300, 300, 30);
        let count = transitioner.queued_to_interrupted(now).await;
        assert_eq!(count, 1);
        assert_eq!(
            catalog.get_task_run(run.id).unwrap().status,
            TaskRunStatus::Interrupted
        );
    }

    #[tokio::test]
    async fn queued_run_within_ttl_is_untouched() {
        let catalog = Arc::new(InMemoryCatalog::new());
        let now = Utc::now();
        catalog.create_task_run(run_in_status(TaskRunStatus::Queued, now));
        let status_store: Arc<dyn StatusStore<TaskRunId, TaskRunStatus>> =
            Arc::new(InMemoryStatusStore::new());
        let transitioner = TimeoutTransitioner::new(catalog, status_store, 300, 300, 30);
        assert_eq!(transitioner.queued_to_interrupted(now).await, 0);
    }

    // P6: the filter is a strict `<`; a run exactly at the cutoff, to the
    // microsecond, has not yet expired.
    #[tokio::test]
    async fn queued_run_exactly_at_the_ttl_boundary_is_not_yet_expired() {
        let catalog = Arc::new(InMemoryCatalog::new());
        let now = Utc::now();
        catalog.create_task_run(run_in_status(
            TaskRunStatus::Queued,
            now - chrono::Duration::seconds(300),
        ));
        let status_store: Arc<dyn StatusStore<TaskRunId, TaskRunStatus>> =
            Arc::new(InMemoryStatusStore::new());
        let transitioner = TimeoutTransitioner::new(catalog, status_store, 300, 300, 30);
        assert_eq!(transitioner.queued_to_interrupted(now).await, 0);
    }

    #[tokio::test]
    async fn interrupted_run_with_zero_ttl_is_always_eligible_even_at_now() {
        let catalog = Arc::new(InMemoryCatalog::new());
        let now = Utc::now();
        catalog.create_task_run(run_in_status(TaskRunStatus::Interrupted, now));
        let status_store: Arc<dyn StatusStore<TaskRunId, TaskRunStatus>> =
            Arc::new(InMemoryStatusStore::new());
        let transitioner = TimeoutTransitioner::new(catalog, status_store, 300, 300, 30);
        assert_eq!(transitioner.interrupted_to_waiting(now).await, 1);
    }
}
