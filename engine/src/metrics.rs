//! C10 Metric Collector: periodically snapshots engine-wide counters for
//! the gateway's `/metrics` surface and for the batch providers' own
//! window queries. Kept as a thin read-only view over the status store and
//! catalog — it never writes, so it can run concurrently with every other
//! component without coordination.

use crate::catalog::InMemoryCatalog;
use crate::store::StatusStore;
use cadence_shared::{TaskRunId, TaskRunStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Default)]
pub struct MetricSnapshot {
    pub waiting: usize,
    pub queued: usize,
    pub executing: usize,
    pub succeeded_in_window: usize,
    pub errored_in_window: usize,
    pub interrupted_in_window: usize,
    pub average_execution_seconds: f64,
    pub taken_at: Option<DateTime<Utc>>,
}

pub struct MetricCollector {
    catalog: Arc<InMemoryCatalog>,
    status_store: Arc<dyn StatusStore<TaskRunId, TaskRunStatus>>,
    window_seconds: i64,
}

impl MetricCollector {
    pub fn new(
        catalog: Arc<InMemoryCatalog>,
        status_store: Arc<dyn StatusStore<TaskRunId, TaskRunStatus>>,
        window_seconds: i64,
    ) -> Self {
        Self {
            catalog,
            status_store,
            window_seconds,
        }
    }

    pub async fn snapshot(&self, now: DateTime<Utc>) -> MetricSnapshot {
        let runs = self.catalog.list_task_runs();
        // `waitingCount` is the union of WAITING, INTERRUPTED and TEMP_ERROR
        // (§4.10) — runs that are due to be dispatched again, whether or
        // not they've ever run before.
        let waiting = runs
            .iter()
            .filter(|r| {
                matches!(
                    r.status,
                    TaskRunStatus::Waiting | TaskRunStatus::Interrupted | TaskRunStatus::TempError
                )
            })
            .count();
        let queued = runs.iter().filter(|r| r.status == TaskRunStatus::Queued).count();
        let executing = runs.iter().filter(|r| r.status == TaskRunStatus::Execution).count();

        let mut succeed_set = HashSet::new();
        succeed_set.insert(TaskRunStatus::Succeed);
        let mut error_set = HashSet::new();
        error_set.insert(TaskRunStatus::Error);
        let mut interrupted_set = HashSet::new();
        interrupted_set.insert(TaskRunStatus::Interrupted);

        let succeeded_in_window = self
            .status_store
            .window_total(&succeed_set, self.window_seconds, now)
            .await
            .unwrap_or(0);
        let errored_in_window = self
            .status_store
            .window_total(&error_set, self.window_seconds, now)
            .await
            .unwrap_or(0);
        let interrupted_in_window = self
            .status_store
            .window_total(&interrupted_set, self.window_seconds, now)
            .await
            .unwrap_or(0);
        let average_execution_seconds = self
            .status_store
            .average_duration_in_status(TaskRunStatus::Execution, self.window_seconds, now)
            .await
            .unwrap_or(0.0);

        MetricSnapshot {
            waiting,
            queued,
            executing,
            succeeded_in_window,
            errored_in_window,
            interrupted_in_window,
            average_execution_seconds,
            taken_at: Some(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStatusStore;
    use cadence_shared::{Priority, TaskRun, TaskType};

    #[tokio::test]
    async fn snapshot_counts_runs_by_status() {
        let catalog = Arc::new(InMemoryCatalog::new());
        catalog.create_task_run(TaskRun {
            id: 0,
            task_id: 1,
            group_name: "g".into(),
            priority: Priority::Medium,
            task_type: TaskType::Pagination,
            payload: None,
            execution_bounds: None,
            execution_arguments: None,
            status: TaskRunStatus::Waiting,
            status_updated_at: Utc::now(),
            description: None,
        });
        let status_store: Arc<dyn StatusStore<TaskRunId, TaskRunStatus>> =
            Arc::new(InMemoryStatusStore::new());
        let collector = MetricCollector::new(catalog, status_store, 60);
        let snapshot = collector.snapshot(Utc::now()).await;
        assert_eq!(snapshot.waiting, 1);
    }
}
