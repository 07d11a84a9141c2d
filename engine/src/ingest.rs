//! C7 Response Ingestor: drains worker responses off the
//! [`crate::broker::InboundConsumer`] and applies them to the run catalog
//! and status log.
//!
//! A response referencing a task run the catalog doesn't know about is
//! logged and dropped (`UnknownReference`) rather than panicking — workers
//! and the engine don't share a transaction, so a response can outlive its
//! run (e.g. the run was already reaped by the timeout transitioner).

use crate::catalog::InMemoryCatalog;
use crate::store::StatusStore;
use cadence_shared::wire::CommandResponse;
use cadence_shared::{
    SchedulerError, SchedulerResult, StatusLogEntry, TaskRunId, TaskRunStatus, TimeIntervalTaskProgress,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub struct ResponseIngestor {
    catalog: Arc<InMemoryCatalog>,
    status_store: Arc<dyn StatusStore<TaskRunId, TaskRunStatus>>,
}

impl ResponseIngestor {
    pub fn new(
        catalog: Arc<InMemoryCatalog>,
        status_store: Arc<dyn StatusStore<TaskRunId, TaskRunStatus>>,
    ) -> Self {
        Self {
            catalog,
            status_store,
        }
    }

    /// Applies one worker response. Status timestamps come from
    /// `response.created_at` — when the worker reported, not when the
    /// queue was drained. Returns `Ok(())` even when the response is
    /// dropped for a locally-recovered reason (unknown run); only a
    /// store-fatal error propagates.
    pub async fn ingest(&self, response: CommandResponse, _now: DateTime<Utc>) -> SchedulerResult<()> {
        let run_id = response.command.task_run.id;
        let Some(mut run) = self.catalog.get_task_run(run_id) else {
            return Err(SchedulerError::UnknownReference(format!(
                "response for unknown task run {run_id}"
            )));
        };

        run.status = response.status;
        run.status_updated_at = response.created_at;
        run.description = response.description.clone();
        self.catalog.update_task_run(run.clone());

        self.status_store
            .append(StatusLogEntry {
                target_id: run_id,
                timestamp: response.created_at,
                status: response.status,
                description: response.description.clone(),
            })
            .await?;

        if let Some(result) = response.result {
            self.catalog.record_progress(TimeIntervalTaskProgress {
                task_id: run.task_id,
                right_bound_at: result.right_bound_at,
                left_bound_at: result.left_bound_at,
                collected_data_amount: result.collected_data_amount,
                saved_data_amount: result.saved_data_amount,
            });
        }
        Ok(())
    }

    /// Drains every response currently queued on `consumer`, applying each
    /// via [`Self::ingest`]. Errors for one response don't block the rest —
    /// matches the "catch, log, continue" posture the periodic runner uses
    /// elsewhere.
    pub async fn drain_available(
        &self,
        consumer: &dyn crate::broker::InboundConsumer,
        now: DateTime<Utc>,
    ) -> usize {
        let mut ingested = 0;
        while let Ok(Some(response)) =
            tokio::time::timeout(std::time::Duration::from_millis(0), consumer.recv()).await
        {
            if self.ingest(response, now).await.is_ok() {
                ingested += 1;
            }
        }
        ingested
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStatusStore;
    use cadence_shared::wire::{CommandRef, CommandType, TaskRunSnapshot, TimeIntervalExecutionResults};
    use cadence_shared::{Priority, TaskRun, TaskType};

    fn existing_run() -> TaskRun {
        TaskRun {
            id: 1,
            task_id: 7,
            group_name: "g".into(),
            priority: Priority::Medium,
            task_type: TaskType::TimeInterval,
            payload: None,
            execution_bounds: None,
            execution_arguments: None,
            status: TaskRunStatus::Execution,
            status_updated_at: Utc::now(),
            description: None,
        }
    }

    #[tokio::test]
    async fn ingesting_a_success_response_records_progress() {
        let catalog = Arc::new(InMemoryCatalog::new());
        let run = catalog.create_task_run(existing_run());
        let status_store: Arc<dyn StatusStore<TaskRunId, TaskRunStatus>> =
            Arc::new(InMemoryStatusStore::new());
        let ingestor = ResponseIngestor::new(catalog.clone(), status_store);

        let now = Utc::now();
        let response = CommandResponse {
            command: CommandRef {
                command_type: CommandType::Execute,
                task_run: TaskRunSnapshot {
                    id: run.id,
                    task_id: run.task_id,
                    group_name: run.group_name.clone(),
                    priority: run.priority,
                    task_type: run.task_type,
                    payload: None,
                    execution_bounds: None,
                    execution_arguments: None,
                    status: run.status,
                    status_updated_at: run.status_updated_at,
                },
            },
            status: TaskRunStatus::Succeed,
            description: None,
            result: Some(TimeIntervalExecutionResults {
                right_bound_at: now,
                left_bound_at: now - chrono::Duration::hours(1),
                collected_data_amount: Some(10),
                saved_data_amount: Some(10),
            }),
            created_at: now,
        };
        ingestor.ingest(response, now).await.unwrap();

        assert_eq!(catalog.get_task_run(run.id).unwrap().status, TaskRunStatus::Succeed);
        assert!(catalog.get_progress(run.task_id).is_some());
    }

    #[tokio::test]
    async fn ingesting_a_response_for_an_unknown_run_is_reported() {
        let catalog = Arc::new(InMemoryCatalog::new());
        let status_store: Arc<dyn StatusStore<TaskRunId, TaskRunStatus>> =
            Arc::new(InMemoryStatusStore::new());
        let ingestor = ResponseIngestor::new(catalog, status_store);
        let now = Utc::now();
        let response = CommandResponse {
            command: CommandRef {
                command_type: CommandType::Execute,
                task_run: TaskRunSnapshot {
                    id: 999,
                    task_id: 1,
                    group_name: "g".into(),
                    priority: Priority::Medium,
                    task_type: TaskType::Pagination,
                    payload: None,
                    execution_bounds: None,
                    execution_arguments: None,
                    status: TaskRunStatus::Succeed,
                    status_updated_at: now,
                },
            },
            status: TaskRunStatus::Succeed,
            description: None,
            result: None,
            created_at: now,
        };
        let result = ingestor.ingest(response, now).await;
        assert!(matches!(result, Err(SchedulerError::UnknownReference(_))));
    }
}
