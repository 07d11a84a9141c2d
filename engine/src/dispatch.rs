//! C6 Dispatcher: promotes `WAITING` task runs to `QUEUED` in batches sized
//! by the configured [`crate::batch::BatchProvider`], then hands each one
//! to the [`crate::broker::OutboundProducer`] as an `EXECUTE` command.
//!
//! Oldest-first within a batch, highest priority first across runs —
//! mirrors the teacher's `TaskScheduler::execute_single_task` ordering
//! guard, generalized from "one job at a time" to "N runs per tick".

use crate::batch::{BatchProvider, DispatchMetrics};
use crate::broker::OutboundProducer;
use crate::catalog::InMemoryCatalog;
use crate::store::StatusStore;
use cadence_shared::wire::{CommandType, OutboundCommand, TaskRunSnapshot};
use cadence_shared::{SchedulerResult, StatusLogEntry, TaskRunId, TaskRunStatus};
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub struct Dispatcher {
    catalog: Arc<InMemoryCatalog>,
    status_store: Arc<dyn StatusStore<TaskRunId, TaskRunStatus>>,
    batch_provider: Box<dyn BatchProvider>,
    producer: Arc<dyn OutboundProducer>,
    metrics_window_seconds: i64,
    queue_capacity: usize,
}

impl Dispatcher {
    pub fn new(
        catalog: Arc<InMemoryCatalog>,
        status_store: Arc<dyn StatusStore<TaskRunId, TaskRunStatus>>,
        batch_provider: Box<dyn BatchProvider>,
        producer: Arc<dyn OutboundProducer>,
        metrics_window_seconds: i64,
        queue_capacity: usize,
    ) -> Self {
        Self {
            catalog,
            status_store,
            batch_provider,
            producer,
            metrics_window_seconds,
            queue_capacity,
        }
    }

    /// Mirrors the original `repo.py` window query: `succ` counts
    /// `{SUCCEED, ERROR, CANCELLED}` (outcomes that consumed a slot to
    /// completion), `err` counts `{TEMP_ERROR, INTERRUPTED}` (outcomes that
    /// need a retry). `timed_out` is folded into the error bucket rather
    /// than split out on its own (§4.5.2).
    async fn current_metrics(&self, now: DateTime<Utc>) -> SchedulerResult<DispatchMetrics> {
        let mut succeeded_set = std::collections::HashSet::new();
        succeeded_set.insert(TaskRunStatus::Succeed);
        succeeded_set.insert(TaskRunStatus::Error);
        succeeded_set.insert(TaskRunStatus::Cancelled);
        let mut errored_set = std::collections::HashSet::new();
        errored_set.insert(TaskRunStatus::TempError);
        errored_set.insert(TaskRunStatus::Interrupted);
        let mut in_flight_set = std::collections::HashSet::new();
        in_flight_set.insert(TaskRunStatus::Queued);
        in_flight_set.insert(TaskRunStatus::Execution);

        let succeeded = self
            .status_store
            .window_total(&succeeded_set, self.metrics_window_seconds, now)
            .await?;
        let errored = self
            .status_store
            .window_total(&errored_set, self.metrics_window_seconds, now)
            .await?;
        let in_flight = self.status_store.count_with_status(&in_flight_set).await?;
        let average_execution_seconds = self
            .status_store
            .average_duration_in_status(TaskRunStatus::Execution, self.metrics_window_seconds, now)
            .await?;

        Ok(DispatchMetrics {
            succeeded,
            errored,
            timed_out: 0,
            in_flight,
            queue_capacity: self.queue_capacity,
            average_execution_seconds,
        })
    }

    /// Promotes up to `batch_size` (chosen by the batch provider from
    /// current metrics) `WAITING` runs to `QUEUED` and dispatches them.
    /// Returns the number of runs dispatched.
    pub async fn dispatch_tick(&self, now: DateTime<Utc>) -> SchedulerResult<usize> {
        let metrics = self.current_metrics(now).await?;
        let batch_size = self.batch_provider.next_batch_size(&metrics).await;

        let mut waiting: Vec<_> = self
            .catalog
            .list_task_runs()
            .into_iter()
            .filter(|run| run.status == TaskRunStatus::Waiting)
            .collect();
        waiting.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.status_updated_at.cmp(&b.status_updated_at))
        });
        waiting.truncate(batch_size);

        let mut dispatched = 0;
        for mut run in waiting {
            run.status = TaskRunStatus::Queued;
            run.status_updated_at = now;
            self.catalog.update_task_run(run.clone());
            self.status_store
                .append(StatusLogEntry {
                    target_id: run.id,
                    timestamp: now,
                    status: TaskRunStatus::Queued,
                    description: None,
                })
                .await?;

            let command = OutboundCommand {
                command_type: CommandType::Execute,
                task_run: TaskRunSnapshot {
                    id: run.id,
                    task_id: run.task_id,
                    group_name: run.group_name.clone(),
                    priority: run.priority,
                    task_type: run.task_type,
                    payload: run.payload.clone(),
                    execution_bounds: run.execution_bounds.clone(),
                    execution_arguments: run.execution_arguments.clone(),
                    status: run.status,
                    status_updated_at: run.status_updated_at,
                },
            };
            if self.producer.send(command).await.is_ok() {
                dispatched += 1;
            }
        }
        Ok(dispatched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::ConstantBatchProvider;
    use crate::broker::in_process_channel;
    use crate::store::InMemoryStatusStore;
    use cadence_shared::{Priority, TaskRun, TaskType};

    fn waiting_run(id: TaskRunId, priority: Priority) -> TaskRun {
        TaskRun {
            id,
            task_id: 1,
            group_name: "g".into(),
            priority,
            task_type: TaskType::Pagination,
            payload: None,
            execution_bounds: None,
            execution_arguments: None,
            status: TaskRunStatus::Waiting,
            status_updated_at: Utc::now(),
            description: None,
        }
    }

    #[tokio::test]
    async fn dispatches_highest_priority_first_within_the_batch() {
        let catalog = Arc::new(InMemoryCatalog::new());
        catalog.create_task_run(waiting_run(0, Priority::Low));
        catalog.create_task_run(waiting_run(0, Priority::Highest));
        let status_store: Arc<dyn StatusStore<TaskRunId, TaskRunStatus>> =
            Arc::new(InMemoryStatusStore::new());
        let (producer, mut out_rx, _in_tx, _consumer) = in_process_channel(8);
        let dispatcher = Dispatcher::new(
            catalog,
            status_store,
            Box::new(ConstantBatchProvider::new(1)),
            Arc::new(producer),
            60,
            10,
        );
        let dispatched = dispatcher.dispatch_tick(Utc::now()).await.unwrap();
        assert_eq!(dispatched, 1);
        let command = out_rx.recv().await.unwrap();
        assert_eq!(command.task_run.priority, Priority::Highest);
    }
}
