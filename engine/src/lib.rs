//! `cadence-engine`: the task-run lifecycle state machine and adaptive
//! batch dispatcher at the core of the scheduler.
//!
//! Wires together the ten components the design splits the engine into —
//! status store (C1), execution-bounds provider (C2), due-task registry
//! (C3), run materializer (C4), batch provider (C5), dispatcher (C6),
//! response ingestor (C7), timeout transitioner (C8), periodic runner (C9),
//! metric collector (C10) — plus the in-process broker stand-in and run
//! catalog that make the rest testable without an external message broker
//! or SQL database.

pub mod batch;
pub mod bounds;
pub mod broker;
pub mod catalog;
pub mod dispatch;
pub mod due;
pub mod ingest;
pub mod materializer;
pub mod metrics;
pub mod runner;
pub mod store;
pub mod timeout;

use crate::bounds::ExecutionBoundsProvider;
use crate::broker::{InboundConsumer, OutboundProducer};
use crate::catalog::InMemoryCatalog;
use crate::dispatch::Dispatcher;
use crate::due::DueTaskRegistry;
use crate::ingest::ResponseIngestor;
use crate::materializer::RunMaterializer;
use crate::metrics::MetricCollector;
use crate::runner::{PeriodicRunner, RunningRunner};
use crate::store::StatusStore;
use crate::timeout::TimeoutTransitioner;
use cadence_shared::config::EngineConfig;
use cadence_shared::{SchedulerResult, TaskId, TaskRunId, TaskStatus, TaskRunStatus};
use std::sync::Arc;
use std::time::Duration;

/// Status store for task statuses, shared behind a trait object so either
/// backend (in-memory or sqlite) can be plugged in at startup.
pub type TaskStatusStore = Arc<dyn StatusStore<TaskId, TaskStatus>>;
/// Status store for task-run statuses, same rationale as [`TaskStatusStore`].
pub type TaskRunStatusStore = Arc<dyn StatusStore<TaskRunId, TaskRunStatus>>;

/// Everything the engine needs at runtime, assembled once at startup.
pub struct Engine {
    pub catalog: Arc<InMemoryCatalog>,
    pub task_status_store: TaskStatusStore,
    pub task_run_status_store: TaskRunStatusStore,
    pub metrics: Arc<MetricCollector>,
    config: EngineConfig,
    batch_provider_config: cadence_shared::config::BatchProviderConfig,
}

impl Engine {
    /// Builds an engine against in-memory stores (used when `config`
    /// carries no `sqlite_path`) or sqlite-backed ones otherwise.
    pub fn new(config: EngineConfig) -> SchedulerResult<Self> {
        let (task_status_store, task_run_status_store): (TaskStatusStore, TaskRunStatusStore) = match &config.sqlite_path {
            Some(path) => (
                Arc::new(store::SqliteStatusStore::open(path, "task_status")?),
                Arc::new(store::SqliteStatusStore::open(path, "task_run_status")?),
            ),
            None => (
                Arc::new(store::InMemoryStatusStore::new()),
                Arc::new(store::InMemoryStatusStore::new()),
            ),
        };

        let catalog = Arc::new(InMemoryCatalog::new());
        let metrics = Arc::new(MetricCollector::new(
            catalog.clone(),
            task_run_status_store.clone(),
            config.metrics_window_seconds as i64,
        ));
        let batch_provider_config = config.batch_provider.clone();

        Ok(Self {
            catalog,
            task_status_store,
            task_run_status_store,
            metrics,
            config,
            batch_provider_config,
        })
    }

    /// Registers every engine job on a fresh [`PeriodicRunner`] and starts
    /// it, driving the dispatcher through the outbound side of `producer`
    /// and ingesting worker responses from `consumer`.
    pub fn start(
        &self,
        producer: Arc<dyn OutboundProducer>,
        consumer: Arc<dyn InboundConsumer>,
    ) -> RunningRunner {
        let mut runner = PeriodicRunner::new();
        let tick_period = Duration::from_secs(self.config.run_timeout_seconds);

        let due_registry = Arc::new(DueTaskRegistry::new());
        let materializer = Arc::new(RunMaterializer::new(
            self.catalog.clone(),
            self.task_status_store.clone(),
            self.task_run_status_store.clone(),
            ExecutionBoundsProvider::new(
                self.config.default_first_interval_days,
                self.config.default_left_date,
            ),
        ));
        {
            let catalog = self.catalog.clone();
            let due_registry = due_registry.clone();
            let materializer = materializer.clone();
            runner.register("materialize-due-tasks", tick_period, None, move || {
                let catalog = catalog.clone();
                let due_registry = due_registry.clone();
                let materializer = materializer.clone();
                async move {
                    let now = chrono::Utc::now();
                    let tasks = catalog.list_tasks();
                    let due = due_registry.provide_tasks_to_execute(&tasks, now).await;
                    for task_id in due {
                        materializer.materialize(task_id, now).await;
                    }
                }
            });
        }

        {
            let dispatcher = Arc::new(Dispatcher::new(
                self.catalog.clone(),
                self.task_run_status_store.clone(),
                batch::from_config(&self.batch_provider_config),
                producer.clone(),
                self.config.metrics_window_seconds as i64,
                self.config.queue_capacity,
            ));
            runner.register("dispatch", tick_period, None, move || {
                let dispatcher = dispatcher.clone();
                async move {
                    let _ = dispatcher.dispatch_tick(chrono::Utc::now()).await;
                }
            });
        }

        {
            let ingestor = Arc::new(ResponseIngestor::new(
                self.catalog.clone(),
                self.task_run_status_store.clone(),
            ));
            let consumer = consumer.clone();
            runner.register("ingest-responses", Duration::from_secs(1), None, move || {
                let ingestor = ingestor.clone();
                let consumer = consumer.clone();
                async move {
                    ingestor.drain_available(consumer.as_ref(), chrono::Utc::now()).await;
                }
            });
        }

        {
            let transitioner = Arc::new(TimeoutTransitioner::new(
                self.catalog.clone(),
                self.task_run_status_store.clone(),
                self.config.queued_ttl_seconds,
                self.config.execution_ttl_seconds,
                self.config.temp_error_ttl_seconds,
            ));
            runner.register("sweep-timeouts", tick_period, None, move || {
                let transitioner = transitioner.clone();
                async move {
                    transitioner.sweep(chrono::Utc::now()).await;
                }
            });
        }

        {
            let metrics = self.metrics.clone();
            runner.register(
                "collect-metrics",
                Duration::from_secs(self.config.metric_provider_period_seconds),
                None,
                move || {
                    let metrics = metrics.clone();
                    async move {
                        let snapshot = metrics.snapshot(chrono::Utc::now()).await;
                        tracing::info!(?snapshot, "metric snapshot");
                    }
                },
            );
        }

        runner.start()
    }
}
