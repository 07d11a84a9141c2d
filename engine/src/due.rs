//! C3 Due-Task Provider Registry: decides which `Task`s are due for a new
//! run, dispatching per `MonitoringAlgorithm` variant the way the original
//! `TaskToExecuteProviderRegistry` fanned out to one repo per algorithm
//! type and awaited them concurrently (`asyncio.gather`) rather than
//! serially — here expressed as a `tokio::join!` over the two algorithm
//! partitions.
//!
//! Due-ness is driven entirely by the task's own `status`/`status_updated_at`
//! (no separate run-history side table): a periodic task is due once its
//! status has sat in `EXECUTION`/`SUCCEED` longer than its timeout, and a
//! single-schedule task is due once `now` falls inside the next unconsumed
//! interval of its cumulative schedule.
//!
//! Jitter (`timeout_noise_seconds`) keeps a fleet of identically-configured
//! periodic tasks from all coming due in the same tick forever. For the
//! single-schedule algorithm the per-interval jitter must stay stable
//! across repeated due-ness checks (the interval boundaries themselves
//! must not move), so it's derived deterministically from `(task_id,
//! interval_index)` rather than resampled on every check.

use cadence_shared::{MonitoringAlgorithm, Task, TaskId, TaskStatus};
use chrono::{DateTime, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Returns a pseudo-random jitter in `[-noise_seconds, noise_seconds]`,
/// resampled on every call — used for the periodic algorithm, where the
/// specification applies noise "per materialization".
fn jitter(noise_seconds: i64) -> i64 {
    if noise_seconds <= 0 {
        return 0;
    }
    rand::rng().random_range(-noise_seconds..=noise_seconds)
}

/// Deterministic jitter for one `(task_id, interval_index)` pair, stable
/// across repeated evaluations so a single-schedule task's interval
/// boundaries don't drift between due-ness checks.
fn stable_jitter(task_id: TaskId, interval_index: usize, noise_seconds: i64) -> i64 {
    if noise_seconds <= 0 {
        return 0;
    }
    let seed = (task_id as u64)
        .wrapping_mul(0x9E3779B97F4A7C15)
        .wrapping_add(interval_index as u64);
    StdRng::seed_from_u64(seed).random_range(-noise_seconds..=noise_seconds)
}

/// Task is due iff `status = NEW` or (`status` in `{EXECUTION, SUCCEED}`
/// and its timeout, plus per-check jitter, has elapsed since
/// `status_updated_at`). §4.2.
fn is_periodic_due(
    status: TaskStatus,
    status_updated_at: DateTime<Utc>,
    timeout_seconds: i64,
    timeout_noise_seconds: i64,
    now: DateTime<Utc>,
) -> bool {
    match status {
        TaskStatus::New => true,
        TaskStatus::Execution | TaskStatus::Succeed => {
            let due_at = status_updated_at
                + chrono::Duration::seconds(timeout_seconds + jitter(timeout_noise_seconds));
            now >= due_at
        }
        _ => false,
    }
}

/// One half-open interval of a single-schedule task's cumulative timeline.
/// `right` is `None` for the final, unbounded interval.
struct ScheduleInterval {
    left: DateTime<Utc>,
    right: Option<DateTime<Utc>>,
}

/// Computes the cumulative interval boundaries for a single-schedule task:
/// interval `k` starts at `loaded_at + sum(timeouts[i] + noise_i for i <
/// k)` and ends at the next boundary; the last interval is unbounded. An
/// empty `timeouts_seconds` produces one interval, `[loaded_at, +inf)`.
fn single_schedule_intervals(
    task_id: TaskId,
    loaded_at: DateTime<Utc>,
    timeouts_seconds: &[i64],
    timeout_noise_seconds: i64,
) -> Vec<ScheduleInterval> {
    let mut boundaries = Vec::with_capacity(timeouts_seconds.len() + 1);
    boundaries.push(loaded_at);
    let mut cursor = loaded_at;
    for (i, &timeout) in timeouts_seconds.iter().enumerate() {
        cursor += chrono::Duration::seconds(timeout + stable_jitter(task_id, i, timeout_noise_seconds));
        boundaries.push(cursor);
    }
    boundaries
        .windows(2)
        .map(|w| ScheduleInterval {
            left: w[0],
            right: Some(w[1]),
        })
        .chain(std::iter::once(ScheduleInterval {
            left: *boundaries.last().expect("at least loaded_at is pushed"),
            right: None,
        }))
        .collect()
}

/// Task is due iff `now` falls in an interval of its cumulative schedule
/// and (`status = NEW` or (`status = SUCCEED` and `status_updated_at` is
/// still within the previous interval, i.e. precedes this interval's left
/// bound)). §4.2.
fn is_single_due(
    task_id: TaskId,
    status: TaskStatus,
    status_updated_at: DateTime<Utc>,
    loaded_at: DateTime<Utc>,
    timeouts_seconds: &[i64],
    timeout_noise_seconds: i64,
    now: DateTime<Utc>,
) -> bool {
    if !matches!(status, TaskStatus::New | TaskStatus::Succeed) {
        return false;
    }
    let intervals = single_schedule_intervals(task_id, loaded_at, timeouts_seconds, timeout_noise_seconds);
    let current = intervals
        .iter()
        .find(|iv| now >= iv.left && iv.right.is_none_or(|r| now < r));
    let Some(interval) = current else {
        return false;
    };
    match status {
        TaskStatus::New => true,
        TaskStatus::Succeed => status_updated_at < interval.left,
        _ => unreachable!(),
    }
}

pub struct DueTaskRegistry;

impl DueTaskRegistry {
    pub fn new() -> Self {
        Self
    }

    /// Concurrently evaluates the periodic and single-schedule partitions
    /// of `tasks` and returns the ids due to run at `now`.
    pub async fn provide_tasks_to_execute(&self, tasks: &[Task], now: DateTime<Utc>) -> Vec<TaskId> {
        let (periodic, single): (Vec<_>, Vec<_>) = tasks
            .iter()
            .partition(|task| matches!(task.monitoring_algorithm, MonitoringAlgorithm::Periodic { .. }));

        let periodic_due = async {
            periodic
                .into_iter()
                .filter_map(|task| {
                    let MonitoringAlgorithm::Periodic {
                        timeout_seconds,
                        timeout_noise_seconds,
                    } = task.monitoring_algorithm
                    else {
                        unreachable!()
                    };
                    is_periodic_due(
                        task.status,
                        task.status_updated_at,
                        timeout_seconds,
                        timeout_noise_seconds,
                        now,
                    )
                    .then_some(task.id)
                })
                .collect::<Vec<_>>()
        };
        let single_due = async {
            single
                .into_iter()
                .filter_map(|task| {
                    let MonitoringAlgorithm::Single {
                        ref timeouts_seconds,
                        timeout_noise_seconds,
                    } = task.monitoring_algorithm
                    else {
                        unreachable!()
                    };
                    is_single_due(
                        task.id,
                        task.status,
                        task.status_updated_at,
                        task.loaded_at,
                        timeouts_seconds,
                        timeout_noise_seconds,
                        now,
                    )
                    .then_some(task.id)
                })
                .collect::<Vec<_>>()
        };

        let (mut periodic_ids, single_ids) = tokio::join!(periodic_due, single_due);
        periodic_ids.extend(single_ids);
        periodic_ids
    }
}

impl Default for DueTaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_shared::{Priority, TaskType};

    fn task_with(
        algorithm: MonitoringAlgorithm,
        loaded_at: DateTime<Utc>,
        status: TaskStatus,
        status_updated_at: DateTime<Utc>,
    ) -> Task {
        Task {
            id: 1,
            group_name: "g".into(),
            priority: Priority::Medium,
            task_type: TaskType::TimeInterval,
            monitoring_algorithm: algorithm,
            execution_arguments: None,
            payload_id: None,
            status,
            status_updated_at,
            loaded_at,
        }
    }

    #[tokio::test]
    async fn periodic_task_is_due_once_the_timeout_elapses() {
        let now = Utc::now();
        let status_updated_at = now - chrono::Duration::seconds(100);
        let task = task_with(
            MonitoringAlgorithm::Periodic {
                timeout_seconds: 60,
                timeout_noise_seconds: 0,
            },
            status_updated_at,
            TaskStatus::Execution,
            status_updated_at,
        );
        let registry = DueTaskRegistry::new();
        let due = registry.provide_tasks_to_execute(&[task], now).await;
        assert_eq!(due, vec![1]);
    }

    #[tokio::test]
    async fn periodic_task_not_yet_due_is_excluded() {
        let now = Utc::now();
        let status_updated_at = now - chrono::Duration::seconds(10);
        let task = task_with(
            MonitoringAlgorithm::Periodic {
                timeout_seconds: 60,
                timeout_noise_seconds: 0,
            },
            status_updated_at,
            TaskStatus::Execution,
            status_updated_at,
        );
        let registry = DueTaskRegistry::new();
        let due = registry.provide_tasks_to_execute(&[task], now).await;
        assert!(due.is_empty());
    }

    #[tokio::test]
    async fn new_periodic_task_is_immediately_due() {
        let now = Utc::now();
        let task = task_with(
            MonitoringAlgorithm::Periodic {
                timeout_seconds: 60,
                timeout_noise_seconds: 0,
            },
            now,
            TaskStatus::New,
            now,
        );
        let registry = DueTaskRegistry::new();
        let due = registry.provide_tasks_to_execute(&[task], now).await;
        assert_eq!(due, vec![1]);
    }

    // Scenario S6: timeouts=[100, 200], loaded_at=t=0 => intervals
    // [0,100), [100,300), [300, +inf).
    #[tokio::test]
    async fn single_schedule_task_becomes_due_at_its_next_scheduled_timeout() {
        let loaded_at = Utc::now() - chrono::Duration::seconds(1000);
        let algorithm = MonitoringAlgorithm::Single {
            timeouts_seconds: vec![100, 200],
            timeout_noise_seconds: 0,
        };
        let registry = DueTaskRegistry::new();

        // t=50 with status NEW => ready (falls in the first interval).
        let at_50 = task_with(algorithm.clone(), loaded_at, TaskStatus::New, loaded_at);
        let now_50 = loaded_at + chrono::Duration::seconds(50);
        assert_eq!(registry.provide_tasks_to_execute(&[at_50], now_50).await, vec![1]);

        // t=150 with SUCCEED and status_updated_at = loaded_at+60 => ready
        // (60 < 100, the left bound of the [100,300) interval).
        let now_150 = loaded_at + chrono::Duration::seconds(150);
        let ready_at_150 = task_with(
            algorithm.clone(),
            loaded_at,
            TaskStatus::Succeed,
            loaded_at + chrono::Duration::seconds(60),
        );
        assert_eq!(
            registry.provide_tasks_to_execute(&[ready_at_150], now_150).await,
            vec![1]
        );

        // t=150 with SUCCEED and status_updated_at = loaded_at+120 => not
        // ready (120 >= 100).
        let not_ready_at_150 = task_with(
            algorithm,
            loaded_at,
            TaskStatus::Succeed,
            loaded_at + chrono::Duration::seconds(120),
        );
        assert!(registry
            .provide_tasks_to_execute(&[not_ready_at_150], now_150)
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn single_schedule_task_runs_out_once_timeouts_are_exhausted() {
        let loaded_at = Utc::now() - chrono::Duration::seconds(1000);
        let algorithm = MonitoringAlgorithm::Single {
            timeouts_seconds: vec![60],
            timeout_noise_seconds: 0,
        };
        // Far beyond the final, unbounded interval's left edge, but the
        // task already succeeded inside that same interval - not due
        // again since this algorithm never schedules a third run.
        let task = task_with(
            algorithm,
            loaded_at,
            TaskStatus::Succeed,
            loaded_at + chrono::Duration::seconds(500),
        );
        let now = loaded_at + chrono::Duration::seconds(999);
        let registry = DueTaskRegistry::new();
        assert!(registry.provide_tasks_to_execute(&[task], now).await.is_empty());
    }
}
