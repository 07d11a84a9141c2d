//! Domain model: tasks, task runs, their status machines, and the
//! polymorphic variants (monitoring algorithm, execution bounds) that
//! drive them.
//!
//! Polymorphism is modeled as tagged enums dispatched on a `kind`/`type`
//! field rather than trait objects or inheritance, per the design notes:
//! algorithm families are closed sets known up front.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stable identifier for a [`Task`].
pub type TaskId = i64;
/// Stable identifier for a [`TaskRun`].
pub type TaskRunId = i64;
/// Stable identifier for a [`Payload`].
pub type PayloadId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Lowest,
    Low,
    Medium,
    High,
    Highest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskType {
    Undefined,
    TimeInterval,
    Pagination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    New,
    Execution,
    Succeed,
    Cancelled,
    Finished,
    Error,
}

/// A compact, storage-friendly textual representation for a status enum.
/// Implemented for [`TaskStatus`] and [`TaskRunStatus`] so the status
/// store (generic over either) can persist/parse statuses without pulling
/// in a serialization round-trip.
pub trait StatusCode: Copy + Eq + std::hash::Hash {
    fn as_str(&self) -> &'static str;
    fn from_str(s: &str) -> Option<Self>
    where
        Self: Sized;
}

impl StatusCode for TaskStatus {
    fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::New => "NEW",
            TaskStatus::Execution => "EXECUTION",
            TaskStatus::Succeed => "SUCCEED",
            TaskStatus::Cancelled => "CANCELLED",
            TaskStatus::Finished => "FINISHED",
            TaskStatus::Error => "ERROR",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "NEW" => TaskStatus::New,
            "EXECUTION" => TaskStatus::Execution,
            "SUCCEED" => TaskStatus::Succeed,
            "CANCELLED" => TaskStatus::Cancelled,
            "FINISHED" => TaskStatus::Finished,
            "ERROR" => TaskStatus::Error,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskRunStatus {
    Waiting,
    Queued,
    Execution,
    Succeed,
    Error,
    Cancelled,
    TempError,
    Interrupted,
}

impl StatusCode for TaskRunStatus {
    fn as_str(&self) -> &'static str {
        match self {
            TaskRunStatus::Waiting => "WAITING",
            TaskRunStatus::Queued => "QUEUED",
            TaskRunStatus::Execution => "EXECUTION",
            TaskRunStatus::Succeed => "SUCCEED",
            TaskRunStatus::Error => "ERROR",
            TaskRunStatus::Cancelled => "CANCELLED",
            TaskRunStatus::TempError => "TEMP_ERROR",
            TaskRunStatus::Interrupted => "INTERRUPTED",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "WAITING" => TaskRunStatus::Waiting,
            "QUEUED" => TaskRunStatus::Queued,
            "EXECUTION" => TaskRunStatus::Execution,
            "SUCCEED" => TaskRunStatus::Succeed,
            "ERROR" => TaskRunStatus::Error,
            "CANCELLED" => TaskRunStatus::Cancelled,
            "TEMP_ERROR" => TaskRunStatus::TempError,
            "INTERRUPTED" => TaskRunStatus::Interrupted,
            _ => return None,
        })
    }
}

/// A recurring monitoring specification. Mutated only by the run
/// materializer (C4); never deleted by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub group_name: String,
    pub priority: Priority,
    pub task_type: TaskType,
    pub monitoring_algorithm: MonitoringAlgorithm,
    pub execution_arguments: Option<BTreeMap<String, serde_json::Value>>,
    pub payload_id: Option<PayloadId>,
    pub status: TaskStatus,
    pub status_updated_at: DateTime<Utc>,
    pub loaded_at: DateTime<Utc>,
}

/// One concrete attempt to execute a task over one slice of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRun {
    pub id: TaskRunId,
    pub task_id: TaskId,
    pub group_name: String,
    pub priority: Priority,
    pub task_type: TaskType,
    pub payload: Option<Payload>,
    pub execution_bounds: Option<Vec<ExecutionBounds>>,
    pub execution_arguments: Option<BTreeMap<String, serde_json::Value>>,
    pub status: TaskRunStatus,
    pub status_updated_at: DateTime<Utc>,
    pub description: Option<String>,
}

/// Append-only status record. `(target_id, timestamp)` is the primary key
/// for both the task and task-run variants of this log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusLogEntry<Id, Status> {
    pub target_id: Id,
    pub timestamp: DateTime<Utc>,
    pub status: Status,
    pub description: Option<String>,
}

pub type TaskStatusLog = StatusLogEntry<TaskId, TaskStatus>;
pub type TaskRunStatusLog = StatusLogEntry<TaskRunId, TaskRunStatus>;

/// Content-addressed opaque job input. Two payloads with equal canonical
/// `data` share the same `checksum`; inserting a duplicate returns the
/// pre-existing row (deduplication, see [`crate::checksum::canonical_checksum`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payload {
    pub id: PayloadId,
    pub data: serde_json::Value,
    pub checksum: String,
}

/// Determines which tasks become due for a new run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "UPPERCASE")]
pub enum MonitoringAlgorithm {
    Periodic {
        timeout_seconds: i64,
        timeout_noise_seconds: i64,
    },
    Single {
        /// Ordered timeouts between successive runs. Empty means "run
        /// once forever" — a single interval `[loaded_at, +inf)`.
        timeouts_seconds: Vec<i64>,
        timeout_noise_seconds: i64,
    },
}

/// The work-slice assigned to a run. Currently only time intervals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionBounds {
    TimeInterval {
        left_bound_at: Option<DateTime<Utc>>,
        right_bound_at: DateTime<Utc>,
    },
}

/// `(task_id, right_bound_at)` primary key. Written by the response
/// ingestor (C7) on successful execution carrying results; read by the
/// execution-bounds provider (C2) to decide the next slice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeIntervalTaskProgress {
    pub task_id: TaskId,
    pub right_bound_at: DateTime<Utc>,
    pub left_bound_at: DateTime<Utc>,
    pub collected_data_amount: Option<i64>,
    pub saved_data_amount: Option<i64>,
}
