//! JSON wire formats exchanged with external workers over the outbound
//! command channel and the inbound response channel (the message-broker
//! transport itself is out of scope for the core; see
//! [`crate::config`] for the in-process stand-in the engine ships).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::{ExecutionBounds, Payload, Priority, TaskId, TaskRunId, TaskRunStatus, TaskType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommandType {
    Execute,
    Cancel,
}

/// Denormalized snapshot of a task run, embedded in the outbound command
/// so workers don't need to look anything up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRunSnapshot {
    pub id: TaskRunId,
    pub task_id: TaskId,
    pub group_name: String,
    pub priority: Priority,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub payload: Option<Payload>,
    pub execution_bounds: Option<Vec<ExecutionBounds>>,
    pub execution_arguments: Option<BTreeMap<String, serde_json::Value>>,
    pub status: TaskRunStatus,
    pub status_updated_at: DateTime<Utc>,
}

/// Dispatched per run by the dispatcher (C6). Routing key is the run's
/// `group_name` unless overridden.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundCommand {
    #[serde(rename = "type")]
    pub command_type: CommandType,
    pub task_run: TaskRunSnapshot,
}

/// Minimal command reference carried inside a worker response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRef {
    #[serde(rename = "type")]
    pub command_type: CommandType,
    pub task_run: TaskRunSnapshot,
}

/// Results carried by a `SUCCEED` response for a `TIME_INTERVAL` task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeIntervalExecutionResults {
    pub right_bound_at: DateTime<Utc>,
    pub left_bound_at: DateTime<Utc>,
    pub collected_data_amount: Option<i64>,
    pub saved_data_amount: Option<i64>,
}

/// A worker's report on one dispatched command, consumed by the response
/// ingestor (C7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub command: CommandRef,
    pub status: TaskRunStatus,
    pub description: Option<String>,
    pub result: Option<TimeIntervalExecutionResults>,
    pub created_at: DateTime<Utc>,
}
