//! In-process catalog of `Task`, `Payload`, `TaskRun` rows and
//! `TimeIntervalTaskProgress` rows.
//!
//! The spec designates the status log (C1) as the one persistence
//! component in scope; task/payload/run *content* is treated the same way
//! the broker transport is — owned by an upstream system in a real
//! deployment, stood in here by an in-process store so the rest of the
//! engine has something concrete to read and write during tests and local
//! runs. Mirrors the teacher's `AgentDatabase` in shape (one guarded
//! connection-equivalent, one table-equivalent per entity) without
//! reaching for rusqlite where the spec doesn't ask for durability here.

use cadence_shared::{
    Payload, PayloadId, Task, TaskId, TaskRun, TaskRunId, TaskStatus, TimeIntervalTaskProgress,
};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct InMemoryCatalog {
    tasks: Mutex<HashMap<TaskId, Task>>,
    payloads_by_checksum: Mutex<HashMap<String, Payload>>,
    payloads_by_id: Mutex<HashMap<PayloadId, Payload>>,
    next_payload_id: Mutex<PayloadId>,
    progress: Mutex<HashMap<TaskId, TimeIntervalTaskProgress>>,
    task_runs: Mutex<HashMap<TaskRunId, TaskRun>>,
    next_task_run_id: Mutex<TaskRunId>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_task(&self, task: Task) {
        self.tasks.lock().expect("catalog mutex poisoned").insert(task.id, task);
    }

    pub fn get_task(&self, id: TaskId) -> Option<Task> {
        self.tasks.lock().expect("catalog mutex poisoned").get(&id).cloned()
    }

    pub fn list_tasks(&self) -> Vec<Task> {
        self.tasks.lock().expect("catalog mutex poisoned").values().cloned().collect()
    }

    pub fn set_task_status(&self, id: TaskId, status: TaskStatus, at: chrono::DateTime<chrono::Utc>) {
        if let Some(task) = self.tasks.lock().expect("catalog mutex poisoned").get_mut(&id) {
            task.status = status;
            task.status_updated_at = at;
        }
    }

    /// Inserts `data` as a payload, deduplicating on `checksum`: a payload
    /// with the same checksum already present is returned unchanged rather
    /// than inserted again (invariant P5: identical canonical data shares
    /// one payload row).
    pub fn resolve_payload(&self, data: serde_json::Value, checksum: String) -> Payload {
        let mut payloads = self.payloads_by_checksum.lock().expect("catalog mutex poisoned");
        if let Some(existing) = payloads.get(&checksum) {
            return existing.clone();
        }
        let mut next_id = self.next_payload_id.lock().expect("catalog mutex poisoned");
        *next_id += 1;
        let payload = Payload {
            id: *next_id,
            data,
            checksum: checksum.clone(),
        };
        payloads.insert(checksum, payload.clone());
        self.payloads_by_id
            .lock()
            .expect("catalog mutex poisoned")
            .insert(payload.id, payload.clone());
        payload
    }

    pub fn payload_by_id(&self, id: PayloadId) -> Option<Payload> {
        self.payloads_by_id.lock().expect("catalog mutex poisoned").get(&id).cloned()
    }

    pub fn get_progress(&self, task_id: TaskId) -> Option<TimeIntervalTaskProgress> {
        self.progress.lock().expect("catalog mutex poisoned").get(&task_id).cloned()
    }

    pub fn record_progress(&self, progress: TimeIntervalTaskProgress) {
        self.progress
            .lock()
            .expect("catalog mutex poisoned")
            .insert(progress.task_id, progress);
    }

    pub fn create_task_run(&self, mut run: TaskRun) -> TaskRun {
        let mut next_id = self.next_task_run_id.lock().expect("catalog mutex poisoned");
        *next_id += 1;
        run.id = *next_id;
        self.task_runs
            .lock()
            .expect("catalog mutex poisoned")
            .insert(run.id, run.clone());
        run
    }

    pub fn get_task_run(&self, id: TaskRunId) -> Option<TaskRun> {
        self.task_runs.lock().expect("catalog mutex poisoned").get(&id).cloned()
    }

    pub fn update_task_run(&self, run: TaskRun) {
        self.task_runs.lock().expect("catalog mutex poisoned").insert(run.id, run);
    }

    pub fn list_task_runs(&self) -> Vec<TaskRun> {
        self.task_runs.lock().expect("catalog mutex poisoned").values().cloned().collect()
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_payload_deduplicates_by_checksum() {
        let catalog = InMemoryCatalog::new();
        let data = serde_json::json!({"a": 1});
        let first = catalog.resolve_payload(data.clone(), "abc".into());
        let second = catalog.resolve_payload(data, "abc".into());
        assert_eq!(first.id, second.id);
    }
}
