//! In-memory `StatusStore`, used by the engine when no `sqlite_path` is
//! configured and throughout the test suite. Mirrors the shape of the
//! sqlite-backed store exactly so swapping one for the other is invisible
//! to callers.

use super::{average_duration_from_history, StatusStore};
use async_trait::async_trait;
use cadence_shared::{SchedulerResult, StatusCode, StatusLogEntry};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

pub struct InMemoryStatusStore<Id, Status> {
    history: Mutex<HashMap<Id, Vec<StatusLogEntry<Id, Status>>>>,
}

impl<Id, Status> Default for InMemoryStatusStore<Id, Status> {
    fn default() -> Self {
        Self {
            history: Mutex::new(HashMap::new()),
        }
    }
}

impl<Id, Status> InMemoryStatusStore<Id, Status> {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<Id, Status> StatusStore<Id, Status> for InMemoryStatusStore<Id, Status>
where
    Id: Copy + Eq + std::hash::Hash + Send + Sync,
    Status: StatusCode + Send + Sync,
{
    async fn append(&self, entry: StatusLogEntry<Id, Status>) -> SchedulerResult<()> {
        let mut history = self.history.lock().expect("status store mutex poisoned");
        history.entry(entry.target_id).or_default().push(entry);
        Ok(())
    }

    async fn current_status(&self, id: Id) -> SchedulerResult<Option<Status>> {
        let history = self.history.lock().expect("status store mutex poisoned");
        Ok(history
            .get(&id)
            .and_then(|entries| entries.last())
            .map(|entry| entry.status))
    }

    async fn current_entries(
        &self,
        statuses: Option<&HashSet<Status>>,
    ) -> SchedulerResult<Vec<StatusLogEntry<Id, Status>>> {
        let history = self.history.lock().expect("status store mutex poisoned");
        Ok(history
            .values()
            .filter_map(|entries| entries.last())
            .filter(|entry| statuses.is_none_or(|set| set.contains(&entry.status)))
            .cloned()
            .collect())
    }

    async fn count_with_status(&self, statuses: &HashSet<Status>) -> SchedulerResult<usize> {
        let history = self.history.lock().expect("status store mutex poisoned");
        Ok(history
            .values()
            .filter_map(|entries| entries.last())
            .filter(|entry| statuses.contains(&entry.status))
            .count())
    }

    async fn window_count(
        &self,
        statuses: &HashSet<Status>,
        window_seconds: i64,
        now: DateTime<Utc>,
    ) -> SchedulerResult<usize> {
        let cutoff = now - chrono::Duration::seconds(window_seconds);
        let history = self.history.lock().expect("status store mutex poisoned");
        Ok(history
            .values()
            .filter_map(|entries| entries.last())
            .filter(|entry| statuses.contains(&entry.status) && entry.timestamp >= cutoff)
            .count())
    }

    async fn window_total(
        &self,
        statuses: &HashSet<Status>,
        window_seconds: i64,
        now: DateTime<Utc>,
    ) -> SchedulerResult<usize> {
        let cutoff = now - chrono::Duration::seconds(window_seconds);
        let history = self.history.lock().expect("status store mutex poisoned");
        Ok(history
            .values()
            .flat_map(|entries| entries.iter())
            .filter(|entry| statuses.contains(&entry.status) && entry.timestamp >= cutoff)
            .count())
    }

    async fn average_duration_in_status(
        &self,
        target: Status,
        window_seconds: i64,
        now: DateTime<Utc>,
    ) -> SchedulerResult<f64> {
        let cutoff = now - chrono::Duration::seconds(window_seconds);
        let history = self.history.lock().expect("status store mutex poisoned");
        let mut durations = Vec::new();
        for entries in history.values() {
            let desc: Vec<(DateTime<Utc>, Status)> = entries
                .iter()
                .rev()
                .filter(|e| e.timestamp >= cutoff)
                .map(|e| (e.timestamp, e.status))
                .collect();
            durations.extend(average_duration_from_history(&desc, target, now));
        }
        if durations.is_empty() {
            return Ok(0.0);
        }
        Ok(durations.iter().sum::<f64>() / durations.len() as f64)
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> SchedulerResult<()> {
        let mut history = self.history.lock().expect("status store mutex poisoned");
        for entries in history.values_mut() {
            if entries.len() <= 1 {
                continue;
            }
            let keep_from = entries
                .iter()
                .rposition(|e| e.timestamp < cutoff)
                .unwrap_or(0);
            entries.drain(0..keep_from);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_shared::TaskRunStatus;

    fn entry(id: i64, ts: DateTime<Utc>, status: TaskRunStatus) -> StatusLogEntry<i64, TaskRunStatus> {
        StatusLogEntry {
            target_id: id,
            timestamp: ts,
            status,
            description: None,
        }
    }

    #[tokio::test]
    async fn current_status_is_last_appended() {
        let store: InMemoryStatusStore<i64, TaskRunStatus> = InMemoryStatusStore::new();
        let t0 = Utc::now();
        store.append(entry(1, t0, TaskRunStatus::Waiting)).await.unwrap();
        store
            .append(entry(1, t0 + chrono::Duration::seconds(5), TaskRunStatus::Queued))
            .await
            .unwrap();
        assert_eq!(store.current_status(1).await.unwrap(), Some(TaskRunStatus::Queued));
    }

    #[tokio::test]
    async fn window_count_excludes_stale_transitions() {
        let store: InMemoryStatusStore<i64, TaskRunStatus> = InMemoryStatusStore::new();
        let now = Utc::now();
        store
            .append(entry(1, now - chrono::Duration::seconds(120), TaskRunStatus::Succeed))
            .await
            .unwrap();
        store
            .append(entry(2, now - chrono::Duration::seconds(5), TaskRunStatus::Succeed))
            .await
            .unwrap();
        let mut set = HashSet::new();
        set.insert(TaskRunStatus::Succeed);
        let count = store.window_count(&set, 60, now).await.unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn average_duration_excludes_open_streak() {
        let store: InMemoryStatusStore<i64, TaskRunStatus> = InMemoryStatusStore::new();
        let now = Utc::now();
        store
            .append(entry(1, now - chrono::Duration::seconds(100), TaskRunStatus::Execution))
            .await
            .unwrap();
        store
            .append(entry(1, now - chrono::Duration::seconds(90), TaskRunStatus::Succeed))
            .await
            .unwrap();
        store
            .append(entry(1, now - chrono::Duration::seconds(10), TaskRunStatus::Execution))
            .await
            .unwrap();
        let avg = store
            .average_duration_in_status(TaskRunStatus::Execution, 3600, now)
            .await
            .unwrap();
        assert!((avg - 10.0).abs() < 0.001);
    }
}
