//! rusqlite-backed `StatusStore`, the production counterpart to
//! [`super::memory::InMemoryStatusStore`]. One table per instantiation
//! (`table_name` is supplied by the caller so the task and task-run domains
//! land in separate tables of the same database file), following the
//! teacher's `AgentDatabase` pattern of a single `Connection` guarded by a
//! `Mutex` and one `init_schema` per table.

use super::{average_duration_from_history, StatusStore};
use async_trait::async_trait;
use cadence_shared::{SchedulerError, SchedulerResult, StatusCode, StatusLogEntry};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::Connection;
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Mutex;

pub struct SqliteStatusStore<Id, Status> {
    conn: Mutex<Connection>,
    table: &'static str,
    _id: PhantomData<Id>,
    _status: PhantomData<Status>,
}

impl<Id, Status> SqliteStatusStore<Id, Status>
where
    Id: Send,
    Status: Send,
{
    /// Opens (creating if absent) the status log table `table` in the
    /// sqlite database at `path`.
    pub fn open(path: &str, table: &'static str) -> SchedulerResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| SchedulerError::StoreFatal(format!("open {path}: {e}")))?;
        Self::init_schema(&conn, table)?;
        Ok(Self {
            conn: Mutex::new(conn),
            table,
            _id: PhantomData,
            _status: PhantomData,
        })
    }

    pub fn open_in_memory(table: &'static str) -> SchedulerResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SchedulerError::StoreFatal(format!("open in-memory sqlite: {e}")))?;
        Self::init_schema(&conn, table)?;
        Ok(Self {
            conn: Mutex::new(conn),
            table,
            _id: PhantomData,
            _status: PhantomData,
        })
    }

    fn init_schema(conn: &Connection, table: &str) -> SchedulerResult<()> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                target_id INTEGER NOT NULL,
                timestamp_ms INTEGER NOT NULL,
                status TEXT NOT NULL,
                description TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_{table}_target ON {table}(target_id, timestamp_ms, seq);"
        ))
        .map_err(|e| SchedulerError::StoreFatal(format!("init schema for {table}: {e}")))
    }
}

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

#[async_trait]
impl<Id, Status> StatusStore<Id, Status> for SqliteStatusStore<Id, Status>
where
    Id: Copy + Eq + std::hash::Hash + Send + Sync + Into<i64> + From<i64>,
    Status: StatusCode + Send + Sync,
{
    async fn append(&self, entry: StatusLogEntry<Id, Status>) -> SchedulerResult<()> {
        // Plain insert, never replace: the status log is append-only (P-ish
        // invariant — two transitions for the same target within the same
        // millisecond must both be preserved, not overwrite each other).
        let conn = self.conn.lock().expect("sqlite status store mutex poisoned");
        conn.execute(
            &format!(
                "INSERT INTO {} (target_id, timestamp_ms, status, description) VALUES (?1, ?2, ?3, ?4)",
                self.table
            ),
            rusqlite::params![
                entry.target_id.into(),
                to_millis(entry.timestamp),
                entry.status.as_str(),
                entry.description,
            ],
        )
        .map_err(|e| SchedulerError::StoreTransient(format!("append to {}: {e}", self.table)))?;
        Ok(())
    }

    async fn current_status(&self, id: Id) -> SchedulerResult<Option<Status>> {
        let conn = self.conn.lock().expect("sqlite status store mutex poisoned");
        let status: Option<String> = conn
            .query_row(
                &format!(
                    "SELECT status FROM {} WHERE target_id = ?1 ORDER BY timestamp_ms DESC, seq DESC LIMIT 1",
                    self.table
                ),
                rusqlite::params![id.into()],
                |row| row.get(0),
            )
            .ok();
        Ok(status.and_then(|s| Status::from_str(&s)))
    }

    async fn current_entries(
        &self,
        statuses: Option<&HashSet<Status>>,
    ) -> SchedulerResult<Vec<StatusLogEntry<Id, Status>>> {
        let conn = self.conn.lock().expect("sqlite status store mutex poisoned");
        let query = format!(
            "SELECT target_id, timestamp_ms, status, description FROM {} t1
             WHERE seq = (SELECT t2.seq FROM {} t2 WHERE t2.target_id = t1.target_id
                          ORDER BY t2.timestamp_ms DESC, t2.seq DESC LIMIT 1)",
            self.table, self.table
        );
        let mut stmt = conn
            .prepare(&query)
            .map_err(|e| SchedulerError::StoreTransient(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                let target_id: i64 = row.get(0)?;
                let ts: i64 = row.get(1)?;
                let status: String = row.get(2)?;
                let description: Option<String> = row.get(3)?;
                Ok((target_id, ts, status, description))
            })
            .map_err(|e| SchedulerError::StoreTransient(e.to_string()))?;
        let mut out = Vec::new();
        for row in rows {
            let (target_id, ts, status, description) =
                row.map_err(|e| SchedulerError::StoreTransient(e.to_string()))?;
            let Some(status) = Status::from_str(&status) else {
                continue;
            };
            if statuses.is_some_and(|set| !set.contains(&status)) {
                continue;
            }
            out.push(StatusLogEntry {
                target_id: target_id.into(),
                timestamp: from_millis(ts),
                status,
                description,
            });
        }
        Ok(out)
    }

    async fn count_with_status(&self, statuses: &HashSet<Status>) -> SchedulerResult<usize> {
        Ok(self.current_entries(Some(statuses)).await?.len())
    }

    async fn window_count(
        &self,
        statuses: &HashSet<Status>,
        window_seconds: i64,
        now: DateTime<Utc>,
    ) -> SchedulerResult<usize> {
        let cutoff = to_millis(now - chrono::Duration::seconds(window_seconds));
        Ok(self
            .current_entries(Some(statuses))
            .await?
            .into_iter()
            .filter(|e| to_millis(e.timestamp) >= cutoff)
            .count())
    }

    async fn window_total(
        &self,
        statuses: &HashSet<Status>,
        window_seconds: i64,
        now: DateTime<Utc>,
    ) -> SchedulerResult<usize> {
        let cutoff = to_millis(now - chrono::Duration::seconds(window_seconds));
        let conn = self.conn.lock().expect("sqlite status store mutex poisoned");
        let mut stmt = conn
            .prepare(&format!(
                "SELECT status FROM {} WHERE timestamp_ms >= ?1",
                self.table
            ))
            .map_err(|e| SchedulerError::StoreTransient(e.to_string()))?;
        let rows = stmt
            .query_map(rusqlite::params![cutoff], |row| row.get::<_, String>(0))
            .map_err(|e| SchedulerError::StoreTransient(e.to_string()))?;
        let mut count = 0;
        for row in rows {
            let status = row.map_err(|e| SchedulerError::StoreTransient(e.to_string()))?;
            if let Some(status) = Status::from_str(&status) {
                if statuses.contains(&status) {
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    async fn average_duration_in_status(
        &self,
        target: Status,
        window_seconds: i64,
        now: DateTime<Utc>,
    ) -> SchedulerResult<f64> {
        let cutoff = to_millis(now - chrono::Duration::seconds(window_seconds));
        let conn = self.conn.lock().expect("sqlite status store mutex poisoned");
        let mut ids_stmt = conn
            .prepare(&format!(
                "SELECT DISTINCT target_id FROM {} WHERE timestamp_ms >= ?1",
                self.table
            ))
            .map_err(|e| SchedulerError::StoreTransient(e.to_string()))?;
        let ids: Vec<i64> = ids_stmt
            .query_map(rusqlite::params![cutoff], |row| row.get(0))
            .map_err(|e| SchedulerError::StoreTransient(e.to_string()))?
            .collect::<Result<_, _>>()
            .map_err(|e| SchedulerError::StoreTransient(e.to_string()))?;

        let mut durations = Vec::new();
        for id in ids {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT timestamp_ms, status FROM {} WHERE target_id = ?1 AND timestamp_ms >= ?2 ORDER BY timestamp_ms DESC, seq DESC",
                    self.table
                ))
                .map_err(|e| SchedulerError::StoreTransient(e.to_string()))?;
            let desc: Vec<(DateTime<Utc>, Status)> = stmt
                .query_map(rusqlite::params![id, cutoff], |row| {
                    let ts: i64 = row.get(0)?;
                    let status: String = row.get(1)?;
                    Ok((ts, status))
                })
                .map_err(|e| SchedulerError::StoreTransient(e.to_string()))?
                .filter_map(|r| r.ok())
                .filter_map(|(ts, status)| Status::from_str(&status).map(|s| (from_millis(ts), s)))
                .collect();
            durations.extend(average_duration_from_history(&desc, target, now));
        }
        if durations.is_empty() {
            return Ok(0.0);
        }
        Ok(durations.iter().sum::<f64>() / durations.len() as f64)
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> SchedulerResult<()> {
        let cutoff_ms = to_millis(cutoff);
        let conn = self.conn.lock().expect("sqlite status store mutex poisoned");
        conn.execute(
            &format!(
                "DELETE FROM {} WHERE timestamp_ms < ?1 AND target_id IN (
                    SELECT target_id FROM {} GROUP BY target_id HAVING MAX(timestamp_ms) >= ?1
                 )",
                self.table, self.table
            ),
            rusqlite::params![cutoff_ms],
        )
        .map_err(|e| SchedulerError::StoreTransient(format!("prune {}: {e}", self.table)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_shared::TaskRunStatus;

    #[tokio::test]
    async fn append_and_read_current_status() {
        let store: SqliteStatusStore<i64, TaskRunStatus> =
            SqliteStatusStore::open_in_memory("task_run_status").unwrap();
        let now = Utc::now();
        store
            .append(StatusLogEntry {
                target_id: 1,
                timestamp: now,
                status: TaskRunStatus::Queued,
                description: None,
            })
            .await
            .unwrap();
        assert_eq!(store.current_status(1).await.unwrap(), Some(TaskRunStatus::Queued));
    }

    #[tokio::test]
    async fn append_preserves_both_entries_for_the_same_millisecond() {
        let store: SqliteStatusStore<i64, TaskRunStatus> =
            SqliteStatusStore::open_in_memory("task_run_status").unwrap();
        let now = Utc::now();
        store
            .append(StatusLogEntry {
                target_id: 1,
                timestamp: now,
                status: TaskRunStatus::Queued,
                description: None,
            })
            .await
            .unwrap();
        store
            .append(StatusLogEntry {
                target_id: 1,
                timestamp: now,
                status: TaskRunStatus::Execution,
                description: None,
            })
            .await
            .unwrap();

        let mut both = HashSet::new();
        both.insert(TaskRunStatus::Queued);
        both.insert(TaskRunStatus::Execution);
        let total = store.window_total(&both, 60, now).await.unwrap();
        assert_eq!(total, 2, "both transitions must be preserved, not overwritten");

        // The most recent of the two is still what current_status reports.
        assert_eq!(store.current_status(1).await.unwrap(), Some(TaskRunStatus::Execution));
    }
}
