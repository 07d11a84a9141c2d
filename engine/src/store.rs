//! C1 Status Store: append-only log of `(target_id, timestamp, status,
//! description)` rows per task or task-run, plus the window-aggregate
//! queries the rest of the engine reads from (current status, counts over a
//! trailing window, average duration spent in a given status).
//!
//! The trait is generic over the id/status pair so the same implementation
//! backs both the task domain (`TaskId`/`TaskStatus`) and the task-run
//! domain (`TaskRunId`/`TaskRunStatus`) — mirroring the teacher's
//! `AgentDatabase`, which reused one rusqlite connection across unrelated
//! per-check-type tables instead of duplicating the access pattern.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use cadence_shared::{SchedulerResult, StatusCode, StatusLogEntry};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

pub use memory::InMemoryStatusStore;
pub use sqlite::SqliteStatusStore;

/// Append-only status log with window-aggregate reads, generic over the
/// entity (`Id`) and its status enum (`Status`).
#[async_trait]
pub trait StatusStore<Id, Status>: Send + Sync
where
    Id: Copy + Eq + std::hash::Hash + Send + Sync,
    Status: StatusCode + Send + Sync,
{
    /// Appends a new status entry. Never overwrites or removes prior
    /// entries for the same id — the log is the source of truth for "how
    /// long has this spent in status X" queries.
    async fn append(&self, entry: StatusLogEntry<Id, Status>) -> SchedulerResult<()>;

    /// The most recent status recorded for `id`, if any.
    async fn current_status(&self, id: Id) -> SchedulerResult<Option<Status>>;

    /// The most recent status entry for every id whose current status is in
    /// `statuses` (all ids if `None`).
    async fn current_entries(
        &self,
        statuses: Option<&HashSet<Status>>,
    ) -> SchedulerResult<Vec<StatusLogEntry<Id, Status>>>;

    /// Count of ids currently in one of `statuses`.
    async fn count_with_status(&self, statuses: &HashSet<Status>) -> SchedulerResult<usize>;

    /// Count of ids whose current status is in `statuses` **and** whose
    /// most recent transition into that status happened within
    /// `[now - window_seconds, now]`.
    async fn window_count(
        &self,
        statuses: &HashSet<Status>,
        window_seconds: i64,
        now: DateTime<Utc>,
    ) -> SchedulerResult<usize>;

    /// Total number of transitions into any status in `statuses` recorded
    /// within the trailing window, counting every transition (not just the
    /// current one) — used for throughput-style metrics like "runs
    /// succeeded in the last 60s".
    async fn window_total(
        &self,
        statuses: &HashSet<Status>,
        window_seconds: i64,
        now: DateTime<Utc>,
    ) -> SchedulerResult<usize>;

    /// Average wall-clock time spent in `target` status across maximal
    /// contiguous streaks observed within the trailing window, scanning
    /// newest-to-oldest per id and excluding a streak still open at `now`
    /// (mirrors the original `get_average_by_period` semantics: an
    /// in-progress streak hasn't finished yet, so it isn't a sample of "how
    /// long this status lasts").
    async fn average_duration_in_status(
        &self,
        target: Status,
        window_seconds: i64,
        now: DateTime<Utc>,
    ) -> SchedulerResult<f64>;

    /// Drops log entries older than `cutoff`, retaining at least the most
    /// recent entry per id so `current_status` stays answerable.
    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> SchedulerResult<()>;
}

/// Shared streak-scanning algorithm behind `average_duration_in_status`,
/// operating on one id's entries in newest-to-oldest order. Ported from the
/// original implementation's `get_average_by_period`: walk backwards,
/// accumulate the duration of each maximal contiguous run of `target`,
/// and skip a run still open at `now` (no closing transition yet).
pub(crate) fn average_duration_from_history<Status: PartialEq + Copy>(
    history_desc: &[(DateTime<Utc>, Status)],
    target: Status,
    now: DateTime<Utc>,
) -> Vec<f64> {
    let mut durations = Vec::new();
    let mut i = 0;
    while i < history_desc.len() {
        let (_, status) = history_desc[i];
        if status != target {
            i += 1;
            continue;
        }
        // history_desc[i].0 is the moment the entity left `target` status
        // (the newer neighbor) unless this is the very first entry, in
        // which case the streak is still open.
        if i == 0 {
            i += 1;
            continue;
        }
        let streak_end = history_desc[i - 1].0;
        let mut j = i;
        while j + 1 < history_desc.len() && history_desc[j + 1].1 == target {
            j += 1;
        }
        let streak_start = history_desc[j].0;
        let _ = now;
        durations.push((streak_end - streak_start).num_milliseconds() as f64 / 1000.0);
        i = j + 1;
    }
    durations
}
