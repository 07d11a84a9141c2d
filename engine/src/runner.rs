//! C9 Periodic Runner: the cooperative single-writer scheduling backbone.
//! One tokio task per registered job, ticking on its own interval,
//! catch-log-continue on error, no two ticks of the same job ever running
//! concurrently (the next tick waits for the previous one to finish,
//! exactly like the original `PeriodicRunner`'s "await the body before
//! sleeping again" loop — never `tokio::spawn`-per-tick, which would let
//! ticks overlap).
//!
//! Cancellation is cooperative: each job races its wait-for-next-tick
//! against a `Notify` the runner fires on `stop()`, and only checks it
//! between ticks. A tick body, once started, always runs to completion —
//! `stop()` awaits every job's handle rather than aborting it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info};

type JobBody = Box<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

struct Job {
    name: &'static str,
    period: Duration,
    first_delay_seconds: Option<Duration>,
    body: JobBody,
}

/// Holds every registered job's handle so the runner can be cancelled
/// cleanly on shutdown.
pub struct PeriodicRunner {
    jobs: Vec<Job>,
}

impl PeriodicRunner {
    pub fn new() -> Self {
        Self { jobs: Vec::new() }
    }

    /// Registers a job. `body` is called once per tick; it must not panic
    /// across an `.await` point the runner can't see — any error must be
    /// handled inside `body` itself, since the runner only logs a tick
    /// completing, not how it completed.
    ///
    /// `first_delay_seconds` controls when the job's first tick fires:
    /// `None` waits one full `period` before the first tick (the default,
    /// avoiding a thundering herd across every job at process startup);
    /// `Some(d)` fires the first tick after `d` instead, letting a job that
    /// needs to run immediately (or on some other custom cadence) opt out
    /// of that default.
    pub fn register<F, Fut>(
        &mut self,
        name: &'static str,
        period: Duration,
        first_delay_seconds: Option<Duration>,
        body: F,
    ) where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.jobs.push(Job {
            name,
            period,
            first_delay_seconds,
            body: Box::new(move || Box::pin(body())),
        });
    }

    /// Spawns one ticker task per registered job.
    pub fn start(mut self) -> RunningRunner {
        let jobs = std::mem::take(&mut self.jobs);
        let mut handles = Vec::with_capacity(jobs.len());
        let mut cancels = Vec::with_capacity(jobs.len());
        for job in jobs {
            let name = job.name;
            let period = job.period;
            let first_delay = job.first_delay_seconds.unwrap_or(period);
            let body = Arc::new(job.body);
            let cancel = Arc::new(Notify::new());
            let cancel_for_task = cancel.clone();
            let handle = tokio::spawn(async move {
                let mut interval =
                    tokio::time::interval_at(tokio::time::Instant::now() + first_delay, period);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {}
                        _ = cancel_for_task.notified() => break,
                    }
                    info!(job = name, "tick start");
                    let fut = (body)();
                    fut.await;
                    info!(job = name, "tick complete");
                }
            });
            handles.push(handle);
            cancels.push(cancel);
        }
        RunningRunner { handles, cancels }
    }
}

impl Default for PeriodicRunner {
    fn default() -> Self {
        Self::new()
    }
}

pub struct RunningRunner {
    handles: Vec<JoinHandle<()>>,
    cancels: Vec<Arc<Notify>>,
}

impl RunningRunner {
    /// Signals every job to stop waiting for its next tick, then awaits
    /// each job's task to completion. A tick already in progress when
    /// `stop()` is called is never aborted — it finishes normally before
    /// its task exits.
    pub async fn stop(self) {
        for cancel in &self.cancels {
            cancel.notify_one();
        }
        for handle in self.handles {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    error!(error = %e, "periodic runner job panicked");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn registered_job_ticks_repeatedly() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut runner = PeriodicRunner::new();
        let counter_clone = counter.clone();
        runner.register("test-job", Duration::from_millis(10), None, move || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        let running = runner.start();
        tokio::time::sleep(Duration::from_millis(55)).await;
        running.stop().await;
        assert!(counter.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn first_delay_seconds_overrides_the_default_one_period_wait() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut runner = PeriodicRunner::new();
        let counter_clone = counter.clone();
        runner.register(
            "immediate-job",
            Duration::from_secs(60),
            Some(Duration::from_millis(5)),
            move || {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
        );
        let running = runner.start();
        tokio::time::sleep(Duration::from_millis(30)).await;
        running.stop().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_waits_for_an_in_flight_tick_to_finish() {
        let finished = Arc::new(AtomicUsize::new(0));
        let mut runner = PeriodicRunner::new();
        let finished_clone = finished.clone();
        runner.register(
            "slow-job",
            Duration::from_secs(60),
            Some(Duration::from_millis(1)),
            move || {
                let finished = finished_clone.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                }
            },
        );
        let running = runner.start();
        // Give the job time to start its tick body, then stop while it's
        // still mid-sleep.
        tokio::time::sleep(Duration::from_millis(10)).await;
        running.stop().await;
        assert_eq!(finished.load(Ordering::SeqCst), 1, "in-flight tick must complete before stop() returns");
    }
}
