//! C5 Batch Provider: decides how many `WAITING` task runs the dispatcher
//! promotes to `QUEUED` on each tick.
//!
//! Three variants, selected by [`cadence_shared::config::BatchProviderConfig`]
//! and modeled as a tagged enum rather than a trait-object hierarchy, per
//! the design note that algorithm families here are a closed set known up
//! front: `constant` (fixed size), `aimd` (additive-increase /
//! multiplicative-decrease on the recent success ratio), and `pid` (a
//! two-tier cold-start-probe + tactical-PID + strategic-boundary-adapter
//! controller for environments where the right batch size drifts over
//! time).

pub mod aimd;
pub mod constant;
pub mod pid;

use async_trait::async_trait;
use cadence_shared::config::BatchProviderConfig;

pub use aimd::AimdBatchProvider;
pub use constant::ConstantBatchProvider;
pub use pid::PidBatchProvider;

/// Observed outcome counts and latency for the most recent dispatch
/// window, computed by the caller from the status store's window queries.
/// Batch providers never touch the store directly — this keeps the
/// algorithms themselves pure and independently testable.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchMetrics {
    pub succeeded: usize,
    pub errored: usize,
    pub timed_out: usize,
    pub in_flight: usize,
    pub queue_capacity: usize,
    pub average_execution_seconds: f64,
}

impl DispatchMetrics {
    pub fn total_concluded(&self) -> usize {
        self.succeeded + self.errored + self.timed_out
    }

    /// Fraction of concluded runs in the window that succeeded, or `None`
    /// when nothing concluded (too early to judge).
    pub fn success_ratio(&self) -> Option<f64> {
        let total = self.total_concluded();
        if total == 0 {
            None
        } else {
            Some(self.succeeded as f64 / total as f64)
        }
    }

    pub fn error_ratio(&self) -> f64 {
        let total = self.total_concluded();
        if total == 0 {
            0.0
        } else {
            (self.errored + self.timed_out) as f64 / total as f64
        }
    }

    pub fn utilization(&self) -> f64 {
        if self.queue_capacity == 0 {
            0.0
        } else {
            (self.in_flight as f64 / self.queue_capacity as f64).min(1.0)
        }
    }
}

/// Chooses how many `WAITING` runs to promote on the next dispatch tick.
#[async_trait]
pub trait BatchProvider: Send + Sync {
    async fn next_batch_size(&self, metrics: &DispatchMetrics) -> usize;
}

/// Builds the configured batch-provider variant.
pub fn from_config(config: &BatchProviderConfig) -> Box<dyn BatchProvider> {
    match config {
        BatchProviderConfig::Constant { batch_size } => {
            Box::new(ConstantBatchProvider::new(*batch_size))
        }
        BatchProviderConfig::Aimd {
            delta,
            beta,
            base_size,
            min,
            max,
        } => Box::new(AimdBatchProvider::new(*delta, *beta, *base_size, *min, *max)),
        BatchProviderConfig::Pid {
            target_utilization,
            kp,
            ki,
            kd,
            anti_windup_limit,
            cold_start_initial_batch,
            strategic_period_steps,
        } => Box::new(PidBatchProvider::new(
            *target_utilization,
            *kp,
            *ki,
            *kd,
            *anti_windup_limit,
            *cold_start_initial_batch,
            *strategic_period_steps,
        )),
    }
}
