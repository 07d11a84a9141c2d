//! Two-tier adaptive batch controller, ported from the original
//! `AdaptiveBatchController`: a cold-start prober finds a workable
//! operating range, a tactical PID loop tracks target queue utilization
//! inside that range tick-to-tick, and a strategic boundary adapter
//! periodically widens or narrows the range itself as conditions drift.
//!
//! Phase progression is one-way: `ColdStart` -> `Calibration` ->
//! `Operational`. There is no path back to an earlier phase; a controller
//! that calibrated against a bad window just runs degraded until the
//! strategic adapter's emergency-contraction rule kicks in.

use super::{BatchProvider, DispatchMetrics};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

const MAX_ERROR_RATE: f64 = 0.2;
const MAX_LATENCY_MULTIPLIER: f64 = 2.0;
const OUTPUT_CLAMP: f64 = 0.5;
const STABILITY_THRESHOLD: f64 = 0.1;
const STRATEGIC_ERROR_RATE_THRESHOLD: f64 = 0.2;
const STRATEGIC_HISTORY_LEN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControllerPhase {
    ColdStart,
    Calibration,
    Operational,
}

/// Doubles the batch size tick over tick until the error rate or observed
/// latency breaks down, then calibrates `(Bmin, Bmax)` from the last
/// sustainable size.
struct ColdStartProber {
    initial_batch: f64,
    n: f64,
    baseline_latency: Option<f64>,
}

impl ColdStartProber {
    fn new(initial_batch: usize) -> Self {
        let initial = initial_batch.max(1) as f64;
        Self {
            initial_batch: initial,
            n: initial,
            baseline_latency: None,
        }
    }

    /// Returns `Some((bmin, bmax))` once probing has found the breakdown
    /// point, otherwise `None` with `self.n` doubled for the next tick.
    fn step(&mut self, metrics: &DispatchMetrics) -> Option<(f64, f64)> {
        let baseline = *self
            .baseline_latency
            .get_or_insert(metrics.average_execution_seconds.max(0.001));

        let broke_down = metrics.error_ratio() > MAX_ERROR_RATE
            || metrics.average_execution_seconds > baseline * MAX_LATENCY_MULTIPLIER;

        if broke_down && self.n > self.initial_batch {
            let bmin = (self.n / 4.0).max(10.0);
            let bmax = self.n / 2.0;
            return Some((bmin, bmax.max(bmin + 1.0)));
        }
        self.n *= 2.0;
        None
    }
}

/// Classic PID loop on queue utilization error, anti-windup clamped,
/// output expressed as a fractional adjustment to the current batch size
/// and clamped to `+/- OUTPUT_CLAMP`.
struct TacticalPidController {
    kp: f64,
    ki: f64,
    kd: f64,
    target_utilization: f64,
    anti_windup_limit: f64,
    integral: Mutex<f64>,
    prev_error: Mutex<f64>,
}

impl TacticalPidController {
    fn new(kp: f64, ki: f64, kd: f64, target_utilization: f64, anti_windup_limit: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            target_utilization,
            anti_windup_limit,
            integral: Mutex::new(0.0),
            prev_error: Mutex::new(0.0),
        }
    }

    fn compute(&self, utilization: f64) -> f64 {
        let error = self.target_utilization - utilization;
        let mut integral = self.integral.lock().expect("pid mutex poisoned");
        let mut prev_error = self.prev_error.lock().expect("pid mutex poisoned");

        let candidate_integral = *integral + error;
        let unclamped = self.kp * error
            + self.ki * candidate_integral
            + self.kd * (error - *prev_error);
        let saturated = unclamped.abs() > OUTPUT_CLAMP;

        // Anti-windup: only accumulate the integral term when the output
        // isn't already saturated, and cap the accumulator itself.
        if !saturated {
            *integral = candidate_integral.clamp(-self.anti_windup_limit, self.anti_windup_limit);
        }
        *prev_error = error;

        unclamped.clamp(-OUTPUT_CLAMP, OUTPUT_CLAMP)
    }

    fn reset_integral(&self) {
        *self.integral.lock().expect("pid mutex poisoned") = 0.0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Saturation {
    Min,
    Max,
}

#[derive(Debug, Clone, Copy)]
struct StrategicSample {
    error_rate: f64,
    throughput: f64,
    saturated: Option<Saturation>,
}

/// Slope of a linear regression of `ys` against `0..ys.len()`, 0.0 for
/// fewer than two points.
fn trend(ys: &[f64]) -> f64 {
    let n = ys.len() as f64;
    if n < 2.0 {
        return 0.0;
    }
    let sum_x: f64 = (0..ys.len()).map(|i| i as f64).sum();
    let sum_y: f64 = ys.iter().sum();
    let sum_xy: f64 = ys.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
    let sum_xx: f64 = (0..ys.len()).map(|i| (i as f64).powi(2)).sum();
    let denom = n * sum_xx - sum_x * sum_x;
    if denom.abs() < f64::EPSILON {
        0.0
    } else {
        (n * sum_xy - sum_x * sum_y) / denom
    }
}

fn coefficient_of_variation(xs: &[f64]) -> f64 {
    let n = xs.len() as f64;
    if n == 0.0 {
        return 0.0;
    }
    let mean = xs.iter().sum::<f64>() / n;
    if mean.abs() < f64::EPSILON {
        return 0.0;
    }
    let variance = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt() / mean
}

/// Periodically widens or narrows `[Bmin, Bmax]` based on recent behavior.
/// Rules are applied in priority order; the first matching rule wins:
///
/// 1. emergency contraction — mean error rate over the window blew past
///    0.5: shrink both bounds hard and reset the tactical integrator.
/// 2. degradation — error rate trending up while throughput trends down:
///    narrow the ceiling and reset the integrator.
/// 3. grow — throughput is stable (low coefficient of variation), the
///    controller spends most of its time saturated at the ceiling, and
///    errors are low: the ceiling is the bottleneck, so raise it.
/// 4. shrink — the controller spends most of its time saturated at the
///    floor: the range is oversized for current conditions, narrow it.
struct StrategicBoundaryAdapter {
    period_steps: usize,
    ticks_since_adapt: Mutex<usize>,
    history: Mutex<VecDeque<StrategicSample>>,
}

enum StrategicOutcome {
    Unchanged,
    Adapted { bmin: f64, bmax: f64, reset_integrator: bool },
}

impl StrategicBoundaryAdapter {
    fn new(period_steps: usize) -> Self {
        Self {
            period_steps: period_steps.max(1),
            ticks_since_adapt: Mutex::new(0),
            history: Mutex::new(VecDeque::new()),
        }
    }

    fn record(&self, sample: StrategicSample) {
        let mut history = self.history.lock().expect("strategic mutex poisoned");
        history.push_back(sample);
        while history.len() > STRATEGIC_HISTORY_LEN + self.period_steps {
            history.pop_front();
        }
    }

    fn retain_continuity(&self) {
        let mut history = self.history.lock().expect("strategic mutex poisoned");
        while history.len() > STRATEGIC_HISTORY_LEN {
            history.pop_front();
        }
    }

    /// Ticks the internal counter; returns a possibly-adjusted `(bmin,
    /// bmax)` once every `period_steps` ticks, otherwise unchanged.
    fn maybe_adapt(&self, bmin: f64, bmax: f64) -> StrategicOutcome {
        let mut ticks = self.ticks_since_adapt.lock().expect("strategic mutex poisoned");
        *ticks += 1;
        if *ticks < self.period_steps {
            return StrategicOutcome::Unchanged;
        }
        *ticks = 0;

        let history = self.history.lock().expect("strategic mutex poisoned");
        if history.is_empty() {
            return StrategicOutcome::Unchanged;
        }
        let n = history.len() as f64;
        let error_rates: Vec<f64> = history.iter().map(|s| s.error_rate).collect();
        let throughputs: Vec<f64> = history.iter().map(|s| s.throughput).collect();
        let mean_err = error_rates.iter().sum::<f64>() / n;
        let err_trend = trend(&error_rates);
        let thr_trend = trend(&throughputs);
        let cv = coefficient_of_variation(&throughputs);
        let frac_sat_max = history
            .iter()
            .filter(|s| s.saturated == Some(Saturation::Max))
            .count() as f64
            / n;
        let frac_sat_min = history
            .iter()
            .filter(|s| s.saturated == Some(Saturation::Min))
            .count() as f64
            / n;
        drop(history);

        let outcome = if mean_err > 0.5 {
            let new_bmin = (bmin * 0.8).max(1.0);
            let new_bmax = (bmax * 0.7).max(new_bmin + 1.0);
            Some((new_bmin, new_bmax, true))
        } else if err_trend > 0.01 && thr_trend < 0.0 {
            let new_bmax = (bmax * 0.9).max(bmin + 1.0);
            Some((bmin, new_bmax, true))
        } else if cv < STABILITY_THRESHOLD && frac_sat_max > 0.7 && mean_err < STRATEGIC_ERROR_RATE_THRESHOLD {
            Some((bmin, bmax * 1.05, false))
        } else if frac_sat_min > 0.7 {
            let new_bmin = (bmin * 0.9).max(1.0);
            let new_bmax = (bmax * 0.95).max(new_bmin + 1.0);
            Some((new_bmin, new_bmax, false))
        } else {
            None
        };

        self.retain_continuity();
        match outcome {
            Some((bmin, bmax, reset_integrator)) => StrategicOutcome::Adapted { bmin, bmax, reset_integrator },
            None => StrategicOutcome::Unchanged,
        }
    }
}

pub struct PidBatchProvider {
    tactical: TacticalPidController,
    strategic: StrategicBoundaryAdapter,
    phase: Mutex<ControllerPhase>,
    prober: Mutex<ColdStartProber>,
    bounds: Mutex<(f64, f64)>,
    current_batch: Mutex<f64>,
}

impl PidBatchProvider {
    pub fn new(
        target_utilization: f64,
        kp: f64,
        ki: f64,
        kd: f64,
        anti_windup_limit: f64,
        cold_start_initial_batch: usize,
        strategic_period_steps: usize,
    ) -> Self {
        let initial = cold_start_initial_batch.max(1) as f64;
        Self {
            tactical: TacticalPidController::new(kp, ki, kd, target_utilization, anti_windup_limit),
            strategic: StrategicBoundaryAdapter::new(strategic_period_steps),
            phase: Mutex::new(ControllerPhase::ColdStart),
            prober: Mutex::new(ColdStartProber::new(cold_start_initial_batch)),
            bounds: Mutex::new((initial, initial)),
            current_batch: Mutex::new(initial),
        }
    }
}

#[async_trait]
impl BatchProvider for PidBatchProvider {
    async fn next_batch_size(&self, metrics: &DispatchMetrics) -> usize {
        let mut phase = self.phase.lock().expect("pid phase mutex poisoned");
        match *phase {
            ControllerPhase::ColdStart => {
                let mut prober = self.prober.lock().expect("prober mutex poisoned");
                if let Some((bmin, bmax)) = prober.step(metrics) {
                    *self.bounds.lock().expect("bounds mutex poisoned") = (bmin, bmax);
                    *phase = ControllerPhase::Calibration;
                    let midpoint = (bmin + bmax) / 2.0;
                    *self.current_batch.lock().expect("batch mutex poisoned") = midpoint;
                    midpoint.round().max(1.0) as usize
                } else {
                    prober.n.round().max(1.0) as usize
                }
            }
            ControllerPhase::Calibration => {
                *phase = ControllerPhase::Operational;
                self.current_batch
                    .lock()
                    .expect("batch mutex poisoned")
                    .round()
                    .max(1.0) as usize
            }
            ControllerPhase::Operational => {
                let (bmin, bmax, saturated) = {
                    let adjustment = self.tactical.compute(metrics.utilization());
                    let mut current = self.current_batch.lock().expect("batch mutex poisoned");
                    let bounds = self.bounds.lock().expect("bounds mutex poisoned");
                    let raw = (bounds.0 + bounds.1) / 2.0 * (1.0 + adjustment);
                    *current = raw.max(bounds.0).min(bounds.1);
                    let saturated = if raw <= bounds.0 {
                        Some(Saturation::Min)
                    } else if raw >= bounds.1 {
                        Some(Saturation::Max)
                    } else {
                        None
                    };
                    (bounds.0, bounds.1, saturated)
                };
                self.strategic.record(StrategicSample {
                    error_rate: metrics.error_ratio(),
                    throughput: metrics.total_concluded() as f64,
                    saturated,
                });
                if let StrategicOutcome::Adapted { bmin: new_bmin, bmax: new_bmax, reset_integrator } =
                    self.strategic.maybe_adapt(bmin, bmax)
                {
                    *self.bounds.lock().expect("bounds mutex poisoned") = (new_bmin, new_bmax);
                    if reset_integrator {
                        self.tactical.reset_integral();
                    }
                    let mut current = self.current_batch.lock().expect("batch mutex poisoned");
                    *current = current.max(new_bmin).min(new_bmax);
                }
                self.current_batch
                    .lock()
                    .expect("batch mutex poisoned")
                    .round()
                    .max(1.0) as usize
            }
        }
    }
}
