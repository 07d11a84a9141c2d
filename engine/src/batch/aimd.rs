//! Additive-increase / multiplicative-decrease batch size, ported from the
//! original `AimdBatchProvider`: grow the batch by a fixed `delta` when the
//! recent success ratio is healthy (>= 0.85), shrink it by a multiplicative
//! `beta` factor when it's poor (< 0.70), leave it unchanged in between,
//! always clipped to `[min, max]`.

use super::{BatchProvider, DispatchMetrics};
use async_trait::async_trait;
use std::sync::Mutex;

const HEALTHY_THRESHOLD: f64 = 0.85;
const POOR_THRESHOLD: f64 = 0.70;

fn clip(value: f64, min: f64, max: f64) -> f64 {
    value.max(min).min(max)
}

pub struct AimdBatchProvider {
    delta: f64,
    beta: f64,
    min: f64,
    max: f64,
    current: Mutex<f64>,
}

impl AimdBatchProvider {
    pub fn new(delta: f64, beta: f64, base_size: f64, min: f64, max: f64) -> Self {
        Self {
            delta,
            beta,
            min,
            max,
            current: Mutex::new(clip(base_size, min, max)),
        }
    }
}

#[async_trait]
impl BatchProvider for AimdBatchProvider {
    async fn next_batch_size(&self, metrics: &DispatchMetrics) -> usize {
        let mut current = self.current.lock().expect("aimd mutex poisoned");
        if let Some(ratio) = metrics.success_ratio() {
            *current = if ratio >= HEALTHY_THRESHOLD {
                clip(*current + self.delta, self.min, self.max)
            } else if ratio < POOR_THRESHOLD {
                clip(*current * self.beta, self.min, self.max)
            } else {
                *current
            };
        }
        current.floor().max(0.0) as usize
    }
}
