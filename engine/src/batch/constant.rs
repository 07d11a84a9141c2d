//! Fixed batch size, ignoring observed metrics entirely. The baseline
//! provider; useful for tests and for deployments that prefer a human to
//! tune the number by hand.

use super::{BatchProvider, DispatchMetrics};
use async_trait::async_trait;

pub struct ConstantBatchProvider {
    batch_size: usize,
}

impl ConstantBatchProvider {
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size }
    }
}

#[async_trait]
impl BatchProvider for ConstantBatchProvider {
    async fn next_batch_size(&self, _metrics: &DispatchMetrics) -> usize {
        self.batch_size
    }
}
