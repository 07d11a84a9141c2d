//! Shared data model and wire types for the cadence task scheduler.
//!
//! This crate contains the domain types shared by `cadence-engine` and
//! `cadence-gateway`: the task/task-run status machines, the polymorphic
//! monitoring-algorithm and execution-bounds variants, and the JSON wire
//! formats exchanged with workers.

pub mod checksum;
pub mod config;
pub mod error;
pub mod model;
pub mod wire;

pub use error::{SchedulerError, SchedulerResult};
pub use model::*;

/// Result type alias used throughout the shared crate.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    #[test]
    fn test_basic_imports() {
        // Smoke test: the crate builds and its modules are reachable.
    }
}
