//! Configuration types for the `cadence-engine` binary, loaded from
//! `engine.toml` the way the teacher's `ConfigManager` loads `agent.toml`:
//! parsed once at startup, validated, every tunable defaulted so a minimal
//! file still produces a runnable engine.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

fn default_run_timeout_seconds() -> u64 {
    30
}
fn default_metric_provider_period_seconds() -> u64 {
    10
}
fn default_window_seconds() -> u64 {
    60
}
fn default_queued_ttl_seconds() -> i64 {
    300
}
fn default_execution_ttl_seconds() -> i64 {
    300
}
fn default_temp_error_ttl_seconds() -> i64 {
    30
}
fn default_channel_buffer_size() -> usize {
    1024
}
fn default_queue_capacity() -> usize {
    1000
}
fn default_first_interval_days() -> i64 {
    31
}
fn default_left_date() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).unwrap()
}

/// Top-level engine configuration, the `cadence-engine` analogue of the
/// teacher's `AgentConfig`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Optional path to a sqlite file for the status store. When absent,
    /// the engine runs against an in-memory store.
    #[serde(default)]
    pub sqlite_path: Option<String>,

    /// How often the dispatcher (C6) and run materializer (C4) tick, in
    /// seconds.
    #[serde(default = "default_run_timeout_seconds")]
    pub run_timeout_seconds: u64,

    /// How often the metric collector (C10) snapshots state, in seconds.
    #[serde(default = "default_metric_provider_period_seconds")]
    pub metric_provider_period_seconds: u64,

    /// Window used by the AIMD/PID batch providers' success/error ratio
    /// queries, in seconds.
    #[serde(default = "default_window_seconds")]
    pub metrics_window_seconds: u64,

    /// TTL, in seconds, before the timeout transitioner (C8) moves a
    /// QUEUED run to INTERRUPTED.
    #[serde(default = "default_queued_ttl_seconds")]
    pub queued_ttl_seconds: i64,

    /// TTL, in seconds, before the timeout transitioner moves an EXECUTION
    /// run to INTERRUPTED.
    #[serde(default = "default_execution_ttl_seconds")]
    pub execution_ttl_seconds: i64,

    /// TTL, in seconds, before the timeout transitioner moves a
    /// TEMP_ERROR run back to WAITING.
    #[serde(default = "default_temp_error_ttl_seconds")]
    pub temp_error_ttl_seconds: i64,

    /// Size of the in-process outbound/inbound channel stand-ins for the
    /// message-broker transport.
    #[serde(default = "default_channel_buffer_size")]
    pub channel_buffer_size: usize,

    /// Default first-interval span, in days, used by the execution-bounds
    /// provider when no progress row exists yet.
    #[serde(default = "default_first_interval_days")]
    pub default_first_interval_days: i64,

    /// Earliest left bound the execution-bounds provider will backfill a
    /// `TIME_INTERVAL` task's first run to, when no progress row exists yet.
    #[serde(default = "default_left_date")]
    pub default_left_date: DateTime<Utc>,

    /// Nominal queue capacity used to compute utilization for the PID
    /// batch provider.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Which batch-provider variant to run.
    pub batch_provider: BatchProviderConfig,
}

impl EngineConfig {
    /// Validates cross-field invariants that `serde`'s per-field defaults
    /// cannot express on their own.
    pub fn validate(&self) -> Result<(), String> {
        if self.run_timeout_seconds == 0 {
            return Err("run_timeout_seconds must be > 0".to_string());
        }
        if self.metrics_window_seconds == 0 {
            return Err("metrics_window_seconds must be > 0".to_string());
        }
        self.batch_provider.validate()
    }
}

/// Tagged variant, dispatched on `kind`, mirroring the monitoring-algorithm
/// and execution-bounds enums in [`crate::model`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BatchProviderConfig {
    Constant {
        batch_size: usize,
    },
    Aimd {
        delta: f64,
        beta: f64,
        base_size: f64,
        min: f64,
        max: f64,
    },
    Pid {
        target_utilization: f64,
        kp: f64,
        ki: f64,
        kd: f64,
        anti_windup_limit: f64,
        cold_start_initial_batch: usize,
        strategic_period_steps: usize,
    },
}

impl BatchProviderConfig {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            BatchProviderConfig::Constant { batch_size } => {
                if *batch_size == 0 {
                    return Err("constant batch_size must be > 0".to_string());
                }
            }
            BatchProviderConfig::Aimd {
                beta, min, max, ..
            } => {
                if !(*beta > 0.0 && *beta < 1.0) {
                    return Err("aimd beta must be in (0,1)".to_string());
                }
                if min >= max {
                    return Err("aimd min must be < max".to_string());
                }
            }
            BatchProviderConfig::Pid {
                target_utilization, ..
            } => {
                if !(*target_utilization > 0.0 && *target_utilization < 1.0) {
                    return Err("pid target_utilization must be in (0,1)".to_string());
                }
            }
        }
        Ok(())
    }
}
