//! Error kinds recognized by the scheduler core.
//!
//! The taxonomy and recovery policy mirror the error handling design: some
//! kinds are recovered locally by the component that raised them (the
//! periodic runner just logs and moves on), others are surfaced so the
//! process can exit non-zero on unrecoverable storage failure.

/// Typed error for every failure the core distinguishes behavior on.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Connection lost, lock timeout: abort the transaction, retry at the
    /// next tick.
    #[error("store transient error: {0}")]
    StoreTransient(String),

    /// Schema mismatch, corruption: abort the process with a non-zero exit.
    #[error("store fatal error: {0}")]
    StoreFatal(String),

    /// Outbound send failure, recovered by retrying a bounded number of
    /// times before the message is dropped with a warning.
    #[error("broker transient error: {0}")]
    BrokerTransient(String),

    /// Message too large or otherwise unsendable: drop it and record an
    /// ERROR log entry against the run.
    #[error("broker fatal error: {0}")]
    BrokerFatal(String),

    /// Unparseable response body: log and drop, no state change.
    #[error("malformed response: {0}")]
    ResponseMalformed(String),

    /// Response references a task run the store doesn't know about.
    #[error("unknown task run referenced: {0}")]
    UnknownReference(String),

    /// An invariant was broken. Surfaced to the periodic runner, which
    /// catches it, logs it, and continues.
    #[error("programmer error: {0}")]
    ProgrammerError(String),
}

impl SchedulerError {
    /// Whether this error kind is recovered by the component that raised it
    /// (never propagated to abort the process).
    pub fn is_locally_recovered(&self) -> bool {
        !matches!(self, SchedulerError::StoreFatal(_))
    }
}

/// Result type alias for fallible core operations.
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
