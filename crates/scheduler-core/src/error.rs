//! Caller-facing error taxonomy for the scheduler core.
//!
//! This enum is the closed set of error kinds the RPC surfaces map onto
//! transport status codes. It intentionally carries no `tonic` dependency —
//! the mapping to `tonic::Status` lives at the RPC boundary in the binary
//! crate, keeping this crate transport-agnostic (see `core-resilience`'s
//! `ResilienceError` for the pattern this follows).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("token is missing, unknown, or expired")]
    Unauthenticated,

    #[error("token does not own job {job_id}")]
    Unauthorized { job_id: String },

    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    #[error("backend {0} is not available for dispatch")]
    BackendUnavailable(String),

    #[error("role {role} has no remaining quota")]
    QuotaExceeded { role: String },

    #[error("program is {size} bytes, exceeding the {limit} byte limit for role {role}")]
    PayloadTooLarge { role: String, size: u64, limit: u64 },

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("job {0} not found")]
    NotFound(String),

    #[error("job {job_id} is already in a terminal state ({status})")]
    AlreadyTerminal { job_id: String, status: String },

    #[error("illegal transition for job {job_id}: {from} -> {to}")]
    IllegalTransition {
        job_id: String,
        from: String,
        to: String,
    },

    #[error("job {0} was concurrently modified; retry")]
    ConcurrentModification(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SchedulerError {
    /// Whether a retry against the same external dependency is worth one
    /// attempt before surfacing `Internal` (see SPEC_FULL §7).
    pub fn is_transient_io(&self) -> bool {
        matches!(self, SchedulerError::Internal(_))
    }
}
