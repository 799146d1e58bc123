//! Durable job record and the value types that make it up.

use crate::role::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A job's position in the state machine of SPEC_FULL §4.4.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled | JobStatus::Timeout
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
            JobStatus::Timeout => "TIMEOUT",
        };
        write!(f, "{s}")
    }
}

/// Outcome reported by a worker via `ReportExecutionResult`; maps onto a
/// terminal `JobStatus` by the lifecycle coordinator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Success,
    Failure,
    Timeout,
}

impl ExecutionOutcome {
    pub fn terminal_status(self) -> JobStatus {
        match self {
            ExecutionOutcome::Success => JobStatus::Completed,
            ExecutionOutcome::Failure => JobStatus::Failed,
            ExecutionOutcome::Timeout => JobStatus::Timeout,
        }
    }
}

/// Lifecycle event names used as keys into `JobRecord::timestamps`.
pub mod event {
    pub const SUBMITTED_AT: &str = "submitted_at";
    pub const QUEUED_AT: &str = "queued_at";
    pub const DEQUEUED_AT: &str = "dequeued_at";
    pub const COMPILE_STARTED_AT: &str = "compile_started_at";
    pub const COMPILE_FINISHED_AT: &str = "compile_finished_at";
    pub const EXECUTION_STARTED_AT: &str = "execution_started_at";
    pub const EXECUTION_FINISHED_AT: &str = "execution_finished_at";
    pub const FINISHED_AT: &str = "finished_at";
}

pub type Timestamps = HashMap<String, DateTime<Utc>>;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobSettings {
    pub n_shots: u32,
    pub timeout_seconds: u32,
    pub save_state: bool,
    pub resource_squeezing_level: u32,
    pub backend: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExecutionVersions {
    pub physical_lab_version: String,
    pub simulator_version: String,
}

/// Records that a worker's report arrived against an already-terminal
/// (raced) record. See SPEC_FULL §4.4 "Cancellation race" and §9 open
/// question: the reported artifact is captured here for post-mortem only,
/// never surfaced through `result_ref`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostMortem {
    pub reported_status: JobStatus,
    pub reported_at: DateTime<Utc>,
    pub exec_version: ExecutionVersions,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobRecord {
    pub job_id: String,
    pub token_name: String,
    pub role: Role,
    pub backend_requested: String,
    pub backend_canonical: String,
    pub program_ref: String,
    pub program_size_bytes: u64,
    pub settings: JobSettings,
    pub status: JobStatus,
    pub status_detail: String,
    pub result_ref: Option<String>,
    pub version: u64,
    pub timestamps: Timestamps,
    pub exec_version: ExecutionVersions,
    pub save_job: bool,
    pub post_mortem: Option<PostMortem>,
}

impl JobRecord {
    pub fn new(
        job_id: String,
        token_name: String,
        role: Role,
        backend_requested: String,
        backend_canonical: String,
        program_ref: String,
        program_size_bytes: u64,
        settings: JobSettings,
        save_job: bool,
        now: DateTime<Utc>,
    ) -> Self {
        let mut timestamps = Timestamps::new();
        timestamps.insert(event::SUBMITTED_AT.to_string(), now);
        timestamps.insert(event::QUEUED_AT.to_string(), now);

        Self {
            job_id,
            token_name,
            role,
            backend_requested,
            backend_canonical,
            program_ref,
            program_size_bytes,
            settings,
            status: JobStatus::Queued,
            status_detail: "queued".to_string(),
            result_ref: None,
            version: 1,
            timestamps,
            exec_version: ExecutionVersions::default(),
            save_job,
            post_mortem: None,
        }
    }

    pub fn owned_by(&self, token_name: &str) -> bool {
        self.token_name == token_name
    }
}

/// In-memory descriptor of an admitted job waiting for a worker. Pure
/// value, owned by the `JobQueue` — never written to the record store.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub job_id: String,
    pub backend_canonical: String,
    pub role: Role,
    pub program_size_bytes: u64,
    pub enqueued_at: DateTime<Utc>,
}
