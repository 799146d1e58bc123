//! Conversions between the wire types in `scheduler_proto` and the
//! transport-agnostic value types in `scheduler_core::model`.
//!
//! Kept in one place so the two RPC surfaces (`submission.rs`,
//! `execution.rs`) never duplicate the mapping.

use chrono::{DateTime, TimeZone, Utc};
use scheduler_core::model::{event, ExecutionOutcome, ExecutionVersions, JobSettings, Timestamps};
use scheduler_core::{BackendStatus, JobStatus};
use scheduler_proto::{
    ExecutionOutcome as ProtoExecutionOutcome, ExecutionVersions as ProtoExecutionVersions,
    JobSettings as ProtoJobSettings, JobStatus as ProtoJobStatus, JobTimestamps,
    ServiceStatus as ProtoServiceStatus,
};
use tonic::Status;

pub fn job_status_to_proto(status: JobStatus) -> ProtoJobStatus {
    match status {
        JobStatus::Queued => ProtoJobStatus::JobStatusQueued,
        JobStatus::Running => ProtoJobStatus::JobStatusRunning,
        JobStatus::Completed => ProtoJobStatus::JobStatusCompleted,
        JobStatus::Failed => ProtoJobStatus::JobStatusFailed,
        JobStatus::Cancelled => ProtoJobStatus::JobStatusCancelled,
        JobStatus::Timeout => ProtoJobStatus::JobStatusTimeout,
    }
}

pub fn service_status_to_proto(status: BackendStatus) -> ProtoServiceStatus {
    match status {
        BackendStatus::Available => ProtoServiceStatus::ServiceStatusAvailable,
        BackendStatus::Unavailable => ProtoServiceStatus::ServiceStatusUnavailable,
        BackendStatus::Maintenance => ProtoServiceStatus::ServiceStatusMaintenance,
    }
}

pub fn exec_versions_to_proto(versions: &ExecutionVersions) -> ProtoExecutionVersions {
    ProtoExecutionVersions {
        physical_lab_version: versions.physical_lab_version.clone(),
        simulator_version: versions.simulator_version.clone(),
    }
}

pub fn exec_versions_from_proto(versions: Option<ProtoExecutionVersions>) -> ExecutionVersions {
    match versions {
        Some(v) => ExecutionVersions {
            physical_lab_version: v.physical_lab_version,
            simulator_version: v.simulator_version,
        },
        None => ExecutionVersions::default(),
    }
}

pub fn job_settings_to_proto(settings: &JobSettings) -> ProtoJobSettings {
    ProtoJobSettings {
        n_shots: settings.n_shots,
        timeout_seconds: settings.timeout_seconds,
        save_state: settings.save_state,
        resource_squeezing_level: settings.resource_squeezing_level,
        backend: settings.backend.clone(),
    }
}

fn unix(ts: i64) -> Option<DateTime<Utc>> {
    if ts == 0 {
        None
    } else {
        Utc.timestamp_opt(ts, 0).single()
    }
}

/// Every recorded event timestamp, 0 where the job hasn't reached that
/// stage yet (proto3 field default, matching `HealthCheckResponse`'s `ok`
/// style of "absent means zero value").
pub fn timestamps_to_proto(timestamps: &Timestamps) -> JobTimestamps {
    let at = |key: &str| timestamps.get(key).map(|t| t.timestamp()).unwrap_or(0);
    JobTimestamps {
        submitted_at: at(event::SUBMITTED_AT),
        queued_at: at(event::QUEUED_AT),
        dequeued_at: at(event::DEQUEUED_AT),
        compile_started_at: at(event::COMPILE_STARTED_AT),
        compile_finished_at: at(event::COMPILE_FINISHED_AT),
        execution_started_at: at(event::EXECUTION_STARTED_AT),
        execution_finished_at: at(event::EXECUTION_FINISHED_AT),
        finished_at: at(event::FINISHED_AT),
    }
}

/// Only the four fields a worker's `ReportExecutionResultRequest` actually
/// carries; `submitted_at`/`queued_at`/`dequeued_at`/`finished_at` are
/// server-owned and ignored here even if a worker sets them.
pub struct ReportedTimestamps {
    pub compile_started_at: Option<DateTime<Utc>>,
    pub compile_finished_at: Option<DateTime<Utc>>,
    pub execution_started_at: Option<DateTime<Utc>>,
    pub execution_finished_at: Option<DateTime<Utc>>,
}

pub fn timestamps_from_proto(timestamps: Option<JobTimestamps>) -> ReportedTimestamps {
    match timestamps {
        Some(t) => ReportedTimestamps {
            compile_started_at: unix(t.compile_started_at),
            compile_finished_at: unix(t.compile_finished_at),
            execution_started_at: unix(t.execution_started_at),
            execution_finished_at: unix(t.execution_finished_at),
        },
        None => ReportedTimestamps {
            compile_started_at: None,
            compile_finished_at: None,
            execution_started_at: None,
            execution_finished_at: None,
        },
    }
}

pub fn exec_outcome_from_proto(outcome: i32) -> Result<ExecutionOutcome, Status> {
    match ProtoExecutionOutcome::try_from(outcome) {
        Ok(ProtoExecutionOutcome::ExecutionOutcomeSuccess) => Ok(ExecutionOutcome::Success),
        Ok(ProtoExecutionOutcome::ExecutionOutcomeFailure) => Ok(ExecutionOutcome::Failure),
        Ok(ProtoExecutionOutcome::ExecutionOutcomeTimeout) => Ok(ExecutionOutcome::Timeout),
        _ => Err(Status::invalid_argument("unspecified or unknown execution outcome")),
    }
}
