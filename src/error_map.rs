//! Maps `SchedulerError` onto `tonic::Status` at the RPC boundary, keeping
//! `scheduler-core` itself transport-agnostic (SPEC_FULL §4.8).

use scheduler_core::SchedulerError;
use tonic::Status;

pub fn to_status(err: SchedulerError) -> Status {
    match err {
        SchedulerError::Unauthenticated => Status::unauthenticated(err.to_string()),
        SchedulerError::Unauthorized { .. } => Status::permission_denied(err.to_string()),
        SchedulerError::UnknownBackend(_) => Status::invalid_argument(err.to_string()),
        SchedulerError::BackendUnavailable(_) => Status::unavailable(err.to_string()),
        SchedulerError::QuotaExceeded { .. } => Status::resource_exhausted(err.to_string()),
        SchedulerError::PayloadTooLarge { .. } => Status::invalid_argument(err.to_string()),
        SchedulerError::ResourceExhausted(_) => Status::resource_exhausted(err.to_string()),
        SchedulerError::NotFound(_) => Status::not_found(err.to_string()),
        SchedulerError::AlreadyTerminal { .. } => Status::failed_precondition(err.to_string()),
        SchedulerError::IllegalTransition { .. } => Status::failed_precondition(err.to_string()),
        SchedulerError::ConcurrentModification(_) => Status::aborted(err.to_string()),
        SchedulerError::Internal(_) => Status::internal(err.to_string()),
    }
}
