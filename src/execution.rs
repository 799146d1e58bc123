//! `ExecutionService`: the worker-facing RPC surface (SPEC_FULL §4.6).
//!
//! Workers authenticate by network position — this listener binds a
//! separate port from the submission surface and carries no token check.

use crate::error_map::to_status;
use crate::proto_convert::{
    exec_outcome_from_proto, exec_versions_from_proto, job_settings_to_proto,
    job_status_to_proto, timestamps_from_proto,
};
use chrono::Utc;
use scheduler_core::model::JobStatus;
use scheduler_core::ports::{ObjectStoreGateway, RecordStore};
use scheduler_core::{ExecutionReport, JobQueue, LifecycleCoordinator, TakeOutcome};
use scheduler_proto::execution_service_server::ExecutionService;
use scheduler_proto::{
    AssignNextJobRequest, AssignNextJobResponse, HealthCheckRequest, HealthCheckResponse,
    RefreshUploadUrlRequest, RefreshUploadUrlResponse, ReportExecutionResultRequest,
    ReportExecutionResultResponse, UploadTarget,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};
use tracing::{info, warn};

pub struct ExecutionImpl<S: RecordStore + ?Sized> {
    queue: JobQueue,
    lifecycle: LifecycleCoordinator<S>,
    object_store: Arc<dyn ObjectStoreGateway>,
    assign_poll_timeout: Duration,
}

impl<S: RecordStore + ?Sized> ExecutionImpl<S> {
    pub fn new(
        queue: JobQueue,
        lifecycle: LifecycleCoordinator<S>,
        object_store: Arc<dyn ObjectStoreGateway>,
        assign_poll_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            lifecycle,
            object_store,
            assign_poll_timeout,
        }
    }
}

#[tonic::async_trait]
impl<S: RecordStore + ?Sized + 'static> ExecutionService for ExecutionImpl<S> {
    async fn assign_next_job(
        &self,
        request: Request<AssignNextJobRequest>,
    ) -> Result<Response<AssignNextJobResponse>, Status> {
        let req = request.into_inner();
        if req.backend.is_empty() {
            return Err(Status::invalid_argument("backend is required"));
        }

        let cancel = CancellationToken::new();
        let timeout_guard = cancel.clone();
        let poll_timeout = self.assign_poll_timeout;
        let timeout_task = tokio::spawn(async move {
            tokio::time::sleep(poll_timeout).await;
            timeout_guard.cancel();
        });

        // SPEC_FULL §4.6 step 5: a job whose record raced to CANCELLED
        // between enqueue and dequeue is skipped, not returned — loop
        // back to another `take` until one survives or the poll times out.
        let record = loop {
            match self.queue.take(&req.backend, &cancel).await {
                TakeOutcome::Cancelled => {
                    timeout_task.abort();
                    return Ok(Response::new(AssignNextJobResponse::default()));
                }
                TakeOutcome::Entry(entry) => {
                    match self.lifecycle.assign(&entry.job_id, Utc::now()).await {
                        Ok(record) => break record,
                        Err(e) => {
                            warn!(job_id = %entry.job_id, error = %e, "skipping raced job on assign");
                            continue;
                        }
                    }
                }
            }
        };
        timeout_task.abort();

        let program = self
            .object_store
            .get_object(&record.program_ref)
            .await
            .map_err(to_status)?;

        let result_key = scheduler_core::lifecycle::result_key(&record.job_id);
        let upload_url = self
            .object_store
            .presign_put(&result_key)
            .await
            .map_err(to_status)?;

        info!(job_id = %record.job_id, backend = %req.backend, "job assigned to worker");

        Ok(Response::new(AssignNextJobResponse {
            job_id: record.job_id,
            program,
            settings: Some(job_settings_to_proto(&record.settings)),
            upload_target: Some(UploadTarget {
                url: upload_url.url,
                expires_at: upload_url.expires_at.timestamp(),
            }),
        }))
    }

    async fn report_execution_result(
        &self,
        request: Request<ReportExecutionResultRequest>,
    ) -> Result<Response<ReportExecutionResultResponse>, Status> {
        let req = request.into_inner();
        let outcome = exec_outcome_from_proto(req.outcome)?;
        let ts = timestamps_from_proto(req.timestamps);

        let report = ExecutionReport {
            outcome,
            error_message: req.error_message,
            uploaded_result: req.uploaded_result,
            compile_started_at: ts.compile_started_at,
            compile_finished_at: ts.compile_finished_at,
            execution_started_at: ts.execution_started_at,
            execution_finished_at: ts.execution_finished_at,
            actual_backend: req.actual_backend,
            exec_version: exec_versions_from_proto(req.exec_version),
        };

        let updated = self
            .lifecycle
            .report(&req.job_id, Utc::now(), report)
            .await
            .map_err(to_status)?;

        info!(job_id = %req.job_id, status = %updated.status, "execution result recorded");

        Ok(Response::new(ReportExecutionResultResponse {
            status: job_status_to_proto(updated.status) as i32,
        }))
    }

    async fn refresh_upload_url(
        &self,
        request: Request<RefreshUploadUrlRequest>,
    ) -> Result<Response<RefreshUploadUrlResponse>, Status> {
        let req = request.into_inner();
        let record = self.lifecycle.get(&req.job_id).await.map_err(to_status)?;

        if record.status != JobStatus::Running {
            return Err(Status::failed_precondition(format!(
                "job {} is not RUNNING (status {})",
                req.job_id, record.status
            )));
        }

        let result_key = scheduler_core::lifecycle::result_key(&req.job_id);
        let upload_url = self
            .object_store
            .presign_put(&result_key)
            .await
            .map_err(to_status)?;

        Ok(Response::new(RefreshUploadUrlResponse {
            upload_target: Some(UploadTarget {
                url: upload_url.url,
                expires_at: upload_url.expires_at.timestamp(),
            }),
        }))
    }

    async fn health_check(
        &self,
        _request: Request<HealthCheckRequest>,
    ) -> Result<Response<HealthCheckResponse>, Status> {
        Ok(Response::new(HealthCheckResponse { ok: true }))
    }
}
