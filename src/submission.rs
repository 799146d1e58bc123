//! `SubmissionService`: the user-facing RPC surface (SPEC_FULL §4.5).
//!
//! Structured the way the teacher's `orbit-star::server::StarImpl` wraps
//! shared state behind `Arc` and implements the generated `*Service` trait
//! via `#[tonic::async_trait]`.

use crate::error_map::to_status;
use chrono::Utc;
use scheduler_core::model::{JobRecord, JobSettings};
use scheduler_core::ports::{CatalogSource, ObjectStoreGateway, RecordStore, TokenService};
use scheduler_core::{
    lifecycle::program_key, AdmissionController, BackendCatalog, JobQueue, LifecycleCoordinator,
    QueueEntry, ReserveOutcome, Role, SchedulerError,
};
use scheduler_proto::submission_service_server::SubmissionService;
use scheduler_proto::{
    CancelJobRequest, CancelJobResponse, GetJobResultRequest, GetJobResultResponse,
    GetJobStatusRequest, GetJobStatusResponse, GetServiceStatusRequest, GetServiceStatusResponse,
    HealthCheckRequest, HealthCheckResponse, JobStatus as ProtoJobStatus, SubmitJobRequest,
    SubmitJobResponse,
};
use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::{info, warn};

use crate::proto_convert::{
    exec_versions_to_proto, job_status_to_proto, service_status_to_proto, timestamps_to_proto,
};

/// Guards the admission slot (and, once uploaded, the program object) taken
/// during `submit_job`. Mirrors the teacher's `ConcurrencyPermit`
/// guard-on-drop idiom: released automatically unless `disarm`ed, so a
/// cancelled RPC (the gRPC client disconnects and tonic drops the handler's
/// future) rolls back the reservation exactly like an explicit error return
/// does. `release`/`delete_object` are async, so `Drop` hands the cleanup to
/// a detached task rather than awaiting inline.
struct SubmitGuard {
    admission: AdmissionController,
    role: Role,
    object_store: Arc<dyn ObjectStoreGateway>,
    program_key: Option<String>,
    armed: bool,
}

impl SubmitGuard {
    fn new(admission: AdmissionController, role: Role, object_store: Arc<dyn ObjectStoreGateway>) -> Self {
        Self {
            admission,
            role,
            object_store,
            program_key: None,
            armed: true,
        }
    }

    /// Called once `put_object` succeeds, so a drop after this point also
    /// deletes the now-orphaned upload.
    fn track_object(&mut self, program_key: String) {
        self.program_key = Some(program_key);
    }

    /// Called once the job has been durably enqueued; nothing left to roll
    /// back.
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for SubmitGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let admission = self.admission.clone();
        let role = self.role.clone();
        let object_store = self.object_store.clone();
        let program_key = self.program_key.take();
        tokio::spawn(async move {
            admission.release(&role).await;
            if let Some(key) = program_key {
                object_store.delete_object(&key).await;
            }
        });
    }
}

pub struct SubmissionImpl<S: RecordStore + ?Sized> {
    admission: AdmissionController,
    queue: JobQueue,
    catalog: BackendCatalog,
    catalog_source: Arc<dyn CatalogSource>,
    lifecycle: LifecycleCoordinator<S>,
    object_store: Arc<dyn ObjectStoreGateway>,
    token_service: Arc<dyn TokenService>,
}

impl<S: RecordStore + ?Sized> SubmissionImpl<S> {
    pub fn new(
        admission: AdmissionController,
        queue: JobQueue,
        catalog: BackendCatalog,
        catalog_source: Arc<dyn CatalogSource>,
        lifecycle: LifecycleCoordinator<S>,
        object_store: Arc<dyn ObjectStoreGateway>,
        token_service: Arc<dyn TokenService>,
    ) -> Self {
        Self {
            admission,
            queue,
            catalog,
            catalog_source,
            lifecycle,
            object_store,
            token_service,
        }
    }

    async fn authenticate(&self, token: &str) -> Result<scheduler_core::ports::TokenInfo, Status> {
        self.token_service
            .resolve(token)
            .await
            .map_err(to_status)
    }

    async fn owned_record(&self, token_name: &str, job_id: &str) -> Result<JobRecord, Status> {
        let record = self.lifecycle.get(job_id).await.map_err(to_status)?;
        if !record.owned_by(token_name) {
            return Err(to_status(SchedulerError::Unauthorized {
                job_id: job_id.to_string(),
            }));
        }
        Ok(record)
    }
}

#[tonic::async_trait]
impl<S: RecordStore + ?Sized + 'static> SubmissionService for SubmissionImpl<S> {
    async fn submit_job(
        &self,
        request: Request<SubmitJobRequest>,
    ) -> Result<Response<SubmitJobResponse>, Status> {
        let req = request.into_inner();
        let token_info = self.authenticate(&req.token).await?;

        let settings = req.settings.unwrap_or_default();
        let resolved = self
            .catalog
            .resolve(&settings.backend)
            .await
            .map_err(|e| to_status(SchedulerError::UnknownBackend(e.to_string())))?;
        if !self.catalog.is_dispatch_eligible(&resolved.canonical).await {
            return Err(to_status(SchedulerError::BackendUnavailable(
                resolved.canonical.clone(),
            )));
        }

        let size = req.program.len() as u64;
        match self.admission.try_reserve(&token_info.role, size).await {
            ReserveOutcome::Ok => {}
            ReserveOutcome::RejectSize { limit } => {
                return Err(to_status(SchedulerError::PayloadTooLarge {
                    role: token_info.role.to_string(),
                    size,
                    limit,
                }))
            }
            ReserveOutcome::RejectQuota { .. } => {
                return Err(to_status(SchedulerError::QuotaExceeded {
                    role: token_info.role.to_string(),
                }))
            }
        }

        let mut guard = SubmitGuard::new(
            self.admission.clone(),
            token_info.role.clone(),
            self.object_store.clone(),
        );

        let job_id = uuid::Uuid::new_v4().to_string();
        let program_key = program_key(&job_id);

        if let Err(e) = self.object_store.put_object(&program_key, &req.program).await {
            return Err(to_status(e));
        }
        guard.track_object(program_key.clone());

        let now = Utc::now();
        let job_settings = JobSettings {
            n_shots: settings.n_shots,
            timeout_seconds: settings.timeout_seconds,
            save_state: settings.save_state,
            resource_squeezing_level: settings.resource_squeezing_level,
            backend: settings.backend.clone(),
        };

        let record = JobRecord::new(
            job_id.clone(),
            token_info.token_name.clone(),
            token_info.role.clone(),
            settings.backend.clone(),
            resolved.canonical.clone(),
            program_key.clone(),
            size,
            job_settings,
            settings.save_state,
            now,
        );

        if let Err(e) = self.lifecycle.submit(record).await {
            return Err(to_status(e));
        }

        let entry = QueueEntry {
            job_id: job_id.clone(),
            backend_canonical: resolved.canonical.clone(),
            role: token_info.role.clone(),
            program_size_bytes: size,
            enqueued_at: now,
        };

        use scheduler_core::EnqueueOutcome;
        match self.queue.enqueue(entry).await {
            EnqueueOutcome::Ok => {
                guard.disarm();
                info!(job_id, role = %token_info.role, backend = %resolved.canonical, "job submitted");
                Ok(Response::new(SubmitJobResponse { job_id }))
            }
            EnqueueOutcome::RejectMemory => {
                // The record already exists (lifecycle.submit succeeded), so
                // the guard's object-store delete would race the program a
                // later GetJobResult never reads; disarm it and let
                // fail_before_queue's terminal transition release admission.
                guard.disarm();
                warn!(job_id, "queue memory exhausted, failing job before dispatch");
                if let Err(e) = self
                    .lifecycle
                    .fail_before_queue(&job_id, Utc::now(), "queue full")
                    .await
                {
                    warn!(job_id, error = %e, "failed to mark job FAILED after queue rejection");
                }
                Err(to_status(SchedulerError::ResourceExhausted(
                    "job queue memory exhausted".to_string(),
                )))
            }
        }
    }

    async fn cancel_job(
        &self,
        request: Request<CancelJobRequest>,
    ) -> Result<Response<CancelJobResponse>, Status> {
        let req = request.into_inner();
        let token_info = self.authenticate(&req.token).await?;
        let record = self.owned_record(&token_info.token_name, &req.job_id).await?;

        if record.status == scheduler_core::JobStatus::Queued {
            self.queue.drop_job(&req.job_id).await;
        }

        let updated = self
            .lifecycle
            .cancel(&req.job_id, Utc::now(), "cancelled by user")
            .await
            .map_err(to_status)?;

        Ok(Response::new(CancelJobResponse {
            status: job_status_to_proto(updated.status) as i32,
        }))
    }

    async fn get_job_status(
        &self,
        request: Request<GetJobStatusRequest>,
    ) -> Result<Response<GetJobStatusResponse>, Status> {
        let req = request.into_inner();
        let token_info = self.authenticate(&req.token).await?;
        let record = self.owned_record(&token_info.token_name, &req.job_id).await?;

        Ok(Response::new(GetJobStatusResponse {
            status: job_status_to_proto(record.status) as i32,
            status_detail: record.status_detail,
            timestamps: Some(timestamps_to_proto(&record.timestamps)),
            exec_version: Some(exec_versions_to_proto(&record.exec_version)),
            backend_canonical: record.backend_canonical,
        }))
    }

    async fn get_job_result(
        &self,
        request: Request<GetJobResultRequest>,
    ) -> Result<Response<GetJobResultResponse>, Status> {
        let req = request.into_inner();
        let token_info = self.authenticate(&req.token).await?;
        let record = self.owned_record(&token_info.token_name, &req.job_id).await?;

        if record.status != scheduler_core::JobStatus::Completed {
            return Ok(Response::new(GetJobResultResponse {
                status: job_status_to_proto(record.status) as i32,
                download_url: String::new(),
                expires_at: 0,
            }));
        }

        let result_ref = record.result_ref.ok_or_else(|| {
            to_status(SchedulerError::Internal(format!(
                "job {} is COMPLETED with no result_ref",
                req.job_id
            )))
        })?;

        let url = self
            .object_store
            .presign_get(&result_ref)
            .await
            .map_err(to_status)?;

        Ok(Response::new(GetJobResultResponse {
            status: ProtoJobStatus::JobStatusCompleted as i32,
            download_url: url.url,
            expires_at: url.expires_at.timestamp(),
        }))
    }

    async fn get_service_status(
        &self,
        request: Request<GetServiceStatusRequest>,
    ) -> Result<Response<GetServiceStatusResponse>, Status> {
        let req = request.into_inner();
        self.authenticate(&req.token).await?;

        match self.catalog_source.fetch().await {
            Ok(source) => {
                if let Err(e) = self.catalog.reload(&source).await {
                    warn!(error = %e, "GetServiceStatus: catalog reload produced an invalid document, serving stale table");
                }
            }
            Err(e) => warn!(error = %e, "GetServiceStatus: failed to fetch catalog source, serving stale table"),
        }

        let resolved = self
            .catalog
            .resolve(&req.backend)
            .await
            .map_err(|e| to_status(SchedulerError::UnknownBackend(e.to_string())))?;

        Ok(Response::new(GetServiceStatusResponse {
            canonical_name: resolved.canonical,
            status: service_status_to_proto(resolved.status) as i32,
            description: resolved.description,
        }))
    }

    async fn health_check(
        &self,
        _request: Request<HealthCheckRequest>,
    ) -> Result<Response<HealthCheckResponse>, Status> {
        Ok(Response::new(HealthCheckResponse { ok: true }))
    }
}
