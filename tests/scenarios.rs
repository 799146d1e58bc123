//! End-to-end scenario tests (SPEC_FULL §8), driven directly against the
//! admission controller, job queue, backend catalog and lifecycle
//! coordinator — the same components the two RPC surfaces call into — with
//! in-memory record-store and object-store gateways standing in for AWS.

use scheduler_core::{
    AdmissionConfig, AdmissionController, BackendCatalog, ExecutionOutcome, ExecutionReport,
    ExecutionVersions, JobQueue, JobRecord, JobSettings, JobStatus, LifecycleCoordinator,
    MessageLog, QueueEntry, ReserveOutcome, Role, TakeOutcome,
};
use scheduler_gateway::object_store::dev::InMemoryObjectStore;
use scheduler_gateway::record_store::dev::InMemoryRecordStore;
use scheduler_core::ports::ObjectStoreGateway;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const CATALOG: &str = r#"
    [[backend]]
    name = "X"
    status = "available"
    description = "Backend X"
"#;

fn test_admission_config(guest_quota: u32) -> AdmissionConfig {
    let mut max_concurrent = HashMap::new();
    max_concurrent.insert("GUEST".to_string(), guest_quota);
    max_concurrent.insert("DEVELOPER".to_string(), 10);
    let mut max_job_bytes = HashMap::new();
    max_job_bytes.insert("GUEST".to_string(), 10 * 1024 * 1024);
    max_job_bytes.insert("DEVELOPER".to_string(), 10 * 1024 * 1024);
    AdmissionConfig {
        max_concurrent,
        max_job_bytes,
        unknown_max_concurrent: 0,
        unknown_max_job_bytes: 0,
    }
}

struct Harness {
    admission: AdmissionController,
    queue: JobQueue,
    catalog: BackendCatalog,
    lifecycle: LifecycleCoordinator<InMemoryRecordStore>,
    object_store: InMemoryObjectStore,
}

impl Harness {
    fn new(admission_config: AdmissionConfig, max_queue_bytes: u64) -> Self {
        let admission = AdmissionController::new(admission_config);
        let store = Arc::new(InMemoryRecordStore::new());
        let lifecycle = LifecycleCoordinator::new(store, admission.clone(), MessageLog::new(16));
        Self {
            admission,
            queue: JobQueue::new(max_queue_bytes),
            catalog: BackendCatalog::from_toml(CATALOG, false).unwrap(),
            lifecycle,
            object_store: InMemoryObjectStore::new(),
        }
    }

    /// Mirrors `SubmissionService::submit_job`'s happy path, minus the
    /// token lookup (the role is passed in directly).
    async fn submit(&self, job_id: &str, role: Role, size: u64) -> Result<ReserveOutcome, String> {
        let resolved = self.catalog.resolve("X").await.map_err(|e| e.to_string())?;
        let outcome = self.admission.try_reserve(&role, size).await;
        if outcome != ReserveOutcome::Ok {
            return Ok(outcome);
        }

        let program_ref = format!("jobs/{job_id}/program");
        self.object_store.put_object(&program_ref, b"program bytes").await.unwrap();

        let record = JobRecord::new(
            job_id.to_string(),
            format!("token-{job_id}"),
            role,
            "X".to_string(),
            resolved.canonical.clone(),
            program_ref,
            size,
            JobSettings {
                backend: "X".to_string(),
                timeout_seconds: 3600,
                ..JobSettings::default()
            },
            true,
            chrono::Utc::now(),
        );
        self.lifecycle.submit(record).await.map_err(|e| e.to_string())?;

        let entry = QueueEntry {
            job_id: job_id.to_string(),
            backend_canonical: resolved.canonical,
            role: self.lifecycle.get(job_id).await.unwrap().role,
            program_size_bytes: size,
            enqueued_at: chrono::Utc::now(),
        };
        use scheduler_core::EnqueueOutcome;
        match self.queue.enqueue(entry).await {
            EnqueueOutcome::Ok => Ok(ReserveOutcome::Ok),
            EnqueueOutcome::RejectMemory => {
                self.lifecycle
                    .fail_before_queue(job_id, chrono::Utc::now(), "queue full")
                    .await
                    .map_err(|e| e.to_string())?;
                Err("RESOURCE_EXHAUSTED".to_string())
            }
        }
    }
}

#[tokio::test]
async fn scenario_happy_path() {
    let h = Harness::new(test_admission_config(5), 100 * 1024 * 1024);
    h.submit("job-1", Role::Developer, 1024 * 1024).await.unwrap();

    let queued = h.lifecycle.get("job-1").await.unwrap();
    assert_eq!(queued.status, JobStatus::Queued);

    let cancel = CancellationToken::new();
    let entry = match h.queue.take("X", &cancel).await {
        TakeOutcome::Entry(e) => e,
        TakeOutcome::Cancelled => panic!("expected an entry"),
    };
    let running = h.lifecycle.assign(&entry.job_id, chrono::Utc::now()).await.unwrap();
    assert_eq!(running.status, JobStatus::Running);

    let completed = h
        .lifecycle
        .report(
            "job-1",
            chrono::Utc::now(),
            ExecutionReport {
                outcome: ExecutionOutcome::Success,
                error_message: String::new(),
                uploaded_result: true,
                compile_started_at: None,
                compile_finished_at: None,
                execution_started_at: None,
                execution_finished_at: None,
                actual_backend: String::new(),
                exec_version: ExecutionVersions::default(),
            },
        )
        .await
        .unwrap();

    assert_eq!(completed.status, JobStatus::Completed);
    assert!(completed.result_ref.is_some());
}

#[tokio::test]
async fn scenario_quota_rejection() {
    let h = Harness::new(test_admission_config(1), 100 * 1024 * 1024);
    h.submit("job-1", Role::Guest, 1024).await.unwrap();

    let second = h.submit("job-2", Role::Guest, 1024).await.unwrap();
    assert_eq!(second, ReserveOutcome::RejectQuota { limit: 1 });
    assert!(h.lifecycle.get("job-2").await.is_err());
}

#[tokio::test]
async fn scenario_cancel_while_queued() {
    let h = Harness::new(test_admission_config(5), 100 * 1024 * 1024);
    h.submit("job-1", Role::Developer, 1024).await.unwrap();

    assert!(h.queue.drop_job("job-1").await);
    let cancelled = h
        .lifecycle
        .cancel("job-1", chrono::Utc::now(), "cancelled by user")
        .await
        .unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);

    let cancel = CancellationToken::new();
    cancel.cancel();
    assert_eq!(h.queue.take("X", &cancel).await, TakeOutcome::Cancelled);
}

#[tokio::test]
async fn scenario_cancel_while_running() {
    let h = Harness::new(test_admission_config(5), 100 * 1024 * 1024);
    h.submit("job-1", Role::Developer, 1024).await.unwrap();

    let cancel = CancellationToken::new();
    let entry = match h.queue.take("X", &cancel).await {
        TakeOutcome::Entry(e) => e,
        TakeOutcome::Cancelled => panic!("expected an entry"),
    };
    h.lifecycle.assign(&entry.job_id, chrono::Utc::now()).await.unwrap();

    let cancelled = h
        .lifecycle
        .cancel("job-1", chrono::Utc::now(), "cancelled by user")
        .await
        .unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);

    let after_report = h
        .lifecycle
        .report(
            "job-1",
            chrono::Utc::now(),
            ExecutionReport {
                outcome: ExecutionOutcome::Success,
                error_message: String::new(),
                uploaded_result: true,
                compile_started_at: None,
                compile_finished_at: None,
                execution_started_at: None,
                execution_finished_at: None,
                actual_backend: String::new(),
                exec_version: ExecutionVersions::default(),
            },
        )
        .await
        .unwrap();

    assert_eq!(after_report.status, JobStatus::Cancelled);
    assert!(after_report.result_ref.is_none());
    assert!(after_report.post_mortem.is_some());
}

#[tokio::test]
async fn scenario_timeout() {
    let h = Harness::new(test_admission_config(5), 100 * 1024 * 1024);
    let resolved = h.catalog.resolve("X").await.unwrap();
    h.admission.try_reserve(&Role::Developer, 1024).await;

    let mut record = JobRecord::new(
        "job-1".to_string(),
        "token-job-1".to_string(),
        Role::Developer,
        "X".to_string(),
        resolved.canonical,
        "jobs/job-1/program".to_string(),
        1024,
        JobSettings {
            backend: "X".to_string(),
            timeout_seconds: 1,
            ..JobSettings::default()
        },
        true,
        chrono::Utc::now(),
    );
    record.status = JobStatus::Queued;
    h.lifecycle.submit(record).await.unwrap();

    let started_at = chrono::Utc::now() - chrono::Duration::seconds(5);
    h.lifecycle.assign("job-1", started_at).await.unwrap();

    let timed_out = h
        .lifecycle
        .timeout_if_overdue("job-1", chrono::Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(timed_out.status, JobStatus::Timeout);
}

#[tokio::test]
async fn scenario_queue_memory_rejection() {
    let h = Harness::new(test_admission_config(10), 2 * 1024 * 1024);
    h.submit("job-1", Role::Developer, 1024 * 1024).await.unwrap();
    h.submit("job-2", Role::Developer, 1024 * 1024).await.unwrap();

    let third = h.submit("job-3", Role::Developer, 1024 * 1024).await;
    assert_eq!(third, Err("RESOURCE_EXHAUSTED".to_string()));

    let failed = h.lifecycle.get("job-3").await.unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.status_detail, "queue full");
}
