//! Lifecycle coordinator: the sole writer of the record store.
//!
//! Owns the state machine of SPEC_FULL §4.4. Both RPC surfaces call into
//! this through a shared `Arc`, which keeps the CAS-on-`version` discipline
//! local instead of spread across ambient global state (SPEC_FULL §9).

use crate::admission::AdmissionController;
use crate::error::SchedulerError;
use crate::message_log::MessageLog;
use crate::model::{event, ExecutionVersions, ExecutionOutcome, JobRecord, JobStatus, PostMortem};
use crate::ports::RecordStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

/// Inputs a worker reports at the end of execution.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub outcome: ExecutionOutcome,
    pub error_message: String,
    pub uploaded_result: bool,
    pub compile_started_at: Option<DateTime<Utc>>,
    pub compile_finished_at: Option<DateTime<Utc>>,
    pub execution_started_at: Option<DateTime<Utc>>,
    pub execution_finished_at: Option<DateTime<Utc>>,
    pub actual_backend: String,
    pub exec_version: ExecutionVersions,
}

pub struct LifecycleCoordinator<S: RecordStore + ?Sized> {
    store: Arc<S>,
    admission: AdmissionController,
    log: MessageLog,
}

/// Hand-written rather than `#[derive(Clone)]`: the derive macro would add
/// an `S: Clone` bound even though `S` only appears behind `Arc`, which
/// would make `LifecycleCoordinator<dyn RecordStore>` uncloneable.
impl<S: RecordStore + ?Sized> Clone for LifecycleCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            admission: self.admission.clone(),
            log: self.log.clone(),
        }
    }
}

impl<S: RecordStore + ?Sized> LifecycleCoordinator<S> {
    pub fn new(store: Arc<S>, admission: AdmissionController, log: MessageLog) -> Self {
        Self {
            store,
            admission,
            log,
        }
    }

    pub async fn get(&self, job_id: &str) -> Result<JobRecord, SchedulerError> {
        self.store
            .get(job_id)
            .await?
            .ok_or_else(|| SchedulerError::NotFound(job_id.to_string()))
    }

    /// Writes the initial QUEUED record. Called by the submission service
    /// after admission succeeds and the program has been uploaded.
    pub async fn submit(&self, record: JobRecord) -> Result<(), SchedulerError> {
        self.store.create(record).await
    }

    /// One CAS-guarded transition, retried once on version conflict
    /// (SPEC_FULL §4.4 step 4). `validate_and_mutate` is re-run on retry
    /// against the freshly-read record, so it must be a pure function of
    /// the current record.
    async fn apply<F>(
        &self,
        job_id: &str,
        now: DateTime<Utc>,
        validate_and_mutate: F,
    ) -> Result<JobRecord, SchedulerError>
    where
        F: Fn(&JobRecord, DateTime<Utc>) -> Result<JobRecord, SchedulerError>,
    {
        let mut last_err = None;
        for attempt in 0..2 {
            let current = self.get(job_id).await?;
            let expected_version = current.version;
            let mut updated = validate_and_mutate(&current, now)?;
            updated.version = expected_version + 1;

            match self
                .store
                .compare_and_swap(job_id, expected_version, updated.clone())
                .await?
            {
                true => {
                    self.log
                        .append(
                            job_id,
                            format!("{} -> {}", current.status, updated.status),
                            now,
                        )
                        .await;

                    if updated.status.is_terminal() && !current.status.is_terminal() {
                        self.admission.release(&updated.role).await;
                        info!(job_id, status = %updated.status, "job reached terminal state");
                    }
                    return Ok(updated);
                }
                false => {
                    last_err = Some(SchedulerError::ConcurrentModification(job_id.to_string()));
                    if attempt == 0 {
                        continue;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| SchedulerError::Internal("transition retry exhausted".into())))
    }

    /// QUEUED -> RUNNING, stamping `dequeued_at`/`execution_started_at`.
    /// Returns `NotFound`-shaped `IllegalTransition` if the record raced
    /// to CANCELLED first — the caller (execution service) must loop back
    /// to another `queue.take` rather than hand out this job.
    pub async fn assign(&self, job_id: &str, now: DateTime<Utc>) -> Result<JobRecord, SchedulerError> {
        self.apply(job_id, now, |current, now| match current.status {
            JobStatus::Queued => {
                let mut updated = current.clone();
                updated.status = JobStatus::Running;
                updated.status_detail = "assigned to worker".to_string();
                updated.timestamps.insert(event::DEQUEUED_AT.to_string(), now);
                updated
                    .timestamps
                    .insert(event::EXECUTION_STARTED_AT.to_string(), now);
                Ok(updated)
            }
            other => Err(SchedulerError::IllegalTransition {
                job_id: current.job_id.clone(),
                from: other.to_string(),
                to: JobStatus::Running.to_string(),
            }),
        })
        .await
    }

    /// CancelJob: QUEUED or RUNNING -> CANCELLED. Terminal records return
    /// `AlreadyTerminal` (not a CAS concern — no retry applies).
    pub async fn cancel(
        &self,
        job_id: &str,
        now: DateTime<Utc>,
        detail: &str,
    ) -> Result<JobRecord, SchedulerError> {
        let detail = detail.to_string();
        self.apply(job_id, now, move |current, now| match current.status {
            JobStatus::Queued | JobStatus::Running => {
                let mut updated = current.clone();
                updated.status = JobStatus::Cancelled;
                updated.status_detail = detail.clone();
                updated.timestamps.insert(event::FINISHED_AT.to_string(), now);
                Ok(updated)
            }
            terminal => Err(SchedulerError::AlreadyTerminal {
                job_id: current.job_id.clone(),
                status: terminal.to_string(),
            }),
        })
        .await
    }

    /// Writes the FAILED terminal state used when the queue rejects an
    /// enqueue for memory pressure (SPEC_FULL §4.5 step 7).
    pub async fn fail_before_queue(
        &self,
        job_id: &str,
        now: DateTime<Utc>,
        detail: &str,
    ) -> Result<JobRecord, SchedulerError> {
        let detail = detail.to_string();
        self.apply(job_id, now, move |current, now| match current.status {
            JobStatus::Queued => {
                let mut updated = current.clone();
                updated.status = JobStatus::Failed;
                updated.status_detail = detail.clone();
                updated.timestamps.insert(event::FINISHED_AT.to_string(), now);
                Ok(updated)
            }
            other => Err(SchedulerError::IllegalTransition {
                job_id: current.job_id.clone(),
                from: other.to_string(),
                to: JobStatus::Failed.to_string(),
            }),
        })
        .await
    }

    /// Transitions a RUNNING job to TIMEOUT if its execution deadline has
    /// passed; a no-op otherwise. Called by the timeout sweeper, never by
    /// an RPC handler (SPEC_FULL §4.4 "Timeouts").
    pub async fn timeout_if_overdue(
        &self,
        job_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<JobRecord>, SchedulerError> {
        let current = self.get(job_id).await?;
        if current.status != JobStatus::Running {
            return Ok(None);
        }
        let Some(started) = current.timestamps.get(event::EXECUTION_STARTED_AT).copied() else {
            return Ok(None);
        };
        let deadline = started + chrono::Duration::seconds(current.settings.timeout_seconds as i64);
        if now < deadline {
            return Ok(None);
        }

        let updated = self
            .apply(job_id, now, |current, now| match current.status {
                JobStatus::Running => {
                    let mut updated = current.clone();
                    updated.status = JobStatus::Timeout;
                    updated.status_detail = "execution deadline exceeded".to_string();
                    updated.timestamps.insert(event::FINISHED_AT.to_string(), now);
                    Ok(updated)
                }
                other => Err(SchedulerError::IllegalTransition {
                    job_id: current.job_id.clone(),
                    from: other.to_string(),
                    to: JobStatus::Timeout.to_string(),
                }),
            })
            .await?;
        Ok(Some(updated))
    }

    /// ReportExecutionResult. Idempotent against a matching terminal
    /// record; racy against a CANCELLED record (accepted, but status does
    /// not move — see SPEC_FULL §4.4 and the §9 open-question decision).
    pub async fn report(
        &self,
        job_id: &str,
        now: DateTime<Utc>,
        report: ExecutionReport,
    ) -> Result<JobRecord, SchedulerError> {
        let target_status = report.outcome.terminal_status();

        // Idempotence / racy-cancel fast path: no write needed if the
        // record is already terminal and matches, or is cancelled.
        let current = self.get(job_id).await?;
        match current.status {
            JobStatus::Cancelled => {
                return self
                    .apply(job_id, now, move |current, now| match current.status {
                        JobStatus::Cancelled => {
                            let mut updated = current.clone();
                            updated.post_mortem = Some(PostMortem {
                                reported_status: target_status,
                                reported_at: now,
                                exec_version: report.exec_version.clone(),
                            });
                            Ok(updated)
                        }
                        other => Err(SchedulerError::IllegalTransition {
                            job_id: current.job_id.clone(),
                            from: other.to_string(),
                            to: target_status.to_string(),
                        }),
                    })
                    .await;
            }
            status if status.is_terminal() => {
                if status == target_status {
                    return Ok(current);
                }
                return Err(SchedulerError::IllegalTransition {
                    job_id: job_id.to_string(),
                    from: status.to_string(),
                    to: target_status.to_string(),
                });
            }
            JobStatus::Running => {}
            other => {
                return Err(SchedulerError::IllegalTransition {
                    job_id: job_id.to_string(),
                    from: other.to_string(),
                    to: target_status.to_string(),
                })
            }
        }

        self.apply(job_id, now, move |current, now| match current.status {
            JobStatus::Running => {
                let mut updated = current.clone();
                updated.status = target_status;
                updated.status_detail = if report.error_message.is_empty() {
                    format!("worker reported {target_status}")
                } else {
                    report.error_message.clone()
                };
                updated.backend_canonical = if report.actual_backend.is_empty() {
                    updated.backend_canonical
                } else {
                    report.actual_backend.clone()
                };
                updated.exec_version = report.exec_version.clone();

                if let Some(t) = report.compile_started_at {
                    updated.timestamps.insert(event::COMPILE_STARTED_AT.to_string(), t);
                }
                if let Some(t) = report.compile_finished_at {
                    updated
                        .timestamps
                        .insert(event::COMPILE_FINISHED_AT.to_string(), t);
                }
                if let Some(t) = report.execution_started_at {
                    updated
                        .timestamps
                        .insert(event::EXECUTION_STARTED_AT.to_string(), t);
                }
                if let Some(t) = report.execution_finished_at {
                    updated
                        .timestamps
                        .insert(event::EXECUTION_FINISHED_AT.to_string(), t);
                }
                updated.timestamps.insert(event::FINISHED_AT.to_string(), now);

                if target_status == JobStatus::Completed {
                    if !report.uploaded_result {
                        warn!(job_id = %current.job_id, "SUCCESS report without an uploaded result");
                    }
                    updated.result_ref = Some(result_key(&current.job_id));
                }

                Ok(updated)
            }
            // Raced again between the fast path read and this CAS attempt.
            JobStatus::Cancelled => {
                let mut updated = current.clone();
                updated.post_mortem = Some(PostMortem {
                    reported_status: target_status,
                    reported_at: now,
                    exec_version: report.exec_version.clone(),
                });
                Ok(updated)
            }
            other => Err(SchedulerError::IllegalTransition {
                job_id: current.job_id.clone(),
                from: other.to_string(),
                to: target_status.to_string(),
            }),
        })
        .await
    }
}

/// Deterministic object-store key for a job's result blob.
pub fn result_key(job_id: &str) -> String {
    format!("jobs/{job_id}/result")
}

/// Deterministic object-store key for a job's program blob.
pub fn program_key(job_id: &str) -> String {
    format!("jobs/{job_id}/program")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::AdmissionConfig;
    use crate::model::{JobSettings, Timestamps};
    use crate::role::Role;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    struct InMemoryStore {
        records: StdMutex<HashMap<String, JobRecord>>,
    }

    impl InMemoryStore {
        fn new() -> Self {
            Self {
                records: StdMutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl RecordStore for InMemoryStore {
        async fn create(&self, record: JobRecord) -> Result<(), SchedulerError> {
            self.records.lock().unwrap().insert(record.job_id.clone(), record);
            Ok(())
        }

        async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, SchedulerError> {
            Ok(self.records.lock().unwrap().get(job_id).cloned())
        }

        async fn compare_and_swap(
            &self,
            job_id: &str,
            expected_version: u64,
            new_record: JobRecord,
        ) -> Result<bool, SchedulerError> {
            let mut records = self.records.lock().unwrap();
            match records.get(job_id) {
                Some(existing) if existing.version == expected_version => {
                    records.insert(job_id.to_string(), new_record);
                    Ok(true)
                }
                Some(_) => Ok(false),
                None => Err(SchedulerError::NotFound(job_id.to_string())),
            }
        }

        async fn list_by_status(&self, status: JobStatus) -> Result<Vec<JobRecord>, SchedulerError> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .values()
                .filter(|r| r.status == status)
                .cloned()
                .collect())
        }
    }

    fn coordinator() -> LifecycleCoordinator<InMemoryStore> {
        LifecycleCoordinator::new(
            Arc::new(InMemoryStore::new()),
            AdmissionController::new(AdmissionConfig::default()),
            MessageLog::new(16),
        )
    }

    fn fresh_record(job_id: &str) -> JobRecord {
        JobRecord {
            job_id: job_id.to_string(),
            token_name: "alice".to_string(),
            role: Role::Developer,
            backend_requested: "qpu-a".to_string(),
            backend_canonical: "qpu-a".to_string(),
            program_ref: program_key(job_id),
            program_size_bytes: 1024,
            settings: JobSettings::default(),
            status: JobStatus::Queued,
            status_detail: "queued".to_string(),
            result_ref: None,
            version: 1,
            timestamps: Timestamps::new(),
            exec_version: ExecutionVersions::default(),
            save_job: true,
            post_mortem: None,
        }
    }

    #[tokio::test]
    async fn happy_path_queued_running_completed() {
        let coord = coordinator();
        coord.submit(fresh_record("job-1")).await.unwrap();

        let running = coord.assign("job-1", Utc::now()).await.unwrap();
        assert_eq!(running.status, JobStatus::Running);
        assert_eq!(running.version, 2);

        let completed = coord
            .report(
                "job-1",
                Utc::now(),
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
        assert_eq!(completed.result_ref.as_deref(), Some("jobs/job-1/result"));
    }

    #[tokio::test]
    async fn cancel_while_running_then_racy_report_does_not_move_status() {
        let coord = coordinator();
        coord.submit(fresh_record("job-2")).await.unwrap();
        coord.assign("job-2", Utc::now()).await.unwrap();
        let cancelled = coord.cancel("job-2", Utc::now(), "cancelled by user").await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);

        let after_report = coord
            .report(
                "job-2",
                Utc::now(),
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
    async fn duplicate_success_report_is_idempotent() {
        let coord = coordinator();
        coord.submit(fresh_record("job-3")).await.unwrap();
        coord.assign("job-3", Utc::now()).await.unwrap();

        let report = ExecutionReport {
            outcome: ExecutionOutcome::Success,
            error_message: String::new(),
            uploaded_result: true,
            compile_started_at: None,
            compile_finished_at: None,
            execution_started_at: None,
            execution_finished_at: None,
            actual_backend: String::new(),
            exec_version: ExecutionVersions::default(),
        };

        let first = coord.report("job-3", Utc::now(), report.clone()).await.unwrap();
        let second = coord.report("job-3", Utc::now(), report).await.unwrap();

        assert_eq!(first.status, second.status);
        assert_eq!(
            first.timestamps.get(event::FINISHED_AT),
            second.timestamps.get(event::FINISHED_AT)
        );
    }

    #[tokio::test]
    async fn conflicting_report_against_terminal_record_is_illegal() {
        let coord = coordinator();
        coord.submit(fresh_record("job-4")).await.unwrap();
        coord.assign("job-4", Utc::now()).await.unwrap();
        coord
            .report(
                "job-4",
                Utc::now(),
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

        let conflicting = coord
            .report(
                "job-4",
                Utc::now(),
                ExecutionReport {
                    outcome: ExecutionOutcome::Failure,
                    error_message: "late failure".to_string(),
                    uploaded_result: false,
                    compile_started_at: None,
                    compile_finished_at: None,
                    execution_started_at: None,
                    execution_finished_at: None,
                    actual_backend: String::new(),
                    exec_version: ExecutionVersions::default(),
                },
            )
            .await;

        assert!(matches!(conflicting, Err(SchedulerError::IllegalTransition { .. })));
    }

    #[tokio::test]
    async fn cancel_on_terminal_record_is_already_terminal() {
        let coord = coordinator();
        coord.submit(fresh_record("job-5")).await.unwrap();
        coord.cancel("job-5", Utc::now(), "cancel while queued").await.unwrap();

        let second_cancel = coord.cancel("job-5", Utc::now(), "again").await;
        assert!(matches!(second_cancel, Err(SchedulerError::AlreadyTerminal { .. })));
    }

    #[tokio::test]
    async fn version_is_strictly_monotonic_across_transitions() {
        let coord = coordinator();
        coord.submit(fresh_record("job-6")).await.unwrap();
        let running = coord.assign("job-6", Utc::now()).await.unwrap();
        let cancelled = coord.cancel("job-6", Utc::now(), "done").await.unwrap();
        assert!(cancelled.version > running.version);
        assert!(running.version > 1);
    }

    #[tokio::test]
    async fn overdue_running_job_transitions_to_timeout() {
        let coord = coordinator();
        let mut record = fresh_record("job-8");
        record.settings.timeout_seconds = 1;
        coord.submit(record).await.unwrap();

        let started_at = Utc::now() - chrono::Duration::seconds(10);
        coord.assign("job-8", started_at).await.unwrap();

        let result = coord
            .timeout_if_overdue("job-8", Utc::now())
            .await
            .unwrap();
        assert_eq!(result.unwrap().status, JobStatus::Timeout);
    }

    #[tokio::test]
    async fn running_job_within_deadline_is_left_alone() {
        let coord = coordinator();
        let mut record = fresh_record("job-9");
        record.settings.timeout_seconds = 3600;
        coord.submit(record).await.unwrap();
        coord.assign("job-9", Utc::now()).await.unwrap();

        let result = coord.timeout_if_overdue("job-9", Utc::now()).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn terminal_transition_releases_admission_slot() {
        let coord = coordinator();
        let role = Role::Developer;
        coord.admission.try_reserve(&role, 10).await;
        assert_eq!(coord.admission.active_count(&role).await, 1);

        coord.submit(fresh_record("job-7")).await.unwrap();
        coord.cancel("job-7", Utc::now(), "cancel while queued").await.unwrap();

        assert_eq!(coord.admission.active_count(&role).await, 0);
    }
}
