//! Background timeout sweeper (SPEC_FULL §4.4 "Timeouts", §2).
//!
//! Periodically scans RUNNING records for an overdue execution deadline and
//! transitions them to TIMEOUT. Runs as a detached `tokio::spawn` task the
//! same way the teacher's binaries spawn their own background subsystems.

use chrono::Utc;
use scheduler_core::{JobStatus, LifecycleCoordinator};
use scheduler_core::ports::RecordStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub fn spawn<S: RecordStore + 'static>(
    coordinator: LifecycleCoordinator<S>,
    store: Arc<S>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            sweep_once(&coordinator, &store).await;
        }
    })
}

async fn sweep_once<S: RecordStore>(coordinator: &LifecycleCoordinator<S>, store: &Arc<S>) {
    let running = match store.list_by_status(JobStatus::Running).await {
        Ok(records) => records,
        Err(e) => {
            warn!(error = %e, "timeout sweep: failed to list RUNNING jobs");
            return;
        }
    };

    if running.is_empty() {
        debug!("timeout sweep: no RUNNING jobs");
        return;
    }

    let now = Utc::now();
    let mut swept = 0u32;
    for record in running {
        match coordinator.timeout_if_overdue(&record.job_id, now).await {
            Ok(Some(_)) => swept += 1,
            Ok(None) => {}
            Err(e) => warn!(job_id = %record.job_id, error = %e, "timeout sweep: transition failed"),
        }
    }

    if swept > 0 {
        info!(swept, "timeout sweep: transitioned overdue jobs");
    } else {
        debug!("timeout sweep: no jobs overdue");
    }
}
