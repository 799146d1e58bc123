//! Admission controller: per-role concurrency and payload-size limits.
//!
//! Pure logic, no knowledge of the record store or object store. Protected
//! by a single mutex; every operation is O(1) and never blocks on I/O, so
//! callers get an immediate reject instead of queueing behind congestion
//! (the "fail-fast submission" contract of SPEC_FULL §7).

use crate::role::Role;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    Ok,
    RejectSize { limit: u64 },
    RejectQuota { limit: u32 },
}

/// Per-role quota configuration. Unrecognized roles share the `unknown_*`
/// bucket so lookups stay total (SPEC_FULL §9).
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    pub max_concurrent: HashMap<String, u32>,
    pub max_job_bytes: HashMap<String, u64>,
    pub unknown_max_concurrent: u32,
    pub unknown_max_job_bytes: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        let mut max_concurrent = HashMap::new();
        max_concurrent.insert("ADMIN".to_string(), 1000);
        max_concurrent.insert("DEVELOPER".to_string(), 10);
        max_concurrent.insert("GUEST".to_string(), 5);

        let mut max_job_bytes = HashMap::new();
        max_job_bytes.insert("ADMIN".to_string(), 10 * 1024 * 1024);
        max_job_bytes.insert("DEVELOPER".to_string(), 10 * 1024 * 1024);
        max_job_bytes.insert("GUEST".to_string(), 1024 * 1024);

        Self {
            max_concurrent,
            max_job_bytes,
            unknown_max_concurrent: 0,
            unknown_max_job_bytes: 0,
        }
    }
}

impl AdmissionConfig {
    fn quota(&self, role: &Role) -> u32 {
        self.max_concurrent
            .get(role.key())
            .copied()
            .unwrap_or(self.unknown_max_concurrent)
    }

    fn byte_limit(&self, role: &Role) -> u64 {
        self.max_job_bytes
            .get(role.key())
            .copied()
            .unwrap_or(self.unknown_max_job_bytes)
    }
}

struct State {
    active_jobs: HashMap<String, u32>,
}

/// Holds per-role active job counters and their configured limits.
#[derive(Clone)]
pub struct AdmissionController {
    config: Arc<AdmissionConfig>,
    state: Arc<Mutex<State>>,
}

impl AdmissionController {
    pub fn new(config: AdmissionConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: Arc::new(Mutex::new(State {
                active_jobs: HashMap::new(),
            })),
        }
    }

    /// Atomic check-and-increment. Rejects on quota or size before taking
    /// any further action; callers never block.
    pub async fn try_reserve(&self, role: &Role, size_bytes: u64) -> ReserveOutcome {
        let limit = self.config.byte_limit(role);
        if size_bytes > limit {
            return ReserveOutcome::RejectSize { limit };
        }

        let quota = self.config.quota(role);
        let mut state = self.state.lock().await;
        let active = state.active_jobs.entry(role.key().to_string()).or_insert(0);
        if *active >= quota {
            return ReserveOutcome::RejectQuota { limit: quota };
        }
        *active += 1;
        ReserveOutcome::Ok
    }

    /// Atomic decrement. Fails silently (logged) if already zero: that
    /// signals a coordinator bug, not a caller error, per SPEC_FULL §4.1.
    pub async fn release(&self, role: &Role) {
        let mut state = self.state.lock().await;
        match state.active_jobs.get_mut(role.key()) {
            Some(count) if *count > 0 => *count -= 1,
            _ => warn!(role = %role, "admission release called with no held slot"),
        }
    }

    pub async fn active_count(&self, role: &Role) -> u32 {
        let state = self.state.lock().await;
        state.active_jobs.get(role.key()).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AdmissionConfig {
        let mut max_concurrent = HashMap::new();
        max_concurrent.insert("GUEST".to_string(), 1);
        let mut max_job_bytes = HashMap::new();
        max_job_bytes.insert("GUEST".to_string(), 1024);
        AdmissionConfig {
            max_concurrent,
            max_job_bytes,
            unknown_max_concurrent: 0,
            unknown_max_job_bytes: 0,
        }
    }

    #[tokio::test]
    async fn second_reservation_hits_quota() {
        let controller = AdmissionController::new(test_config());
        let role = Role::Guest;

        assert_eq!(controller.try_reserve(&role, 10).await, ReserveOutcome::Ok);
        assert_eq!(
            controller.try_reserve(&role, 10).await,
            ReserveOutcome::RejectQuota { limit: 1 }
        );
    }

    #[tokio::test]
    async fn oversized_payload_is_rejected_before_quota_check() {
        let controller = AdmissionController::new(test_config());
        let role = Role::Guest;

        assert_eq!(
            controller.try_reserve(&role, 2048).await,
            ReserveOutcome::RejectSize { limit: 1024 }
        );
        // Quota untouched by the rejected attempt.
        assert_eq!(controller.active_count(&role).await, 0);
    }

    #[tokio::test]
    async fn release_frees_a_slot_for_reuse() {
        let controller = AdmissionController::new(test_config());
        let role = Role::Guest;

        assert_eq!(controller.try_reserve(&role, 10).await, ReserveOutcome::Ok);
        controller.release(&role).await;
        assert_eq!(controller.try_reserve(&role, 10).await, ReserveOutcome::Ok);
    }

    #[tokio::test]
    async fn release_below_zero_is_silent() {
        let controller = AdmissionController::new(test_config());
        controller.release(&Role::Guest).await;
        assert_eq!(controller.active_count(&Role::Guest).await, 0);
    }

    #[tokio::test]
    async fn unknown_role_shares_the_conservative_bucket() {
        let controller = AdmissionController::new(AdmissionConfig::default());
        let role = Role::Unknown("SERVICE".into());
        assert_eq!(
            controller.try_reserve(&role, 1).await,
            ReserveOutcome::RejectQuota { limit: 0 }
        );
    }
}
