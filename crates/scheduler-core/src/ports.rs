//! Interfaces onto the external collaborators this crate depends on but
//! does not implement: the durable record store, the object store, the
//! token-info service and the parameter store. Concrete implementations
//! live in `scheduler-gateway`; this crate only needs the contract.

use crate::error::SchedulerError;
use crate::model::JobRecord;
use crate::role::Role;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Conditional CRUD on job records. The record store is the single source
/// of truth — implementations must not cache, so concurrent readers never
/// observe stale data (SPEC_FULL §5).
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create(&self, record: JobRecord) -> Result<(), SchedulerError>;

    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, SchedulerError>;

    /// Conditional write: succeeds only if the stored record's `version`
    /// still equals `expected_version`. Returns `false` on a CAS miss
    /// rather than an error — the lifecycle coordinator decides whether to
    /// retry.
    async fn compare_and_swap(
        &self,
        job_id: &str,
        expected_version: u64,
        new_record: JobRecord,
    ) -> Result<bool, SchedulerError>;

    /// Lists every record currently in `status`. Used only by the timeout
    /// sweeper; implementations may serve this from a scan/filter rather
    /// than an index, since it runs off the request path.
    async fn list_by_status(
        &self,
        status: crate::model::JobStatus,
    ) -> Result<Vec<JobRecord>, SchedulerError>;
}

/// A time-limited capability to PUT or GET a specific object-store key.
#[derive(Debug, Clone, PartialEq)]
pub struct PresignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Presigned upload/download URL issuance against the object store.
#[async_trait]
pub trait ObjectStoreGateway: Send + Sync {
    async fn put_object(&self, key: &str, bytes: &[u8]) -> Result<(), SchedulerError>;

    /// Fetches an object's full contents. Used by the execution service to
    /// hand a queued job's program to the worker that dequeues it.
    async fn get_object(&self, key: &str) -> Result<Vec<u8>, SchedulerError>;

    async fn presign_put(&self, key: &str) -> Result<PresignedUrl, SchedulerError>;

    async fn presign_get(&self, key: &str) -> Result<PresignedUrl, SchedulerError>;

    /// Best-effort cleanup; implementations should log rather than
    /// propagate failure (SPEC_FULL §9 "object-store cleanup on admission
    /// rollback").
    async fn delete_object(&self, key: &str);
}

/// A token resolved to its owning identity, role and expiry.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenInfo {
    pub token_name: String,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
}

/// Validates an opaque token via the external token-info service. Caches
/// nothing by contract — every call is a fresh lookup.
#[async_trait]
pub trait TokenService: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<TokenInfo, SchedulerError>;
}

/// Fetches the backend-catalog TOML document from the parameter store.
/// Used both at startup and by `GetServiceStatus` to refresh the catalog
/// so status reflects near-real-time edits (SPEC_FULL §4.3).
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch(&self) -> Result<String, SchedulerError>;
}
