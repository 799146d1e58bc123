//! Scheduler core: admission control, job queueing, the backend catalog,
//! the message log and the lifecycle state machine for the quantum job
//! scheduler control plane.
//!
//! This crate is transport-agnostic — it has no knowledge of gRPC, the
//! object store, or the record store's concrete backend. The RPC surfaces
//! and the gateway implementations that fulfill `ports::*` live in the
//! binary crate and in `scheduler-gateway`, respectively.

pub mod admission;
pub mod catalog;
pub mod error;
pub mod lifecycle;
pub mod message_log;
pub mod model;
pub mod ports;
pub mod queue;
pub mod role;

pub use admission::{AdmissionConfig, AdmissionController, ReserveOutcome};
pub use catalog::{BackendCatalog, BackendStatus, CatalogError, Resolved};
pub use error::SchedulerError;
pub use lifecycle::{ExecutionReport, LifecycleCoordinator};
pub use message_log::MessageLog;
pub use model::{
    event, ExecutionOutcome, ExecutionVersions, JobRecord, JobSettings, JobStatus, PostMortem,
    QueueEntry, Timestamps,
};
pub use ports::{CatalogSource, ObjectStoreGateway, PresignedUrl, RecordStore, TokenInfo, TokenService};
pub use queue::{EnqueueOutcome, JobQueue, TakeOutcome};
pub use role::Role;
