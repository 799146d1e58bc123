//! Command-line flags and environment-variable overrides (SPEC_FULL §4.9,
//! §6). Mirrors the teacher's `clap::Parser` + `env = "..."` convention from
//! `orbit-star`'s `Cli`.

use clap::Parser;

/// Control plane for a quantum-computing cloud job scheduler.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Port for the user-facing submission RPC surface.
    #[arg(long, env = "SCHEDULER_SUBMISSION_PORT", default_value_t = 7301)]
    pub port_for_submission: u16,

    /// Port for the worker-facing execution RPC surface.
    #[arg(long, env = "SCHEDULER_EXECUTION_PORT", default_value_t = 7302)]
    pub port_for_execution: u16,

    /// Bind address for both listeners.
    #[arg(long, env = "SCHEDULER_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind: String,

    /// Base URL of the external token-info service.
    #[arg(long, env = "SCHEDULER_TOKEN_SERVICE_URL")]
    pub address_to_token_database: String,

    /// AWS region for S3/DynamoDB/SSM clients.
    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,

    /// Custom S3 endpoint (dev/test only — MinIO, LocalStack).
    #[arg(long, env = "SCHEDULER_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// Custom DynamoDB/SSM endpoint (dev/test only).
    #[arg(long, env = "SCHEDULER_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Object-store bucket for job programs and results.
    #[arg(long, env = "SCHEDULER_OBJECT_STORE_BUCKET")]
    pub object_store_bucket: String,

    /// Record-store table name.
    #[arg(long, env = "SCHEDULER_RECORD_STORE_TABLE")]
    pub record_store_table: String,

    /// Parameter-store key holding the backend catalog TOML document.
    #[arg(long, env = "SCHEDULER_BACKEND_CATALOG_PARAM")]
    pub backend_catalog_param: String,

    /// Collapse every known backend onto a single dispatch queue.
    #[arg(long, env = "SCHEDULER_UNIFY_BACKENDS")]
    pub unify_backends: bool,

    /// Run entirely against in-memory/file-backed gateways; no AWS calls.
    #[arg(long, env = "SCHEDULER_DEV")]
    pub dev: bool,

    /// In `--dev` mode, path to a local catalog TOML file in place of SSM.
    #[arg(long, env = "SCHEDULER_DEV_CATALOG_FILE")]
    pub dev_catalog_file: Option<String>,

    /// Enable verbose (debug) logging.
    #[arg(long)]
    pub debug: bool,

    #[arg(long, env = "SCHEDULER_SUBMISSION_MAX_WORKERS", default_value_t = 100)]
    pub submission_max_workers: usize,

    #[arg(long, env = "SCHEDULER_EXECUTION_MAX_WORKERS", default_value_t = 10)]
    pub execution_max_workers: usize,

    #[arg(long, env = "SCHEDULER_MAX_MESSAGE_BYTES", default_value_t = 16 * 1024 * 1024)]
    pub max_message_bytes: usize,

    #[arg(long, env = "SCHEDULER_MAX_QUEUE_BYTES", default_value_t = 100 * 1024 * 1024)]
    pub max_queue_bytes: u64,

    #[arg(long, env = "SCHEDULER_SWEEP_INTERVAL_SECS", default_value_t = 5)]
    pub sweep_interval_secs: u64,

    /// How long `AssignNextJob` long-polls before returning an empty
    /// response for the worker to retry (SPEC_FULL §4.6 step 1).
    #[arg(long, env = "SCHEDULER_ASSIGN_POLL_TIMEOUT_SECS", default_value_t = 25)]
    pub assign_poll_timeout_secs: u64,

    #[arg(long, env = "MAX_CONCURRENT_JOBS_ADMIN", default_value_t = 1000)]
    pub max_concurrent_jobs_admin: u32,

    #[arg(long, env = "MAX_CONCURRENT_JOBS_DEVELOPER", default_value_t = 10)]
    pub max_concurrent_jobs_developer: u32,

    #[arg(long, env = "MAX_CONCURRENT_JOBS_GUEST", default_value_t = 5)]
    pub max_concurrent_jobs_guest: u32,

    #[arg(long, env = "MAX_JOB_BYTES_ADMIN", default_value_t = 10 * 1024 * 1024)]
    pub max_job_bytes_admin: u64,

    #[arg(long, env = "MAX_JOB_BYTES_DEVELOPER", default_value_t = 10 * 1024 * 1024)]
    pub max_job_bytes_developer: u64,

    #[arg(long, env = "MAX_JOB_BYTES_GUEST", default_value_t = 1024 * 1024)]
    pub max_job_bytes_guest: u64,
}

impl Cli {
    /// Checks invariants that must hold before the process starts serving
    /// traffic (SPEC_FULL §4.9: "validated once at boot ... exits with a
    /// descriptive error on failure").
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.port_for_submission == self.port_for_execution {
            anyhow::bail!(
                "submission and execution ports must differ (both set to {})",
                self.port_for_submission
            );
        }
        if self.submission_max_workers == 0 || self.execution_max_workers == 0 {
            anyhow::bail!("worker-pool sizes must be nonzero");
        }
        if !self.dev && self.address_to_token_database.is_empty() {
            anyhow::bail!("--address-to-token-database is required outside --dev mode");
        }
        Ok(())
    }

    pub fn admission_config(&self) -> scheduler_core::AdmissionConfig {
        let mut max_concurrent = std::collections::HashMap::new();
        max_concurrent.insert("ADMIN".to_string(), self.max_concurrent_jobs_admin);
        max_concurrent.insert("DEVELOPER".to_string(), self.max_concurrent_jobs_developer);
        max_concurrent.insert("GUEST".to_string(), self.max_concurrent_jobs_guest);

        let mut max_job_bytes = std::collections::HashMap::new();
        max_job_bytes.insert("ADMIN".to_string(), self.max_job_bytes_admin);
        max_job_bytes.insert("DEVELOPER".to_string(), self.max_job_bytes_developer);
        max_job_bytes.insert("GUEST".to_string(), self.max_job_bytes_guest);

        scheduler_core::AdmissionConfig {
            max_concurrent,
            max_job_bytes,
            unknown_max_concurrent: 0,
            unknown_max_job_bytes: 0,
        }
    }
}
