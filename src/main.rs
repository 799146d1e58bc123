//! Control-plane binary for the quantum job scheduler: parses configuration,
//! wires admission/queueing/lifecycle/catalog against either AWS-backed or
//! in-memory gateways, spawns the timeout sweeper, and serves the
//! submission and execution RPC surfaces on two independent listeners.

mod config;
mod error_map;
mod execution;
mod proto_convert;
mod submission;
mod sweeper;

use anyhow::{Context, Result};
use clap::Parser;
use config::Cli;
use execution::ExecutionImpl;
use scheduler_core::ports::{CatalogSource, ObjectStoreGateway, RecordStore, TokenService};
use scheduler_core::{AdmissionController, BackendCatalog, JobQueue, LifecycleCoordinator, MessageLog};
use scheduler_gateway::{
    DynamoGatewayConfig, DynamoRecordStore, HttpTokenService, S3Gateway, S3GatewayConfig,
    SsmParamStore, SsmParamStoreConfig, TokenServiceConfig,
};
use scheduler_proto::execution_service_server::ExecutionServiceServer;
use scheduler_proto::submission_service_server::SubmissionServiceServer;
use std::sync::Arc;
use std::time::Duration;
use submission::SubmissionImpl;
use tonic::transport::Server;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const MESSAGE_LOG_CAPACITY_PER_JOB: usize = 64;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);
    cli.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        dev = cli.dev,
        "starting quantum scheduler control plane"
    );

    let admission = AdmissionController::new(cli.admission_config());
    let queue = JobQueue::new(cli.max_queue_bytes);
    let log = MessageLog::new(MESSAGE_LOG_CAPACITY_PER_JOB);

    let catalog_source: Arc<dyn CatalogSource> = build_catalog_source(&cli).await?;
    let catalog_document = catalog_source.fetch().await.context("fetching backend catalog")?;
    let catalog = BackendCatalog::from_toml(&catalog_document, cli.unify_backends)
        .context("parsing backend catalog")?;

    let record_store: Arc<dyn RecordStore> = build_record_store(&cli).await?;
    let object_store: Arc<dyn ObjectStoreGateway> = build_object_store(&cli).await?;
    let token_service: Arc<dyn TokenService> = build_token_service(&cli)?;

    let lifecycle = LifecycleCoordinator::new(record_store.clone(), admission.clone(), log.clone());

    sweeper::spawn(
        lifecycle.clone(),
        record_store.clone(),
        Duration::from_secs(cli.sweep_interval_secs),
    );

    let submission_service = SubmissionImpl::new(
        admission,
        queue.clone(),
        catalog,
        catalog_source,
        lifecycle.clone(),
        object_store.clone(),
        token_service,
    );

    let execution_service = ExecutionImpl::new(
        queue,
        lifecycle,
        object_store,
        Duration::from_secs(cli.assign_poll_timeout_secs),
    );

    let submission_addr: std::net::SocketAddr = format!("{}:{}", cli.bind, cli.port_for_submission)
        .parse()
        .context("parsing submission bind address")?;
    let execution_addr: std::net::SocketAddr = format!("{}:{}", cli.bind, cli.port_for_execution)
        .parse()
        .context("parsing execution bind address")?;

    info!(addr = %submission_addr, "submission service listening");
    info!(addr = %execution_addr, "execution service listening");

    let submission_server = Server::builder()
        .concurrency_limit_per_connection(cli.submission_max_workers)
        .add_service(
            SubmissionServiceServer::new(submission_service)
                .max_decoding_message_size(cli.max_message_bytes)
                .max_encoding_message_size(cli.max_message_bytes),
        )
        .serve(submission_addr);

    let execution_server = Server::builder()
        .concurrency_limit_per_connection(cli.execution_max_workers)
        .add_service(
            ExecutionServiceServer::new(execution_service)
                .max_decoding_message_size(cli.max_message_bytes)
                .max_encoding_message_size(cli.max_message_bytes),
        )
        .serve(execution_addr);

    tokio::try_join!(submission_server, execution_server).context("gRPC server failed")?;

    Ok(())
}

fn init_tracing(debug: bool) {
    let filter = if debug { "debug,scheduler=trace" } else { "info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn build_catalog_source(cli: &Cli) -> Result<Arc<dyn CatalogSource>> {
    if cli.dev {
        let path = cli
            .dev_catalog_file
            .clone()
            .context("--dev-catalog-file is required in --dev mode")?;
        return Ok(Arc::new(scheduler_gateway::param_store::dev::FileParamStore::new(path)));
    }
    let config = SsmParamStoreConfig {
        parameter_name: cli.backend_catalog_param.clone(),
        region: cli.region.clone(),
    };
    let store = SsmParamStore::new(config)
        .await
        .context("building SSM parameter-store client")?;
    Ok(Arc::new(store))
}

async fn build_record_store(cli: &Cli) -> Result<Arc<dyn RecordStore>> {
    if cli.dev {
        return Ok(Arc::new(scheduler_gateway::record_store::dev::InMemoryRecordStore::new()));
    }
    let config = DynamoGatewayConfig {
        table_name: cli.record_store_table.clone(),
        region: cli.region.clone(),
        endpoint: cli.endpoint.clone(),
    };
    let store = DynamoRecordStore::new(config)
        .await
        .context("building DynamoDB record-store client")?;
    Ok(Arc::new(store))
}

async fn build_object_store(cli: &Cli) -> Result<Arc<dyn ObjectStoreGateway>> {
    if cli.dev {
        return Ok(Arc::new(scheduler_gateway::object_store::dev::InMemoryObjectStore::new()));
    }
    let mut config = S3GatewayConfig::new(cli.object_store_bucket.clone());
    config.region = cli.region.clone();
    config.endpoint = cli.s3_endpoint.clone();
    let gateway = S3Gateway::new(config)
        .await
        .context("building S3 object-store client")?;
    Ok(Arc::new(gateway))
}

fn build_token_service(cli: &Cli) -> Result<Arc<dyn TokenService>> {
    if cli.dev {
        return Ok(Arc::new(scheduler_gateway::token::dev::StaticTokenService::new()));
    }
    let config = TokenServiceConfig::new(cli.address_to_token_database.clone());
    let service = HttpTokenService::new(config).context("building token-info HTTP client")?;
    Ok(Arc::new(service))
}
